//! # Literal Codec
//!
//! Converts wire literals to and from native [`Scalar`] values.
//!
//! Core scalar kinds (booleans, integers, floats, strings, binary, dates,
//! times, timestamps, decimals, structs, lists) need no extension lookup.
//! Extension-kind scalars (UUID, fixed/var-length char, intervals) use the
//! dedicated core wire literal for their kind and carry the same payload as
//! their storage representation.
//!
//! A null literal carries its type; decoding a null whose wire type is marked
//! REQUIRED fails `Invalid`, since a required type cannot hold a null.

use substrait::proto;
use substrait::proto::expression::literal::LiteralType;
use substrait::proto::expression::Literal;
use substrait::proto::r#type::Nullability;
use vex_core::scalar::Scalar;
use vex_core::types::{ExtensionKind, Field, TimeUnit};

use crate::error::{Result, SubstraitError};
use crate::extension::ExtensionSet;
use crate::types::{decode_type, encode_type, wire_nullability};

fn literal(literal_type: LiteralType, nullable: bool) -> Literal {
    Literal {
        nullable,
        type_variation_reference: 0,
        literal_type: Some(literal_type),
    }
}

/// Decode a wire literal into a native scalar.
pub fn decode_literal(wire: &Literal, ext_set: &mut ExtensionSet) -> Result<Scalar> {
    let literal_type = wire
        .literal_type
        .as_ref()
        .ok_or_else(|| SubstraitError::invalid("literal with no literal type"))?;

    let scalar = match literal_type {
        LiteralType::Boolean(v) => Scalar::Boolean(*v),
        LiteralType::I8(v) => Scalar::Int8(i8::try_from(*v).map_err(|_| {
            SubstraitError::invalid(format!("i8 literal {v} out of range"))
        })?),
        LiteralType::I16(v) => Scalar::Int16(i16::try_from(*v).map_err(|_| {
            SubstraitError::invalid(format!("i16 literal {v} out of range"))
        })?),
        LiteralType::I32(v) => Scalar::Int32(*v),
        LiteralType::I64(v) => Scalar::Int64(*v),
        LiteralType::Fp32(v) => Scalar::float32(*v),
        LiteralType::Fp64(v) => Scalar::float64(*v),
        LiteralType::String(v) => Scalar::Utf8(v.clone()),
        LiteralType::Binary(v) => Scalar::Binary(v.clone()),
        LiteralType::FixedBinary(v) => Scalar::FixedSizeBinary(v.clone()),
        LiteralType::FixedChar(v) => Scalar::Extension {
            kind: ExtensionKind::FixedChar(v.len() as i32),
            storage: Box::new(Scalar::FixedSizeBinary(v.as_bytes().to_vec())),
        },
        LiteralType::VarChar(v) => Scalar::Extension {
            kind: ExtensionKind::VarChar(v.length as i32),
            storage: Box::new(Scalar::Utf8(v.value.clone())),
        },
        LiteralType::Decimal(v) => {
            let bytes: [u8; 16] = v.value.as_slice().try_into().map_err(|_| {
                SubstraitError::invalid(format!(
                    "decimal literal value must be 16 little-endian bytes, got {}",
                    v.value.len()
                ))
            })?;
            Scalar::Decimal128 {
                precision: u8::try_from(v.precision).map_err(|_| {
                    SubstraitError::invalid(format!(
                        "decimal precision {} out of range",
                        v.precision
                    ))
                })?,
                scale: i8::try_from(v.scale).map_err(|_| {
                    SubstraitError::invalid(format!("decimal scale {} out of range", v.scale))
                })?,
                value: i128::from_le_bytes(bytes),
            }
        }
        LiteralType::Date(v) => Scalar::Date32(*v),
        LiteralType::Time(v) => Scalar::Time64 {
            unit: TimeUnit::Microsecond,
            value: *v,
        },
        LiteralType::Timestamp(v) => Scalar::Timestamp {
            unit: TimeUnit::Microsecond,
            tz: None,
            value: *v,
        },
        LiteralType::TimestampTz(v) => Scalar::Timestamp {
            unit: TimeUnit::Microsecond,
            tz: Some("UTC".to_string()),
            value: *v,
        },
        LiteralType::IntervalYearToMonth(v) => Scalar::interval_year(v.years, v.months),
        LiteralType::IntervalDayToSecond(v) => Scalar::interval_day(v.days, v.seconds),
        LiteralType::Uuid(v) => {
            if v.len() != 16 {
                return Err(SubstraitError::invalid(format!(
                    "uuid literal must be 16 bytes, got {}",
                    v.len()
                )));
            }
            Scalar::Extension {
                kind: ExtensionKind::Uuid,
                storage: Box::new(Scalar::FixedSizeBinary(v.clone())),
            }
        }
        LiteralType::Null(wire_type) => {
            if wire_nullability(wire_type) == Some(Nullability::Required as i32) {
                return Err(SubstraitError::invalid(
                    "null literal of a REQUIRED type",
                ));
            }
            let (data_type, _) = decode_type(wire_type, ext_set)?;
            Scalar::Null(data_type)
        }
        LiteralType::Struct(v) => {
            let mut fields = Vec::with_capacity(v.fields.len());
            let mut values = Vec::with_capacity(v.fields.len());
            for child in &v.fields {
                let value = decode_literal(child, ext_set)?;
                // The child literal's own nullable flag is the field's
                // nullability; a null value forces it regardless.
                let nullable = child.nullable || value.is_null();
                fields.push(Field::new("", value.data_type(), nullable));
                values.push(value);
            }
            Scalar::Struct { fields, values }
        }
        LiteralType::List(v) => {
            if v.values.is_empty() {
                // An empty sequence carries no element samples; the wire form
                // must use empty_list with an explicit element type.
                return Err(SubstraitError::invalid(
                    "list literal with no values and no declared element type",
                ));
            }
            let mut values = Vec::with_capacity(v.values.len());
            let mut nullable = false;
            for child in &v.values {
                let value = decode_literal(child, ext_set)?;
                nullable |= child.nullable || value.is_null();
                values.push(value);
            }
            let element_type = values[0].data_type();
            for value in &values[1..] {
                if value.data_type() != element_type {
                    return Err(SubstraitError::invalid(format!(
                        "list literal mixes element types {element_type} and {}",
                        value.data_type()
                    )));
                }
            }
            Scalar::List {
                field: Box::new(Field::new("item", element_type, nullable)),
                values,
            }
        }
        LiteralType::EmptyList(v) => {
            let element = v
                .r#type
                .as_deref()
                .ok_or_else(|| SubstraitError::invalid("empty list literal with no element type"))?;
            let (data_type, nullable) = decode_type(element, ext_set)?;
            Scalar::List {
                field: Box::new(Field::new("item", data_type, nullable)),
                values: Vec::new(),
            }
        }
        other => {
            return Err(SubstraitError::not_implemented(format!(
                "decoding literal {other:?}"
            )))
        }
    };
    Ok(scalar)
}

fn encode_extension_literal(kind: &ExtensionKind, storage: &Scalar) -> Result<LiteralType> {
    let mismatch = || {
        SubstraitError::invalid(format!(
            "{} scalar with mismatched storage {storage:?}",
            kind.name()
        ))
    };
    match (kind, storage) {
        (ExtensionKind::Uuid, Scalar::FixedSizeBinary(bytes)) => {
            if bytes.len() != 16 {
                return Err(mismatch());
            }
            Ok(LiteralType::Uuid(bytes.clone()))
        }
        (ExtensionKind::FixedChar(_), Scalar::FixedSizeBinary(bytes)) => {
            let value = String::from_utf8(bytes.clone())
                .map_err(|_| SubstraitError::invalid("fixed_char scalar is not valid UTF-8"))?;
            Ok(LiteralType::FixedChar(value))
        }
        (ExtensionKind::VarChar(length), Scalar::Utf8(value)) => Ok(LiteralType::VarChar(
            proto::expression::literal::VarChar {
                value: value.clone(),
                length: *length as u32,
            },
        )),
        (ExtensionKind::IntervalYear, Scalar::FixedSizeList { values, .. }) => {
            match values.as_slice() {
                [Scalar::Int32(years), Scalar::Int32(months)] => Ok(
                    LiteralType::IntervalYearToMonth(
                        proto::expression::literal::IntervalYearToMonth {
                            years: *years,
                            months: *months,
                        },
                    ),
                ),
                _ => Err(mismatch()),
            }
        }
        (ExtensionKind::IntervalDay, Scalar::FixedSizeList { values, .. }) => {
            match values.as_slice() {
                [Scalar::Int32(days), Scalar::Int32(seconds)] => Ok(
                    LiteralType::IntervalDayToSecond(
                        proto::expression::literal::IntervalDayToSecond {
                            days: *days,
                            seconds: *seconds,
                            ..Default::default()
                        },
                    ),
                ),
                _ => Err(mismatch()),
            }
        }
        _ => Err(mismatch()),
    }
}

/// Encode a native scalar as a wire literal.
pub fn encode_literal(scalar: &Scalar, ext_set: &mut ExtensionSet) -> Result<Literal> {
    let literal_type = match scalar {
        Scalar::Null(data_type) => {
            let wire_type = encode_type(data_type, true, ext_set)?;
            return Ok(literal(LiteralType::Null(wire_type), true));
        }
        Scalar::Boolean(v) => LiteralType::Boolean(*v),
        Scalar::Int8(v) => LiteralType::I8(i32::from(*v)),
        Scalar::Int16(v) => LiteralType::I16(i32::from(*v)),
        Scalar::Int32(v) => LiteralType::I32(*v),
        Scalar::Int64(v) => LiteralType::I64(*v),
        Scalar::Float32(v) => LiteralType::Fp32(v.into_inner()),
        Scalar::Float64(v) => LiteralType::Fp64(v.into_inner()),
        Scalar::Utf8(v) => LiteralType::String(v.clone()),
        Scalar::Binary(v) => LiteralType::Binary(v.clone()),
        Scalar::FixedSizeBinary(v) => LiteralType::FixedBinary(v.clone()),
        Scalar::Decimal128 {
            precision,
            scale,
            value,
        } => LiteralType::Decimal(proto::expression::literal::Decimal {
            value: value.to_le_bytes().to_vec(),
            precision: i32::from(*precision),
            scale: i32::from(*scale),
        }),
        Scalar::Date32(v) => LiteralType::Date(*v),
        Scalar::Time64 {
            unit: TimeUnit::Microsecond,
            value,
        } => LiteralType::Time(*value),
        Scalar::Timestamp {
            unit: TimeUnit::Microsecond,
            tz: None,
            value,
        } => LiteralType::Timestamp(*value),
        Scalar::Timestamp {
            unit: TimeUnit::Microsecond,
            tz: Some(_),
            value,
        } => LiteralType::TimestampTz(*value),
        Scalar::Struct { fields, values } => {
            let mut encoded = Vec::with_capacity(values.len());
            for (field, value) in fields.iter().zip(values) {
                let mut child = encode_literal(value, ext_set)?;
                // Field nullability travels on the child literal itself.
                child.nullable = field.nullable || value.is_null();
                encoded.push(child);
            }
            LiteralType::Struct(proto::expression::literal::Struct { fields: encoded })
        }
        Scalar::List { field, values } => {
            if values.is_empty() {
                LiteralType::EmptyList(proto::r#type::List {
                    r#type: Some(Box::new(encode_type(
                        &field.data_type,
                        field.nullable,
                        ext_set,
                    )?)),
                    nullability: Nullability::Nullable as i32,
                    ..Default::default()
                })
            } else {
                let mut encoded = Vec::with_capacity(values.len());
                for value in values {
                    let mut child = encode_literal(value, ext_set)?;
                    child.nullable = field.nullable || value.is_null();
                    encoded.push(child);
                }
                LiteralType::List(proto::expression::literal::List { values: encoded })
            }
        }
        Scalar::Extension { kind, storage } => encode_extension_literal(kind, storage)?,
        Scalar::UInt8(_)
        | Scalar::UInt16(_)
        | Scalar::UInt32(_)
        | Scalar::UInt64(_)
        | Scalar::Date64(_)
        | Scalar::Time64 { .. }
        | Scalar::Timestamp { .. }
        | Scalar::FixedSizeList { .. } => {
            return Err(SubstraitError::not_implemented(format!(
                "encoding scalar of type {} as a wire literal",
                scalar.data_type()
            )))
        }
    };
    Ok(literal(literal_type, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_core::types::DataType;

    fn round_trip(scalar: Scalar) {
        let mut ext = ExtensionSet::default();
        let wire = encode_literal(&scalar, &mut ext).unwrap();
        let back = decode_literal(&wire, &mut ext).unwrap();
        assert_eq!(back, scalar);
    }

    #[test]
    fn core_scalars_round_trip() {
        round_trip(Scalar::Boolean(true));
        round_trip(Scalar::Int8(-5));
        round_trip(Scalar::Int64(i64::MIN));
        round_trip(Scalar::float64(6.125));
        round_trip(Scalar::utf8("hello world"));
        round_trip(Scalar::Binary(vec![0, 1, 2]));
        round_trip(Scalar::FixedSizeBinary(b"zzz".to_vec()));
        round_trip(Scalar::Date32(19_000));
        round_trip(Scalar::Timestamp {
            unit: TimeUnit::Microsecond,
            tz: Some("UTC".to_string()),
            value: 579,
        });
    }

    #[test]
    fn decimal_uses_little_endian_twos_complement() {
        let scalar = Scalar::Decimal128 {
            precision: 38,
            scale: 10,
            value: -123_456_789,
        };
        let mut ext = ExtensionSet::default();
        let wire = encode_literal(&scalar, &mut ext).unwrap();
        match &wire.literal_type {
            Some(LiteralType::Decimal(d)) => {
                assert_eq!(d.value.len(), 16);
                assert_eq!(d.value, (-123_456_789i128).to_le_bytes().to_vec());
            }
            other => panic!("unexpected literal {other:?}"),
        }
        assert_eq!(decode_literal(&wire, &mut ext).unwrap(), scalar);

        let truncated = literal(
            LiteralType::Decimal(proto::expression::literal::Decimal {
                value: vec![1, 2, 3],
                precision: 10,
                scale: 0,
            }),
            false,
        );
        assert!(decode_literal(&truncated, &mut ext).is_err());
    }

    #[test]
    fn extension_scalars_round_trip() {
        round_trip(Scalar::interval_year(34, 3));
        round_trip(Scalar::interval_day(4, 3600));
        round_trip(Scalar::Extension {
            kind: ExtensionKind::Uuid,
            storage: Box::new(Scalar::FixedSizeBinary(vec![7u8; 16])),
        });
        round_trip(Scalar::Extension {
            kind: ExtensionKind::FixedChar(5),
            storage: Box::new(Scalar::FixedSizeBinary(b"hello".to_vec())),
        });
        round_trip(Scalar::Extension {
            kind: ExtensionKind::VarChar(1024),
            storage: Box::new(Scalar::utf8("short")),
        });
    }

    #[test]
    fn empty_list_requires_element_type() {
        let mut ext = ExtensionSet::default();

        // An empty native list encodes through empty_list and keeps its type.
        let empty = Scalar::List {
            field: Box::new(Field::new("item", DataType::Utf8, true)),
            values: Vec::new(),
        };
        let wire = encode_literal(&empty, &mut ext).unwrap();
        assert_eq!(decode_literal(&wire, &mut ext).unwrap(), empty);

        // A bare list literal with no values has no element type to infer.
        let untyped = literal(
            LiteralType::List(proto::expression::literal::List { values: vec![] }),
            false,
        );
        let err = decode_literal(&untyped, &mut ext).unwrap_err();
        assert!(matches!(err, SubstraitError::Invalid(_)), "{err}");
    }

    #[test]
    fn null_of_required_type_is_invalid() {
        let mut ext = ExtensionSet::default();
        let required = literal(
            LiteralType::Null(proto::Type {
                kind: Some(proto::r#type::Kind::I32(proto::r#type::I32 {
                    nullability: Nullability::Required as i32,
                    ..Default::default()
                })),
            }),
            true,
        );
        let err = decode_literal(&required, &mut ext).unwrap_err();
        assert!(matches!(err, SubstraitError::Invalid(_)), "{err}");

        let nullable = literal(
            LiteralType::Null(proto::Type {
                kind: Some(proto::r#type::Kind::I32(proto::r#type::I32 {
                    nullability: Nullability::Nullable as i32,
                    ..Default::default()
                })),
            }),
            true,
        );
        assert_eq!(
            decode_literal(&nullable, &mut ext).unwrap(),
            Scalar::Null(DataType::Int32)
        );
    }

    #[test]
    fn nonempty_list_round_trips() {
        round_trip(Scalar::List {
            field: Box::new(Field::new("item", DataType::Int32, false)),
            values: vec![Scalar::Int32(1), Scalar::Int32(2), Scalar::Int32(3)],
        });
    }

    #[test]
    fn struct_field_nullability_survives_the_wire() {
        // A nullable field holding a non-null value must come back nullable.
        round_trip(Scalar::Struct {
            fields: vec![
                Field::new("", DataType::Int32, true),
                Field::new("", DataType::Utf8, false),
            ],
            values: vec![Scalar::Int32(7), Scalar::utf8("x")],
        });
        round_trip(Scalar::Struct {
            fields: vec![Field::new("", DataType::Int32, true)],
            values: vec![Scalar::Null(DataType::Int32)],
        });
    }

    #[test]
    fn list_element_nullability_survives_the_wire() {
        round_trip(Scalar::List {
            field: Box::new(Field::new("item", DataType::Int32, true)),
            values: vec![Scalar::Int32(1), Scalar::Int32(2)],
        });
        round_trip(Scalar::List {
            field: Box::new(Field::new("item", DataType::Int32, true)),
            values: vec![Scalar::Int32(1), Scalar::Null(DataType::Int32)],
        });
    }

    #[test]
    fn list_with_mixed_element_types_is_invalid() {
        let mut ext = ExtensionSet::default();
        let mixed = literal(
            LiteralType::List(proto::expression::literal::List {
                values: vec![
                    literal(LiteralType::I32(1), false),
                    literal(LiteralType::String("x".to_string()), false),
                ],
            }),
            false,
        );
        let err = decode_literal(&mixed, &mut ext).unwrap_err();
        assert!(matches!(err, SubstraitError::Invalid(_)), "{err}");
    }
}
