//! # Type Codec
//!
//! Converts between wire types and the engine's [`DataType`] vocabulary.
//!
//! Decoding is total over the supported wire kinds; encoding is partial:
//! native types with no wire equivalent (64-bit dates, non-microsecond
//! timestamps, 32-bit times, wide decimals, unions, dictionaries, large
//! variable-width types) fail with `NotImplemented` rather than being
//! approximated. Native types outside the core wire vocabulary entirely
//! (null, unsigned integers) round-trip through user-defined type anchors in
//! the [`ExtensionSet`].
//!
//! ## Field names
//!
//! Wire struct types carry no field names. Names arrive separately in a
//! named-struct message as a flat depth-first list, one entry per struct
//! field anywhere in the tree (list and map elements have no name slot).
//! [`decode_schema`] zips that list onto the type tree and fails `Invalid`
//! unless the count matches exactly.

use substrait::proto;
use substrait::proto::r#type::{Kind, Nullability};
use substrait::proto::NamedStruct;
use vex_core::types::{DataType, ExtensionKind, Field, Schema, TimeUnit};

use crate::error::{Result, SubstraitError};
use crate::extension::ExtensionSet;

fn wrap(kind: Kind) -> proto::Type {
    proto::Type { kind: Some(kind) }
}

fn decode_nullability(nullability: i32) -> bool {
    // Unspecified decodes to nullable for conservative round-tripping.
    nullability != Nullability::Required as i32
}

fn encode_nullability(nullable: bool) -> i32 {
    if nullable {
        Nullability::Nullable as i32
    } else {
        Nullability::Required as i32
    }
}

/// The nullability marker carried by a wire type node, if the kind is one we
/// recognize.
pub(crate) fn wire_nullability(wire: &proto::Type) -> Option<i32> {
    match wire.kind.as_ref()? {
        Kind::Bool(t) => Some(t.nullability),
        Kind::I8(t) => Some(t.nullability),
        Kind::I16(t) => Some(t.nullability),
        Kind::I32(t) => Some(t.nullability),
        Kind::I64(t) => Some(t.nullability),
        Kind::Fp32(t) => Some(t.nullability),
        Kind::Fp64(t) => Some(t.nullability),
        Kind::String(t) => Some(t.nullability),
        Kind::Binary(t) => Some(t.nullability),
        Kind::Timestamp(t) => Some(t.nullability),
        Kind::TimestampTz(t) => Some(t.nullability),
        Kind::Date(t) => Some(t.nullability),
        Kind::Time(t) => Some(t.nullability),
        Kind::IntervalYear(t) => Some(t.nullability),
        Kind::IntervalDay(t) => Some(t.nullability),
        Kind::Uuid(t) => Some(t.nullability),
        Kind::FixedChar(t) => Some(t.nullability),
        Kind::Varchar(t) => Some(t.nullability),
        Kind::FixedBinary(t) => Some(t.nullability),
        Kind::Decimal(t) => Some(t.nullability),
        Kind::Struct(t) => Some(t.nullability),
        Kind::List(t) => Some(t.nullability),
        Kind::Map(t) => Some(t.nullability),
        Kind::UserDefined(t) => Some(t.nullability),
        _ => None,
    }
}

/// Decode a wire type into a native type and its nullability.
///
/// Struct fields decoded through this entry point are unnamed; use
/// [`decode_schema`] when a named-struct message supplies field names.
pub fn decode_type(
    wire: &proto::Type,
    ext_set: &mut ExtensionSet,
) -> Result<(DataType, bool)> {
    decode_type_impl(wire, &mut None, ext_set)
}

fn next_name<'a>(
    names: &mut Option<&mut std::slice::Iter<'a, String>>,
) -> Result<&'a str> {
    match names {
        Some(iter) => iter
            .next()
            .map(String::as_str)
            .ok_or_else(|| SubstraitError::invalid("too few field names for schema type tree")),
        None => Ok(""),
    }
}

fn decode_type_impl(
    wire: &proto::Type,
    names: &mut Option<&mut std::slice::Iter<'_, String>>,
    ext_set: &mut ExtensionSet,
) -> Result<(DataType, bool)> {
    let kind = wire
        .kind
        .as_ref()
        .ok_or_else(|| SubstraitError::invalid("wire type with no kind"))?;

    let (data_type, nullability) = match kind {
        Kind::Bool(t) => (DataType::Boolean, t.nullability),
        Kind::I8(t) => (DataType::Int8, t.nullability),
        Kind::I16(t) => (DataType::Int16, t.nullability),
        Kind::I32(t) => (DataType::Int32, t.nullability),
        Kind::I64(t) => (DataType::Int64, t.nullability),
        Kind::Fp32(t) => (DataType::Float32, t.nullability),
        Kind::Fp64(t) => (DataType::Float64, t.nullability),
        Kind::String(t) => (DataType::Utf8, t.nullability),
        Kind::Binary(t) => (DataType::Binary, t.nullability),
        Kind::Timestamp(t) => (DataType::Timestamp(TimeUnit::Microsecond, None), t.nullability),
        Kind::TimestampTz(t) => (
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".to_string())),
            t.nullability,
        ),
        Kind::Date(t) => (DataType::Date32, t.nullability),
        Kind::Time(t) => (DataType::Time64(TimeUnit::Microsecond), t.nullability),
        Kind::IntervalYear(t) => (
            DataType::Extension(ExtensionKind::IntervalYear),
            t.nullability,
        ),
        Kind::IntervalDay(t) => (
            DataType::Extension(ExtensionKind::IntervalDay),
            t.nullability,
        ),
        Kind::Uuid(t) => (DataType::Extension(ExtensionKind::Uuid), t.nullability),
        Kind::FixedChar(t) => (
            DataType::Extension(ExtensionKind::FixedChar(t.length)),
            t.nullability,
        ),
        Kind::Varchar(t) => (
            DataType::Extension(ExtensionKind::VarChar(t.length)),
            t.nullability,
        ),
        Kind::FixedBinary(t) => (DataType::FixedSizeBinary(t.length), t.nullability),
        Kind::Decimal(t) => {
            let precision = u8::try_from(t.precision).map_err(|_| {
                SubstraitError::invalid(format!("decimal precision {} out of range", t.precision))
            })?;
            let scale = i8::try_from(t.scale).map_err(|_| {
                SubstraitError::invalid(format!("decimal scale {} out of range", t.scale))
            })?;
            (DataType::Decimal128(precision, scale), t.nullability)
        }
        Kind::Struct(t) => {
            let mut fields = Vec::with_capacity(t.types.len());
            for child in &t.types {
                let name = next_name(names)?.to_string();
                let (data_type, nullable) = decode_type_impl(child, names, ext_set)?;
                fields.push(Field::new(name, data_type, nullable));
            }
            (DataType::Struct(fields), t.nullability)
        }
        Kind::List(t) => {
            let element = t
                .r#type
                .as_deref()
                .ok_or_else(|| SubstraitError::invalid("list type with no element type"))?;
            let (data_type, nullable) = decode_type_impl(element, names, ext_set)?;
            (
                DataType::List(Box::new(Field::new("item", data_type, nullable))),
                t.nullability,
            )
        }
        Kind::Map(t) => {
            let key = t
                .key
                .as_deref()
                .ok_or_else(|| SubstraitError::invalid("map type with no key type"))?;
            let value = t
                .value
                .as_deref()
                .ok_or_else(|| SubstraitError::invalid("map type with no value type"))?;
            let (key_type, _) = decode_type_impl(key, names, ext_set)?;
            let (value_type, value_nullable) = decode_type_impl(value, names, ext_set)?;
            (
                DataType::Map {
                    key: Box::new(Field::new("key", key_type, false)),
                    value: Box::new(Field::new("value", value_type, value_nullable)),
                },
                t.nullability,
            )
        }
        Kind::UserDefined(t) => {
            let (_, data_type) = ext_set.decode_type(t.type_reference)?;
            (data_type, t.nullability)
        }
        other => {
            return Err(SubstraitError::not_implemented(format!(
                "decoding wire type {other:?}"
            )))
        }
    };

    Ok((data_type, decode_nullability(nullability)))
}

/// Decode a named-struct message into a schema, zipping the flat name list
/// onto the type tree.
pub fn decode_schema(named: &NamedStruct, ext_set: &mut ExtensionSet) -> Result<Schema> {
    let strct = named
        .r#struct
        .as_ref()
        .ok_or_else(|| SubstraitError::invalid("named struct with no type"))?;

    let mut names = named.names.iter();
    let mut fields = Vec::with_capacity(strct.types.len());
    for wire in &strct.types {
        let name = names
            .next()
            .ok_or_else(|| SubstraitError::invalid("too few field names for schema type tree"))?
            .clone();
        let (data_type, nullable) = decode_type_impl(wire, &mut Some(&mut names), ext_set)?;
        fields.push(Field::new(name, data_type, nullable));
    }
    if names.next().is_some() {
        return Err(SubstraitError::invalid(
            "too many field names for schema type tree",
        ));
    }
    Ok(Schema::new(fields))
}

/// Encode a native type as a wire type.
pub fn encode_type(
    data_type: &DataType,
    nullable: bool,
    ext_set: &mut ExtensionSet,
) -> Result<proto::Type> {
    let nullability = encode_nullability(nullable);
    let wire = match data_type {
        DataType::Boolean => wrap(Kind::Bool(proto::r#type::Boolean {
            nullability,
            ..Default::default()
        })),
        DataType::Int8 => wrap(Kind::I8(proto::r#type::I8 {
            nullability,
            ..Default::default()
        })),
        DataType::Int16 => wrap(Kind::I16(proto::r#type::I16 {
            nullability,
            ..Default::default()
        })),
        DataType::Int32 => wrap(Kind::I32(proto::r#type::I32 {
            nullability,
            ..Default::default()
        })),
        DataType::Int64 => wrap(Kind::I64(proto::r#type::I64 {
            nullability,
            ..Default::default()
        })),
        DataType::Float32 => wrap(Kind::Fp32(proto::r#type::Fp32 {
            nullability,
            ..Default::default()
        })),
        DataType::Float64 => wrap(Kind::Fp64(proto::r#type::Fp64 {
            nullability,
            ..Default::default()
        })),
        DataType::Utf8 => wrap(Kind::String(proto::r#type::String {
            nullability,
            ..Default::default()
        })),
        DataType::Binary => wrap(Kind::Binary(proto::r#type::Binary {
            nullability,
            ..Default::default()
        })),
        DataType::FixedSizeBinary(length) => wrap(Kind::FixedBinary(proto::r#type::FixedBinary {
            length: *length,
            nullability,
            ..Default::default()
        })),
        DataType::Decimal128(precision, scale) => wrap(Kind::Decimal(proto::r#type::Decimal {
            precision: i32::from(*precision),
            scale: i32::from(*scale),
            nullability,
            ..Default::default()
        })),
        DataType::Date32 => wrap(Kind::Date(proto::r#type::Date {
            nullability,
            ..Default::default()
        })),
        DataType::Time64(TimeUnit::Microsecond) => wrap(Kind::Time(proto::r#type::Time {
            nullability,
            ..Default::default()
        })),
        DataType::Timestamp(TimeUnit::Microsecond, None) => {
            wrap(Kind::Timestamp(proto::r#type::Timestamp {
                nullability,
                ..Default::default()
            }))
        }
        DataType::Timestamp(TimeUnit::Microsecond, Some(_)) => {
            wrap(Kind::TimestampTz(proto::r#type::TimestampTz {
                nullability,
                ..Default::default()
            }))
        }
        DataType::Extension(kind) => {
            let wire_kind = match kind {
                ExtensionKind::Uuid => Kind::Uuid(proto::r#type::Uuid {
                    nullability,
                    ..Default::default()
                }),
                ExtensionKind::FixedChar(length) => Kind::FixedChar(proto::r#type::FixedChar {
                    length: *length,
                    nullability,
                    ..Default::default()
                }),
                ExtensionKind::VarChar(length) => Kind::Varchar(proto::r#type::VarChar {
                    length: *length,
                    nullability,
                    ..Default::default()
                }),
                ExtensionKind::IntervalYear => Kind::IntervalYear(proto::r#type::IntervalYear {
                    nullability,
                    ..Default::default()
                }),
                ExtensionKind::IntervalDay => Kind::IntervalDay(proto::r#type::IntervalDay {
                    nullability,
                    ..Default::default()
                }),
            };
            wrap(wire_kind)
        }
        DataType::Struct(fields) => {
            let mut types = Vec::with_capacity(fields.len());
            for field in fields {
                types.push(encode_type(&field.data_type, field.nullable, ext_set)?);
            }
            wrap(Kind::Struct(proto::r#type::Struct {
                types,
                nullability,
                ..Default::default()
            }))
        }
        DataType::List(field) => wrap(Kind::List(Box::new(proto::r#type::List {
            r#type: Some(Box::new(encode_type(
                &field.data_type,
                field.nullable,
                ext_set,
            )?)),
            nullability,
            ..Default::default()
        }))),
        DataType::Map { key, value } => wrap(Kind::Map(Box::new(proto::r#type::Map {
            key: Some(Box::new(encode_type(&key.data_type, false, ext_set)?)),
            value: Some(Box::new(encode_type(
                &value.data_type,
                value.nullable,
                ext_set,
            )?)),
            nullability,
            ..Default::default()
        }))),
        DataType::Null
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let anchor = ext_set.encode_type(data_type)?;
            wrap(Kind::UserDefined(proto::r#type::UserDefined {
                type_reference: anchor,
                nullability,
                ..Default::default()
            }))
        }
        DataType::Float16
        | DataType::LargeUtf8
        | DataType::LargeBinary
        | DataType::Decimal256(_, _)
        | DataType::Date64
        | DataType::Time32(_)
        | DataType::Time64(_)
        | DataType::Timestamp(_, _)
        | DataType::Duration(_)
        | DataType::Interval(_)
        | DataType::LargeList(_)
        | DataType::FixedSizeList(_, _)
        | DataType::Dictionary(_, _)
        | DataType::Union(_) => {
            return Err(SubstraitError::not_implemented(format!(
                "encoding native type {data_type} as a wire type"
            )))
        }
    };
    Ok(wire)
}

fn reject_metadata(field: &Field) -> Result<()> {
    if !field.metadata.is_empty() {
        return Err(SubstraitError::invalid(format!(
            "field '{}' carries metadata, which has no wire representation",
            field.name
        )));
    }
    if let DataType::Struct(children) = &field.data_type {
        for child in children {
            reject_metadata(child)?;
        }
    }
    Ok(())
}

fn collect_field_names(name: &str, data_type: &DataType, out: &mut Vec<String>) {
    out.push(name.to_string());
    match data_type {
        DataType::Struct(fields) => {
            for field in fields {
                collect_field_names(&field.name, &field.data_type, out);
            }
        }
        DataType::List(element) | DataType::LargeList(element) => {
            // The element itself has no name slot; structs beneath it do.
            collect_nested_names(&element.data_type, out);
        }
        DataType::Map { key, value } => {
            collect_nested_names(&key.data_type, out);
            collect_nested_names(&value.data_type, out);
        }
        _ => {}
    }
}

fn collect_nested_names(data_type: &DataType, out: &mut Vec<String>) {
    match data_type {
        DataType::Struct(fields) => {
            for field in fields {
                collect_field_names(&field.name, &field.data_type, out);
            }
        }
        DataType::List(element) | DataType::LargeList(element) => {
            collect_nested_names(&element.data_type, out);
        }
        DataType::Map { key, value } => {
            collect_nested_names(&key.data_type, out);
            collect_nested_names(&value.data_type, out);
        }
        _ => {}
    }
}

/// Encode a schema as a named-struct message.
///
/// Fails `Invalid` if the schema or any field in the tree carries metadata:
/// the wire format cannot represent it and dropping it silently would be a
/// lossy round-trip.
pub fn encode_schema(schema: &Schema, ext_set: &mut ExtensionSet) -> Result<NamedStruct> {
    if !schema.metadata.is_empty() {
        return Err(SubstraitError::invalid(
            "schema carries metadata, which has no wire representation",
        ));
    }
    let mut names = Vec::new();
    let mut types = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        reject_metadata(field)?;
        collect_field_names(&field.name, &field.data_type, &mut names);
        types.push(encode_type(&field.data_type, field.nullable, ext_set)?);
    }
    Ok(NamedStruct {
        names,
        r#struct: Some(proto::r#type::Struct {
            types,
            nullability: Nullability::Required as i32,
            ..Default::default()
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn i32_type(nullability: Nullability) -> proto::Type {
        wrap(Kind::I32(proto::r#type::I32 {
            nullability: nullability as i32,
            ..Default::default()
        }))
    }

    fn named(names: &[&str], types: Vec<proto::Type>) -> NamedStruct {
        NamedStruct {
            names: names.iter().map(|s| s.to_string()).collect(),
            r#struct: Some(proto::r#type::Struct {
                types,
                nullability: Nullability::Required as i32,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn unspecified_nullability_decodes_nullable() {
        let mut ext = ExtensionSet::default();
        let (_, nullable) = decode_type(&i32_type(Nullability::Unspecified), &mut ext).unwrap();
        assert!(nullable);
        let (_, nullable) = decode_type(&i32_type(Nullability::Required), &mut ext).unwrap();
        assert!(!nullable);
    }

    #[test]
    fn schema_name_count_must_match_exactly() {
        let mut ext = ExtensionSet::default();
        let types = || {
            vec![
                i32_type(Nullability::Nullable),
                wrap(Kind::Struct(proto::r#type::Struct {
                    types: vec![i32_type(Nullability::Nullable)],
                    nullability: Nullability::Nullable as i32,
                    ..Default::default()
                })),
            ]
        };

        let schema = decode_schema(&named(&["a", "s", "x"], types()), &mut ext).unwrap();
        assert_eq!(schema.fields[1].name, "s");
        assert_eq!(
            schema.fields[1].data_type,
            DataType::Struct(vec![Field::new("x", DataType::Int32, true)])
        );

        let err = decode_schema(&named(&["a", "s"], types()), &mut ext).unwrap_err();
        assert!(matches!(err, SubstraitError::Invalid(_)), "{err}");

        let err = decode_schema(&named(&["a", "s", "x", "extra"], types()), &mut ext).unwrap_err();
        assert!(matches!(err, SubstraitError::Invalid(_)), "{err}");
    }

    #[test]
    fn unsupported_native_types_fail_encode() {
        let mut ext = ExtensionSet::default();
        for data_type in [
            DataType::Date64,
            DataType::Timestamp(TimeUnit::Nanosecond, None),
            DataType::Time32(TimeUnit::Second),
            DataType::Decimal256(76, 0),
            DataType::Union(vec![]),
            DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
        ] {
            let err = encode_type(&data_type, true, &mut ext).unwrap_err();
            assert!(matches!(err, SubstraitError::NotImplemented(_)), "{data_type}");
        }
    }

    #[test]
    fn unsigned_types_round_trip_through_user_defined_anchors() {
        let mut ext = ExtensionSet::default();
        let wire = encode_type(&DataType::UInt32, true, &mut ext).unwrap();
        assert!(matches!(wire.kind, Some(Kind::UserDefined(_))));
        let (decoded, nullable) = decode_type(&wire, &mut ext).unwrap();
        assert_eq!(decoded, DataType::UInt32);
        assert!(nullable);
    }

    #[test]
    fn metadata_is_rejected_anywhere_in_the_tree() {
        let mut ext = ExtensionSet::default();
        let mut metadata = BTreeMap::new();
        metadata.insert("origin".to_string(), "test".to_string());

        let schema = Schema::new(vec![Field::new("a", DataType::Int32, true)])
            .with_metadata(metadata.clone());
        assert!(encode_schema(&schema, &mut ext).is_err());

        let nested = Schema::new(vec![Field::new(
            "s",
            DataType::Struct(vec![
                Field::new("x", DataType::Int32, true).with_metadata(metadata)
            ]),
            true,
        )]);
        assert!(encode_schema(&nested, &mut ext).is_err());

        let clean = Schema::new(vec![Field::new("a", DataType::Int32, true)]);
        assert!(encode_schema(&clean, &mut ext).is_ok());
    }

    #[test]
    fn interval_and_char_types_use_core_wire_kinds() {
        let mut ext = ExtensionSet::default();
        for (kind, expect) in [
            (ExtensionKind::Uuid, "Uuid"),
            (ExtensionKind::FixedChar(3), "FixedChar"),
            (ExtensionKind::VarChar(1024), "Varchar"),
            (ExtensionKind::IntervalYear, "IntervalYear"),
            (ExtensionKind::IntervalDay, "IntervalDay"),
        ] {
            let wire = encode_type(&DataType::Extension(kind), true, &mut ext).unwrap();
            let debug = format!("{:?}", wire.kind);
            assert!(debug.contains(expect), "{debug}");
            let (decoded, _) = decode_type(&wire, &mut ext).unwrap();
            assert_eq!(decoded, DataType::Extension(kind));
        }
        // No anchors were needed for any of these.
        assert_eq!(ext.num_types(), 0);
    }
}
