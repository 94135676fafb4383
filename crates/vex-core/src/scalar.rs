//! # Scalar Values
//!
//! A `Scalar` is a single constant value tagged with enough type information to
//! recover its `DataType`. Scalars appear as literals inside expressions and as
//! pushed-down predicate constants.
//!
//! Floating-point payloads use `OrderedFloat` so scalars can participate in
//! `Eq`/`Hash` contexts (expression deduplication, test assertions on plans).

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::types::{DataType, ExtensionKind, Field, TimeUnit};

/// A single constant value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scalar {
    /// A null of the given type. The type is carried so that a null scalar is
    /// still well-typed.
    Null(DataType),
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(OrderedFloat<f32>),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    Binary(Vec<u8>),
    /// Fixed-size binary; the byte length is the type's fixed size.
    FixedSizeBinary(Vec<u8>),
    Decimal128 {
        precision: u8,
        scale: i8,
        value: i128,
    },
    /// Days since the Unix epoch.
    Date32(i32),
    /// Milliseconds since the Unix epoch.
    Date64(i64),
    Time64 {
        unit: TimeUnit,
        value: i64,
    },
    Timestamp {
        unit: TimeUnit,
        tz: Option<String>,
        value: i64,
    },
    Struct {
        fields: Vec<Field>,
        values: Vec<Scalar>,
    },
    List {
        /// Element field; present even when `values` is empty.
        field: Box<Field>,
        values: Vec<Scalar>,
    },
    FixedSizeList {
        field: Box<Field>,
        values: Vec<Scalar>,
    },
    /// A value of an extension-kind type, holding its storage representation.
    Extension {
        kind: ExtensionKind,
        storage: Box<Scalar>,
    },
}

impl Scalar {
    pub fn utf8(value: impl Into<String>) -> Self {
        Scalar::Utf8(value.into())
    }

    pub fn float32(value: f32) -> Self {
        Scalar::Float32(OrderedFloat(value))
    }

    pub fn float64(value: f64) -> Self {
        Scalar::Float64(OrderedFloat(value))
    }

    /// A year/month interval scalar.
    pub fn interval_year(years: i32, months: i32) -> Self {
        Scalar::Extension {
            kind: ExtensionKind::IntervalYear,
            storage: Box::new(interval_storage(years, months)),
        }
    }

    /// A day/second interval scalar.
    pub fn interval_day(days: i32, seconds: i32) -> Self {
        Scalar::Extension {
            kind: ExtensionKind::IntervalDay,
            storage: Box::new(interval_storage(days, seconds)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null(_))
    }

    /// The type of this scalar.
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Null(data_type) => data_type.clone(),
            Scalar::Boolean(_) => DataType::Boolean,
            Scalar::Int8(_) => DataType::Int8,
            Scalar::Int16(_) => DataType::Int16,
            Scalar::Int32(_) => DataType::Int32,
            Scalar::Int64(_) => DataType::Int64,
            Scalar::UInt8(_) => DataType::UInt8,
            Scalar::UInt16(_) => DataType::UInt16,
            Scalar::UInt32(_) => DataType::UInt32,
            Scalar::UInt64(_) => DataType::UInt64,
            Scalar::Float32(_) => DataType::Float32,
            Scalar::Float64(_) => DataType::Float64,
            Scalar::Utf8(_) => DataType::Utf8,
            Scalar::Binary(_) => DataType::Binary,
            Scalar::FixedSizeBinary(bytes) => DataType::FixedSizeBinary(bytes.len() as i32),
            Scalar::Decimal128 {
                precision, scale, ..
            } => DataType::Decimal128(*precision, *scale),
            Scalar::Date32(_) => DataType::Date32,
            Scalar::Date64(_) => DataType::Date64,
            Scalar::Time64 { unit, .. } => DataType::Time64(*unit),
            Scalar::Timestamp { unit, tz, .. } => DataType::Timestamp(*unit, tz.clone()),
            Scalar::Struct { fields, .. } => DataType::Struct(fields.clone()),
            Scalar::List { field, .. } => DataType::List(field.clone()),
            Scalar::FixedSizeList { field, values } => {
                DataType::FixedSizeList(field.clone(), values.len() as i32)
            }
            Scalar::Extension { kind, .. } => DataType::Extension(*kind),
        }
    }
}

fn interval_storage(a: i32, b: i32) -> Scalar {
    Scalar::FixedSizeList {
        field: Box::new(Field::new("item", DataType::Int32, false)),
        values: vec![Scalar::Int32(a), Scalar::Int32(b)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_data_types() {
        assert_eq!(Scalar::Int64(7).data_type(), DataType::Int64);
        assert_eq!(
            Scalar::FixedSizeBinary(b"zzz".to_vec()).data_type(),
            DataType::FixedSizeBinary(3)
        );
        assert_eq!(
            Scalar::Null(DataType::Boolean).data_type(),
            DataType::Boolean
        );
        assert_eq!(
            Scalar::interval_year(34, 3).data_type(),
            DataType::Extension(ExtensionKind::IntervalYear)
        );
    }

    #[test]
    fn floats_are_hashable() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Scalar::float64(1.5));
        set.insert(Scalar::float64(1.5));
        assert_eq!(set.len(), 1);
    }
}
