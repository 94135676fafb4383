//! # Native Type System
//!
//! The engine's type vocabulary is a closed enum: every column, scalar, and
//! expression result has exactly one `DataType`. Types that the engine supports
//! but that have no first-class representation of their own (UUID, fixed- and
//! var-length character data, calendar intervals) are modeled as extension
//! kinds wrapping a storage type, so downstream kernels only ever see storage
//! representations.
//!
//! Fields and schemas carry optional key/value metadata. Metadata is purely
//! informational to the engine; interchange formats that cannot represent it
//! must reject it rather than drop it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Time resolution for timestamps, times, and durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

/// Calendar interval flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalUnit {
    YearMonth,
    DayTime,
}

/// Extension kinds: engine types represented as a logical tag over a storage
/// type. The storage type is what value payloads actually use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtensionKind {
    /// 128-bit UUID stored as 16 fixed bytes.
    Uuid,
    /// Fixed-length character data of the given length, stored as fixed-size
    /// binary of the same length.
    FixedChar(i32),
    /// Variable-length character data with a declared maximum length, stored
    /// as a plain UTF-8 string.
    VarChar(i32),
    /// Year/month interval stored as a pair of 32-bit integers [years, months].
    IntervalYear,
    /// Day/second interval stored as a pair of 32-bit integers [days, seconds].
    IntervalDay,
}

impl ExtensionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExtensionKind::Uuid => "uuid",
            ExtensionKind::FixedChar(_) => "fixed_char",
            ExtensionKind::VarChar(_) => "varchar",
            ExtensionKind::IntervalYear => "interval_year",
            ExtensionKind::IntervalDay => "interval_day",
        }
    }

    /// The physical type a value of this kind is stored as.
    pub fn storage_type(&self) -> DataType {
        match self {
            ExtensionKind::Uuid => DataType::FixedSizeBinary(16),
            ExtensionKind::FixedChar(length) => DataType::FixedSizeBinary(*length),
            ExtensionKind::VarChar(_) => DataType::Utf8,
            ExtensionKind::IntervalYear | ExtensionKind::IntervalDay => {
                DataType::FixedSizeList(Box::new(Field::new("item", DataType::Int32, false)), 2)
            }
        }
    }
}

/// The closed native type vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// The null type: carries no values, only nulls.
    Null,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Utf8,
    LargeUtf8,
    Binary,
    LargeBinary,
    FixedSizeBinary(i32),
    /// 128-bit decimal with precision and scale.
    Decimal128(u8, i8),
    /// 256-bit decimal with precision and scale.
    Decimal256(u8, i8),
    /// Days since the Unix epoch, 32-bit.
    Date32,
    /// Milliseconds since the Unix epoch, 64-bit.
    Date64,
    Time32(TimeUnit),
    Time64(TimeUnit),
    /// Instant at the given resolution, with an optional IANA/offset timezone.
    Timestamp(TimeUnit, Option<String>),
    Duration(TimeUnit),
    Interval(IntervalUnit),
    List(Box<Field>),
    LargeList(Box<Field>),
    FixedSizeList(Box<Field>, i32),
    Struct(Vec<Field>),
    Map {
        key: Box<Field>,
        value: Box<Field>,
    },
    /// Dictionary-encoded values: (index type, value type).
    Dictionary(Box<DataType>, Box<DataType>),
    Union(Vec<Field>),
    Extension(ExtensionKind),
}

impl DataType {
    /// Child fields of nested types (structs only; list/map children are
    /// reached through their element fields).
    pub fn struct_fields(&self) -> Option<&[Field]> {
        match self {
            DataType::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            DataType::List(_)
                | DataType::LargeList(_)
                | DataType::FixedSizeList(_, _)
                | DataType::Struct(_)
                | DataType::Map { .. }
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A named, typed column (or nested child) with optional metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub metadata: BTreeMap<String, String>,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Field {
            name: name.into(),
            data_type,
            nullable,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// An ordered list of fields with optional schema-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
    pub metadata: BTreeMap<String, String>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Schema {
            fields,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_storage_types() {
        assert_eq!(
            ExtensionKind::FixedChar(3).storage_type(),
            DataType::FixedSizeBinary(3)
        );
        assert_eq!(ExtensionKind::VarChar(1024).storage_type(), DataType::Utf8);
        assert_eq!(
            ExtensionKind::Uuid.storage_type(),
            DataType::FixedSizeBinary(16)
        );
        let interval = ExtensionKind::IntervalYear.storage_type();
        match interval {
            DataType::FixedSizeList(field, 2) => assert_eq!(field.data_type, DataType::Int32),
            other => panic!("unexpected storage type {other:?}"),
        }
    }

    #[test]
    fn schema_lookup() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Int32, true),
            Field::new("b", DataType::Utf8, false),
        ]);
        assert_eq!(schema.index_of("b"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
        assert_eq!(schema.field(0).unwrap().name, "a");
    }
}
