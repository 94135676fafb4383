//! # Scalar Expression Tree
//!
//! Expressions represent row-wise computations: references to (possibly
//! nested) fields, literal constants, and function calls. They appear inside
//! scan predicates, filter conditions, join comparisons, and projections.
//!
//! ## Field Paths
//!
//! A field reference is an immutable ordered sequence of zero-based indices:
//! `[12, 1]` selects child `1` of top-level field `12`. Paths descend struct
//! levels only; list access is expressed with the `list_element` function.
//!
//! ## Binding
//!
//! `Expr::output_type` binds an expression against a schema: it resolves every
//! field path and derives the result type. Function result types are derived
//! from a closed table of engine functions; calls to functions outside that
//! table fail to bind, which plan producers surface as a validation error
//! before execution.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::scalar::Scalar;
use crate::types::{DataType, Field, Schema};

/// Errors raised while binding an expression against a schema.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("field index {index} out of range for {width} field(s)")]
    FieldOutOfRange { index: i32, width: usize },
    #[error("cannot select child {index} of non-struct type {actual}")]
    NotAStruct { index: i32, actual: DataType },
    #[error("list_element applied to non-list type {actual}")]
    NotAList { actual: DataType },
    #[error("no type derivation for function '{0}'")]
    UnknownFunction(String),
    #[error("function '{function}' expects {expected} argument(s), got {actual}")]
    WrongArity {
        function: String,
        expected: usize,
        actual: usize,
    },
}

/// An ordered sequence of struct-field indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FieldPath(pub Vec<i32>);

impl FieldPath {
    pub fn new(indices: Vec<i32>) -> Self {
        FieldPath(indices)
    }

    pub fn single(index: i32) -> Self {
        FieldPath(vec![index])
    }

    pub fn indices(&self) -> &[i32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve this path against a schema, returning the referenced field.
    pub fn resolve(&self, schema: &Schema) -> Result<Field, BindError> {
        let (first, rest) = match self.0.split_first() {
            Some(split) => split,
            None => {
                // An empty path denotes the whole input row.
                return Ok(Field::new(
                    "",
                    DataType::Struct(schema.fields.clone()),
                    false,
                ));
            }
        };
        let field = field_at(&schema.fields, *first)?;
        resolve_in(field, rest)
    }

    /// Resolve this path against a (struct) type rather than a schema.
    pub fn resolve_type(&self, data_type: &DataType) -> Result<Field, BindError> {
        let field = Field::new("", data_type.clone(), true);
        resolve_in(&field, &self.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{idx}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<i32>> for FieldPath {
    fn from(indices: Vec<i32>) -> Self {
        FieldPath(indices)
    }
}

fn field_at(fields: &[Field], index: i32) -> Result<&Field, BindError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| fields.get(i))
        .ok_or(BindError::FieldOutOfRange {
            index,
            width: fields.len(),
        })
}

fn resolve_in(field: &Field, rest: &[i32]) -> Result<Field, BindError> {
    let mut current = field.clone();
    for &index in rest {
        let children = match &current.data_type {
            DataType::Struct(fields) => fields,
            other => {
                return Err(BindError::NotAStruct {
                    index,
                    actual: other.clone(),
                })
            }
        };
        current = field_at(children, index)?.clone();
    }
    Ok(current)
}

/// Per-call options for functions whose behavior is not fully determined by
/// their value arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallOptions {
    /// The selection path for `struct_field`.
    StructField(FieldPath),
}

/// A named function call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Call {
    pub function: String,
    pub args: Vec<Expr>,
    pub options: Option<CallOptions>,
}

/// A scalar expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a (possibly nested) field of the input row.
    Field(FieldPath),
    /// Constant value.
    Literal(Scalar),
    /// Function call.
    Call(Call),
}

impl Expr {
    pub fn field(indices: impl Into<FieldPath>) -> Self {
        Expr::Field(indices.into())
    }

    pub fn literal(value: Scalar) -> Self {
        Expr::Literal(value)
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(Call {
            function: function.into(),
            args,
            options: None,
        })
    }

    pub fn call_with_options(
        function: impl Into<String>,
        args: Vec<Expr>,
        options: CallOptions,
    ) -> Self {
        Expr::Call(Call {
            function: function.into(),
            args,
            options: Some(options),
        })
    }

    pub fn field_path(&self) -> Option<&FieldPath> {
        match self {
            Expr::Field(path) => Some(path),
            _ => None,
        }
    }

    /// Derive the output type and nullability of this expression when bound
    /// against `schema`.
    pub fn output_type(&self, schema: &Schema) -> Result<(DataType, bool), BindError> {
        match self {
            Expr::Field(path) => {
                let field = path.resolve(schema)?;
                Ok((field.data_type, field.nullable))
            }
            Expr::Literal(scalar) => Ok((scalar.data_type(), scalar.is_null())),
            Expr::Call(call) => call_output_type(call, schema),
        }
    }
}

fn nth_arg_type(call: &Call, schema: &Schema, n: usize) -> Result<(DataType, bool), BindError> {
    let arg = call.args.get(n).ok_or_else(|| BindError::WrongArity {
        function: call.function.clone(),
        expected: n + 1,
        actual: call.args.len(),
    })?;
    arg.output_type(schema)
}

fn call_output_type(call: &Call, schema: &Schema) -> Result<(DataType, bool), BindError> {
    match call.function.as_str() {
        "equal" | "not_equal" | "less" | "less_equal" | "greater" | "greater_equal" | "and"
        | "or" | "not" | "xor" | "is_null" | "is_not_null" => {
            for arg in &call.args {
                arg.output_type(schema)?;
            }
            Ok((DataType::Boolean, true))
        }
        "add" | "subtract" | "multiply" | "divide" | "negate" => nth_arg_type(call, schema, 0),
        // if_else(cond, then, else): typed by its branches.
        "if_else" => nth_arg_type(call, schema, 1),
        // case_when(make_struct(conds...), value..., [else]): typed by its
        // first value branch.
        "case_when" => nth_arg_type(call, schema, 1),
        "list_element" => {
            let (list_type, _) = nth_arg_type(call, schema, 0)?;
            match list_type {
                DataType::List(field)
                | DataType::LargeList(field)
                | DataType::FixedSizeList(field, _) => Ok((field.data_type, field.nullable)),
                actual => Err(BindError::NotAList { actual }),
            }
        }
        "struct_field" => {
            let (base_type, _) = nth_arg_type(call, schema, 0)?;
            let path = match &call.options {
                Some(CallOptions::StructField(path)) => path,
                None => {
                    return Err(BindError::WrongArity {
                        function: call.function.clone(),
                        expected: 1,
                        actual: 0,
                    })
                }
            };
            let field = path.resolve_type(&base_type)?;
            Ok((field.data_type, field.nullable))
        }
        "make_struct" => {
            let mut fields = Vec::with_capacity(call.args.len());
            for arg in &call.args {
                let (data_type, nullable) = arg.output_type(schema)?;
                fields.push(Field::new("", data_type, nullable));
            }
            Ok((DataType::Struct(fields), false))
        }
        other => Err(BindError::UnknownFunction(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Schema};

    fn nested_schema() -> Schema {
        Schema::new(vec![
            Field::new("a", DataType::Int32, true),
            Field::new(
                "s",
                DataType::Struct(vec![
                    Field::new("x", DataType::Utf8, true),
                    Field::new("y", DataType::Boolean, false),
                ]),
                true,
            ),
            Field::new(
                "l",
                DataType::List(Box::new(Field::new("item", DataType::Int64, true))),
                true,
            ),
        ])
    }

    #[test]
    fn resolves_nested_paths() {
        let schema = nested_schema();
        let field = FieldPath::new(vec![1, 1]).resolve(&schema).unwrap();
        assert_eq!(field.name, "y");
        assert_eq!(field.data_type, DataType::Boolean);

        let err = FieldPath::new(vec![0, 1]).resolve(&schema).unwrap_err();
        assert!(matches!(err, BindError::NotAStruct { .. }));

        let err = FieldPath::new(vec![9]).resolve(&schema).unwrap_err();
        assert!(matches!(err, BindError::FieldOutOfRange { .. }));
    }

    #[test]
    fn derives_call_types() {
        let schema = nested_schema();

        let cmp = Expr::call("equal", vec![Expr::field(vec![0]), Expr::field(vec![0])]);
        assert_eq!(cmp.output_type(&schema).unwrap().0, DataType::Boolean);

        let elem = Expr::call(
            "list_element",
            vec![Expr::field(vec![2]), Expr::literal(Scalar::Int32(3))],
        );
        assert_eq!(elem.output_type(&schema).unwrap().0, DataType::Int64);

        let pick = Expr::call_with_options(
            "struct_field",
            vec![Expr::field(vec![1])],
            CallOptions::StructField(FieldPath::single(0)),
        );
        assert_eq!(pick.output_type(&schema).unwrap().0, DataType::Utf8);

        let unknown = Expr::call("frobnicate", vec![]);
        assert!(matches!(
            unknown.output_type(&schema),
            Err(BindError::UnknownFunction(_))
        ));
    }
}
