//! # Plan-Node Declarations
//!
//! A `Declaration` describes one node of an executable plan: a factory tag
//! naming the operator, an operator-specific options payload, and the node's
//! input declarations. A statement's declarations form a tree with exactly one
//! root (the node with no consumer); the engine runtime turns the tree into
//! running operators.
//!
//! The options payload is a closed tagged union (`NodeOptions`), one variant
//! per supported operator, so consumers can match exhaustively and treat
//! unsupported operators as a compile-time-checked residual case.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::expr::{BindError, Expr, FieldPath};
use crate::types::{DataType, Field, Schema};

/// Errors raised while inspecting a declaration tree.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("malformed plan: {0}")]
    Malformed(String),
}

/// On-disk file formats a scan can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Parquet,
    Ipc,
}

/// Supported join types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

/// Per-key comparison applied by a hash join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKeyCmp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// One aggregate computation within an aggregate node.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateMeasure {
    /// Engine aggregate function name (grouped variant, e.g. `hash_sum`).
    pub function: String,
    /// The input column the aggregate consumes.
    pub target: FieldPath,
    pub output_name: String,
    pub output_type: DataType,
}

/// Opaque handle to a sink that consumes a statement's output. The engine
/// runtime defines concrete consumers; plan producers only thread them
/// through.
pub trait SinkConsumer: fmt::Debug + Send + Sync {}

/// Options for a `write` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteNodeOptions {
    pub base_dir: String,
    pub format: FileFormat,
    pub basename_template: String,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub schema: Schema,
    pub files: Vec<String>,
    pub format: FileFormat,
    /// Predicate pushed down into the scan, bound against `schema`.
    pub filter: Option<Expr>,
}

/// Placeholder source for a table resolved by name through an external
/// catalog or provider.
#[derive(Debug, Clone)]
pub struct NamedTableOptions {
    pub names: Vec<String>,
    pub schema: Schema,
}

/// Computes the node's output columns from scratch: one expression per
/// output column, replacing the input columns entirely.
#[derive(Debug, Clone)]
pub struct ProjectOptions {
    pub exprs: Vec<Expr>,
    pub names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FilterOptions {
    pub predicate: Expr,
}

#[derive(Debug, Clone)]
pub struct HashJoinOptions {
    pub join_type: JoinType,
    pub left_keys: Vec<FieldPath>,
    pub right_keys: Vec<FieldPath>,
    pub key_cmps: Vec<JoinKeyCmp>,
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub keys: Vec<FieldPath>,
    pub measures: Vec<AggregateMeasure>,
}

#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub consumer: Arc<dyn SinkConsumer>,
}

/// Operator-specific options, one variant per supported operator.
#[derive(Debug, Clone)]
pub enum NodeOptions {
    Scan(ScanOptions),
    NamedTable(NamedTableOptions),
    Project(ProjectOptions),
    Filter(FilterOptions),
    HashJoin(HashJoinOptions),
    Aggregate(AggregateOptions),
    ConsumingSink(SinkOptions),
    Write(WriteNodeOptions),
}

/// One node of a plan: factory tag, options, and ordered inputs.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub factory: String,
    pub options: NodeOptions,
    pub inputs: Vec<Declaration>,
}

impl Declaration {
    pub fn new(
        factory: impl Into<String>,
        options: NodeOptions,
        inputs: Vec<Declaration>,
    ) -> Self {
        Declaration {
            factory: factory.into(),
            options,
            inputs,
        }
    }

    pub fn leaf(factory: impl Into<String>, options: NodeOptions) -> Self {
        Declaration::new(factory, options, Vec::new())
    }

    fn input_schema(&self, n: usize) -> Result<Schema, PlanError> {
        self.inputs
            .get(n)
            .ok_or_else(|| {
                PlanError::Malformed(format!(
                    "'{}' node requires input {n} but has {} input(s)",
                    self.factory,
                    self.inputs.len()
                ))
            })?
            .output_schema()
    }

    /// Derive the output schema of this node from its options and inputs.
    pub fn output_schema(&self) -> Result<Schema, PlanError> {
        match &self.options {
            NodeOptions::Scan(scan) => Ok(scan.schema.clone()),
            NodeOptions::NamedTable(table) => Ok(table.schema.clone()),
            NodeOptions::Filter(_) => self.input_schema(0),
            NodeOptions::Project(project) => {
                if project.exprs.len() != project.names.len() {
                    return Err(PlanError::Malformed(format!(
                        "project has {} expression(s) but {} name(s)",
                        project.exprs.len(),
                        project.names.len()
                    )));
                }
                let input = self.input_schema(0)?;
                let mut fields = Vec::with_capacity(project.exprs.len());
                for (expr, name) in project.exprs.iter().zip(&project.names) {
                    let (data_type, nullable) = expr.output_type(&input)?;
                    fields.push(Field::new(name, data_type, nullable));
                }
                Ok(Schema::new(fields))
            }
            NodeOptions::HashJoin(_) => {
                let mut schema = self.input_schema(0)?;
                schema.fields.extend(self.input_schema(1)?.fields);
                Ok(schema)
            }
            NodeOptions::Aggregate(agg) => {
                let input = self.input_schema(0)?;
                let mut fields = Vec::with_capacity(agg.keys.len() + agg.measures.len());
                for key in &agg.keys {
                    fields.push(key.resolve(&input)?);
                }
                for measure in &agg.measures {
                    fields.push(Field::new(
                        &measure.output_name,
                        measure.output_type.clone(),
                        true,
                    ));
                }
                Ok(Schema::new(fields))
            }
            NodeOptions::ConsumingSink(_) | NodeOptions::Write(_) => self.input_schema(0),
        }
    }
}
