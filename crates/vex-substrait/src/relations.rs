//! # Relation Lowering
//!
//! Converts wire relation nodes into native plan declarations and back. Each
//! supported relation kind is handled by a pure function from wire node plus
//! schema context to a [`DeclarationInfo`]; the dispatch is a single
//! exhaustive match, so an unsupported kind is an explicit `NotImplemented`
//! case rather than a fallback branch.
//!
//! ## Emit remapping
//!
//! Every relation may carry an output mapping in its common metadata: a list
//! of column indices that reorders, subsets, or duplicates the node's natural
//! output. Lowering applies it uniformly by wrapping the natural declaration
//! in a project declaration selecting the mapped columns. Absence (or an
//! explicit direct emit) means identity.

use std::collections::HashSet;

use substrait::proto;
use substrait::proto::read_rel::local_files::file_or_files;
use substrait::proto::rel::RelType;
use substrait::proto::rel_common::EmitKind;
use substrait::proto::{aggregate_rel, read_rel, rel_common, AggregationPhase, RelCommon};
use tracing::debug;
use vex_core::expr::{Expr, FieldPath};
use vex_core::plan::{
    AggregateMeasure, AggregateOptions, Declaration, FileFormat, FilterOptions, HashJoinOptions,
    JoinKeyCmp, JoinType, NodeOptions, ProjectOptions, ScanOptions,
};
use vex_core::types::{DataType, Field, Schema};

use crate::error::{Result, SubstraitError};
use crate::expressions::{decode_expression, encode_expression};
use crate::extension::ExtensionSet;
use crate::options::ConversionOptions;
use crate::types::{decode_schema, decode_type, encode_schema, encode_type};

/// A lowered declaration together with its output schema (after any emit
/// remapping).
#[derive(Debug, Clone)]
pub struct DeclarationInfo {
    pub declaration: Declaration,
    pub schema: Schema,
}

/// Decode a wire relation tree into a native declaration.
pub fn decode_relation(
    rel: &proto::Rel,
    ext_set: &mut ExtensionSet,
    options: &ConversionOptions,
) -> Result<DeclarationInfo> {
    let rel_type = rel
        .rel_type
        .as_ref()
        .ok_or_else(|| SubstraitError::invalid("relation with no rel type"))?;

    match rel_type {
        RelType::Read(read) => decode_read(read, ext_set, options),
        RelType::Filter(filter) => decode_filter(filter, ext_set, options),
        RelType::Project(project) => decode_project(project, ext_set, options),
        RelType::Join(join) => decode_join(join, ext_set, options),
        RelType::Aggregate(aggregate) => decode_aggregate(aggregate, ext_set, options),
        other => Err(SubstraitError::not_implemented(format!(
            "decoding relation {other:?}"
        ))),
    }
}

fn apply_emit(common: Option<&RelCommon>, info: DeclarationInfo) -> Result<DeclarationInfo> {
    let mapping = match common.and_then(|c| c.emit_kind.as_ref()) {
        None | Some(EmitKind::Direct(_)) => return Ok(info),
        Some(EmitKind::Emit(emit)) => &emit.output_mapping,
    };
    debug!(mapping = ?mapping, "applying output mapping");

    let mut exprs = Vec::with_capacity(mapping.len());
    let mut names = Vec::with_capacity(mapping.len());
    let mut fields = Vec::with_capacity(mapping.len());
    for &index in mapping {
        let field = usize::try_from(index)
            .ok()
            .and_then(|i| info.schema.field(i))
            .ok_or_else(|| {
                SubstraitError::invalid(format!(
                    "output mapping index {index} out of range for {} column(s)",
                    info.schema.num_fields()
                ))
            })?;
        exprs.push(Expr::field(vec![index]));
        names.push(field.name.clone());
        fields.push(field.clone());
    }
    Ok(DeclarationInfo {
        declaration: Declaration::new(
            "project",
            NodeOptions::Project(ProjectOptions { exprs, names }),
            vec![info.declaration],
        ),
        schema: Schema::new(fields),
    })
}

fn decode_read(
    read: &proto::ReadRel,
    ext_set: &mut ExtensionSet,
    options: &ConversionOptions,
) -> Result<DeclarationInfo> {
    let base_schema = read
        .base_schema
        .as_ref()
        .ok_or_else(|| SubstraitError::invalid("read relation with no base schema"))?;
    let schema = decode_schema(base_schema, ext_set)?;

    // Pushed-down scan predicates are advisory; they are decoded but not
    // bound here, so a deferred function in one survives best-effort
    // conversion.
    let filter = read
        .filter
        .as_deref()
        .map(|f| decode_expression(f, ext_set))
        .transpose()?;

    let info = match read.read_type.as_ref() {
        Some(read_rel::ReadType::LocalFiles(local)) => {
            let mut files = Vec::with_capacity(local.items.len());
            let mut format: Option<FileFormat> = None;
            for item in &local.items {
                let path = match item.path_type.as_ref() {
                    Some(file_or_files::PathType::UriFile(path)) => path.clone(),
                    Some(other) => {
                        return Err(SubstraitError::not_implemented(format!(
                            "path kind {other:?} (only uri_file is supported)"
                        )))
                    }
                    None => {
                        return Err(SubstraitError::invalid("file item with no path"))
                    }
                };
                let item_format = match item.file_format.as_ref() {
                    Some(file_or_files::FileFormat::Parquet(_)) => FileFormat::Parquet,
                    Some(file_or_files::FileFormat::Arrow(_)) => FileFormat::Ipc,
                    Some(other) => {
                        return Err(SubstraitError::not_implemented(format!(
                            "file format {other:?}"
                        )))
                    }
                    None => {
                        return Err(SubstraitError::invalid("file item with no format"))
                    }
                };
                match format {
                    None => format = Some(item_format),
                    Some(existing) if existing == item_format => {}
                    Some(existing) => {
                        return Err(SubstraitError::invalid(format!(
                            "mixed file formats in one read: {existing:?} and {item_format:?}"
                        )))
                    }
                }
                files.push(path);
            }
            let format = format
                .ok_or_else(|| SubstraitError::invalid("local files read with no files"))?;
            DeclarationInfo {
                declaration: Declaration::leaf(
                    "scan",
                    NodeOptions::Scan(ScanOptions {
                        schema: schema.clone(),
                        files,
                        format,
                        filter,
                    }),
                ),
                schema,
            }
        }
        Some(read_rel::ReadType::NamedTable(table)) => {
            let provider = options.named_table_provider.as_ref().ok_or_else(|| {
                SubstraitError::invalid(
                    "plan contains a named table but no named table provider was supplied",
                )
            })?;
            let declaration = provider(&table.names)?;
            let schema = declaration.output_schema()?;
            let declaration = match filter {
                Some(predicate) => Declaration::new(
                    "filter",
                    NodeOptions::Filter(FilterOptions { predicate }),
                    vec![declaration],
                ),
                None => declaration,
            };
            DeclarationInfo {
                declaration,
                schema,
            }
        }
        Some(other) => {
            return Err(SubstraitError::not_implemented(format!(
                "read source {other:?}"
            )))
        }
        None => return Err(SubstraitError::invalid("read relation with no source")),
    };
    apply_emit(read.common.as_ref(), info)
}

fn decode_filter(
    filter: &proto::FilterRel,
    ext_set: &mut ExtensionSet,
    options: &ConversionOptions,
) -> Result<DeclarationInfo> {
    let input = filter
        .input
        .as_deref()
        .ok_or_else(|| SubstraitError::invalid("filter relation with no input"))?;
    let input = decode_relation(input, ext_set, options)?;

    let condition = filter
        .condition
        .as_deref()
        .ok_or_else(|| SubstraitError::invalid("filter relation with no condition"))?;
    let predicate = decode_expression(condition, ext_set)?;
    let (data_type, _) = predicate.output_type(&input.schema)?;
    if data_type != DataType::Boolean {
        return Err(SubstraitError::invalid(format!(
            "filter condition has type {data_type}, expected Boolean"
        )));
    }

    let info = DeclarationInfo {
        declaration: Declaration::new(
            "filter",
            NodeOptions::Filter(FilterOptions { predicate }),
            vec![input.declaration],
        ),
        schema: input.schema,
    };
    apply_emit(filter.common.as_ref(), info)
}

fn project_column_name(expr: &Expr, input: &Schema) -> String {
    match expr {
        Expr::Field(path) => path
            .resolve(input)
            .ok()
            .map(|field| field.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "field".to_string()),
        Expr::Literal(_) => "literal".to_string(),
        Expr::Call(call) => call.function.clone(),
    }
}

fn disambiguate(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    for suffix in 1.. {
        let candidate = format!("{base}_{suffix}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
    }
    unreachable!()
}

fn decode_project(
    project: &proto::ProjectRel,
    ext_set: &mut ExtensionSet,
    options: &ConversionOptions,
) -> Result<DeclarationInfo> {
    let input = project
        .input
        .as_deref()
        .ok_or_else(|| SubstraitError::invalid("project relation with no input"))?;
    let input = decode_relation(input, ext_set, options)?;

    // The wire project appends its expressions after the input columns; the
    // identity prefix makes that explicit in the native declaration.
    let width = input.schema.num_fields();
    let mut used: HashSet<String> = input
        .schema
        .fields
        .iter()
        .map(|f| f.name.clone())
        .collect();
    let mut exprs = Vec::with_capacity(width + project.expressions.len());
    let mut names = Vec::with_capacity(width + project.expressions.len());
    let mut fields = input.schema.fields.clone();
    for (i, field) in input.schema.fields.iter().enumerate() {
        exprs.push(Expr::field(vec![i as i32]));
        names.push(field.name.clone());
    }
    for expression in &project.expressions {
        let expr = decode_expression(expression, ext_set)?;
        let (data_type, nullable) = expr.output_type(&input.schema)?;
        let name = disambiguate(project_column_name(&expr, &input.schema), &mut used);
        fields.push(Field::new(&name, data_type, nullable));
        names.push(name);
        exprs.push(expr);
    }

    let info = DeclarationInfo {
        declaration: Declaration::new(
            "project",
            NodeOptions::Project(ProjectOptions { exprs, names }),
            vec![input.declaration],
        ),
        schema: Schema::new(fields),
    };
    apply_emit(project.common.as_ref(), info)
}

fn join_key_cmp(function: &str) -> Option<JoinKeyCmp> {
    match function {
        "equal" => Some(JoinKeyCmp::Eq),
        "not_equal" => Some(JoinKeyCmp::NotEq),
        "less" => Some(JoinKeyCmp::Lt),
        "less_equal" => Some(JoinKeyCmp::LtEq),
        "greater" => Some(JoinKeyCmp::Gt),
        "greater_equal" => Some(JoinKeyCmp::GtEq),
        _ => None,
    }
}

fn flip_cmp(cmp: JoinKeyCmp) -> JoinKeyCmp {
    match cmp {
        JoinKeyCmp::Eq => JoinKeyCmp::Eq,
        JoinKeyCmp::NotEq => JoinKeyCmp::NotEq,
        JoinKeyCmp::Lt => JoinKeyCmp::Gt,
        JoinKeyCmp::LtEq => JoinKeyCmp::GtEq,
        JoinKeyCmp::Gt => JoinKeyCmp::Lt,
        JoinKeyCmp::GtEq => JoinKeyCmp::LtEq,
    }
}

fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::Call(call) if call.function == "and" => {
            for arg in &call.args {
                collect_conjuncts(arg, out);
            }
        }
        other => out.push(other),
    }
}

/// Split a field path rooted at the joined (left ++ right) row into its side
/// and a side-relative path.
fn split_join_side(path: &FieldPath, left_width: usize) -> Result<(bool, FieldPath)> {
    let indices = path.indices();
    let first = *indices
        .first()
        .ok_or_else(|| SubstraitError::invalid("join comparison references the whole row"))?;
    if (first as usize) < left_width {
        Ok((true, path.clone()))
    } else {
        let mut shifted = indices.to_vec();
        shifted[0] = first - left_width as i32;
        Ok((false, FieldPath::new(shifted)))
    }
}

fn decode_join(
    join: &proto::JoinRel,
    ext_set: &mut ExtensionSet,
    options: &ConversionOptions,
) -> Result<DeclarationInfo> {
    let left = join
        .left
        .as_deref()
        .ok_or_else(|| SubstraitError::invalid("join relation with no left input"))?;
    let right = join
        .right
        .as_deref()
        .ok_or_else(|| SubstraitError::invalid("join relation with no right input"))?;
    let left = decode_relation(left, ext_set, options)?;
    let right = decode_relation(right, ext_set, options)?;

    let join_type = match join.r#type {
        t if t == proto::join_rel::JoinType::Inner as i32 => JoinType::Inner,
        t if t == proto::join_rel::JoinType::Left as i32 => JoinType::Left,
        t if t == proto::join_rel::JoinType::Right as i32 => JoinType::Right,
        t if t == proto::join_rel::JoinType::Outer as i32 => JoinType::Full,
        t if t == proto::join_rel::JoinType::Unspecified as i32 => {
            return Err(SubstraitError::invalid("join relation with no join type"))
        }
        other => {
            return Err(SubstraitError::not_implemented(format!(
                "join type {other}"
            )))
        }
    };

    let expression = join
        .expression
        .as_deref()
        .ok_or_else(|| SubstraitError::invalid("join relation with no expression"))?;
    let expression = decode_expression(expression, ext_set)?;

    let mut comparisons = Vec::new();
    collect_conjuncts(&expression, &mut comparisons);

    let left_width = left.schema.num_fields();
    let mut left_keys = Vec::with_capacity(comparisons.len());
    let mut right_keys = Vec::with_capacity(comparisons.len());
    let mut key_cmps = Vec::with_capacity(comparisons.len());
    for comparison in comparisons {
        let call = match comparison {
            Expr::Call(call) if call.args.len() == 2 => call,
            other => {
                return Err(SubstraitError::invalid(format!(
                    "join comparison {other:?} is not a binary comparison"
                )))
            }
        };
        let cmp = join_key_cmp(&call.function).ok_or_else(|| {
            SubstraitError::invalid(format!(
                "'{}' is not a supported join key comparison",
                call.function
            ))
        })?;
        let (a, b) = match (call.args[0].field_path(), call.args[1].field_path()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(SubstraitError::invalid(
                    "join comparison operands must be column references",
                ))
            }
        };
        let (a_left, a_path) = split_join_side(a, left_width)?;
        let (b_left, b_path) = split_join_side(b, left_width)?;
        let (left_path, right_path, cmp) = match (a_left, b_left) {
            (true, false) => (a_path, b_path, cmp),
            (false, true) => (b_path, a_path, flip_cmp(cmp)),
            _ => {
                return Err(SubstraitError::invalid(
                    "join comparison must compare one left column against one right column",
                ))
            }
        };
        // Bind both sides now; an out-of-range key must not survive lowering.
        left_path.resolve(&left.schema)?;
        right_path.resolve(&right.schema)?;
        left_keys.push(left_path);
        right_keys.push(right_path);
        key_cmps.push(cmp);
    }

    let mut schema = left.schema.clone();
    schema.fields.extend(right.schema.fields.clone());

    let info = DeclarationInfo {
        declaration: Declaration::new(
            "hashjoin",
            NodeOptions::HashJoin(HashJoinOptions {
                join_type,
                left_keys,
                right_keys,
                key_cmps,
            }),
            vec![left.declaration, right.declaration],
        ),
        schema,
    };

    let info = match join.post_join_filter.as_deref() {
        Some(condition) => {
            let predicate = decode_expression(condition, ext_set)?;
            let (data_type, _) = predicate.output_type(&info.schema)?;
            if data_type != DataType::Boolean {
                return Err(SubstraitError::invalid(format!(
                    "post-join filter has type {data_type}, expected Boolean"
                )));
            }
            DeclarationInfo {
                declaration: Declaration::new(
                    "filter",
                    NodeOptions::Filter(FilterOptions { predicate }),
                    vec![info.declaration],
                ),
                schema: info.schema,
            }
        }
        None => info,
    };
    apply_emit(join.common.as_ref(), info)
}

fn measure_output_type(
    function: &proto::AggregateFunction,
    engine_name: &str,
    target: &FieldPath,
    input: &Schema,
    ext_set: &mut ExtensionSet,
) -> Result<DataType> {
    if let Some(wire_type) = function.output_type.as_ref() {
        let (data_type, _) = decode_type(wire_type, ext_set)?;
        return Ok(data_type);
    }
    // Older producers omit the declared output type; fall back to the
    // engine's derivation for the functions we know.
    match engine_name {
        "sum" | "min" | "max" => Ok(target.resolve(input)?.data_type),
        "count" => Ok(DataType::Int64),
        "mean" => Ok(DataType::Float64),
        other => Err(SubstraitError::invalid(format!(
            "aggregate '{other}' declares no output type"
        ))),
    }
}

fn decode_aggregate(
    aggregate: &proto::AggregateRel,
    ext_set: &mut ExtensionSet,
    options: &ConversionOptions,
) -> Result<DeclarationInfo> {
    let input = aggregate
        .input
        .as_deref()
        .ok_or_else(|| SubstraitError::invalid("aggregate relation with no input"))?;
    let input = decode_relation(input, ext_set, options)?;

    if aggregate.groupings.len() > 1 {
        return Err(SubstraitError::not_implemented(
            "aggregation with multiple grouping sets",
        ));
    }

    let mut keys = Vec::new();
    if let Some(grouping) = aggregate.groupings.first() {
        let mut key_exprs = Vec::new();
        if grouping.expression_references.is_empty() {
            // Pre-v0.36 producers inline the keys per grouping instead of
            // referencing the relation-level expression list.
            #[allow(deprecated)]
            for expression in &grouping.grouping_expressions {
                key_exprs.push(decode_expression(expression, ext_set)?);
            }
        } else {
            for &reference in &grouping.expression_references {
                let expression = aggregate
                    .grouping_expressions
                    .get(reference as usize)
                    .ok_or_else(|| {
                        SubstraitError::invalid(format!(
                            "grouping expression reference {reference} out of range"
                        ))
                    })?;
                key_exprs.push(decode_expression(expression, ext_set)?);
            }
        }
        for expr in key_exprs {
            let path = expr.field_path().cloned().ok_or_else(|| {
                SubstraitError::invalid(
                    "group-by keys must be direct field references",
                )
            })?;
            path.resolve(&input.schema)?;
            keys.push(path);
        }
    }

    let mut measures = Vec::with_capacity(aggregate.measures.len());
    let mut used: HashSet<String> = HashSet::new();
    for measure in &aggregate.measures {
        if measure.filter.is_some() {
            return Err(SubstraitError::not_implemented(
                "aggregate measures with a filter",
            ));
        }
        let function = measure
            .measure
            .as_ref()
            .ok_or_else(|| SubstraitError::invalid("aggregate measure with no function"))?;
        if function.invocation
            == proto::aggregate_function::AggregationInvocation::Distinct as i32
        {
            return Err(SubstraitError::not_implemented(
                "distinct aggregate invocation",
            ));
        }
        if function.phase != AggregationPhase::InitialToResult as i32 {
            return Err(SubstraitError::not_implemented(format!(
                "aggregation phase {} (only initial-to-result is supported)",
                function.phase
            )));
        }
        if function.arguments.is_empty() {
            // A bare legacy `args` list is a missing input, not a default.
            return Err(SubstraitError::not_implemented(
                "aggregate function with no arguments",
            ));
        }
        if function.arguments.len() != 1 {
            return Err(SubstraitError::not_implemented(
                "aggregate functions with more than one argument",
            ));
        }
        let argument = match function.arguments[0].arg_type.as_ref() {
            Some(proto::function_argument::ArgType::Value(value)) => {
                decode_expression(value, ext_set)?
            }
            _ => {
                return Err(SubstraitError::invalid(
                    "aggregate argument must be a value expression",
                ))
            }
        };
        let target = argument.field_path().cloned().ok_or_else(|| {
            SubstraitError::invalid("aggregate arguments must be direct field references")
        })?;

        let decoded = ext_set.decode_function(function.function_reference)?;
        // Translating to the grouped variant requires a resolved name even
        // under best-effort conversion.
        let engine_name = decoded.engine_name.ok_or_else(|| {
            SubstraitError::invalid(format!(
                "aggregate function {} does not resolve against the registry",
                decoded.id
            ))
        })?;
        let output_type =
            measure_output_type(function, &engine_name, &target, &input.schema, ext_set)?;
        let output_name = disambiguate(engine_name.clone(), &mut used);
        measures.push(AggregateMeasure {
            function: format!("hash_{engine_name}"),
            target,
            output_name,
            output_type,
        });
    }

    let mut fields = Vec::with_capacity(keys.len() + measures.len());
    for key in &keys {
        fields.push(key.resolve(&input.schema)?);
    }
    for measure in &measures {
        fields.push(Field::new(
            &measure.output_name,
            measure.output_type.clone(),
            true,
        ));
    }

    let info = DeclarationInfo {
        declaration: Declaration::new(
            "aggregate",
            NodeOptions::Aggregate(AggregateOptions { keys, measures }),
            vec![input.declaration],
        ),
        schema: Schema::new(fields),
    };
    apply_emit(aggregate.common.as_ref(), info)
}

fn direct_common() -> RelCommon {
    RelCommon {
        emit_kind: Some(EmitKind::Direct(rel_common::Direct {})),
        ..Default::default()
    }
}

fn emit_common(mapping: Vec<i32>) -> RelCommon {
    RelCommon {
        emit_kind: Some(EmitKind::Emit(rel_common::Emit {
            output_mapping: mapping,
        })),
        ..Default::default()
    }
}

/// Encode a native declaration tree as a wire relation.
pub fn encode_relation(
    declaration: &Declaration,
    ext_set: &mut ExtensionSet,
) -> Result<proto::Rel> {
    let rel_type = match &declaration.options {
        NodeOptions::Scan(scan) => {
            let base_schema = encode_schema(&scan.schema, ext_set)?;
            let filter = scan
                .filter
                .as_ref()
                .map(|f| encode_expression(f, ext_set))
                .transpose()?
                .map(Box::new);
            let items = scan
                .files
                .iter()
                .map(|path| read_rel::local_files::FileOrFiles {
                    path_type: Some(file_or_files::PathType::UriFile(path.clone())),
                    file_format: Some(match scan.format {
                        FileFormat::Parquet => file_or_files::FileFormat::Parquet(
                            file_or_files::ParquetReadOptions::default(),
                        ),
                        FileFormat::Ipc => file_or_files::FileFormat::Arrow(
                            file_or_files::ArrowReadOptions::default(),
                        ),
                    }),
                    ..Default::default()
                })
                .collect();
            RelType::Read(Box::new(proto::ReadRel {
                common: Some(direct_common()),
                base_schema: Some(base_schema),
                filter,
                read_type: Some(read_rel::ReadType::LocalFiles(read_rel::LocalFiles {
                    items,
                    ..Default::default()
                })),
                ..Default::default()
            }))
        }
        NodeOptions::NamedTable(table) => {
            let base_schema = encode_schema(&table.schema, ext_set)?;
            RelType::Read(Box::new(proto::ReadRel {
                common: Some(direct_common()),
                base_schema: Some(base_schema),
                read_type: Some(read_rel::ReadType::NamedTable(read_rel::NamedTable {
                    names: table.names.clone(),
                    ..Default::default()
                })),
                ..Default::default()
            }))
        }
        NodeOptions::Filter(filter) => {
            let input = input_relation(declaration, 0, ext_set)?;
            RelType::Filter(Box::new(proto::FilterRel {
                common: Some(direct_common()),
                input: Some(Box::new(input)),
                condition: Some(Box::new(encode_expression(&filter.predicate, ext_set)?)),
                ..Default::default()
            }))
        }
        NodeOptions::Project(project) => {
            // The native project replaces its input columns; the wire project
            // appends, so emit drops the input prefix.
            let input_width = declaration
                .inputs
                .first()
                .ok_or_else(|| SubstraitError::invalid("project node with no input"))?
                .output_schema()?
                .num_fields() as i32;
            let input = input_relation(declaration, 0, ext_set)?;
            let mut expressions = Vec::with_capacity(project.exprs.len());
            for expr in &project.exprs {
                expressions.push(encode_expression(expr, ext_set)?);
            }
            let mapping = (0..project.exprs.len() as i32)
                .map(|i| input_width + i)
                .collect();
            RelType::Project(Box::new(proto::ProjectRel {
                common: Some(emit_common(mapping)),
                input: Some(Box::new(input)),
                expressions,
                ..Default::default()
            }))
        }
        NodeOptions::HashJoin(join) => {
            let left_width = declaration
                .inputs
                .first()
                .ok_or_else(|| SubstraitError::invalid("join node with no left input"))?
                .output_schema()?
                .num_fields() as i32;
            let left = input_relation(declaration, 0, ext_set)?;
            let right = input_relation(declaration, 1, ext_set)?;

            if join.left_keys.len() != join.right_keys.len()
                || join.left_keys.len() != join.key_cmps.len()
            {
                return Err(SubstraitError::invalid(
                    "join key and comparison lists must have equal length",
                ));
            }
            let mut comparisons = Vec::with_capacity(join.key_cmps.len());
            for ((left_key, right_key), cmp) in join
                .left_keys
                .iter()
                .zip(&join.right_keys)
                .zip(&join.key_cmps)
            {
                let function = match cmp {
                    JoinKeyCmp::Eq => "equal",
                    JoinKeyCmp::NotEq => "not_equal",
                    JoinKeyCmp::Lt => "less",
                    JoinKeyCmp::LtEq => "less_equal",
                    JoinKeyCmp::Gt => "greater",
                    JoinKeyCmp::GtEq => "greater_equal",
                };
                let mut shifted = right_key.indices().to_vec();
                let first = shifted.first_mut().ok_or_else(|| {
                    SubstraitError::invalid("join key with an empty field path")
                })?;
                *first += left_width;
                comparisons.push(Expr::call(
                    function,
                    vec![
                        Expr::Field(left_key.clone()),
                        Expr::field(shifted),
                    ],
                ));
            }
            let expression = match comparisons.len() {
                0 => return Err(SubstraitError::invalid("join node with no keys")),
                1 => comparisons.remove(0),
                _ => Expr::call("and", comparisons),
            };
            let join_type = match join.join_type {
                JoinType::Inner => proto::join_rel::JoinType::Inner,
                JoinType::Left => proto::join_rel::JoinType::Left,
                JoinType::Right => proto::join_rel::JoinType::Right,
                JoinType::Full => proto::join_rel::JoinType::Outer,
            };
            RelType::Join(Box::new(proto::JoinRel {
                common: Some(direct_common()),
                left: Some(Box::new(left)),
                right: Some(Box::new(right)),
                expression: Some(Box::new(encode_expression(&expression, ext_set)?)),
                r#type: join_type as i32,
                ..Default::default()
            }))
        }
        NodeOptions::Aggregate(agg) => {
            let input_schema = declaration
                .inputs
                .first()
                .ok_or_else(|| SubstraitError::invalid("aggregate node with no input"))?
                .output_schema()?;
            let input = input_relation(declaration, 0, ext_set)?;

            let mut grouping_expressions = Vec::with_capacity(agg.keys.len());
            let mut expression_references = Vec::with_capacity(agg.keys.len());
            for (i, key) in agg.keys.iter().enumerate() {
                grouping_expressions
                    .push(encode_expression(&Expr::Field(key.clone()), ext_set)?);
                expression_references.push(i as u32);
            }

            let mut measures = Vec::with_capacity(agg.measures.len());
            for measure in &agg.measures {
                let engine_name = measure
                    .function
                    .strip_prefix("hash_")
                    .unwrap_or(&measure.function);
                let function_reference = ext_set.encode_function(engine_name)?;
                measure.target.resolve(&input_schema)?;
                let output_type = encode_type(&measure.output_type, true, ext_set)?;
                measures.push(aggregate_rel::Measure {
                    measure: Some(proto::AggregateFunction {
                        function_reference,
                        arguments: vec![proto::FunctionArgument {
                            arg_type: Some(proto::function_argument::ArgType::Value(
                                encode_expression(&Expr::Field(measure.target.clone()), ext_set)?,
                            )),
                        }],
                        output_type: Some(output_type),
                        phase: AggregationPhase::InitialToResult as i32,
                        invocation: proto::aggregate_function::AggregationInvocation::All as i32,
                        ..Default::default()
                    }),
                    filter: None,
                });
            }

            RelType::Aggregate(Box::new(proto::AggregateRel {
                common: Some(direct_common()),
                input: Some(Box::new(input)),
                groupings: vec![aggregate_rel::Grouping {
                    expression_references,
                    ..Default::default()
                }],
                measures,
                grouping_expressions,
                ..Default::default()
            }))
        }
        NodeOptions::ConsumingSink(_) | NodeOptions::Write(_) => {
            return Err(SubstraitError::invalid(format!(
                "'{}' node has no wire representation",
                declaration.factory
            )))
        }
    };
    Ok(proto::Rel {
        rel_type: Some(rel_type),
    })
}

fn input_relation(
    declaration: &Declaration,
    n: usize,
    ext_set: &mut ExtensionSet,
) -> Result<proto::Rel> {
    let input = declaration.inputs.get(n).ok_or_else(|| {
        SubstraitError::invalid(format!(
            "'{}' node requires input {n} but has {} input(s)",
            declaration.factory,
            declaration.inputs.len()
        ))
    })?;
    encode_relation(input, ext_set)
}
