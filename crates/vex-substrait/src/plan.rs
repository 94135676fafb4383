//! # Plan Assembly
//!
//! Turns whole wire plans into runnable native declarations and back.
//!
//! Deserialization lowers each top-level plan statement through relation
//! lowering, then attaches a sink obtained from a caller-supplied factory
//! (invoked once per statement), yielding one runnable declaration per
//! statement. A write-oriented variant attaches a `write` node built from
//! destination options instead of a sink. Serialization walks a declaration
//! tree, strips the sink, and emits a plan with the extension tables the
//! encoding pass accumulated.

use std::sync::Arc;

use substrait::proto;
use substrait::proto::plan_rel::RelType;
use tracing::debug;
use vex_core::expr::Expr;
use vex_core::plan::{
    Declaration, NodeOptions, ProjectOptions, SinkConsumer, SinkOptions, WriteNodeOptions,
};
use vex_core::types::Schema;

use crate::error::{Result, SubstraitError};
use crate::extension::{ExtensionIdRegistry, ExtensionSet};
use crate::options::ConversionOptions;
use crate::relations::{decode_relation, encode_relation, DeclarationInfo};

fn decode_plan_rel(
    plan_rel: &proto::PlanRel,
    ext_set: &mut ExtensionSet,
    options: &ConversionOptions,
) -> Result<DeclarationInfo> {
    match plan_rel.rel_type.as_ref() {
        Some(RelType::Rel(rel)) => decode_relation(rel, ext_set, options),
        Some(RelType::Root(root)) => {
            let input = root
                .input
                .as_ref()
                .ok_or_else(|| SubstraitError::invalid("plan root with no input"))?;
            let info = decode_relation(input, ext_set, options)?;
            if root.names.is_empty() {
                return Ok(info);
            }
            if root.names.len() != info.schema.num_fields() {
                return Err(SubstraitError::invalid(format!(
                    "plan root declares {} output name(s) for {} column(s)",
                    root.names.len(),
                    info.schema.num_fields()
                )));
            }
            // Root names rename the output columns in place.
            let exprs = (0..info.schema.num_fields() as i32)
                .map(|i| Expr::field(vec![i]))
                .collect();
            let fields = info
                .schema
                .fields
                .iter()
                .zip(&root.names)
                .map(|(field, name)| field.clone().with_name(name))
                .collect();
            Ok(DeclarationInfo {
                declaration: Declaration::new(
                    "project",
                    NodeOptions::Project(ProjectOptions {
                        exprs,
                        names: root.names.clone(),
                    }),
                    vec![info.declaration],
                ),
                schema: Schema::new(fields),
            })
        }
        None => Err(SubstraitError::invalid("plan relation with no rel type")),
    }
}

fn lower_statements(
    plan: &proto::Plan,
    registry: Option<Arc<ExtensionIdRegistry>>,
    options: &ConversionOptions,
) -> Result<Vec<DeclarationInfo>> {
    let mut ext_set = ExtensionSet::from_plan(plan, registry, options)?;
    let mut lowered = Vec::with_capacity(plan.relations.len());
    for plan_rel in &plan.relations {
        lowered.push(decode_plan_rel(plan_rel, &mut ext_set, options)?);
    }
    // Declarations that resolved nothing and were referenced by nothing are
    // rejected even under best-effort conversion.
    ext_set.check_unreferenced()?;
    debug!(statements = lowered.len(), "lowered wire plan");
    Ok(lowered)
}

/// Deserialize a wire plan into one runnable declaration per top-level
/// statement, attaching a sink from `consumer_factory` to each.
///
/// The factory is invoked once per statement; returning `None` is a hard
/// error rather than a silently sinkless plan.
pub fn deserialize_plans<F>(
    plan: &proto::Plan,
    mut consumer_factory: F,
    registry: Option<Arc<ExtensionIdRegistry>>,
    options: &ConversionOptions,
) -> Result<Vec<Declaration>>
where
    F: FnMut() -> Option<Arc<dyn SinkConsumer>>,
{
    let lowered = lower_statements(plan, registry, options)?;
    let mut declarations = Vec::with_capacity(lowered.len());
    for info in lowered {
        let consumer = consumer_factory()
            .ok_or_else(|| SubstraitError::invalid("consumer factory returned no consumer"))?;
        declarations.push(Declaration::new(
            "consuming_sink",
            NodeOptions::ConsumingSink(SinkOptions { consumer }),
            vec![info.declaration],
        ));
    }
    Ok(declarations)
}

/// Deserialize a wire plan with exactly one top-level statement, attaching
/// the already-constructed `consumer`.
pub fn deserialize_plan(
    plan: &proto::Plan,
    consumer: Arc<dyn SinkConsumer>,
    registry: Option<Arc<ExtensionIdRegistry>>,
    options: &ConversionOptions,
) -> Result<Declaration> {
    if plan.relations.len() != 1 {
        return Err(SubstraitError::invalid(format!(
            "a single consumer requires a single-statement plan, got {} statement(s)",
            plan.relations.len()
        )));
    }
    let mut consumer = Some(consumer);
    let mut declarations =
        deserialize_plans(plan, move || consumer.take(), registry, options)?;
    Ok(declarations.remove(0))
}

/// Deserialize a wire plan into write declarations: each statement's lowered
/// relation is wrapped in a `write` node built from the options the factory
/// returns.
pub fn deserialize_into_write_plans<F>(
    plan: &proto::Plan,
    mut write_options_factory: F,
    registry: Option<Arc<ExtensionIdRegistry>>,
    options: &ConversionOptions,
) -> Result<Vec<Declaration>>
where
    F: FnMut() -> Option<WriteNodeOptions>,
{
    let lowered = lower_statements(plan, registry, options)?;
    let mut declarations = Vec::with_capacity(lowered.len());
    for info in lowered {
        let write_options = write_options_factory().ok_or_else(|| {
            SubstraitError::invalid("write options factory returned no options")
        })?;
        declarations.push(Declaration::new(
            "write",
            NodeOptions::Write(write_options),
            vec![info.declaration],
        ));
    }
    Ok(declarations)
}

fn strip_sink(declaration: &Declaration) -> Result<&Declaration> {
    match &declaration.options {
        NodeOptions::ConsumingSink(_) | NodeOptions::Write(_) => {
            declaration.inputs.first().ok_or_else(|| {
                SubstraitError::invalid(format!(
                    "'{}' node has no input to serialize",
                    declaration.factory
                ))
            })
        }
        _ => Ok(declaration),
    }
}

/// Serialize declaration trees (one per statement) as a wire plan. A
/// trailing sink or write node on each tree is stripped; everything below it
/// must be expressible on the wire.
pub fn serialize_plan(
    declarations: &[Declaration],
    registry: Option<Arc<ExtensionIdRegistry>>,
) -> Result<proto::Plan> {
    let mut ext_set = ExtensionSet::new(registry);
    let mut relations = Vec::with_capacity(declarations.len());
    for declaration in declarations {
        let root = strip_sink(declaration)?;
        let schema = root.output_schema()?;
        let rel = encode_relation(root, &mut ext_set)?;
        relations.push(proto::PlanRel {
            rel_type: Some(RelType::Root(proto::RelRoot {
                input: Some(rel),
                names: schema.fields.iter().map(|f| f.name.clone()).collect(),
            })),
        });
    }
    let (extension_uris, extensions) = ext_set.to_extension_lists();
    debug!(
        statements = relations.len(),
        types = ext_set.num_types(),
        functions = ext_set.num_functions(),
        "serialized plan"
    );
    Ok(proto::Plan {
        version: Some(proto::Version {
            minor_number: 53,
            producer: "vex-substrait".to_string(),
            ..Default::default()
        }),
        extension_uris,
        extensions,
        relations,
        ..Default::default()
    })
}
