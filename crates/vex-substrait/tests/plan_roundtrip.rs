//! End-to-end plan conversion tests: wire plans lowered to runnable
//! declarations, native declaration trees serialized back to the wire, and
//! both the binary and JSON forms of the same messages.

use std::sync::Arc;

use prost::Message;
use substrait::proto;
use substrait::proto::extensions::simple_extension_declaration::{
    ExtensionFunction, MappingType,
};
use substrait::proto::extensions::{SimpleExtensionDeclaration, SimpleExtensionUri};
use substrait::proto::read_rel::local_files::file_or_files;
use substrait::proto::rel::RelType;
use substrait::proto::rel_common::EmitKind;
use substrait::proto::r#type::{Kind, Nullability};
use substrait::proto::{read_rel, rel_common, NamedStruct, RelCommon};

use vex_core::expr::{Expr, FieldPath};
use vex_core::plan::{
    AggregateMeasure, AggregateOptions, Declaration, FileFormat, FilterOptions, NodeOptions,
    ProjectOptions, ScanOptions, SinkConsumer,
};
use vex_core::types::{DataType, Field, Schema};
use vex_substrait::expressions::encode_expression;
use vex_substrait::extension::SUBSTRAIT_COMPARISON_FUNCTIONS_URI;
use vex_substrait::{
    deserialize_plan, deserialize_plans, serialize_plan, ConversionOptions, ExtensionSet,
};

#[derive(Debug)]
struct NullConsumer;
impl SinkConsumer for NullConsumer {}

fn consumer() -> Arc<dyn SinkConsumer> {
    Arc::new(NullConsumer)
}

fn i32_wire() -> proto::Type {
    proto::Type {
        kind: Some(Kind::I32(proto::r#type::I32 {
            nullability: Nullability::Nullable as i32,
            ..Default::default()
        })),
    }
}

fn read_rel_with(names: &[&str]) -> proto::Rel {
    proto::Rel {
        rel_type: Some(RelType::Read(Box::new(proto::ReadRel {
            base_schema: Some(NamedStruct {
                names: names.iter().map(|s| s.to_string()).collect(),
                r#struct: Some(proto::r#type::Struct {
                    types: names.iter().map(|_| i32_wire()).collect(),
                    nullability: Nullability::Required as i32,
                    ..Default::default()
                }),
            }),
            read_type: Some(read_rel::ReadType::LocalFiles(read_rel::LocalFiles {
                items: vec![read_rel::local_files::FileOrFiles {
                    path_type: Some(file_or_files::PathType::UriFile(
                        "file:///tmp/dat.parquet".to_string(),
                    )),
                    file_format: Some(file_or_files::FileFormat::Parquet(
                        file_or_files::ParquetReadOptions::default(),
                    )),
                    ..Default::default()
                }],
                ..Default::default()
            })),
            ..Default::default()
        }))),
    }
}

/// Encode an extension-free native expression as its wire form.
fn wire_expr(expr: &Expr) -> proto::Expression {
    let mut scratch = ExtensionSet::default();
    encode_expression(expr, &mut scratch).unwrap()
}

fn anchored_call(anchor: u32, args: Vec<proto::Expression>) -> proto::Expression {
    proto::Expression {
        rex_type: Some(proto::expression::RexType::ScalarFunction(
            proto::expression::ScalarFunction {
                function_reference: anchor,
                arguments: args
                    .into_iter()
                    .map(|value| proto::FunctionArgument {
                        arg_type: Some(proto::function_argument::ArgType::Value(value)),
                    })
                    .collect(),
                ..Default::default()
            },
        )),
    }
}

fn single_root_plan(rel: proto::Rel) -> proto::Plan {
    proto::Plan {
        extension_uris: vec![SimpleExtensionUri {
            extension_uri_anchor: 1,
            uri: SUBSTRAIT_COMPARISON_FUNCTIONS_URI.to_string(),
        }],
        extensions: vec![SimpleExtensionDeclaration {
            mapping_type: Some(MappingType::ExtensionFunction(ExtensionFunction {
                extension_uri_reference: 1,
                function_anchor: 1,
                name: "equal".to_string(),
            })),
        }],
        relations: vec![proto::PlanRel {
            rel_type: Some(proto::plan_rel::RelType::Root(proto::RelRoot {
                input: Some(rel),
                names: vec![],
            })),
        }],
        ..Default::default()
    }
}

/// The read-project-filter shape from the interchange contract: filter
/// `a == b`, project a derived boolean via the registered `equal` function,
/// emit columns [1, 3] of the four natural outputs.
fn read_project_filter_plan() -> proto::Plan {
    let filter = proto::Rel {
        rel_type: Some(RelType::Filter(Box::new(proto::FilterRel {
            input: Some(Box::new(read_rel_with(&["a", "b", "c"]))),
            condition: Some(Box::new(anchored_call(
                1,
                vec![
                    wire_expr(&Expr::field(vec![0])),
                    wire_expr(&Expr::field(vec![1])),
                ],
            ))),
            ..Default::default()
        }))),
    };
    let project = proto::Rel {
        rel_type: Some(RelType::Project(Box::new(proto::ProjectRel {
            common: Some(RelCommon {
                emit_kind: Some(EmitKind::Emit(rel_common::Emit {
                    output_mapping: vec![1, 3],
                })),
                ..Default::default()
            }),
            input: Some(Box::new(filter)),
            expressions: vec![anchored_call(
                1,
                vec![
                    wire_expr(&Expr::field(vec![0])),
                    wire_expr(&Expr::field(vec![2])),
                ],
            )],
            ..Default::default()
        }))),
    };
    single_root_plan(project)
}

fn lower(plan: &proto::Plan) -> Declaration {
    deserialize_plan(plan, consumer(), None, &ConversionOptions::default()).unwrap()
}

#[test]
fn read_project_filter_with_emit_yields_mapped_columns() {
    let declaration = lower(&read_project_filter_plan());
    assert_eq!(declaration.factory, "consuming_sink");

    let schema = declaration.output_schema().unwrap();
    assert_eq!(schema.num_fields(), 2);
    assert_eq!(schema.fields[0].name, "b");
    assert_eq!(schema.fields[0].data_type, DataType::Int32);
    assert_eq!(schema.fields[1].name, "equal");
    assert_eq!(schema.fields[1].data_type, DataType::Boolean);

    // Sink over emit-project over append-project over filter over scan.
    let emit = &declaration.inputs[0];
    assert_eq!(emit.factory, "project");
    let append = &emit.inputs[0];
    assert_eq!(append.factory, "project");
    let filter = &append.inputs[0];
    assert_eq!(filter.factory, "filter");
    let scan = &filter.inputs[0];
    assert_eq!(scan.factory, "scan");
    assert!(scan.inputs.is_empty());

    match &filter.options {
        NodeOptions::Filter(options) => {
            assert_eq!(
                options.predicate,
                Expr::call("equal", vec![Expr::field(vec![0]), Expr::field(vec![1])])
            );
        }
        other => panic!("unexpected options {other:?}"),
    }
}

#[test]
fn binary_wire_form_round_trips() {
    let plan = read_project_filter_plan();
    let bytes = plan.encode_to_vec();
    let reparsed = proto::Plan::decode(bytes.as_slice()).unwrap();
    assert_eq!(reparsed, plan);

    let schema = lower(&reparsed).output_schema().unwrap();
    assert_eq!(schema.fields[1].name, "equal");
}

#[test]
fn json_wire_form_is_an_accepted_alias() {
    let plan = read_project_filter_plan();
    let json = serde_json::to_value(&plan).unwrap();
    let reparsed: proto::Plan = serde_json::from_value(json).unwrap();

    let schema = lower(&reparsed).output_schema().unwrap();
    assert_eq!(schema.fields[0].name, "b");
    assert_eq!(schema.fields[1].name, "equal");
}

fn native_aggregate_plan() -> Declaration {
    let scan = Declaration::leaf(
        "scan",
        NodeOptions::Scan(ScanOptions {
            schema: Schema::new(vec![
                Field::new("region", DataType::Int32, true),
                Field::new("amount", DataType::Int64, true),
            ]),
            files: vec!["file:///tmp/sales.parquet".to_string()],
            format: FileFormat::Parquet,
            filter: None,
        }),
    );
    let filter = Declaration::new(
        "filter",
        NodeOptions::Filter(FilterOptions {
            predicate: Expr::call(
                "greater",
                vec![Expr::field(vec![1]), Expr::Literal(vex_core::scalar::Scalar::Int64(0))],
            ),
        }),
        vec![scan],
    );
    Declaration::new(
        "aggregate",
        NodeOptions::Aggregate(AggregateOptions {
            keys: vec![FieldPath::single(0)],
            measures: vec![AggregateMeasure {
                function: "hash_sum".to_string(),
                target: FieldPath::single(1),
                output_name: "sum".to_string(),
                output_type: DataType::Int64,
            }],
        }),
        vec![filter],
    )
}

#[test]
fn serialize_then_deserialize_preserves_structure() {
    let original = native_aggregate_plan();
    let plan = serialize_plan(std::slice::from_ref(&original), None).unwrap();
    assert_eq!(plan.relations.len(), 1);
    assert!(!plan.extension_uris.is_empty());

    let lowered = deserialize_plans(
        &plan,
        || Some(consumer()),
        None,
        &ConversionOptions::default(),
    )
    .unwrap();
    assert_eq!(lowered.len(), 1);

    let schema = lowered[0].output_schema().unwrap();
    assert_eq!(schema.fields[0].name, "region");
    assert_eq!(schema.fields[1].name, "sum");
    assert_eq!(schema.fields[1].data_type, DataType::Int64);

    // Root names from serialization rename in place through a project.
    let mut node = &lowered[0].inputs[0];
    while node.factory == "project" {
        node = &node.inputs[0];
    }
    assert_eq!(node.factory, "aggregate");
    match &node.options {
        NodeOptions::Aggregate(agg) => {
            assert_eq!(agg.measures[0].function, "hash_sum");
            assert_eq!(agg.keys, vec![FieldPath::single(0)]);
        }
        other => panic!("unexpected options {other:?}"),
    }
    assert_eq!(node.inputs[0].factory, "filter");
    assert_eq!(node.inputs[0].inputs[0].factory, "scan");
}

#[test]
fn serialized_project_drops_the_input_prefix_via_emit() {
    let scan = Declaration::leaf(
        "scan",
        NodeOptions::Scan(ScanOptions {
            schema: Schema::new(vec![
                Field::new("a", DataType::Int32, true),
                Field::new("b", DataType::Int32, true),
            ]),
            files: vec!["file:///tmp/dat.parquet".to_string()],
            format: FileFormat::Parquet,
            filter: None,
        }),
    );
    let project = Declaration::new(
        "project",
        NodeOptions::Project(ProjectOptions {
            exprs: vec![Expr::field(vec![1])],
            names: vec!["b".to_string()],
        }),
        vec![scan],
    );

    let plan = serialize_plan(&[project], None).unwrap();
    let lowered = deserialize_plan(&plan, consumer(), None, &ConversionOptions::default()).unwrap();
    let schema = lowered.output_schema().unwrap();
    assert_eq!(schema.num_fields(), 1);
    assert_eq!(schema.fields[0].name, "b");
}
