//! Strictness behavior for extension declarations that do not resolve
//! against the registry, and named-table resolution through the caller's
//! provider.

use std::sync::Arc;

use substrait::proto;
use substrait::proto::extensions::simple_extension_declaration::{
    ExtensionFunction, MappingType,
};
use substrait::proto::extensions::{SimpleExtensionDeclaration, SimpleExtensionUri};
use substrait::proto::read_rel::local_files::file_or_files;
use substrait::proto::rel::RelType;
use substrait::proto::r#type::{Kind, Nullability};
use substrait::proto::{read_rel, NamedStruct};

use vex_core::plan::{Declaration, FileFormat, NodeOptions, ScanOptions, SinkConsumer};
use vex_core::types::{DataType, Field, Schema};
use vex_substrait::{
    deserialize_plan, ConversionOptions, ConversionStrictness, SubstraitError,
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

fn base_schema(names: &[&str]) -> NamedStruct {
    NamedStruct {
        names: names.iter().map(|s| s.to_string()).collect(),
        r#struct: Some(proto::r#type::Struct {
            types: names.iter().map(|_| i32_wire()).collect(),
            nullability: Nullability::Required as i32,
            ..Default::default()
        }),
    }
}

fn field_ref(index: i32) -> proto::Expression {
    proto::Expression {
        rex_type: Some(proto::expression::RexType::Selection(Box::new(
            proto::expression::FieldReference {
                reference_type: Some(
                    proto::expression::field_reference::ReferenceType::DirectReference(
                        proto::expression::ReferenceSegment {
                            reference_type: Some(
                                proto::expression::reference_segment::ReferenceType::StructField(
                                    Box::new(proto::expression::reference_segment::StructField {
                                        field: index,
                                        child: None,
                                    }),
                                ),
                            ),
                        },
                    ),
                ),
                root_type: Some(
                    proto::expression::field_reference::RootType::RootReference(
                        proto::expression::field_reference::RootReference {},
                    ),
                ),
            },
        ))),
    }
}

fn mystery_call(args: Vec<proto::Expression>) -> proto::Expression {
    proto::Expression {
        rex_type: Some(proto::expression::RexType::ScalarFunction(
            proto::expression::ScalarFunction {
                function_reference: 42,
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

fn local_files_read(filter: Option<proto::Expression>) -> proto::Rel {
    proto::Rel {
        rel_type: Some(RelType::Read(Box::new(proto::ReadRel {
            base_schema: Some(base_schema(&["a", "b"])),
            filter: filter.map(Box::new),
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

/// A plan declaring function anchor 42 as `mystery`, a name no registry
/// resolves.
fn plan_with_mystery_declaration(rel: proto::Rel) -> proto::Plan {
    proto::Plan {
        extension_uris: vec![SimpleExtensionUri {
            extension_uri_anchor: 7,
            uri: "https://example.com/unknown_functions.yaml".to_string(),
        }],
        extensions: vec![SimpleExtensionDeclaration {
            mapping_type: Some(MappingType::ExtensionFunction(ExtensionFunction {
                extension_uri_reference: 7,
                function_anchor: 42,
                name: "mystery".to_string(),
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

fn options(strictness: ConversionStrictness) -> ConversionOptions {
    ConversionOptions {
        strictness,
        ..Default::default()
    }
}

#[test]
fn unreferenced_unresolvable_declaration_fails_both_modes() {
    let plan = plan_with_mystery_declaration(local_files_read(None));
    for strictness in [
        ConversionStrictness::BestEffort,
        ConversionStrictness::ExactRoundtrip,
    ] {
        let err = deserialize_plan(&plan, consumer(), None, &options(strictness)).unwrap_err();
        assert!(matches!(err, SubstraitError::Invalid(_)), "{err}");
    }
}

#[test]
fn referenced_unresolvable_function_defers_only_under_best_effort() {
    // Referenced from a pushed-down scan predicate, which is decoded but
    // never forces resolution.
    let plan = plan_with_mystery_declaration(local_files_read(Some(mystery_call(vec![
        field_ref(0),
    ]))));

    let err = deserialize_plan(
        &plan,
        consumer(),
        None,
        &options(ConversionStrictness::ExactRoundtrip),
    )
    .unwrap_err();
    assert!(matches!(err, SubstraitError::Invalid(_)), "{err}");

    let declaration = deserialize_plan(
        &plan,
        consumer(),
        None,
        &options(ConversionStrictness::BestEffort),
    )
    .unwrap();
    // The deferred call survives under its qualified name.
    let scan = &declaration.inputs[0];
    match &scan.options {
        NodeOptions::Scan(options) => {
            let filter = options.filter.as_ref().unwrap();
            match filter {
                vex_core::expr::Expr::Call(call) => {
                    assert_eq!(
                        call.function,
                        "https://example.com/unknown_functions.yaml#mystery"
                    );
                }
                other => panic!("unexpected filter {other:?}"),
            }
        }
        other => panic!("unexpected options {other:?}"),
    }
}

#[test]
fn deferred_function_still_fails_where_lowering_needs_it() {
    // The same unresolvable call as a filter relation's condition must be
    // typed during lowering, which forces resolution.
    let filter = proto::Rel {
        rel_type: Some(RelType::Filter(Box::new(proto::FilterRel {
            input: Some(Box::new(local_files_read(None))),
            condition: Some(Box::new(mystery_call(vec![field_ref(0)]))),
            ..Default::default()
        }))),
    };
    let plan = plan_with_mystery_declaration(filter);
    let err = deserialize_plan(
        &plan,
        consumer(),
        None,
        &options(ConversionStrictness::BestEffort),
    )
    .unwrap_err();
    assert!(matches!(err, SubstraitError::Invalid(_)), "{err}");
}

fn named_table_read() -> proto::Rel {
    proto::Rel {
        rel_type: Some(RelType::Read(Box::new(proto::ReadRel {
            base_schema: Some(base_schema(&["a", "b"])),
            read_type: Some(read_rel::ReadType::NamedTable(read_rel::NamedTable {
                names: vec!["db".to_string(), "t".to_string()],
                ..Default::default()
            })),
            ..Default::default()
        }))),
    }
}

fn plain_plan(rel: proto::Rel) -> proto::Plan {
    proto::Plan {
        relations: vec![proto::PlanRel {
            rel_type: Some(proto::plan_rel::RelType::Root(proto::RelRoot {
                input: Some(rel),
                names: vec![],
            })),
        }],
        ..Default::default()
    }
}

#[test]
fn named_table_resolves_through_the_provider() {
    let plan = plain_plan(named_table_read());

    // Without a provider the symbolic source cannot be resolved.
    let err = deserialize_plan(&plan, consumer(), None, &ConversionOptions::default())
        .unwrap_err();
    assert!(matches!(err, SubstraitError::Invalid(_)), "{err}");

    let provider_options = ConversionOptions {
        named_table_provider: Some(Arc::new(|names: &[String]| {
            assert_eq!(names, ["db", "t"]);
            Ok(Declaration::leaf(
                "scan",
                NodeOptions::Scan(ScanOptions {
                    schema: Schema::new(vec![
                        Field::new("a", DataType::Int32, true),
                        Field::new("b", DataType::Int32, true),
                    ]),
                    files: vec!["file:///tmp/t.parquet".to_string()],
                    format: FileFormat::Parquet,
                    filter: None,
                }),
            ))
        })),
        ..Default::default()
    };
    let declaration = deserialize_plan(&plan, consumer(), None, &provider_options).unwrap();
    let schema = declaration.output_schema().unwrap();
    assert_eq!(schema.num_fields(), 2);
    assert_eq!(declaration.inputs[0].factory, "scan");
}

#[test]
fn provider_failure_is_reported_not_masked() {
    let plan = plain_plan(named_table_read());
    let failing = ConversionOptions {
        named_table_provider: Some(Arc::new(|names: &[String]| {
            Err(SubstraitError::invalid(format!(
                "table {} does not exist",
                names.join(".")
            )))
        })),
        ..Default::default()
    };
    let err = deserialize_plan(&plan, consumer(), None, &failing).unwrap_err();
    assert!(err.to_string().contains("does not exist"), "{err}");
}
