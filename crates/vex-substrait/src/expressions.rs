//! # Expression Codec
//!
//! Converts wire expressions to and from native [`Expr`] trees.
//!
//! A fixed set of call shapes are core wire constructs needing no extension
//! lookup, tried in order before the generic path:
//!
//! - `if_else` / `case_when` map to the wire `if_then` construct (one clause
//!   for `if_else`, several for `case_when` with the conditions packed into a
//!   `make_struct` first argument);
//! - `list_element` maps to a list-offset selector inside a field reference;
//! - `struct_field` maps to struct-field selectors whose base may be either
//!   the plan's input row or the result of another expression.
//!
//! Every other call goes through the [`ExtensionSet`]: decoding resolves the
//! function anchor (keeping the qualified `uri#name` as the function name
//! when resolution is deferred), encoding assigns one.
//!
//! Field references nest one selector message per path step; decoding bounds
//! the walk at [`MAX_REFERENCE_DEPTH`] to avoid unbounded recursion on
//! pathological input.

use substrait::proto;
use substrait::proto::expression::field_reference::{ReferenceType, RootType};
use substrait::proto::expression::reference_segment;
use substrait::proto::expression::{FieldReference, IfThen, ReferenceSegment, RexType, ScalarFunction};
use substrait::proto::function_argument::ArgType;
use substrait::proto::FunctionArgument;
use vex_core::expr::{Call, CallOptions, Expr, FieldPath};
use vex_core::scalar::Scalar;

use crate::error::{Result, SubstraitError};
use crate::extension::ExtensionSet;
use crate::literals::{decode_literal, encode_literal};

/// Maximum number of selector steps in one field reference.
pub const MAX_REFERENCE_DEPTH: usize = 64;

/// One selector step of a field reference.
#[derive(Debug, Clone, Copy)]
enum Step {
    Struct(i32),
    ListElement(i32),
}

/// Decode a wire expression into a native expression.
pub fn decode_expression(wire: &proto::Expression, ext_set: &mut ExtensionSet) -> Result<Expr> {
    let rex_type = wire
        .rex_type
        .as_ref()
        .ok_or_else(|| SubstraitError::invalid("expression with no rex type"))?;

    match rex_type {
        RexType::Literal(lit) => Ok(Expr::Literal(decode_literal(lit, ext_set)?)),
        RexType::Selection(reference) => decode_field_reference(reference, ext_set),
        RexType::ScalarFunction(function) => decode_scalar_function(function, ext_set),
        RexType::IfThen(if_then) => decode_if_then(if_then, ext_set),
        other => Err(SubstraitError::not_implemented(format!(
            "decoding expression {other:?}"
        ))),
    }
}

fn decode_steps(segment: &ReferenceSegment) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    let mut current = Some(segment);
    while let Some(segment) = current {
        if steps.len() >= MAX_REFERENCE_DEPTH {
            return Err(SubstraitError::invalid(format!(
                "field reference exceeds {MAX_REFERENCE_DEPTH} selector steps"
            )));
        }
        match segment.reference_type.as_ref() {
            Some(reference_segment::ReferenceType::StructField(field)) => {
                steps.push(Step::Struct(field.field));
                current = field.child.as_deref();
            }
            Some(reference_segment::ReferenceType::ListElement(element)) => {
                steps.push(Step::ListElement(element.offset));
                current = element.child.as_deref();
            }
            Some(reference_segment::ReferenceType::MapKey(_)) => {
                return Err(SubstraitError::not_implemented(
                    "map-key reference segments",
                ));
            }
            None => {
                return Err(SubstraitError::invalid(
                    "reference segment with no selector",
                ));
            }
        }
    }
    Ok(steps)
}

fn apply_steps(base: Option<Expr>, steps: &[Step]) -> Expr {
    fn flush(base: Option<Expr>, run: Vec<i32>) -> Expr {
        match base {
            None => Expr::field(run),
            Some(base) if run.is_empty() => base,
            Some(base) => Expr::call_with_options(
                "struct_field",
                vec![base],
                CallOptions::StructField(FieldPath::new(run)),
            ),
        }
    }

    let mut base = base;
    let mut run = Vec::new();
    for step in steps {
        match step {
            Step::Struct(index) => run.push(*index),
            Step::ListElement(offset) => {
                let inner = flush(base.take(), std::mem::take(&mut run));
                base = Some(Expr::call(
                    "list_element",
                    vec![inner, Expr::Literal(Scalar::Int32(*offset))],
                ));
            }
        }
    }
    flush(base, run)
}

fn decode_field_reference(
    reference: &FieldReference,
    ext_set: &mut ExtensionSet,
) -> Result<Expr> {
    let segment = match reference.reference_type.as_ref() {
        Some(ReferenceType::DirectReference(segment)) => segment,
        Some(ReferenceType::MaskedReference(_)) => {
            return Err(SubstraitError::not_implemented("masked field references"))
        }
        None => {
            return Err(SubstraitError::invalid(
                "field reference with no reference type",
            ))
        }
    };
    let steps = decode_steps(segment)?;

    let base = match reference.root_type.as_ref() {
        Some(RootType::RootReference(_)) => None,
        // The reference's base is itself an expression result; it must
        // round-trip without collapsing to a plain root reference.
        Some(RootType::Expression(inner)) => Some(decode_expression(inner, ext_set)?),
        Some(RootType::OuterReference(_)) => {
            return Err(SubstraitError::not_implemented("outer field references"))
        }
        None => {
            return Err(SubstraitError::invalid("field reference with no root type"))
        }
    };
    Ok(apply_steps(base, &steps))
}

fn decode_arguments(
    arguments: &[FunctionArgument],
    ext_set: &mut ExtensionSet,
) -> Result<Vec<Expr>> {
    let mut args = Vec::with_capacity(arguments.len());
    for argument in arguments {
        match argument.arg_type.as_ref() {
            Some(ArgType::Value(value)) => args.push(decode_expression(value, ext_set)?),
            Some(other) => {
                return Err(SubstraitError::not_implemented(format!(
                    "non-value function argument {other:?}"
                )))
            }
            None => {
                return Err(SubstraitError::invalid(
                    "function argument with no arg type",
                ))
            }
        }
    }
    Ok(args)
}

fn decode_scalar_function(
    function: &ScalarFunction,
    ext_set: &mut ExtensionSet,
) -> Result<Expr> {
    let decoded = ext_set.decode_function(function.function_reference)?;
    // When resolution is deferred, the qualified identifier stands in for the
    // engine name until something forces resolution.
    let name = decoded
        .engine_name
        .unwrap_or_else(|| decoded.id.to_string());
    let args = decode_arguments(&function.arguments, ext_set)?;
    Ok(Expr::call(name, args))
}

fn decode_if_then(if_then: &IfThen, ext_set: &mut ExtensionSet) -> Result<Expr> {
    if if_then.ifs.is_empty() {
        return Err(SubstraitError::invalid("if_then with no clauses"));
    }
    let otherwise = if_then
        .r#else
        .as_deref()
        .ok_or_else(|| SubstraitError::invalid("if_then with no else branch"))?;
    let otherwise = decode_expression(otherwise, ext_set)?;

    let mut conditions = Vec::with_capacity(if_then.ifs.len());
    let mut values = Vec::with_capacity(if_then.ifs.len());
    for clause in &if_then.ifs {
        let condition = clause
            .r#if
            .as_ref()
            .ok_or_else(|| SubstraitError::invalid("if_then clause with no condition"))?;
        let value = clause
            .then
            .as_ref()
            .ok_or_else(|| SubstraitError::invalid("if_then clause with no value"))?;
        conditions.push(decode_expression(condition, ext_set)?);
        values.push(decode_expression(value, ext_set)?);
    }

    if conditions.len() == 1 {
        let condition = conditions.remove(0);
        let value = values.remove(0);
        return Ok(Expr::call("if_else", vec![condition, value, otherwise]));
    }

    let mut args = Vec::with_capacity(values.len() + 2);
    args.push(Expr::call("make_struct", conditions));
    args.extend(values);
    args.push(otherwise);
    Ok(Expr::call("case_when", args))
}

/// Encode a native expression as a wire expression.
pub fn encode_expression(expr: &Expr, ext_set: &mut ExtensionSet) -> Result<proto::Expression> {
    match expr {
        Expr::Literal(scalar) => Ok(proto::Expression {
            rex_type: Some(RexType::Literal(encode_literal(scalar, ext_set)?)),
        }),
        Expr::Field(path) => encode_selection(None, &struct_steps(path), ext_set),
        Expr::Call(call) => match call.function.as_str() {
            "if_else" => encode_if_else(call, ext_set),
            "case_when" => encode_case_when(call, ext_set),
            "list_element" | "struct_field" => {
                let (base, steps) = gather_selection(expr)?;
                encode_selection(base, &steps, ext_set)
            }
            _ => encode_scalar_function(call, ext_set),
        },
    }
}

fn struct_steps(path: &FieldPath) -> Vec<Step> {
    path.indices().iter().map(|&i| Step::Struct(i)).collect()
}

/// Flatten a chain of `struct_field`/`list_element` calls over a field
/// reference (or an arbitrary base expression) into selector steps.
fn gather_selection(expr: &Expr) -> Result<(Option<&Expr>, Vec<Step>)> {
    match expr {
        Expr::Field(path) => Ok((None, struct_steps(path))),
        Expr::Call(call) if call.function == "list_element" => {
            let (base, index) = match call.args.as_slice() {
                [base, index] => (base, index),
                _ => {
                    return Err(SubstraitError::invalid(format!(
                        "list_element expects 2 arguments, got {}",
                        call.args.len()
                    )))
                }
            };
            let offset = match index {
                Expr::Literal(Scalar::Int32(offset)) => *offset,
                _ => {
                    return Err(SubstraitError::not_implemented(
                        "list_element with a non-literal index",
                    ))
                }
            };
            let (root, mut steps) = gather_or_root(base)?;
            steps.push(Step::ListElement(offset));
            Ok((root, steps))
        }
        Expr::Call(call) if call.function == "struct_field" => {
            let base = match call.args.as_slice() {
                [base] => base,
                _ => {
                    return Err(SubstraitError::invalid(format!(
                        "struct_field expects 1 argument, got {}",
                        call.args.len()
                    )))
                }
            };
            let path = match &call.options {
                Some(CallOptions::StructField(path)) if !path.is_empty() => path,
                _ => {
                    return Err(SubstraitError::invalid(
                        "struct_field call without a selection path",
                    ))
                }
            };
            let (root, mut steps) = gather_or_root(base)?;
            steps.extend(struct_steps(path));
            Ok((root, steps))
        }
        _ => Err(SubstraitError::invalid(format!(
            "expression {expr:?} is not a selection"
        ))),
    }
}

fn gather_or_root(base: &Expr) -> Result<(Option<&Expr>, Vec<Step>)> {
    match base {
        Expr::Field(_) => gather_selection(base),
        Expr::Call(call) if call.function == "list_element" || call.function == "struct_field" => {
            gather_selection(base)
        }
        other => Ok((Some(other), Vec::new())),
    }
}

fn encode_selection(
    base: Option<&Expr>,
    steps: &[Step],
    ext_set: &mut ExtensionSet,
) -> Result<proto::Expression> {
    if steps.is_empty() {
        return Err(SubstraitError::invalid(
            "cannot encode a field reference with no selector steps",
        ));
    }
    if steps.len() > MAX_REFERENCE_DEPTH {
        return Err(SubstraitError::invalid(format!(
            "field reference exceeds {MAX_REFERENCE_DEPTH} selector steps"
        )));
    }

    // Most deeply nested selector last: build the chain from the innermost
    // step outwards.
    let mut child: Option<Box<ReferenceSegment>> = None;
    for step in steps.iter().rev() {
        let reference_type = match step {
            Step::Struct(field) => reference_segment::ReferenceType::StructField(Box::new(
                reference_segment::StructField {
                    field: *field,
                    child: child.take(),
                },
            )),
            Step::ListElement(offset) => reference_segment::ReferenceType::ListElement(Box::new(
                reference_segment::ListElement {
                    offset: *offset,
                    child: child.take(),
                },
            )),
        };
        child = Some(Box::new(ReferenceSegment {
            reference_type: Some(reference_type),
        }));
    }
    let segment = *child.take().ok_or_else(|| {
        SubstraitError::invalid("cannot encode a field reference with no selector steps")
    })?;

    let root_type = match base {
        None => RootType::RootReference(proto::expression::field_reference::RootReference {}),
        Some(base) => RootType::Expression(Box::new(encode_expression(base, ext_set)?)),
    };

    Ok(proto::Expression {
        rex_type: Some(RexType::Selection(Box::new(FieldReference {
            reference_type: Some(ReferenceType::DirectReference(segment)),
            root_type: Some(root_type),
        }))),
    })
}

fn value_argument(expr: proto::Expression) -> FunctionArgument {
    FunctionArgument {
        arg_type: Some(ArgType::Value(expr)),
    }
}

fn encode_if_else(call: &Call, ext_set: &mut ExtensionSet) -> Result<proto::Expression> {
    let (condition, value, otherwise) = match call.args.as_slice() {
        [condition, value, otherwise] => (condition, value, otherwise),
        _ => {
            return Err(SubstraitError::invalid(format!(
                "if_else expects 3 arguments, got {}",
                call.args.len()
            )))
        }
    };
    Ok(proto::Expression {
        rex_type: Some(RexType::IfThen(Box::new(IfThen {
            ifs: vec![proto::expression::if_then::IfClause {
                r#if: Some(encode_expression(condition, ext_set)?),
                then: Some(encode_expression(value, ext_set)?),
            }],
            r#else: Some(Box::new(encode_expression(otherwise, ext_set)?)),
        }))),
    })
}

fn encode_case_when(call: &Call, ext_set: &mut ExtensionSet) -> Result<proto::Expression> {
    let (first, rest) = call.args.split_first().ok_or_else(|| {
        SubstraitError::invalid("case_when expects a make_struct of conditions first")
    })?;
    let conditions = match first {
        Expr::Call(inner) if inner.function == "make_struct" => &inner.args,
        _ => {
            return Err(SubstraitError::invalid(
                "case_when expects a make_struct of conditions first",
            ))
        }
    };
    // One value per condition, plus the trailing else.
    if rest.len() != conditions.len() + 1 {
        return Err(SubstraitError::invalid(format!(
            "case_when with {} condition(s) expects {} value argument(s), got {}",
            conditions.len(),
            conditions.len() + 1,
            rest.len()
        )));
    }
    let (otherwise, values) = rest.split_last().ok_or_else(|| {
        SubstraitError::invalid("case_when expects a trailing else argument")
    })?;

    let mut ifs = Vec::with_capacity(conditions.len());
    for (condition, value) in conditions.iter().zip(values) {
        ifs.push(proto::expression::if_then::IfClause {
            r#if: Some(encode_expression(condition, ext_set)?),
            then: Some(encode_expression(value, ext_set)?),
        });
    }
    Ok(proto::Expression {
        rex_type: Some(RexType::IfThen(Box::new(IfThen {
            ifs,
            r#else: Some(Box::new(encode_expression(otherwise, ext_set)?)),
        }))),
    })
}

fn encode_scalar_function(call: &Call, ext_set: &mut ExtensionSet) -> Result<proto::Expression> {
    let function_reference = ext_set.encode_function(&call.function)?;
    let mut arguments = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        arguments.push(value_argument(encode_expression(arg, ext_set)?));
    }
    Ok(proto::Expression {
        rex_type: Some(RexType::ScalarFunction(ScalarFunction {
            function_reference,
            arguments,
            ..Default::default()
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(expr: Expr) -> Expr {
        let mut encode_set = ExtensionSet::default();
        let wire = encode_expression(&expr, &mut encode_set).unwrap();
        // Decode against a set seeded with the anchors encode assigned.
        let back = decode_expression(&wire, &mut encode_set).unwrap();
        assert_eq!(back, expr);
        back
    }

    #[test]
    fn field_references_round_trip() {
        round_trip(Expr::field(vec![0]));
        round_trip(Expr::field(vec![12, 1, 3]));
    }

    #[test]
    fn whole_row_reference_fails_encode() {
        let mut ext = ExtensionSet::default();
        let err = encode_expression(&Expr::field(Vec::new()), &mut ext).unwrap_err();
        assert!(matches!(err, SubstraitError::Invalid(_)), "{err}");
    }

    #[test]
    fn list_element_shapes_round_trip() {
        round_trip(Expr::call(
            "list_element",
            vec![Expr::field(vec![2]), Expr::Literal(Scalar::Int32(4))],
        ));
        // struct_field over list_element over a struct path.
        round_trip(Expr::call_with_options(
            "struct_field",
            vec![Expr::call(
                "list_element",
                vec![Expr::field(vec![1, 0]), Expr::Literal(Scalar::Int32(2))],
            )],
            CallOptions::StructField(FieldPath::new(vec![3])),
        ));
    }

    #[test]
    fn expression_rooted_reference_round_trips() {
        let branchy = Expr::call(
            "if_else",
            vec![
                Expr::field(vec![0]),
                Expr::field(vec![1]),
                Expr::field(vec![2]),
            ],
        );
        round_trip(Expr::call_with_options(
            "struct_field",
            vec![branchy],
            CallOptions::StructField(FieldPath::new(vec![0])),
        ));
    }

    #[test]
    fn if_then_maps_to_if_else_and_case_when() {
        round_trip(Expr::call(
            "if_else",
            vec![
                Expr::call("equal", vec![Expr::field(vec![0]), Expr::field(vec![1])]),
                Expr::Literal(Scalar::Int32(1)),
                Expr::Literal(Scalar::Int32(0)),
            ],
        ));
        round_trip(Expr::call(
            "case_when",
            vec![
                Expr::call("make_struct", vec![Expr::field(vec![0]), Expr::field(vec![1])]),
                Expr::Literal(Scalar::Int32(1)),
                Expr::Literal(Scalar::Int32(2)),
                Expr::Literal(Scalar::Int32(3)),
            ],
        ));
    }

    #[test]
    fn unregistered_function_fails_encode() {
        let mut ext = ExtensionSet::default();
        let err =
            encode_expression(&Expr::call("frobnicate", vec![]), &mut ext).unwrap_err();
        assert!(matches!(err, SubstraitError::NotImplemented(_)), "{err}");
    }

    #[test]
    fn registered_functions_round_trip_through_anchors() {
        let expr = Expr::call(
            "and",
            vec![
                Expr::call("equal", vec![Expr::field(vec![0]), Expr::field(vec![1])]),
                Expr::call("less", vec![Expr::field(vec![2]), Expr::field(vec![3])]),
            ],
        );
        round_trip(expr);
    }

    #[test]
    fn reference_depth_is_bounded() {
        let deep = Expr::field((0..(MAX_REFERENCE_DEPTH as i32 + 1)).collect::<Vec<_>>());
        let mut ext = ExtensionSet::default();
        let err = encode_expression(&deep, &mut ext).unwrap_err();
        assert!(matches!(err, SubstraitError::Invalid(_)), "{err}");
    }
}
