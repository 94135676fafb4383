//! # vex-core: Native Plan and Type Definitions for the Vex Columnar Engine
//!
//! This crate defines the engine-facing surface that plan producers (such as the
//! Substrait translation layer in `vex-substrait`) target. It does not execute
//! anything: execution belongs to the engine runtime, which consumes the
//! `Declaration` trees assembled here.
//!
//! ## Module Overview
//!
//! - **`types`**: The closed native type vocabulary (`DataType`), fields and
//!   schemas with key/value metadata, and the extension kinds that back types
//!   with no first-class native representation (UUID, fixed/var-length char,
//!   intervals).
//! - **`scalar`**: Scalar (single-row constant) values, including typed nulls,
//!   decimals, nested struct/list scalars, and extension-typed scalars.
//! - **`expr`**: The scalar expression tree (field paths, literals, calls) and
//!   schema binding -- resolving a field path against a schema and deriving an
//!   expression's output type.
//! - **`plan`**: Plan-node declarations -- a factory tag, operator-specific
//!   options, and input declarations -- plus per-operator output schema
//!   derivation.

pub mod expr;
pub mod plan;
pub mod scalar;
pub mod types;
