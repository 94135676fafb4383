//! # Substrait Interchange Layer
//!
//! This crate provides bidirectional conversion between the
//! [Substrait](https://substrait.io/) cross-language query plan
//! representation and the engine's native plan declarations.
//!
//! ## Why Substrait?
//!
//! Substrait is an industry-standard serialization format for query plans.
//! A front end (query planner, another engine, a coordinator in another
//! language) serializes a plan as a Substrait protobuf and hands it over;
//! this crate lowers it into declarations the engine can run, and can emit a
//! wire plan for a native declaration tree going the other way. The JSON
//! mapping of the same protobuf schema is accepted as a textual alias for
//! the binary form.
//!
//! ## Module Overview
//!
//! - **`types`**: wire type ⇄ native [`vex_core::types::DataType`], including
//!   named-struct schema zipping.
//! - **`literals`**: wire literal ⇄ native [`vex_core::scalar::Scalar`].
//! - **`expressions`**: wire expression ⇄ native [`vex_core::expr::Expr`],
//!   with the special-cased core call shapes.
//! - **`extension`**: anchor symbol tables (`ExtensionSet`) and the
//!   longer-lived identifier registry (`ExtensionIdRegistry`).
//! - **`relations`**: relation lowering (read, project, filter, join,
//!   aggregate) with emit remapping, and the reverse encoding.
//! - **`plan`**: whole-plan assembly — sinks, write nodes, root names,
//!   extension declaration tables.
//! - **`options`** / **`error`**: conversion configuration and the error
//!   surface.

pub mod error;
pub mod expressions;
pub mod extension;
pub mod literals;
pub mod options;
pub mod plan;
pub mod relations;
pub mod types;

pub use error::{Result, SubstraitError};
pub use extension::{DecodedFunction, ExtensionIdRegistry, ExtensionSet, Id};
pub use options::{ConversionOptions, ConversionStrictness, NamedTableProvider};
pub use plan::{
    deserialize_into_write_plans, deserialize_plan, deserialize_plans, serialize_plan,
};
pub use relations::{decode_relation, encode_relation, DeclarationInfo};
