//! # Conversion Options
//!
//! Caller-supplied configuration for a single serialize or deserialize pass:
//! the strictness mode and the external capability used to resolve symbolic
//! (named) tables to concrete source declarations.

use std::sync::Arc;

use vex_core::plan::Declaration;

use crate::error::Result;

/// How strictly plan conversion validates inputs it could otherwise defer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionStrictness {
    /// Tolerate declared extension identifiers that cannot currently be
    /// resolved, as long as nothing forces their resolution during lowering.
    #[default]
    BestEffort,
    /// Require every declared extension identifier to resolve so that the
    /// plan can be reproduced exactly.
    ExactRoundtrip,
}

/// External capability mapping a table-name path (e.g. `["db", "t"]`) to a
/// source declaration.
pub type NamedTableProvider =
    Arc<dyn Fn(&[String]) -> Result<Declaration> + Send + Sync>;

/// Options governing one conversion pass.
#[derive(Clone, Default)]
pub struct ConversionOptions {
    pub strictness: ConversionStrictness,
    pub named_table_provider: Option<NamedTableProvider>,
}

impl std::fmt::Debug for ConversionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionOptions")
            .field("strictness", &self.strictness)
            .field(
                "named_table_provider",
                &self.named_table_provider.as_ref().map(|_| "<provider>"),
            )
            .finish()
    }
}
