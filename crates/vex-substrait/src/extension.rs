//! # Extension Identifiers, Registry, and Per-Plan Extension Set
//!
//! Substrait refers to functions and non-core types through small integer
//! *anchors* declared at the top of a plan; each anchor stands for a
//! globally-qualified `(uri, name)` identifier. Two structures manage them:
//!
//! - [`ExtensionIdRegistry`] is long-lived and chainable: it maps qualified
//!   identifiers to engine function names and native types. A registry may
//!   delegate unresolved lookups to a parent, so callers can override or
//!   extend the built-in defaults without mutating them.
//! - [`ExtensionSet`] is a per-plan symbol table, created for one serialize or
//!   deserialize pass and discarded afterwards. While serializing it assigns
//!   anchors in first-use order; while deserializing it is seeded from the
//!   plan's extension declarations and consulted by anchor.
//!
//! Anchors are never resolved through implicit global state: every codec call
//! takes its extension set explicitly.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use substrait::proto;
use substrait::proto::extensions::simple_extension_declaration::{
    ExtensionFunction, ExtensionType, MappingType,
};
use substrait::proto::extensions::{SimpleExtensionDeclaration, SimpleExtensionUri};
use vex_core::types::DataType;

use crate::error::{Result, SubstraitError};
use crate::options::{ConversionOptions, ConversionStrictness};

/// URI of the engine's own extension-type definitions, used for native types
/// with no core Substrait representation (null, unsigned integers).
pub const VEX_EXTENSION_TYPES_URI: &str =
    "https://github.com/vex-engine/vex/blob/main/format/substrait/extension_types.yaml";

pub const SUBSTRAIT_ARITHMETIC_FUNCTIONS_URI: &str =
    "https://github.com/substrait-io/substrait/blob/main/extensions/functions_arithmetic.yaml";
pub const SUBSTRAIT_COMPARISON_FUNCTIONS_URI: &str =
    "https://github.com/substrait-io/substrait/blob/main/extensions/functions_comparison.yaml";
pub const SUBSTRAIT_BOOLEAN_FUNCTIONS_URI: &str =
    "https://github.com/substrait-io/substrait/blob/main/extensions/functions_boolean.yaml";
pub const SUBSTRAIT_AGGREGATE_GENERIC_FUNCTIONS_URI: &str =
    "https://github.com/substrait-io/substrait/blob/main/extensions/functions_aggregate_generic.yaml";

/// A globally-qualified extension identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id {
    pub uri: String,
    pub name: String,
}

impl Id {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Id {
            uri: uri.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.uri, self.name)
    }
}

/// Long-lived, chainable mapping from qualified identifiers to engine
/// function names and native types.
///
/// Lookups are pure and walk the parent chain; registration mutates only the
/// registry it is called on.
#[derive(Debug, Default)]
pub struct ExtensionIdRegistry {
    parent: Option<Arc<ExtensionIdRegistry>>,
    functions: HashMap<Id, String>,
    function_ids: HashMap<String, Id>,
    types: HashMap<Id, DataType>,
    type_ids: HashMap<DataType, Id>,
}

impl ExtensionIdRegistry {
    /// An empty registry with no parent. Lookups resolve nothing until
    /// mappings are registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry that delegates unresolved lookups to `parent`.
    pub fn nested(parent: Arc<ExtensionIdRegistry>) -> Self {
        ExtensionIdRegistry {
            parent: Some(parent),
            ..Self::default()
        }
    }

    /// The built-in registry: the standard Substrait function URIs for
    /// arithmetic, comparison, boolean, and generic aggregate functions, plus
    /// the engine extension-type URI for natives with no core wire type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();

        for (name, data_type) in [
            ("null", DataType::Null),
            ("u8", DataType::UInt8),
            ("u16", DataType::UInt16),
            ("u32", DataType::UInt32),
            ("u64", DataType::UInt64),
        ] {
            registry.add_type(Id::new(VEX_EXTENSION_TYPES_URI, name), data_type);
        }

        for (name, engine) in [
            ("add", "add"),
            ("subtract", "subtract"),
            ("multiply", "multiply"),
            ("divide", "divide"),
            ("negate", "negate"),
            ("sum", "sum"),
            ("avg", "mean"),
            ("min", "min"),
            ("max", "max"),
        ] {
            registry.add_function(Id::new(SUBSTRAIT_ARITHMETIC_FUNCTIONS_URI, name), engine);
        }

        for (name, engine) in [
            ("equal", "equal"),
            ("not_equal", "not_equal"),
            ("lt", "less"),
            ("lte", "less_equal"),
            ("gt", "greater"),
            ("gte", "greater_equal"),
        ] {
            registry.add_function(Id::new(SUBSTRAIT_COMPARISON_FUNCTIONS_URI, name), engine);
        }

        for (name, engine) in [("and", "and"), ("or", "or"), ("not", "not"), ("xor", "xor")] {
            registry.add_function(Id::new(SUBSTRAIT_BOOLEAN_FUNCTIONS_URI, name), engine);
        }

        registry.add_function(
            Id::new(SUBSTRAIT_AGGREGATE_GENERIC_FUNCTIONS_URI, "count"),
            "count",
        );

        registry
    }

    fn add_function(&mut self, id: Id, engine_name: &str) {
        self.function_ids
            .entry(engine_name.to_string())
            .or_insert_with(|| id.clone());
        self.functions.insert(id, engine_name.to_string());
    }

    fn add_type(&mut self, id: Id, data_type: DataType) {
        self.type_ids
            .entry(data_type.clone())
            .or_insert_with(|| id.clone());
        self.types.insert(id, data_type);
    }

    /// Register a mapping from a qualified identifier to an engine function
    /// name, local to this registry instance.
    pub fn register_function(&mut self, id: Id, engine_name: impl Into<String>) -> Result<()> {
        if self.functions.contains_key(&id) {
            return Err(SubstraitError::invalid(format!(
                "extension function {id} is already registered"
            )));
        }
        self.add_function(id, &engine_name.into());
        Ok(())
    }

    /// Register a mapping from a qualified identifier to a native type, local
    /// to this registry instance.
    pub fn register_type(&mut self, id: Id, data_type: DataType) -> Result<()> {
        if self.types.contains_key(&id) {
            return Err(SubstraitError::invalid(format!(
                "extension type {id} is already registered"
            )));
        }
        self.add_type(id, data_type);
        Ok(())
    }

    pub fn lookup_function(&self, id: &Id) -> Option<String> {
        self.functions.get(id).cloned().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.lookup_function(id))
        })
    }

    pub fn lookup_function_id(&self, engine_name: &str) -> Option<Id> {
        self.function_ids.get(engine_name).cloned().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.lookup_function_id(engine_name))
        })
    }

    pub fn lookup_type(&self, id: &Id) -> Option<DataType> {
        self.types.get(id).cloned().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.lookup_type(id))
        })
    }

    pub fn lookup_type_id(&self, data_type: &DataType) -> Option<Id> {
        self.type_ids.get(data_type).cloned().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.lookup_type_id(data_type))
        })
    }
}

/// A decoded function anchor: the qualified identifier and, when the registry
/// could resolve it, the engine function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFunction {
    pub id: Id,
    pub engine_name: Option<String>,
}

#[derive(Debug, Clone)]
struct TypeRecord {
    id: Id,
    data_type: Option<DataType>,
    referenced: bool,
}

#[derive(Debug, Clone)]
struct FunctionRecord {
    id: Id,
    engine_name: Option<String>,
    referenced: bool,
}

/// Per-plan symbol table mapping anchors to qualified identifiers. Type and
/// function anchors occupy independent numbering spaces.
pub struct ExtensionSet {
    registry: Arc<ExtensionIdRegistry>,
    types: BTreeMap<u32, TypeRecord>,
    type_anchors: HashMap<Id, u32>,
    functions: BTreeMap<u32, FunctionRecord>,
    function_anchors: HashMap<Id, u32>,
}

impl ExtensionSet {
    /// An empty set resolving against `registry`, or against the built-in
    /// defaults when none is supplied.
    pub fn new(registry: Option<Arc<ExtensionIdRegistry>>) -> Self {
        ExtensionSet {
            registry: registry.unwrap_or_else(|| Arc::new(ExtensionIdRegistry::with_defaults())),
            types: BTreeMap::new(),
            type_anchors: HashMap::new(),
            functions: BTreeMap::new(),
            function_anchors: HashMap::new(),
        }
    }

    /// Seed a set from a wire plan's extension-URI and extension
    /// declarations.
    ///
    /// Declarations that do not resolve against the registry fail immediately
    /// under [`ConversionStrictness::ExactRoundtrip`]; under best-effort they
    /// are kept deferred and fail later if lowering needs them -- or, if they
    /// are never referenced at all, when [`ExtensionSet::check_unreferenced`]
    /// runs after the plan is decoded.
    pub fn from_plan(
        plan: &proto::Plan,
        registry: Option<Arc<ExtensionIdRegistry>>,
        options: &ConversionOptions,
    ) -> Result<Self> {
        let mut set = Self::new(registry);
        let strict = options.strictness == ConversionStrictness::ExactRoundtrip;

        let mut uris: HashMap<u32, &str> = HashMap::new();
        for uri in &plan.extension_uris {
            uris.insert(uri.extension_uri_anchor, uri.uri.as_str());
        }
        fn lookup_uri<'a>(uris: &HashMap<u32, &'a str>, anchor: u32) -> Result<&'a str> {
            uris.get(&anchor).copied().ok_or_else(|| {
                SubstraitError::invalid(format!(
                    "plan references undeclared extension URI anchor {anchor}"
                ))
            })
        }

        for declaration in &plan.extensions {
            match &declaration.mapping_type {
                Some(MappingType::ExtensionType(ext)) => {
                    let id = Id::new(lookup_uri(&uris, ext.extension_uri_reference)?, &ext.name);
                    let data_type = set.registry.lookup_type(&id);
                    if strict && data_type.is_none() {
                        return Err(SubstraitError::invalid(format!(
                            "extension type {id} does not resolve against the registry"
                        )));
                    }
                    set.type_anchors.insert(id.clone(), ext.type_anchor);
                    set.types.insert(
                        ext.type_anchor,
                        TypeRecord {
                            id,
                            data_type,
                            referenced: false,
                        },
                    );
                }
                Some(MappingType::ExtensionFunction(ext)) => {
                    let id = Id::new(lookup_uri(&uris, ext.extension_uri_reference)?, &ext.name);
                    let engine_name = set.registry.lookup_function(&id);
                    if strict && engine_name.is_none() {
                        return Err(SubstraitError::invalid(format!(
                            "extension function {id} does not resolve against the registry"
                        )));
                    }
                    set.function_anchors.insert(id.clone(), ext.function_anchor);
                    set.functions.insert(
                        ext.function_anchor,
                        FunctionRecord {
                            id,
                            engine_name,
                            referenced: false,
                        },
                    );
                }
                Some(MappingType::ExtensionTypeVariation(_)) => {
                    return Err(SubstraitError::not_implemented(
                        "extension type variations",
                    ));
                }
                None => {
                    return Err(SubstraitError::invalid(
                        "extension declaration with no mapping type",
                    ));
                }
            }
        }

        Ok(set)
    }

    pub fn registry(&self) -> &ExtensionIdRegistry {
        &self.registry
    }

    pub fn num_types(&self) -> usize {
        self.types.len()
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    fn next_type_anchor(&self) -> u32 {
        self.types.keys().next_back().map_or(0, |last| last + 1)
    }

    fn next_function_anchor(&self) -> u32 {
        self.functions.keys().next_back().map_or(0, |last| last + 1)
    }

    /// Assign (or return the existing) anchor for a native type with no core
    /// wire representation. Idempotent per identifier: encoding the same type
    /// twice returns the same anchor without growing the set.
    pub fn encode_type(&mut self, data_type: &DataType) -> Result<u32> {
        let id = self.registry.lookup_type_id(data_type).ok_or_else(|| {
            SubstraitError::not_implemented(format!(
                "no extension type identifier is registered for {data_type}"
            ))
        })?;
        if let Some(anchor) = self.type_anchors.get(&id) {
            return Ok(*anchor);
        }
        let anchor = self.next_type_anchor();
        self.type_anchors.insert(id.clone(), anchor);
        self.types.insert(
            anchor,
            TypeRecord {
                id,
                data_type: Some(data_type.clone()),
                referenced: true,
            },
        );
        Ok(anchor)
    }

    /// Resolve a type anchor to its identifier and native type.
    pub fn decode_type(&mut self, anchor: u32) -> Result<(Id, DataType)> {
        let record = self.types.get_mut(&anchor).ok_or_else(|| {
            SubstraitError::invalid(format!(
                "user-defined type reference {anchor} did not have a corresponding anchor"
            ))
        })?;
        record.referenced = true;
        let id = record.id.clone();
        match &record.data_type {
            Some(data_type) => Ok((id, data_type.clone())),
            None => Err(SubstraitError::invalid(format!(
                "extension type {id} does not resolve against the registry"
            ))),
        }
    }

    /// Assign (or return the existing) anchor for an engine function.
    pub fn encode_function(&mut self, engine_name: &str) -> Result<u32> {
        let id = self
            .registry
            .lookup_function_id(engine_name)
            .ok_or_else(|| {
                SubstraitError::not_implemented(format!(
                    "no extension function identifier is registered for '{engine_name}'"
                ))
            })?;
        if let Some(anchor) = self.function_anchors.get(&id) {
            return Ok(*anchor);
        }
        let anchor = self.next_function_anchor();
        self.function_anchors.insert(id.clone(), anchor);
        self.functions.insert(
            anchor,
            FunctionRecord {
                id,
                engine_name: Some(engine_name.to_string()),
                referenced: true,
            },
        );
        Ok(anchor)
    }

    /// Resolve a function anchor. The engine name is `None` when the
    /// identifier was declared but did not resolve against the registry
    /// (possible only under best-effort conversion).
    pub fn decode_function(&mut self, anchor: u32) -> Result<DecodedFunction> {
        let record = self.functions.get_mut(&anchor).ok_or_else(|| {
            SubstraitError::invalid(format!(
                "function reference {anchor} did not have a corresponding anchor"
            ))
        })?;
        record.referenced = true;
        Ok(DecodedFunction {
            id: record.id.clone(),
            engine_name: record.engine_name.clone(),
        })
    }

    /// After a plan has been decoded, reject declarations that both failed to
    /// resolve and were never referenced: the plan asserts a mapping it
    /// cannot honor.
    pub fn check_unreferenced(&self) -> Result<()> {
        for record in self.types.values() {
            if record.data_type.is_none() && !record.referenced {
                return Err(SubstraitError::invalid(format!(
                    "unreferenced extension type {} does not resolve against the registry",
                    record.id
                )));
            }
        }
        for record in self.functions.values() {
            if record.engine_name.is_none() && !record.referenced {
                return Err(SubstraitError::invalid(format!(
                    "unreferenced extension function {} does not resolve against the registry",
                    record.id
                )));
            }
        }
        Ok(())
    }

    /// Emit the URI and declaration tables for a serialized plan.
    pub fn to_extension_lists(
        &self,
    ) -> (Vec<SimpleExtensionUri>, Vec<SimpleExtensionDeclaration>) {
        let mut uri_anchors: HashMap<String, u32> = HashMap::new();
        let mut uris = Vec::new();
        let mut declarations = Vec::new();

        let mut uri_anchor = |uri: &str, uris: &mut Vec<SimpleExtensionUri>| -> u32 {
            if let Some(anchor) = uri_anchors.get(uri) {
                return *anchor;
            }
            let anchor = uris.len() as u32 + 1;
            uris.push(SimpleExtensionUri {
                extension_uri_anchor: anchor,
                uri: uri.to_string(),
            });
            uri_anchors.insert(uri.to_string(), anchor);
            anchor
        };

        for (&anchor, record) in &self.types {
            let uri_ref = uri_anchor(&record.id.uri, &mut uris);
            declarations.push(SimpleExtensionDeclaration {
                mapping_type: Some(MappingType::ExtensionType(ExtensionType {
                    extension_uri_reference: uri_ref,
                    type_anchor: anchor,
                    name: record.id.name.clone(),
                })),
            });
        }
        for (&anchor, record) in &self.functions {
            let uri_ref = uri_anchor(&record.id.uri, &mut uris);
            declarations.push(SimpleExtensionDeclaration {
                mapping_type: Some(MappingType::ExtensionFunction(ExtensionFunction {
                    extension_uri_reference: uri_ref,
                    function_anchor: anchor,
                    name: record.id.name.clone(),
                })),
            });
        }

        (uris, declarations)
    }
}

impl Default for ExtensionSet {
    fn default() -> Self {
        Self::new(None)
    }
}
