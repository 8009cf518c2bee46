//! Facts, fact identity, and the runtime type registry.
//!
//! A fact is a dynamically typed record: a runtime type tag plus named
//! fields. The engine assigns each inserted fact a stable [`FactHandle`];
//! update and retract resolve their argument back to that handle through a
//! canonical [`FactKey`] — the declared key fields of the fact's type when
//! the registry declares any, otherwise the full field set. Both of the
//! host identity styles (reference-like via the handle, value-like via the
//! key) resolve to the same internal id.

use ember_types::FactValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Engine-assigned stable fact identity.
pub type FactId = u64;

/// Identifier of a compiled rule.
pub type RuleId = u64;

/// Opaque handle to a fact in working memory, returned by insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactHandle(pub(crate) FactId);

impl FactHandle {
    pub fn id(&self) -> FactId {
        self.0
    }
}

impl fmt::Display for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fact#{}", self.0)
    }
}

/// A host value the engine reasons over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fact {
    /// Runtime type tag, dispatched on by the alpha root.
    pub fact_type: String,
    /// Named field values. The engine never interprets these beyond the
    /// comparison semantics of [`FactValue`].
    pub fields: HashMap<String, FactValue>,
}

impl Fact {
    pub fn new(fact_type: impl Into<String>) -> Self {
        Self { fact_type: fact_type.into(), fields: HashMap::new() }
    }

    /// Builder-style field setter used heavily in tests.
    pub fn with_field(mut self, name: impl Into<String>, value: FactValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FactValue> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: FactValue) {
        self.fields.insert(field.into(), value);
    }
}

/// Canonical identity of a fact, independent of its handle.
///
/// Keyed types project their declared key fields; unkeyed types use the
/// whole (sorted) field set, giving value semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactKey {
    pub fact_type: String,
    values: Vec<(String, FactValue)>,
}

impl FactKey {
    /// Human-readable form used in error messages.
    pub fn display(&self) -> String {
        let parts: Vec<String> =
            self.values.iter().map(|(name, value)| format!("{name}={value}")).collect();
        parts.join(", ")
    }
}

/// Declared shape of a fact type: optional parent for assignability and
/// optional key fields for value identity.
#[derive(Debug, Clone, Default)]
pub struct TypeDef {
    pub parent: Option<String>,
    pub key_fields: Vec<String>,
}

/// Registry of declared fact types.
///
/// Types need not be registered: an unknown type has no parent and no key
/// fields. Registration buys two things — a place in the type hierarchy
/// (alpha-root dispatch treats a fact as assignable to every ancestor) and
/// key-field identity.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a type with an optional parent type and key fields.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        parent: Option<&str>,
        key_fields: &[&str],
    ) -> &mut Self {
        self.types.insert(
            name.into(),
            TypeDef {
                parent: parent.map(str::to_string),
                key_fields: key_fields.iter().map(|s| (*s).to_string()).collect(),
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// The type itself followed by its ancestors, nearest first. Cycles are
    /// cut rather than reported; a cyclic declaration is a authoring bug.
    pub fn ancestry<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        let mut chain = vec![name];
        let mut current = name;
        while let Some(parent) = self.types.get(current).and_then(|t| t.parent.as_deref()) {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Whether a fact of `concrete` type matches a node declared for
    /// `declared` type.
    pub fn is_assignable(&self, concrete: &str, declared: &str) -> bool {
        self.ancestry(concrete).contains(&declared)
    }

    /// Canonical key for a fact: declared key fields when present, the full
    /// sorted field set otherwise.
    pub fn key_for(&self, fact: &Fact) -> FactKey {
        let key_fields = self.types.get(&fact.fact_type).map(|t| t.key_fields.as_slice());
        let values = match key_fields {
            Some(fields) if !fields.is_empty() => fields
                .iter()
                .map(|name| {
                    (name.clone(), fact.fields.get(name).cloned().unwrap_or(FactValue::Null))
                })
                .collect(),
            _ => {
                let mut all: Vec<(String, FactValue)> =
                    fact.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                all.sort_by(|a, b| a.0.cmp(&b.0));
                all
            }
        };
        FactKey { fact_type: fact.fact_type.clone(), values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestry_walks_declared_parents() {
        let mut registry = TypeRegistry::new();
        registry.declare("Employee", None, &[]);
        registry.declare("Manager", Some("Employee"), &[]);
        registry.declare("Director", Some("Manager"), &[]);

        assert_eq!(registry.ancestry("Director"), vec!["Director", "Manager", "Employee"]);
        assert!(registry.is_assignable("Director", "Employee"));
        assert!(!registry.is_assignable("Employee", "Director"));
        assert_eq!(registry.ancestry("Unknown"), vec!["Unknown"]);
    }

    #[test]
    fn keyed_types_project_key_fields() {
        let mut registry = TypeRegistry::new();
        registry.declare("Order", None, &["order_id"]);

        let a = Fact::new("Order")
            .with_field("order_id", FactValue::Integer(7))
            .with_field("amount", FactValue::Float(10.0));
        let b = Fact::new("Order")
            .with_field("order_id", FactValue::Integer(7))
            .with_field("amount", FactValue::Float(99.0));

        assert_eq!(registry.key_for(&a), registry.key_for(&b));
    }

    #[test]
    fn unkeyed_types_use_full_value() {
        let registry = TypeRegistry::new();
        let a = Fact::new("Ping").with_field("n", FactValue::Integer(1));
        let b = Fact::new("Ping").with_field("n", FactValue::Integer(2));
        assert_ne!(registry.key_for(&a), registry.key_for(&b));
    }
}
