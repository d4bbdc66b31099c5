//! Field mapper table: per-field defaults and transform hooks.
//!
//! A [`MapperTable`] is built once per processor from the schema descriptor
//! plus any caller-registered defaults and validator hooks, and is immutable
//! and read-only thereafter (safe to share across concurrent workers).
//!
//! Transforms run in registration order: built-in transforms (the
//! string-array filter) first, then caller validators. A transform that
//! returns `None` or panics resolves the field to its default; this stage
//! never raises.

use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::schema::{FieldKind, Schema};

/// A per-field transform hook: raw value in, coerced value out.
///
/// Returning `None` signals "no value produced, use the default".
pub type Transform = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

/// The mapper entry for a single field: a default value plus an ordered
/// list of transforms.
#[derive(Clone)]
pub struct FieldMapper {
    /// Value used when the field is missing, null, or a transform declines.
    pub default: Value,
    transforms: Vec<Transform>,
    /// Mapper table for the element/record schema of nested-record fields.
    nested: Option<Box<MapperTable>>,
}

impl FieldMapper {
    /// Resolve a raw value for this field.
    ///
    /// Missing or null input resolves to the default. Transforms are applied
    /// in order; a transform that returns `None` or panics resolves to the
    /// default. Never raises.
    pub fn resolve(&self, value: Option<&Value>) -> Value {
        let raw = match value {
            Some(v) if !v.is_null() => v.clone(),
            _ => return self.default.clone(),
        };

        let mut current = raw;
        for transform in &self.transforms {
            let produced = catch_unwind(AssertUnwindSafe(|| transform(current.clone())))
                .ok()
                .flatten();
            match produced {
                Some(next) => current = next,
                None => return self.default.clone(),
            }
        }
        current
    }

    /// Mapper table for nested-record elements, if this field has one.
    pub fn nested(&self) -> Option<&MapperTable> {
        self.nested.as_deref()
    }
}

impl std::fmt::Debug for FieldMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMapper")
            .field("default", &self.default)
            .field("transforms", &self.transforms.len())
            .field("has_nested", &self.nested.is_some())
            .finish()
    }
}

/// The per-record-type table of [`FieldMapper`] entries, keyed by
/// serialized field name.
#[derive(Debug, Clone, Default)]
pub struct MapperTable {
    entries: HashMap<String, FieldMapper>,
}

impl MapperTable {
    /// Build the table from a schema descriptor.
    ///
    /// Each field is seeded with its declared default (or the kind's zero
    /// value), then `custom_defaults` overrides by serialized name. Fields
    /// of string-array kind get the built-in string filter; `validators`
    /// are installed after built-ins and run last.
    ///
    /// Nested-record fields get recursively built tables (custom defaults
    /// and validators apply to the top level only).
    pub fn build(
        schema: &Schema,
        custom_defaults: &HashMap<String, Value>,
        validators: &HashMap<String, Transform>,
    ) -> Self {
        let mut entries = HashMap::new();
        for field in schema.fields() {
            let mut default = field.default_value();
            if let Some(custom) = custom_defaults.get(&field.name) {
                default = custom.clone();
            }

            let mut transforms = Vec::new();
            if matches!(field.kind, FieldKind::StringArray) {
                transforms.push(string_array_filter());
            }
            if let Some(validator) = validators.get(&field.name) {
                transforms.push(Arc::clone(validator));
            }

            let nested = match &field.kind {
                FieldKind::Record(inner) | FieldKind::RecordArray(inner) => Some(Box::new(
                    MapperTable::build(inner, &HashMap::new(), &HashMap::new()),
                )),
                _ => None,
            };

            entries.insert(
                field.name.clone(),
                FieldMapper {
                    default,
                    transforms,
                    nested,
                },
            );
        }
        Self { entries }
    }

    /// Look up the mapper for a serialized field name.
    pub fn get(&self, name: &str) -> Option<&FieldMapper> {
        self.entries.get(name)
    }
}

/// Built-in transform for string-array fields: accepts an array of untyped
/// values and keeps only the string members, preserving order.
fn string_array_filter() -> Transform {
    Arc::new(|value| match value {
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter(|item| item.is_string()).collect(),
        )),
        _ => None,
    })
}
