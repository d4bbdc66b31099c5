//! Record schema descriptors.
//!
//! A [`Schema`] is an explicit, per-record-type table of fields: serialized
//! name, kind, declared default, omit-if-empty flag, and the processor-type
//! marker. All generic behavior (defaulting, fallback construction, example
//! generation, structural mapping) is driven off this table rather than
//! ad hoc per-field code. Target types implement [`Record`] to declare
//! their schema once; the descriptor is built at processor construction
//! and shared read-only across concurrent workers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ExtractError, Result};

/// Serialized name of the processor-type marker field.
///
/// This field is always set by the engine to the task's registered name,
/// never by the model, and is excluded from generated examples.
pub const PROCESSOR_TYPE_FIELD: &str = "processor_type";

/// The kind of a schema field.
///
/// Every reachable kind has a defined zero value and a deterministic
/// example placeholder, so default and example generation are total.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// UTF-8 string.
    String,
    /// Signed integer.
    Int,
    /// Unsigned integer.
    UInt,
    /// Floating-point number.
    Float,
    /// Boolean.
    Bool,
    /// Array of strings.
    StringArray,
    /// A single nested record (optional/boxed reference in the target type).
    Record(Box<Schema>),
    /// Array of nested records.
    RecordArray(Box<Schema>),
}

impl FieldKind {
    /// The zero value of this kind.
    pub fn zero(&self) -> Value {
        match self {
            FieldKind::String => Value::String(String::new()),
            FieldKind::Int => Value::from(0i64),
            FieldKind::UInt => Value::from(0u64),
            FieldKind::Float => Value::from(0.0f64),
            FieldKind::Bool => Value::Bool(false),
            FieldKind::StringArray | FieldKind::RecordArray(_) => Value::Array(Vec::new()),
            FieldKind::Record(_) => Value::Null,
        }
    }

    /// Deterministic example placeholder for this kind.
    ///
    /// Schemas are acyclic by construction, so nested recursion terminates.
    fn placeholder(&self, name: &str) -> Value {
        match self {
            FieldKind::String => Value::String(format!("example {}", name)),
            FieldKind::Int => Value::from(0i64),
            FieldKind::UInt => Value::from(0u64),
            FieldKind::Float => Value::from(0.0f64),
            FieldKind::Bool => Value::Bool(false),
            FieldKind::StringArray => {
                Value::Array(vec![Value::String(format!("example {}", name))])
            }
            FieldKind::Record(schema) => schema.example_value(),
            FieldKind::RecordArray(schema) => Value::Array(vec![schema.example_value()]),
        }
    }
}

/// One field in a [`Schema`]: serialized name, kind, declared default,
/// omit-if-empty flag, and the processor-type marker.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Serialized name as it appears in JSON.
    pub name: String,
    /// The field's kind.
    pub kind: FieldKind,
    /// Declared default literal, if any.
    pub default: Option<Value>,
    /// Whether the target type omits this field when empty.
    pub omit_empty: bool,
    /// Whether this is the processor-type marker field.
    pub processor_type: bool,
}

impl FieldSpec {
    /// Create a field with the given serialized name and kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            omit_empty: false,
            processor_type: false,
        }
    }

    /// Shorthand for a string field.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    /// Shorthand for a signed integer field.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int)
    }

    /// Shorthand for an unsigned integer field.
    pub fn uint(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::UInt)
    }

    /// Shorthand for a float field.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    /// Shorthand for a boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    /// Shorthand for a string-array field.
    pub fn string_array(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::StringArray)
    }

    /// Shorthand for a nested-record field.
    pub fn record(name: impl Into<String>, schema: Schema) -> Self {
        Self::new(name, FieldKind::Record(Box::new(schema)))
    }

    /// Shorthand for an array-of-nested-records field.
    pub fn record_array(name: impl Into<String>, schema: Schema) -> Self {
        Self::new(name, FieldKind::RecordArray(Box::new(schema)))
    }

    /// The processor-type marker field (`"processor_type"`, string kind).
    pub fn processor_type() -> Self {
        let mut spec = Self::string(PROCESSOR_TYPE_FIELD);
        spec.processor_type = true;
        spec
    }

    /// Set the declared default literal.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark this field as omitted-when-empty in the target type.
    pub fn omit_empty(mut self) -> Self {
        self.omit_empty = true;
        self
    }

    /// The effective default: the declared literal, or the kind's zero value.
    pub fn default_value(&self) -> Value {
        self.default.clone().unwrap_or_else(|| self.kind.zero())
    }

    /// The example value: the declared default, or a generated placeholder.
    fn example_value(&self) -> Value {
        match &self.default {
            Some(v) => v.clone(),
            None => self.kind.placeholder(&self.name),
        }
    }
}

/// An ordered record schema descriptor.
///
/// # Example
///
/// ```
/// use llm_extract::schema::{FieldSpec, Schema};
/// use serde_json::json;
///
/// let schema = Schema::new()
///     .field(FieldSpec::string("sentiment").with_default(json!("unknown")))
///     .field(FieldSpec::float("score"))
///     .field(FieldSpec::string_array("keywords"))
///     .field(FieldSpec::processor_type());
/// assert_eq!(schema.fields().len(), 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field (builder style).
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// The ordered field list.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field by serialized name.
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check descriptor invariants: serialized names are unique and at most
    /// one field carries the processor-type marker. Nested schemas are
    /// checked recursively.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        let mut markers = 0usize;
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ExtractError::InvalidConfig(format!(
                    "duplicate field name '{}' in schema",
                    field.name
                )));
            }
            if field.processor_type {
                markers += 1;
            }
            match &field.kind {
                FieldKind::Record(nested) | FieldKind::RecordArray(nested) => nested.validate()?,
                _ => {}
            }
        }
        if markers > 1 {
            return Err(ExtractError::InvalidConfig(
                "schema declares more than one processor-type field".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a mapping holding every field's declared default, with the
    /// processor-type field set to `task_name`.
    pub fn default_mapping(&self, task_name: &str) -> Map<String, Value> {
        let mut map = Map::new();
        for field in &self.fields {
            let value = if field.processor_type {
                Value::String(task_name.to_string())
            } else {
                field.default_value()
            };
            map.insert(field.name.clone(), value);
        }
        map
    }

    /// Build the non-JSON fallback mapping: every declared default, the
    /// original response text under `"response"`, and the task name.
    pub fn fallback_mapping(&self, response: &str, task_name: &str) -> Map<String, Value> {
        let mut map = self.default_mapping(task_name);
        map.insert("response".to_string(), Value::String(response.to_string()));
        map
    }

    /// A fully populated sample instance with the processor-type field
    /// removed. Deterministic and total over all field kinds.
    pub fn example_value(&self) -> Value {
        let mut map = Map::new();
        for field in &self.fields {
            if field.processor_type {
                continue;
            }
            map.insert(field.name.clone(), field.example_value());
        }
        Value::Object(map)
    }

    /// The sample instance serialized as pretty-printed JSON, shown to the
    /// model as the exact shape expected.
    pub fn example_json(&self) -> String {
        serde_json::to_string_pretty(&self.example_value())
            .unwrap_or_else(|_| "{}".to_string())
    }
}

/// A caller-declared output shape the engine can populate.
///
/// Implementors declare their [`Schema`] once; everything else (defaults,
/// fallback records, example JSON, structural mapping) is derived from it.
///
/// # Example
///
/// ```
/// use llm_extract::schema::{FieldSpec, Record, Schema};
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Sentiment {
///     sentiment: String,
///     score: f64,
///     keywords: Vec<String>,
///     processor_type: String,
/// }
///
/// impl Record for Sentiment {
///     fn schema() -> Schema {
///         Schema::new()
///             .field(FieldSpec::string("sentiment").with_default(json!("unknown")))
///             .field(FieldSpec::float("score"))
///             .field(FieldSpec::string_array("keywords"))
///             .field(FieldSpec::processor_type())
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The schema descriptor for this record type.
    fn schema() -> Schema;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sentiment_schema() -> Schema {
        Schema::new()
            .field(FieldSpec::string("sentiment").with_default(json!("unknown")))
            .field(FieldSpec::float("score"))
            .field(FieldSpec::string_array("keywords"))
            .field(FieldSpec::processor_type())
    }

    #[test]
    fn test_validate_ok() {
        assert!(sentiment_schema().validate().is_ok());
    }

    #[test]
    fn test_validate_duplicate_name() {
        let schema = Schema::new()
            .field(FieldSpec::string("a"))
            .field(FieldSpec::int("a"));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_two_markers() {
        let schema = Schema::new()
            .field(FieldSpec::processor_type())
            .field(FieldSpec::processor_type());
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_default_value_declared() {
        let field = FieldSpec::string("sentiment").with_default(json!("unknown"));
        assert_eq!(field.default_value(), json!("unknown"));
    }

    #[test]
    fn test_default_value_zero() {
        assert_eq!(FieldSpec::float("score").default_value(), json!(0.0));
        assert_eq!(FieldSpec::string_array("tags").default_value(), json!([]));
        assert_eq!(FieldSpec::boolean("flag").default_value(), json!(false));
    }

    #[test]
    fn test_default_mapping_sets_task_name() {
        let map = sentiment_schema().default_mapping("sentiment");
        assert_eq!(map["sentiment"], json!("unknown"));
        assert_eq!(map["score"], json!(0.0));
        assert_eq!(map["keywords"], json!([]));
        assert_eq!(map[PROCESSOR_TYPE_FIELD], json!("sentiment"));
    }

    #[test]
    fn test_fallback_mapping_carries_response() {
        let map = sentiment_schema().fallback_mapping("I think it's good.", "sentiment");
        assert_eq!(map["response"], json!("I think it's good."));
        assert_eq!(map["sentiment"], json!("unknown"));
        assert_eq!(map[PROCESSOR_TYPE_FIELD], json!("sentiment"));
    }

    #[test]
    fn test_example_excludes_processor_type() {
        let example = sentiment_schema().example_value();
        assert!(example.get(PROCESSOR_TYPE_FIELD).is_none());
        assert_eq!(example["sentiment"], json!("unknown"));
        assert_eq!(example["keywords"], json!(["example keywords"]));
    }

    #[test]
    fn test_example_is_deterministic() {
        let schema = sentiment_schema();
        assert_eq!(schema.example_json(), schema.example_json());
    }

    #[test]
    fn test_example_nested_records() {
        let nested = Schema::new()
            .field(FieldSpec::string("title"))
            .field(FieldSpec::int("rank"));
        let schema = Schema::new().field(FieldSpec::record_array("topics", nested));
        let example = schema.example_value();
        assert_eq!(example["topics"][0]["title"], json!("example title"));
        assert_eq!(example["topics"][0]["rank"], json!(0));
    }

    #[test]
    fn test_example_json_is_pretty() {
        let schema = Schema::new().field(FieldSpec::string("a"));
        assert!(schema.example_json().contains('\n'));
    }
}
