//! Structural mapping: converting a validated key/value mapping into a
//! concrete typed record.
//!
//! [`map_to_object`] walks the schema descriptor, resolves each field
//! through its mapper entry, and applies the built-in coercions (numeric
//! widening, bool and string pass-through). Arrays of nested records are
//! mapped element by element, skipping anything that is not a sub-mapping.
//! The processor-type field is always set to the task name, irrespective
//! of any value in the source mapping. A value that cannot be coerced to
//! the field's kind resolves to the field's default; this stage never
//! raises. Partial success is acceptable: an empty mapped array where the
//! source had elements still yields a record.

use serde_json::{Map, Number, Value};

use crate::error::Result;
use crate::mapper::{FieldMapper, MapperTable};
use crate::schema::{FieldKind, Record, Schema};

/// Map a key/value mapping into a schema-shaped JSON object.
pub fn map_to_object(
    mapping: &Map<String, Value>,
    table: &MapperTable,
    schema: &Schema,
    task_name: &str,
) -> Map<String, Value> {
    let mut out = Map::new();
    for field in schema.fields() {
        if field.processor_type {
            out.insert(field.name.clone(), Value::String(task_name.to_string()));
            continue;
        }
        let Some(mapper) = table.get(&field.name) else {
            // Table and schema are built from the same descriptor; a missing
            // entry means a stale table, fall back to the declared default.
            out.insert(field.name.clone(), field.default_value());
            continue;
        };
        let resolved = mapper.resolve(mapping.get(&field.name));
        let value = coerce(resolved, &field.kind, mapper, task_name)
            .unwrap_or_else(|| mapper.default.clone());
        out.insert(field.name.clone(), value);
    }
    out
}

/// Map a key/value mapping into a typed record instance.
pub fn map_to_record<T: Record>(
    mapping: &Map<String, Value>,
    table: &MapperTable,
    schema: &Schema,
    task_name: &str,
) -> Result<T> {
    let object = map_to_object(mapping, table, schema, task_name);
    Ok(serde_json::from_value(Value::Object(object))?)
}

/// Coerce a resolved value to a field kind. `None` means the value is not
/// kind-compatible and the default applies.
fn coerce(value: Value, kind: &FieldKind, mapper: &FieldMapper, task_name: &str) -> Option<Value> {
    match kind {
        FieldKind::String => match value {
            Value::String(s) => Some(Value::String(s)),
            _ => None,
        },
        FieldKind::Int => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::from),
            _ => None,
        },
        FieldKind::UInt => match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .map(Value::from),
            _ => None,
        },
        FieldKind::Float => match value {
            Value::Number(n) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
            _ => None,
        },
        FieldKind::Bool => match value {
            Value::Bool(b) => Some(Value::Bool(b)),
            _ => None,
        },
        FieldKind::StringArray => match value {
            Value::Array(items) => Some(Value::Array(
                items.into_iter().filter(|item| item.is_string()).collect(),
            )),
            _ => None,
        },
        FieldKind::Record(nested_schema) => match value {
            Value::Object(obj) => {
                let nested_table = mapper.nested()?;
                Some(Value::Object(map_to_object(
                    &obj,
                    nested_table,
                    nested_schema,
                    task_name,
                )))
            }
            _ => None,
        },
        FieldKind::RecordArray(nested_schema) => match value {
            Value::Array(items) => {
                let nested_table = mapper.nested()?;
                let mapped = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(obj) => Some(Value::Object(map_to_object(
                            &obj,
                            nested_table,
                            nested_schema,
                            task_name,
                        ))),
                        // Skip elements that are not sub-mappings.
                        _ => None,
                    })
                    .collect();
                Some(Value::Array(mapped))
            }
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Sentiment {
        sentiment: String,
        score: f64,
        keywords: Vec<String>,
        processor_type: String,
    }

    impl Record for Sentiment {
        fn schema() -> Schema {
            Schema::new()
                .field(FieldSpec::string("sentiment").with_default(json!("unknown")))
                .field(FieldSpec::float("score"))
                .field(FieldSpec::string_array("keywords"))
                .field(FieldSpec::processor_type())
        }
    }

    fn table_for(schema: &Schema) -> MapperTable {
        MapperTable::build(schema, &HashMap::new(), &HashMap::new())
    }

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_well_formed_payload_reproduced_exactly() {
        let schema = Sentiment::schema();
        let table = table_for(&schema);
        let mapping = obj(json!({
            "sentiment": "positive",
            "score": 0.8,
            "keywords": ["great", "fast"],
        }));
        let record: Sentiment =
            map_to_record(&mapping, &table, &schema, "sentiment").unwrap();
        assert_eq!(record.sentiment, "positive");
        assert_eq!(record.score, 0.8);
        assert_eq!(record.keywords, vec!["great", "fast"]);
        assert_eq!(record.processor_type, "sentiment");
    }

    #[test]
    fn test_processor_type_ignores_payload_value() {
        let schema = Sentiment::schema();
        let table = table_for(&schema);
        let mapping = obj(json!({"sentiment": "ok", "processor_type": "spoofed"}));
        let record: Sentiment =
            map_to_record(&mapping, &table, &schema, "sentiment").unwrap();
        assert_eq!(record.processor_type, "sentiment");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let schema = Sentiment::schema();
        let table = table_for(&schema);
        let record: Sentiment =
            map_to_record(&Map::new(), &table, &schema, "sentiment").unwrap();
        assert_eq!(record.sentiment, "unknown");
        assert_eq!(record.score, 0.0);
        assert!(record.keywords.is_empty());
    }

    #[test]
    fn test_numeric_widening() {
        let schema = Schema::new()
            .field(FieldSpec::int("count"))
            .field(FieldSpec::uint("total"))
            .field(FieldSpec::float("ratio"));
        let table = table_for(&schema);
        let mapping = obj(json!({"count": 3.9, "total": 2.5, "ratio": 7}));
        let out = map_to_object(&mapping, &table, &schema, "t");
        assert_eq!(out["count"], json!(3));
        assert_eq!(out["total"], json!(2));
        assert_eq!(out["ratio"], json!(7.0));
    }

    #[test]
    fn test_negative_float_rejected_for_uint() {
        let schema = Schema::new().field(FieldSpec::uint("total"));
        let table = table_for(&schema);
        let mapping = obj(json!({"total": -1.5}));
        let out = map_to_object(&mapping, &table, &schema, "t");
        assert_eq!(out["total"], json!(0));
    }

    #[test]
    fn test_incompatible_kind_uses_default() {
        let schema = Sentiment::schema();
        let table = table_for(&schema);
        let mapping = obj(json!({"sentiment": 42, "score": "high"}));
        let record: Sentiment =
            map_to_record(&mapping, &table, &schema, "sentiment").unwrap();
        assert_eq!(record.sentiment, "unknown");
        assert_eq!(record.score, 0.0);
    }

    #[test]
    fn test_nested_record_array_mapped_recursively() {
        let nested = Schema::new()
            .field(FieldSpec::string("title").with_default(json!("untitled")))
            .field(FieldSpec::int("rank"));
        let schema = Schema::new().field(FieldSpec::record_array("topics", nested));
        let table = table_for(&schema);
        let mapping = obj(json!({
            "topics": [
                {"title": "first", "rank": 1.0},
                "not an object",
                {"rank": 2},
            ]
        }));
        let out = map_to_object(&mapping, &table, &schema, "t");
        let topics = out["topics"].as_array().unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0]["title"], json!("first"));
        assert_eq!(topics[0]["rank"], json!(1));
        assert_eq!(topics[1]["title"], json!("untitled"));
        assert_eq!(topics[1]["rank"], json!(2));
    }

    #[test]
    fn test_unmappable_array_still_yields_record() {
        let nested = Schema::new().field(FieldSpec::string("title"));
        let schema = Schema::new().field(FieldSpec::record_array("topics", nested));
        let table = table_for(&schema);
        let mapping = obj(json!({"topics": ["a", "b", 3]}));
        let out = map_to_object(&mapping, &table, &schema, "t");
        assert_eq!(out["topics"], json!([]));
    }

    #[test]
    fn test_single_nested_record() {
        let nested = Schema::new().field(FieldSpec::string("city"));
        let schema = Schema::new().field(FieldSpec::record("location", nested));
        let table = table_for(&schema);
        let mapping = obj(json!({"location": {"city": "Oslo", "extra": true}}));
        let out = map_to_object(&mapping, &table, &schema, "t");
        assert_eq!(out["location"], json!({"city": "Oslo"}));
    }
}
