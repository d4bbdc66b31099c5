//! Auto-processor: the per-task composition of schema, mapper table,
//! normalizer, and structural mapper.
//!
//! An [`AutoProcessor`] is built once per named extraction task and shared
//! read-only across concurrent workers. One invocation runs the full
//! pipeline: render the prompt (with the schema example embedded), call
//! the model backend exactly once, normalize the answer, structurally map
//! it into the declared record type, optionally substitute the full
//! default record on structural rejection, and merge any debug trail.
//!
//! Parse failures and structural mismatches are recovered locally and never
//! surface as errors; an unsupported content kind or a failed model call
//! does.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::backend::{ModelConfig, ModelRequest};
use crate::batch::WorkItem;
use crate::diagnostics::ExtractDiagnostics;
use crate::error::{ExtractError, Result};
use crate::events::{emit, Event};
use crate::exec_ctx::ExecCtx;
use crate::mapper::{MapperTable, Transform};
use crate::normalize::{normalize, RawResponse};
use crate::prompt;
use crate::schema::{Record, Schema, PROCESSOR_TYPE_FIELD};
use crate::structmap;

/// Debug trail for one extraction: the prompt sent, the raw answer, and
/// the model that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct DebugPayload {
    /// The rendered prompt text.
    pub prompt: String,
    /// The raw response text.
    pub raw_response: String,
    /// Model identifier.
    pub model: String,
}

/// The final payload of one extraction: either the typed record, or a
/// key/value mapping (the fallback mapping, or a debug-merged record).
///
/// Debug data is never injected into the typed record itself; a typed
/// record has no slot for arbitrary debug entries, so a debug-carrying
/// result is returned as a mapping with the record's fields copied in.
#[derive(Debug, Clone)]
pub enum ExtractPayload<T> {
    /// The populated typed record.
    Record(T),
    /// A key/value mapping.
    Mapping(Map<String, Value>),
}

impl<T: Record> ExtractPayload<T> {
    /// The typed record, if this payload holds one.
    pub fn as_record(&self) -> Option<&T> {
        match self {
            ExtractPayload::Record(r) => Some(r),
            ExtractPayload::Mapping(_) => None,
        }
    }

    /// Consume the payload, returning the typed record if present.
    pub fn into_record(self) -> Option<T> {
        match self {
            ExtractPayload::Record(r) => Some(r),
            ExtractPayload::Mapping(_) => None,
        }
    }

    /// The mapping, if this payload holds one.
    pub fn as_mapping(&self) -> Option<&Map<String, Value>> {
        match self {
            ExtractPayload::Record(_) => None,
            ExtractPayload::Mapping(m) => Some(m),
        }
    }

    /// Render the payload as a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            ExtractPayload::Record(r) => serde_json::to_value(r).unwrap_or(Value::Null),
            ExtractPayload::Mapping(m) => Value::Object(m.clone()),
        }
    }
}

/// Output from one processor invocation.
#[derive(Debug, Clone)]
pub struct ProcessorOutput<T> {
    /// The final payload (record or mapping).
    pub payload: ExtractPayload<T>,
    /// Raw response text from the model (before any cleanup).
    pub raw_response: String,
    /// Model that produced this output, when known.
    pub model: Option<String>,
    /// What happened during normalization and mapping.
    pub diagnostics: ExtractDiagnostics,
}

/// A named extraction task: schema-driven normalization and structural
/// mapping over one record type.
///
/// # Example
///
/// ```no_run
/// use llm_extract::{AutoProcessor, ExecCtx};
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
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let processor = AutoProcessor::<Sentiment>::builder("sentiment")
///     .prompt("Classify the sentiment of: {input}")
///     .build()?;
///
/// let ctx = ExecCtx::builder("http://localhost:11434").build();
/// let output = processor.process_text(&ctx, "Great product, fast shipping").await?;
/// # Ok(())
/// # }
/// ```
pub struct AutoProcessor<T: Record> {
    name: String,
    schema: Schema,
    table: MapperTable,
    prompt_template: String,
    system_template: Option<String>,
    config: ModelConfig,
    accepted_kinds: Vec<String>,
    validate_structure: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> AutoProcessor<T> {
    /// Create a new builder for the given task name.
    pub fn builder(name: impl Into<String>) -> AutoProcessorBuilder<T> {
        AutoProcessorBuilder {
            name: name.into(),
            prompt_template: "Process the following input:\n{input}".to_string(),
            system_template: None,
            config: ModelConfig::default(),
            accepted_kinds: Vec::new(),
            validate_structure: false,
            defaults: HashMap::new(),
            validators: HashMap::new(),
            _record: PhantomData,
        }
    }

    /// The registered task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema descriptor (built once, cached for the task's lifetime).
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The example JSON shown to the model.
    pub fn example_json(&self) -> String {
        self.schema.example_json()
    }

    /// Whether this processor accepts the given content kind.
    /// An empty accept list means every kind is accepted.
    pub fn accepts(&self, kind: &str) -> bool {
        self.accepted_kinds.is_empty() || self.accepted_kinds.iter().any(|k| k == kind)
    }

    /// Run the extraction pipeline over a raw model answer.
    ///
    /// This is the pure core: it never errors. Parse failures resolve to the
    /// fallback mapping; structural rejection substitutes the full default
    /// record.
    pub fn process_response(
        &self,
        ctx: &ExecCtx,
        raw: RawResponse,
        debug: Option<DebugPayload>,
    ) -> ProcessorOutput<T> {
        let (raw_text, strategy) = match &raw {
            RawResponse::Text(t) => (t.clone(), "text"),
            RawResponse::Mapping(m) => (Value::Object(m.clone()).to_string(), "mapping"),
        };

        let mut diagnostics = ExtractDiagnostics {
            strategy: Some(strategy),
            ..Default::default()
        };

        let normalized = normalize(raw, &self.schema, &self.name);

        let mut payload = if !normalized.is_valid {
            diagnostics.fallback = true;
            emit(
                &ctx.event_handler,
                Event::ParseFallback {
                    task: self.name.clone(),
                },
            );
            ExtractPayload::Mapping(normalized.mapping)
        } else {
            let candidate =
                structmap::map_to_object(&normalized.mapping, &self.table, &self.schema, &self.name);
            match serde_json::from_value::<T>(Value::Object(candidate.clone())) {
                Ok(record) => ExtractPayload::Record(record),
                Err(err) if self.validate_structure => {
                    // Validation required: the candidate must match the
                    // declared record type exactly, or the full default
                    // record takes its place.
                    diagnostics.structurally_rejected = true;
                    diagnostics.parse_error = Some(err.to_string());
                    emit(
                        &ctx.event_handler,
                        Event::StructuralReject {
                            task: self.name.clone(),
                            reason: err.to_string(),
                        },
                    );
                    self.default_payload()
                }
                Err(err) => {
                    // No validation requested: hand back the schema-shaped
                    // mapping as-is.
                    diagnostics.parse_error = Some(err.to_string());
                    ExtractPayload::Mapping(candidate)
                }
            }
        };

        // Merge the debug trail. An explicit debug payload from the model
        // call wins over one extracted from the response mapping.
        let debug_value = match debug {
            Some(d) => serde_json::to_value(&d).ok(),
            None => normalized.debug,
        };
        if let Some(debug_value) = debug_value {
            payload = Self::merge_debug(payload, debug_value, &self.name);
        }

        emit(
            &ctx.event_handler,
            Event::ExtractEnd {
                task: self.name.clone(),
                clean: diagnostics.ok(),
            },
        );

        ProcessorOutput {
            payload,
            raw_response: raw_text,
            model: Some(self.config.model.clone()),
            diagnostics,
        }
    }

    /// Process one text input end to end: render the prompt, call the model
    /// once, and run the extraction pipeline over the answer.
    pub async fn process_text(&self, ctx: &ExecCtx, input: &str) -> Result<ProcessorOutput<T>> {
        ctx.check_cancelled()?;
        emit(
            &ctx.event_handler,
            Event::ExtractStart {
                task: self.name.clone(),
            },
        );

        let template = prompt::embed_example(&self.prompt_template, &self.schema);
        let prompt_text = prompt::render(&template, input, &ctx.vars);
        let system_prompt = self
            .system_template
            .as_ref()
            .map(|t| prompt::render(t, input, &ctx.vars));

        let request = ModelRequest {
            system_prompt,
            prompt: prompt_text.clone(),
            config: self.config.clone(),
        };
        let response = ctx
            .backend
            .complete(&ctx.client, &ctx.base_url, &request)
            .await?;

        // In json mode the call is structured: an object answer enters the
        // normalizer as a mapping, anything else as text.
        let raw = if self.config.json_mode {
            match serde_json::from_str::<Value>(&response.text) {
                Ok(value @ Value::Object(_)) => RawResponse::from_value(value),
                _ => RawResponse::Text(response.text.clone()),
            }
        } else {
            RawResponse::Text(response.text.clone())
        };

        let debug = self.config.debug.then(|| DebugPayload {
            prompt: prompt_text,
            raw_response: response.text.clone(),
            model: self.config.model.clone(),
        });

        Ok(self.process_response(ctx, raw, debug))
    }

    /// Process one work item, checking its content kind first.
    pub async fn process_item(
        &self,
        ctx: &ExecCtx,
        item: &WorkItem,
    ) -> Result<ProcessorOutput<T>> {
        if !self.accepts(&item.kind) {
            return Err(ExtractError::UnsupportedContent {
                processor: self.name.clone(),
                kind: item.kind.clone(),
            });
        }
        self.process_text(ctx, &item.content).await
    }

    /// The fully defaulted record, built fresh from the schema descriptor.
    fn default_payload(&self) -> ExtractPayload<T> {
        let defaults = self.schema.default_mapping(&self.name);
        match serde_json::from_value::<T>(Value::Object(defaults.clone())) {
            Ok(record) => ExtractPayload::Record(record),
            // Builder verified this deserializes; keep the mapping if a
            // serde impl disagrees at runtime.
            Err(_) => ExtractPayload::Mapping(defaults),
        }
    }

    /// Attach a debug entry to the final payload. Mappings take the entry
    /// directly; a typed record is copied field by field into a fresh
    /// mapping alongside the debug entry and the processor-type value.
    fn merge_debug(
        payload: ExtractPayload<T>,
        debug: Value,
        task_name: &str,
    ) -> ExtractPayload<T> {
        match payload {
            ExtractPayload::Mapping(mut map) => {
                map.insert("debug".to_string(), debug);
                ExtractPayload::Mapping(map)
            }
            ExtractPayload::Record(record) => {
                let mut map = match serde_json::to_value(&record) {
                    Ok(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                map.insert("debug".to_string(), debug);
                map.insert(
                    PROCESSOR_TYPE_FIELD.to_string(),
                    Value::String(task_name.to_string()),
                );
                ExtractPayload::Mapping(map)
            }
        }
    }
}

impl<T: Record> std::fmt::Debug for AutoProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoProcessor")
            .field("name", &self.name)
            .field("fields", &self.schema.fields().len())
            .field("accepted_kinds", &self.accepted_kinds)
            .field("validate_structure", &self.validate_structure)
            .finish()
    }
}

/// Builder for [`AutoProcessor`].
pub struct AutoProcessorBuilder<T: Record> {
    name: String,
    prompt_template: String,
    system_template: Option<String>,
    config: ModelConfig,
    accepted_kinds: Vec<String>,
    validate_structure: bool,
    defaults: HashMap<String, Value>,
    validators: HashMap<String, Transform>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> AutoProcessorBuilder<T> {
    /// Set the prompt template. `{input}` is replaced by the item content;
    /// `{schema}` by the example JSON (appended when absent).
    pub fn prompt(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    /// Set a system prompt template.
    pub fn system(mut self, template: impl Into<String>) -> Self {
        self.system_template = Some(template.into());
        self
    }

    /// Set the model configuration.
    pub fn config(mut self, config: ModelConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an accepted content kind. No registered kinds means all kinds
    /// are accepted.
    pub fn accept_kind(mut self, kind: impl Into<String>) -> Self {
        self.accepted_kinds.push(kind.into());
        self
    }

    /// Require whole-structure validation: a candidate that does not
    /// deserialize into the record type exactly is replaced by the full
    /// default record.
    pub fn validate_structure(mut self, enabled: bool) -> Self {
        self.validate_structure = enabled;
        self
    }

    /// Override a field's default value by serialized name.
    pub fn default_value(mut self, field: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(field.into(), value);
        self
    }

    /// Register a validator hook for a field by serialized name.
    ///
    /// The hook runs after any built-in transform and may keep, coerce, or
    /// discard the value; returning `None` signals "use the default".
    pub fn validator<F>(mut self, field: impl Into<String>, hook: F) -> Self
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.validators.insert(field.into(), Arc::new(hook));
        self
    }

    /// Build the processor, validating the record configuration.
    ///
    /// Configuration problems (duplicate field names, hooks referencing
    /// unknown fields, a default record that does not deserialize) are
    /// reported here, not at request time.
    pub fn build(self) -> Result<AutoProcessor<T>> {
        let schema = T::schema();
        schema.validate()?;

        if !schema.fields().iter().any(|f| f.processor_type) {
            return Err(ExtractError::InvalidConfig(format!(
                "record schema for task '{}' declares no processor-type field",
                self.name
            )));
        }

        for field in self.defaults.keys().chain(self.validators.keys()) {
            if schema.get(field).is_none() {
                return Err(ExtractError::InvalidConfig(format!(
                    "hook references unknown field '{}' in task '{}'",
                    field, self.name
                )));
            }
        }

        let table = MapperTable::build(&schema, &self.defaults, &self.validators);

        // The default record must deserialize; otherwise the fallback path
        // could not produce a typed record at request time.
        let defaults = schema.default_mapping(&self.name);
        serde_json::from_value::<T>(Value::Object(defaults)).map_err(|e| {
            ExtractError::InvalidConfig(format!(
                "default record for task '{}' does not deserialize: {}",
                self.name, e
            ))
        })?;

        Ok(AutoProcessor {
            name: self.name,
            schema,
            table,
            prompt_template: self.prompt_template,
            system_template: self.system_template,
            config: self.config,
            accepted_kinds: self.accepted_kinds,
            validate_structure: self.validate_structure,
            _record: PhantomData,
        })
    }
}
