//! # LLM Extract
//!
//! Typed record extraction from messy LLM output, with bounded-parallel
//! batch processing.
//!
//! This crate turns an untyped, unreliable model answer into a validated,
//! strongly-typed record, generically, for an open set of record shapes:
//! **schemas** that describe the target shape once, a **normalizer** that
//! digs a JSON mapping out of fenced, prose-wrapped, or malformed text,
//! a **structural mapper** that coerces the mapping into the declared
//! record (falling back to declared defaults, never raising), and a
//! **batch executor** that drives many such extractions concurrently with
//! a worker cap and all-or-nothing batch error semantics.
//!
//! ## Core Concepts
//!
//! - **[`Record`](schema::Record)** — implemented by target types; declares
//!   the [`Schema`](schema::Schema) descriptor all generic behavior is
//!   derived from.
//! - **[`AutoProcessor`]** — the per-task composition root: prompt
//!   rendering (with the schema example embedded), one model call,
//!   normalization, structural mapping, optional structure validation
//!   with default fallback, and debug merging.
//! - **[`ExecCtx`]** — shared execution context (HTTP client, backend,
//!   template vars, advisory cancellation, optional event handler).
//! - **[`BatchExecutor`]** — sequential batches of parallel workers over a
//!   pull-based [`ItemSource`](batch::ItemSource).
//!
//! ## Quick Start
//!
//! ```no_run
//! use llm_extract::{AutoProcessor, ExecCtx};
//! use llm_extract::schema::{FieldSpec, Record, Schema};
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Sentiment {
//!     sentiment: String,
//!     score: f64,
//!     keywords: Vec<String>,
//!     processor_type: String,
//! }
//!
//! impl Record for Sentiment {
//!     fn schema() -> Schema {
//!         Schema::new()
//!             .field(FieldSpec::string("sentiment").with_default(json!("unknown")))
//!             .field(FieldSpec::float("score"))
//!             .field(FieldSpec::string_array("keywords"))
//!             .field(FieldSpec::processor_type())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let processor = AutoProcessor::<Sentiment>::builder("sentiment")
//!         .prompt("Classify the sentiment of this review: {input}")
//!         .build()?;
//!
//!     let ctx = ExecCtx::builder("http://localhost:11434").build();
//!     let output = processor.process_text(&ctx, "Great product, fast shipping").await?;
//!     if let Some(record) = output.payload.as_record() {
//!         println!("{} ({})", record.sentiment, record.score);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Batch Processing
//!
//! ```no_run
//! # use llm_extract::batch::{BatchExecutor, VecSource, WorkItem};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut source = VecSource::new(vec![
//!     WorkItem::new("1", "Love it", "text"),
//!     WorkItem::new("2", "Hate it", "text"),
//! ]);
//! let executor = BatchExecutor::new(2, 2)?;
//! let lengths = executor
//!     .run_all(&mut source, |item| async move { Ok(item.content.len()) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod batch;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod exec_ctx;
pub mod mapper;
pub mod normalize;
pub mod processor;
pub mod prompt;
pub mod schema;
pub mod structmap;

pub use backend::{Backend, MockBackend, ModelConfig, ModelRequest, ModelResponse, OllamaBackend};
pub use batch::{BatchExecutor, ItemSource, VecSource, WorkItem};
pub use diagnostics::ExtractDiagnostics;
pub use error::{ExtractError, Result};
pub use exec_ctx::{ExecCtx, ExecCtxBuilder};
pub use mapper::{FieldMapper, MapperTable, Transform};
pub use normalize::{normalize, Normalized, RawResponse};
pub use processor::{
    AutoProcessor, AutoProcessorBuilder, DebugPayload, ExtractPayload, ProcessorOutput,
};
pub use schema::{FieldKind, FieldSpec, Record, Schema};
