//! Event system for extraction and batch lifecycle hooks.
//!
//! Provides an optional, non-intrusive way to observe processing.
//! Processors emit events when an extraction starts, falls back, or
//! finishes; the batch executor emits batch and item lifecycle events.
//! Users can implement [`EventHandler`] to receive these for logging or
//! progress tracking.

use std::sync::Arc;

/// Events emitted during extraction and batch processing.
#[derive(Debug, Clone)]
pub enum Event {
    /// A processor has started handling one item.
    ExtractStart {
        /// Registered task name of the processor.
        task: String,
    },
    /// A processor has finished handling one item.
    ExtractEnd {
        /// Registered task name of the processor.
        task: String,
        /// Whether the response was mapped without fallback or rejection.
        clean: bool,
    },
    /// The normalizer could not find parseable JSON and substituted the
    /// fully-defaulted fallback mapping.
    ParseFallback {
        /// Registered task name of the processor.
        task: String,
    },
    /// Structural validation rejected the candidate record.
    StructuralReject {
        /// Registered task name of the processor.
        task: String,
        /// The rejection reason.
        reason: String,
    },
    /// A batch of items has started.
    BatchStart {
        /// Zero-based batch index within the run.
        index: usize,
        /// Number of items in this batch.
        size: usize,
    },
    /// A batch of items has finished.
    BatchEnd {
        /// Zero-based batch index within the run.
        index: usize,
        /// Whether every item in the batch succeeded.
        ok: bool,
    },
    /// A single work item has finished.
    ItemEnd {
        /// Item identifier.
        id: String,
        /// Whether the item's processing function succeeded.
        ok: bool,
    },
}

/// Handler for extraction and batch lifecycle events.
///
/// This is entirely optional -- processors and the executor work without
/// an event handler.
///
/// # Example
///
/// ```
/// use llm_extract::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::ParseFallback { task } => println!("[fallback] {}", task),
///             Event::BatchEnd { index, ok } => println!("[batch {}] ok={}", index, ok),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when a component emits an event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use llm_extract::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::ItemEnd { id, ok } = event {
///         println!("{} ok={}", id, ok);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
