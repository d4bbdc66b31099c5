//! Bounded-concurrency batch executor.
//!
//! [`BatchExecutor`] pulls items from a pull-based [`ItemSource`] in
//! fixed-size batches and processes each batch's items in parallel under
//! a worker cap. Batches are strictly sequential; only intra-batch item
//! processing is parallel. The admission gate is a counting semaphore
//! capped at `max_workers` (clamped to the available hardware
//! parallelism); results accumulate in a single lock-guarded buffer.
//!
//! Error policy is all-or-nothing across the entire run: if any worker in
//! a batch reports an error, the whole run fails with that error and no
//! results are returned, including items from earlier, fully successful
//! batches. End-of-stream is not an error.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

use crate::error::{ExtractError, Result};
use crate::events::{emit, Event, EventHandler};

/// A generic unit of input: identifier, content, content-kind tag, and a
/// processing-history mapping the executor annotates.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Item identifier.
    pub id: String,
    /// Content payload.
    pub content: String,
    /// Content-kind tag (e.g. `"text"`).
    pub kind: String,
    /// Processing history, annotated by the executor.
    pub history: HashMap<String, String>,
}

impl WorkItem {
    /// Create a work item with an empty history.
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            kind: kind.into(),
            history: HashMap::new(),
        }
    }

    /// Record a processing-history entry.
    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.history.insert(key.into(), value.into());
    }
}

/// A pull-based stream of work items.
///
/// `next` yields one item per call; `Ok(None)` signals end-of-stream for
/// the whole run. Errors from the source abort the run.
pub trait ItemSource: Send {
    /// Pull the next item, or `None` at end-of-stream.
    fn next(&mut self) -> Result<Option<WorkItem>>;

    /// Release any resources held by the source.
    fn close(&mut self) {}
}

/// An in-memory [`ItemSource`] over a vector of items.
#[derive(Debug, Default)]
pub struct VecSource {
    items: VecDeque<WorkItem>,
}

impl VecSource {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

impl ItemSource for VecSource {
    fn next(&mut self) -> Result<Option<WorkItem>> {
        Ok(self.items.pop_front())
    }
}

/// Drives bounded-parallel processing of a streamed item source.
///
/// # Example
///
/// ```
/// use llm_extract::batch::{BatchExecutor, VecSource, WorkItem};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut source = VecSource::new(vec![
///     WorkItem::new("1", "first", "text"),
///     WorkItem::new("2", "second", "text"),
/// ]);
/// let executor = BatchExecutor::new(2, 2)?;
/// let results = executor
///     .run_all(&mut source, |item| async move { Ok(item.content.len()) })
///     .await?;
/// assert_eq!(results.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct BatchExecutor {
    batch_size: usize,
    max_workers: usize,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl BatchExecutor {
    /// Create an executor with the given batch size and worker cap.
    ///
    /// `max_workers` is clamped to the available hardware parallelism and
    /// to at least 1. A zero `batch_size` is a configuration error.
    pub fn new(batch_size: usize, max_workers: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(ExtractError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Ok(Self {
            batch_size,
            max_workers: max_workers.clamp(1, hardware),
            event_handler: None,
        })
    }

    /// Attach an event handler for batch and item lifecycle events.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// The effective worker cap after clamping.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Process every item the source yields.
    ///
    /// Pulls up to `batch_size` items per batch; one worker per item, gated
    /// by the admission semaphore. Waits for the whole batch before pulling
    /// the next. On any item error the run fails with that error and all
    /// accumulated results are discarded. Result order is completion order,
    /// not source order.
    pub async fn run_all<S, F, Fut, R>(&self, source: &mut S, per_item: F) -> Result<Vec<R>>
    where
        S: ItemSource,
        F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Send + 'static,
    {
        let per_item = Arc::new(per_item);
        let gate = Arc::new(Semaphore::new(self.max_workers));
        let results = Arc::new(Mutex::new(Vec::new()));
        let mut batch_index = 0usize;

        loop {
            let mut batch = Vec::with_capacity(self.batch_size);
            while batch.len() < self.batch_size {
                match source.next()? {
                    Some(item) => batch.push(item),
                    None => break,
                }
            }
            if batch.is_empty() {
                // End-of-stream terminates the loop; not an error.
                source.close();
                break;
            }

            emit(
                &self.event_handler,
                Event::BatchStart {
                    index: batch_index,
                    size: batch.len(),
                },
            );

            let mut handles = Vec::with_capacity(batch.len());
            for mut item in batch {
                item.annotate("batch", batch_index.to_string());
                let gate = Arc::clone(&gate);
                let per_item = Arc::clone(&per_item);
                let results = Arc::clone(&results);
                let event_handler = self.event_handler.clone();
                let id = item.id.clone();

                handles.push(tokio::spawn(async move {
                    let _permit = gate
                        .acquire_owned()
                        .await
                        .map_err(|_| ExtractError::Other("admission gate closed".to_string()))?;
                    let outcome = (*per_item)(item).await;
                    emit(
                        &event_handler,
                        Event::ItemEnd {
                            id,
                            ok: outcome.is_ok(),
                        },
                    );
                    let value = outcome?;
                    results.lock().await.push(value);
                    Ok::<(), ExtractError>(())
                }));
            }

            // Wait for every worker in the batch before pulling more items.
            let mut batch_error: Option<ExtractError> = None;
            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        if batch_error.is_none() {
                            batch_error = Some(err);
                        }
                    }
                    Err(join_err) => {
                        if batch_error.is_none() {
                            batch_error =
                                Some(ExtractError::Other(format!("worker panicked: {}", join_err)));
                        }
                    }
                }
            }

            emit(
                &self.event_handler,
                Event::BatchEnd {
                    index: batch_index,
                    ok: batch_error.is_none(),
                },
            );

            if let Some(err) = batch_error {
                // All-or-nothing: earlier batches are discarded too.
                source.close();
                return Err(err);
            }
            batch_index += 1;
        }

        let collected = std::mem::take(&mut *results.lock().await);
        Ok(collected)
    }
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("batch_size", &self.batch_size)
            .field("max_workers", &self.max_workers)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn items(n: usize) -> Vec<WorkItem> {
        (1..=n)
            .map(|i| WorkItem::new(i.to_string(), format!("content-{}", i), "text"))
            .collect()
    }

    #[tokio::test]
    async fn test_run_all_collects_everything() {
        let mut source = VecSource::new(items(5));
        let executor = BatchExecutor::new(2, 2).unwrap();
        let mut results = executor
            .run_all(&mut source, |item| async move { Ok(item.id.clone()) })
            .await
            .unwrap();
        results.sort();
        assert_eq!(results, vec!["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_empty_source_yields_empty_results() {
        let mut source = VecSource::new(vec![]);
        let executor = BatchExecutor::new(3, 2).unwrap();
        let results: Vec<String> = executor
            .run_all(&mut source, |item| async move { Ok(item.id.clone()) })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_mid_batch_failure_discards_all_results() {
        // 5 items, batch size 2: item 4 fails in the second batch. The run
        // must fail and return nothing, including the 3 completed items.
        let mut source = VecSource::new(items(5));
        let executor = BatchExecutor::new(2, 2).unwrap();
        let result = executor
            .run_all(&mut source, |item| async move {
                if item.id == "4" {
                    Err(ExtractError::Other("model exploded".to_string()))
                } else {
                    Ok(item.id.clone())
                }
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_failing_batch_stops_later_batches() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let mut source = VecSource::new(items(6));
        let executor = BatchExecutor::new(2, 2).unwrap();
        let seen = Arc::clone(&started);
        let result = executor
            .run_all(&mut source, move |item| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().await.push(item.id.clone());
                    if item.id == "3" {
                        Err(ExtractError::Other("boom".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert!(result.is_err());
        // Items 5 and 6 belong to the third batch and must never start.
        let seen = started.lock().await;
        assert!(!seen.contains(&"5".to_string()));
        assert!(!seen.contains(&"6".to_string()));
    }

    #[tokio::test]
    async fn test_batches_are_sequential() {
        // Every item of batch 0 must start before any item of batch 1.
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut source = VecSource::new(items(4));
        let executor = BatchExecutor::new(2, 2).unwrap();
        let seen = Arc::clone(&order);
        executor
            .run_all(&mut source, move |item| {
                let seen = Arc::clone(&seen);
                async move {
                    let batch = item.history.get("batch").cloned().unwrap_or_default();
                    seen.lock().await.push(batch);
                    Ok(())
                }
            })
            .await
            .unwrap();
        let seen = order.lock().await;
        assert_eq!(seen.len(), 4);
        assert_eq!(&seen[..2], &["0", "0"]);
        assert_eq!(&seen[2..], &["1", "1"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_cap_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut source = VecSource::new(items(6));
        let executor = BatchExecutor::new(6, 2).unwrap();
        let counter = Arc::clone(&in_flight);
        let peak_seen = Arc::clone(&peak);
        executor
            .run_all(&mut source, move |_item| {
                let counter = Arc::clone(&counter);
                let peak_seen = Arc::clone(&peak_seen);
                async move {
                    let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    peak_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    counter.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_history_annotated_with_batch_index() {
        let mut source = VecSource::new(items(3));
        let executor = BatchExecutor::new(2, 2).unwrap();
        let mut batches = executor
            .run_all(&mut source, |item| async move {
                Ok(item.history.get("batch").cloned().unwrap_or_default())
            })
            .await
            .unwrap();
        batches.sort();
        assert_eq!(batches, vec!["0", "0", "1"]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(BatchExecutor::new(0, 2).is_err());
    }

    #[test]
    fn test_worker_cap_clamped() {
        let executor = BatchExecutor::new(1, 100_000).unwrap();
        assert!(executor.max_workers() >= 1);
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        assert!(executor.max_workers() <= hardware);
    }
}
