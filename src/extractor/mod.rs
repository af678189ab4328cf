//! Batch Extractor (L3): turns queued signals into Decision nodes via a
//! single batched external-LLM call (spec §4.3).

use crate::graph::GraphStore;
use crate::llm::LlmClient;
use crate::models::{Decision, fingerprint};
use crate::queue::{ExtractionCache, Signal, SignalQueue};
use crate::Result;
use std::sync::Arc;

/// Identifier attached to Decisions created by the extractor, distinguishing
/// them from decisions recorded directly via `record_decision`.
const EXTRACTOR_AUTHOR: &str = "l3_extractor";

/// Outcome counts from one [`BatchExtractor::run_once`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Signals dequeued for this run.
    pub dequeued: usize,
    /// New Decision nodes created.
    pub extracted: usize,
    /// Signals whose fingerprint already existed in the cache, so no new
    /// Decision was created (but the signal is still marked extracted).
    pub deduplicated: usize,
    /// Signals that failed and were scheduled for retry.
    pub failed: usize,
    /// Signals that exhausted their retry budget.
    pub dead: usize,
}

/// Periodically dequeues pending signals, sends them to the LLM as one
/// batch, and materializes Decision nodes from the response (spec §4.3).
///
/// Disabled at the call site (not constructed) when no LLM credential is
/// configured; L2 signals then simply accumulate (spec §4.3: "When no LLM
/// credential is configured, L3 is disabled").
pub struct BatchExtractor {
    queue: Arc<dyn SignalQueue>,
    cache: Arc<dyn ExtractionCache>,
    llm: Arc<dyn LlmClient>,
    graph: Arc<dyn GraphStore>,
    batch_size: usize,
}

impl BatchExtractor {
    /// Creates a new extractor over the given collaborators.
    #[must_use]
    pub fn new(
        queue: Arc<dyn SignalQueue>,
        cache: Arc<dyn ExtractionCache>,
        llm: Arc<dyn LlmClient>,
        graph: Arc<dyn GraphStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            queue,
            cache,
            llm,
            graph,
            batch_size,
        }
    }

    /// Runs one extraction cycle: dequeues up to `batch_size` due signals,
    /// sends them as one LLM request, and creates Decision nodes for the
    /// results that are not already in the extraction cache.
    ///
    /// A whole-request failure (network error, quota, a response that isn't
    /// a JSON array at all) is applied to every signal in the batch, since
    /// no per-signal result could be recovered from it. A response that
    /// parses as a JSON array but contains one or more malformed elements
    /// only fails the corresponding signal(s) (spec §9) — every other
    /// element in the batch is still matched up by index and processed
    /// normally.
    ///
    /// # Errors
    ///
    /// Returns an error only if the queue or graph store itself is
    /// unavailable; LLM failures are absorbed into `summary.failed`/`dead`
    /// and do not propagate.
    pub fn run_once(&self, now: i64) -> Result<ExtractionSummary> {
        let mut batch = self.queue.dequeue_batch(self.batch_size, now)?;
        let mut summary = ExtractionSummary {
            dequeued: batch.len(),
            ..ExtractionSummary::default()
        };
        if batch.is_empty() {
            return Ok(summary);
        }

        match self.llm.extract_batch(&batch) {
            Ok(results) => {
                for (signal, result) in batch.iter_mut().zip(results.into_iter()) {
                    match result {
                        Some(result) => {
                            let key = fingerprint::normalize(&result.decision_statement, result.module);
                            match self.cache.get(&key)? {
                                Some(_) => {
                                    summary.deduplicated += 1;
                                },
                                None => {
                                    let decision = Decision::new(
                                        result.decision_statement.clone(),
                                        result.alternatives.clone(),
                                        result.confidence,
                                        result.module,
                                        EXTRACTOR_AUTHOR,
                                        now,
                                    );
                                    self.graph.put_decision(&decision)?;
                                    self.cache.put(&key, &decision.id)?;
                                    summary.extracted += 1;
                                },
                            }
                            signal.record_success();
                        },
                        None => {
                            signal.record_failure(now);
                            match signal.status {
                                crate::queue::SignalStatus::Dead => summary.dead += 1,
                                _ => summary.failed += 1,
                            }
                        },
                    }
                    self.queue.update(signal)?;
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, batch_size = batch.len(), "batch extraction request failed");
                for signal in &mut batch {
                    signal.record_failure(now);
                    match signal.status {
                        crate::queue::SignalStatus::Dead => summary.dead += 1,
                        _ => summary.failed += 1,
                    }
                    self.queue.update(signal)?;
                }
            },
        }

        Ok(summary)
    }
}
