//! Background Scheduler: a dedicated 1-second cooperative tick loop driving
//! batch extraction and health checks (spec §4.11, §5). Calibration updates
//! and skill regeneration are event-triggered inline inside the
//! `link_outcome` request handler, not polled from here — see
//! [`crate::protocol`].

use crate::extractor::BatchExtractor;
use crate::graph::GraphStore;
use crate::queue::SignalQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Cadence of the scheduler's cooperative tick (spec §5).
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Health snapshot reported on each health-check tick (spec §4.11).
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Whether the graph store answered a trivial query.
    pub graph_reachable: bool,
    /// Pending + extracting signal count.
    pub queue_depth: usize,
    /// Seconds since the last completed extraction cycle, if any has run.
    pub last_extraction_age_secs: Option<u64>,
}

/// Runs the periodic background work the daemon needs outside the request
/// path: batch extraction and health checks. Calibration refresh and skill
/// regeneration are not scheduler concerns — they run synchronously inside
/// `link_outcome` the moment a terminal outcome lands, since both are cheap
/// single-domain recomputations and there is no benefit to deferring them to
/// the next tick.
///
/// The extractor and health-check cadences are each driven off the same
/// 1-second tick rather than their own timers, mirroring the teacher's
/// `acquire_lock_with_timeout` busy-loop style (poll at a fixed granularity,
/// act when a threshold elapses) rather than per-task sleeping threads.
pub struct Scheduler {
    graph: Arc<dyn GraphStore>,
    queue: Arc<dyn SignalQueue>,
    extractor: Option<BatchExtractor>,
    extractor_interval: Duration,
    health_interval: Duration,
    stop: Arc<AtomicBool>,
    last_extraction: Mutex<Option<Instant>>,
}

impl Scheduler {
    /// Creates a new scheduler. `extractor` is `None` when no LLM credential
    /// is configured (spec §4.3: L3 is disabled, signals just accumulate).
    #[must_use]
    pub fn new(
        graph: Arc<dyn GraphStore>,
        queue: Arc<dyn SignalQueue>,
        extractor: Option<BatchExtractor>,
        extractor_interval: Duration,
        health_interval: Duration,
    ) -> Self {
        Self {
            graph,
            queue,
            extractor,
            extractor_interval,
            health_interval,
            stop: Arc::new(AtomicBool::new(false)),
            last_extraction: Mutex::new(None),
        }
    }

    /// Requests the scheduler's run loop to exit at the next tick boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Runs one extraction cycle if `extractor_interval` has elapsed since
    /// the last one, regardless of loop cadence; used directly by tests and
    /// by [`Scheduler::run`]'s tick loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying extraction run fails to reach the
    /// queue or graph store (LLM failures are absorbed, see
    /// [`BatchExtractor::run_once`]).
    pub fn maybe_extract(&self, now_wall: i64, now_monotonic: Instant) -> crate::Result<()> {
        let Some(extractor) = &self.extractor else {
            return Ok(());
        };

        let mut last = self.last_extraction.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let due = last.is_none_or(|t| now_monotonic.duration_since(t) >= self.extractor_interval);
        if !due {
            return Ok(());
        }

        let summary = extractor.run_once(now_wall)?;
        tracing::info!(
            dequeued = summary.dequeued,
            extracted = summary.extracted,
            deduplicated = summary.deduplicated,
            failed = summary.failed,
            dead = summary.dead,
            "extraction cycle complete"
        );
        *last = Some(now_monotonic);
        Ok(())
    }

    /// Computes a health snapshot (spec §4.11: graph reachability, queue
    /// depth, last-extraction age).
    ///
    /// # Errors
    ///
    /// Returns an error if the graph or queue cannot be queried at all
    /// (distinct from `graph_reachable: false`, which reflects a query that
    /// completed but found the store empty/unhealthy).
    pub fn health_check(&self) -> crate::Result<HealthReport> {
        let graph_reachable = self.graph.stats().is_ok();
        let queue_depth = self.queue.count_by_status(crate::queue::SignalStatus::Pending)?
            + self.queue.count_by_status(crate::queue::SignalStatus::Extracting)?;
        let last_extraction_age_secs = self
            .last_extraction
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .map(|t| t.elapsed().as_secs());

        Ok(HealthReport {
            graph_reachable,
            queue_depth,
            last_extraction_age_secs,
        })
    }

    /// Runs the scheduler's tick loop on the calling thread until
    /// [`Scheduler::request_stop`] is called. `now_wall_fn` supplies the
    /// wall-clock timestamp used for queue/graph operations.
    pub fn run(&self, now_wall_fn: impl Fn() -> i64) {
        let now = Instant::now();
        let mut last_health_log = now.checked_sub(self.health_interval).unwrap_or(now);
        while !self.stop.load(Ordering::SeqCst) {
            let tick_start = Instant::now();

            if let Err(err) = self.maybe_extract(now_wall_fn(), tick_start) {
                tracing::error!(error = %err, "extraction cycle failed");
            }

            if tick_start.duration_since(last_health_log) >= self.health_interval {
                match self.health_check() {
                    Ok(report) => tracing::info!(
                        graph_reachable = report.graph_reachable,
                        queue_depth = report.queue_depth,
                        last_extraction_age_secs = report.last_extraction_age_secs,
                        "health check"
                    ),
                    Err(err) => tracing::error!(error = %err, "health check failed"),
                }
                last_health_log = tick_start;
            }

            let elapsed = tick_start.elapsed();
            if elapsed < TICK_INTERVAL {
                std::thread::sleep(TICK_INTERVAL - elapsed);
            }
        }
    }

    /// Spawns [`Scheduler::run`] on a dedicated worker thread, returning its
    /// join handle and a stop handle the caller can invoke during shutdown
    /// (spec §5: "workers join with timeout" during graceful shutdown).
    #[must_use]
    pub fn spawn(self: Arc<Self>, now_wall_fn: impl Fn() -> i64 + Send + 'static) -> JoinHandle<()> {
        std::thread::spawn(move || self.run(now_wall_fn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::InMemoryGraphStore;
    use crate::llm::{ExtractionResult, LlmClient};
    use crate::models::Module;
    use crate::queue::memory::{InMemoryExtractionCache, InMemorySignalQueue};
    use crate::queue::Signal;

    struct StubLlm;
    impl LlmClient for StubLlm {
        fn extract_batch(&self, signals: &[Signal]) -> crate::Result<Vec<Option<ExtractionResult>>> {
            Ok(signals
                .iter()
                .map(|_| Some(ExtractionResult {
                    decision_statement: "Use Postgres".to_string(),
                    alternatives: vec![],
                    confidence: 0.8,
                    reasoning: String::new(),
                    module: Module::Database,
                }))
                .collect())
        }
    }

    fn scheduler_with_extractor() -> (Scheduler, Arc<InMemorySignalQueue>, Arc<InMemoryGraphStore>) {
        let queue = Arc::new(InMemorySignalQueue::new());
        let cache = Arc::new(InMemoryExtractionCache::new());
        let graph = Arc::new(InMemoryGraphStore::new());
        let extractor = BatchExtractor::new(queue.clone(), cache, Arc::new(StubLlm), graph.clone(), 10);
        let scheduler = Scheduler::new(
            graph.clone(),
            queue.clone(),
            Some(extractor),
            Duration::from_secs(3600),
            Duration::from_secs(30),
        );
        (scheduler, queue, graph)
    }

    #[test]
    fn maybe_extract_runs_once_per_interval() {
        let (scheduler, queue, graph) = scheduler_with_extractor();
        queue
            .enqueue(&Signal::new("p", "I recommend using Postgres.", vec!["i_recommend".to_string()], Module::Database, 0))
            .unwrap();

        let t0 = Instant::now();
        scheduler.maybe_extract(0, t0).unwrap();
        assert_eq!(graph.stats().unwrap().decision_count, 1);

        queue
            .enqueue(&Signal::new("p2", "I recommend using Postgres.", vec!["i_recommend".to_string()], Module::Database, 0))
            .unwrap();
        scheduler.maybe_extract(1, t0).unwrap();
        assert_eq!(graph.stats().unwrap().decision_count, 1, "interval not elapsed, no second run");
    }

    #[test]
    fn disabled_extractor_is_a_no_op() {
        let queue = Arc::new(InMemorySignalQueue::new());
        let graph = Arc::new(InMemoryGraphStore::new());
        let scheduler = Scheduler::new(graph, queue, None, Duration::from_secs(1), Duration::from_secs(30));
        scheduler.maybe_extract(0, Instant::now()).unwrap();
    }

    #[test]
    fn health_check_reports_queue_depth() {
        let (scheduler, queue, _graph) = scheduler_with_extractor();
        queue
            .enqueue(&Signal::new("p", "I recommend using Postgres.", vec!["i_recommend".to_string()], Module::Database, 0))
            .unwrap();
        let report = scheduler.health_check().unwrap();
        assert!(report.graph_reachable);
        assert_eq!(report.queue_depth, 1);
        assert_eq!(report.last_extraction_age_secs, None);
    }

    #[test]
    fn request_stop_halts_the_run_loop() {
        let (scheduler, _queue, _graph) = scheduler_with_extractor();
        let scheduler = Arc::new(scheduler);
        scheduler.request_stop();
        let handle = Arc::clone(&scheduler).spawn(|| 0);
        handle.join().unwrap();
    }
}
