//! Scrape orchestration.
//!
//! See [`Scraper`] for details.

use crate::collector::{run_isolated, Collector, Run, ScrapeContext};
use crate::counters::{FetchError, Snapshot, SnapshotProvider};
use crate::error::{CollectError, ConfigError};
use crate::metrics::{Descriptor, MetricSample, MetricSpec};
use crate::registry::{BuildContext, EnabledSet, Registry};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Time a collector gets past the scrape deadline to hand in what it has.
///
/// Deadline aware collectors such as [`Composite`](crate::collector::composite::Composite)
/// stop at the deadline itself and need a moment to assemble their output.
pub const DEADLINE_GRACE: Duration = Duration::from_millis(100);

const DURATION: MetricSpec = MetricSpec::gauge(
    "collector_duration_seconds",
    "Duration of a collection.",
    &["collector"],
);
const SUCCESS: MetricSpec = MetricSpec::gauge(
    "collector_success",
    "Whether the collector was successful.",
    &["collector"],
);

/// Result of one top-level collector in one scrape.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    /// Collector name.
    pub collector: String,
    /// Whether the collector succeeded.
    pub success: bool,
    /// Time the collector took, or waited for before timing out.
    pub duration: Duration,
    /// Error message of a failed collector.
    pub error: Option<String>,
}

/// Output of [`Scraper::scrape`].
#[derive(Debug, Clone, Default)]
pub struct ScrapeReport {
    /// Collector samples followed by one duration and success sample per
    /// collector.
    pub samples: Vec<MetricSample>,
    /// One outcome per collector, in enabled order.
    pub outcomes: Vec<ScrapeOutcome>,
}

impl ScrapeReport {
    /// Returns the outcome of the given collector.
    pub fn outcome(&self, collector: &str) -> Option<&ScrapeOutcome> {
        self.outcomes.iter().find(|o| o.collector == collector)
    }
}

/// A scrape could not produce any output.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The scrape context could not be built.
    #[error("failed to build scrape context: {0}")]
    Context(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Abandoned,
    Finished,
}

/// One enabled collector and the number of its runs that outlived their
/// scrape and are still executing.
#[derive(Debug)]
struct Unit {
    name: String,
    collector: Arc<dyn Collector>,
    stalled: Arc<AtomicUsize>,
}

/// Marks a run finished when the blocking task ends, releasing the stall
/// count if the scrape already gave up on it.
struct RunGuard {
    state: Arc<Mutex<RunState>>,
    stalled: Arc<AtomicUsize>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if *state == RunState::Abandoned {
            self.stalled.fetch_sub(1, Ordering::AcqRel);
        }
        *state = RunState::Finished;
    }
}

/// Runs the enabled collectors against one counter snapshot per scrape.
///
/// Every scrape fetches the union of the collectors' dependencies in a single
/// call to the [`SnapshotProvider`], then runs all collectors concurrently on
/// the blocking thread pool. A failing, panicking or late collector only
/// affects its own `collector_success` sample.
///
/// A collector still executing after its scrape timed out is not started
/// again until that run returns. Later scrapes report it as failed right
/// away, so a hung collector holds at most one blocking thread.
#[derive(Debug)]
pub struct Scraper {
    units: Vec<Unit>,
    dependencies: BTreeSet<String>,
    provider: Arc<dyn SnapshotProvider>,
    duration: Arc<Descriptor>,
    success: Arc<Descriptor>,
}

impl Scraper {
    /// Create a scraper. Meta samples are named
    /// `<namespace>_exporter_collector_duration_seconds` and
    /// `<namespace>_exporter_collector_success`.
    pub fn new(
        namespace: &str,
        collectors: Vec<(String, Arc<dyn Collector>)>,
        dependencies: BTreeSet<String>,
        provider: Arc<dyn SnapshotProvider>,
    ) -> Self {
        Self {
            units: collectors
                .into_iter()
                .map(|(name, collector)| Unit {
                    name,
                    collector,
                    stalled: Arc::new(AtomicUsize::new(0)),
                })
                .collect(),
            dependencies,
            provider,
            duration: Arc::new(Descriptor::from_spec(namespace, "exporter", &DURATION)),
            success: Arc::new(Descriptor::from_spec(namespace, "exporter", &SUCCESS)),
        }
    }

    /// Build the enabled collectors of a registry.
    pub fn from_registry(
        registry: &Registry,
        enabled: &EnabledSet,
        ctx: &BuildContext<'_>,
        provider: Arc<dyn SnapshotProvider>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            &ctx.config.namespace,
            registry.build(enabled, ctx)?,
            registry.dependencies(enabled),
            provider,
        ))
    }

    /// Returns the collector names in run order.
    pub fn collectors(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|u| u.name.as_str())
    }

    /// Run one scrape.
    ///
    /// The deadline is handed to the counter source and to every collector.
    /// Collectors still running [`DEADLINE_GRACE`] after `timeout` elapsed
    /// are reported as failed.
    pub async fn scrape(&self, timeout: Option<Duration>) -> Result<ScrapeReport, ScrapeError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let snapshot = self.snapshot(deadline).await?;
        let ctx = ScrapeContext::new(snapshot, deadline);

        // All units start before the first one is awaited, and they share a
        // single absolute deadline.
        let started: Vec<_> = self.units.iter().map(|unit| start(unit, &ctx)).collect();
        let cutoff = deadline.map(|d| tokio::time::Instant::from_std(d + DEADLINE_GRACE));

        let mut report = ScrapeReport::default();
        let mut meta = Vec::with_capacity(self.units.len() * 2);
        for (unit, started) in self.units.iter().zip(started) {
            let run = finish(started, cutoff).await;
            let outcome = outcome(&unit.name, run.result, run.elapsed);
            // Composites keep the output of their successful children.
            report.samples.extend(run.samples);

            let label = vec![outcome.collector.clone()];
            meta.push(MetricSample::new(
                self.duration.clone(),
                outcome.duration.as_secs_f64(),
                label.clone(),
            ));
            meta.push(MetricSample::new(
                self.success.clone(),
                if outcome.success { 1.0 } else { 0.0 },
                label,
            ));
            report.outcomes.push(outcome);
        }
        report.samples.extend(meta);

        Ok(report)
    }

    async fn snapshot(&self, deadline: Option<Instant>) -> Result<Snapshot, ScrapeError> {
        if self.dependencies.is_empty() {
            return Ok(Snapshot::default());
        }

        let provider = self.provider.clone();
        let objects = self.dependencies.clone();
        let task = tokio::task::spawn_blocking(move || provider.fetch(&objects, deadline));

        let joined = match deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), task).await
                {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!("counter fetch timed out");
                        return Ok(Snapshot::failed(&self.dependencies, FetchError::TimedOut));
                    }
                }
            }
            None => task.await,
        };

        match joined {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(e)) => {
                warn!("counter fetch failed: {}", e);
                Ok(Snapshot::failed(&self.dependencies, e))
            }
            Err(e) => Err(ScrapeError::Context(e.to_string())),
        }
    }
}

/// A collector run handed to the blocking pool, or the reason it was not.
enum Started {
    Running {
        task: tokio::task::JoinHandle<Run>,
        state: Arc<Mutex<RunState>>,
        stalled: Arc<AtomicUsize>,
        at: Instant,
    },
    Skipped(Run),
}

fn start(unit: &Unit, ctx: &ScrapeContext) -> Started {
    let stalled = unit.stalled.load(Ordering::Acquire);
    if stalled > 0 {
        return Started::Skipped(Run::failed(CollectError::Stalled(stalled), Duration::ZERO));
    }

    let state = Arc::new(Mutex::new(RunState::Running));
    let guard = RunGuard {
        state: state.clone(),
        stalled: unit.stalled.clone(),
    };
    let collector = unit.collector.clone();
    let ctx = ctx.clone();
    let task = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        run_isolated(|samples| collector.collect(&ctx, samples))
    });

    Started::Running {
        task,
        state,
        stalled: unit.stalled.clone(),
        at: Instant::now(),
    }
}

async fn finish(started: Started, cutoff: Option<tokio::time::Instant>) -> Run {
    let (task, state, stalled, at) = match started {
        Started::Skipped(run) => return run,
        Started::Running {
            task,
            state,
            stalled,
            at,
        } => (task, state, stalled, at),
    };

    let joined = match cutoff {
        Some(cutoff) => match tokio::time::timeout_at(cutoff, task).await {
            Ok(joined) => joined,
            Err(_) => {
                {
                    let mut state = state.lock();
                    if *state == RunState::Running {
                        *state = RunState::Abandoned;
                        stalled.fetch_add(1, Ordering::AcqRel);
                    }
                }
                let waited = at.elapsed();
                return Run::failed(CollectError::Timeout(waited), waited);
            }
        },
        None => task.await,
    };
    joined.unwrap_or_else(|_| Run::failed(CollectError::Panicked, at.elapsed()))
}

fn outcome(name: &str, result: Result<(), CollectError>, duration: Duration) -> ScrapeOutcome {
    let error = match result {
        Ok(()) => {
            debug!(
                "collector {} succeeded after {}s",
                name,
                duration.as_secs_f64()
            );
            None
        }
        Err(e) => {
            error!(
                "collector {} failed after {}s: {}",
                name,
                duration.as_secs_f64(),
                e
            );
            Some(e.to_string())
        }
    };

    ScrapeOutcome {
        collector: name.to_string(),
        success: error.is_none(),
        duration,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterTable;
    use crate::metrics::MetricType;

    #[derive(Debug)]
    struct Reads(&'static str);

    impl Collector for Reads {
        fn collect(
            &self,
            ctx: &ScrapeContext,
            samples: &mut Vec<MetricSample>,
        ) -> Result<(), CollectError> {
            let table = ctx.table(self.0)?;
            let d = Arc::new(Descriptor::new(
                format!("rows_{}", table.object()),
                "",
                vec![],
                MetricType::Gauge,
            ));
            samples.push(MetricSample::new(d, table.instances().len() as f64, vec![]));
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Panics;

    impl Collector for Panics {
        fn collect(&self, _: &ScrapeContext, _: &mut Vec<MetricSample>) -> Result<(), CollectError> {
            panic!("collector bug");
        }
    }

    #[derive(Debug)]
    struct Tables;

    impl SnapshotProvider for Tables {
        fn fetch(
            &self,
            objects: &BTreeSet<String>,
            _deadline: Option<Instant>,
        ) -> Result<Snapshot, FetchError> {
            let mut snapshot = Snapshot::default();
            for o in objects {
                snapshot.insert(CounterTable::new(o.clone()));
            }
            Ok(snapshot)
        }
    }

    #[derive(Debug)]
    struct Down;

    impl SnapshotProvider for Down {
        fn fetch(&self, _: &BTreeSet<String>, _: Option<Instant>) -> Result<Snapshot, FetchError> {
            Err(FetchError::Unavailable("perflib".into()))
        }
    }

    fn scraper(provider: Arc<dyn SnapshotProvider>) -> Scraper {
        Scraper::new(
            "windows",
            vec![
                ("a".to_string(), Arc::new(Reads("x")) as Arc<dyn Collector>),
                ("p".to_string(), Arc::new(Panics) as Arc<dyn Collector>),
            ],
            ["x".to_string()].into_iter().collect(),
            provider,
        )
    }

    #[tokio::test]
    async fn panic_is_isolated() {
        let report = scraper(Arc::new(Tables)).scrape(None).await.unwrap();

        assert!(report.outcome("a").unwrap().success);
        let p = report.outcome("p").unwrap();
        assert!(!p.success);
        assert_eq!(Some("collector panicked"), p.error.as_deref());
        assert!(report.samples.iter().any(|s| s.name() == "rows_x"));
    }

    #[tokio::test]
    async fn fetch_failure_degrades_dependents() {
        let report = scraper(Arc::new(Down)).scrape(None).await.unwrap();

        assert!(!report.outcome("a").unwrap().success);
        let success: Vec<_> = report
            .samples
            .iter()
            .filter(|s| s.name() == "windows_exporter_collector_success")
            .map(|s| (s.label("collector").unwrap(), s.value()))
            .collect();
        assert_eq!(vec![("a", 0.0), ("p", 0.0)], success);
    }

    #[tokio::test]
    async fn meta_pair_per_collector() {
        let report = scraper(Arc::new(Tables)).scrape(None).await.unwrap();

        let durations = report
            .samples
            .iter()
            .filter(|s| s.name() == "windows_exporter_collector_duration_seconds")
            .count();
        assert_eq!(2, durations);
        assert_eq!(2, report.outcomes.len());
    }
}
