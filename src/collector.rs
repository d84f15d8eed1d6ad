//! Collector contract.
//!
//! See [`Collector`] for details.

use crate::counters::{CounterTable, Snapshot};
use crate::error::CollectError;
use crate::metrics::MetricSample;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod composite;
pub mod filter;
pub mod table;

/// Read-only state of a single scrape, shared by all collectors of that
/// scrape.
///
/// Cloning is cheap, the snapshot is reference counted.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    snapshot: Arc<Snapshot>,
    started: Instant,
    deadline: Option<Instant>,
}

impl ScrapeContext {
    /// Create a context around a freshly fetched snapshot.
    pub fn new(snapshot: Snapshot, deadline: Option<Instant>) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            started: Instant::now(),
            deadline,
        }
    }

    /// Returns the point in time after which the scrape gives up on
    /// outstanding collectors.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` once the deadline has passed.
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails with [`CollectError::Timeout`] once the deadline has passed.
    ///
    /// Long running collectors call this between units of work so a late
    /// scrape stops early instead of finishing work nobody waits for.
    pub fn check_deadline(&self) -> Result<(), CollectError> {
        if self.expired() {
            return Err(CollectError::Timeout(self.started.elapsed()));
        }
        Ok(())
    }

    /// Returns the table of a declared counter object.
    pub fn table(&self, object: &str) -> Result<&CounterTable, CollectError> {
        match self.snapshot.get(object) {
            Some(Ok(table)) => Ok(table),
            Some(Err(e)) => Err(CollectError::Fetch(e.clone())),
            None => Err(CollectError::MissingObject(object.to_string())),
        }
    }
}

/// Output of one isolated collector or child run.
#[derive(Debug)]
pub(crate) struct Run {
    pub(crate) samples: Vec<MetricSample>,
    pub(crate) result: Result<(), CollectError>,
    pub(crate) elapsed: Duration,
}

impl Run {
    /// A run that produced nothing, e.g. because it missed the deadline.
    pub(crate) fn failed(error: CollectError, elapsed: Duration) -> Self {
        Self {
            samples: Vec::new(),
            result: Err(error),
            elapsed,
        }
    }
}

/// Time `collect` and turn a panic into [`CollectError::Panicked`].
pub(crate) fn run_isolated<F>(collect: F) -> Run
where
    F: FnOnce(&mut Vec<MetricSample>) -> Result<(), CollectError>,
{
    let start = Instant::now();
    let mut samples = Vec::new();
    match panic::catch_unwind(AssertUnwindSafe(|| collect(&mut samples))) {
        Ok(result) => Run {
            samples,
            result,
            elapsed: start.elapsed(),
        },
        Err(_) => Run::failed(CollectError::Panicked, start.elapsed()),
    }
}

/// The [`Collector`] abstraction turns the counters of one scrape into
/// [`MetricSample`]s.
///
/// Collectors are built once at startup by their
/// [`Registry`](crate::registry::Registry) constructor and called
/// concurrently on every scrape. They must neither block on anything outside
/// the current scrape nor keep mutable state across scrapes without
/// synchronization.
///
/// A collector whose input is unavailable returns an error and leaves
/// `samples` untouched. [`Composite`](composite::Composite) collectors are the
/// exception: they emit the data of their successful children and still
/// return an error.
///
/// ```
/// # use counter_exporter::collector::{Collector, ScrapeContext};
/// # use counter_exporter::error::CollectError;
/// # use counter_exporter::metrics::{Descriptor, MetricSample, MetricSpec};
/// # use std::sync::Arc;
/// #
/// #[derive(Debug)]
/// struct Processors {
///     count: Arc<Descriptor>,
/// }
///
/// impl Collector for Processors {
///     fn collect(
///         &self,
///         ctx: &ScrapeContext,
///         samples: &mut Vec<MetricSample>,
///     ) -> Result<(), CollectError> {
///         let table = ctx.table("Processor")?;
///         let count = table.instances().len() as f64;
///         samples.push(MetricSample::new(self.count.clone(), count, vec![]));
///         Ok(())
///     }
/// }
///
/// const COUNT: MetricSpec = MetricSpec::gauge("count", "Number of processors.", &[]);
/// let collector = Processors {
///     count: Arc::new(Descriptor::from_spec("windows", "cpu", &COUNT)),
/// };
/// # let _ = collector;
/// ```
pub trait Collector: std::fmt::Debug + Send + Sync + 'static {
    /// Called once per scrape. Appends this collector's samples.
    fn collect(
        &self,
        ctx: &ScrapeContext,
        samples: &mut Vec<MetricSample>,
    ) -> Result<(), CollectError>;
}
