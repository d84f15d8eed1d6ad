//! Collectors made of concurrently running named children.
//!
//! A multi-source collector, e.g. one reading several replication counter
//! objects, splits its work into [`ChildCollector`]s and wraps them in a
//! [`Composite`]. Each child gets its own success and duration sample, so a
//! single unreadable source is visible without hiding the others.

use crate::collector::{run_isolated, Collector, Run, ScrapeContext};
use crate::error::CollectError;
use crate::metrics::{Descriptor, MetricSample, MetricSpec};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error};

const DURATION: MetricSpec = MetricSpec::gauge(
    "collector_duration_seconds",
    "Duration of a child collection.",
    &["collector"],
);
const SUCCESS: MetricSpec = MetricSpec::gauge(
    "collector_success",
    "Whether a child collector succeeded.",
    &["collector"],
);

/// A named part of a [`Composite`] collector.
pub trait ChildCollector: std::fmt::Debug + Send + Sync + 'static {
    /// Child name, used as the `collector` label of its meta samples.
    fn name(&self) -> &str;

    /// Same contract as [`Collector::collect`].
    fn collect(
        &self,
        ctx: &ScrapeContext,
        samples: &mut Vec<MetricSample>,
    ) -> Result<(), CollectError>;
}

/// Runs its children concurrently on every scrape.
///
/// Samples of successful children are emitted, those of failed children are
/// dropped. Children still running at the scrape deadline are reported as
/// timed out and left to finish in the background, so one hung child never
/// hides the output of its siblings. The composite returns
/// [`CollectError::ChildrenFailed`] if at least one child failed, after all
/// children's output has been appended.
#[derive(Debug)]
pub struct Composite {
    name: String,
    children: Vec<Arc<dyn ChildCollector>>,
    duration: Arc<Descriptor>,
    success: Arc<Descriptor>,
}

impl Composite {
    /// Create a composite. Meta samples are named
    /// `<namespace>_<name>_collector_duration_seconds` and
    /// `<namespace>_<name>_collector_success`.
    pub fn new(namespace: &str, name: &str, children: Vec<Box<dyn ChildCollector>>) -> Self {
        Self {
            name: name.to_string(),
            children: children.into_iter().map(Arc::from).collect(),
            duration: Arc::new(Descriptor::from_spec(namespace, name, &DURATION)),
            success: Arc::new(Descriptor::from_spec(namespace, name, &SUCCESS)),
        }
    }

    /// Start every child on its own thread and wait for them until the
    /// deadline of the scrape.
    fn run_children(&self, ctx: &ScrapeContext) -> Vec<Run> {
        let start = Instant::now();
        let (tx, rx) = mpsc::channel();

        for (index, child) in self.children.iter().enumerate() {
            let child = child.clone();
            let ctx = ctx.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let run = run_isolated(|samples| child.collect(&ctx, samples));
                // The receiver is gone once the deadline passed.
                let _ = tx.send((index, run));
            });
        }
        drop(tx);

        let mut runs: Vec<Option<Run>> = self.children.iter().map(|_| None).collect();
        let mut pending = runs.len();
        let mut gave_up = None;
        while pending > 0 {
            let received = match ctx.deadline() {
                Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((index, run)) => {
                    runs[index] = Some(run);
                    pending -= 1;
                }
                Err(e) => {
                    gave_up = Some(e);
                    break;
                }
            }
        }

        let waited = start.elapsed();
        runs.into_iter()
            .map(|run| {
                run.unwrap_or_else(|| match gave_up {
                    Some(RecvTimeoutError::Timeout) => {
                        Run::failed(CollectError::Timeout(waited), waited)
                    }
                    _ => Run::failed(CollectError::Panicked, waited),
                })
            })
            .collect()
    }
}

impl Collector for Composite {
    fn collect(
        &self,
        ctx: &ScrapeContext,
        samples: &mut Vec<MetricSample>,
    ) -> Result<(), CollectError> {
        let runs = self.run_children(ctx);

        let mut failed = 0;
        for (child, run) in self.children.iter().zip(runs) {
            let label = vec![child.name().to_string()];
            let success = match run.result {
                Ok(()) => {
                    debug!(
                        "{} child {} succeeded after {}s",
                        self.name,
                        child.name(),
                        run.elapsed.as_secs_f64()
                    );
                    samples.extend(run.samples);
                    1.0
                }
                Err(e) => {
                    error!(
                        "{} child {} failed after {}s: {}",
                        self.name,
                        child.name(),
                        run.elapsed.as_secs_f64(),
                        e
                    );
                    failed += 1;
                    0.0
                }
            };
            samples.push(MetricSample::new(
                self.duration.clone(),
                run.elapsed.as_secs_f64(),
                label.clone(),
            ));
            samples.push(MetricSample::new(self.success.clone(), success, label));
        }

        if failed > 0 {
            return Err(CollectError::ChildrenFailed {
                failed,
                total: self.children.len(),
            });
        }
        Ok(())
    }
}
