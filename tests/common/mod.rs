#![allow(dead_code)]

use counter_exporter::collector::composite::ChildCollector;
use counter_exporter::collector::{Collector, ScrapeContext};
use counter_exporter::counters::{
    CounterInstance, CounterTable, FetchError, Snapshot, SnapshotProvider,
};
use counter_exporter::error::CollectError;
use counter_exporter::metrics::{Descriptor, MetricSample, MetricType};
use counter_exporter::scrape::ScrapeReport;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Serves a fixed set of objects, every one with a single instance whose
/// `value` counter is the number of the fetch. Records every call.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    available: BTreeSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<BTreeSet<String>>>,
}

impl RecordingProvider {
    pub fn new(available: &[&str]) -> Self {
        Self {
            available: available.iter().map(|s| s.to_string()).collect(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleeps this long in every fetch, ignoring the deadline.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<BTreeSet<String>> {
        self.calls.lock().clone()
    }
}

impl SnapshotProvider for RecordingProvider {
    fn fetch(
        &self,
        objects: &BTreeSet<String>,
        _deadline: Option<Instant>,
    ) -> Result<Snapshot, FetchError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let fetch = {
            let mut calls = self.calls.lock();
            calls.push(objects.clone());
            calls.len() as f64
        };

        let mut snapshot = Snapshot::default();
        for object in objects {
            if self.available.contains(object) {
                snapshot.insert(
                    CounterTable::new(object.clone())
                        .with_instance(CounterInstance::named("_Total").with_counter("value", fetch)),
                );
            } else {
                snapshot.insert_error(object.clone(), FetchError::NotFound(object.clone()));
            }
        }
        Ok(snapshot)
    }
}

/// Emits the `value` counter of every object it reads, failing if any of
/// them is unavailable. Counts its runs.
#[derive(Debug)]
pub struct Reads {
    name: String,
    objects: Vec<&'static str>,
    delay: Option<Duration>,
    descriptor: Arc<Descriptor>,
    calls: AtomicUsize,
}

impl Reads {
    pub fn new(name: &str, objects: &[&'static str]) -> Self {
        Self {
            name: name.to_string(),
            objects: objects.to_vec(),
            delay: None,
            descriptor: Arc::new(Descriptor::new(
                format!("test_{name}_value"),
                "Value read by a test collector.",
                vec!["object".into()],
                MetricType::Gauge,
            )),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of runs started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn read(&self, ctx: &ScrapeContext, samples: &mut Vec<MetricSample>) -> Result<(), CollectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let mut out = Vec::new();
        for object in &self.objects {
            let table = ctx.table(object)?;
            for instance in table.instances() {
                if let Some(value) = instance.counter("value") {
                    out.push(MetricSample::new(
                        self.descriptor.clone(),
                        value,
                        vec![object.to_string()],
                    ));
                }
            }
        }
        samples.extend(out);
        Ok(())
    }
}

impl Collector for Reads {
    fn collect(
        &self,
        ctx: &ScrapeContext,
        samples: &mut Vec<MetricSample>,
    ) -> Result<(), CollectError> {
        self.read(ctx, samples)
    }
}

impl ChildCollector for Reads {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(
        &self,
        ctx: &ScrapeContext,
        samples: &mut Vec<MetricSample>,
    ) -> Result<(), CollectError> {
        self.read(ctx, samples)
    }
}

pub fn success(report: &ScrapeReport, namespace: &str, collector: &str) -> Option<f64> {
    let name = format!("{namespace}_exporter_collector_success");
    report
        .samples
        .iter()
        .find(|s| s.name() == name && s.label("collector") == Some(collector))
        .map(|s| s.value())
}
