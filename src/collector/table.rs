//! Static counter-to-metric tables.
//!
//! Most collectors are a fixed mapping from source counters to metrics. They
//! declare it once as a slice of [`CounterField`] rows and let a
//! [`MetricTable`] do the per-instance work.

use crate::counters::CounterTable;
use crate::metrics::{Descriptor, MetricSample, MetricSpec};
use std::convert::Infallible;
use std::sync::Arc;

/// Maps one source counter to one metric.
#[derive(Debug, Clone, Copy)]
pub struct CounterField {
    /// Counter or column name in the source.
    pub counter: &'static str,
    /// Metric the counter is published as.
    pub spec: MetricSpec,
}

impl CounterField {
    /// Create new [`CounterField`].
    pub const fn new(counter: &'static str, spec: MetricSpec) -> Self {
        Self { counter, spec }
    }
}

/// A [`CounterField`] table with its descriptors resolved.
#[derive(Debug)]
pub struct MetricTable {
    fields: Vec<(&'static str, Arc<Descriptor>)>,
}

impl MetricTable {
    /// Resolve the descriptors of the given fields.
    pub fn new(namespace: &str, subsystem: &str, fields: &[CounterField]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|f| {
                    (
                        f.counter,
                        Arc::new(Descriptor::from_spec(namespace, subsystem, &f.spec)),
                    )
                })
                .collect(),
        }
    }

    /// Emit one sample per field for a single instance. Counters `lookup`
    /// returns `None` for are skipped, the first lookup error is returned.
    pub fn collect_instance<F, E>(
        &self,
        labels: &[&str],
        lookup: F,
        samples: &mut Vec<MetricSample>,
    ) -> Result<(), E>
    where
        F: Fn(&str) -> Result<Option<f64>, E>,
    {
        for (counter, descriptor) in &self.fields {
            if let Some(value) = lookup(*counter)? {
                samples.push(MetricSample::new(
                    descriptor.clone(),
                    value,
                    labels.iter().map(|l| l.to_string()).collect(),
                ));
            }
        }
        Ok(())
    }

    /// Emit the fields of every instance of a counter table, labelled with the
    /// instance name.
    pub fn collect_table(&self, table: &CounterTable, samples: &mut Vec<MetricSample>) {
        for instance in table.instances() {
            let name = instance.name().unwrap_or_default();
            let lookup = |c: &str| Ok::<_, Infallible>(instance.counter(c));
            if let Err(never) = self.collect_instance(&[name], lookup, samples) {
                match never {}
            }
        }
    }
}
