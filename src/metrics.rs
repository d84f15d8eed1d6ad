//! Metric descriptors and the samples collectors produce.
//!
//! Collectors describe their metrics once, in a static table of
//! [`MetricSpec`] rows, and turn each row into a fully qualified
//! [`Descriptor`] at construction time. Every value produced during a scrape
//! is a [`MetricSample`] pointing back at its shared [`Descriptor`].

use std::borrow::Cow;
use std::sync::Arc;

/// Prometheus metric type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    /// Returns the given metric type's str representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// One row of a collector's static metric table.
#[derive(Clone, Copy, Debug)]
pub struct MetricSpec {
    /// Metric name without namespace and subsystem.
    pub name: &'static str,
    /// Help text.
    pub help: &'static str,
    /// Label names, in the order label values are passed.
    pub labels: &'static [&'static str],
    /// Metric type.
    pub metric_type: MetricType,
}

impl MetricSpec {
    /// A counter row.
    pub const fn counter(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            labels,
            metric_type: MetricType::Counter,
        }
    }

    /// A gauge row.
    pub const fn gauge(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            labels,
            metric_type: MetricType::Gauge,
        }
    }
}

/// Joins the non-empty parts of a metric name with `_`.
///
/// ```
/// # use counter_exporter::metrics::build_fq_name;
/// assert_eq!("windows_net_bytes_total", build_fq_name("windows", "net", "bytes_total"));
/// assert_eq!("windows_up", build_fq_name("windows", "", "up"));
/// ```
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Fully qualified metric descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    name: String,
    help: String,
    label_names: Vec<Cow<'static, str>>,
    metric_type: MetricType,
}

impl Descriptor {
    /// Create new [`Descriptor`].
    pub fn new<N: Into<String>, H: Into<String>>(
        name: N,
        help: H,
        label_names: Vec<Cow<'static, str>>,
        metric_type: MetricType,
    ) -> Self {
        Descriptor {
            name: name.into(),
            help: help.into(),
            label_names,
            metric_type,
        }
    }

    /// Create a [`Descriptor`] from a table row, qualifying its name with the
    /// given namespace and subsystem.
    pub fn from_spec(namespace: &str, subsystem: &str, spec: &MetricSpec) -> Self {
        Self::new(
            build_fq_name(namespace, subsystem, spec.name),
            spec.help,
            spec.labels.iter().map(|l| Cow::Borrowed(*l)).collect(),
            spec.metric_type,
        )
    }

    /// Returns the fully qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the help text.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Returns the label names.
    pub fn label_names(&self) -> &[Cow<'static, str>] {
        &self.label_names
    }

    /// Returns the metric type.
    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }
}

/// A single value produced by a collector during a scrape.
#[derive(Debug, Clone)]
pub struct MetricSample {
    descriptor: Arc<Descriptor>,
    value: f64,
    label_values: Vec<String>,
}

impl MetricSample {
    /// Create new [`MetricSample`].
    ///
    /// The number of label values has to match the descriptor's label names.
    pub fn new(descriptor: Arc<Descriptor>, value: f64, label_values: Vec<String>) -> Self {
        debug_assert_eq!(
            descriptor.label_names().len(),
            label_values.len(),
            "label value count mismatch for {}",
            descriptor.name()
        );

        Self {
            descriptor,
            value,
            label_values,
        }
    }

    /// Returns the descriptor.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Returns the value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns the label values, ordered like the descriptor's label names.
    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Returns the value of the label with the given name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.descriptor
            .label_names()
            .iter()
            .position(|l| l == name)
            .and_then(|i| self.label_values.get(i))
            .map(String::as_str)
    }

    /// Returns the metric type.
    pub fn metric_type(&self) -> MetricType {
        self.descriptor.metric_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fq_name_skips_empty_parts() {
        assert_eq!("a_c", build_fq_name("a", "", "c"));
        assert_eq!("b_c", build_fq_name("", "b", "c"));
        assert_eq!("a_b_c", build_fq_name("a", "b", "c"));
    }

    #[test]
    fn descriptor_from_spec() {
        const SPEC: MetricSpec = MetricSpec::counter("bytes_total", "Bytes.", &["nic"]);
        let descriptor = Descriptor::from_spec("windows", "net", &SPEC);

        assert_eq!("windows_net_bytes_total", descriptor.name());
        assert_eq!("Bytes.", descriptor.help());
        assert_eq!(MetricType::Counter, descriptor.metric_type());
        assert_eq!(&[Cow::Borrowed("nic")], descriptor.label_names());
    }

    #[test]
    fn sample_label_lookup() {
        let descriptor = Arc::new(Descriptor::new(
            "up",
            "",
            vec!["a".into(), "b".into()],
            MetricType::Gauge,
        ));
        let sample = MetricSample::new(descriptor, 1.0, vec!["x".into(), "y".into()]);

        assert_eq!(Some("y"), sample.label("b"));
        assert_eq!(None, sample.label("c"));
    }
}
