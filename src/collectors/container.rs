//! Container resource usage from the host compute service.
//!
//! Lists the compute systems of type `Container` and publishes memory, CPU
//! and per endpoint network statistics for each of them. Container ids carry
//! the `docker://` prefix of the runtime.

use crate::collector::table::{CounterField, MetricTable};
use crate::collector::{Collector, ScrapeContext};
use crate::error::{CollectError, ConfigError};
use crate::metrics::{Descriptor, MetricSample, MetricSpec};
use crate::query::{Query, QueryAdapter, QueryError, Row};
use crate::registry::BuildContext;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

/// Registry name.
pub const NAME: &str = "container";

const NAMESPACE: &str = "hcs";
const SYSTEM_CLASS: &str = "HCS_ComputeSystem";
const STATS_CLASS: &str = "HCS_ContainerStatistics";
const NETWORK_CLASS: &str = "HCS_ContainerNetworkStatistics";

const ID_PREFIX: &str = "docker://";
const TICKS_PER_SECOND: f64 = 1e7;

const CONTAINER: &[&str] = &["container_id"];
const INTERFACE: &[&str] = &["container_id", "interface"];

const AVAILABLE: MetricSpec = MetricSpec::counter("available", "Available", CONTAINER);

const MEMORY_FIELDS: &[CounterField] = &[
    CounterField::new(
        "MemoryUsageCommitBytes",
        MetricSpec::gauge("memory_usage_commit_bytes", "Memory Usage Commit Bytes", CONTAINER),
    ),
    CounterField::new(
        "MemoryUsageCommitPeakBytes",
        MetricSpec::gauge(
            "memory_usage_commit_peak_bytes",
            "Memory Usage Commit Peak Bytes",
            CONTAINER,
        ),
    ),
    CounterField::new(
        "MemoryUsagePrivateWorkingSetBytes",
        MetricSpec::gauge(
            "memory_usage_private_working_set_bytes",
            "Memory Usage Private Working Set Bytes",
            CONTAINER,
        ),
    ),
];

// Reported in 100ns ticks.
const CPU_FIELDS: &[CounterField] = &[
    CounterField::new(
        "TotalRuntime100ns",
        MetricSpec::counter("cpu_usage_seconds_total", "Total Run time in Seconds", CONTAINER),
    ),
    CounterField::new(
        "RuntimeUser100ns",
        MetricSpec::counter(
            "cpu_usage_seconds_usermode",
            "Run Time in User mode in Seconds",
            CONTAINER,
        ),
    ),
    CounterField::new(
        "RuntimeKernel100ns",
        MetricSpec::counter(
            "cpu_usage_seconds_kernelmode",
            "Run time in Kernel mode in Seconds",
            CONTAINER,
        ),
    ),
];

const NETWORK_FIELDS: &[CounterField] = &[
    CounterField::new(
        "BytesReceived",
        MetricSpec::counter("network_receive_bytes_total", "Bytes Received on Interface", INTERFACE),
    ),
    CounterField::new(
        "BytesSent",
        MetricSpec::counter("network_transmit_bytes_total", "Bytes Sent on Interface", INTERFACE),
    ),
    CounterField::new(
        "PacketsReceived",
        MetricSpec::counter(
            "network_receive_packets_total",
            "Packets Received on Interface",
            INTERFACE,
        ),
    ),
    CounterField::new(
        "PacketsSent",
        MetricSpec::counter("network_transmit_packets_total", "Packets Sent on Interface", INTERFACE),
    ),
    CounterField::new(
        "DroppedPacketsIncoming",
        MetricSpec::counter(
            "network_receive_packets_dropped_total",
            "Dropped Incoming Packets on Interface",
            INTERFACE,
        ),
    ),
    CounterField::new(
        "DroppedPacketsOutgoing",
        MetricSpec::counter(
            "network_transmit_packets_dropped_total",
            "Dropped Outgoing Packets on Interface",
            INTERFACE,
        ),
    ),
];

/// Publishes memory, CPU and network usage per container.
///
/// A container whose statistics are missing or malformed is logged and
/// left out, the others are still published.
#[derive(Debug)]
pub struct ContainerCollector {
    query: Arc<dyn QueryAdapter>,
    systems: Query,
    stats: Query,
    network: Query,
    available: Arc<Descriptor>,
    memory: MetricTable,
    cpu: MetricTable,
    interfaces: MetricTable,
}

impl ContainerCollector {
    /// Create new [`ContainerCollector`].
    pub fn new(namespace: &str, query: Arc<dyn QueryAdapter>) -> Self {
        let mut stats = vec!["Id"];
        stats.extend(MEMORY_FIELDS.iter().chain(CPU_FIELDS).map(|f| f.counter));
        let mut network = vec!["ContainerId", "EndpointId"];
        network.extend(NETWORK_FIELDS.iter().map(|f| f.counter));

        Self {
            query,
            systems: Query::select(SYSTEM_CLASS, &["Id", "Type"]).in_namespace(NAMESPACE),
            stats: Query::select(STATS_CLASS, &stats).in_namespace(NAMESPACE),
            network: Query::select(NETWORK_CLASS, &network).in_namespace(NAMESPACE),
            available: Arc::new(Descriptor::from_spec(namespace, NAME, &AVAILABLE)),
            memory: MetricTable::new(namespace, NAME, MEMORY_FIELDS),
            cpu: MetricTable::new(namespace, NAME, CPU_FIELDS),
            interfaces: MetricTable::new(namespace, NAME, NETWORK_FIELDS),
        }
    }

    fn collect_container(
        &self,
        id: &str,
        stats: &Row,
        interfaces: &[&Row],
        out: &mut Vec<MetricSample>,
    ) -> Result<(), QueryError> {
        let label = format!("{ID_PREFIX}{id}");
        let mut container = vec![MetricSample::new(
            self.available.clone(),
            1.0,
            vec![label.clone()],
        )];

        self.memory
            .collect_instance(&[&label], |c| stats.f64(c).map(Some), &mut container)?;
        self.cpu.collect_instance(
            &[&label],
            |c| stats.f64(c).map(|ticks| Some(ticks / TICKS_PER_SECOND)),
            &mut container,
        )?;

        if interfaces.is_empty() {
            warn!("no network statistics for container {}", label);
        }
        for row in interfaces {
            let endpoint = row.text("EndpointId")?;
            self.interfaces.collect_instance(
                &[&label, endpoint],
                |c| row.f64(c).map(Some),
                &mut container,
            )?;
        }

        out.extend(container);
        Ok(())
    }
}

/// Registry constructor.
pub fn build(ctx: &BuildContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    Ok(Box::new(ContainerCollector::new(
        &ctx.config.namespace,
        ctx.query.clone(),
    )))
}

impl Collector for ContainerCollector {
    fn collect(
        &self,
        ctx: &ScrapeContext,
        samples: &mut Vec<MetricSample>,
    ) -> Result<(), CollectError> {
        let systems = self.query.run_query(&self.systems, ctx.deadline())?;
        let mut ids = Vec::new();
        for row in &systems {
            if row.text("Type")? == "Container" {
                ids.push(row.text("Id")?);
            }
        }
        if ids.is_empty() {
            warn!("no containers on node");
            return Ok(());
        }

        ctx.check_deadline()?;
        let stats_rows = self.query.run_query(&self.stats, ctx.deadline())?;
        let mut stats: HashMap<&str, &Row> = HashMap::new();
        for row in &stats_rows {
            stats.insert(row.text("Id")?, row);
        }

        ctx.check_deadline()?;
        let network_rows = self.query.run_query(&self.network, ctx.deadline())?;
        let mut network: HashMap<&str, Vec<&Row>> = HashMap::new();
        for row in &network_rows {
            network.entry(row.text("ContainerId")?).or_default().push(row);
        }

        let mut out = Vec::new();
        for id in ids {
            ctx.check_deadline()?;
            let Some(row) = stats.get(id) else {
                error!("no statistics for container {}", id);
                continue;
            };
            let interfaces = network.get(id).map(Vec::as_slice).unwrap_or_default();
            if let Err(e) = self.collect_container(id, row, interfaces, &mut out) {
                error!("failed to read statistics of container {}: {}", id, e);
            }
        }

        samples.extend(out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::Snapshot;
    use crate::query::Value;
    use std::time::Instant;

    #[derive(Debug, Default)]
    struct Hcs {
        systems: Vec<Row>,
        stats: Vec<Row>,
        network: Vec<Row>,
        down: bool,
    }

    impl QueryAdapter for Hcs {
        fn run_query(
            &self,
            query: &Query,
            _deadline: Option<Instant>,
        ) -> Result<Vec<Row>, QueryError> {
            assert_eq!(Some(NAMESPACE), query.namespace());
            if self.down {
                return Err(QueryError::Unavailable("vmcompute".into()));
            }
            match query.class() {
                SYSTEM_CLASS => Ok(self.systems.clone()),
                STATS_CLASS => Ok(self.stats.clone()),
                NETWORK_CLASS => Ok(self.network.clone()),
                class => Err(QueryError::Failed {
                    query: class.to_string(),
                    reason: "invalid class".into(),
                }),
            }
        }
    }

    fn system(id: &str, kind: &str) -> Row {
        Row::new()
            .with("Id", Value::Text(id.into()))
            .with("Type", Value::Text(kind.into()))
    }

    fn stats(id: &str, total_ticks: u64) -> Row {
        Row::new()
            .with("Id", Value::Text(id.into()))
            .with("MemoryUsageCommitBytes", Value::Unsigned(4096))
            .with("MemoryUsageCommitPeakBytes", Value::Unsigned(8192))
            .with("MemoryUsagePrivateWorkingSetBytes", Value::Unsigned(2048))
            .with("TotalRuntime100ns", Value::Unsigned(total_ticks))
            .with("RuntimeUser100ns", Value::Unsigned(total_ticks / 2))
            .with("RuntimeKernel100ns", Value::Unsigned(total_ticks / 2))
    }

    fn endpoint(container: &str, endpoint: &str, bytes: u64) -> Row {
        let mut row = Row::new()
            .with("ContainerId", Value::Text(container.into()))
            .with("EndpointId", Value::Text(endpoint.into()));
        for field in NETWORK_FIELDS {
            row.insert(field.counter, Value::Unsigned(bytes));
        }
        row
    }

    fn collect(hcs: Hcs) -> (Result<(), CollectError>, Vec<MetricSample>) {
        let collector = ContainerCollector::new("windows", Arc::new(hcs));
        let ctx = ScrapeContext::new(Snapshot::default(), None);
        let mut samples = Vec::new();
        let result = collector.collect(&ctx, &mut samples);
        (result, samples)
    }

    fn value(samples: &[MetricSample], name: &str, interface: Option<&str>) -> Option<f64> {
        samples
            .iter()
            .find(|s| s.name() == name && s.label("interface") == interface)
            .map(|s| s.value())
    }

    #[test]
    fn containers_with_endpoints() {
        let (result, samples) = collect(Hcs {
            systems: vec![system("abc", "Container"), system("vm1", "VirtualMachine")],
            stats: vec![stats("abc", 25_000_000)],
            network: vec![endpoint("abc", "eth0", 10), endpoint("abc", "eth1", 20)],
            ..Hcs::default()
        });

        result.unwrap();
        assert!(samples
            .iter()
            .all(|s| s.label("container_id") == Some("docker://abc")));
        assert_eq!(Some(1.0), value(&samples, "windows_container_available", None));
        assert_eq!(
            Some(2048.0),
            value(&samples, "windows_container_memory_usage_private_working_set_bytes", None)
        );
        assert_eq!(
            Some(2.5),
            value(&samples, "windows_container_cpu_usage_seconds_total", None)
        );
        assert_eq!(
            Some(20.0),
            value(&samples, "windows_container_network_receive_bytes_total", Some("eth1"))
        );
        assert_eq!(1 + 3 + 3 + 2 * 6, samples.len());
    }

    #[test]
    fn container_without_statistics_is_skipped() {
        let mut broken = stats("bad", 1);
        broken.insert("TotalRuntime100ns", Value::Text("n/a".into()));

        let (result, samples) = collect(Hcs {
            systems: vec![
                system("gone", "Container"),
                system("bad", "Container"),
                system("abc", "Container"),
            ],
            stats: vec![broken, stats("abc", 1)],
            ..Hcs::default()
        });

        result.unwrap();
        assert!(samples
            .iter()
            .all(|s| s.label("container_id") == Some("docker://abc")));
        assert_eq!(1 + 3 + 3, samples.len());
    }

    #[test]
    fn no_containers_is_success() {
        let (result, samples) = collect(Hcs {
            systems: vec![system("vm1", "VirtualMachine")],
            ..Hcs::default()
        });

        result.unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn unavailable_service_fails() {
        let (result, samples) = collect(Hcs {
            down: true,
            ..Hcs::default()
        });

        assert!(matches!(
            result,
            Err(CollectError::Query(QueryError::Unavailable(_)))
        ));
        assert!(samples.is_empty());
    }
}
