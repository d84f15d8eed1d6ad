//! Network interface counters, queried from
//! `Win32_PerfRawData_Tcpip_NetworkInterface`.

use crate::collector::filter::InstanceFilter;
use crate::collector::table::{CounterField, MetricTable};
use crate::collector::{Collector, ScrapeContext};
use crate::error::{CollectError, ConfigError};
use crate::metrics::{MetricSample, MetricSpec};
use crate::query::{Query, QueryAdapter};
use crate::registry::BuildContext;
use std::sync::Arc;

/// Registry name.
pub const NAME: &str = "net";

const CLASS: &str = "Win32_PerfRawData_Tcpip_NetworkInterface";
const NIC: &[&str] = &["nic"];

const FIELDS: &[CounterField] = &[
    CounterField::new(
        "BytesReceivedPerSec",
        MetricSpec::counter("bytes_received_total", "(Network.BytesReceivedPerSec)", NIC),
    ),
    CounterField::new(
        "BytesSentPerSec",
        MetricSpec::counter("bytes_sent_total", "(Network.BytesSentPerSec)", NIC),
    ),
    CounterField::new(
        "BytesTotalPerSec",
        MetricSpec::counter("bytes_total", "(Network.BytesTotalPerSec)", NIC),
    ),
    CounterField::new(
        "PacketsOutboundDiscarded",
        MetricSpec::counter(
            "packets_outbound_discarded",
            "(Network.PacketsOutboundDiscarded)",
            NIC,
        ),
    ),
    CounterField::new(
        "PacketsOutboundErrors",
        MetricSpec::counter("packets_outbound_errors", "(Network.PacketsOutboundErrors)", NIC),
    ),
    CounterField::new(
        "PacketsPerSec",
        MetricSpec::counter("packets_total", "(Network.PacketsPerSec)", NIC),
    ),
    CounterField::new(
        "PacketsReceivedDiscarded",
        MetricSpec::counter(
            "packets_received_discarded",
            "(Network.PacketsReceivedDiscarded)",
            NIC,
        ),
    ),
    CounterField::new(
        "PacketsReceivedErrors",
        MetricSpec::counter("packets_received_errors", "(Network.PacketsReceivedErrors)", NIC),
    ),
    CounterField::new(
        "PacketsReceivedPerSec",
        MetricSpec::counter("packets_received_total", "(Network.PacketsReceivedPerSec)", NIC),
    ),
    CounterField::new(
        "PacketsReceivedUnknown",
        MetricSpec::counter(
            "packets_received_unknown",
            "(Network.PacketsReceivedUnknown)",
            NIC,
        ),
    ),
    CounterField::new(
        "PacketsSentPerSec",
        MetricSpec::counter("packets_sent_total", "(Network.PacketsSentPerSec)", NIC),
    ),
];

/// Publishes raw network interface counters, one series per NIC.
#[derive(Debug)]
pub struct NetCollector {
    query: Arc<dyn QueryAdapter>,
    request: Query,
    filter: InstanceFilter,
    table: MetricTable,
}

impl NetCollector {
    /// Create new [`NetCollector`].
    pub fn new(namespace: &str, query: Arc<dyn QueryAdapter>, filter: InstanceFilter) -> Self {
        let mut columns = vec!["Name"];
        columns.extend(FIELDS.iter().map(|f| f.counter));

        Self {
            query,
            request: Query::select(CLASS, &columns),
            filter,
            table: MetricTable::new(namespace, NAME, FIELDS),
        }
    }
}

/// Registry constructor.
pub fn build(ctx: &BuildContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    let net = &ctx.config.net;
    let filter = InstanceFilter::new(&net.nic_whitelist, &net.nic_blacklist)?;
    Ok(Box::new(NetCollector::new(
        &ctx.config.namespace,
        ctx.query.clone(),
        filter,
    )))
}

/// Replaces every character that is not an ASCII letter or digit with `_`.
pub fn mangle(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

impl Collector for NetCollector {
    fn collect(
        &self,
        ctx: &ScrapeContext,
        samples: &mut Vec<MetricSample>,
    ) -> Result<(), CollectError> {
        let rows = self.query.run_query(&self.request, ctx.deadline())?;

        let mut out = Vec::new();
        for row in &rows {
            ctx.check_deadline()?;
            let name = row.text("Name")?;
            if !self.filter.matches(name) {
                continue;
            }
            let nic = mangle(name);
            if nic.is_empty() {
                continue;
            }
            self.table
                .collect_instance(&[&nic], |column| row.optional_f64(column), &mut out)?;
        }

        samples.extend(out);
        Ok(())
    }
}
