//! Disk health from the SMART data of the storage driver.
//!
//! Queries `MSStorageDriver_ATAPISmartData` and
//! `MSStorageDriver_FailurePredictStatus` in the `root\wmi` namespace and
//! decodes the vendor specific attribute table of every active disk.

use crate::attributes::{decode, DiskHealth, HealthCalculation, PowerOnUnit, Signal, WriteUnit};
use crate::collector::{Collector, ScrapeContext};
use crate::config::SmartConfig;
use crate::error::{CollectError, ConfigError};
use crate::metrics::{Descriptor, MetricSample, MetricSpec};
use crate::query::{Query, QueryAdapter, Row};
use crate::registry::BuildContext;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Registry name.
pub const NAME: &str = "smart";

const NAMESPACE: &str = "root\\wmi";
const DATA_CLASS: &str = "MSStorageDriver_ATAPISmartData";
const PREDICT_CLASS: &str = "MSStorageDriver_FailurePredictStatus";

const VOLUME: &[&str] = &["volume"];
const ATTRIBUTE: &[&str] = &["volume", "id"];

const SELF_TEST_STATUS: MetricSpec =
    MetricSpec::gauge("self_test_status", "Status of the last self test.", VOLUME);
const TOTAL_TIME: MetricSpec = MetricSpec::gauge(
    "total_time",
    "Time the last offline collection took.",
    VOLUME,
);
const CAPABILITY: MetricSpec = MetricSpec::gauge("capability", "SMART capability flags.", VOLUME);
const NORMALIZED: MetricSpec = MetricSpec::gauge(
    "attribute_normalized",
    "Current normalized value of a SMART attribute.",
    ATTRIBUTE,
);
const WORST: MetricSpec = MetricSpec::gauge(
    "attribute_worst",
    "Worst normalized value of a SMART attribute.",
    ATTRIBUTE,
);
const RAW: MetricSpec =
    MetricSpec::gauge("attribute_raw", "Raw value of a SMART attribute.", ATTRIBUTE);
const POWER_ON_HOURS: MetricSpec =
    MetricSpec::gauge("power_on_hours", "Power-on time in hours.", VOLUME);
const WRITTEN_BYTES: MetricSpec = MetricSpec::gauge(
    "written_bytes",
    "Bytes written to the disk over its lifetime.",
    VOLUME,
);
const CRITICAL_ATTRIBUTES: MetricSpec = MetricSpec::gauge(
    "critical_attributes",
    "Number of critical conditions reported by SMART attributes.",
    VOLUME,
);
const DECODE_ERRORS: MetricSpec = MetricSpec::gauge(
    "attribute_decode_errors",
    "Number of malformed SMART attribute records.",
    VOLUME,
);
const HEALTH: MetricSpec = MetricSpec::gauge(
    "health_percent",
    "Disk health estimated from error counting attributes.",
    VOLUME,
);
const RESERVE_REMAINING: MetricSpec = MetricSpec::gauge(
    "reserve_remaining_percent",
    "Share of reserve blocks not used for reallocation.",
    VOLUME,
);
const OLD_AGE: MetricSpec = MetricSpec::gauge(
    "old_age",
    "Whether the disk has been powered on for more than 30000 hours.",
    VOLUME,
);
const PREDICT_FAILURE: MetricSpec = MetricSpec::gauge(
    "predict_failure",
    "Whether the drive predicts its own failure.",
    VOLUME,
);

#[derive(Debug)]
struct Descriptors {
    self_test_status: Arc<Descriptor>,
    total_time: Arc<Descriptor>,
    capability: Arc<Descriptor>,
    normalized: Arc<Descriptor>,
    worst: Arc<Descriptor>,
    raw: Arc<Descriptor>,
    signals: BTreeMap<Signal, Arc<Descriptor>>,
    power_on_hours: Arc<Descriptor>,
    written_bytes: Arc<Descriptor>,
    critical_attributes: Arc<Descriptor>,
    decode_errors: Arc<Descriptor>,
    health: Arc<Descriptor>,
    reserve_remaining: Arc<Descriptor>,
    old_age: Arc<Descriptor>,
    predict_failure: Arc<Descriptor>,
}

impl Descriptors {
    fn new(namespace: &str) -> Self {
        let d = |spec: &MetricSpec| Arc::new(Descriptor::from_spec(namespace, NAME, spec));
        let signals = Signal::ALL
            .iter()
            .filter(|s| **s != Signal::PowerOnTime)
            .map(|s| {
                let spec = MetricSpec::gauge(s.as_str(), "Value derived from SMART attributes.", VOLUME);
                (*s, d(&spec))
            })
            .collect();

        Self {
            self_test_status: d(&SELF_TEST_STATUS),
            total_time: d(&TOTAL_TIME),
            capability: d(&CAPABILITY),
            normalized: d(&NORMALIZED),
            worst: d(&WORST),
            raw: d(&RAW),
            signals,
            power_on_hours: d(&POWER_ON_HOURS),
            written_bytes: d(&WRITTEN_BYTES),
            critical_attributes: d(&CRITICAL_ATTRIBUTES),
            decode_errors: d(&DECODE_ERRORS),
            health: d(&HEALTH),
            reserve_remaining: d(&RESERVE_REMAINING),
            old_age: d(&OLD_AGE),
            predict_failure: d(&PREDICT_FAILURE),
        }
    }
}

/// Publishes SMART attributes and derived health figures per disk.
#[derive(Debug)]
pub struct SmartCollector {
    query: Arc<dyn QueryAdapter>,
    data: Query,
    predict: Query,
    power_on_unit: PowerOnUnit,
    health_calculation: HealthCalculation,
    temperature_warn: Option<f64>,
    temperature_crit: Option<f64>,
    descriptors: Descriptors,
}

impl SmartCollector {
    /// Create new [`SmartCollector`].
    pub fn new(namespace: &str, query: Arc<dyn QueryAdapter>, config: &SmartConfig) -> Self {
        Self {
            query,
            data: Query::select(
                DATA_CLASS,
                &[
                    "InstanceName",
                    "Active",
                    "SelfTestStatus",
                    "TotalTime",
                    "SmartCapability",
                    "VendorSpecific",
                ],
            )
            .in_namespace(NAMESPACE),
            predict: Query::select(PREDICT_CLASS, &["InstanceName", "PredictFailure"])
                .in_namespace(NAMESPACE),
            power_on_unit: config.power_on_unit,
            health_calculation: config.health_calculation,
            temperature_warn: config.temperature_warn,
            temperature_crit: config.temperature_crit,
            descriptors: Descriptors::new(namespace),
        }
    }

    fn collect_disk(
        &self,
        row: &Row,
        predicted: Option<bool>,
        out: &mut Vec<MetricSample>,
    ) -> Result<(), CollectError> {
        let d = &self.descriptors;
        let volume = row.text("InstanceName")?.to_string();
        let label = || vec![volume.clone()];
        let gauge = |descriptor: &Arc<Descriptor>, value: f64| {
            MetricSample::new(descriptor.clone(), value, label())
        };

        out.push(gauge(&d.self_test_status, row.f64("SelfTestStatus")?));
        out.push(gauge(&d.total_time, row.f64("TotalTime")?));
        out.push(gauge(&d.capability, row.f64("SmartCapability")?));

        let decoded = decode(row.bytes("VendorSpecific")?);
        for skipped in &decoded.skipped {
            warn!("{}: {}", volume, skipped);
        }

        for record in &decoded.records {
            let labels = || vec![volume.clone(), record.id.to_string()];
            out.push(MetricSample::new(
                d.normalized.clone(),
                f64::from(record.normalized),
                labels(),
            ));
            out.push(MetricSample::new(
                d.worst.clone(),
                f64::from(record.worst),
                labels(),
            ));
            out.push(MetricSample::new(d.raw.clone(), record.raw as f64, labels()));
        }

        let health = DiskHealth::assess(&decoded.records);
        for (signal, value) in health.signals() {
            if let Some(descriptor) = d.signals.get(&signal) {
                out.push(gauge(descriptor, value));
            }
        }

        if let Some(hours) = health.power_on_hours(self.power_on_unit) {
            out.push(gauge(&d.power_on_hours, hours));
        }
        if let Some(bytes) = health.written_bytes(WriteUnit::of_instance(&volume)) {
            out.push(gauge(&d.written_bytes, bytes));
        }
        let old = health.is_old(self.power_on_unit);
        if old {
            warn!(
                "{}: old age, powered on for more than 30000 hours, check the configured power-on unit",
                volume
            );
        }
        out.push(gauge(&d.old_age, if old { 1.0 } else { 0.0 }));

        out.push(gauge(
            &d.critical_attributes,
            health.critical_attributes() as f64,
        ));
        out.push(gauge(&d.decode_errors, decoded.skipped.len() as f64));
        out.push(gauge(
            &d.health,
            health.health_percent(self.health_calculation),
        ));
        if let Some(reserve) = health.reserve_remaining_percent() {
            out.push(gauge(&d.reserve_remaining, reserve));
        }
        if let Some(predicted) = predicted {
            out.push(gauge(
                &d.predict_failure,
                if predicted { 1.0 } else { 0.0 },
            ));
        }

        self.check_temperature(&volume, &health);
        Ok(())
    }

    fn check_temperature(&self, volume: &str, health: &DiskHealth) {
        let Some(temperature) = health.signal(Signal::Temperature) else {
            return;
        };
        if self.temperature_crit.is_some_and(|crit| temperature > crit) {
            error!(
                "{}: temperature {}°C is above the critical limit",
                volume, temperature
            );
        } else if self.temperature_warn.is_some_and(|warn| temperature > warn) {
            warn!(
                "{}: temperature {}°C is above the warning limit",
                volume, temperature
            );
        }
    }
}

/// Registry constructor.
pub fn build(ctx: &BuildContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    Ok(Box::new(SmartCollector::new(
        &ctx.config.namespace,
        ctx.query.clone(),
        &ctx.config.smart,
    )))
}

impl Collector for SmartCollector {
    fn collect(
        &self,
        ctx: &ScrapeContext,
        samples: &mut Vec<MetricSample>,
    ) -> Result<(), CollectError> {
        let disks = self.query.run_query(&self.data, ctx.deadline())?;
        ctx.check_deadline()?;
        let predictions: HashMap<String, bool> = self
            .query
            .run_query(&self.predict, ctx.deadline())?
            .iter()
            .map(|row| -> Result<_, CollectError> {
                Ok((
                    row.text("InstanceName")?.to_string(),
                    row.bool("PredictFailure")?,
                ))
            })
            .collect::<Result<_, _>>()?;

        let mut out = Vec::new();
        let mut predicted_failures = 0;
        for disk in &disks {
            ctx.check_deadline()?;
            if !disk.bool("Active")? {
                continue;
            }
            let predicted = predictions.get(disk.text("InstanceName")?).copied();
            if predicted == Some(true) {
                predicted_failures += 1;
            }
            self.collect_disk(disk, predicted, &mut out)?;
        }

        if predicted_failures > 0 {
            error!("{} disks predict their failure", predicted_failures);
        } else {
            info!("checked {} disks", disks.len());
        }

        samples.extend(out);
        Ok(())
    }
}
