//! Prometheus text exposition format.
//!
//! ```
//! # use counter_exporter::encoding::text::encode;
//! # use counter_exporter::metrics::{Descriptor, MetricSample, MetricType};
//! # use std::sync::Arc;
//! let descriptor = Arc::new(Descriptor::new(
//!     "windows_net_bytes_received_total",
//!     "(Network.BytesReceivedPerSec)",
//!     vec!["nic".into()],
//!     MetricType::Counter,
//! ));
//! let samples = vec![MetricSample::new(descriptor, 42.0, vec!["Ethernet0".into()])];
//!
//! let mut buffer = String::new();
//! encode(&mut buffer, &samples).unwrap();
//!
//! let expected = "# HELP windows_net_bytes_received_total (Network.BytesReceivedPerSec)\n".to_owned()
//!     + "# TYPE windows_net_bytes_received_total counter\n"
//!     + "windows_net_bytes_received_total{nic=\"Ethernet0\"} 42\n";
//! assert_eq!(expected, buffer);
//! ```

use crate::encoding::{write_help, write_label_value, write_value};
use crate::metrics::MetricSample;
use std::collections::HashMap;
use std::fmt::Write;

/// Content type of the text format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Encode the given samples into the text format.
///
/// Samples sharing a metric name are grouped into one family, families are
/// written in the order their first sample appears.
pub fn encode<W: Write>(writer: &mut W, samples: &[MetricSample]) -> Result<(), std::fmt::Error> {
    for family in group(samples) {
        let Some(first) = family.first() else {
            continue;
        };
        let descriptor = first.descriptor();

        writer.write_str("# HELP ")?;
        writer.write_str(descriptor.name())?;
        writer.write_str(" ")?;
        write_help(writer, descriptor.help())?;
        writer.write_str("\n")?;

        writer.write_str("# TYPE ")?;
        writer.write_str(descriptor.name())?;
        writer.write_str(" ")?;
        writer.write_str(descriptor.metric_type().as_str())?;
        writer.write_str("\n")?;

        for sample in family {
            encode_sample(writer, sample)?;
        }
    }

    Ok(())
}

fn group(samples: &[MetricSample]) -> Vec<Vec<&MetricSample>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut families: Vec<Vec<&MetricSample>> = Vec::new();

    for sample in samples {
        match index.get(sample.name()) {
            Some(i) => families[*i].push(sample),
            None => {
                index.insert(sample.name(), families.len());
                families.push(vec![sample]);
            }
        }
    }

    families
}

fn encode_sample<W: Write>(writer: &mut W, sample: &MetricSample) -> Result<(), std::fmt::Error> {
    writer.write_str(sample.name())?;

    let names = sample.descriptor().label_names();
    if !names.is_empty() {
        writer.write_str("{")?;
        for (i, (name, value)) in names.iter().zip(sample.label_values()).enumerate() {
            if i > 0 {
                writer.write_str(",")?;
            }
            writer.write_str(name)?;
            writer.write_str("=\"")?;
            write_label_value(writer, value)?;
            writer.write_str("\"")?;
        }
        writer.write_str("}")?;
    }

    writer.write_str(" ")?;
    write_value(writer, sample.value())?;
    writer.write_str("\n")
}
