//! Decoder for the vendor specific SMART attribute table.
//!
//! The table is a sequence of 12 byte records:
//!
//! | offset | content                                        |
//! |--------|------------------------------------------------|
//! | 0      | `0` for an active record, `16` for the first   |
//! | 1      | must be `0`                                    |
//! | 3      | attribute id                                   |
//! | 6      | normalized value                               |
//! | 7      | worst normalized value                         |
//! | 8..=12 | little endian raw value, width depends on id   |
//!
//! [`decode`] turns the table into [`AttributeRecord`]s, [`DiskHealth`]
//! derives named signals and health figures from them.

use std::collections::BTreeMap;
use tracing::debug;

/// Length of a single attribute record.
pub const RECORD_LEN: usize = 12;

/// Power-on hours above which a disk is considered old.
pub const OLD_AGE_HOURS: f64 = 30000.0;

const ID_OFFSET: usize = 3;
const NORMALIZED_OFFSET: usize = 6;
const WORST_OFFSET: usize = 7;
const RAW_OFFSET: usize = 8;
const MAX_RAW_WIDTH: usize = 5;

/// A decoded attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeRecord {
    /// Attribute id.
    pub id: u8,
    /// Current normalized value.
    pub normalized: u8,
    /// Worst normalized value seen.
    pub worst: u8,
    /// Raw value, only the bytes the id defines.
    pub raw: u64,
    /// All raw bytes present at offsets 8 to 12, zero where absent.
    pub raw_bytes: [u8; MAX_RAW_WIDTH],
}

/// A record that could not be decoded. Never fails a scrape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartialDecodeError {
    /// Byte 1 of an active record is not zero.
    #[error("unexpected flag {value} in attribute record at offset {offset}")]
    UnexpectedFlag {
        /// Offset of the record.
        offset: usize,
        /// Value of byte 1.
        value: u8,
    },
}

/// Output of [`decode`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Active attributes, in table order.
    pub records: Vec<AttributeRecord>,
    /// Records skipped as malformed.
    pub skipped: Vec<PartialDecodeError>,
}

/// Number of raw value bytes the given attribute uses.
pub fn raw_width(id: u8) -> usize {
    match id {
        4 | 9 | 193 | 195 | 200 | 225 | 241 | 242 | 246 => 5,
        194 => 1,
        _ => 2,
    }
}

/// Decode an attribute table.
///
/// Inactive records and empty slots (id 0) are ignored, as is a trailing
/// partial record. Never reads past the end of `bytes`.
///
/// ```
/// # use counter_exporter::attributes::decode;
/// let mut table = vec![0u8; 12];
/// table[3] = 194;
/// table[6] = 100;
/// table[7] = 100;
/// table[8] = 45;
/// table[9] = 1;
///
/// let decoded = decode(&table);
/// assert_eq!(1, decoded.records.len());
/// assert_eq!(45, decoded.records[0].raw);
/// ```
pub fn decode(bytes: &[u8]) -> Decoded {
    let mut decoded = Decoded::default();

    for offset in (0..bytes.len()).step_by(RECORD_LEN) {
        let flag = bytes[offset];
        if !(flag == 0 || (flag == 16 && offset == 0)) {
            continue;
        }

        let available = bytes.len() - offset;
        if available < RECORD_LEN {
            debug!("ignoring {} trailing bytes of attribute table", available);
            break;
        }

        let record = &bytes[offset..offset + RECORD_LEN];
        if record[1] != 0 {
            decoded.skipped.push(PartialDecodeError::UnexpectedFlag {
                offset,
                value: record[1],
            });
            continue;
        }

        let id = record[ID_OFFSET];
        if id == 0 {
            continue;
        }

        let mut raw_bytes = [0u8; MAX_RAW_WIDTH];
        for (i, b) in raw_bytes.iter_mut().enumerate() {
            if let Some(v) = bytes.get(offset + RAW_OFFSET + i) {
                *b = *v;
            }
        }
        let raw = raw_bytes[..raw_width(id)]
            .iter()
            .rev()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

        decoded.records.push(AttributeRecord {
            id,
            normalized: record[NORMALIZED_OFFSET],
            worst: record[WORST_OFFSET],
            raw,
            raw_bytes,
        });
    }

    decoded
}

/// Health signal derived from one or more attribute ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum Signal {
    ReadErrorRate,
    SpinUpTime,
    ReallocatedSectors,
    PowerOnTime,
    SpinRetries,
    ReserveBlocks,
    ProgramFailures,
    EraseFailures,
    EndToEndErrors,
    CommandTimeouts,
    Temperature,
    ReallocationEvents,
    PendingSectors,
    UncorrectableSectors,
    CrcErrors,
    OffTrackErrors,
    LifetimeRemaining,
    LbasWritten,
}

impl Signal {
    /// Every signal, in declaration order.
    pub const ALL: [Signal; 18] = [
        Signal::ReadErrorRate,
        Signal::SpinUpTime,
        Signal::ReallocatedSectors,
        Signal::PowerOnTime,
        Signal::SpinRetries,
        Signal::ReserveBlocks,
        Signal::ProgramFailures,
        Signal::EraseFailures,
        Signal::EndToEndErrors,
        Signal::CommandTimeouts,
        Signal::Temperature,
        Signal::ReallocationEvents,
        Signal::PendingSectors,
        Signal::UncorrectableSectors,
        Signal::CrcErrors,
        Signal::OffTrackErrors,
        Signal::LifetimeRemaining,
        Signal::LbasWritten,
    ];

    /// Returns the signal's str representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::ReadErrorRate => "read_error_rate",
            Signal::SpinUpTime => "spin_up_time_milliseconds",
            Signal::ReallocatedSectors => "reallocated_sectors",
            Signal::PowerOnTime => "power_on_time",
            Signal::SpinRetries => "spin_retries",
            Signal::ReserveBlocks => "reserve_blocks",
            Signal::ProgramFailures => "program_failures",
            Signal::EraseFailures => "erase_failures",
            Signal::EndToEndErrors => "end_to_end_errors",
            Signal::CommandTimeouts => "command_timeouts",
            Signal::Temperature => "temperature_celsius",
            Signal::ReallocationEvents => "reallocation_events",
            Signal::PendingSectors => "pending_sectors",
            Signal::UncorrectableSectors => "uncorrectable_sectors",
            Signal::CrcErrors => "crc_errors",
            Signal::OffTrackErrors => "off_track_errors",
            Signal::LifetimeRemaining => "lifetime_remaining_percent",
            Signal::LbasWritten => "lbas_written",
        }
    }

    fn value(&self, record: &AttributeRecord) -> f64 {
        match self {
            Signal::SpinUpTime => {
                f64::from(u16::from(record.raw_bytes[3]) << 8 | u16::from(record.raw_bytes[2]))
            }
            Signal::LifetimeRemaining => f64::from(record.normalized),
            _ => record.raw as f64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Threshold {
    None,
    /// Critical if normalized or worst is at or below the value.
    Either(u8),
    /// Critical if worst is at or below the value.
    Worst(u8),
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    signal: Option<Signal>,
    threshold: Threshold,
    raw_nonzero_critical: bool,
}

impl Rule {
    const fn new(signal: Option<Signal>, threshold: Threshold, raw_nonzero_critical: bool) -> Self {
        Self {
            signal,
            threshold,
            raw_nonzero_critical,
        }
    }

    /// Number of critical conditions the record meets.
    fn violations(&self, record: &AttributeRecord) -> usize {
        let threshold = match self.threshold {
            Threshold::None => false,
            Threshold::Either(t) => record.normalized <= t || record.worst <= t,
            Threshold::Worst(t) => record.worst <= t,
        };
        let raw = self.raw_nonzero_critical && record.raw > 0;
        usize::from(threshold) + usize::from(raw)
    }
}

fn rule(id: u8) -> Option<Rule> {
    use Signal::*;
    use Threshold::{Either, Worst};

    let rule = match id {
        1 => Rule::new(Some(ReadErrorRate), Either(50), false),
        3 => Rule::new(Some(SpinUpTime), Either(50), false),
        5 => Rule::new(Some(ReallocatedSectors), Either(10), false),
        7 => Rule::new(None, Either(60), false),
        9 => Rule::new(Some(PowerOnTime), Threshold::None, false),
        10 => Rule::new(Some(SpinRetries), Threshold::None, true),
        170 => Rule::new(Some(ReserveBlocks), Either(10), false),
        171 | 181 => Rule::new(Some(ProgramFailures), Either(10), false),
        172 | 182 => Rule::new(Some(EraseFailures), Either(10), false),
        173 | 177 | 179 | 183 | 226 | 232 => Rule::new(None, Either(10), false),
        180 => Rule::new(Some(ReserveBlocks), Threshold::None, false),
        184 => Rule::new(Some(EndToEndErrors), Either(50), true),
        188 => Rule::new(Some(CommandTimeouts), Threshold::None, true),
        194 => Rule::new(Some(Temperature), Threshold::None, false),
        196 => Rule::new(Some(ReallocationEvents), Threshold::None, false),
        197 => Rule::new(Some(PendingSectors), Threshold::None, true),
        198 => Rule::new(Some(UncorrectableSectors), Threshold::None, true),
        199 => Rule::new(Some(CrcErrors), Threshold::None, true),
        200 => Rule::new(None, Either(99), false),
        201 => Rule::new(Some(OffTrackErrors), Threshold::None, true),
        202 | 231 | 233 => Rule::new(Some(LifetimeRemaining), Either(10), false),
        225 | 241 | 246 => Rule::new(Some(LbasWritten), Threshold::None, false),
        230 => Rule::new(None, Worst(90), false),
        _ => return None,
    };
    Some(rule)
}

/// Unit a disk reports its power-on time in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[allow(missing_docs)]
pub enum PowerOnUnit {
    Hour,
    Min,
    Sec,
}

impl PowerOnUnit {
    fn hours(&self, raw: f64) -> f64 {
        match self {
            PowerOnUnit::Hour => raw,
            PowerOnUnit::Min => raw / 60.0,
            PowerOnUnit::Sec => raw / 3600.0,
        }
    }
}

/// Unit of the LBAs written counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteUnit {
    /// 32 MiB blocks, reported by Intel SSDs.
    Block32MiB,
    /// 512 byte sectors.
    Sector,
}

impl WriteUnit {
    /// Returns the unit the disk with the given instance name counts in.
    pub fn of_instance(instance: &str) -> Self {
        if instance.contains("Intel") {
            WriteUnit::Block32MiB
        } else {
            WriteUnit::Sector
        }
    }

    fn bytes(&self) -> f64 {
        match self {
            WriteUnit::Block32MiB => 32.0 * 1024.0 * 1024.0,
            WriteUnit::Sector => 512.0,
        }
    }
}

/// Weighting of the health percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HealthCalculation {
    /// Tolerant weights.
    Standard,
    /// Weights penalizing every error strongly.
    Restricted,
}

impl HealthCalculation {
    fn weights(&self) -> [(Signal, f64); 6] {
        match self {
            HealthCalculation::Standard => [
                (Signal::ReallocatedSectors, 1.0),
                (Signal::ReadErrorRate, 0.5),
                (Signal::SpinRetries, 3.0),
                (Signal::ReallocationEvents, 0.6),
                (Signal::PendingSectors, 0.6),
                (Signal::UncorrectableSectors, 1.0),
            ],
            HealthCalculation::Restricted => [
                (Signal::ReallocatedSectors, 6.0),
                (Signal::ReadErrorRate, 2.0),
                (Signal::SpinRetries, 6.0),
                (Signal::ReallocationEvents, 4.0),
                (Signal::PendingSectors, 4.0),
                (Signal::UncorrectableSectors, 6.0),
            ],
        }
    }
}

/// Signals and health figures of one disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskHealth {
    signals: BTreeMap<Signal, f64>,
    critical_attributes: usize,
}

impl DiskHealth {
    /// Score decoded attributes. When several ids map to the same signal the
    /// last one in table order wins.
    pub fn assess(records: &[AttributeRecord]) -> Self {
        let mut health = DiskHealth::default();

        for record in records {
            let Some(rule) = rule(record.id) else {
                continue;
            };
            if let Some(signal) = rule.signal {
                health.signals.insert(signal, signal.value(record));
            }
            health.critical_attributes += rule.violations(record);
        }

        health
    }

    /// Returns a derived signal, `None` if no attribute reported it.
    pub fn signal(&self, signal: Signal) -> Option<f64> {
        self.signals.get(&signal).copied()
    }

    /// Iterate all derived signals.
    pub fn signals(&self) -> impl Iterator<Item = (Signal, f64)> + '_ {
        self.signals.iter().map(|(s, v)| (*s, *v))
    }

    /// Returns the number of critical conditions met by known attributes.
    pub fn critical_attributes(&self) -> usize {
        self.critical_attributes
    }

    /// Returns the health in percent, 100 for a disk without error counts.
    pub fn health_percent(&self, calculation: HealthCalculation) -> f64 {
        let factor: f64 = calculation
            .weights()
            .iter()
            .map(|(signal, weight)| {
                let v = self.signal(*signal).unwrap_or_default();
                (1.0 - weight * v / 100.0).clamp(0.0, 1.0)
            })
            .product();
        100.0 * factor
    }

    /// Returns the share of reserve blocks left, if the disk reports any.
    pub fn reserve_remaining_percent(&self) -> Option<f64> {
        let reserve = self.signal(Signal::ReserveBlocks).filter(|r| *r > 0.0)?;
        let reallocated = self.signal(Signal::ReallocatedSectors).unwrap_or_default();
        Some(100.0 * reserve / (reserve + reallocated))
    }

    /// Returns the power-on time in hours.
    pub fn power_on_hours(&self, unit: PowerOnUnit) -> Option<f64> {
        self.signal(Signal::PowerOnTime).map(|raw| unit.hours(raw))
    }

    /// Returns the number of bytes written to the disk over its lifetime.
    pub fn written_bytes(&self, unit: WriteUnit) -> Option<f64> {
        self.signal(Signal::LbasWritten).map(|lbas| lbas * unit.bytes())
    }

    /// Returns `true` if the disk has been powered on for longer than
    /// [`OLD_AGE_HOURS`].
    pub fn is_old(&self, unit: PowerOnUnit) -> bool {
        self.power_on_hours(unit)
            .is_some_and(|hours| hours > OLD_AGE_HOURS)
    }
}
