use serde::Serialize;
use std::sync::OnceLock;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::density::{estimate, Tier};

/// One measurement: people seen in a frame and the resulting density.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DensityRecord {
    /// Wall-clock capture time, truncated to whole seconds.
    pub timestamp: OffsetDateTime,
    pub person_count: u32,
    /// Persons per m².
    pub density: f64,
}

impl DensityRecord {
    pub fn new(timestamp: OffsetDateTime, person_count: u32, visible_area: f64) -> Self {
        let timestamp = timestamp.replace_nanosecond(0).unwrap_or(timestamp);
        let density = estimate(person_count as usize, visible_area).density;
        Self { timestamp, person_count, density }
    }

    /// Record stamped with [`local_now`].
    pub fn now(person_count: u32, visible_area: f64) -> Self {
        Self::new(local_now(), person_count, visible_area)
    }

    pub fn tier(&self) -> Tier {
        Tier::from_density(self.density)
    }

    /// `HH:MM:SS`, as shown on the dashboard and in the export.
    pub fn clock(&self) -> String {
        let fmt = format_description!("[hour]:[minute]:[second]");
        self.timestamp.format(&fmt).unwrap_or_default()
    }
}

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Resolves and caches the local UTC offset. Must run while the process is
/// still single-threaded, otherwise the lookup is refused and UTC is used.
pub fn init_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

pub fn local_now() -> OffsetDateTime {
    let offset = LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc().to_offset(offset)
}

/// Append-only log of one run's records, in capture order.
#[derive(Debug, Default, Clone)]
pub struct SessionLog {
    records: Vec<DensityRecord>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: DensityRecord) {
        self.records.push(record);
    }

    /// Drops every record. Only the start of a new run calls this.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn snapshot(&self) -> &[DensityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&DensityRecord> {
        self.records.last()
    }

    pub fn densities(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.density).collect()
    }
}
