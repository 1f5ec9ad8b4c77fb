//! Round-trip history of one system

use crate::entity::{Entity, EntityGroup};
use crate::error::{Error, Result};
use crate::markup::XmlNode;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use std::time::Duration;

/// Elapsed times below this are treated as this when computing throughput
pub const MIN_ELAPSED: Duration = Duration::from_micros(1);

/// One completed segment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryEntry {
    /// Identifier the segment was sent under
    pub uid: u64,
    /// Work units in the segment
    pub size: usize,
    /// Time from sending the segment to receiving its result
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Entry completed now
    pub fn new(uid: u64, size: usize, elapsed: Duration) -> Self {
        Self {
            uid,
            size,
            elapsed,
            // Exported timestamps carry microseconds
            completed_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// Work units per second
    pub fn throughput(&self) -> f64 {
        self.size as f64 / self.elapsed.max(MIN_ELAPSED).as_secs_f64()
    }
}

impl Entity for HistoryEntry {
    fn tag(&self) -> &str {
        "history"
    }

    fn key(&self) -> String {
        self.uid.to_string()
    }

    fn construct(&mut self, xml: &XmlNode) -> Result<()> {
        self.uid = xml.attribute_as("uid")?;
        self.size = xml.attribute_as("size")?;
        self.elapsed = Duration::from_micros(xml.attribute_as("elapsed_us")?);

        let completed_at = xml.require_attribute("completed_at")?;
        self.completed_at = DateTime::parse_from_rfc3339(completed_at)
            .map_err(|e| Error::Structural(format!("bad completed_at {:?}: {}", completed_at, e)))?
            .with_timezone(&Utc);
        Ok(())
    }

    fn to_xml(&self) -> XmlNode {
        let mut xml = XmlNode::new("history");
        xml.set_attribute("uid", self.uid);
        xml.set_attribute("size", self.size);
        xml.set_attribute("elapsed_us", self.elapsed.as_micros());
        xml.set_attribute(
            "completed_at",
            self.completed_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        );
        xml
    }
}

/// Bounded ring of recent round trips, oldest evicted first
#[derive(Debug, Clone)]
pub struct PerformanceHistory {
    capacity: usize,
    entries: EntityGroup<HistoryEntry>,
}

impl PerformanceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: EntityGroup::new("history").nested_in("histories"),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push(entry);
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Average of the entries' throughputs, or `None` without history
    pub fn mean_throughput(&self) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        let sum: f64 = self.entries.iter().map(HistoryEntry::throughput).sum();
        Some(sum / self.entries.len() as f64)
    }

    /// Rebuild from the owner's element, keeping the newest entries that fit
    pub fn construct(&mut self, xml: &XmlNode) -> Result<()> {
        self.entries.construct(xml)?;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        Ok(())
    }

    pub fn export_into(&self, xml: &mut XmlNode) {
        self.entries.export_into(xml);
    }
}
