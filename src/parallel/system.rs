//! Member of a parallel system array

use super::history::PerformanceHistory;
use super::{
    ParallelSystemArray, SystemId, ERROR_MESSAGE, HANDSHAKE_REPLY, HISTORY_UID, REPORT_SEGMENT,
    REPORT_SEGMENT_ERROR,
};
use crate::config::SegmentationConfig;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::external::ExternalSystem;
use crate::markup::XmlNode;
use crate::protocol::{Invoke, Protocol};
use crate::sync::RwLock;
use std::sync::{Arc, Weak};

/// Performance state of one member, replaced as a unit under write mode
#[derive(Debug, Clone)]
pub struct PerformanceRecord {
    /// Weight used for segmentation
    pub index: f64,
    pub history: PerformanceHistory,
    /// Whether the member may receive segments
    pub available: bool,
}

impl PerformanceRecord {
    pub fn new(config: &SegmentationConfig) -> Self {
        Self {
            index: config.baseline_index,
            history: PerformanceHistory::new(config.history_capacity),
            available: true,
        }
    }
}

/// One worker connection inside a [`ParallelSystemArray`]
///
/// Segment reports and handshake replies are handled here; every other
/// listener goes to the underlying [`ExternalSystem`], which forwards it to
/// the array.
#[derive(Debug)]
pub struct ParallelSystem {
    id: SystemId,
    base: ExternalSystem,
    array: Weak<ParallelSystemArray>,
    record: RwLock<PerformanceRecord>,
}

impl ParallelSystem {
    pub(super) fn new(
        id: SystemId,
        base: ExternalSystem,
        array: Weak<ParallelSystemArray>,
        config: &SegmentationConfig,
        available: bool,
    ) -> Self {
        let mut record = PerformanceRecord::new(config);
        record.available = available;
        Self {
            id,
            base,
            array,
            record: RwLock::new(record),
        }
    }

    pub fn id(&self) -> SystemId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn base(&self) -> &ExternalSystem {
        &self.base
    }

    /// Copy of the current performance record
    pub fn record(&self) -> PerformanceRecord {
        self.record.read().clone()
    }

    pub fn performance_index(&self) -> f64 {
        self.record.read().index
    }

    /// Pin the index, for example from an operator's estimate
    pub fn set_performance_index(&self, index: f64) {
        self.record.write().index = index;
    }

    pub fn is_available(&self) -> bool {
        self.record.read().available
    }

    /// Returns the previous availability
    pub(super) fn set_available(&self, available: bool) -> bool {
        std::mem::replace(&mut self.record.write().available, available)
    }

    pub fn mean_throughput(&self) -> Option<f64> {
        self.record.read().history.mean_throughput()
    }

    /// Replace history and index together; availability is left as it is
    pub(super) fn commit_round_trip(&self, history: PerformanceHistory, index: f64) {
        let mut record = self.record.write();
        record.history = history;
        record.index = index;
    }

    fn array(&self) -> Result<Arc<ParallelSystemArray>> {
        self.array
            .upgrade()
            .ok_or_else(|| Error::Disconnected(format!("{} has left its array", self.name())))
    }
}

impl Protocol for ParallelSystem {
    fn send_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        self.base.send_data(invoke)
    }

    fn reply_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        match invoke.listener() {
            REPORT_SEGMENT => {
                let uid = invoke.named(HISTORY_UID)?.as_u64()?;
                let values = invoke
                    .parameters()
                    .filter(|p| p.name.as_deref() != Some(HISTORY_UID))
                    .map(|p| p.value.clone())
                    .collect();
                self.array()?.complete_segment(self.id, uid, values)
            }
            REPORT_SEGMENT_ERROR => {
                let uid = invoke.named(HISTORY_UID)?.as_u64()?;
                let message = invoke
                    .named(ERROR_MESSAGE)
                    .and_then(|value| value.as_str())
                    .unwrap_or("unspecified worker error");
                self.array()?.fail_segment(self.id, uid, message)
            }
            HANDSHAKE_REPLY => self.array()?.readmit(self.id),
            _ => self.base.reply_data(invoke),
        }
    }
}

impl Default for ParallelSystem {
    fn default() -> Self {
        Self::new(
            0,
            ExternalSystem::default(),
            Weak::new(),
            &SegmentationConfig::default(),
            true,
        )
    }
}

impl Entity for ParallelSystem {
    fn tag(&self) -> &str {
        self.base.tag()
    }

    fn key(&self) -> String {
        self.base.key()
    }

    fn construct(&mut self, xml: &XmlNode) -> Result<()> {
        self.base.construct(xml)?;
        self.id = xml.attribute_as("id")?;

        let record = self.record.get_mut();
        record.index = xml.attribute_as("performance")?;
        record.available = xml.attribute_as("available")?;
        record.history.construct(xml)
    }

    fn to_xml(&self) -> XmlNode {
        let record = self.record();
        let mut xml = self.base.to_xml();
        xml.set_attribute("id", self.id);
        xml.set_attribute("performance", record.index);
        xml.set_attribute("available", record.available);
        record.history.export_into(&mut xml);
        xml
    }
}
