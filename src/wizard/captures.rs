use std::collections::BTreeMap;

/// Accepted captures a slot needs before it can be calibrated.
pub const REQUIRED_CAPTURES: u32 = 15;

/// Accepted calibration-frame submissions per camera slot.
///
/// Counts only grow, one per sample the service accepted, until an explicit
/// reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureRecord {
    counts: BTreeMap<usize, u32>,
}

impl CaptureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one accepted sample for `slot`; returns the new count.
    pub fn record_accepted(&mut self, slot: usize) -> u32 {
        let count = self.counts.entry(slot).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn count(&self, slot: usize) -> u32 {
        self.counts.get(&slot).copied().unwrap_or(0)
    }

    pub fn is_ready(&self, slot: usize) -> bool {
        self.count(slot) >= REQUIRED_CAPTURES
    }

    /// Captures still needed for `slot`.
    pub fn remaining(&self, slot: usize) -> u32 {
        REQUIRED_CAPTURES.saturating_sub(self.count(slot))
    }

    pub fn reset(&mut self, slot: usize) {
        self.counts.remove(&slot);
    }

    pub fn reset_all(&mut self) {
        self.counts.clear();
    }

    /// Slots with at least one accepted capture.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.counts.iter().map(|(slot, count)| (*slot, *count))
    }
}
