//! Monotonic query identifier generator.

use std::sync::atomic::{AtomicU64, Ordering};
use zeekagent_commons::QueryId;

/// Highest sequence number the generator issues.
///
/// Caller-supplied numeric identifiers above it are refused so they can
/// never push the counter to the end of its range.
pub const MAX_SEQUENCE: u64 = i64::MAX as u64;

/// Issues decimal identifiers `1, 2, 3, ...`.
///
/// The counter only moves forward. Numeric identifiers that enter the
/// registry from elsewhere (caller-supplied or recovered) are fed to
/// [`IdGenerator::observe`] so they are never issued again.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh identifier, or `None` once `MAX_SEQUENCE` was reached.
    pub fn next(&self) -> Option<QueryId> {
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                last.checked_add(1).filter(|next| *next <= MAX_SEQUENCE)
            })
            .ok()
            .map(|last| QueryId::from_sequence(last + 1))
    }

    /// Advance past `id` if it is numeric and within range.
    pub fn observe(&self, id: &QueryId) {
        match id.sequence() {
            Some(seq) if seq <= MAX_SEQUENCE => self.resume(seq),
            Some(seq) => log::warn!("Ignoring out-of-range identifier sequence {}", seq),
            None => {}
        }
    }

    /// Advance the counter to at least `high_water`.
    pub fn resume(&self, high_water: u64) {
        self.last
            .fetch_max(high_water.min(MAX_SEQUENCE), Ordering::SeqCst);
    }

    /// Highest value issued or observed so far.
    pub fn high_water(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}
