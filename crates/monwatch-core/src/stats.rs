//! Running statistics over the block and log feeds.

use std::collections::VecDeque;
use std::time::Instant;

use crate::block::{BlockEvent, CommitState};

/// Number of inter-block gaps kept for timing statistics.
pub const INTERVAL_WINDOW: usize = 50;

/// Read-only copy of the aggregator state, for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub standard_blocks: u64,
    pub speculative_blocks: u64,
    pub logs: u64,
    pub proposed: u64,
    pub finalized: u64,
    pub min_interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
    pub average_interval_ms: u64,
}

/// Counters and the bounded inter-block interval window.
///
/// Counters only grow for the lifetime of one connection; [`reset`]
/// zeroes everything on a fresh connect.
///
/// [`reset`]: StatsAggregator::reset
#[derive(Debug, Default)]
pub struct StatsAggregator {
    standard_blocks: u64,
    speculative_blocks: u64,
    logs: u64,
    proposed: u64,
    finalized: u64,
    intervals: VecDeque<u64>,
    min_interval_ms: Option<u64>,
    max_interval_ms: Option<u64>,
    last_block_at: Option<Instant>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one block notification.
    ///
    /// Speculative blocks bump the matching commit-state sub-counter;
    /// states outside the known set are logged but counted by neither,
    /// since the upstream taxonomy may grow.
    pub fn record_block(&mut self, event: &BlockEvent) {
        if event.speculative {
            self.speculative_blocks += 1;
            match &event.commit_state {
                Some(CommitState::Proposed) => self.proposed += 1,
                Some(CommitState::Finalized) => self.finalized += 1,
                Some(CommitState::Other(label)) => {
                    tracing::debug!(state = %label, "uncounted commit state");
                }
                None => {}
            }
        } else {
            self.standard_blocks += 1;
        }
    }

    /// Record a block arrival time, regardless of kind.
    ///
    /// The first block after a reset has no predecessor and contributes
    /// no interval sample.
    pub fn record_interval(&mut self, now: Instant) {
        if let Some(prev) = self.last_block_at {
            self.push_interval(now.saturating_duration_since(prev).as_millis() as u64);
        }
        self.last_block_at = Some(now);
    }

    fn push_interval(&mut self, ms: u64) {
        self.intervals.push_back(ms);
        if self.intervals.len() > INTERVAL_WINDOW {
            self.intervals.pop_front();
        }
        self.min_interval_ms = Some(self.min_interval_ms.map_or(ms, |m| m.min(ms)));
        self.max_interval_ms = Some(self.max_interval_ms.map_or(ms, |m| m.max(ms)));
    }

    /// Count log events. A batched delivery of N records counts as N.
    pub fn record_logs(&mut self, count: usize) {
        self.logs += count as u64;
    }

    /// Mean of the interval window, rounded to the nearest millisecond.
    /// 0 on an empty window.
    pub fn average_interval(&self) -> u64 {
        if self.intervals.is_empty() {
            return 0;
        }
        let sum: u64 = self.intervals.iter().sum();
        (sum as f64 / self.intervals.len() as f64).round() as u64
    }

    /// Zero every counter and clear the interval window.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            standard_blocks: self.standard_blocks,
            speculative_blocks: self.speculative_blocks,
            logs: self.logs,
            proposed: self.proposed,
            finalized: self.finalized,
            min_interval_ms: self.min_interval_ms,
            max_interval_ms: self.max_interval_ms,
            average_interval_ms: self.average_interval(),
        }
    }
}
