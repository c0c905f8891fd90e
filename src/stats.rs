// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline counters
//!
//! Overload is handled by dropping work silently (coalesced producer signals,
//! superseded or rejected encoder frames, starved targets). These counters
//! make those drops observable.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared atomic counters, cloned into every stage
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub frames_drawn: AtomicU64,
    pub texture_updates: AtomicU64,
    pub frame_signals_coalesced: AtomicU64,
    pub frames_handed_to_encoder: AtomicU64,
    pub encoder_frames_superseded: AtomicU64,
    pub encoder_frames_dropped_full: AtomicU64,
    pub encoder_frames_encoded: AtomicU64,
    pub targets_starved: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_drawn: u64,
    pub texture_updates: u64,
    pub frame_signals_coalesced: u64,
    pub frames_handed_to_encoder: u64,
    pub encoder_frames_superseded: u64,
    pub encoder_frames_dropped_full: u64,
    pub encoder_frames_encoded: u64,
    pub targets_starved: u64,
}

impl PipelineStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_drawn: load(&self.frames_drawn),
            texture_updates: load(&self.texture_updates),
            frame_signals_coalesced: load(&self.frame_signals_coalesced),
            frames_handed_to_encoder: load(&self.frames_handed_to_encoder),
            encoder_frames_superseded: load(&self.encoder_frames_superseded),
            encoder_frames_dropped_full: load(&self.encoder_frames_dropped_full),
            encoder_frames_encoded: load(&self.encoder_frames_encoded),
            targets_starved: load(&self.targets_starved),
        }
    }
}

impl StatsSnapshot {
    /// Frames handed to the encoder that never reached the codec
    pub fn encoder_frames_lost(&self) -> u64 {
        self.encoder_frames_superseded + self.encoder_frames_dropped_full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = PipelineStats::new();
        PipelineStats::incr(&stats.frames_drawn);
        PipelineStats::add(&stats.encoder_frames_superseded, 3);
        PipelineStats::incr(&stats.encoder_frames_dropped_full);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_drawn, 1);
        assert_eq!(snap.encoder_frames_lost(), 4);
        assert_eq!(snap.encoder_frames_encoded, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = PipelineStats::new().snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"targets_starved\":0"));
    }
}
