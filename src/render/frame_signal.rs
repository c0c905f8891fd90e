// SPDX-License-Identifier: GPL-3.0-only

//! Coalescing "frame available" signal
//!
//! Producers may notify from any thread at any rate. The render thread
//! consumes at most one pending notification per draw; notifications that
//! arrive while one is already pending collapse into it.

use crate::stats::PipelineStats;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Latest-wins pending flag shared between producer and render thread
#[derive(Debug, Default)]
pub struct FrameSignal {
    pending: AtomicBool,
    stats: Option<Arc<PipelineStats>>,
}

impl FrameSignal {
    pub fn new(stats: Option<Arc<PipelineStats>>) -> Arc<Self> {
        Arc::new(Self {
            pending: AtomicBool::new(false),
            stats,
        })
    }

    /// Mark a frame as pending
    ///
    /// Returns `false` when a frame was already pending and this notification
    /// was coalesced into it.
    pub fn notify(&self) -> bool {
        let was_pending = self.pending.swap(true, Ordering::AcqRel);
        if was_pending && let Some(stats) = &self.stats {
            PipelineStats::incr(&stats.frame_signals_coalesced);
        }
        !was_pending
    }

    /// Consume the pending notification, if any
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}
