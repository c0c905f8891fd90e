// SPDX-License-Identifier: GPL-3.0-only

//! Render-side recording state
//!
//! | Current | enabled          | disabled         |
//! |---------|------------------|------------------|
//! | Off     | On, start        | Off              |
//! | Resumed | On, rebind       | Off, stop        |
//! | On      | On               | Off, stop        |
//!
//! `Resumed` is only entered from `On` when a surface comes back while
//! recording is still enabled.
//!
//! Actions the encoder queue could not accept yet stay queued here in order
//! and are retried on the next reconcile.

use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RecordingState {
    #[default]
    Off,
    Resumed,
    On,
}

/// What the encoder must be told after a reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Start,
    Rebind,
    Stop,
}

/// Apply one reconcile step of the transition table
pub fn transition(state: RecordingState, enabled: bool) -> (RecordingState, Option<SessionAction>) {
    use RecordingState::*;
    match (state, enabled) {
        (Off, true) => (On, Some(SessionAction::Start)),
        (Off, false) => (Off, None),
        (Resumed, true) => (On, Some(SessionAction::Rebind)),
        (Resumed, false) => (Off, Some(SessionAction::Stop)),
        (On, true) => (On, None),
        (On, false) => (Off, Some(SessionAction::Stop)),
    }
}

/// Recording intent plus the state reconciled against it once per draw
#[derive(Debug, Default, Clone)]
pub struct SessionTracker {
    enabled: bool,
    state: RecordingState,
    undelivered: VecDeque<SessionAction>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Record the owner's intent; takes effect at the next reconcile
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Step the state machine; returns the action for the encoder, if any
    pub fn reconcile(&mut self) -> Option<SessionAction> {
        let (next, action) = transition(self.state, self.enabled);
        if next != self.state {
            debug!(from = ?self.state, to = ?next, ?action, "Recording state transition");
        }
        self.state = next;
        action
    }

    /// Queue an action for delivery to the encoder
    ///
    /// Undelivered actions collapse: a stop cancels an undelivered start,
    /// and a rebind behind an undelivered start is dropped because the start
    /// carries the context current at delivery.
    pub fn queue(&mut self, action: SessionAction) {
        match action {
            SessionAction::Start => self.undelivered.push_back(action),
            SessionAction::Rebind => {
                if !self
                    .undelivered
                    .iter()
                    .any(|a| matches!(a, SessionAction::Start | SessionAction::Rebind))
                {
                    self.undelivered.push_back(action);
                }
            }
            SessionAction::Stop => {
                while self.undelivered.back() == Some(&SessionAction::Rebind) {
                    self.undelivered.pop_back();
                }
                match self.undelivered.back() {
                    Some(SessionAction::Start) => {
                        self.undelivered.pop_back();
                    }
                    Some(SessionAction::Stop) => {}
                    _ => self.undelivered.push_back(action),
                }
            }
        }
    }

    /// Oldest action not yet accepted by the encoder
    pub fn next_undelivered(&self) -> Option<SessionAction> {
        self.undelivered.front().copied()
    }

    /// The encoder accepted (or definitively refused) the oldest action
    pub fn mark_delivered(&mut self) {
        self.undelivered.pop_front();
    }

    pub fn has_undelivered(&self) -> bool {
        !self.undelivered.is_empty()
    }

    /// A surface became ready; a live session must rebind to the new context
    ///
    /// If recording was disabled while the surface was gone the state stays
    /// `On`, so the next reconcile stops the session.
    pub fn on_surface_ready(&mut self) {
        if self.state == RecordingState::On && self.enabled {
            self.state = RecordingState::Resumed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table_is_exhaustive() {
        use RecordingState::*;
        let expected = [
            (Off, true, On, Some(SessionAction::Start)),
            (Off, false, Off, None),
            (Resumed, true, On, Some(SessionAction::Rebind)),
            (Resumed, false, Off, Some(SessionAction::Stop)),
            (On, true, On, None),
            (On, false, Off, Some(SessionAction::Stop)),
        ];
        for (state, enabled, next, action) in expected {
            assert_eq!(transition(state, enabled), (next, action), "{:?}/{}", state, enabled);
        }
    }

    #[test]
    fn test_resumed_is_unreachable_from_reconcile() {
        use RecordingState::*;
        for state in [Off, Resumed, On] {
            for enabled in [true, false] {
                assert_ne!(transition(state, enabled).0, Resumed);
            }
        }
    }

    #[test]
    fn test_resume_rebinds_once_and_never_restarts() {
        let mut tracker = SessionTracker::new();
        tracker.set_enabled(true);
        assert_eq!(tracker.reconcile(), Some(SessionAction::Start));
        assert_eq!(tracker.reconcile(), None);

        // Surface torn down and recreated
        tracker.on_surface_ready();
        assert_eq!(tracker.state(), RecordingState::Resumed);

        let actions: Vec<_> = (0..5).filter_map(|_| tracker.reconcile()).collect();
        assert_eq!(actions, vec![SessionAction::Rebind]);
        assert_eq!(tracker.state(), RecordingState::On);
    }

    #[test]
    fn test_disabled_during_teardown_stops_on_next_draw() {
        let mut tracker = SessionTracker::new();
        tracker.set_enabled(true);
        tracker.reconcile();

        tracker.set_enabled(false);
        tracker.on_surface_ready();
        assert_eq!(tracker.state(), RecordingState::On);
        assert_eq!(tracker.reconcile(), Some(SessionAction::Stop));
    }

    #[test]
    fn test_ready_without_session_stays_off() {
        let mut tracker = SessionTracker::new();
        tracker.set_enabled(true);
        tracker.on_surface_ready();
        assert_eq!(tracker.state(), RecordingState::Off);
        assert_eq!(tracker.reconcile(), Some(SessionAction::Start));
    }

    #[test]
    fn test_double_disable_stops_once() {
        let mut tracker = SessionTracker::new();
        tracker.set_enabled(true);
        tracker.reconcile();

        tracker.set_enabled(false);
        assert_eq!(tracker.reconcile(), Some(SessionAction::Stop));
        tracker.set_enabled(false);
        assert_eq!(tracker.reconcile(), None);
    }

    #[test]
    fn test_stop_cancels_undelivered_start() {
        let mut tracker = SessionTracker::new();
        tracker.queue(SessionAction::Start);
        tracker.queue(SessionAction::Rebind);
        assert_eq!(tracker.next_undelivered(), Some(SessionAction::Start));

        tracker.queue(SessionAction::Stop);
        assert!(!tracker.has_undelivered());
    }

    #[test]
    fn test_undelivered_actions_keep_order() {
        let mut tracker = SessionTracker::new();
        tracker.queue(SessionAction::Stop);
        tracker.queue(SessionAction::Start);
        tracker.queue(SessionAction::Stop);
        tracker.queue(SessionAction::Stop);
        assert_eq!(tracker.next_undelivered(), Some(SessionAction::Stop));
        tracker.mark_delivered();
        assert!(!tracker.has_undelivered());

        tracker.queue(SessionAction::Rebind);
        tracker.queue(SessionAction::Rebind);
        tracker.queue(SessionAction::Stop);
        assert_eq!(tracker.next_undelivered(), Some(SessionAction::Stop));
        tracker.mark_delivered();
        assert_eq!(tracker.next_undelivered(), None);
    }
}
