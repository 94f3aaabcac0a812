//! activity.rs
//! Edge detector over "any channel nonzero".
//! Observed once per ingested frame, never per transmission, so replayed frames
//! cannot produce repeated events.

use crate::ingest::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    Activated,
    Deactivated,
}

#[derive(Debug, Default)]
pub struct ActivityTracker {
    active: bool,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an event only when the frame flips the stored state.
    pub fn observe(&mut self, frame: &Frame) -> Option<ActivityEvent> {
        let has_data = frame.has_data();
        if has_data == self.active {
            return None;
        }
        self.active = has_data;
        Some(if has_data {
            ActivityEvent::Activated
        } else {
            ActivityEvent::Deactivated
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
