use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounded troubleshooting log: only the most recent events are kept.
pub const DEBUG_RING_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct DebugRing {
    events: VecDeque<DebugEvent>,
}

impl DebugRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: impl Into<String>, payload: serde_json::Value) {
        self.events.push_back(DebugEvent {
            timestamp: Utc::now(),
            kind: kind.into(),
            payload,
        });
        while self.events.len() > DEBUG_RING_CAPACITY {
            self.events.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Snapshot in reverse chronological order, newest first.
    pub fn snapshot(&self) -> Vec<DebugEvent> {
        self.events.iter().rev().cloned().collect()
    }
}
