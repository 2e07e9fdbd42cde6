//! AlertLogService - Alert History (Ring Buffer)
//!
//! ## Responsibilities
//!
//! - Record global alert transitions and system-error cycles
//! - Provide newest-first queries

use crate::risk_engine::AlertLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Kind of alert log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    LevelChanged,
    SystemError,
    Degraded,
}

/// Alert log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub event_id: u64,
    pub cycle: u64,
    pub kind: AlertEventKind,
    pub previous_level: AlertLevel,
    pub level: AlertLevel,
    /// Identities at critical level in the cycle
    pub critical_identities: Vec<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(cycle: u64, kind: AlertEventKind, previous_level: AlertLevel, level: AlertLevel) -> Self {
        Self {
            event_id: 0,
            cycle,
            kind,
            previous_level,
            level,
            critical_identities: Vec::new(),
            message: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Ring buffer for alert events
struct AlertRingBuffer {
    events: VecDeque<AlertEvent>,
    capacity: usize,
    next_id: u64,
}

impl AlertRingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    fn push(&mut self, mut event: AlertEvent) -> u64 {
        event.event_id = self.next_id;
        self.next_id += 1;

        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        self.next_id - 1
    }

    fn get_latest(&self, count: usize) -> Vec<AlertEvent> {
        self.events.iter().rev().take(count).cloned().collect()
    }
}

/// AlertLogService instance
pub struct AlertLogService {
    buffer: RwLock<AlertRingBuffer>,
}

impl AlertLogService {
    /// Create new AlertLogService
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(AlertRingBuffer::new(capacity)),
        }
    }

    /// Add event
    pub async fn record(&self, event: AlertEvent) -> u64 {
        let mut buffer = self.buffer.write().await;
        let id = buffer.push(event);
        tracing::debug!(event_id = id, "Alert event recorded");
        id
    }

    /// Latest events, newest first
    pub async fn get_latest(&self, count: usize) -> Vec<AlertEvent> {
        let buffer = self.buffer.read().await;
        buffer.get_latest(count)
    }

    pub async fn count(&self) -> usize {
        let buffer = self.buffer.read().await;
        buffer.events.len()
    }
}

impl Default for AlertLogService {
    fn default() -> Self {
        Self::new(2000)
    }
}
