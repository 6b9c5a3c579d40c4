use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Pot,
    Card,
    Player,
    Action,
    StateTransition,
    Performance,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::Pot => "pot",
            EventCategory::Card => "card",
            EventCategory::Player => "player",
            EventCategory::Action => "action",
            EventCategory::StateTransition => "state_transition",
            EventCategory::Performance => "performance",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Info,
    Success,
    Warning,
    Error,
}

/// A state change handed to the external transport.
#[derive(Clone, Debug, Serialize)]
pub struct DetectionEvent {
    /// Monotonic per-dispatcher sequence number
    pub sequence: u64,
    pub category: EventCategory,
    pub severity: EventSeverity,
    pub message: String,
    pub payload: serde_json::Value,
    /// Shared by every event of one capture cycle; `None` outside a cycle
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl DetectionEvent {
    pub fn new(
        sequence: u64,
        category: EventCategory,
        severity: EventSeverity,
        message: String,
        payload: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            sequence,
            category,
            severity,
            message,
            payload,
            correlation_id,
            timestamp: Local::now(),
        }
    }

    /// The `transition` payload field of state-transition events.
    pub fn transition(&self) -> Option<&str> {
        if self.category != EventCategory::StateTransition {
            return None;
        }
        self.payload.get("transition").and_then(|v| v.as_str())
    }
}
