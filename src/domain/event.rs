use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::request::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            EventLevel::Debug => "DEBUG",
            EventLevel::Info => "INFO",
            EventLevel::Warn => "WARN",
            EventLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(EventLevel::Debug),
            "INFO" => Ok(EventLevel::Info),
            "WARN" | "WARNING" => Ok(EventLevel::Warn),
            "ERROR" => Ok(EventLevel::Error),
            other => Err(format!("unknown event level '{other}'")),
        }
    }
}

/// Audit event as stored. Never modified after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub request_id: RequestId,
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub system: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

/// Event about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub level: EventLevel,
    pub system: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

impl NewEvent {
    pub fn new(level: EventLevel, system: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            system: system.into(),
            message: message.into(),
            metadata: None,
        }
    }

    pub fn info(system: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, system, message)
    }

    pub fn warn(system: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Warn, system, message)
    }

    pub fn error(system: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, system, message)
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
