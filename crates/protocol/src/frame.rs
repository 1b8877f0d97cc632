//! Trace frame model.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DELIMITER;

/// Severity of a trace event, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Information,
    Verbose,
    /// Produced only when decoding an unrecognized severity token.
    Unspecified,
}

impl Severity {
    /// All recognized severities, most severe first.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::Error,
        Severity::Warning,
        Severity::Information,
        Severity::Verbose,
    ];

    /// Token written on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Information => "Information",
            Severity::Verbose => "Verbose",
            Severity::Unspecified => "Unspecified",
        }
    }

    /// Parses a wire token.
    ///
    /// Accepts variant names (ASCII case-insensitive) and the classic
    /// trace-event numbers 1, 2, 4, 8 and 16. Anything else maps to
    /// [`Severity::Unspecified`].
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();
        match token {
            "1" => return Severity::Critical,
            "2" => return Severity::Error,
            "4" => return Severity::Warning,
            "8" => return Severity::Information,
            "16" => return Severity::Verbose,
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(token))
            .unwrap_or(Severity::Unspecified)
    }

    /// Whether this is a recognized severity.
    pub fn is_known(&self) -> bool {
        *self != Severity::Unspecified
    }

    /// Whether an event of this severity passes a switch set to `level`.
    ///
    /// `Verbose` lets everything through, `Critical` only critical events.
    pub fn passes(&self, level: Severity) -> bool {
        self.is_known() && *self <= level
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single trace event as exchanged between producer and collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFrame {
    pub severity: Severity,
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<Uuid>,
}

impl MessageFrame {
    pub fn new(severity: Severity, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            source: source.into(),
            message: message.into(),
            timestamp: None,
            activity_id: None,
        }
    }

    /// Attaches a timestamp, truncated to the millisecond precision the wire
    /// format carries.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        let truncated = DateTime::from_timestamp_millis(timestamp.timestamp_millis());
        self.timestamp = Some(truncated.unwrap_or(timestamp));
        self
    }

    pub fn with_activity_id(mut self, activity_id: Uuid) -> Self {
        self.activity_id = Some(activity_id);
        self
    }

    /// A frame is valid when its severity is recognized, both source and
    /// message contain non-whitespace text, and the source is free of the
    /// field delimiter.
    pub fn is_valid(&self) -> bool {
        self.severity.is_known()
            && !self.source.trim().is_empty()
            && !self.source.contains(DELIMITER)
            && !self.message.trim().is_empty()
    }
}

/// Human-readable line: `<timestamp> <severity> <source>: <message>`.
impl fmt::Display for MessageFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ts) = self.timestamp {
            write!(f, "{} ", ts.to_rfc3339_opts(SecondsFormat::Millis, true))?;
        }
        if let Some(id) = self.activity_id {
            write!(f, "[{id}] ")?;
        }
        write!(f, "{} {}: {}", self.severity, self.source, self.message)
    }
}
