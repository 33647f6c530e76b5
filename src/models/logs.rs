// Log line model

use serde::{Deserialize, Serialize};

/// One parsed log line. `timestamp` is kept in the runtime's own format and may not parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: String,
    pub line: String,
    /// Source container name; only set for network-scoped views.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl LogLine {
    /// Split a raw runtime line into `(timestamp, message)` on the first space.
    /// A line without a separator becomes a message with an empty timestamp.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim_end_matches(['\r', '\n']);
        match raw.split_once(' ') {
            Some((timestamp, line)) => Self {
                timestamp: timestamp.to_string(),
                line: line.to_string(),
                container: None,
            },
            None => Self {
                timestamp: String::new(),
                line: raw.to_string(),
                container: None,
            },
        }
    }

    pub fn with_source(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }
}
