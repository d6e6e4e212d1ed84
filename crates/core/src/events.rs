use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Lazy, ordered sequence of events produced by one invocation
pub type EventStream = BoxStream<'static, ToolEvent>;

/// An event emitted while a tool runs
///
/// `Success` and `Error` are terminal: exactly one of them ends every
/// invocation and nothing follows it. `Progress` and `Log` may repeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolEvent {
    Success {
        result: serde_json::Value,
    },
    Error {
        message: String,
    },
    Progress {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent: Option<f64>,
    },
    Log {
        level: LogLevel,
        message: String,
    },
}

/// Severity of a `Log` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl ToolEvent {
    pub fn success(result: impl Into<serde_json::Value>) -> Self {
        Self::Success {
            result: result.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn progress(message: impl Into<String>, percent: Option<f64>) -> Self {
        Self::Progress {
            message: message.into(),
            percent,
        }
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Error { .. })
    }

    /// Wire discriminator, also used to build notification method names
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
            Self::Progress { .. } => "progress",
            Self::Log { .. } => "log",
        }
    }
}
