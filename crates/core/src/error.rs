//! Error types shared by the registry, the invocation engine and the adapters.

/// Result type for toolgate operations.
pub type ToolgateResult<T> = Result<T, ToolgateError>;

/// JSON-RPC error codes used on the wire.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Missing, unknown or closed session.
    pub const INVALID_SESSION: i32 = -32000;
}

/// Error types that can occur while resolving, invoking or routing a tool call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolgateError {
    /// No tool is registered under this name.
    #[error("Tool '{0}' not found")]
    NotFound(String),

    /// A tool with this name is already registered.
    #[error("Tool '{0}' is already registered")]
    DuplicateName(String),

    /// The provider rejected its arguments.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A session-bound message carried a missing or unknown session id.
    #[error("Invalid or missing session ID")]
    InvalidSession,

    /// The wire payload could not be parsed.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// The provider failed while doing its work.
    #[error("{0}")]
    ProviderFault(String),

    /// The invocation terminated with an `Error` event.
    #[error("{0}")]
    ToolFailed(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolgateError {
    /// JSON-RPC error code used when this error is rejected at the protocol level.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::InvalidSession => codes::INVALID_SESSION,
            Self::MalformedMessage(_) => codes::PARSE_ERROR,
            Self::InvalidInput(_) => codes::INVALID_PARAMS,
            Self::NotFound(_) => codes::METHOD_NOT_FOUND,
            _ => codes::INTERNAL_ERROR,
        }
    }

    /// Whether the error belongs on the tool's own event channel rather than
    /// being rejected at the adapter boundary.
    pub fn is_tool_level(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::InvalidInput(_) | Self::ProviderFault(_) | Self::ToolFailed(_)
        )
    }
}

impl From<serde_json::Error> for ToolgateError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}
