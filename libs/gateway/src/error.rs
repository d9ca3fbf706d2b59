//! Gateway Error Types
//!
//! Errors surfaced to callers of the gateway. Transport drops and malformed
//! inbound frames are recovered locally and never show up here; what remains
//! are configuration mistakes, calls on a closed gateway, and directory or
//! parameter calls that the configuration asks to fail loudly.

use thiserror::Error;

/// Main gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection management errors
    #[error("Connection error: {message} (url: {url})")]
    Connection {
        message: String,
        url: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Wire protocol and serialization errors
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Operation exceeded its deadline
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Directory call (agents, agentForService, ...) got no usable answer
    #[error("Directory error: {action}: {message}")]
    Directory { action: String, message: String },

    /// Parameter get/set got no usable answer
    #[error("Parameter error: {params}: {message}")]
    Parameter { params: String, message: String },

    /// The gateway behind a handle or agent id has been closed or dropped
    #[error("Gateway closed")]
    Closed,

    /// No tokio runtime available to drive the connector
    #[error("Runtime error: {message}")]
    Runtime { message: String },
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            url: url.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            url: url.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a protocol error with source
    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Protocol {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a directory call error
    pub fn directory(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Directory {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create a parameter call error
    pub fn parameter(params: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parameter {
            params: params.into(),
            message: message.into(),
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Check if retrying the same call later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Network { .. } => true,
            GatewayError::Connection { .. } => true,
            GatewayError::Timeout { .. } => true,
            GatewayError::Directory { .. } => true,
            GatewayError::Parameter { .. } => true,
            GatewayError::Protocol { .. } => false,
            GatewayError::Configuration { .. } => false,
            GatewayError::Closed => false,
            GatewayError::Runtime { .. } => false,
        }
    }

    /// Get error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::Network { .. } => "network",
            GatewayError::Connection { .. } => "connection",
            GatewayError::Protocol { .. } => "protocol",
            GatewayError::Configuration { .. } => "configuration",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Directory { .. } => "directory",
            GatewayError::Parameter { .. } => "parameter",
            GatewayError::Closed => "closed",
            GatewayError::Runtime { .. } => "runtime",
        }
    }
}

/// Convert URL parse failures into configuration errors
impl From<url::ParseError> for GatewayError {
    fn from(error: url::ParseError) -> Self {
        GatewayError::configuration(format!("Invalid gateway URL: {}", error), Some("url"))
    }
}

/// Convert JSON failures into protocol errors
impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        GatewayError::protocol_with_source("JSON serialization failed", error)
    }
}
