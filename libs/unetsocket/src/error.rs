//! Socket Error Types

use gateway::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SocketError {
    /// Failure in the underlying gateway
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The socket has been closed
    #[error("Socket closed")]
    Closed,

    /// Protocol number outside DATA and the user range
    #[error("Invalid protocol {protocol}: expected DATA or {min}..={max}")]
    InvalidProtocol { protocol: i32, min: i32, max: i32 },

    /// Negative node address
    #[error("Invalid node address {address}")]
    InvalidAddress { address: i32 },
}

/// Result type alias for socket operations
pub type Result<T> = std::result::Result<T, SocketError>;

impl SocketError {
    pub fn invalid_protocol(protocol: i32) -> Self {
        Self::InvalidProtocol {
            protocol,
            min: crate::protocol::USER,
            max: crate::protocol::MAX,
        }
    }
}
