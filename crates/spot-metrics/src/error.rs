//! Error types for the metrics server.

use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias for metrics server operations.
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Errors that can occur while serving metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Failed to bind to the listen address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    /// The server stopped with an I/O error.
    #[error("metrics server failed: {0}")]
    Serve(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_failed_names_address() {
        let addr: SocketAddr = ([127, 0, 0, 1], 9235).into();
        let err = MetricsError::BindFailed(addr, std::io::Error::other("in use"));
        assert_eq!(err.to_string(), "failed to bind to 127.0.0.1:9235: in use");
    }
}
