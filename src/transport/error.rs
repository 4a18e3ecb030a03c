//! Error types for the transport layer.

use std::io;

use thiserror::Error;

use crate::transport::TransportKind;

/// Errors that can occur while starting or running a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to bind the listening endpoint.
    #[error("failed to bind {transport} listener on {endpoint}: {source}")]
    Bind {
        /// Which transport failed.
        transport: TransportKind,
        /// The address, path or pipe name.
        endpoint: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The transport stopped serving because of an I/O error.
    #[error("{transport} listener failed: {source}")]
    Serve {
        /// Which transport failed.
        transport: TransportKind,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Every configured transport failed to start or all were disabled.
    #[error("no transport could be started")]
    NoneAvailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_displays_endpoint() {
        let err = TransportError::Bind {
            transport: TransportKind::Http,
            endpoint: "127.0.0.1:8090".into(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:8090"));
        assert!(msg.contains("HTTP"));
    }

    #[test]
    fn none_available_display() {
        assert!(TransportError::NoneAvailable.to_string().contains("no transport"));
    }
}
