//! Error types and retry classification for SSH tunnels.
//!
//! Every failure raised by the tunnelling layer is an [`SshError`]. Failures
//! raised by a wrapped delegate never pass through this type; they are handed
//! back to the caller untouched.
//!
//! # Classification Strategy
//!
//! [`SshError::is_retryable`] tells callers whether retrying the whole
//! operation may help. Configuration and construction problems never
//! resolve on retry. Local port allocation and I/O failures are transient.
//! Connection failures reported by russh are classified by message:
//!
//! 1. **Authentication Failures (NOT retryable)**: wrong keys, denied access.
//! 2. **Connection Errors (retryable)**: refused, reset, timed out.
//! 3. **Unknown Errors**: retryable unless they look like SSH protocol
//!    errors without a connect/timeout keyword.
//!
//! Authentication keywords take precedence over connection keywords.

use thiserror::Error;

/// Authentication error patterns that indicate permanent failures.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "key authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
    "host key",
];

/// Connection error patterns that indicate transient failures.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
];

/// Errors raised while configuring, building or operating an SSH tunnel.
#[derive(Debug, Error)]
pub enum SshError {
    /// Settings failed validation. `field` names the first violated field.
    #[error("{message}")]
    Configuration { field: &'static str, message: String },

    /// A malformed local/remote host or port was handed to the factory.
    #[error("{message}")]
    InvalidEndpoint { field: &'static str, message: String },

    /// No free local port could be obtained.
    #[error("Unable to bind to a free localhost port")]
    PortAllocation {
        #[source]
        source: std::io::Error,
    },

    /// The session factory could not be built.
    ///
    /// Only the paths of the inputs are recorded, never key material.
    #[error("Unable to create factory with knownHosts={known_hosts} and identityKeys={private_keys}")]
    SessionConstruction {
        known_hosts: String,
        private_keys: String,
        #[source]
        source: Box<SshError>,
    },

    /// A tunnel connection manager could not be created for `expression`.
    #[error("Unable to create a TunnelConnectionManager: {expression}")]
    TunnelConstruction {
        expression: String,
        #[source]
        source: Box<SshError>,
    },

    /// General tunnelling failure, e.g. the tunnel could not be opened.
    #[error("{message}")]
    Tunnel {
        message: String,
        #[source]
        source: Box<SshError>,
    },

    /// Hop connection, authentication or forwarding failure.
    #[error("{0}")]
    Connection(String),

    /// Private key or known hosts parsing failure.
    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),

    /// Local I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`SshError`].
pub type Result<T> = std::result::Result<T, SshError>;

impl SshError {
    /// Create a configuration error for `field`.
    pub fn configuration(field: &'static str, message: impl Into<String>) -> Self {
        SshError::Configuration {
            field,
            message: message.into(),
        }
    }

    /// Create an invalid endpoint error for `field`.
    pub fn invalid_endpoint(field: &'static str, message: impl Into<String>) -> Self {
        SshError::InvalidEndpoint {
            field,
            message: message.into(),
        }
    }

    /// Create a connection error from a string.
    pub fn connection(msg: impl Into<String>) -> Self {
        SshError::Connection(msg.into())
    }

    /// Wrap `source` as a general tunnelling failure.
    pub fn tunnel(message: impl Into<String>, source: SshError) -> Self {
        SshError::Tunnel {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// The offending field for configuration and endpoint errors.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            SshError::Configuration { field, .. } | SshError::InvalidEndpoint { field, .. } => {
                Some(*field)
            }
            _ => None,
        }
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SshError::PortAllocation { .. } | SshError::Io(_) => true,
            SshError::Connection(message) => is_retryable_error(message),
            SshError::Tunnel { source, .. } => source.is_retryable(),
            SshError::Configuration { .. }
            | SshError::InvalidEndpoint { .. }
            | SshError::SessionConstruction { .. }
            | SshError::TunnelConstruction { .. }
            | SshError::Key(_) => false,
        }
    }
}

/// Determines if an error message describes a transient failure.
///
/// Authentication failures are checked first and take precedence, so
/// "Connection timeout during authentication failed" is NOT retryable.
pub(crate) fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    for auth_err in AUTH_ERRORS {
        if error_lower.contains(auth_err) {
            return false;
        }
    }

    for retryable_err in RETRYABLE_ERRORS {
        if error_lower.contains(retryable_err) {
            return true;
        }
    }

    !error_lower.contains("ssh")
        || error_lower.contains("timeout")
        || error_lower.contains("connect")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    mod auth_errors_not_retryable {
        use super::*;

        #[test]
        fn test_authentication_failed() {
            assert!(!is_retryable_error("Authentication failed"));
            assert!(!is_retryable_error("AUTHENTICATION FAILED"));
        }

        #[test]
        fn test_key_authentication_failed() {
            assert!(!is_retryable_error(
                "Key authentication failed: invalid key"
            ));
        }

        #[test]
        fn test_permission_denied() {
            assert!(!is_retryable_error("permission denied (publickey)"));
        }

        #[test]
        fn test_host_key_rejected() {
            assert!(!is_retryable_error(
                "Failed to connect to bastion:22: unknown host key"
            ));
        }
    }

    mod connection_errors_retryable {
        use super::*;

        #[test]
        fn test_connection_refused() {
            assert!(is_retryable_error("Connection refused"));
        }

        #[test]
        fn test_connection_reset() {
            assert!(is_retryable_error("connection reset by peer"));
        }

        #[test]
        fn test_timeout() {
            assert!(is_retryable_error("Operation timeout"));
        }

        #[test]
        fn test_no_route_to_host() {
            assert!(is_retryable_error("No route to host"));
        }

        #[test]
        fn test_failed_to_connect() {
            assert!(is_retryable_error("failed to connect to server"));
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn test_unknown_error_without_ssh() {
            assert!(is_retryable_error("Something went wrong"));
        }

        #[test]
        fn test_ssh_protocol_error_not_retryable() {
            assert!(!is_retryable_error("SSH protocol error"));
        }

        #[test]
        fn test_ssh_with_timeout_is_retryable() {
            assert!(is_retryable_error("SSH connection timeout"));
        }

        #[test]
        fn test_auth_error_takes_precedence_over_connection() {
            assert!(!is_retryable_error(
                "Connection timeout during authentication failed"
            ));
        }
    }

    mod variants {
        use super::*;

        #[test]
        fn test_configuration_display_and_field() {
            let err = SshError::configuration("ssh_port", "Invalid SSH port number: 0");
            assert_eq!(err.to_string(), "Invalid SSH port number: 0");
            assert_eq!(err.field(), Some("ssh_port"));
            assert!(!err.is_retryable());
        }

        #[test]
        fn test_invalid_endpoint_field() {
            let err = SshError::invalid_endpoint("remote_host", "remoteHost is required");
            assert_eq!(err.field(), Some("remote_host"));
            assert!(!err.is_retryable());
        }

        #[test]
        fn test_port_allocation_is_retryable() {
            let err = SshError::PortAllocation {
                source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
            };
            assert_eq!(err.to_string(), "Unable to bind to a free localhost port");
            assert!(err.is_retryable());
            assert!(err.source().is_some());
        }

        #[test]
        fn test_session_construction_mentions_inputs() {
            let err = SshError::SessionConstruction {
                known_hosts: "/etc/ssh/known_hosts".to_string(),
                private_keys: "/keys/a,/keys/b".to_string(),
                source: Box::new(SshError::connection("missing")),
            };
            assert_eq!(
                err.to_string(),
                "Unable to create factory with knownHosts=/etc/ssh/known_hosts and identityKeys=/keys/a,/keys/b"
            );
            assert!(!err.is_retryable());
        }

        #[test]
        fn test_tunnel_construction_carries_expression() {
            let err = SshError::TunnelConstruction {
                expression: "a->b|localhost:1:remote:2".to_string(),
                source: Box::new(SshError::connection("boom")),
            };
            assert!(err.to_string().contains("a->b|localhost:1:remote:2"));
        }

        #[test]
        fn test_tunnel_retryability_follows_source() {
            let transient = SshError::tunnel("open failed", SshError::connection("Connection refused"));
            assert!(transient.is_retryable());

            let permanent = SshError::tunnel("open failed", SshError::connection("Permission denied"));
            assert!(!permanent.is_retryable());
            assert_eq!(permanent.to_string(), "open failed");
            assert_eq!(
                permanent.source().map(|s| s.to_string()),
                Some("Permission denied".to_string())
            );
        }

        #[test]
        fn test_io_from_conversion() {
            let err: SshError = std::io::Error::other("disk").into();
            assert!(matches!(err, SshError::Io(_)));
            assert!(err.is_retryable());
        }
    }
}
