//! Error types for the RTE client
//!
//! Callers are expected to branch on the top-level [`RteError`] variants: a slow
//! host ([`RteError::Timeout`]) is distinct from an unreachable one
//! ([`RteError::Connection`]), from bad input addressing
//! ([`RteError::InvalidFieldPosition`] / [`RteError::InvalidFieldLabel`]) and
//! from caller misuse ([`RteError::UnsupportedOperation`]).

use std::error::Error as StdError;
use std::fmt;
use std::io;

use crate::position::{Area, Position};

/// Top-level error type for client operations
#[derive(Debug, Clone, PartialEq)]
pub enum RteError {
    /// Connect, read or write failures, including mid-session disconnects
    Connection(ConnectionError),
    /// A wait condition did not stabilize before its deadline
    Timeout { condition: String, timeout_millis: u64 },
    /// A coordinate input does not address an editable field
    InvalidFieldPosition { position: Position },
    /// No field on the current screen carries the given label
    InvalidFieldLabel { label: String },
    /// Attention key or condition not supported by the active protocol
    UnsupportedOperation { operation: String },
    /// Unexpected failure captured on a background context and relayed
    InternalFault { context: String, message: String },
}

/// Connection level errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Operation requires an established connection
    NotConnected,
    /// Connection refused by remote host
    Refused { host: String, port: u16 },
    /// TCP connect did not complete in time
    Timeout { host: String, port: u16, timeout_millis: u64 },
    /// Host name did not resolve to any address
    DnsResolution { host: String },
    /// TLS setup or handshake failure
    Handshake { message: String },
    /// Connection closed while the session was in use
    Closed { reason: String },
    /// Any other socket level failure
    Io { kind: io::ErrorKind, message: String },
}

/// Data stream decoding errors raised by the protocol engines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Record shorter than its framing requires
    IncompleteData { expected: usize, received: usize },
    /// Unknown command code in an outbound record
    InvalidCommandCode { code: u8 },
    /// Record header does not carry the expected record type
    InvalidRecordType { record_type: u16 },
    /// Buffer address outside the presentation space
    InvalidAddress { address: usize, buffer_size: usize },
    /// Field operation on a position that starts no field
    FieldNotFound { position: Position },
    /// Attention key has no encoding in this dialect
    UnsupportedKey { key: String },
}

/// Screen query errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenError {
    /// Area resolves to nothing inside the current screen dimensions
    AreaOutOfBounds { area: Area, rows: usize, columns: usize },
}

/// Configuration file errors
#[derive(Debug)]
pub enum ConfigError {
    /// Reading or writing the configuration file failed
    Io { path: String, source: io::Error },
    /// Configuration file is not valid JSON for the expected schema
    Parse { path: String, message: String },
    /// A value is present but cannot be used
    InvalidValue { key: String, value: String },
}

impl fmt::Display for RteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RteError::Connection(e) => write!(f, "Connection error: {}", e),
            RteError::Timeout { condition, timeout_millis } => {
                write!(f, "Timeout after {}ms waiting for {}", timeout_millis, condition)
            }
            RteError::InvalidFieldPosition { position } => {
                write!(f, "No editable field at position {}", position)
            }
            RteError::InvalidFieldLabel { label } => {
                write!(f, "No field found with label '{}'", label)
            }
            RteError::UnsupportedOperation { operation } => {
                write!(f, "Unsupported operation: {}", operation)
            }
            RteError::InternalFault { context, message } => {
                write!(f, "Internal fault in {}: {}", context, message)
            }
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::NotConnected => write!(f, "not connected"),
            ConnectionError::Refused { host, port } => {
                write!(f, "connection refused by {}:{}", host, port)
            }
            ConnectionError::Timeout { host, port, timeout_millis } => {
                write!(f, "connection to {}:{} timed out after {}ms", host, port, timeout_millis)
            }
            ConnectionError::DnsResolution { host } => write!(f, "failed to resolve host '{}'", host),
            ConnectionError::Handshake { message } => write!(f, "TLS handshake failed: {}", message),
            ConnectionError::Closed { reason } => write!(f, "connection closed: {}", reason),
            ConnectionError::Io { kind, message } => write!(f, "{:?}: {}", kind, message),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::IncompleteData { expected, received } => {
                write!(f, "Incomplete data: expected {} bytes, received {}", expected, received)
            }
            ProtocolError::InvalidCommandCode { code } => {
                write!(f, "Invalid command code: 0x{:02X}", code)
            }
            ProtocolError::InvalidRecordType { record_type } => {
                write!(f, "Invalid record type: 0x{:04X}", record_type)
            }
            ProtocolError::InvalidAddress { address, buffer_size } => {
                write!(f, "Buffer address {} outside buffer of {} cells", address, buffer_size)
            }
            ProtocolError::FieldNotFound { position } => {
                write!(f, "No field starts at {}", position)
            }
            ProtocolError::UnsupportedKey { key } => write!(f, "No AID for key {}", key),
        }
    }
}

impl fmt::Display for ScreenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenError::AreaOutOfBounds { area, rows, columns } => {
                write!(f, "Area {} is outside a {}x{} screen", area, rows, columns)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "Config I/O error for {}: {}", path, source),
            ConfigError::Parse { path, message } => {
                write!(f, "Config parse error in {}: {}", path, message)
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid config value for {}: '{}'", key, value)
            }
        }
    }
}

impl StdError for RteError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            RteError::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl StdError for ConnectionError {}
impl StdError for ProtocolError {}
impl StdError for ScreenError {}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConnectionError> for RteError {
    fn from(error: ConnectionError) -> Self {
        RteError::Connection(error)
    }
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => ConnectionError::Closed { reason: error.to_string() },
            kind => ConnectionError::Io { kind, message: error.to_string() },
        }
    }
}

impl From<io::Error> for RteError {
    fn from(error: io::Error) -> Self {
        RteError::Connection(error.into())
    }
}

impl From<ProtocolError> for RteError {
    fn from(error: ProtocolError) -> Self {
        RteError::InternalFault {
            context: "protocol".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<ScreenError> for RteError {
    fn from(error: ScreenError) -> Self {
        RteError::InternalFault {
            context: "screen".to_string(),
            message: error.to_string(),
        }
    }
}

impl RteError {
    /// True for the "host too slow" outcome of an await
    pub fn is_timeout(&self) -> bool {
        matches!(self, RteError::Timeout { .. })
    }

    /// True for any connection level failure
    pub fn is_connection(&self) -> bool {
        matches!(self, RteError::Connection(_))
    }
}

/// Result type alias for client operations
pub type RteResult<T> = Result<T, RteError>;

/// Result type alias for protocol engine operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = RteError::InvalidFieldLabel { label: "Usr".to_string() };
        assert_eq!(error.to_string(), "No field found with label 'Usr'");

        let error = RteError::Timeout { condition: "sync".to_string(), timeout_millis: 5000 };
        assert!(error.to_string().contains("5000ms"));
        assert!(error.is_timeout());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let error: RteError = io_error.into();
        assert!(error.is_connection());
        assert!(matches!(error, RteError::Connection(ConnectionError::Closed { .. })));

        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let error: ConnectionError = io_error.into();
        assert!(matches!(error, ConnectionError::Io { kind: io::ErrorKind::PermissionDenied, .. }));
    }

    #[test]
    fn test_error_source_chain() {
        let error = RteError::Connection(ConnectionError::NotConnected);
        assert!(error.source().is_some());

        let error = RteError::UnsupportedOperation { operation: "PA1".to_string() };
        assert!(error.source().is_none());
    }

    #[test]
    fn test_protocol_error_becomes_internal_fault() {
        let error: RteError = ProtocolError::InvalidCommandCode { code: 0x99 }.into();
        match error {
            RteError::InternalFault { context, message } => {
                assert_eq!(context, "protocol");
                assert!(message.contains("0x99"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
