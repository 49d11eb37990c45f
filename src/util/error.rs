// MeshTail - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Core operations are total and report outcomes as enums; the types here
// cover the boundaries that genuinely fail: config files, wire decoding,
// the transport, and snapshot allocation. Only startup failures are lifted
// into `MeshTailError`; the rest are handled where they occur.

use crate::core::model::NodeAddress;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for fatal startup failures.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum MeshTailError {
    /// Configuration could not be located or read.
    Config(ConfigError),

    /// I/O error with operation context.
    Io {
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for MeshTailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Io { operation, source } => {
                write!(f, "I/O error during {operation}: {source}")
            }
        }
    }
}

impl std::error::Error for MeshTailError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range or malformed.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for MeshTailError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Wire errors
// ---------------------------------------------------------------------------

/// Reasons an inbound frame is dropped at the boundary.
///
/// None of these are fatal: the receive loop logs at debug level and moves
/// on. A frame is either decoded completely or not applied at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Fewer bytes than the fixed header (or the declared payload) needs.
    Truncated { needed: usize, actual: usize },

    /// First byte is not the frame magic.
    BadMagic(u8),

    /// Header version this build does not speak.
    UnsupportedVersion(u8),

    /// Message kind this build does not handle.
    UnknownKind(u8),

    /// Payload shape is wrong for its kind.
    BadPayload { kind: u8, reason: &'static str },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, actual } => {
                write!(f, "frame truncated: need {needed} bytes, got {actual}")
            }
            Self::BadMagic(b) => write!(f, "bad frame magic 0x{b:02x}"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported frame version {v}"),
            Self::UnknownKind(k) => write!(f, "unknown frame kind {k}"),
            Self::BadPayload { kind, reason } => {
                write!(f, "malformed payload for kind {kind}: {reason}")
            }
        }
    }
}

impl std::error::Error for WireError {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Errors raised when handing a frame to the mesh transport.
#[derive(Debug)]
pub enum TransportError {
    /// No endpoint is known for the destination node yet.
    UnknownPeer(NodeAddress),

    /// The socket refused the datagram.
    Io { source: io::Error },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPeer(addr) => write!(f, "no known endpoint for node {addr}"),
            Self::Io { source } => write!(f, "datagram send failed: {source}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot errors
// ---------------------------------------------------------------------------

/// Errors related to building a polling snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// The payload buffer could not be allocated. Retryable.
    OutOfMemory { requested: usize },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "could not allocate {requested} bytes for snapshot")
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

/// Convenience type alias for MeshTail results.
pub type Result<T> = std::result::Result<T, MeshTailError>;
