// MeshTail - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Every bound used by the ring, registry, wire codec and config validation
// lives here so the limits can be audited in one place.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "MeshTail";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "MeshTail";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Line history (RingStore)
// =============================================================================

/// Default number of line slots held by the ring.
pub const DEFAULT_RING_LINES: usize = 220;

/// Minimum user-configurable ring capacity.
pub const MIN_RING_LINES: usize = 16;

/// Maximum user-configurable ring capacity.
pub const MAX_RING_LINES: usize = 4_096;

/// Maximum stored length of a single line in bytes. Longer lines are
/// truncated on a UTF-8 character boundary, never rejected.
pub const MAX_LINE_BYTES: usize = 255;

// =============================================================================
// Snapshot (polling) limits
// =============================================================================

/// Default upper bound on a single `/log` response body.
pub const DEFAULT_MAX_SNAPSHOT_BYTES: usize = 64 * 1024; // 64 KB

/// Minimum snapshot bound. Must comfortably hold one full line plus newline.
pub const MIN_MAX_SNAPSHOT_BYTES: usize = 1024;

/// Maximum snapshot bound.
pub const MAX_MAX_SNAPSHOT_BYTES: usize = 1024 * 1024; // 1 MB

// =============================================================================
// Node registry
// =============================================================================

/// Default number of remote nodes remembered by the registry.
pub const DEFAULT_MAX_NODES: usize = 24;

/// Minimum user-configurable registry capacity.
pub const MIN_MAX_NODES: usize = 1;

/// Maximum user-configurable registry capacity.
pub const MAX_MAX_NODES: usize = 256;

/// Maximum label length in bytes (the wire field is 16 bytes, NUL padded).
pub const MAX_LABEL_BYTES: usize = 15;

/// Label used when a node never announced one.
pub const FALLBACK_LABEL: &str = "node";

// =============================================================================
// Local identity defaults
// =============================================================================

/// Locally-administered default address for the local node.
pub const DEFAULT_LOCAL_ADDRESS: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];

/// Default label for the local node.
pub const DEFAULT_LOCAL_LABEL: &str = "node0";

// =============================================================================
// Timestamps
// =============================================================================

/// Prefix used when the local clock has not been synchronised yet.
pub const NO_TIME_PREFIX: &str = "[no-time] ";

/// Clocks reading earlier than this year are treated as unsynchronised.
pub const MIN_SYNCED_YEAR: i32 = 2020;

/// strftime pattern for the bracketed line prefix.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// Wire format
// =============================================================================

/// First byte of every mesh frame.
pub const FRAME_MAGIC: u8 = 0xA5;

/// Supported frame version.
pub const FRAME_VERSION: u8 = 1;

/// Size of the fixed frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 14;

/// Largest datagram the transport will read.
pub const MAX_FRAME_LEN: usize = 512;

// =============================================================================
// Transport and peer behaviour
// =============================================================================

/// Default UDP bind address for the mesh transport.
pub const DEFAULT_TRANSPORT_BIND: &str = "0.0.0.0:4750";

/// Default interval between identity announcements (ms).
pub const DEFAULT_ANNOUNCE_INTERVAL_MS: u64 = 2_000;

/// Minimum user-configurable announce interval (ms).
pub const MIN_ANNOUNCE_INTERVAL_MS: u64 = 500;

/// Maximum user-configurable announce interval (ms).
pub const MAX_ANNOUNCE_INTERVAL_MS: u64 = 60_000;

/// Lines queued for forwarding before new ones are dropped.
pub const FORWARD_QUEUE_DEPTH: usize = 256;

// =============================================================================
// HTTP endpoints
// =============================================================================

/// Default HTTP bind address.
pub const DEFAULT_HTTP_BIND: &str = "0.0.0.0:8080";

/// Default viewer poll interval (ms).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Minimum user-configurable viewer poll interval (ms).
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Maximum user-configurable viewer poll interval (ms).
pub const MAX_POLL_INTERVAL_MS: u64 = 10_000; // 10 s

/// Response header carrying the next cursor.
pub const HEADER_LOG_NEXT: &str = "x-log-next";

/// Response header carrying the reset flag ("1" or "0").
pub const HEADER_LOG_RESET: &str = "x-log-reset";

// =============================================================================
// Config / logging
// =============================================================================

/// Default logging level when neither RUST_LOG, --debug, nor config set one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";
