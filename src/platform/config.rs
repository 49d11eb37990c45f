// MeshTail - platform/config.rs
//
// Platform-specific configuration, data directory resolution, and
// config.toml loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::model::{Label, NodeAddress};
use crate::util::constants;
use crate::util::error::{self, ConfigError};
use directories::ProjectDirs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Resolved platform paths for MeshTail configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/meshtail/ or %APPDATA%\MeshTail\)
    pub config_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            tracing::debug!(config = %config_dir.display(), "Platform paths resolved");
            Self { config_dir }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self {
                config_dir: PathBuf::from("."),
            }
        }
    }

    /// Default location of `config.toml`.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility -- a newer
/// config file can be used with an older binary without crashing.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[node]` section.
    pub node: NodeSection,
    /// `[buffer]` section.
    pub buffer: BufferSection,
    /// `[registry]` section.
    pub registry: RegistrySection,
    /// `[http]` section.
    pub http: HttpSection,
    /// `[transport]` section.
    pub transport: TransportSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[node]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Local node address, 12 hex digits.
    pub address: Option<String>,
    /// Local node label.
    pub label: Option<String>,
}

/// `[buffer]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct BufferSection {
    /// Ring capacity in lines.
    pub lines: Option<usize>,
    /// Upper bound on one polling response.
    pub max_snapshot_bytes: Option<usize>,
}

/// `[registry]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// Remote nodes remembered.
    pub max_nodes: Option<usize>,
}

/// `[http]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Serve the endpoints at all.
    pub enabled: Option<bool>,
    /// Listen address.
    pub bind: Option<String>,
    /// Viewer page poll interval.
    pub poll_interval_ms: Option<u64>,
}

/// One static `[[transport.peers]]` entry.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawPeer {
    pub address: String,
    pub endpoint: String,
}

/// `[transport]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// UDP listen address.
    pub bind: Option<String>,
    /// Aggregator endpoint to announce to.
    pub aggregator: Option<String>,
    /// Announce period.
    pub announce_interval_ms: Option<u64>,
    /// Statically known peers.
    pub peers: Vec<RawPeer>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Node --
    pub local_address: NodeAddress,
    pub local_label: Label,

    // -- Buffer / registry --
    pub ring_lines: usize,
    pub max_snapshot_bytes: usize,
    pub max_nodes: usize,

    // -- HTTP --
    pub http_enabled: bool,
    pub http_bind: SocketAddr,
    pub poll_interval_ms: u64,

    // -- Transport --
    pub transport_bind: SocketAddr,
    pub aggregator: Option<SocketAddr>,
    pub announce_interval_ms: u64,
    pub peers: Vec<(NodeAddress, SocketAddr)>,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            local_address: NodeAddress(constants::DEFAULT_LOCAL_ADDRESS),
            local_label: Label::new(constants::DEFAULT_LOCAL_LABEL),
            ring_lines: constants::DEFAULT_RING_LINES,
            max_snapshot_bytes: constants::DEFAULT_MAX_SNAPSHOT_BYTES,
            max_nodes: constants::DEFAULT_MAX_NODES,
            http_enabled: true,
            http_bind: default_socket(constants::DEFAULT_HTTP_BIND),
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
            transport_bind: default_socket(constants::DEFAULT_TRANSPORT_BIND),
            aggregator: None,
            announce_interval_ms: constants::DEFAULT_ANNOUNCE_INTERVAL_MS,
            peers: Vec::new(),
            log_level: None,
        }
    }
}

fn default_socket(s: &str) -> SocketAddr {
    s.parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
}

/// Pick the config file to load.
///
/// An explicit `--config` path must exist: a typo there is fatal rather
/// than silently running on defaults. Without one, the platform default is
/// used whether or not it exists (first run).
pub fn resolve_config_path(explicit: Option<&Path>) -> error::Result<PathBuf> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
        }
        .into()),
        None => Ok(PlatformPaths::resolve().config_file()),
    }
}

/// Load and validate the config file at `config_path`.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first-run).
/// If the file is unparseable, returns defaults with an error warning (the
/// node still starts but the operator is informed).
pub fn load_config(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(source) => {
            let err = ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(source) => {
            let err = ConfigError::TomlParse {
                path: config_path.to_path_buf(),
                source,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");
    let config = validate(raw, &mut warnings);

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

/// Validate each field against named constants, accumulating all problems.
pub fn validate(raw: RawConfig, warnings: &mut Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();

    // -- Node --
    if let Some(ref addr) = raw.node.address {
        match addr.parse::<NodeAddress>() {
            Ok(a) => config.local_address = a,
            Err(e) => warnings.push(format!(
                "[node] address = \"{addr}\" is invalid ({e}). Using default ({}).",
                config.local_address
            )),
        }
    }
    if let Some(ref label) = raw.node.label {
        config.local_label = Label::new(label);
    }

    // -- Buffer --
    range_check(
        &mut config.ring_lines,
        raw.buffer.lines,
        constants::MIN_RING_LINES..=constants::MAX_RING_LINES,
        "[buffer] lines",
        warnings,
    );
    range_check(
        &mut config.max_snapshot_bytes,
        raw.buffer.max_snapshot_bytes,
        constants::MIN_MAX_SNAPSHOT_BYTES..=constants::MAX_MAX_SNAPSHOT_BYTES,
        "[buffer] max_snapshot_bytes",
        warnings,
    );

    // -- Registry --
    range_check(
        &mut config.max_nodes,
        raw.registry.max_nodes,
        constants::MIN_MAX_NODES..=constants::MAX_MAX_NODES,
        "[registry] max_nodes",
        warnings,
    );

    // -- HTTP --
    if let Some(enabled) = raw.http.enabled {
        config.http_enabled = enabled;
    }
    socket_check(&mut config.http_bind, raw.http.bind.as_deref(), "[http] bind", warnings);
    range_check(
        &mut config.poll_interval_ms,
        raw.http.poll_interval_ms,
        constants::MIN_POLL_INTERVAL_MS..=constants::MAX_POLL_INTERVAL_MS,
        "[http] poll_interval_ms",
        warnings,
    );

    // -- Transport --
    socket_check(
        &mut config.transport_bind,
        raw.transport.bind.as_deref(),
        "[transport] bind",
        warnings,
    );
    if let Some(ref agg) = raw.transport.aggregator {
        match agg.parse::<SocketAddr>() {
            Ok(a) => config.aggregator = Some(a),
            Err(e) => warnings.push(format!(
                "[transport] aggregator = \"{agg}\" is not a socket address ({e}). \
                 Announcements disabled."
            )),
        }
    }
    range_check(
        &mut config.announce_interval_ms,
        raw.transport.announce_interval_ms,
        constants::MIN_ANNOUNCE_INTERVAL_MS..=constants::MAX_ANNOUNCE_INTERVAL_MS,
        "[transport] announce_interval_ms",
        warnings,
    );
    for peer in &raw.transport.peers {
        match (peer.address.parse::<NodeAddress>(), peer.endpoint.parse::<SocketAddr>()) {
            (Ok(a), Ok(e)) => config.peers.push((a, e)),
            _ => warnings.push(format!(
                "[[transport.peers]] address = \"{}\", endpoint = \"{}\" is invalid. Skipped.",
                peer.address, peer.endpoint
            )),
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    config
}

fn range_check<T>(
    slot: &mut T,
    value: Option<T>,
    range: std::ops::RangeInclusive<T>,
    field: &str,
    warnings: &mut Vec<String>,
) where
    T: PartialOrd + Copy + std::fmt::Display,
{
    let Some(v) = value else {
        return;
    };
    if range.contains(&v) {
        *slot = v;
    } else {
        let err = ConfigError::ValueOutOfRange {
            field: field.to_string(),
            value: v.to_string(),
            expected: format!("{}-{}", range.start(), range.end()),
        };
        warnings.push(format!("{err}. Using default ({slot})."));
    }
}

fn socket_check(slot: &mut SocketAddr, value: Option<&str>, field: &str, warnings: &mut Vec<String>) {
    let Some(v) = value else {
        return;
    };
    match v.parse::<SocketAddr>() {
        Ok(a) => *slot = a,
        Err(e) => warnings.push(format!(
            "{field} = \"{v}\" is not a socket address ({e}). Using default ({slot})."
        )),
    }
}
