//! Gatekeeper configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::SecretString;
use ras_protocol::TransportAddress;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default per-call bandwidth grant in 100 bits/s units.
/// Enough for bidirectional G.711 and 64k H.261.
pub const DEFAULT_BANDWIDTH_PER_CALL: u64 = 2560;

/// Default per-call bandwidth ceiling in 100 bits/s units.
pub const DEFAULT_MAX_BANDWIDTH_PER_CALL: u64 = 200_000;

/// Default registration lease in seconds. Zero disables expiry.
pub const DEFAULT_TIME_TO_LIVE_SECONDS: u32 = 3600;

/// Default call heartbeat interval in seconds.
pub const DEFAULT_INFO_RESPONSE_RATE_SECONDS: u32 = 60;

/// Default monitor sweep interval in seconds.
pub const DEFAULT_MONITOR_INTERVAL_SECONDS: u64 = 5;

/// Default number of deferred-work workers.
pub const DEFAULT_DEFERRED_WORKERS: usize = 4;

/// Default deferred-work queue depth.
pub const DEFAULT_DEFERRED_QUEUE_DEPTH: usize = 64;

/// Default retry estimate carried in an InProgress reply, in seconds.
pub const DEFAULT_DEFERRED_RETRY_SECONDS: u32 = 5;

/// Default tolerated clock skew for token timestamps, in seconds.
pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 600;

/// Default gatekeeper identifier prefix.
pub const DEFAULT_GK_ID_PREFIX: &str = "gk";

/// Gatekeeper configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct GatekeeperConfig {
    /// Identifier this gatekeeper answers to in GRQ/RRQ/ARQ/LRQ targeting.
    pub gatekeeper_identifier: String,

    /// RAS address advertised in GCF replies (default: "0.0.0.0:1719").
    pub ras_address: TransportAddress,

    /// Our call-signalling address, returned as the destination for every
    /// admitted call when `gatekeeper_routed` is set.
    pub signal_address: Option<TransportAddress>,

    /// Total bandwidth across all calls, in 100 bits/s units.
    pub total_bandwidth: u64,

    /// Bandwidth granted to a call on first allocation when it asks for
    /// more, in 100 bits/s units.
    pub default_bandwidth_per_call: u64,

    /// Hard per-call bandwidth ceiling, in 100 bits/s units.
    pub max_bandwidth_per_call: u64,

    /// Registration lease granted to endpoints, in seconds. Requests may
    /// ask for less, never more. Zero disables expiry.
    pub default_ttl_seconds: u32,

    /// How long a call may go without a heartbeat before the monitor
    /// probes it, in seconds.
    pub info_response_rate_seconds: u32,

    /// Monitor sweep interval in seconds.
    pub monitor_interval_seconds: u64,

    /// Route call signalling through this gatekeeper.
    pub gatekeeper_routed: bool,

    /// Require valid crypto tokens on endpoint-scoped requests.
    pub require_security: bool,

    /// Drop unauthenticated traffic without a reply instead of rejecting.
    /// Avoids reflection and avoids confirming identifiers to a prober.
    pub silent_discard_unauthenticated: bool,

    /// Only admit calls whose destination alias is registered here.
    pub registered_only_calls: bool,

    /// Only admit answered calls whose caller alias is registered here.
    pub registered_only_answers: bool,

    /// A full registration claiming an already-registered signal address
    /// evicts the previous holder instead of being rejected.
    pub overwrite_on_same_signal_address: bool,

    /// Treat an alias that parses as an IP address as a routable host.
    pub alias_can_be_host: bool,

    /// Force-disengage calls that stay silent for two heartbeat intervals.
    /// When off, such calls are only counted in statistics.
    pub disengage_on_heartbeat_fail: bool,

    /// Number of workers servicing deferred (slow-path) requests.
    pub deferred_workers: usize,

    /// Bounded queue depth for deferred requests; a full queue rejects.
    pub deferred_queue_depth: usize,

    /// Retry estimate carried in InProgress replies, in seconds.
    pub deferred_retry_seconds: u32,

    /// Tolerated skew between token timestamps and our clock, in seconds.
    pub clock_skew_seconds: i64,

    /// Per-alias H.235 passwords. Protected by `SecretString` to prevent
    /// accidental logging.
    pub passwords: HashMap<String, SecretString>,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for GatekeeperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatekeeperConfig")
            .field("gatekeeper_identifier", &self.gatekeeper_identifier)
            .field("ras_address", &self.ras_address)
            .field("signal_address", &self.signal_address)
            .field("total_bandwidth", &self.total_bandwidth)
            .field("default_bandwidth_per_call", &self.default_bandwidth_per_call)
            .field("max_bandwidth_per_call", &self.max_bandwidth_per_call)
            .field("default_ttl_seconds", &self.default_ttl_seconds)
            .field("info_response_rate_seconds", &self.info_response_rate_seconds)
            .field("monitor_interval_seconds", &self.monitor_interval_seconds)
            .field("gatekeeper_routed", &self.gatekeeper_routed)
            .field("require_security", &self.require_security)
            .field(
                "silent_discard_unauthenticated",
                &self.silent_discard_unauthenticated,
            )
            .field("registered_only_calls", &self.registered_only_calls)
            .field("registered_only_answers", &self.registered_only_answers)
            .field(
                "overwrite_on_same_signal_address",
                &self.overwrite_on_same_signal_address,
            )
            .field("alias_can_be_host", &self.alias_can_be_host)
            .field(
                "disengage_on_heartbeat_fail",
                &self.disengage_on_heartbeat_fail,
            )
            .field("deferred_workers", &self.deferred_workers)
            .field("deferred_queue_depth", &self.deferred_queue_depth)
            .field("deferred_retry_seconds", &self.deferred_retry_seconds)
            .field("clock_skew_seconds", &self.clock_skew_seconds)
            .field("passwords", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            gatekeeper_identifier: default_identifier(),
            ras_address: default_ras_address(),
            signal_address: None,
            total_bandwidth: u64::MAX,
            default_bandwidth_per_call: DEFAULT_BANDWIDTH_PER_CALL,
            max_bandwidth_per_call: DEFAULT_MAX_BANDWIDTH_PER_CALL,
            default_ttl_seconds: DEFAULT_TIME_TO_LIVE_SECONDS,
            info_response_rate_seconds: DEFAULT_INFO_RESPONSE_RATE_SECONDS,
            monitor_interval_seconds: DEFAULT_MONITOR_INTERVAL_SECONDS,
            gatekeeper_routed: false,
            require_security: false,
            silent_discard_unauthenticated: false,
            registered_only_calls: false,
            registered_only_answers: false,
            overwrite_on_same_signal_address: true,
            alias_can_be_host: true,
            disengage_on_heartbeat_fail: true,
            deferred_workers: DEFAULT_DEFERRED_WORKERS,
            deferred_queue_depth: DEFAULT_DEFERRED_QUEUE_DEPTH,
            deferred_retry_seconds: DEFAULT_DEFERRED_RETRY_SECONDS,
            clock_skew_seconds: DEFAULT_CLOCK_SKEW_SECONDS,
            passwords: HashMap::new(),
        }
    }
}

impl GatekeeperConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let gatekeeper_identifier = vars
            .get("GK_IDENTIFIER")
            .cloned()
            .unwrap_or_else(default_identifier);

        let ras_address = match vars.get("GK_RAS_ADDRESS") {
            Some(s) => s
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("GK_RAS_ADDRESS: {s}")))?,
            None => default_ras_address(),
        };

        let signal_address = match vars.get("GK_SIGNAL_ADDRESS") {
            Some(s) => Some(
                s.parse()
                    .map_err(|_| ConfigError::InvalidValue(format!("GK_SIGNAL_ADDRESS: {s}")))?,
            ),
            None => None,
        };

        let passwords = match vars.get("GK_PASSWORDS") {
            Some(raw) => parse_passwords(raw)?,
            None => HashMap::new(),
        };

        Ok(GatekeeperConfig {
            gatekeeper_identifier,
            ras_address,
            signal_address,
            total_bandwidth: parse_or(vars, "GK_TOTAL_BANDWIDTH", defaults.total_bandwidth),
            default_bandwidth_per_call: parse_or(
                vars,
                "GK_DEFAULT_BANDWIDTH",
                defaults.default_bandwidth_per_call,
            ),
            max_bandwidth_per_call: parse_or(
                vars,
                "GK_MAX_BANDWIDTH",
                defaults.max_bandwidth_per_call,
            ),
            default_ttl_seconds: parse_or(vars, "GK_TIME_TO_LIVE_SECONDS", defaults.default_ttl_seconds),
            info_response_rate_seconds: parse_or(
                vars,
                "GK_INFO_RESPONSE_RATE_SECONDS",
                defaults.info_response_rate_seconds,
            ),
            monitor_interval_seconds: parse_or(
                vars,
                "GK_MONITOR_INTERVAL_SECONDS",
                defaults.monitor_interval_seconds,
            ),
            gatekeeper_routed: parse_or(vars, "GK_GATEKEEPER_ROUTED", defaults.gatekeeper_routed),
            require_security: parse_or(vars, "GK_REQUIRE_SECURITY", defaults.require_security),
            silent_discard_unauthenticated: parse_or(
                vars,
                "GK_SILENT_DISCARD_UNAUTHENTICATED",
                defaults.silent_discard_unauthenticated,
            ),
            registered_only_calls: parse_or(
                vars,
                "GK_REGISTERED_ONLY_CALLS",
                defaults.registered_only_calls,
            ),
            registered_only_answers: parse_or(
                vars,
                "GK_REGISTERED_ONLY_ANSWERS",
                defaults.registered_only_answers,
            ),
            overwrite_on_same_signal_address: parse_or(
                vars,
                "GK_OVERWRITE_ON_SAME_SIGNAL_ADDRESS",
                defaults.overwrite_on_same_signal_address,
            ),
            alias_can_be_host: parse_or(vars, "GK_ALIAS_CAN_BE_HOST", defaults.alias_can_be_host),
            disengage_on_heartbeat_fail: parse_or(
                vars,
                "GK_DISENGAGE_ON_HEARTBEAT_FAIL",
                defaults.disengage_on_heartbeat_fail,
            ),
            deferred_workers: parse_or(vars, "GK_DEFERRED_WORKERS", defaults.deferred_workers),
            deferred_queue_depth: parse_or(
                vars,
                "GK_DEFERRED_QUEUE_DEPTH",
                defaults.deferred_queue_depth,
            ),
            deferred_retry_seconds: parse_or(
                vars,
                "GK_DEFERRED_RETRY_SECONDS",
                defaults.deferred_retry_seconds,
            ),
            clock_skew_seconds: parse_or(vars, "GK_CLOCK_SKEW_SECONDS", defaults.clock_skew_seconds),
            passwords,
        })
    }
}

fn parse_or<T: std::str::FromStr>(vars: &HashMap<String, String>, key: &str, default: T) -> T {
    vars.get(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Parse `alias=password,alias=password` pairs.
fn parse_passwords(raw: &str) -> Result<HashMap<String, SecretString>, ConfigError> {
    let mut map = HashMap::new();
    for pair in raw.split(',').filter(|p| !p.is_empty()) {
        let (alias, password) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidValue("GK_PASSWORDS: expected alias=password".to_string()))?;
        map.insert(alias.to_string(), SecretString::from(password.to_string()));
    }
    Ok(map)
}

fn default_ras_address() -> TransportAddress {
    TransportAddress::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
        ras_protocol::DEFAULT_RAS_PORT,
    )
}

/// Generate a gatekeeper instance identifier.
fn default_identifier() -> String {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    let uuid_suffix = uuid::Uuid::new_v4().to_string();
    let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
    format!("{DEFAULT_GK_ID_PREFIX}-{hostname}-{short_suffix}")
}
