//! Configuration for pastel-credit-client.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Pastel network the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    /// Production network.
    #[default]
    Mainnet,
    /// Public testnet.
    Testnet,
    /// Local development network.
    Devnet,
}

impl NetworkKind {
    /// Address that burn payments are sent to on this network.
    #[must_use]
    pub fn burn_address(self) -> &'static str {
        match self {
            Self::Mainnet => "PtpasteLBurnAddressXXXXXXXXXXbJ5ndd",
            Self::Testnet => "tPpasteLBurnAddressXXXXXXXXXXX3wy7u",
            Self::Devnet => "44oUgmZSL997veFEQDq569wv5tsT6KXf9QY7",
        }
    }

    /// Default pasteld JSON-RPC port.
    #[must_use]
    pub const fn rpc_port(self) -> u16 {
        match self {
            Self::Mainnet => 9932,
            Self::Testnet => 19932,
            Self::Devnet => 29932,
        }
    }

    /// Leading characters of a transparent PSL address.
    #[must_use]
    pub fn address_prefix(self) -> &'static str {
        match self {
            Self::Mainnet => "Pt",
            Self::Testnet => "tP",
            Self::Devnet => "44",
        }
    }
}

impl std::fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Devnet => "devnet",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for NetworkKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "devnet" => Ok(Self::Devnet),
            other => Err(crate::Error::Config(format!("unknown network: {other}"))),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root directory for persisted protocol artifacts.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Network (selects burn address, RPC port and address prefix).
    #[serde(default)]
    pub network: NetworkKind,

    /// Local PastelID used to sign requests.
    #[serde(default)]
    pub pastelid: Option<String>,

    /// Base URL of the read-only chain API.
    #[serde(default = "default_opennode_api_url")]
    pub opennode_api_url: String,

    /// Port supernodes expose their HTTP API on.
    #[serde(default = "default_supernode_api_port")]
    pub supernode_api_port: u16,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// pasteld JSON-RPC connection.
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Supernode directory filtering.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Purchase negotiation.
    #[serde(default)]
    pub negotiation: NegotiationConfig,

    /// Fair-market pricing.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Retry schedule shared by directory refresh, price feed and storage retry.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// pasteld JSON-RPC connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// RPC host.
    #[serde(default = "default_rpc_host")]
    pub host: String,

    /// RPC port. Falls back to the network default when unset.
    #[serde(default)]
    pub port: Option<u16>,

    /// RPC user.
    #[serde(default)]
    pub user: String,

    /// RPC password.
    #[serde(default)]
    pub password: String,

    /// Passphrase unlocking the local PastelID.
    #[serde(default)]
    pub pastelid_passphrase: String,
}

/// Liveness and performance filtering of the supernode list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Maximum acceptable ping latency in milliseconds.
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,

    /// Minimum acceptable `performance_ratio_score`.
    #[serde(default = "default_min_performance_ratio")]
    pub min_performance_ratio: f64,

    /// Cap on the number of filtered supernodes.
    #[serde(default = "default_max_supernodes")]
    pub max_supernodes: usize,

    /// Wall-clock budget for one whole filter pass.
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,

    /// How long a filtered list stays valid.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Deadline for the reachability re-check before a peer is used.
    #[serde(default = "default_reachability_timeout_ms")]
    pub reachability_timeout_ms: u64,

    /// Cap on simultaneous outbound HTTP requests.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Hosts never considered.
    #[serde(default)]
    pub excluded_addresses: Vec<String>,
}

/// Purchase negotiation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Per-request deadline for protocol calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How many closest supernodes are asked for purchase status.
    #[serde(default = "default_status_check_peers")]
    pub status_check_peers: usize,

    /// Allowed clock skew on supernode messages.
    #[serde(default = "default_timestamp_tolerance_secs")]
    pub timestamp_tolerance_secs: u64,

    /// Allowed block height drift on supernode messages.
    #[serde(default = "default_block_height_tolerance")]
    pub block_height_tolerance: u64,

    /// Relative deviation allowed between quoted and estimated price.
    #[serde(default = "default_price_deviation_tolerance")]
    pub price_deviation_tolerance: f64,

    /// Per-credit ceiling used when the caller supplies none.
    #[serde(default = "default_max_per_credit_psl")]
    pub default_max_per_credit_psl: f64,

    /// Burn address override. Defaults to the network's burn address.
    #[serde(default)]
    pub burn_address: Option<String>,
}

/// Fair-market price estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Target USD value of one credit.
    #[serde(default = "default_target_value_per_credit_usd")]
    pub target_value_per_credit_usd: f64,

    /// Supernode profit margin assumed by the estimate.
    #[serde(default = "default_target_profit_margin")]
    pub target_profit_margin: f64,

    /// PSL/USD price endpoint.
    #[serde(default = "default_price_api_url")]
    pub price_api_url: String,
}

/// Retry schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay before the second attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor between delays.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            network: NetworkKind::default(),
            pastelid: None,
            opennode_api_url: default_opennode_api_url(),
            supernode_api_port: default_supernode_api_port(),
            log_level: default_log_level(),
            rpc: RpcConfig::default(),
            directory: DirectoryConfig::default(),
            negotiation: NegotiationConfig::default(),
            pricing: PricingConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: default_rpc_host(),
            port: None,
            user: String::new(),
            password: String::new(),
            pastelid_passphrase: String::new(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_latency_ms: default_max_latency_ms(),
            min_performance_ratio: default_min_performance_ratio(),
            max_supernodes: default_max_supernodes(),
            total_timeout_ms: default_total_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            reachability_timeout_ms: default_reachability_timeout_ms(),
            max_concurrent_requests: default_max_concurrent_requests(),
            excluded_addresses: Vec::new(),
        }
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            status_check_peers: default_status_check_peers(),
            timestamp_tolerance_secs: default_timestamp_tolerance_secs(),
            block_height_tolerance: default_block_height_tolerance(),
            price_deviation_tolerance: default_price_deviation_tolerance(),
            default_max_per_credit_psl: default_max_per_credit_psl(),
            burn_address: None,
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            target_value_per_credit_usd: default_target_value_per_credit_usd(),
            target_profit_margin: default_target_profit_margin(),
            price_api_url: default_price_api_url(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl DirectoryConfig {
    /// Ping latency ceiling.
    #[must_use]
    pub fn max_latency(&self) -> Duration {
        Duration::from_millis(self.max_latency_ms)
    }

    /// Whole-pass deadline.
    #[must_use]
    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    /// Filtered-list lifetime.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Reachability re-check deadline.
    #[must_use]
    pub fn reachability_timeout(&self) -> Duration {
        Duration::from_millis(self.reachability_timeout_ms)
    }
}

impl NegotiationConfig {
    /// Per-request deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Allowed clock skew.
    #[must_use]
    pub fn timestamp_tolerance(&self) -> Duration {
        Duration::from_secs(self.timestamp_tolerance_secs)
    }
}

impl ClientConfig {
    /// Create a testnet configuration preset.
    #[must_use]
    pub fn testnet() -> Self {
        Self {
            network: NetworkKind::Testnet,
            opennode_api_url: "https://testnet.pastel.network".to_string(),
            ..Self::default()
        }
    }

    /// Create a devnet configuration preset with a single-attempt retry policy.
    #[must_use]
    pub fn devnet() -> Self {
        Self {
            network: NetworkKind::Devnet,
            opennode_api_url: "http://127.0.0.1:8000".to_string(),
            retry: RetryConfig {
                max_attempts: 1,
                ..RetryConfig::default()
            },
            ..Self::default()
        }
    }

    /// Burn address payments go to.
    #[must_use]
    pub fn burn_address(&self) -> String {
        self.negotiation
            .burn_address
            .clone()
            .unwrap_or_else(|| self.network.burn_address().to_string())
    }

    /// pasteld RPC endpoint URL.
    #[must_use]
    pub fn rpc_url(&self) -> String {
        let port = self.rpc.port.unwrap_or_else(|| self.network.rpc_port());
        format!("http://{}:{}", self.rpc.host, port)
    }

    /// Directory holding persisted protocol artifacts.
    #[must_use]
    pub fn artifact_dir(&self) -> PathBuf {
        self.root_dir.join("artifacts")
    }

    /// Reject settings that cannot produce a working client.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] naming the first offending setting.
    pub fn validate(&self) -> crate::Result<()> {
        let fail = |msg: &str| Err(crate::Error::Config(msg.to_string()));
        if self.directory.max_supernodes == 0 {
            return fail("directory.max_supernodes must be positive");
        }
        if self.directory.max_concurrent_requests == 0 {
            return fail("directory.max_concurrent_requests must be positive");
        }
        if !(0.0..=1.0).contains(&self.directory.min_performance_ratio) {
            return fail("directory.min_performance_ratio must be within 0..=1");
        }
        if self.negotiation.status_check_peers == 0 {
            return fail("negotiation.status_check_peers must be positive");
        }
        if self.negotiation.price_deviation_tolerance < 0.0 {
            return fail("negotiation.price_deviation_tolerance must not be negative");
        }
        if !(0.0..1.0).contains(&self.pricing.target_profit_margin) {
            return fail("pricing.target_profit_margin must be within 0..1");
        }
        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be positive");
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn default_root_dir() -> PathBuf {
    directories::ProjectDirs::from("network", "pastel", "pastel-credit").map_or_else(
        || PathBuf::from(".pastel-credit"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn default_opennode_api_url() -> String {
    "https://opennode-fastapi.pastel.network".to_string()
}

const fn default_supernode_api_port() -> u16 {
    7123
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rpc_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_max_latency_ms() -> u64 {
    700
}

const fn default_min_performance_ratio() -> f64 {
    0.75
}

const fn default_max_supernodes() -> usize {
    130
}

const fn default_total_timeout_ms() -> u64 {
    1100
}

const fn default_cache_ttl_secs() -> u64 {
    60
}

const fn default_reachability_timeout_ms() -> u64 {
    800
}

const fn default_max_concurrent_requests() -> usize {
    32
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_status_check_peers() -> usize {
    3
}

const fn default_timestamp_tolerance_secs() -> u64 {
    60
}

const fn default_block_height_tolerance() -> u64 {
    10
}

const fn default_price_deviation_tolerance() -> f64 {
    0.1
}

const fn default_max_per_credit_psl() -> f64 {
    0.1
}

const fn default_target_value_per_credit_usd() -> f64 {
    0.01
}

const fn default_target_profit_margin() -> f64 {
    0.1
}

fn default_price_api_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price?ids=pastel&vs_currencies=usd".to_string()
}

const fn default_max_attempts() -> usize {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}
