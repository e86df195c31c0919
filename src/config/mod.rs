use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

/// Environment variable prefix for configuration overrides (`STB_RELAY_RELAY__TRY_ALL_MACS=true`)
pub const ENV_PREFIX: &str = "STB_RELAY_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub portal_client: PortalClientConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// How a resolved link is handed to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StreamMethod {
    /// Spawn the relay command and pipe its output
    Relay,
    /// Answer with a 302 to the resolved URL
    Redirect,
}

/// Settings consumed by the resolver and the stream relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default = "default_stream_method")]
    pub stream_method: StreamMethod,
    /// Template with `<url>`, `<proxy>` and `<timeout>` placeholders
    #[serde(default = "default_relay_command")]
    pub relay_command: String,
    /// Template used for `?web=true` previews
    #[serde(default = "default_preview_command")]
    pub preview_command: String,
    #[serde(default = "default_ffprobe_command")]
    pub ffprobe_command: String,
    #[serde(default = "default_probe_timeout", with = "duration_serde::duration")]
    pub probe_timeout: Duration,
    /// Probe every link before serving it
    #[serde(default = "default_test_streams")]
    pub test_streams: bool,
    /// Keep rotating through MACs after the first one fails
    #[serde(default = "default_try_all_macs")]
    pub try_all_macs: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_link_ttl", with = "duration_serde::duration")]
    pub link_ttl: Duration,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_cooldown", with = "duration_serde::duration")]
    pub cooldown: Duration,
    /// How often expired cache and cooldown entries are swept
    #[serde(default = "default_housekeeping_interval", with = "duration_serde::duration")]
    pub cleanup_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalClientConfig {
    #[serde(default = "default_portal_request_timeout", with = "duration_serde::duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_portal_connect_timeout", with = "duration_serde::duration")]
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON document holding portals, channel lists and fallback groups
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_stream_method() -> StreamMethod {
    StreamMethod::Relay
}

fn default_relay_command() -> String {
    DEFAULT_RELAY_COMMAND.to_string()
}

fn default_preview_command() -> String {
    DEFAULT_PREVIEW_COMMAND.to_string()
}

fn default_ffprobe_command() -> String {
    DEFAULT_FFPROBE_COMMAND.to_string()
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS)
}

fn default_test_streams() -> bool {
    DEFAULT_TEST_STREAMS
}

fn default_try_all_macs() -> bool {
    DEFAULT_TRY_ALL_MACS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_link_ttl() -> Duration {
    Duration::from_secs(DEFAULT_LINK_TTL_SECS)
}

fn default_cache_max_entries() -> usize {
    DEFAULT_CACHE_MAX_ENTRIES
}

fn default_cooldown() -> Duration {
    Duration::from_secs(DEFAULT_COOLDOWN_SECS)
}

fn default_housekeeping_interval() -> Duration {
    Duration::from_secs(DEFAULT_HOUSEKEEPING_INTERVAL_SECS)
}

fn default_portal_request_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PORTAL_REQUEST_TIMEOUT_SECS)
}

fn default_portal_connect_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PORTAL_CONNECT_TIMEOUT_SECS)
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            stream_method: default_stream_method(),
            relay_command: default_relay_command(),
            preview_command: default_preview_command(),
            ffprobe_command: default_ffprobe_command(),
            probe_timeout: default_probe_timeout(),
            test_streams: default_test_streams(),
            try_all_macs: default_try_all_macs(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            link_ttl: default_link_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown(),
            cleanup_interval: default_housekeeping_interval(),
        }
    }
}

impl Default for PortalClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_portal_request_timeout(),
            connect_timeout: default_portal_connect_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, layering `STB_RELAY_*` environment overrides on top.
    ///
    /// A missing file is created with the default configuration.
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if !std::path::Path::new(config_file).exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
        }

        let config = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }
}
