/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8001;

// Relay defaults
pub const DEFAULT_RELAY_COMMAND: &str =
    "ffmpeg -re -http_proxy <proxy> -timeout <timeout> -i <url> -map 0 -codec copy -f mpegts pipe:";
pub const DEFAULT_PREVIEW_COMMAND: &str = "ffmpeg -loglevel panic -hide_banner -http_proxy <proxy> -i <url> -vcodec copy -f mp4 -movflags frag_keyframe+empty_moov pipe:";
pub const DEFAULT_FFPROBE_COMMAND: &str = "ffprobe";
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_TEST_STREAMS: bool = true;
pub const DEFAULT_TRY_ALL_MACS: bool = false;
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

// Link cache defaults
pub const DEFAULT_LINK_TTL_SECS: u64 = 8;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 256;

// Cooldown defaults
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;
pub const DEFAULT_HOUSEKEEPING_INTERVAL_SECS: u64 = 60;

// Portal client defaults
pub const DEFAULT_PORTAL_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PORTAL_CONNECT_TIMEOUT_SECS: u64 = 5;

// Store defaults
pub const DEFAULT_STORE_PATH: &str = "./data/portals.json";
