//! Set-top-box identity presented to portals

use sha2::{Digest, Sha256};

use crate::models::MacAuthContext;

/// Legacy MAG200 user agent every portal expects
pub const STB_USER_AGENT: &str = "Mozilla/5.0 (QtEmbedded; U; Linux; C) AppleWebKit/533.3 (KHTML, like Gecko) MAG200 stbapp ver: 2 rev: 250 Safari/533.3";

pub const X_USER_AGENT: &str = "Model: MAG250; Link: WiFi";

pub const STB_SERIAL: &str = "8F5EA4662E9AD";

/// `Cookie` header value identifying the device
pub fn cookie_header(mac: &str) -> String {
    format!("mac={mac}; stb_lang=en; timezone=Europe/Paris")
}

/// Uppercase hex SHA-256 of the MAC
pub fn device_id(mac: &str) -> String {
    hex::encode_upper(Sha256::digest(mac.as_bytes()))
}

/// Uppercase hex SHA-256 of `mac + token + timestamp`
pub fn signature(mac: &str, token: &str, timestamp: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(mac.as_bytes());
    hasher.update(token.as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    hex::encode_upper(hasher.finalize())
}

impl MacAuthContext {
    /// Identity derived from a freshly issued token
    pub fn fresh(mac: &str, token: &str, timestamp: i64) -> Self {
        let device_id = device_id(mac);
        Self {
            device_id2: device_id.clone(),
            device_id,
            signature: signature(mac, token, timestamp),
            timestamp,
        }
    }
}
