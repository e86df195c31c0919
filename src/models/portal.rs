use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An upstream middleware portal and the MACs authorized against it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub id: String,
    pub name: String,
    /// Resolved API endpoint (usually ending in `load.php`)
    pub url: String,
    #[serde(default)]
    pub proxy: Option<String>,
    /// Rotation order: the head is tried first, failed MACs move to the tail
    #[serde(default)]
    pub macs: Vec<MacEntry>,
    /// Concurrent sessions allowed per MAC, 0 = unlimited
    #[serde(default = "default_streams_per_mac")]
    pub streams_per_mac: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub custom_channel_names: HashMap<String, String>,
}

fn default_streams_per_mac() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacEntry {
    pub mac: String,
    /// Expiry text as reported by the portal
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub auth: Option<MacAuthContext>,
}

/// Device identity sent with `get_profile`, saved per MAC after a fresh handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacAuthContext {
    pub device_id: String,
    pub device_id2: String,
    pub signature: String,
    pub timestamp: i64,
}

/// The subset of the `get_profile` payload the relay cares about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub id: Option<String>,
    pub expire_billing_date: Option<String>,
    pub block_msg: Option<String>,
}

/// Request body for registering a new portal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalDraft {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub proxy: Option<String>,
    pub macs: Vec<String>,
    #[serde(default = "default_streams_per_mac")]
    pub streams_per_mac: u32,
}

impl MacEntry {
    pub fn new(mac: impl Into<String>) -> Self {
        Self {
            mac: mac.into(),
            expiry: None,
            auth: None,
        }
    }
}

impl Portal {
    pub fn mac(&self, mac: &str) -> Option<&MacEntry> {
        self.macs.iter().find(|entry| entry.mac == mac)
    }

    pub fn mac_mut(&mut self, mac: &str) -> Option<&mut MacEntry> {
        self.macs.iter_mut().find(|entry| entry.mac == mac)
    }

    /// Move `mac` to the tail of the rotation, keeping the relative order of the others.
    ///
    /// Returns false when the MAC is not part of this portal.
    pub fn demote_mac(&mut self, mac: &str) -> bool {
        match self.macs.iter().position(|entry| entry.mac == mac) {
            Some(index) => {
                let entry = self.macs.remove(index);
                self.macs.push(entry);
                true
            }
            None => false,
        }
    }

    /// Display name for a channel, honoring per-portal overrides
    pub fn channel_name(&self, channel_id: &str, provider_name: &str) -> String {
        self.custom_channel_names
            .get(channel_id)
            .cloned()
            .unwrap_or_else(|| provider_name.to_string())
    }
}
