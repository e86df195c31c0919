use serde::{Deserialize, Serialize};

/// Marker fragments in a channel command meaning the real URL must be requested with `create_link`
const CREATE_LINK_MARKERS: [&str; 2] = ["http://localhost/", "http:///ch/"];

/// A live channel as listed by a portal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub genre_id: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    /// Opaque command the playable link is derived from
    pub cmd: String,
}

impl Channel {
    /// Whether the link has to be created through a portal round trip
    pub fn requires_create_link(&self) -> bool {
        CREATE_LINK_MARKERS
            .iter()
            .any(|marker| self.cmd.contains(marker))
    }

    /// URL embedded directly in the command (`ffmpeg http://...` style)
    pub fn embedded_link(&self) -> Option<String> {
        self.cmd
            .split(' ')
            .nth(1)
            .filter(|link| !link.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpgEntry {
    pub channel_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_timestamp: i64,
    pub stop_timestamp: i64,
}

/// A named set of interchangeable channels, possibly spread over several portals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackGroup {
    pub name: String,
    pub members: Vec<GroupMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupMember {
    pub portal_id: String,
    pub channel_id: String,
}

impl GroupMember {
    pub fn new(portal_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            portal_id: portal_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

impl FallbackGroup {
    pub fn contains(&self, portal_id: &str, channel_id: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.portal_id == portal_id && m.channel_id == channel_id)
    }
}
