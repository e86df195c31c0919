use serde::{Deserialize, Serialize};

/// A playable link together with the portal, channel and MAC that produced it
///
/// For fallback resolutions the ids name the sibling that actually resolved,
/// not the channel the client asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStream {
    pub portal_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub mac: String,
    pub link: String,
    pub proxy: Option<String>,
    /// Argument vector for the relay process; absent in redirect mode
    pub relay_command: Option<Vec<String>>,
}
