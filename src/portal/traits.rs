//! Protocol seam between the resolver and an upstream portal
//!
//! The resolver and the portal administration service only talk to portals
//! through [`PortalApi`], so scenario tests can script portal behavior
//! without a network.

use async_trait::async_trait;

use crate::errors::PortalResult;
use crate::models::{AccountProfile, Channel, Genre, MacAuthContext};

/// An authenticated conversation with one portal under one MAC
///
/// The token is replaced in place when a call hits an authorization failure and
/// the client re-handshakes, so callers keep using the same session value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSession {
    pub url: String,
    pub mac: String,
    pub proxy: Option<String>,
    pub token: String,
}

impl PortalSession {
    pub fn new(url: &str, mac: &str, proxy: Option<&str>, token: String) -> Self {
        Self {
            url: url.to_string(),
            mac: mac.to_string(),
            proxy: proxy.map(str::to_string),
            token,
        }
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }
}

/// Portal operations used on the relay path and by portal administration
///
/// Every authenticated call gets exactly one re-handshake-and-retry when the portal
/// reports an authorization failure; the handshake itself only walks its candidate
/// request variants.
#[async_trait]
pub trait PortalApi: Send + Sync {
    /// Resolve the API endpoint for a portal address
    async fn discover_url(&self, url: &str, proxy: Option<&str>) -> String;

    /// Obtain a session token for `mac`
    async fn handshake(&self, url: &str, mac: &str, proxy: Option<&str>) -> PortalResult<String>;

    /// Fetch the account profile. When the retry issues a new token, `auth` is
    /// recomputed for it and the caller should persist the new context.
    async fn get_profile(
        &self,
        session: &mut PortalSession,
        auth: &mut MacAuthContext,
    ) -> PortalResult<AccountProfile>;

    async fn get_account_expiry(&self, session: &mut PortalSession) -> PortalResult<Option<String>>;

    async fn list_channels(&self, session: &mut PortalSession) -> PortalResult<Vec<Channel>>;

    async fn list_genres(&self, session: &mut PortalSession) -> PortalResult<Vec<Genre>>;

    /// Exchange a channel command for a playable URL
    async fn resolve_channel_link(&self, session: &mut PortalSession, cmd: &str) -> PortalResult<String>;
}
