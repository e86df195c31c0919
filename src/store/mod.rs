//! Configuration layer adapter
//!
//! Portals, their cached channel lists and fallback groups are owned by the
//! configuration layer. The relay reads them through [`PortalStore`] and only
//! writes back MAC order, expiry and auth context via [`PortalStore::persist`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::{Channel, FallbackGroup, Portal};

pub mod json_store;

pub use json_store::{ChannelList, JsonPortalStore, StoreDocument};

#[async_trait]
pub trait PortalStore: Send + Sync {
    async fn portal(&self, portal_id: &str) -> AppResult<Option<Portal>>;

    async fn portals(&self) -> AppResult<Vec<Portal>>;

    async fn channel(&self, portal_id: &str, channel_id: &str) -> AppResult<Option<Channel>>;

    async fn channels(&self, portal_id: &str) -> AppResult<Vec<Channel>>;

    /// The group holding `(portal_id, channel_id)`, if any
    async fn fallback_group(&self, portal_id: &str, channel_id: &str) -> AppResult<Option<FallbackGroup>>;

    /// Write back a portal whose MAC order, expiry or auth context changed
    async fn persist(&self, portal: &Portal) -> AppResult<()>;

    async fn save_channels(
        &self,
        portal_id: &str,
        channels: Vec<Channel>,
        genres: HashMap<String, String>,
    ) -> AppResult<()>;

    async fn upsert_portal(&self, portal: Portal) -> AppResult<()>;
}
