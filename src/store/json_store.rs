//! File-backed [`PortalStore`] holding everything in one JSON document

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::PortalStore;
use crate::errors::{AppError, AppResult};
use crate::models::{Channel, FallbackGroup, Portal};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub portals: BTreeMap<String, Portal>,
    /// Channel lists keyed by portal id
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelList>,
    #[serde(default)]
    pub groups: Vec<FallbackGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelList {
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub genres: HashMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

pub struct JsonPortalStore {
    path: Option<PathBuf>,
    document: RwLock<StoreDocument>,
}

impl JsonPortalStore {
    /// Load the document at `path`, starting empty when the file does not exist yet
    pub async fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let document = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => StoreDocument::default(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                AppError::configuration(format!("invalid portal store {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Portal store {} not found, starting empty", path.display());
                StoreDocument::default()
            }
            Err(e) => return Err(e.into()),
        };
        debug!(
            "Loaded {} portals and {} channel groups from {}",
            document.portals.len(),
            document.groups.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path),
            document: RwLock::new(document),
        })
    }

    /// A store that never touches disk
    pub fn in_memory(document: StoreDocument) -> Self {
        Self {
            path: None,
            document: RwLock::new(document),
        }
    }

    pub async fn snapshot(&self) -> StoreDocument {
        self.document.read().await.clone()
    }

    async fn flush(&self, document: &StoreDocument) -> AppResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(document)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl PortalStore for JsonPortalStore {
    async fn portal(&self, portal_id: &str) -> AppResult<Option<Portal>> {
        Ok(self.document.read().await.portals.get(portal_id).cloned())
    }

    async fn portals(&self) -> AppResult<Vec<Portal>> {
        Ok(self.document.read().await.portals.values().cloned().collect())
    }

    async fn channel(&self, portal_id: &str, channel_id: &str) -> AppResult<Option<Channel>> {
        Ok(self
            .document
            .read()
            .await
            .channels
            .get(portal_id)
            .and_then(|list| list.channels.iter().find(|c| c.id == channel_id))
            .cloned())
    }

    async fn channels(&self, portal_id: &str) -> AppResult<Vec<Channel>> {
        Ok(self
            .document
            .read()
            .await
            .channels
            .get(portal_id)
            .map(|list| list.channels.clone())
            .unwrap_or_default())
    }

    async fn fallback_group(&self, portal_id: &str, channel_id: &str) -> AppResult<Option<FallbackGroup>> {
        Ok(self
            .document
            .read()
            .await
            .groups
            .iter()
            .find(|group| group.contains(portal_id, channel_id))
            .cloned())
    }

    async fn persist(&self, portal: &Portal) -> AppResult<()> {
        let mut document = self.document.write().await;
        match document.portals.get_mut(&portal.id) {
            Some(stored) => *stored = portal.clone(),
            None => {
                warn!("Persist requested for unknown portal {}", portal.id);
                return Err(AppError::not_found("portal", &portal.id));
            }
        }
        self.flush(&document).await
    }

    async fn save_channels(
        &self,
        portal_id: &str,
        channels: Vec<Channel>,
        genres: HashMap<String, String>,
    ) -> AppResult<()> {
        let mut document = self.document.write().await;
        info!("Saving {} channels for portal {}", channels.len(), portal_id);
        document.channels.insert(
            portal_id.to_string(),
            ChannelList {
                channels,
                genres,
                updated_at: Utc::now(),
            },
        );
        self.flush(&document).await
    }

    async fn upsert_portal(&self, portal: Portal) -> AppResult<()> {
        let mut document = self.document.write().await;
        document.portals.insert(portal.id.clone(), portal);
        self.flush(&document).await
    }
}
