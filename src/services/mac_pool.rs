//! MAC Pool Manager
//!
//! Tracks, per portal, the rotation order of its MACs and the relay sessions
//! currently holding each MAC. A MAC is free while its session count is below the
//! portal's per-MAC limit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{MacAuthContext, MacEntry, OccupancyRecord};
use crate::store::PortalStore;

type OccupancyMap = HashMap<String, Vec<(Uuid, OccupancyRecord)>>;

pub struct MacPoolManager {
    store: Arc<dyn PortalStore>,
    occupancy: Arc<Mutex<OccupancyMap>>,
    /// Serializes read-modify-write of MAC order through the store
    rotation_lock: tokio::sync::Mutex<()>,
}

impl MacPoolManager {
    pub fn new(store: Arc<dyn PortalStore>) -> Self {
        Self {
            store,
            occupancy: Arc::new(Mutex::new(HashMap::new())),
            rotation_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// MACs of a portal in rotation order, head first
    pub async fn rotation(&self, portal_id: &str) -> AppResult<Vec<MacEntry>> {
        let portal = self
            .store
            .portal(portal_id)
            .await?
            .ok_or_else(|| AppError::not_found("portal", portal_id))?;
        Ok(portal.macs)
    }

    /// True when `limit` is 0 or fewer than `limit` sessions hold the MAC
    ///
    /// Advisory only. Nothing is reserved here; a slot is taken by [`Self::occupy`] once
    /// the relay starts, so two resolutions racing for the last slot may both see it free
    /// and the MAC briefly runs over its limit.
    pub fn is_free(&self, portal_id: &str, mac: &str, limit: u32) -> bool {
        limit == 0 || self.sessions(portal_id, mac) < limit as usize
    }

    pub fn sessions(&self, portal_id: &str, mac: &str) -> usize {
        self.lock()
            .get(portal_id)
            .map(|records| records.iter().filter(|(_, r)| r.mac == mac).count())
            .unwrap_or(0)
    }

    /// Demote `mac` to the tail of its portal's rotation and persist the new order
    pub async fn record_failure(&self, portal_id: &str, mac: &str) -> AppResult<()> {
        let _guard = self.rotation_lock.lock().await;
        let Some(mut portal) = self.store.portal(portal_id).await? else {
            return Err(AppError::not_found("portal", portal_id));
        };
        if portal.demote_mac(mac) {
            info!("Moving MAC({}) to the end of Portal({}) rotation", mac, portal_id);
            self.store.persist(&portal).await?;
        }
        Ok(())
    }

    /// Save the device identity computed after a fresh handshake
    pub async fn save_auth(&self, portal_id: &str, mac: &str, auth: MacAuthContext) -> AppResult<()> {
        let _guard = self.rotation_lock.lock().await;
        let Some(mut portal) = self.store.portal(portal_id).await? else {
            return Err(AppError::not_found("portal", portal_id));
        };
        match portal.mac_mut(mac) {
            Some(entry) if entry.auth.as_ref() != Some(&auth) => {
                entry.auth = Some(auth);
                debug!("Saved device identity for Portal({}):MAC({})", portal_id, mac);
                self.store.persist(&portal).await
            }
            _ => Ok(()),
        }
    }

    /// Register a relay session on a MAC; the slot is released when the guard drops
    pub fn occupy(
        &self,
        portal_id: &str,
        mac: &str,
        channel_id: &str,
        client: &str,
        channel_name: &str,
    ) -> OccupancyGuard {
        let id = Uuid::new_v4();
        let record = OccupancyRecord {
            portal_id: portal_id.to_string(),
            mac: mac.to_string(),
            channel_id: channel_id.to_string(),
            client: client.to_string(),
            channel_name: channel_name.to_string(),
            start_time: Utc::now(),
        };
        info!(
            "Occupied Portal({}):MAC({}) for {} ({})",
            portal_id, mac, client, channel_name
        );
        self.lock()
            .entry(portal_id.to_string())
            .or_default()
            .push((id, record));

        OccupancyGuard {
            occupancy: self.occupancy.clone(),
            portal_id: portal_id.to_string(),
            mac: mac.to_string(),
            id,
        }
    }

    /// Active sessions grouped by portal
    pub fn snapshot(&self) -> HashMap<String, Vec<OccupancyRecord>> {
        self.lock()
            .iter()
            .map(|(portal_id, records)| {
                (
                    portal_id.clone(),
                    records.iter().map(|(_, r)| r.clone()).collect(),
                )
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OccupancyMap> {
        self.occupancy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds one occupancy record; dropping it unoccupies the MAC exactly once
pub struct OccupancyGuard {
    occupancy: Arc<Mutex<OccupancyMap>>,
    portal_id: String,
    mac: String,
    id: Uuid,
}

impl OccupancyGuard {
    pub fn mac(&self) -> &str {
        &self.mac
    }
}

impl Drop for OccupancyGuard {
    fn drop(&mut self) {
        let mut occupancy = self
            .occupancy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(records) = occupancy.get_mut(&self.portal_id) {
            records.retain(|(id, _)| *id != self.id);
            if records.is_empty() {
                occupancy.remove(&self.portal_id);
            }
        }
        info!("Unoccupied Portal({}):MAC({})", self.portal_id, self.mac);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Portal;
    use crate::store::{JsonPortalStore, StoreDocument};

    fn pool(macs: &[&str]) -> (MacPoolManager, Arc<JsonPortalStore>) {
        let mut document = StoreDocument::default();
        document.portals.insert(
            "p1".to_string(),
            Portal {
                id: "p1".to_string(),
                name: "Portal".to_string(),
                url: "http://portal.example/load.php".to_string(),
                proxy: None,
                macs: macs.iter().map(|m| MacEntry::new(*m)).collect(),
                streams_per_mac: 1,
                enabled: true,
                custom_channel_names: HashMap::new(),
            },
        );
        let store = Arc::new(JsonPortalStore::in_memory(document));
        (MacPoolManager::new(store.clone()), store)
    }

    async fn order(pool: &MacPoolManager) -> Vec<String> {
        pool.rotation("p1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.mac)
            .collect()
    }

    #[tokio::test]
    async fn failure_moves_mac_to_tail_and_persists() {
        let (pool, store) = pool(&["A", "B", "C"]);
        pool.record_failure("p1", "A").await.unwrap();
        assert_eq!(order(&pool).await, vec!["B", "C", "A"]);

        let stored = store.portal("p1").await.unwrap().unwrap();
        assert_eq!(stored.macs[2].mac, "A");
    }

    #[tokio::test]
    async fn rotation_of_unknown_portal_is_not_found() {
        let (pool, _) = pool(&["A"]);
        assert!(matches!(
            pool.rotation("nope").await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn occupancy_is_released_on_drop() {
        let (pool, _) = pool(&["A", "B"]);
        assert!(pool.is_free("p1", "A", 1));

        let guard = pool.occupy("p1", "A", "10", "1.2.3.4", "News");
        assert!(!pool.is_free("p1", "A", 1));
        assert!(pool.is_free("p1", "A", 2));
        assert!(pool.is_free("p1", "A", 0));
        assert!(pool.is_free("p1", "B", 1));
        assert_eq!(pool.snapshot()["p1"][0].client, "1.2.3.4");

        drop(guard);
        assert!(pool.is_free("p1", "A", 1));
        assert!(pool.snapshot().is_empty());
    }

    #[tokio::test]
    async fn free_check_reserves_nothing_until_occupied() {
        let (pool, _) = pool(&["A"]);
        assert!(pool.is_free("p1", "A", 1));
        assert!(pool.is_free("p1", "A", 1));
        assert_eq!(pool.sessions("p1", "A"), 0);

        let first = pool.occupy("p1", "A", "10", "client-1", "News");
        let second = pool.occupy("p1", "A", "11", "client-2", "Sport");
        assert_eq!(pool.sessions("p1", "A"), 2);
        assert!(!pool.is_free("p1", "A", 1));
        drop((first, second));
    }

    #[tokio::test]
    async fn concurrent_sessions_on_one_mac_release_independently() {
        let (pool, _) = pool(&["A"]);
        let first = pool.occupy("p1", "A", "10", "client-1", "News");
        let second = pool.occupy("p1", "A", "10", "client-2", "News");
        assert_eq!(pool.sessions("p1", "A"), 2);

        drop(first);
        assert_eq!(pool.sessions("p1", "A"), 1);
        assert_eq!(pool.snapshot()["p1"][0].client, "client-2");
        drop(second);
        assert_eq!(pool.sessions("p1", "A"), 0);
    }

    #[tokio::test]
    async fn save_auth_persists_identity() {
        let (pool, store) = pool(&["A"]);
        let auth = MacAuthContext::fresh("A", "T", 1);
        pool.save_auth("p1", "A", auth.clone()).await.unwrap();
        let stored = store.portal("p1").await.unwrap().unwrap();
        assert_eq!(stored.macs[0].auth, Some(auth));
    }
}
