//! One-shot portal administration: register a portal, re-test its MACs and
//! refresh its channel list. Runs outside the relay path.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::{AppError, AppResult, PortalError, PortalResult};
use crate::models::{MacAuthContext, MacEntry, Portal, PortalDraft};
use crate::portal::{PortalApi, PortalSession};
use crate::store::PortalStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacStatus {
    /// Tested and reported an expiry
    Working,
    /// Tested and failed; removed from the portal
    Dead,
    /// Not re-tested; previous expiry kept
    Kept,
}

#[derive(Debug, Clone, Serialize)]
pub struct MacReport {
    pub mac: String,
    pub status: MacStatus,
    pub expiry: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalReport {
    pub portal_id: String,
    pub name: String,
    pub url: String,
    pub macs: Vec<MacReport>,
    /// Channels stored by this run, if the list could be fetched
    pub channels: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    /// Replacement MAC list; the current list when absent
    #[serde(default)]
    pub macs: Option<Vec<String>>,
    /// Re-test MACs that are already known, not only new ones
    #[serde(default)]
    pub retest: bool,
}

pub struct PortalAdmin {
    store: Arc<dyn PortalStore>,
    api: Arc<dyn PortalApi>,
}

struct TestedMac {
    entry: MacEntry,
    session: PortalSession,
}

impl PortalAdmin {
    pub fn new(store: Arc<dyn PortalStore>, api: Arc<dyn PortalApi>) -> Self {
        Self { store, api }
    }

    /// Discover the API URL, test every MAC and persist the portal with the working ones
    pub async fn add_portal(&self, draft: PortalDraft) -> AppResult<PortalReport> {
        if draft.name.trim().is_empty() {
            return Err(AppError::validation("portal name is required"));
        }
        let macs = normalize_macs(&draft.macs);
        if macs.is_empty() {
            return Err(AppError::validation("at least one MAC is required"));
        }

        let proxy = draft.proxy.as_deref().filter(|p| !p.is_empty());
        let url = self.api.discover_url(&draft.url, proxy).await;
        let mut portal = Portal {
            id: Uuid::new_v4().simple().to_string(),
            name: draft.name.trim().to_string(),
            url,
            proxy: proxy.map(str::to_string),
            macs: Vec::new(),
            streams_per_mac: draft.streams_per_mac,
            enabled: true,
            custom_channel_names: Default::default(),
        };

        let mut reports = Vec::new();
        let mut first_session = None;
        for mac in macs {
            match self.test_mac(&portal, &mac).await {
                Ok(tested) => {
                    info!("Successfully tested MAC({}) for Portal({})", mac, portal.name);
                    reports.push(working(&tested.entry));
                    portal.macs.push(tested.entry);
                    first_session.get_or_insert(tested.session);
                }
                Err(e) => {
                    error!("Error testing MAC({}) for Portal({}): {}", mac, portal.name, e);
                    reports.push(dead(&mac, e.to_string()));
                }
            }
        }

        let Some(mut session) = first_session else {
            return Err(AppError::validation(format!(
                "none of the MACs tested OK for portal {}",
                portal.name
            )));
        };

        let channels = self.store_channel_list(&portal.id, &mut session).await;
        self.store.upsert_portal(portal.clone()).await?;
        info!("Portal({}) added as {}", portal.name, portal.id);

        Ok(PortalReport {
            portal_id: portal.id,
            name: portal.name,
            url: portal.url,
            macs: reports,
            channels,
        })
    }

    /// Re-test new (or all, with `retest`) MACs, drop dead ones and refresh the channel list
    ///
    /// The MAC list is merged into the stored portal right before writing, so rotation
    /// order and identities saved by the relay path during the tests are kept.
    pub async fn refresh_portal(&self, portal_id: &str, request: RefreshRequest) -> AppResult<PortalReport> {
        let mut portal = self
            .store
            .portal(portal_id)
            .await?
            .ok_or_else(|| AppError::not_found("portal", portal_id))?;

        let wanted = match &request.macs {
            Some(macs) => normalize_macs(macs),
            None => portal.macs.iter().map(|m| m.mac.clone()).collect(),
        };

        let mut kept = Vec::new();
        let mut retested = HashSet::new();
        let mut reports = Vec::new();
        let mut sessions = Vec::new();
        for mac in wanted {
            let existing = portal.mac(&mac).cloned();
            if let (Some(entry), false) = (&existing, request.retest) {
                reports.push(MacReport {
                    mac: mac.clone(),
                    status: MacStatus::Kept,
                    expiry: entry.expiry.clone(),
                    message: None,
                });
                kept.push(entry.clone());
                continue;
            }
            match self.test_mac(&portal, &mac).await {
                Ok(tested) => {
                    info!("Successfully tested MAC({}) for Portal({})", mac, portal.name);
                    reports.push(working(&tested.entry));
                    retested.insert(mac.clone());
                    kept.push(tested.entry);
                    sessions.push(tested.session);
                }
                Err(e) => {
                    warn!("MAC({}) of Portal({}) failed its test: {}", mac, portal.name, e);
                    reports.push(dead(&mac, e.to_string()));
                }
            }
        }

        if kept.is_empty() {
            return Err(AppError::validation(format!(
                "none of the MACs tested OK for portal {}",
                portal.name
            )));
        }
        portal.macs = kept;

        let mut channels = None;
        for mut session in sessions {
            channels = self.store_channel_list(&portal.id, &mut session).await;
            if channels.is_some() {
                break;
            }
        }
        if channels.is_none() {
            channels = self.refresh_with_kept_macs(&portal).await;
        }

        let mut current = self
            .store
            .portal(portal_id)
            .await?
            .ok_or_else(|| AppError::not_found("portal", portal_id))?;
        current.macs = merge_macs(&current.macs, portal.macs, &retested);
        self.store.upsert_portal(current.clone()).await?;
        info!("Portal({}) refreshed", current.name);

        Ok(PortalReport {
            portal_id: current.id,
            name: current.name,
            url: current.url,
            macs: reports,
            channels,
        })
    }

    /// Handshake, fresh device identity, profile and expiry for one MAC
    async fn test_mac(&self, portal: &Portal, mac: &str) -> PortalResult<TestedMac> {
        let proxy = portal.proxy.as_deref();
        let token = self.api.handshake(&portal.url, mac, proxy).await?;
        let mut session = PortalSession::new(&portal.url, mac, proxy, token);
        let mut auth = MacAuthContext::fresh(mac, &session.token, Utc::now().timestamp());

        let profile = self.api.get_profile(&mut session, &mut auth).await?;
        let expiry = self
            .api
            .get_account_expiry(&mut session)
            .await?
            .or(profile.expire_billing_date);

        match expiry {
            Some(expiry) => Ok(TestedMac {
                entry: MacEntry {
                    mac: mac.to_string(),
                    expiry: Some(expiry),
                    auth: Some(auth),
                },
                session,
            }),
            None => Err(PortalError::auth_failed(mac, "portal reported no expiry")),
        }
    }

    async fn store_channel_list(&self, portal_id: &str, session: &mut PortalSession) -> Option<usize> {
        let channels = match self.api.list_channels(session).await {
            Ok(channels) if !channels.is_empty() => channels,
            Ok(_) => {
                warn!("Portal({}) returned an empty channel list", portal_id);
                return None;
            }
            Err(e) => {
                warn!("Could not fetch channels for Portal({}): {}", portal_id, e);
                return None;
            }
        };
        let genres = match self.api.list_genres(session).await {
            Ok(genres) => genres.into_iter().map(|g| (g.id, g.title)).collect(),
            Err(e) => {
                warn!("Could not fetch genres for Portal({}): {}", portal_id, e);
                Default::default()
            }
        };

        let count = channels.len();
        match self.store.save_channels(portal_id, channels, genres).await {
            Ok(()) => Some(count),
            Err(e) => {
                error!("Could not save channels for Portal({}): {}", portal_id, e);
                None
            }
        }
    }

    async fn refresh_with_kept_macs(&self, portal: &Portal) -> Option<usize> {
        for entry in &portal.macs {
            let proxy = portal.proxy.as_deref();
            let Ok(token) = self.api.handshake(&portal.url, &entry.mac, proxy).await else {
                continue;
            };
            let mut session = PortalSession::new(&portal.url, &entry.mac, proxy, token);
            if let Some(count) = self.store_channel_list(&portal.id, &mut session).await {
                return Some(count);
            }
        }
        None
    }
}

/// Trim, drop blanks and de-duplicate while keeping first-seen order
fn normalize_macs(macs: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    macs.iter()
        .map(|m| m.trim().to_uppercase())
        .filter(|m| !m.is_empty())
        .filter(|m| seen.insert(m.clone()))
        .collect()
}

/// Apply a refresh result to the MACs stored now.
///
/// Surviving MACs keep their stored rotation order. Re-tested MACs take the new
/// expiry and identity, untested ones keep the stored entry, and new MACs go last.
fn merge_macs(current: &[MacEntry], kept: Vec<MacEntry>, retested: &HashSet<String>) -> Vec<MacEntry> {
    let mut kept: Vec<Option<MacEntry>> = kept.into_iter().map(Some).collect();
    let mut take = |mac: &str| {
        kept.iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|e| e.mac == mac))
            .and_then(Option::take)
    };

    let mut merged = Vec::new();
    for stored in current {
        if let Some(refreshed) = take(&stored.mac) {
            if retested.contains(&stored.mac) {
                merged.push(refreshed);
            } else {
                merged.push(stored.clone());
            }
        }
    }
    merged.extend(kept.into_iter().flatten());
    merged
}

fn working(entry: &MacEntry) -> MacReport {
    MacReport {
        mac: entry.mac.clone(),
        status: MacStatus::Working,
        expiry: entry.expiry.clone(),
        message: None,
    }
}

fn dead(mac: &str, message: String) -> MacReport {
    MacReport {
        mac: mac.to_string(),
        status: MacStatus::Dead,
        expiry: None,
        message: Some(message),
    }
}
