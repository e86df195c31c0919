//! Shared fakes for resolver, admin and router tests
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stalker_relay::config::{RelaySettings, StreamMethod};
use stalker_relay::errors::{PortalError, PortalResult};
use stalker_relay::models::{
    AccountProfile, Channel, FallbackGroup, Genre, GroupMember, MacAuthContext, MacEntry, Portal,
};
use stalker_relay::portal::{PortalApi, PortalSession};
use stalker_relay::services::{
    Alert, AlertKind, AlertSink, FallbackResolver, LinkCache, LinkProbe, MacPoolManager, RateLimiter,
};
use stalker_relay::store::{ChannelList, JsonPortalStore, PortalStore, StoreDocument};

pub const MAC_A: &str = "00:1A:79:00:00:0A";
pub const MAC_B: &str = "00:1A:79:00:00:0B";
pub const MAC_C: &str = "00:1A:79:00:00:0C";

/// How the fake portal treats one MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacBehavior {
    #[default]
    Works,
    HandshakeFails,
    NoLink,
    NoExpiry,
}

/// Scripted in-process portal; every call is recorded as `"<op>:<portal host>:<mac>"`
#[derive(Default)]
pub struct FakePortal {
    behaviors: Mutex<HashMap<String, MacBehavior>>,
    calls: Mutex<Vec<String>>,
    channels: Mutex<Vec<Channel>>,
    profiles: Mutex<Vec<(String, MacAuthContext)>>,
}

impl FakePortal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, mac: &str, behavior: MacBehavior) {
        self.behaviors.lock().unwrap().insert(mac.to_string(), behavior);
    }

    pub fn set_channels(&self, channels: Vec<Channel>) {
        *self.channels.lock().unwrap() = channels;
    }

    /// `(token, identity)` pairs sent with each profile request
    pub fn profile_requests(&self) -> Vec<(String, MacAuthContext)> {
        self.profiles.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&format!("{op}:")))
            .collect()
    }

    fn behavior(&self, mac: &str) -> MacBehavior {
        self.behaviors.lock().unwrap().get(mac).copied().unwrap_or_default()
    }

    fn record(&self, op: &str, url: &str, mac: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{op}:{}:{mac}", host(url)));
    }
}

fn host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Link handed out by the fake for a MAC on a portal
pub fn link_for(portal_id: &str, mac: &str) -> String {
    format!("http://media.{portal_id}.test/{}/live.ts", mac.replace(':', ""))
}

#[async_trait]
impl PortalApi for FakePortal {
    async fn discover_url(&self, url: &str, _proxy: Option<&str>) -> String {
        format!("{}/stalker_portal/server/load.php", url.trim_end_matches('/'))
    }

    async fn handshake(&self, url: &str, mac: &str, _proxy: Option<&str>) -> PortalResult<String> {
        self.record("handshake", url, mac);
        match self.behavior(mac) {
            MacBehavior::HandshakeFails => Err(PortalError::auth_failed(mac, "handshake rejected")),
            _ => Ok(format!("token-{mac}")),
        }
    }

    async fn get_profile(
        &self,
        session: &mut PortalSession,
        auth: &mut MacAuthContext,
    ) -> PortalResult<AccountProfile> {
        self.record("profile", &session.url, &session.mac);
        self.profiles
            .lock()
            .unwrap()
            .push((session.token.clone(), auth.clone()));
        Ok(AccountProfile {
            id: Some("1".to_string()),
            expire_billing_date: None,
            block_msg: None,
        })
    }

    async fn get_account_expiry(&self, session: &mut PortalSession) -> PortalResult<Option<String>> {
        self.record("expiry", &session.url, &session.mac);
        match self.behavior(&session.mac) {
            MacBehavior::NoExpiry => Ok(None),
            _ => Ok(Some("January 1, 2027, 12:00 am".to_string())),
        }
    }

    async fn list_channels(&self, session: &mut PortalSession) -> PortalResult<Vec<Channel>> {
        self.record("channels", &session.url, &session.mac);
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn list_genres(&self, session: &mut PortalSession) -> PortalResult<Vec<Genre>> {
        self.record("genres", &session.url, &session.mac);
        Ok(vec![Genre {
            id: "1".to_string(),
            title: "News".to_string(),
        }])
    }

    async fn resolve_channel_link(&self, session: &mut PortalSession, cmd: &str) -> PortalResult<String> {
        self.record("create_link", &session.url, &session.mac);
        match self.behavior(&session.mac) {
            MacBehavior::NoLink => Err(PortalError::no_link(cmd, "empty cmd")),
            _ => Ok(link_for(&host(&session.url).replace(".test", ""), &session.mac)),
        }
    }
}

/// Probe that rejects a configurable set of links
#[derive(Default)]
pub struct FakeProbe {
    rejected: Mutex<HashSet<String>>,
    probed: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject(&self, link: &str) {
        self.rejected.lock().unwrap().insert(link.to_string());
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkProbe for FakeProbe {
    async fn test_link(&self, link: &str, _proxy: Option<&str>) -> bool {
        self.probed.lock().unwrap().push(link.to_string());
        !self.rejected.lock().unwrap().contains(link)
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn kinds(&self) -> Vec<AlertKind> {
        self.alerts.lock().unwrap().iter().map(|a| a.kind).collect()
    }
}

impl AlertSink for RecordingAlerts {
    fn report(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

pub fn portal(id: &str, macs: &[&str]) -> Portal {
    Portal {
        id: id.to_string(),
        name: format!("Portal {id}"),
        url: format!("http://{id}.test/stalker_portal/server/load.php"),
        proxy: None,
        macs: macs.iter().map(|m| MacEntry::new(*m)).collect(),
        streams_per_mac: 1,
        enabled: true,
        custom_channel_names: HashMap::new(),
    }
}

/// A channel whose link has to be created through the portal
pub fn channel(id: &str) -> Channel {
    Channel {
        id: id.to_string(),
        name: format!("Channel {id}"),
        number: None,
        genre_id: Some("1".to_string()),
        logo: None,
        cmd: format!("ffrt http://localhost/ch/{id}_"),
    }
}

pub fn settings() -> RelaySettings {
    RelaySettings {
        stream_method: StreamMethod::Relay,
        relay_command: "relay -i <url>".to_string(),
        preview_command: "preview -i <url>".to_string(),
        test_streams: true,
        try_all_macs: true,
        ..RelaySettings::default()
    }
}

/// Builds a store document portal by portal
#[derive(Default)]
pub struct DocumentBuilder {
    document: StoreDocument,
}

impl DocumentBuilder {
    pub fn portal(mut self, portal: Portal, channels: &[&str]) -> Self {
        self.document.channels.insert(
            portal.id.clone(),
            ChannelList {
                channels: channels.iter().map(|c| channel(c)).collect(),
                genres: HashMap::new(),
                updated_at: chrono::Utc::now(),
            },
        );
        self.document.portals.insert(portal.id.clone(), portal);
        self
    }

    pub fn group(mut self, name: &str, members: &[(&str, &str)]) -> Self {
        self.document.groups.push(FallbackGroup {
            name: name.to_string(),
            members: members.iter().map(|(p, c)| GroupMember::new(*p, *c)).collect(),
        });
        self
    }

    pub fn build(self) -> StoreDocument {
        self.document
    }
}

pub struct Harness {
    pub store: Arc<JsonPortalStore>,
    pub api: Arc<FakePortal>,
    pub probe: Arc<FakeProbe>,
    pub alerts: Arc<RecordingAlerts>,
    pub pool: Arc<MacPoolManager>,
    pub cache: Arc<LinkCache>,
    pub limiter: Arc<RateLimiter>,
    pub resolver: Arc<FallbackResolver>,
}

impl Harness {
    pub fn new(document: StoreDocument, settings: RelaySettings) -> Self {
        let store = Arc::new(JsonPortalStore::in_memory(document));
        let api = FakePortal::new();
        let probe = FakeProbe::new();
        let alerts = Arc::new(RecordingAlerts::default());
        let pool = Arc::new(MacPoolManager::new(store.clone()));
        let cache = Arc::new(LinkCache::new(256, Duration::from_secs(8)));
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(30)));
        let resolver = Arc::new(FallbackResolver::new(
            store.clone(),
            api.clone(),
            pool.clone(),
            cache.clone(),
            limiter.clone(),
            probe.clone(),
            alerts.clone(),
            settings,
        ));
        Self {
            store,
            api,
            probe,
            alerts,
            pool,
            cache,
            limiter,
            resolver,
        }
    }

    pub async fn mac_order(&self, portal_id: &str) -> Vec<String> {
        self.store
            .portal(portal_id)
            .await
            .unwrap()
            .unwrap()
            .macs
            .into_iter()
            .map(|m| m.mac)
            .collect()
    }

    pub async fn portals(&self) -> BTreeMap<String, Portal> {
        self.store.snapshot().await.portals
    }
}
