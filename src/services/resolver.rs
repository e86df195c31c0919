//! Fallback Resolver
//!
//! Turns a play request for `(portal, channel)` into a playable stream:
//!
//! 1. Link cache lookup
//! 2. Cooldown check; a hot channel hands over to an eligible fallback sibling
//! 3. Walk the portal's free MACs: handshake, profile, link, optional probe
//! 4. Walk the channel's fallback group in stored order
//! 5. Give up with "no streams available"
//!
//! Web-preview requests skip the cooldown, the fallback group and rate bookkeeping.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{RelaySettings, StreamMethod};
use crate::errors::{AppError, AppResult, PortalError, RelayError};
use crate::models::{Channel, GroupMember, MacAuthContext, MacEntry, Portal, ResolvedStream};
use crate::portal::{PortalApi, PortalSession};
use crate::services::alerts::{Alert, AlertKind, AlertSink};
use crate::services::link_cache::{LinkCache, cache_key};
use crate::services::mac_pool::MacPoolManager;
use crate::services::rate_limiter::RateLimiter;
use crate::services::relay_command::build_command;
use crate::services::stream_prober::LinkProbe;
use crate::store::PortalStore;

/// Terminal outcome of a play request
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Streaming(ResolvedStream),
    NoStreamsAvailable,
    Cooldown { remaining_secs: u64 },
}

pub struct FallbackResolver {
    store: Arc<dyn PortalStore>,
    api: Arc<dyn PortalApi>,
    pool: Arc<MacPoolManager>,
    cache: Arc<LinkCache>,
    limiter: Arc<RateLimiter>,
    prober: Arc<dyn LinkProbe>,
    alerts: Arc<dyn AlertSink>,
    settings: RelaySettings,
}

impl FallbackResolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn PortalStore>,
        api: Arc<dyn PortalApi>,
        pool: Arc<MacPoolManager>,
        cache: Arc<LinkCache>,
        limiter: Arc<RateLimiter>,
        prober: Arc<dyn LinkProbe>,
        alerts: Arc<dyn AlertSink>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            store,
            api,
            pool,
            cache,
            limiter,
            prober,
            alerts,
            settings,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub async fn resolve(&self, portal_id: &str, channel_id: &str, web: bool) -> AppResult<Resolution> {
        let requested = GroupMember::new(portal_id, channel_id);
        let mut target = requested.clone();
        let mut visited: HashSet<GroupMember> = HashSet::new();
        let mut cooldown_remaining = None;

        loop {
            visited.insert(target.clone());

            if let Some(stream) = self.cache_hit(&target, web)? {
                if target != requested {
                    self.report_fallback(&requested, &target);
                }
                return Ok(Resolution::Streaming(stream));
            }

            if !web {
                let (allowed, remaining) = self.limiter.check_rate(&key(&target), None);
                if !allowed {
                    info!(
                        "Portal({}):Channel({}) is cooling down for {}s, looking for fallbacks",
                        target.portal_id, target.channel_id, remaining
                    );
                    cooldown_remaining.get_or_insert(remaining);
                    match self.eligible_siblings(&target, &visited).await?.into_iter().next() {
                        Some(sibling) => {
                            target = sibling;
                            continue;
                        }
                        None => {
                            return Ok(Resolution::Cooldown {
                                remaining_secs: cooldown_remaining.unwrap_or(remaining),
                            });
                        }
                    }
                }
            }

            if let Some(stream) = self.try_portal(&target, web).await? {
                if target != requested {
                    self.report_fallback(&requested, &target);
                }
                return Ok(Resolution::Streaming(stream));
            }
            break;
        }

        if !web {
            info!(
                "Portal({}):Channel({}) is not working, looking for fallbacks",
                target.portal_id, target.channel_id
            );
            for sibling in self.eligible_siblings(&target, &visited).await? {
                visited.insert(sibling.clone());
                if let Some(stream) = self.cache_hit(&sibling, false)? {
                    self.report_fallback(&requested, &sibling);
                    return Ok(Resolution::Streaming(stream));
                }
                if let Some(stream) = self.try_portal(&sibling, false).await? {
                    self.report_fallback(&requested, &sibling);
                    return Ok(Resolution::Streaming(stream));
                }
            }
        }

        self.alerts.report(Alert::new(
            AlertKind::NoStreamsAvailable,
            portal_id,
            channel_id,
            "no working MAC or fallback",
        ));
        Ok(Resolution::NoStreamsAvailable)
    }

    fn cache_hit(&self, target: &GroupMember, web: bool) -> AppResult<Option<ResolvedStream>> {
        let key = key(target);
        let Some(mut stream) = self.cache.get(&key) else {
            return Ok(None);
        };
        debug!("Link cache hit for {}", key);
        if web {
            stream.relay_command = Some(self.preview_command(&stream.link, stream.proxy.as_deref())?);
        } else {
            self.limiter.update_rate(&key);
        }
        Ok(Some(stream))
    }

    /// Members of the target's group that are not yet visited and not cooling down
    async fn eligible_siblings(
        &self,
        target: &GroupMember,
        visited: &HashSet<GroupMember>,
    ) -> AppResult<Vec<GroupMember>> {
        let Some(group) = self
            .store
            .fallback_group(&target.portal_id, &target.channel_id)
            .await?
        else {
            debug!("Portal({}):Channel({}) has no fallback group", target.portal_id, target.channel_id);
            return Ok(Vec::new());
        };

        Ok(group
            .members
            .into_iter()
            .filter(|member| !visited.contains(member))
            .filter(|member| {
                let (allowed, _) = self.limiter.check_rate(&key(member), None);
                if !allowed {
                    debug!(
                        "Skipping fallback Portal({}):Channel({}), cooling down",
                        member.portal_id, member.channel_id
                    );
                }
                allowed
            })
            .collect())
    }

    /// Step 3: walk the portal's MACs for one channel
    async fn try_portal(&self, target: &GroupMember, web: bool) -> AppResult<Option<ResolvedStream>> {
        let Some(portal) = self.store.portal(&target.portal_id).await? else {
            warn!("Portal({}) does not exist", target.portal_id);
            return Ok(None);
        };
        if !portal.enabled {
            debug!("Portal({}) is disabled", portal.id);
            return Ok(None);
        }
        let Some(channel) = self.store.channel(&portal.id, &target.channel_id).await? else {
            warn!("Channel({}) is not listed for Portal({})", target.channel_id, portal.id);
            return Ok(None);
        };
        let channel_name = portal.channel_name(&channel.id, &channel.name);

        let mut attempted = false;
        for entry in self.pool.rotation(&portal.id).await? {
            if !self.pool.is_free(&portal.id, &entry.mac, portal.streams_per_mac) {
                debug!("MAC({}) of Portal({}) is busy", entry.mac, portal.id);
                continue;
            }
            attempted = true;
            info!(
                "Trying Portal({}):MAC({}):Channel({})",
                portal.id, entry.mac, channel.id
            );

            match self.attempt_mac(&portal, &entry, &channel).await {
                Ok(link) => {
                    return self
                        .finish(&portal, &entry.mac, &channel, channel_name, link, web)
                        .map(Some);
                }
                Err(failure) => {
                    self.alerts.report(
                        Alert::new(alert_kind(&failure), &portal.id, &channel.id, failure.to_string())
                            .with_mac(&entry.mac),
                    );
                    if let Err(e) = self.pool.record_failure(&portal.id, &entry.mac).await {
                        warn!("Could not demote MAC({}) of Portal({}): {}", entry.mac, portal.id, e);
                    }
                }
            }

            if !self.settings.try_all_macs {
                break;
            }
        }

        if !attempted {
            let exhausted = RelayError::ResourceExhausted {
                portal_id: portal.id.clone(),
            };
            self.alerts.report(Alert::new(
                AlertKind::ResourceExhausted,
                &portal.id,
                &channel.id,
                exhausted.to_string(),
            ));
        }
        Ok(None)
    }

    /// Handshake, profile, link and probe for a single MAC
    async fn attempt_mac(&self, portal: &Portal, entry: &MacEntry, channel: &Channel) -> AppResult<String> {
        let proxy = portal.proxy.as_deref();
        let token = self.api.handshake(&portal.url, &entry.mac, proxy).await?;
        let mut session = PortalSession::new(&portal.url, &entry.mac, proxy, token);

        // The signature is bound to the token, so every handshake gets a fresh identity
        let mut auth = MacAuthContext::fresh(&entry.mac, &session.token, Utc::now().timestamp());
        self.api.get_profile(&mut session, &mut auth).await?;
        if entry.auth.as_ref() != Some(&auth) {
            if let Err(e) = self.pool.save_auth(&portal.id, &entry.mac, auth).await {
                warn!("Could not save device identity for MAC({}): {}", entry.mac, e);
            }
        }

        let link = if channel.requires_create_link() {
            self.api.resolve_channel_link(&mut session, &channel.cmd).await?
        } else {
            channel
                .embedded_link()
                .ok_or_else(|| PortalError::no_link(&channel.cmd, "command carries no URL"))?
        };

        if self.settings.test_streams && !self.prober.test_link(&link, proxy).await {
            return Err(RelayError::probe(format!("{link} did not yield a video stream")).into());
        }
        Ok(link)
    }

    fn finish(
        &self,
        portal: &Portal,
        mac: &str,
        channel: &Channel,
        channel_name: String,
        link: String,
        web: bool,
    ) -> AppResult<ResolvedStream> {
        let proxy = portal.proxy.clone();
        let relay_command = match self.settings.stream_method {
            StreamMethod::Relay => Some(build_command(
                &self.settings.relay_command,
                &link,
                proxy.as_deref(),
                self.settings.probe_timeout,
            )?),
            StreamMethod::Redirect => None,
        };
        let mut stream = ResolvedStream {
            portal_id: portal.id.clone(),
            channel_id: channel.id.clone(),
            channel_name,
            mac: mac.to_string(),
            link,
            proxy,
            relay_command,
        };

        let key = cache_key(&portal.id, &channel.id);
        self.cache.set(&key, stream.clone());
        if web {
            stream.relay_command = Some(self.preview_command(&stream.link, stream.proxy.as_deref())?);
        } else {
            self.limiter.update_rate(&key);
        }
        info!(
            "Resolved Portal({}):Channel({}) with MAC({})",
            stream.portal_id, stream.channel_id, stream.mac
        );
        Ok(stream)
    }

    fn preview_command(&self, link: &str, proxy: Option<&str>) -> AppResult<Vec<String>> {
        Ok(build_command(
            &self.settings.preview_command,
            link,
            proxy,
            self.settings.probe_timeout,
        )?)
    }

    fn report_fallback(&self, requested: &GroupMember, used: &GroupMember) {
        self.alerts.report(Alert::new(
            AlertKind::FallbackUsed,
            &requested.portal_id,
            &requested.channel_id,
            format!(
                "serving Portal({}):Channel({}) instead",
                used.portal_id, used.channel_id
            ),
        ));
    }
}

fn key(member: &GroupMember) -> String {
    cache_key(&member.portal_id, &member.channel_id)
}

fn alert_kind(error: &AppError) -> AlertKind {
    match error {
        AppError::Portal(PortalError::Authentication { .. }) => AlertKind::AuthenticationFailure,
        AppError::Portal(PortalError::StreamCreation { .. }) => AlertKind::StreamCreationFailure,
        AppError::Relay(RelayError::ProbeFailure { .. }) => AlertKind::ProbeFailure,
        AppError::Relay(_) => AlertKind::ProcessError,
        _ => AlertKind::PortalUnavailable,
    }
}
