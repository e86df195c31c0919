//! HTTP implementation of the portal protocol

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, COOKIE};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::{PortalError, PortalResult};
use crate::models::{
    AccountProfile, Channel, EpgEntry, Genre, MacAuthContext, Season, VodCategory, VodItem,
};
use crate::portal::discovery::discover_portal_url;
use crate::portal::endpoints::{self, Operation};
use crate::portal::identity::{X_USER_AGENT, cookie_header};
use crate::portal::payload::{self, Body, field, int_field, match_shapes, non_empty_array};
use crate::portal::traits::{PortalApi, PortalSession};
use crate::utils::HttpClientFactory;

/// Profile keys that identify a `get_profile` payload
const PROFILE_KEYS: [&str; 5] = ["id", "login", "status", "expire_billing_date", "block_msg"];

enum Attempt<T> {
    Matched(T),
    AuthFailed,
    NoMatch,
}

/// Portal protocol client over `reqwest`
#[derive(Clone)]
pub struct PortalClient {
    http: HttpClientFactory,
}

impl PortalClient {
    pub fn new(http: HttpClientFactory) -> Self {
        Self { http }
    }

    async fn fetch(
        &self,
        operation: Operation,
        url: &str,
        query: &str,
        mac: &str,
        token: Option<&str>,
        proxy: Option<&str>,
    ) -> PortalResult<Body> {
        let client = self.http.client_for(proxy)?;
        let mut request = client
            .get(endpoints::request_url(url, query))
            .header(COOKIE, cookie_header(mac))
            .header("X-User-Agent", X_USER_AGENT)
            .header(ACCEPT, "*/*");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, operation))?;
        let status = response.status();
        if !status.is_success() {
            debug!("Portal {} answered {} for {}", url, status, operation);
            return Ok(Body::Unusable);
        }

        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, operation))?;
        Ok(payload::classify(&text))
    }

    /// Walk the candidate queries until one yields a payload `matcher` accepts
    #[allow(clippy::too_many_arguments)]
    async fn first_match<T, M>(
        &self,
        operation: Operation,
        url: &str,
        mac: &str,
        token: Option<&str>,
        proxy: Option<&str>,
        queries: &[String],
        matcher: &M,
    ) -> PortalResult<Attempt<T>>
    where
        M: Fn(&Value) -> Option<T> + Sync,
        T: Send,
    {
        for query in queries {
            match self.fetch(operation, url, query, mac, token, proxy).await? {
                Body::Json(value) => {
                    if let Some(found) = match_shapes(&value, matcher) {
                        return Ok(Attempt::Matched(found));
                    }
                    debug!("No usable {} payload from {} ({})", operation, url, query);
                }
                Body::AuthFailed => return Ok(Attempt::AuthFailed),
                Body::Unusable => {
                    debug!("Non-JSON {} response from {} ({})", operation, url, query);
                }
            }
        }
        Ok(Attempt::NoMatch)
    }

    /// Run an authenticated operation with a single re-handshake on authorization failure
    async fn authenticated<T, M>(
        &self,
        session: &mut PortalSession,
        operation: Operation,
        queries: Vec<String>,
        matcher: M,
    ) -> PortalResult<Option<T>>
    where
        M: Fn(&Value) -> Option<T> + Send + Sync,
        T: Send,
    {
        let mut retried = false;
        loop {
            let attempt = self
                .first_match(
                    operation,
                    &session.url,
                    &session.mac,
                    Some(&session.token),
                    session.proxy(),
                    &queries,
                    &matcher,
                )
                .await?;
            match attempt {
                Attempt::Matched(found) => return Ok(Some(found)),
                Attempt::NoMatch => return Ok(None),
                Attempt::AuthFailed if !retried => {
                    retried = true;
                    self.refresh(session, operation).await?;
                }
                Attempt::AuthFailed => {
                    return Err(PortalError::auth_failed(
                        &session.mac,
                        format!("{operation} rejected after re-handshake"),
                    ));
                }
            }
        }
    }

    async fn refresh(&self, session: &mut PortalSession, operation: Operation) -> PortalResult<()> {
        info!(
            "Authorization failed during {} for MAC({}), re-handshaking",
            operation, session.mac
        );
        session.token = self
            .handshake(&session.url, &session.mac, session.proxy())
            .await?;
        Ok(())
    }

    /// Genre id to title, as shown in channel lists
    pub async fn genre_names(&self, session: &mut PortalSession) -> PortalResult<HashMap<String, String>> {
        Ok(self
            .list_genres(session)
            .await?
            .into_iter()
            .map(|genre| (genre.id, genre.title))
            .collect())
    }

    /// Short EPG for all channels covering the next `period_hours`
    pub async fn get_epg(&self, session: &mut PortalSession, period_hours: u32) -> PortalResult<Vec<EpgEntry>> {
        self.authenticated(session, Operation::Epg, endpoints::epg(period_hours), parse_epg)
            .await?
            .ok_or_else(|| PortalError::no_match(Operation::Epg.to_string()))
    }

    pub async fn vod_categories(&self, session: &mut PortalSession) -> PortalResult<Vec<VodCategory>> {
        self.categories(session, "vod", Operation::VodCategories).await
    }

    pub async fn series_categories(&self, session: &mut PortalSession) -> PortalResult<Vec<VodCategory>> {
        self.categories(session, "series", Operation::SeriesCategories).await
    }

    async fn categories(
        &self,
        session: &mut PortalSession,
        media_type: &str,
        operation: Operation,
    ) -> PortalResult<Vec<VodCategory>> {
        self.authenticated(session, operation, endpoints::categories(media_type), |v| {
            let items: Vec<VodCategory> = non_empty_array(v)?
                .iter()
                .filter_map(|c| {
                    Some(VodCategory {
                        id: field(c, "id")?,
                        title: field(c, "title").unwrap_or_default(),
                    })
                })
                .collect();
            (!items.is_empty()).then_some(items)
        })
        .await?
        .ok_or_else(|| PortalError::no_match(operation.to_string()))
    }

    pub async fn vod_items(
        &self,
        session: &mut PortalSession,
        category: &str,
        page: u32,
    ) -> PortalResult<Vec<VodItem>> {
        self.ordered_list(session, "vod", category, page, Operation::VodItems)
            .await
    }

    pub async fn series_items(
        &self,
        session: &mut PortalSession,
        category: &str,
        page: u32,
    ) -> PortalResult<Vec<VodItem>> {
        self.ordered_list(session, "series", category, page, Operation::SeriesItems)
            .await
    }

    async fn ordered_list(
        &self,
        session: &mut PortalSession,
        media_type: &str,
        category: &str,
        page: u32,
        operation: Operation,
    ) -> PortalResult<Vec<VodItem>> {
        let queries = endpoints::ordered_list(media_type, category, page);
        Ok(self
            .authenticated(session, operation, queries, |v| {
                let items: Vec<VodItem> = non_empty_array(v)?.iter().filter_map(parse_vod_item).collect();
                (!items.is_empty()).then_some(items)
            })
            .await?
            .unwrap_or_default())
    }

    pub async fn series_seasons(&self, session: &mut PortalSession, series_id: &str) -> PortalResult<Vec<Season>> {
        Ok(self
            .authenticated(session, Operation::SeriesSeasons, endpoints::seasons(series_id), |v| {
                let seasons: Vec<Season> = non_empty_array(v)?.iter().filter_map(parse_season).collect();
                (!seasons.is_empty()).then_some(seasons)
            })
            .await?
            .unwrap_or_default())
    }

    pub async fn resolve_vod_link(&self, session: &mut PortalSession, cmd: &str) -> PortalResult<String> {
        self.create_link(session, "vod", cmd, 0).await
    }

    pub async fn resolve_episode_link(
        &self,
        session: &mut PortalSession,
        cmd: &str,
        episode: u32,
    ) -> PortalResult<String> {
        self.create_link(session, "vod", cmd, episode).await
    }

    async fn create_link(
        &self,
        session: &mut PortalSession,
        media_type: &str,
        cmd: &str,
        series: u32,
    ) -> PortalResult<String> {
        let queries = endpoints::create_link(media_type, cmd, series);
        self.authenticated(session, Operation::CreateLink, queries, link_from_cmd)
            .await?
            .ok_or_else(|| PortalError::no_link(cmd, "portal returned no link"))
    }
}

#[async_trait]
impl PortalApi for PortalClient {
    async fn discover_url(&self, url: &str, proxy: Option<&str>) -> String {
        discover_portal_url(&self.http, url, proxy).await
    }

    async fn handshake(&self, url: &str, mac: &str, proxy: Option<&str>) -> PortalResult<String> {
        let queries = endpoints::handshake();
        let attempt = self
            .first_match(
                Operation::Handshake,
                url,
                mac,
                None,
                proxy,
                &queries,
                &|v: &Value| field(v, "token"),
            )
            .await?;
        match attempt {
            Attempt::Matched(token) => {
                debug!("Handshake succeeded for MAC({}) on {}", mac, url);
                Ok(token)
            }
            Attempt::AuthFailed => Err(PortalError::auth_failed(mac, "portal rejected handshake")),
            Attempt::NoMatch => Err(PortalError::auth_failed(mac, "handshake returned no token")),
        }
    }

    async fn get_profile(
        &self,
        session: &mut PortalSession,
        auth: &mut MacAuthContext,
    ) -> PortalResult<AccountProfile> {
        let mut retried = false;
        loop {
            let queries = endpoints::profile(&session.mac, auth);
            let attempt = self
                .first_match(
                    Operation::Profile,
                    &session.url,
                    &session.mac,
                    Some(&session.token),
                    session.proxy(),
                    &queries,
                    &parse_profile,
                )
                .await?;
            match attempt {
                Attempt::Matched(profile) => {
                    if let Some(message) = &profile.block_msg {
                        info!("Portal block message for MAC({}): {}", session.mac, message);
                    }
                    return Ok(profile);
                }
                Attempt::AuthFailed if !retried => {
                    retried = true;
                    self.refresh(session, Operation::Profile).await?;
                    *auth = MacAuthContext::fresh(&session.mac, &session.token, Utc::now().timestamp());
                }
                Attempt::AuthFailed => {
                    return Err(PortalError::auth_failed(
                        &session.mac,
                        "profile rejected after re-handshake",
                    ));
                }
                Attempt::NoMatch => {
                    return Err(PortalError::auth_failed(&session.mac, "profile unavailable"));
                }
            }
        }
    }

    async fn get_account_expiry(&self, session: &mut PortalSession) -> PortalResult<Option<String>> {
        Ok(self
            .authenticated(session, Operation::AccountInfo, endpoints::account_info(), |v| {
                let info = v.as_object()?;
                if !info.contains_key("end_date") && !info.contains_key("phone") {
                    return None;
                }
                Some(field(v, "end_date").or_else(|| field(v, "phone")))
            })
            .await?
            .flatten())
    }

    async fn list_channels(&self, session: &mut PortalSession) -> PortalResult<Vec<Channel>> {
        let channels = self
            .authenticated(session, Operation::Channels, endpoints::channels(), |v| {
                let channels: Vec<Channel> = non_empty_array(v)?.iter().filter_map(parse_channel).collect();
                (!channels.is_empty()).then_some(channels)
            })
            .await?
            .ok_or_else(|| PortalError::no_match(Operation::Channels.to_string()))?;
        debug!("Portal {} listed {} channels", session.url, channels.len());
        Ok(channels)
    }

    async fn list_genres(&self, session: &mut PortalSession) -> PortalResult<Vec<Genre>> {
        Ok(self
            .authenticated(session, Operation::Genres, endpoints::genres(), |v| {
                let genres: Vec<Genre> = non_empty_array(v)?
                    .iter()
                    .filter_map(|g| {
                        Some(Genre {
                            id: field(g, "id")?,
                            title: field(g, "title").unwrap_or_default(),
                        })
                    })
                    .collect();
                (!genres.is_empty()).then_some(genres)
            })
            .await?
            .unwrap_or_else(|| {
                warn!("Portal {} returned no genres", session.url);
                Vec::new()
            }))
    }

    async fn resolve_channel_link(&self, session: &mut PortalSession, cmd: &str) -> PortalResult<String> {
        self.create_link(session, "itv", cmd, 0).await
    }
}

fn transport_error(error: reqwest::Error, operation: Operation) -> PortalError {
    if error.is_timeout() {
        PortalError::Timeout {
            operation: operation.to_string(),
        }
    } else {
        PortalError::Http(error)
    }
}

fn parse_profile(value: &Value) -> Option<AccountProfile> {
    let object = value.as_object()?;
    if !PROFILE_KEYS.iter().any(|key| object.contains_key(*key)) {
        return None;
    }
    Some(AccountProfile {
        id: field(value, "id"),
        expire_billing_date: field(value, "expire_billing_date"),
        block_msg: field(value, "block_msg"),
    })
}

fn parse_channel(value: &Value) -> Option<Channel> {
    Some(Channel {
        id: field(value, "id")?,
        name: field(value, "name").unwrap_or_default(),
        number: field(value, "number"),
        genre_id: field(value, "tv_genre_id"),
        logo: field(value, "logo"),
        cmd: field(value, "cmd")?,
    })
}

/// Playable URL from a `create_link` payload: the last token of its `cmd`
fn link_from_cmd(value: &Value) -> Option<String> {
    field(value, "cmd")?
        .split_whitespace()
        .last()
        .map(str::to_string)
}

fn parse_epg(value: &Value) -> Option<Vec<EpgEntry>> {
    let entries: Vec<EpgEntry> = match value {
        Value::Object(by_channel) => by_channel
            .iter()
            .filter_map(|(channel_id, programs)| Some((channel_id, programs.as_array()?)))
            .flat_map(|(channel_id, programs)| {
                programs
                    .iter()
                    .filter_map(move |program| parse_program(program, Some(channel_id)))
            })
            .collect(),
        Value::Array(programs) => programs
            .iter()
            .filter_map(|program| parse_program(program, None))
            .collect(),
        _ => return None,
    };
    (!entries.is_empty()).then_some(entries)
}

fn parse_program(value: &Value, channel_id: Option<&String>) -> Option<EpgEntry> {
    Some(EpgEntry {
        channel_id: field(value, "ch_id").or_else(|| channel_id.cloned())?,
        name: field(value, "name")?,
        description: field(value, "descr"),
        start_timestamp: int_field(value, "start_timestamp")?,
        stop_timestamp: int_field(value, "stop_timestamp")?,
    })
}

fn parse_vod_item(value: &Value) -> Option<VodItem> {
    Some(VodItem {
        id: field(value, "id")?,
        name: field(value, "name").unwrap_or_default(),
        cmd: field(value, "cmd"),
        description: field(value, "description"),
        year: field(value, "year"),
    })
}

fn parse_season(value: &Value) -> Option<Season> {
    let episodes = value
        .get("series")
        .and_then(Value::as_array)
        .map(|numbers| {
            numbers
                .iter()
                .filter_map(|n| match n {
                    Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    Some(Season {
        id: field(value, "id")?,
        name: field(value, "name").unwrap_or_default(),
        cmd: field(value, "cmd"),
        episodes,
    })
}
