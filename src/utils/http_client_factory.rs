//! HTTP Client Factory
//!
//! Centralizes construction of the `reqwest` clients used against upstream portals.
//! Portals may sit behind their own outbound proxy, so one client is built per
//! proxy URL and reused for every later request through that proxy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::config::PortalClientConfig;
use crate::errors::{PortalError, PortalResult};
use crate::portal::identity::STB_USER_AGENT;
use crate::utils::url::UrlUtils;

/// Factory for per-proxy HTTP clients
#[derive(Clone)]
pub struct HttpClientFactory {
    clients: Arc<Mutex<HashMap<Option<String>, reqwest::Client>>>,
    request_timeout: Duration,
    connect_timeout: Duration,
    user_agent: String,
}

impl HttpClientFactory {
    pub fn new(config: &PortalClientConfig) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            request_timeout: config.request_timeout,
            connect_timeout: config.connect_timeout,
            user_agent: STB_USER_AGENT.to_string(),
        }
    }

    /// Client routing through `proxy`, or a direct client when `None`
    pub fn client_for(&self, proxy: Option<&str>) -> PortalResult<reqwest::Client> {
        let key = proxy.filter(|p| !p.is_empty()).map(str::to_string);

        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent);

        if let Some(proxy_url) = &key {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| PortalError::InvalidConfig {
                field: "proxy".to_string(),
                message: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }

        let client = builder.build()?;
        debug!(
            "Created portal HTTP client (proxy: {})",
            key.as_deref().map(UrlUtils::redact).unwrap_or_else(|| "none".to_string())
        );
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Number of distinct clients built so far
    pub fn cached_clients(&self) -> usize {
        self.clients
            .lock()
            .map(|clients| clients.len())
            .unwrap_or_default()
    }
}
