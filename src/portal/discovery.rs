//! Portal API URL discovery
//!
//! Portals are usually configured by their web UI address. The real API endpoint is
//! declared by the `ajax_loader` template in the portal's `xpcom.common.js`.

use regex::Regex;
use tracing::{debug, info};

use crate::utils::{HttpClientFactory, UrlUtils};

const SCRIPT_PATHS: [&str; 5] = [
    "/c/xpcom.common.js",
    "/client/xpcom.common.js",
    "/c_/xpcom.common.js",
    "/stalker_portal/c/xpcom.common.js",
    "/stalker_portal/c_/xpcom.common.js",
];

const FALLBACK_PATH: &str = "/stalker_portal/server/load.php";

/// Build the API URL from an `xpcom.common.js` body fetched from `script_url`
pub fn parse_loader(script: &str, script_url: &str) -> Option<String> {
    let pattern_re = Regex::new(r"\s*var\s*pattern.*/(\(http.*)/;").ok()?;
    let pattern = pattern_re.captures(script)?.get(1)?.as_str();
    let url_re = Regex::new(pattern).ok()?;
    let url_parts = url_re.captures(script_url)?;

    let compact: String = script
        .chars()
        .filter(|c| !matches!(c, ' ' | '\'' | '"' | '+'))
        .collect();

    let group_index = |name: &str| -> Option<usize> {
        let re = Regex::new(&format!(r"this\.{name}.*(\d).*;")).ok()?;
        re.captures(&compact)?.get(1)?.as_str().parse().ok()
    };
    let part = |name: &str| -> Option<String> {
        let index = group_index(name)?;
        Some(
            url_parts
                .get(index)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        )
    };

    let protocol = part("portal_protocol")?;
    let ip = part("portal_ip")?;
    let path = part("portal_path")?;

    let loader_re = Regex::new(r"this\.ajax_loader=(.*\.php);").ok()?;
    let template = loader_re.captures(&compact)?.get(1)?.as_str();

    Some(
        template
            .replace("this.portal_protocol", &protocol)
            .replace("this.portal_ip", &ip)
            .replace("this.portal_path", &path),
    )
}

pub fn script_candidates(origin: &str) -> Vec<String> {
    SCRIPT_PATHS
        .iter()
        .map(|path| format!("{origin}{path}"))
        .collect()
}

pub fn fallback_url(origin: &str) -> String {
    format!("{origin}{FALLBACK_PATH}")
}

/// Resolve the API endpoint for a portal address.
///
/// URLs already ending in `.php` are returned unchanged. Otherwise every script
/// candidate is tried through the proxy, then directly, before falling back to
/// the conventional `load.php` location.
pub async fn discover_portal_url(
    http: &HttpClientFactory,
    url: &str,
    proxy: Option<&str>,
) -> String {
    let url = UrlUtils::normalize_scheme(url);
    if url.ends_with(".php") {
        return url;
    }

    let origin = match UrlUtils::origin(&url) {
        Ok(origin) => origin,
        Err(e) => {
            debug!("Cannot parse portal address {}: {}", url, e);
            return url;
        }
    };

    let routes: Vec<Option<&str>> = match proxy {
        Some(p) if !p.is_empty() => vec![Some(p), None],
        _ => vec![None],
    };

    for route in routes {
        let Ok(client) = http.client_for(route) else {
            continue;
        };
        for script_url in script_candidates(&origin) {
            let response = match client.get(&script_url).send().await {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    debug!("{} answered {}", script_url, response.status());
                    continue;
                }
                Err(e) => {
                    debug!("{} unreachable: {}", script_url, e);
                    continue;
                }
            };
            let Ok(body) = response.text().await else {
                continue;
            };
            if let Some(api_url) = parse_loader(&body, &script_url) {
                info!("Discovered portal API {} from {}", api_url, script_url);
                return api_url;
            }
        }
    }

    let fallback = fallback_url(&origin);
    info!("Portal discovery failed for {}, using {}", url, fallback);
    fallback
}
