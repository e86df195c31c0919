//! Request extractors

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{HeaderMap, request::Parts};
use serde::Deserialize;

/// Address of the requesting client: `X-Forwarded-For`, then `X-Real-IP`,
/// then the socket peer, else `"unknown"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let client = forwarded_client(&parts.headers)
            .or(peer)
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self(client))
    }
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded.or_else(real_ip).map(str::to_string)
}

/// Query parameters of the play endpoint
#[derive(Debug, Default, Deserialize)]
pub struct PlayParams {
    #[serde(default)]
    pub web: Option<String>,
}

impl PlayParams {
    /// Any non-empty value other than `false` or `0` marks a web-preview request
    pub fn is_web(&self) -> bool {
        self.web
            .as_deref()
            .is_some_and(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "" | "false" | "0"))
    }
}
