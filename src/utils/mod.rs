//! Utility modules shared by the portal client and the web layer

pub mod http_client_factory;
pub mod url;

pub use http_client_factory::HttpClientFactory;
pub use self::url::UrlUtils;
