//! Upstream portal protocol
//!
//! - [`identity`]: device identity, cookies and signatures
//! - [`payload`]: tolerant JSON envelope matching
//! - [`endpoints`]: candidate request variants per operation
//! - [`discovery`]: API URL discovery from the portal web UI
//! - [`client`]: the `reqwest` backed [`PortalClient`]

pub mod client;
pub mod discovery;
pub mod endpoints;
pub mod identity;
pub mod payload;
pub mod traits;

pub use client::PortalClient;
pub use traits::{PortalApi, PortalSession};
