//! Service layer
//!
//! The relay path is built from small services wired together in `main`:
//!
//! - [`FallbackResolver`] turns a play request into a [`Resolution`]
//! - [`MacPoolManager`] owns MAC rotation order and occupancy
//! - [`LinkCache`] and [`RateLimiter`] hold short-lived per-channel state
//! - [`StreamProber`] validates links before they are handed out
//! - [`StreamRelay`] runs the relay process and streams its output
//!
//! [`PortalAdmin`] sits outside the relay path and registers or refreshes portals.

pub mod alerts;
pub mod housekeeper;
pub mod link_cache;
pub mod mac_pool;
pub mod portal_admin;
pub mod rate_limiter;
pub mod relay_command;
pub mod resolver;
pub mod stream_prober;
pub mod stream_relay;

pub use alerts::{Alert, AlertKind, AlertSink, TracingAlertSink};
pub use housekeeper::Housekeeper;
pub use link_cache::{LinkCache, cache_key};
pub use mac_pool::{MacPoolManager, OccupancyGuard};
pub use portal_admin::{MacReport, MacStatus, PortalAdmin, PortalReport, RefreshRequest};
pub use rate_limiter::RateLimiter;
pub use relay_command::build_command;
pub use resolver::{FallbackResolver, Resolution};
pub use stream_prober::{LinkProbe, ProbeResult, StreamProber};
pub use stream_relay::{RelayBody, StreamRelay};
