//! Stream resolution and relay for Stalker-type IPTV middleware portals
//!
//! A play request for `(portal, channel)` is resolved to a playable link by
//! rotating through the portal's MACs and the channel's fallback group, then
//! relayed through an external process or redirected.

pub mod config;
pub mod errors;
pub mod models;
pub mod portal;
pub mod services;
pub mod store;
pub mod utils;
pub mod web;
