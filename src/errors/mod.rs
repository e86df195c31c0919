//! Centralized error handling for the relay service
//!
//! Errors are grouped by the layer that produces them:
//!
//! - **Portal Errors**: upstream middleware handshake, profile and link creation failures
//! - **Relay Errors**: probe rejections and external process failures
//! - **Application Errors**: configuration, lookup and I/O failures surfaced to callers
//!
//! Most portal and relay errors are recovered locally by rotating to the next MAC
//! or fallback channel; only [`AppError`] crosses the web boundary.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for protocol client Results
pub type PortalResult<T> = Result<T, PortalError>;

/// Convenience type alias for relay Results
pub type RelayResult<T> = Result<T, RelayError>;
