//! Error type definitions for the relay service

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Upstream portal protocol errors
    #[error("Portal error: {0}")]
    Portal(#[from] PortalError),

    /// Stream relay errors
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Filesystem errors from the configuration store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration document (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised while talking to an upstream portal
#[derive(Error, Debug)]
pub enum PortalError {
    /// Handshake, profile or signature rejected after the refresh retry
    #[error("Authentication failed for MAC {mac}: {message}")]
    Authentication { mac: String, message: String },

    /// The portal returned no playable link for a channel command
    #[error("No playable link for command '{cmd}': {message}")]
    StreamCreation { cmd: String, message: String },

    /// None of the candidate endpoint variants returned a usable payload
    #[error("No candidate endpoint returned a usable response for {operation}")]
    NoMatchingResponse { operation: String },

    /// Transport level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The portal did not answer within the client timeout
    #[error("Portal request timed out during {operation}")]
    Timeout { operation: String },

    /// Invalid portal URL or proxy configuration
    #[error("Invalid portal configuration: {field} - {message}")]
    InvalidConfig { field: String, message: String },
}

/// Errors raised by the stream relay and link probe
#[derive(Error, Debug)]
pub enum RelayError {
    /// Link validation rejected the stream
    #[error("Probe rejected link: {reason}")]
    ProbeFailure { reason: String },

    /// Relay process exited abnormally after streaming began
    #[error("Relay process exited with status {status}")]
    ProcessError { status: String },

    /// The external process could not be started
    #[error("Failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    /// No MAC of the portal has a free session slot
    #[error("No free MAC on portal {portal_id}")]
    ResourceExhausted { portal_id: String },

    /// The relay command template produced no program to run
    #[error("Empty relay command template")]
    EmptyCommand,
}

impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl PortalError {
    /// Create an authentication failed error
    pub fn auth_failed<M: Into<String>, S: Into<String>>(mac: M, message: S) -> Self {
        Self::Authentication {
            mac: mac.into(),
            message: message.into(),
        }
    }

    /// Create a stream creation error
    pub fn no_link<C: Into<String>, S: Into<String>>(cmd: C, message: S) -> Self {
        Self::StreamCreation {
            cmd: cmd.into(),
            message: message.into(),
        }
    }

    pub fn no_match<S: Into<String>>(operation: S) -> Self {
        Self::NoMatchingResponse {
            operation: operation.into(),
        }
    }

    /// Whether the error means the portal rejected the MAC session
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

impl RelayError {
    pub fn probe<S: Into<String>>(reason: S) -> Self {
        Self::ProbeFailure {
            reason: reason.into(),
        }
    }
}
