//! Observability sink for recoverable resolution failures

use std::fmt;

use strum::{AsRefStr, Display};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    AuthenticationFailure,
    PortalUnavailable,
    StreamCreationFailure,
    ProbeFailure,
    ProcessError,
    ResourceExhausted,
    FallbackUsed,
    NoStreamsAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub portal_id: String,
    pub channel_id: String,
    pub mac: Option<String>,
    pub message: String,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        portal_id: impl Into<String>,
        channel_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            portal_id: portal_id.into(),
            channel_id: channel_id.into(),
            mac: None,
            message: message.into(),
        }
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Portal({})", self.portal_id)?;
        if let Some(mac) = &self.mac {
            write!(f, ":MAC({mac})")?;
        }
        write!(f, ":Channel({}) {}", self.channel_id, self.message)
    }
}

/// Receives alerts; implementations must not block or fail the caller
pub trait AlertSink: Send + Sync {
    fn report(&self, alert: Alert);
}

/// Emits alerts as `warn!` events from this module, filterable as `stalker_relay::services::alerts`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn report(&self, alert: Alert) {
        warn!(kind = alert.kind.as_ref(), "{}", alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn display_includes_mac_when_known() {
        let alert = Alert::new(AlertKind::ProbeFailure, "p1", "10", "probe rejected link").with_mac("A");
        assert_eq!(alert.to_string(), "Portal(p1):MAC(A):Channel(10) probe rejected link");
        assert_eq!(AlertKind::ProbeFailure.to_string(), "probe_failure");
    }

    #[traced_test]
    #[test]
    fn tracing_sink_logs_alert() {
        TracingAlertSink.report(Alert::new(AlertKind::NoStreamsAvailable, "p1", "10", "exhausted"));
        assert!(logs_contain("Portal(p1):Channel(10) exhausted"));
    }
}
