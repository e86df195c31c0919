//! Link validation with ffprobe

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::RelaySettings;
use crate::errors::{RelayError, RelayResult};

/// Extra wall-clock allowance on top of the network timeout handed to ffprobe
const PROBE_GRACE: Duration = Duration::from_secs(5);

/// Decides whether a resolved link is worth serving
#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn test_link(&self, link: &str, proxy: Option<&str>) -> bool;
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamInfo {
    pub index: u32,
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub codec_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    pub streams: Vec<StreamInfo>,
    pub has_video: bool,
    pub has_audio: bool,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

/// Runs the configured ffprobe command against a link
pub struct StreamProber {
    ffprobe_command: String,
    probe_timeout: Duration,
}

impl StreamProber {
    pub fn new(ffprobe_command: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            ffprobe_command: ffprobe_command.into(),
            probe_timeout,
        }
    }

    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self::new(settings.ffprobe_command.clone(), settings.probe_timeout)
    }

    fn build_args(&self, link: &str, proxy: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = ["-v", "quiet", "-print_format", "json", "-show_streams"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            args.push("-http_proxy".to_string());
            args.push(proxy.to_string());
        }
        args.push("-timeout".to_string());
        args.push(self.probe_timeout.as_micros().to_string());
        args.push("-i".to_string());
        args.push(link.to_string());
        args
    }

    /// Probe a link; fails unless ffprobe exits cleanly with parseable output
    pub async fn probe(&self, link: &str, proxy: Option<&str>) -> RelayResult<ProbeResult> {
        let mut parts = self.ffprobe_command.split_whitespace();
        let program = parts.next().ok_or(RelayError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(parts)
            .args(self.build_args(link, proxy))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.probe_timeout + PROBE_GRACE, cmd.output())
            .await
            .map_err(|_| RelayError::probe(format!("ffprobe timed out after {:?}", self.probe_timeout)))?
            .map_err(|e| RelayError::Spawn {
                command: program.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(RelayError::probe(format!("ffprobe exited with {}", output.status)));
        }

        let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| RelayError::probe(format!("unreadable ffprobe output: {e}")))?;
        let has_type = |kind: &str| {
            parsed
                .streams
                .iter()
                .any(|s| s.codec_type.as_deref() == Some(kind))
        };
        Ok(ProbeResult {
            has_video: has_type("video"),
            has_audio: has_type("audio"),
            streams: parsed.streams,
        })
    }
}

#[async_trait]
impl LinkProbe for StreamProber {
    async fn test_link(&self, link: &str, proxy: Option<&str>) -> bool {
        match self.probe(link, proxy).await {
            Ok(result) if result.has_video => {
                debug!("Probe accepted {} ({} streams)", link, result.streams.len());
                true
            }
            Ok(_) => {
                debug!("Probe found no video stream in {}", link);
                false
            }
            Err(e) => {
                warn!("Probe failed for {}: {}", link, e);
                false
            }
        }
    }
}
