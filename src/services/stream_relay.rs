//! Stream relay
//!
//! Spawns the relay process for a resolved link and forwards its stdout to the
//! client in fixed-size chunks. Each relay owns a dedicated task that holds the
//! MAC occupancy for exactly as long as the process runs.

use std::io;
use std::process::Stdio;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::errors::{RelayError, RelayResult};
use crate::models::ResolvedStream;
use crate::services::alerts::{Alert, AlertKind, AlertSink};
use crate::services::mac_pool::{MacPoolManager, OccupancyGuard};

/// Chunks buffered between the reader task and the HTTP body
const RELAY_CHANNEL_DEPTH: usize = 32;

pub type RelayBody = ReceiverStream<Result<Bytes, io::Error>>;

pub struct StreamRelay {
    pool: Arc<MacPoolManager>,
    alerts: Arc<dyn AlertSink>,
    chunk_size: usize,
}

impl StreamRelay {
    pub fn new(pool: Arc<MacPoolManager>, alerts: Arc<dyn AlertSink>, chunk_size: usize) -> Self {
        Self {
            pool,
            alerts,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Start relaying `stream` to `client` using the given argument vector.
    ///
    /// The MAC is occupied just before the spawn and released when the process
    /// ends, fails to start, or the client goes away.
    pub fn relay(&self, stream: &ResolvedStream, command: &[String], client: &str) -> RelayResult<RelayBody> {
        let (program, args) = command.split_first().ok_or(RelayError::EmptyCommand)?;

        let guard = self.pool.occupy(
            &stream.portal_id,
            &stream.mac,
            &stream.channel_id,
            client,
            &stream.channel_name,
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| RelayError::Spawn {
            command: program.clone(),
            message: e.to_string(),
        })?;
        debug!("Spawned relay process {} for {}", program, stream.link);

        let (tx, rx) = mpsc::channel(RELAY_CHANNEL_DEPTH);
        let pump = RelayPump {
            pool: self.pool.clone(),
            alerts: self.alerts.clone(),
            stream: stream.clone(),
            client: client.to_string(),
            chunk_size: self.chunk_size,
        };
        tokio::spawn(pump.run(child, guard, tx));

        Ok(ReceiverStream::new(rx))
    }
}

struct RelayPump {
    pool: Arc<MacPoolManager>,
    alerts: Arc<dyn AlertSink>,
    stream: ResolvedStream,
    client: String,
    chunk_size: usize,
}

impl RelayPump {
    async fn run(
        self,
        mut child: Child,
        guard: OccupancyGuard,
        tx: mpsc::Sender<Result<Bytes, io::Error>>,
    ) {
        let Some(mut stdout) = child.stdout.take() else {
            error!("Relay process for {} has no stdout", self.stream.link);
            return;
        };

        let mut buffer = vec![0u8; self.chunk_size];
        let mut bytes_sent: u64 = 0;

        loop {
            tokio::select! {
                _ = tx.closed() => {
                    info!("Client {} disconnected from Portal({}):Channel({})", self.client, self.stream.portal_id, self.stream.channel_id);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to stop relay process: {}", e);
                    }
                    drop(guard);
                    return;
                }
                read = stdout.read(&mut buffer) => match read {
                    Ok(0) => break,
                    Ok(n) => {
                        bytes_sent += n as u64;
                        if tx.send(Ok(Bytes::copy_from_slice(&buffer[..n]))).await.is_err() {
                            debug!("Relay receiver dropped mid-send for {}", self.client);
                            let _ = child.kill().await;
                            drop(guard);
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Error reading relay output for {}: {}", self.stream.link, e);
                        break;
                    }
                }
            }
        }

        let status = child.wait().await;

        match status {
            Ok(status) if status.success() => {
                info!(
                    "Relay for Portal({}):Channel({}) ended after {} bytes",
                    self.stream.portal_id, self.stream.channel_id, bytes_sent
                );
            }
            Ok(status) => {
                let failure = RelayError::ProcessError {
                    status: status.to_string(),
                };
                self.alerts.report(
                    Alert::new(
                        AlertKind::ProcessError,
                        &self.stream.portal_id,
                        &self.stream.channel_id,
                        format!("{failure} after {bytes_sent} bytes"),
                    )
                    .with_mac(&self.stream.mac),
                );
                if let Err(e) = self
                    .pool
                    .record_failure(&self.stream.portal_id, &self.stream.mac)
                    .await
                {
                    warn!("Could not demote MAC({}): {}", self.stream.mac, e);
                }
            }
            Err(e) => warn!("Could not reap relay process: {}", e),
        }
        // Release only once the demotion is persisted
        drop(guard);
    }
}
