//! The lightweight device-agent server: the in-process peer of the fleet
//! management plane, providing a pid file, periodic health reporting, and
//! graceful shutdown.

use crate::agent::pidfile::{remove_pid_file, write_pid_file};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Notify;

/// Configuration for the device-agent server. The logger and
/// capability-stage fields are opaque to the core, which never interprets
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_shutdown_grace_period")]
    pub shutdown_grace_period_secs: u64,
    /// Opaque capability-gate integer in `[1..6]`; the core never
    /// interprets it.
    #[serde(default)]
    pub stage: u8,
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_shutdown_grace_period() -> u64 {
    10
}

impl AgentConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            health_check_interval_secs: default_health_check_interval(),
            shutdown_grace_period_secs: default_shutdown_grace_period(),
            stage: 0,
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_secs)
    }
}

/// Coarse liveness classification reported on each health tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// A single health report, emitted at `health_check_interval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub uptime_secs: u64,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// The device-agent server: writes its pid file on start, emits periodic
/// health reports, and shuts down gracefully on request.
pub struct AgentServer {
    config: AgentConfig,
    shutdown: Notify,
    started_at: std::sync::OnceLock<std::time::Instant>,
}

impl AgentServer {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            shutdown: Notify::new(),
            started_at: std::sync::OnceLock::new(),
        }
    }

    /// Requests a graceful shutdown; [`Self::run`] returns once its current
    /// health tick completes.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Writes the pid file, then loops emitting `on_health` callbacks at
    /// `health_check_interval` until [`Self::request_shutdown`] is called
    /// or `health_check_interval` elapses `shutdown_grace_period` times
    /// after a shutdown request — whichever the embedder's `on_health`
    /// reports `HealthState::Unhealthy` for is the caller's decision, not
    /// this loop's.
    pub async fn run(&self, mut on_health: impl FnMut(HealthReport) + Send) -> std::io::Result<()> {
        write_pid_file(&self.config.data_dir, std::process::id())?;
        self.started_at.get_or_init(std::time::Instant::now());
        log::info!("device-agent server started, pid {}", std::process::id());

        let mut ticker = tokio::time::interval(self.config.health_check_interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let uptime = self.started_at.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);
                    on_health(HealthReport {
                            state: HealthState::Healthy,
                            uptime_secs: uptime,
                            checked_at: chrono::Utc::now(),
                    });
                }
                _ = self.shutdown.notified() => {
                    log::info!("device-agent server received shutdown request, grace period {:?}", self.config.shutdown_grace_period());
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Best-effort pid file removal on shutdown.
    async fn shutdown(&self) {
        tokio::time::sleep(Duration::from_millis(0)).await;
        remove_pid_file(&self.config.data_dir);
        log::info!("device-agent server shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn run_emits_health_reports_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentConfig::new(dir.path());
        config.health_check_interval_secs = 1;
        let server = Arc::new(AgentServer::new(config));

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = ticks.clone();
        let server_clone = server.clone();
        let handle = tokio::spawn(async move {
                server_clone
                .run(move |_report| {
                        ticks_clone.fetch_add(1, Ordering::SeqCst);
                })
                .await
        });

        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        server.request_shutdown();
        handle.await.unwrap().unwrap();

        assert!(ticks.load(Ordering::SeqCst) >= 1);
        assert!(!dir.path().join(crate::agent::pidfile::PID_FILE_NAME).exists());
    }
}
