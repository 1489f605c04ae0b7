//! Long-running poll loop.
//!
//! Runs a [`Pipeline`] cycle every poll interval until SIGINT/SIGTERM.
//! A PID file keeps a second instance from publishing the same entries.

use std::fs;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::app::{FeedcastError, Result};
use crate::config::{format_interval, FeedConfig};
use crate::pipeline::Pipeline;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub interval_secs: u64,
    /// Whether to run a cycle immediately on start
    pub update_on_start: bool,
}

impl DaemonConfig {
    pub fn from_feed(feed: &FeedConfig) -> Result<Self> {
        Ok(Self {
            interval_secs: feed.poll_interval_secs()?,
            update_on_start: feed.update_on_start,
        })
    }
}

/// Daemon runner
pub struct Daemon {
    pipeline: Pipeline,
    config: DaemonConfig,
}

impl Daemon {
    pub fn new(pipeline: Pipeline, config: DaemonConfig) -> Self {
        Self { pipeline, config }
    }

    /// Get the PID file path
    pub fn pid_file_path() -> Option<PathBuf> {
        dirs::runtime_dir()
            .or_else(dirs::cache_dir)
            .map(|d| d.join("feedcast").join("daemon.pid"))
    }

    /// PID of a live daemon, if any.
    pub fn running_pid() -> Option<u32> {
        running_pid_at(&Self::pid_file_path()?)
    }

    /// Run until SIGINT/SIGTERM. A cycle in progress is finished first.
    pub async fn run(mut self) -> Result<()> {
        let _guard = PidGuard::acquire()?;

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Termination signal received");
            let _ = stop_tx.send(true);
        });

        info!(
            "feedcast started (feed: {}, platform: {}, interval: {}, PID: {})",
            self.pipeline.feed_url(),
            self.pipeline.platform_name(),
            format_interval(self.config.interval_secs),
            std::process::id()
        );

        self.run_until(stop_rx).await;

        info!("feedcast shutting down");
        Ok(())
    }

    /// Poll loop; returns once `stop` changes.
    async fn run_until(&mut self, mut stop: watch::Receiver<bool>) {
        if self.config.update_on_start {
            info!("Running initial cycle");
            self.run_cycle().await;
        }

        let mut timer = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await; // Skip the first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = stop.changed() => break,
            }
            if *stop.borrow() {
                break;
            }
            self.run_cycle().await;
        }
    }

    async fn run_cycle(&mut self) {
        let start = Utc::now();
        match AssertUnwindSafe(self.pipeline.run_cycle())
            .catch_unwind()
            .await
        {
            Ok(report) => {
                let elapsed = Utc::now().signed_duration_since(start);
                info!(
                    "Cycle complete: {} published, {} failed ({:.1}s)",
                    report.published,
                    report.failed,
                    elapsed.num_milliseconds() as f64 / 1000.0
                );
            }
            Err(_) => error!("Cycle aborted by a panic; continuing with the next interval"),
        }
    }
}

/// Holds the PID file for as long as this process publishes. Both the
/// daemon and `run --once` take it, so only one pipeline writes the store.
pub struct PidGuard {
    path: Option<PathBuf>,
}

impl PidGuard {
    pub fn acquire() -> Result<Self> {
        match Daemon::pid_file_path() {
            Some(path) => Self::acquire_at(path),
            None => {
                warn!("Could not determine PID file path; running without instance guard");
                Ok(Self { path: None })
            }
        }
    }

    pub fn acquire_at(path: PathBuf) -> Result<Self> {
        if let Some(pid) = running_pid_at(&path) {
            return Err(FeedcastError::Other(format!(
                "Another feedcast instance is already running (PID {})",
                pid
            )));
        }

        write_pid_file(&path)
            .map_err(|e| FeedcastError::Other(format!("Failed to write PID file: {}", e)))?;
        Ok(Self { path: Some(path) })
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            let _ = fs::remove_file(path);
        }
    }
}

fn running_pid_at(path: &Path) -> Option<u32> {
    let pid = fs::read_to_string(path).ok()?.trim().parse::<u32>().ok()?;
    process_exists(pid).then_some(pid)
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    use std::process::Command;
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(windows)]
fn process_exists(pid: u32) -> bool {
    use std::process::Command;
    Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid)])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

fn write_pid_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    writeln!(file, "{}", std::process::id())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
            }
            _ => {
                warn!("Failed to install signal handlers, falling back to Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Stop a running daemon by reading PID file and sending signal
pub fn stop_daemon() -> Result<u32> {
    let pid_path = Daemon::pid_file_path()
        .ok_or_else(|| FeedcastError::Other("Could not determine PID file path".into()))?;

    if !pid_path.exists() {
        return Err(FeedcastError::Other(
            "No daemon is running (PID file not found)".into(),
        ));
    }

    let pid: u32 = fs::read_to_string(&pid_path)?
        .trim()
        .parse()
        .map_err(|_| FeedcastError::Other("Invalid PID in PID file".into()))?;

    #[cfg(unix)]
    let status = std::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()?;

    #[cfg(windows)]
    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .status()?;

    if status.success() {
        let _ = fs::remove_file(&pid_path);
        Ok(pid)
    } else {
        Err(FeedcastError::Other(format!(
            "Failed to stop daemon (PID {})",
            pid
        )))
    }
}

/// Check daemon status
pub fn daemon_status() -> String {
    if let Some(pid) = Daemon::running_pid() {
        return format!("Daemon is running (PID: {})", pid);
    }
    match Daemon::pid_file_path() {
        Some(path) if path.exists() => "Daemon is not running (stale PID file)".to_string(),
        _ => "Daemon is not running".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::publisher::tests::{FakePlatform, SharedPlatform};
    use crate::publisher::Publisher;
    use crate::reader::tests::ScriptedFetcher;
    use crate::reader::FeedReader;
    use crate::render::{BodyFormat, ImageLayout, ImageRenderer, TextFont, Transformer};
    use crate::store::JsonStore;

    fn daemon(fetcher: Arc<ScriptedFetcher>, dir: &tempfile::TempDir, update_on_start: bool) -> Daemon {
        let pipeline = Pipeline::new(
            FeedReader::new("https://news.example.com/rss", fetcher),
            Box::new(JsonStore::new(dir.path().join("processed.json"), 100)),
            Transformer::new(
                BodyFormat::Html,
                500,
                ImageRenderer::new(ImageLayout::blog(), TextFont::Builtin),
            ),
            Publisher::new(Box::new(SharedPlatform(Arc::new(FakePlatform::default())))),
        );
        Daemon::new(
            pipeline,
            DaemonConfig {
                interval_secs: 3600,
                update_on_start,
            },
        )
    }

    #[test]
    fn test_config_from_feed() {
        let feed = FeedConfig {
            poll_interval: "15m".into(),
            update_on_start: false,
            ..FeedConfig::default()
        };
        let config = DaemonConfig::from_feed(&feed).unwrap();
        assert_eq!(config.interval_secs, 900);
        assert!(!config.update_on_start);

        let bad = FeedConfig {
            poll_interval: "soon".into(),
            ..FeedConfig::default()
        };
        assert!(DaemonConfig::from_feed(&bad).is_err());
    }

    #[test]
    fn test_pid_guard_excludes_second_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("daemon.pid");

        let guard = PidGuard::acquire_at(path.clone()).unwrap();
        let written: u32 = fs::read_to_string(&path).unwrap().trim().parse().unwrap();
        assert_eq!(written, std::process::id());
        assert_eq!(running_pid_at(&path), Some(std::process::id()));

        assert!(PidGuard::acquire_at(path.clone()).is_err());

        drop(guard);
        assert!(!path.exists());
        assert!(PidGuard::acquire_at(path).is_ok());
    }

    #[test]
    fn test_stale_pid_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        fs::write(&path, "not-a-pid\n").unwrap();

        assert_eq!(running_pid_at(&path), None);
        let _guard = PidGuard::acquire_at(path.clone()).unwrap();
        assert_eq!(running_pid_at(&path), Some(std::process::id()));
    }

    #[tokio::test]
    async fn test_initial_cycle_then_stop() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::default());
        let mut daemon = daemon(fetcher.clone(), &dir, true);

        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();
        daemon.run_until(stop_rx).await;

        assert_eq!(fetcher.seen_etags.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_initial_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::default());
        let mut daemon = daemon(fetcher.clone(), &dir, false);

        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();
        daemon.run_until(stop_rx).await;

        assert!(fetcher.seen_etags.lock().unwrap().is_empty());
    }
}
