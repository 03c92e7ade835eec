//! CaptureSource - Still Capture on a Fixed Interval
//!
//! ## Responsibilities
//!
//! - Run the still-capture command (raspistill by default) once per interval
//! - Name each artifact after its capture time (`<epoch ms>.jpg`)
//! - Report the requested artifact and its completion to the SettleScheduler
//!
//! The device driver itself is external. It is invoked as a child process and
//! its exit status is the completion signal.

use crate::error::{Error, Result};
use crate::settle_scheduler::CaptureSignal;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Placeholder in capture args replaced with the artifact path
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Identifier of a produced artifact (file name under the images directory)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the identifier from capture time
    pub fn from_time(at: DateTime<Utc>) -> Self {
        Self(format!("{}.jpg", at.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Capture completion reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureEvent {
    pub artifact_id: ArtifactId,
    /// Set when the capture failed
    pub failure: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl CaptureEvent {
    pub fn completed(artifact_id: ArtifactId) -> Self {
        Self {
            artifact_id,
            failure: None,
            captured_at: Utc::now(),
        }
    }

    pub fn failed(artifact_id: ArtifactId, failure: impl Into<String>) -> Self {
        Self {
            artifact_id,
            failure: Some(failure.into()),
            captured_at: Utc::now(),
        }
    }

    /// Stamp the moment the capture was started
    pub fn captured(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = at;
        self
    }
}

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Directory the artifacts are written to (served at /images)
    pub images_dir: PathBuf,
    /// Poll interval between captures
    pub interval: Duration,
    /// Capture program
    pub program: String,
    /// Program arguments, `{path}` is replaced with the artifact path
    pub args: Vec<String>,
    /// Per-capture timeout, the child is killed when it fires
    pub timeout: Duration,
}

/// CaptureSource instance
pub struct CaptureSource {
    config: CaptureConfig,
    tx: mpsc::Sender<CaptureSignal>,
    /// Loop of the current run; None or finished when stopped
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureSource {
    /// Create new CaptureSource, creating the images directory if missing
    pub async fn new(config: CaptureConfig, tx: mpsc::Sender<CaptureSignal>) -> Result<Self> {
        fs::create_dir_all(&config.images_dir).await?;

        Ok(Self {
            config,
            tx,
            worker: Mutex::new(None),
        })
    }

    /// Start capture loop
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::warn!("Capture already running");
            return;
        }

        tracing::info!(
            interval_ms = self.config.interval.as_millis() as u64,
            program = %self.config.program,
            "Starting capture source"
        );

        let source = self.clone();
        *worker = Some(tokio::spawn(async move {
            let mut ticker = interval(source.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately, the device needs one interval to warm up
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if let Err(e) = source.capture_once().await {
                    tracing::error!(error = %e, "Capture cycle aborted");
                    break;
                }
            }

            tracing::info!("Capture source stopped");
        }));
    }

    /// Stop capture loop
    ///
    /// Aborts the current run; an in-flight capture child is killed on drop.
    pub async fn stop(&self) {
        if let Some(handle) = self.worker.lock().await.take() {
            handle.abort();
            tracing::info!("Stopping capture source");
        }
    }

    /// Whether a capture loop is active
    pub async fn is_running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Run one capture cycle
    ///
    /// Device failures are reported in the event; an error is returned only
    /// when the scheduler side of the channel is gone.
    pub async fn capture_once(&self) -> Result<CaptureEvent> {
        let started_at = Utc::now();
        let artifact_id = ArtifactId::from_time(started_at);
        let path = self.config.images_dir.join(artifact_id.as_str());

        self.send(CaptureSignal::Requested(artifact_id.clone())).await?;

        let event = match self.run_capture(&path).await {
            Ok(()) => {
                tracing::debug!(
                    artifact_id = %artifact_id,
                    path = %path.display(),
                    "Capture completed"
                );
                CaptureEvent::completed(artifact_id)
            }
            Err(e) => CaptureEvent::failed(artifact_id, e.to_string()),
        }
        .captured(started_at);

        self.send(CaptureSignal::Completed(event.clone())).await?;
        Ok(event)
    }

    async fn send(&self, signal: CaptureSignal) -> Result<()> {
        self.tx
            .send(signal)
            .await
            .map_err(|_| Error::Internal("settle scheduler channel closed".to_string()))
    }

    /// Invoke the capture program for one artifact
    ///
    /// kill_on_drop ensures the child is killed when the timeout cancels the wait.
    async fn run_capture(&self, path: &std::path::Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|a| a.replace(PATH_PLACEHOLDER, &path_str))
            .collect();

        let child = Command::new(&self.config.program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("{} spawn failed: {}", self.config.program, e)))?;

        match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Capture(format!(
                        "{} failed ({}): {}",
                        self.config.program,
                        output.status,
                        stderr.trim()
                    )));
                }
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Capture(format!(
                "{} execution failed: {}",
                self.config.program, e
            ))),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    program = %self.config.program,
                    "Capture timeout, process killed via kill_on_drop"
                );
                Err(Error::Capture(format!(
                    "{} timeout ({}ms)",
                    self.config.program,
                    self.config.timeout.as_millis()
                )))
            }
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}
