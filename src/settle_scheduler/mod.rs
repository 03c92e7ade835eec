//! SettleScheduler - Delay Between Capture Completion and Broadcast
//!
//! ## Responsibilities
//!
//! - Track the artifact the CaptureSource most recently requested
//! - Filter completion signals (unrelated artifacts, device failures)
//! - Hold each accepted artifact for the settle delay, then publish it via RealtimeHub
//!
//! The device may still be finalizing the file when it reports completion,
//! so nothing is published before `settle_delay` has elapsed since receipt.
//!
//! All signal handling, timer expiry and publishing run on one task, so a
//! publish always finishes before the next signal is looked at.

use crate::capture_source::{ArtifactId, CaptureEvent};
use crate::error::{Error, Result};
use crate::realtime_hub::RealtimeHub;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Default settle delay (10 seconds)
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 10_000;

/// Messages from the CaptureSource
#[derive(Debug, Clone)]
pub enum CaptureSignal {
    /// A capture was requested; this artifact becomes the expected one
    Requested(ArtifactId),
    /// The device reported completion (or failure)
    Completed(CaptureEvent),
}

/// What to do when a new artifact settles while another is still pending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Drop the earlier pending artifact, time the new one from its receipt
    #[default]
    Replace,
    /// Keep both, each published at its own deadline
    Queue,
}

impl OverlapPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlapPolicy::Replace => "replace",
            OverlapPolicy::Queue => "queue",
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlapPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(OverlapPolicy::Replace),
            "queue" => Ok(OverlapPolicy::Queue),
            other => Err(Error::Config(format!(
                "unknown settle overlap policy '{}' (expected 'replace' or 'queue')",
                other
            ))),
        }
    }
}

/// Result of handling one completion signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleDecision {
    /// Not the expected artifact
    Ignored,
    /// Device reported a failure, nothing scheduled
    Failed,
    /// Settle timer started
    Scheduled,
    /// Same artifact already settling
    AlreadyPending,
    /// Earlier pending artifact dropped in favour of this one
    Replaced { dropped: ArtifactId },
    /// Appended behind other pending artifacts
    Queued,
}

/// Artifact waiting for its settle deadline
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingArtifact {
    artifact_id: ArtifactId,
    deadline: Instant,
}

/// SettleScheduler instance
pub struct SettleScheduler {
    hub: Arc<RealtimeHub>,
    settle_delay: Duration,
    policy: OverlapPolicy,
    expected: Option<ArtifactId>,
    pending: VecDeque<PendingArtifact>,
}

impl SettleScheduler {
    /// Create new SettleScheduler
    pub fn new(hub: Arc<RealtimeHub>, settle_delay: Duration, policy: OverlapPolicy) -> Self {
        Self {
            hub,
            settle_delay,
            policy,
            expected: None,
            pending: VecDeque::new(),
        }
    }

    /// Spawn the scheduler loop on its own task
    pub fn spawn(self, rx: mpsc::Receiver<CaptureSignal>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    /// Scheduler loop
    ///
    /// Ends once the signal channel is closed and every pending artifact has
    /// been published.
    pub async fn run(mut self, mut rx: mpsc::Receiver<CaptureSignal>) {
        tracing::info!(
            settle_delay_ms = self.settle_delay.as_millis() as u64,
            policy = %self.policy,
            "Settle scheduler started"
        );

        let mut closed = false;

        loop {
            let deadline = self.pending.front().map(|p| p.deadline);

            if closed && deadline.is_none() {
                break;
            }

            tokio::select! {
                signal = rx.recv(), if !closed => match signal {
                    Some(CaptureSignal::Requested(artifact_id)) => self.expect(artifact_id),
                    Some(CaptureSignal::Completed(event)) => {
                        self.on_capture_event(event, Instant::now());
                    }
                    None => {
                        tracing::debug!(pending = self.pending.len(), "Capture channel closed");
                        closed = true;
                    }
                },
                _ = wait_for(deadline) => {
                    self.publish_due(Instant::now()).await;
                }
            }
        }

        tracing::info!("Settle scheduler stopped");
    }

    /// Set the artifact the next completion signal must match
    pub fn expect(&mut self, artifact_id: ArtifactId) {
        tracing::debug!(artifact_id = %artifact_id, "Expecting capture");
        self.expected = Some(artifact_id);
    }

    /// Handle a completion signal received at `now`
    pub fn on_capture_event(&mut self, event: CaptureEvent, now: Instant) -> SettleDecision {
        if self.expected.as_ref() != Some(&event.artifact_id) {
            tracing::debug!(
                artifact_id = %event.artifact_id,
                expected = ?self.expected.as_ref().map(|a| a.as_str()),
                "Ignoring capture for unexpected artifact"
            );
            return SettleDecision::Ignored;
        }

        if let Some(failure) = &event.failure {
            tracing::warn!(
                artifact_id = %event.artifact_id,
                error = %failure,
                "Capture failed, nothing to broadcast"
            );
            return SettleDecision::Failed;
        }

        if self.pending.iter().any(|p| p.artifact_id == event.artifact_id) {
            tracing::debug!(artifact_id = %event.artifact_id, "Artifact already settling");
            return SettleDecision::AlreadyPending;
        }

        let captured_at = event.captured_at;
        let entry = PendingArtifact {
            artifact_id: event.artifact_id,
            deadline: now + self.settle_delay,
        };

        let decision = if self.pending.is_empty() {
            SettleDecision::Scheduled
        } else {
            match self.policy {
                OverlapPolicy::Replace => {
                    let dropped = self.pending.drain(..).last().map(|p| p.artifact_id);
                    match dropped {
                        Some(dropped) => {
                            tracing::warn!(
                                artifact_id = %entry.artifact_id,
                                dropped = %dropped,
                                "Replacing artifact that had not settled yet"
                            );
                            SettleDecision::Replaced { dropped }
                        }
                        None => SettleDecision::Scheduled,
                    }
                }
                OverlapPolicy::Queue => SettleDecision::Queued,
            }
        };

        tracing::info!(
            artifact_id = %entry.artifact_id,
            captured_at = %captured_at.to_rfc3339(),
            settle_delay_ms = self.settle_delay.as_millis() as u64,
            pending = self.pending.len() + 1,
            "Artifact settling"
        );
        self.pending.push_back(entry);

        decision
    }

    /// Publish every artifact whose deadline has passed, oldest first
    pub async fn publish_due(&mut self, now: Instant) -> Vec<ArtifactId> {
        let mut published = Vec::new();

        while self.pending.front().is_some_and(|p| p.deadline <= now) {
            let Some(entry) = self.pending.pop_front() else {
                break;
            };
            let report = self.hub.publish(entry.artifact_id.as_str()).await;
            tracing::info!(
                artifact_id = %entry.artifact_id,
                delivered = report.delivered,
                dropped = report.dropped,
                "Artifact settled and published"
            );
            published.push(entry.artifact_id);
        }

        published
    }

    /// Artifacts still waiting for their deadline
    pub fn pending(&self) -> Vec<ArtifactId> {
        self.pending.iter().map(|p| p.artifact_id.clone()).collect()
    }

    pub fn expected(&self) -> Option<&ArtifactId> {
        self.expected.as_ref()
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
