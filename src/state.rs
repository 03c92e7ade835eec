//! Application state
//!
//! Holds configuration and the shared components handed to the web layer

use crate::capture_source::{CaptureConfig, PATH_PLACEHOLDER};
use crate::error::{Error, Result};
use crate::realtime_hub::RealtimeHub;
use crate::settle_scheduler::{OverlapPolicy, DEFAULT_SETTLE_DELAY_MS};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default capture poll interval (10 seconds)
pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 10_000;
/// Default per-capture timeout
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 8_000;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server port
    pub port: u16,
    /// Server host
    pub host: String,
    /// Artifact directory, served at /images
    pub images_dir: PathBuf,
    /// Capture poll interval
    pub capture_interval_ms: u64,
    /// Delay between capture completion and broadcast
    pub settle_delay_ms: u64,
    /// Behaviour when a new artifact arrives while another is settling
    pub overlap_policy: OverlapPolicy,
    /// Capture program (raspistill)
    pub capture_program: String,
    /// Capture program arguments
    pub capture_args: Vec<String>,
    /// Per-capture timeout
    pub capture_timeout_ms: u64,
    /// Run the capture loop (disable to run the relay without a camera)
    pub capture_enabled: bool,
}

impl AppConfig {
    /// Load configuration from the environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overlap_policy = match lookup("SETTLE_OVERLAP_POLICY") {
            Some(v) => v.parse()?,
            None => OverlapPolicy::default(),
        };

        let capture_args = lookup("CAPTURE_ARGS")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| {
                ["-o", PATH_PLACEHOLDER, "-n", "-t", "1"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        let config = Self {
            port: parse_or("PORT", &lookup, 3000)?,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            images_dir: lookup("IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./public/images")),
            capture_interval_ms: parse_or("CAPTURE_INTERVAL_MS", &lookup, DEFAULT_CAPTURE_INTERVAL_MS)?,
            settle_delay_ms: parse_or("SETTLE_DELAY_MS", &lookup, DEFAULT_SETTLE_DELAY_MS)?,
            overlap_policy,
            capture_program: lookup("CAPTURE_PROGRAM").unwrap_or_else(|| "raspistill".to_string()),
            capture_args,
            capture_timeout_ms: parse_or("CAPTURE_TIMEOUT_MS", &lookup, DEFAULT_CAPTURE_TIMEOUT_MS)?,
            capture_enabled: parse_or("CAPTURE_ENABLED", &lookup, true)?,
        };

        if config.capture_interval_ms == 0 {
            return Err(Error::Config("CAPTURE_INTERVAL_MS must be greater than 0".to_string()));
        }

        Ok(config)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Settings for the CaptureSource
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            images_dir: self.images_dir.clone(),
            interval: Duration::from_millis(self.capture_interval_ms),
            program: self.capture_program.clone(),
            args: self.capture_args.clone(),
            timeout: Duration::from_millis(self.capture_timeout_ms),
        }
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{}={}: {}", key, raw, e))),
        None => Ok(default),
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// RealtimeHub (WebSocket sessions)
    pub realtime: Arc<RealtimeHub>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, realtime: Arc<RealtimeHub>) -> Self {
        Self {
            config,
            realtime,
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.settle_delay_ms, 10_000);
        assert_eq!(config.capture_interval_ms, 10_000);
        assert_eq!(config.overlap_policy, OverlapPolicy::Replace);
        assert_eq!(config.capture_program, "raspistill");
        assert!(config.capture_args.contains(&PATH_PLACEHOLDER.to_string()));
        assert!(config.capture_enabled);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("SETTLE_DELAY_MS", "0"),
            ("SETTLE_OVERLAP_POLICY", "queue"),
            ("CAPTURE_ARGS", "-o {path}  -w 640"),
            ("CAPTURE_ENABLED", "false"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(config.overlap_policy, OverlapPolicy::Queue);
        assert_eq!(config.capture_args, vec!["-o", "{path}", "-w", "640"]);
        assert!(!config.capture_enabled);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(load(&[("PORT", "abc")]), Err(Error::Config(_))));
        assert!(matches!(
            load(&[("SETTLE_OVERLAP_POLICY", "drop")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            load(&[("CAPTURE_INTERVAL_MS", "0")]),
            Err(Error::Config(_))
        ));
    }
}
