//! Capture Relay Library
//!
//! Relays camera captures to connected browsers.
//!
//! ## Architecture
//!
//! 1. CaptureSource - Still capture on a fixed interval
//! 2. SettleScheduler - Filters completion signals, waits the settle delay
//! 3. RealtimeHub - Observer session registry and fan-out
//! 4. WebAPI - Observer page, WebSocket endpoint, artifact serving
//!
//! ```text
//! CaptureSource --CaptureSignal--> SettleScheduler --publish--> RealtimeHub ==> sessions
//! ```

pub mod capture_source;
pub mod settle_scheduler;
pub mod realtime_hub;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
