// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Cosva - stall presence simulator for RFID-tagged herds
//!
//! Simulates the RFID reader mounted on each stall of a farm, derives
//! occupancy transitions from the raw reads and publishes both over MQTT:
//! - Seedable detection generator with jittered ticks
//! - Presence state machine (ENTERED / STILL_PRESENT / LEFT)
//! - At-least-once MQTT publishing with acknowledgement tracking
//! - Sqlite farm records and a sync recorder for the published events
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌───────────┐
//! │   Herd   │ → │ Detection  │ → │   Presence   │ → │   Event   │ → sync,
//! │ Registry │   │ Generator  │   │   Tracker    │   │ Publisher │   dashboards
//! └──────────┘   └────────────┘   └──────────────┘   └───────────┘
//!       ↑               ↑ tick driver (Simulation) ↑
//! ┌──────────┐   ┌────────────┐
//! │ Database │   │   Stalls   │
//! └──────────┘   └────────────┘
//! ```

pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod herd;
pub mod presence;
pub mod sensors;
pub mod stalls;
pub mod status;
pub mod streaming;
pub mod sync;

// Re-exports for convenience
pub use config::Config;
pub use self::core::{Simulation, SimulationStats};
pub use error::{SimError, SimResult};
pub use herd::{Cow, Herd};
pub use presence::{PresenceEvent, PresenceState, PresenceStatus, PresenceTracker};
pub use sensors::{DetectionGenerator, Observation, RawDetection};
pub use streaming::{EventPublisher, MemoryPublisher, MqttPublisher};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
