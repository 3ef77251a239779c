//! Core module - the tick driver that runs the herd simulation

mod engine;
mod scheduler;

pub use engine::{Simulation, TickReport};
pub use scheduler::TickSchedule;

use serde::{Deserialize, Serialize};

/// Counters kept across a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub ticks: u64,
    /// Ticks not evaluated because the transport was down
    pub skipped_ticks: u64,
    pub detections: u64,
    pub presence_events: u64,
    pub publish_failures: u64,
    pub unknown_entities: u64,
}
