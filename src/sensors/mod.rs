//! Sensor module - RFID detections and their simulation

mod traits;
mod simulator;

pub use traits::{Observation, RawDetection, RawPayload};
pub use simulator::DetectionGenerator;
