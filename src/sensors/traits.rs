// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Detection types shared by the generator, tracker and publishers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::streaming::wire::iso_millis;

/// A single RFID read, exactly as published on the detections topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDetection {
    pub id: String,
    pub sensor_id: String,
    pub rfid_tag: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    /// dBm, always negative
    pub signal_strength: i32,
    /// JSON-encoded [`RawPayload`]
    pub raw_data: String,
}

/// Reader frame carried inside `raw_data`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPayload {
    pub raw: String,
    pub rssi: i32,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl RawDetection {
    pub fn payload(&self) -> serde_json::Result<RawPayload> {
        serde_json::from_str(&self.raw_data)
    }
}

/// What the generator saw for one cow on one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Detected(RawDetection),
    /// No read. `exit` is the outcome of the exit roll, which only happens
    /// for cows that are currently present.
    Missed { exit: bool },
}

impl Observation {
    pub fn detection(&self) -> Option<&RawDetection> {
        match self {
            Observation::Detected(d) => Some(d),
            Observation::Missed { .. } => None,
        }
    }
}
