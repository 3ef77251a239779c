// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Synthetic RFID reads for demo/testing

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Builder;

use super::{Observation, RawDetection, RawPayload};
use crate::config::SimulationConfig;
use crate::herd::Cow;

/// Decides per cow and per tick whether the stall reader sensed the tag
pub struct DetectionGenerator {
    detection_probability: f64,
    exit_probability: f64,
    signal_min: i32,
    signal_max: i32,
    rng: ChaCha8Rng,
}

impl DetectionGenerator {
    /// Build from validated config. `seed` fixes the random stream.
    pub fn new(config: &SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    pub fn with_rng(config: &SimulationConfig, rng: ChaCha8Rng) -> Self {
        Self {
            detection_probability: config.detection_probability,
            exit_probability: config.exit_probability,
            signal_min: config.signal_strength_min,
            signal_max: config.signal_strength_max,
            rng,
        }
    }

    /// Roll one tick for `cow`. The exit roll is only taken when the cow is
    /// present and went unsensed.
    pub fn observe(&mut self, cow: &Cow, present: bool, now: DateTime<Utc>) -> Observation {
        if self.rng.gen_bool(self.detection_probability) {
            return Observation::Detected(self.detection(cow, now));
        }

        let exit = present && self.rng.gen_bool(self.exit_probability);
        Observation::Missed { exit }
    }

    fn detection(&mut self, cow: &Cow, now: DateTime<Utc>) -> RawDetection {
        let signal_strength = self.rng.gen_range(self.signal_min..self.signal_max);
        let payload = RawPayload {
            raw: cow.tag.clone(),
            rssi: signal_strength,
            timestamp: now.timestamp_millis(),
        };

        RawDetection {
            id: format!("det-{}", self.next_uuid()),
            sensor_id: cow.sensor_id.clone(),
            rfid_tag: cow.tag.clone(),
            timestamp: now,
            signal_strength,
            // Plain struct of strings and integers
            raw_data: serde_json::to_string(&payload).unwrap_or_default(),
        }
    }

    fn next_uuid(&mut self) -> uuid::Uuid {
        Builder::from_random_bytes(self.rng.gen()).into_uuid()
    }
}
