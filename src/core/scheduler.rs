// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Jittered tick schedule

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tracing::debug;

use crate::config::SimulationConfig;

/// Draws a fresh delay in `[min, max]` before every tick
pub struct TickSchedule {
    min_ms: u64,
    max_ms: u64,
    rng: ChaCha8Rng,
}

impl TickSchedule {
    pub fn new(config: &SimulationConfig) -> Self {
        // Own stream, offset from the generator's seed
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(1)),
            None => ChaCha8Rng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    pub fn with_rng(config: &SimulationConfig, rng: ChaCha8Rng) -> Self {
        Self {
            min_ms: config.detection_interval_min_ms,
            max_ms: config.detection_interval_max_ms,
            rng,
        }
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        (Duration::from_millis(self.min_ms), Duration::from_millis(self.max_ms))
    }

    pub fn next_delay(&mut self) -> Duration {
        let ms = self.rng.gen_range(self.min_ms..=self.max_ms);
        debug!("Next tick in {} ms", ms);
        Duration::from_millis(ms)
    }
}
