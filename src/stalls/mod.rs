//! Stall registry - the stalls of a farm and the reader mounted on each

use std::collections::HashMap;
use tracing::info;

use crate::config::{validate_stalls, StallConfig};
use crate::db::Database;
use crate::error::{SimError, SimResult};
use crate::herd::{sensor_for_stall, Herd};

/// Fewest stalls used when config declares none
pub const DEFAULT_STALL_COUNT: u32 = 6;

/// Stalls `1..=count` with sensors `RFID01..`
pub fn default_stalls(count: u32) -> Vec<StallConfig> {
    (1..=count)
        .map(|n| StallConfig::new(n, &sensor_for_stall(n)))
        .collect()
}

/// Validated stalls, addressable by sensor id
#[derive(Debug, Clone)]
pub struct StallRegistry {
    stalls: Vec<StallConfig>,
    by_sensor: HashMap<String, usize>,
}

impl StallRegistry {
    pub fn new(stalls: Vec<StallConfig>) -> SimResult<Self> {
        validate_stalls(&stalls)?;
        let by_sensor = stalls
            .iter()
            .enumerate()
            .map(|(i, s)| (s.sensor_id.clone(), i))
            .collect();
        Ok(Self { stalls, by_sensor })
    }

    /// Validate the configured stalls and record them for the farm. With
    /// none configured, one default stall per cow is used, never fewer
    /// than [`DEFAULT_STALL_COUNT`].
    pub fn initialize(
        configured: &[StallConfig],
        db: &Database,
        farm_id: &str,
        herd: &Herd,
    ) -> SimResult<Self> {
        let stalls = if configured.is_empty() {
            let count = DEFAULT_STALL_COUNT.max(herd.len() as u32);
            info!("No stalls configured, using {} default stalls", count);
            default_stalls(count)
        } else {
            configured.to_vec()
        };

        let registry = Self::new(stalls)?;
        for stall in &registry.stalls {
            db.upsert_stall(farm_id, stall)?;
        }

        info!("Stall registry initialized with {} stalls", registry.len());
        Ok(registry)
    }

    pub fn stalls(&self) -> &[StallConfig] {
        &self.stalls
    }

    pub fn by_sensor(&self, sensor_id: &str) -> Option<&StallConfig> {
        self.by_sensor.get(sensor_id).map(|&i| &self.stalls[i])
    }

    pub fn len(&self) -> usize {
        self.stalls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stalls.is_empty()
    }

    /// Every cow's sensor must sit on the stall the cow is bound to
    pub fn check_herd(&self, herd: &Herd) -> SimResult<()> {
        for cow in herd.cows() {
            let stall = self.by_sensor(&cow.sensor_id).ok_or_else(|| {
                SimError::config(format!(
                    "{} ({}) reads from sensor {}, which is not mounted on any stall; \
                     add it to the [[stalls]] table",
                    cow.name, cow.id, cow.sensor_id
                ))
            })?;
            if stall.number != cow.stall {
                return Err(SimError::config(format!(
                    "{} is bound to stall {} but sensor {} is on stall {}",
                    cow.name, cow.stall, cow.sensor_id, stall.number
                )));
            }
        }
        Ok(())
    }
}
