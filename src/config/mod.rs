// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Configuration module

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{SimError, SimResult};
use crate::streaming::MqttConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Farm the herd belongs to
    #[serde(default)]
    pub farm: FarmConfig,

    /// Broker connection
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Detection and presence simulation
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Stalls and the sensor mounted on each
    #[serde(default)]
    pub stalls: Vec<StallConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            farm: FarmConfig::default(),
            mqtt: MqttConfig::default(),
            database: DatabaseConfig::default(),
            simulation: SimulationConfig::default(),
            stalls: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {:?}", path))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("parsing config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("cosva"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Check every bound. Runs after every load and after overrides.
    pub fn validate(&self) -> SimResult<()> {
        if self.farm.id.trim().is_empty() {
            return Err(SimError::config("farm.id must not be empty"));
        }
        if self.mqtt.broker.trim().is_empty() {
            return Err(SimError::config("mqtt.broker must not be empty"));
        }
        self.simulation.validate()?;
        validate_stalls(&self.stalls)
    }
}

/// Farm identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmConfig {
    pub id: String,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            id: "farm-001".to_string(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database path
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/cosva.db"),
        }
    }
}

/// Simulation tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Shortest delay between ticks
    #[serde(alias = "detectionIntervalMin")]
    pub detection_interval_min_ms: u64,

    /// Longest delay between ticks
    #[serde(alias = "detectionIntervalMax")]
    pub detection_interval_max_ms: u64,

    /// Chance a cow is sensed on a tick
    #[serde(alias = "detectionProbability")]
    pub detection_probability: f64,

    /// Chance a present, unsensed cow leaves on a tick
    #[serde(alias = "exitProbability")]
    pub exit_probability: f64,

    /// Weakest signal in dBm (inclusive)
    pub signal_strength_min: i32,

    /// Strongest signal in dBm (exclusive)
    pub signal_strength_max: i32,

    /// How long shutdown waits for outstanding acknowledgements
    pub shutdown_timeout_ms: u64,

    /// Fixed RNG seed for reproducible runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            detection_interval_min_ms: 5_000,
            detection_interval_max_ms: 15_000,
            detection_probability: 0.7,
            exit_probability: 0.1,
            signal_strength_min: -60,
            signal_strength_max: -40,
            shutdown_timeout_ms: 5_000,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.detection_interval_min_ms == 0 {
            return Err(SimError::config("detection_interval_min_ms must be positive"));
        }
        if self.detection_interval_min_ms > self.detection_interval_max_ms {
            return Err(SimError::config(format!(
                "detection_interval_min_ms ({}) exceeds detection_interval_max_ms ({})",
                self.detection_interval_min_ms, self.detection_interval_max_ms
            )));
        }
        check_probability("detection_probability", self.detection_probability)?;
        check_probability("exit_probability", self.exit_probability)?;
        if self.signal_strength_min >= self.signal_strength_max {
            return Err(SimError::config(format!(
                "signal strength range [{}, {}) is empty",
                self.signal_strength_min, self.signal_strength_max
            )));
        }
        if self.signal_strength_max > 0 {
            return Err(SimError::config("signal_strength_max must not be above 0 dBm"));
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Apply the `SIM_INTERVAL_MIN`, `SIM_INTERVAL_MAX` (seconds),
    /// `DETECTION_PROB` and `EXIT_PROB` overrides.
    pub fn apply_env<F>(&mut self, lookup: F) -> SimResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = parse_var::<u64, _>(&lookup, "SIM_INTERVAL_MIN")? {
            self.detection_interval_min_ms = secs_to_ms("SIM_INTERVAL_MIN", secs)?;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "SIM_INTERVAL_MAX")? {
            self.detection_interval_max_ms = secs_to_ms("SIM_INTERVAL_MAX", secs)?;
        }
        if let Some(p) = parse_var::<f64, _>(&lookup, "DETECTION_PROB")? {
            self.detection_probability = p;
        }
        if let Some(p) = parse_var::<f64, _>(&lookup, "EXIT_PROB")? {
            self.exit_probability = p;
        }
        self.validate()
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> SimResult<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SimError::config(format!("{} has an invalid value: {:?}", name, raw))),
    }
}

fn secs_to_ms(name: &str, secs: u64) -> SimResult<u64> {
    secs.checked_mul(1000)
        .ok_or_else(|| SimError::config(format!("{} is too large: {} s", name, secs)))
}

fn check_probability(name: &str, value: f64) -> SimResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(SimError::config(format!("{} must be within [0, 1], got {}", name, value)));
    }
    Ok(())
}

/// A stall as declared in config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StallConfig {
    pub number: u32,
    pub sensor_id: String,
    #[serde(default = "default_stall_status")]
    pub status: String,
}

fn default_stall_status() -> String {
    "available".to_string()
}

impl StallConfig {
    pub fn new(number: u32, sensor_id: &str) -> Self {
        Self {
            number,
            sensor_id: sensor_id.to_string(),
            status: default_stall_status(),
        }
    }
}

pub(crate) fn validate_stalls(stalls: &[StallConfig]) -> SimResult<()> {
    let mut numbers = HashSet::new();
    let mut sensors = HashSet::new();
    for stall in stalls {
        if stall.sensor_id.trim().is_empty() {
            return Err(SimError::config(format!("stall {} has no sensor_id", stall.number)));
        }
        if !numbers.insert(stall.number) {
            return Err(SimError::config(format!("stall number {} declared twice", stall.number)));
        }
        if !sensors.insert(stall.sensor_id.as_str()) {
            return Err(SimError::config(format!(
                "sensor {} is mounted on more than one stall",
                stall.sensor_id
            )));
        }
    }
    Ok(())
}
