//! Streaming module - MQTT publishing of detections and presence events

mod mqtt;
mod memory;
pub mod wire;

pub use mqtt::*;
pub use memory::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SimResult;
use crate::presence::PresenceEvent;
use crate::sensors::RawDetection;

/// MQTT broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    /// Pause between reconnect attempts
    pub reconnect_interval_ms: u64,
    /// How long startup waits for the first CONNACK
    pub connect_timeout_ms: u64,
    /// Outgoing request queue length
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "cosva-sensor-simulator".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            reconnect_interval_ms: 5000,
            connect_timeout_ms: 10_000,
            request_capacity: 100,
        }
    }
}

/// Delivers detections and presence transitions to their per-sensor topics.
///
/// Delivery is at-least-once. A publish that returns `Ok` has been handed
/// to the transport; [`EventPublisher::flush`] waits for the broker to
/// acknowledge everything handed over so far.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Send an already-encoded message
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> SimResult<()>;

    async fn publish_detection(&self, sensor_id: &str, detection: &RawDetection) -> SimResult<()> {
        let payload = serde_json::to_vec(detection)?;
        self.publish(&wire::detections_topic(sensor_id), payload).await
    }

    async fn publish_presence(&self, sensor_id: &str, event: &PresenceEvent) -> SimResult<()> {
        let payload = serde_json::to_vec(event)?;
        self.publish(&wire::presence_topic(sensor_id), payload).await
    }

    /// Whether the transport currently has a live connection
    fn is_connected(&self) -> bool {
        true
    }

    /// Wait up to `timeout` for outstanding acknowledgements. Returns how
    /// many messages are still unacknowledged.
    async fn flush(&self, _timeout: Duration) -> usize {
        0
    }

    /// Release the transport
    async fn close(&self) -> SimResult<()> {
        Ok(())
    }
}
