//! In-process publisher for dry runs and tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use super::EventPublisher;
use crate::error::{SimError, SimResult};
use crate::presence::PresenceEvent;
use crate::sensors::RawDetection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

/// Records every publish in order. Can be told to fail or to look
/// disconnected.
pub struct MemoryPublisher {
    messages: Mutex<VecDeque<PublishedMessage>>,
    capacity: Option<usize>,
    failing: AtomicBool,
    connected: AtomicBool,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            capacity: None,
            failing: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }
    }

    /// Keep only the newest `capacity` messages
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn detections(&self) -> Vec<RawDetection> {
        self.decode_matching("/detections")
    }

    pub fn presence_events(&self) -> Vec<PresenceEvent> {
        self.decode_matching("/presence")
    }

    fn decode_matching<T: DeserializeOwned>(&self, suffix: &str) -> Vec<T> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic.ends_with(suffix))
            .filter_map(|m| m.decode().ok())
            .collect()
    }
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> SimResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SimError::Publish {
                topic: topic.to_string(),
                reason: "rejected by memory publisher".to_string(),
            });
        }

        debug!(topic, bytes = payload.len(), "publish");
        let mut messages = self.messages.lock();
        messages.push_back(PublishedMessage {
            topic: topic.to_string(),
            payload,
        });
        if let Some(cap) = self.capacity {
            while messages.len() > cap {
                messages.pop_front();
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceStatus;
    use chrono::{TimeZone, Utc};

    fn detection() -> RawDetection {
        RawDetection {
            id: "det-1".to_string(),
            sensor_id: "RFID01".to_string(),
            rfid_tag: "RFID001".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            signal_strength: -48,
            raw_data: r#"{"raw":"RFID001","rssi":-48,"timestamp":1735689600000}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn test_detection_lands_on_sensor_topic() {
        let publisher = MemoryPublisher::new();
        publisher.publish_detection("RFID01", &detection()).await.unwrap();

        let messages = publisher.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "sensors/rfid/RFID01/detections");

        let json: serde_json::Value = messages[0].decode().unwrap();
        assert_eq!(json["rfid_tag"], "RFID001");
        assert_eq!(json["signal_strength"], -48);
        assert_eq!(json["timestamp"], "2025-01-01T00:00:00.000Z");
        assert!(json["raw_data"].is_string());

        assert_eq!(publisher.detections(), vec![detection()]);
    }

    #[tokio::test]
    async fn test_presence_lands_on_sensor_topic() {
        let publisher = MemoryPublisher::new();
        let event = PresenceEvent {
            id: "pres-1".to_string(),
            sensor_id: "RFID03".to_string(),
            cow_id: "cow-3".to_string(),
            status: PresenceStatus::Entered,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            duration: 0,
        };
        publisher.publish_presence("RFID03", &event).await.unwrap();

        assert_eq!(publisher.messages()[0].topic, "sensors/rfid/RFID03/presence");
        assert_eq!(publisher.presence_events(), vec![event]);
    }

    #[tokio::test]
    async fn test_failing_publisher_records_nothing() {
        let publisher = MemoryPublisher::new();
        publisher.set_failing(true);

        let err = publisher.publish_detection("RFID01", &detection()).await.unwrap_err();
        assert!(matches!(err, SimError::Publish { .. }));
        assert!(publisher.is_empty());
    }

    #[tokio::test]
    async fn test_bounded_keeps_newest() {
        let publisher = MemoryPublisher::bounded(2);
        for i in 0..5u8 {
            publisher.publish("t", vec![i]).await.unwrap();
        }
        let payloads: Vec<_> = publisher.messages().into_iter().map(|m| m.payload).collect();
        assert_eq!(payloads, vec![vec![3], vec![4]]);
    }
}
