//! Sync recorder - stores published detections and presence events

use rumqttc::{AsyncClient, Event, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{SimError, SimResult};
use crate::presence::PresenceEvent;
use crate::sensors::RawDetection;
use crate::streaming::wire::{parse_topic, TopicKind, DETECTIONS_FILTER, PRESENCE_FILTER};
use crate::streaming::{mqtt_options, MqttConfig};

/// What became of one incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Detection { cow_id: Option<String>, new: bool },
    Presence { new: bool },
    Ignored,
}

/// Decodes messages and writes them to the store
pub struct Recorder {
    db: Arc<Database>,
    farm_id: String,
}

impl Recorder {
    pub fn new(db: Arc<Database>, farm_id: &str) -> Self {
        Self {
            db,
            farm_id: farm_id.to_string(),
        }
    }

    pub fn record(&self, topic: &str, payload: &[u8]) -> SimResult<Recorded> {
        match parse_topic(topic) {
            Some(TopicKind::Detections(_)) => {
                let detection: RawDetection = serde_json::from_slice(payload)?;
                let cow_id = self.db.cow_id_for_tag(&self.farm_id, &detection.rfid_tag)?;
                if cow_id.is_none() {
                    debug!("No cow with tag {} on farm {}", detection.rfid_tag, self.farm_id);
                }
                let new = self.db.store_detection(&detection, cow_id.as_deref())?;
                Ok(Recorded::Detection { cow_id, new })
            }
            Some(TopicKind::Presence(_)) => {
                let event: PresenceEvent = serde_json::from_slice(payload)?;
                let new = self.db.store_presence(&event)?;
                Ok(Recorded::Presence { new })
            }
            None => Ok(Recorded::Ignored),
        }
    }
}

/// Subscribe to every sensor's topics and record until `shutdown` fires.
/// Subscriptions are renewed on each CONNACK.
pub async fn run(
    config: &MqttConfig,
    recorder: Recorder,
    mut shutdown: broadcast::Receiver<()>,
) -> SimResult<()> {
    let options = mqtt_options(config, &format!("{}-sync", config.client_id));
    let (client, mut eventloop) = AsyncClient::new(options, config.request_capacity);
    let retry = Duration::from_millis(config.reconnect_interval_ms);
    let mut stored = 0u64;

    info!("Sync recorder connecting to {}:{}", config.broker, config.port);

    loop {
        tokio::select! {
            polled = eventloop.poll() => match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("MQTT connected, subscribing to sensor topics");
                    for filter in [DETECTIONS_FILTER, PRESENCE_FILTER] {
                        client.try_subscribe(filter, QoS::AtLeastOnce).map_err(|e| {
                            SimError::TransportConnection(format!("subscribe {}: {}", filter, e))
                        })?;
                    }
                }
                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    match recorder.record(&msg.topic, &msg.payload) {
                        Ok(Recorded::Ignored) => debug!("Ignoring message on {}", msg.topic),
                        Ok(_) => stored += 1,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => warn!("Dropping message on {}: {}", msg.topic, e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("{}", SimError::TransportConnection(e.to_string()));
                    tokio::time::sleep(retry).await;
                }
            },
            _ = shutdown.recv() => {
                info!("Sync recorder stopping after {} messages", stored);
                break;
            }
        }
    }

    if let Err(e) = client.disconnect().await {
        debug!("MQTT disconnect failed: {}", e);
    }
    Ok(())
}
