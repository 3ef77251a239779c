// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! MQTT client for streaming data

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{EventPublisher, MqttConfig};
use crate::error::{SimError, SimResult};

/// Build client options from config, under the given client id
pub fn mqtt_options(config: &MqttConfig, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, &config.broker, config.port);

    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_clean_session(true);

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    options
}

/// Connection and acknowledgement bookkeeping shared with the event loop
struct Link {
    connected: watch::Sender<bool>,
    /// Handed to the client but not yet PUBACKed
    unacked: AtomicUsize,
}

impl Link {
    fn settle(&self) {
        let _ = self
            .unacked
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// QoS 1 publisher over rumqttc
pub struct MqttPublisher {
    client: AsyncClient,
    config: MqttConfig,
    link: Arc<Link>,
    eventloop: JoinHandle<()>,
}

impl MqttPublisher {
    /// Start the event loop and wait for the first CONNACK
    pub async fn connect(config: &MqttConfig) -> SimResult<Self> {
        let options = mqtt_options(config, &config.client_id);
        let (client, eventloop) = AsyncClient::new(options, config.request_capacity);
        let (connected, mut connected_rx) = watch::channel(false);
        let link = Arc::new(Link {
            connected,
            unacked: AtomicUsize::new(0),
        });

        let handle = tokio::spawn(drive(
            eventloop,
            link.clone(),
            Duration::from_millis(config.reconnect_interval_ms),
        ));

        let wait = connected_rx.wait_for(|up| *up);
        match tokio::time::timeout(Duration::from_millis(config.connect_timeout_ms), wait).await {
            Ok(Ok(_)) => {}
            _ => {
                handle.abort();
                return Err(SimError::TransportConnection(format!(
                    "no CONNACK from {}:{} within {} ms",
                    config.broker, config.port, config.connect_timeout_ms
                )));
            }
        }

        info!("MQTT client connected to {}:{}", config.broker, config.port);
        Ok(Self {
            client,
            config: config.clone(),
            link,
            eventloop: handle,
        })
    }

    pub fn unacked(&self) -> usize {
        self.link.unacked.load(Ordering::Acquire)
    }
}

async fn drive(mut eventloop: EventLoop, link: Arc<Link>, retry: Duration) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                link.connected.send_replace(true);
                info!("MQTT connected");
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                link.settle();
                debug!(pkid = ack.pkid, "MQTT publish acknowledged");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                link.connected.send_replace(false);
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let err = SimError::TransportConnection(e.to_string());
                if link.connected.send_replace(false) {
                    warn!("{}; retrying every {:?}", err, retry);
                } else {
                    debug!("{}", err);
                }
                tokio::time::sleep(retry).await;
            }
        }
    }
}

#[async_trait]
impl EventPublisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> SimResult<()> {
        self.link.unacked.fetch_add(1, Ordering::AcqRel);

        if let Err(e) = self.client.publish(topic, QoS::AtLeastOnce, false, payload).await {
            self.link.settle();
            return Err(SimError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            });
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.link.connected.borrow()
    }

    async fn flush(&self, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let pending = self.unacked();
            if pending == 0 || tokio::time::Instant::now() >= deadline {
                return pending;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    async fn close(&self) -> SimResult<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| SimError::TransportConnection(format!("disconnect failed: {}", e)))?;

        info!("MQTT client for {}:{} closed", self.config.broker, self.config.port);
        Ok(())
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.eventloop.abort();
    }
}
