//! Tick driver - evaluates every cow on each jittered tick

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{SimulationStats, TickSchedule};
use crate::config::SimulationConfig;
use crate::error::SimResult;
use crate::herd::Herd;
use crate::presence::{PresenceEvent, PresenceStatus, PresenceTracker};
use crate::sensors::DetectionGenerator;
use crate::streaming::EventPublisher;

/// Outcome of one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Transport was down, nothing evaluated
    pub skipped: bool,
    pub detections: usize,
    pub events: Vec<PresenceEvent>,
    pub publish_failures: usize,
}

/// Owns the herd, the presence state and the publisher for one run
pub struct Simulation {
    herd: Herd,
    generator: DetectionGenerator,
    tracker: PresenceTracker,
    schedule: TickSchedule,
    publisher: Arc<dyn EventPublisher>,
    stats: SimulationStats,
}

impl Simulation {
    pub fn new(herd: Herd, config: &SimulationConfig, publisher: Arc<dyn EventPublisher>) -> Self {
        let tracker = PresenceTracker::new(&herd);
        Self::with_parts(
            herd,
            tracker,
            DetectionGenerator::new(config),
            TickSchedule::new(config),
            publisher,
        )
    }

    pub fn with_parts(
        herd: Herd,
        tracker: PresenceTracker,
        generator: DetectionGenerator,
        schedule: TickSchedule,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            herd,
            generator,
            tracker,
            schedule,
            publisher,
            stats: SimulationStats::default(),
        }
    }

    pub fn herd(&self) -> &Herd {
        &self.herd
    }

    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Evaluate every cow once, in herd order. Each cow's state is updated
    /// before its messages are handed to the publisher; a failed publish
    /// is counted and logged but the state change stands.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let Self {
            herd,
            generator,
            tracker,
            publisher,
            stats,
            ..
        } = self;
        let mut report = TickReport::default();

        if !publisher.is_connected() {
            stats.skipped_ticks += 1;
            warn!("Transport disconnected, skipping tick");
            report.skipped = true;
            return report;
        }
        stats.ticks += 1;

        for cow in herd.cows() {
            let present = match tracker.is_present(&cow.id) {
                Ok(present) => present,
                Err(e) => {
                    stats.unknown_entities += 1;
                    error!("Skipping {}: {}", cow.name, e);
                    continue;
                }
            };

            let observation = generator.observe(cow, present, now);
            let transition = match tracker.observe(cow, &observation, now) {
                Ok(transition) => transition,
                Err(e) => {
                    stats.unknown_entities += 1;
                    error!("Skipping {}: {}", cow.name, e);
                    continue;
                }
            };

            if let Some(detection) = observation.detection() {
                stats.detections += 1;
                report.detections += 1;
                info!("Detection: {} ({}) on sensor {}", cow.name, cow.tag, cow.sensor_id);

                if let Err(e) = publisher.publish_detection(&cow.sensor_id, detection).await {
                    stats.publish_failures += 1;
                    report.publish_failures += 1;
                    warn!("{}", e);
                }
            }

            if let Some(event) = transition {
                stats.presence_events += 1;
                match event.status {
                    PresenceStatus::Entered => {
                        info!("Entered: {} entered stall {}", cow.name, cow.stall)
                    }
                    PresenceStatus::Left => {
                        info!("Left: {} left stall {} after {}s", cow.name, cow.stall, event.duration)
                    }
                    PresenceStatus::StillPresent => {
                        debug!("Still present: {} ({}s since last read)", cow.name, event.duration)
                    }
                }

                if let Err(e) = publisher.publish_presence(&cow.sensor_id, &event).await {
                    stats.publish_failures += 1;
                    report.publish_failures += 1;
                    warn!("{}", e);
                }
                report.events.push(event);
            }
        }

        report
    }

    /// Tick on a re-drawn interval until `shutdown` fires
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> SimResult<()> {
        let (min, max) = self.schedule.bounds();
        info!("Starting sensor simulation...");
        info!("Cows configured: {}", self.herd.len());
        info!("Simulation interval: {:?}-{:?}", min, max);

        if self.herd.is_empty() {
            warn!("No cows loaded, ticks will publish nothing");
        }

        loop {
            let delay = self.schedule.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.tick(Utc::now()).await;
                }
                _ = shutdown.recv() => {
                    info!("Stopping simulation...");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Wait for outstanding acknowledgements, then release the transport
    pub async fn finish(&self, timeout: Duration) -> SimResult<()> {
        let pending = self.publisher.flush(timeout).await;
        if pending > 0 {
            warn!("{} messages still unacknowledged after {:?}", pending, timeout);
        }
        self.publisher.close().await?;

        info!(
            "Simulation finished: {} ticks, {} detections, {} presence events, {} publish failures",
            self.stats.ticks,
            self.stats.detections,
            self.stats.presence_events,
            self.stats.publish_failures
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::herd::Cow;
    use crate::streaming::MemoryPublisher;
    use chrono::TimeZone;

    fn cows(n: u32) -> Herd {
        Herd::new(
            (1..=n)
                .map(|i| Cow {
                    id: format!("cow-{}", i),
                    name: format!("Cow {}", i),
                    tag: format!("RFID{:03}", i),
                    sensor_id: format!("RFID{:02}", i),
                    stall: i,
                })
                .collect(),
        )
    }

    fn config(detect: f64, exit: f64) -> SimulationConfig {
        SimulationConfig {
            detection_interval_min_ms: 10,
            detection_interval_max_ms: 20,
            detection_probability: detect,
            exit_probability: exit,
            seed: Some(5),
            ..SimulationConfig::default()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[tokio::test]
    async fn test_always_detected_enters_then_stays() {
        let publisher = Arc::new(MemoryPublisher::new());
        let mut sim = Simulation::new(cows(2), &config(1.0, 0.0), publisher.clone());

        let first = sim.tick(at(0)).await;
        assert_eq!(first.detections, 2);
        assert!(first.events.iter().all(|e| e.status == PresenceStatus::Entered));

        let second = sim.tick(at(30)).await;
        assert!(second
            .events
            .iter()
            .all(|e| e.status == PresenceStatus::StillPresent && e.duration == 30));

        assert_eq!(publisher.detections().len(), 4);
        assert_eq!(publisher.presence_events().len(), 4);
        assert_eq!(sim.tracker().present_count(), 2);
    }

    #[tokio::test]
    async fn test_detection_published_before_presence() {
        let publisher = Arc::new(MemoryPublisher::new());
        let mut sim = Simulation::new(cows(1), &config(1.0, 0.0), publisher.clone());
        sim.tick(at(0)).await;

        let topics: Vec<_> = publisher.messages().into_iter().map(|m| m.topic).collect();
        assert_eq!(
            topics,
            vec!["sensors/rfid/RFID01/detections", "sensors/rfid/RFID01/presence"]
        );
    }

    #[tokio::test]
    async fn test_zero_cows_publishes_nothing() {
        let publisher = Arc::new(MemoryPublisher::new());
        let mut sim = Simulation::new(Herd::default(), &config(1.0, 1.0), publisher.clone());

        for t in 0..5 {
            let report = sim.tick(at(t)).await;
            assert_eq!(report.detections, 0);
            assert!(report.events.is_empty());
        }
        assert!(publisher.is_empty());
        assert_eq!(sim.stats().ticks, 5);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_state_change() {
        let publisher = Arc::new(MemoryPublisher::new());
        publisher.set_failing(true);
        let mut sim = Simulation::new(cows(1), &config(1.0, 0.0), publisher.clone());

        let report = sim.tick(at(0)).await;
        assert_eq!(report.publish_failures, 2);
        assert_eq!(report.events.len(), 1);
        assert!(publisher.is_empty());

        // State and transport are not transactional: the cow stays present
        // even though nobody heard the ENTERED event.
        assert!(sim.tracker().is_present("cow-1").unwrap());

        publisher.set_failing(false);
        let report = sim.tick(at(12)).await;
        assert_eq!(report.events[0].status, PresenceStatus::StillPresent);
        assert_eq!(report.events[0].duration, 12);
        assert_eq!(sim.stats().publish_failures, 2);
    }

    #[tokio::test]
    async fn test_disconnected_transport_skips_tick_and_keeps_state() {
        let publisher = Arc::new(MemoryPublisher::new());
        let mut sim = Simulation::new(cows(1), &config(1.0, 0.0), publisher.clone());
        sim.tick(at(0)).await;

        publisher.set_connected(false);
        let report = sim.tick(at(10)).await;
        assert!(report.skipped);
        assert_eq!(sim.stats().skipped_ticks, 1);

        publisher.set_connected(true);
        let report = sim.tick(at(25)).await;
        assert_eq!(report.events[0].status, PresenceStatus::StillPresent);
        assert_eq!(report.events[0].duration, 25);
    }

    #[tokio::test]
    async fn test_unknown_cow_is_skipped() {
        let publisher = Arc::new(MemoryPublisher::new());
        let config = config(1.0, 0.0);
        let tracker = PresenceTracker::new(&cows(1));
        let mut sim = Simulation::with_parts(
            cows(2),
            tracker,
            DetectionGenerator::new(&config),
            TickSchedule::new(&config),
            publisher.clone(),
        );

        let report = sim.tick(at(0)).await;
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].cow_id, "cow-1");
        assert_eq!(sim.stats().unknown_entities, 1);
        assert!(sim.tracker().state("cow-2").is_err());
        assert!(publisher.messages().iter().all(|m| m.topic.contains("RFID01")));
    }

    #[tokio::test]
    async fn test_per_cow_events_in_transition_order() {
        let publisher = Arc::new(MemoryPublisher::new());
        let mut sim = Simulation::new(cows(3), &config(0.6, 0.5), publisher.clone());

        let mut expected: Vec<PresenceEvent> = Vec::new();
        for t in 0..40 {
            expected.extend(sim.tick(at(t * 10)).await.events);
        }

        let published = publisher.presence_events();
        for cow in ["cow-1", "cow-2", "cow-3"] {
            let want: Vec<_> = expected.iter().filter(|e| e.cow_id == cow).collect();
            let got: Vec<_> = published.iter().filter(|e| e.cow_id == cow).collect();
            assert_eq!(want, got);
        }
        assert!(published.iter().all(|e| e.timestamp <= at(400)));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let publisher = Arc::new(MemoryPublisher::new());
        let mut sim = Simulation::new(cows(2), &config(1.0, 0.0), publisher.clone());
        let (tx, rx) = broadcast::channel(1);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            let _ = tx.send(());
        });

        sim.run(rx).await.unwrap();
        stopper.await.unwrap();

        assert!(sim.stats().ticks >= 1);
        assert!(!publisher.is_empty());
        sim.finish(Duration::from_millis(10)).await.unwrap();
    }
}
