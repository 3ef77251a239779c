// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Presence tracking - turns RFID reads into stall occupancy transitions
//!
//! Each cow is either absent or present. The tracker owns one
//! [`PresenceState`] per registered cow and reacts to every tick's
//! [`Observation`]:
//!
//! | observation          | absent             | present                 |
//! |----------------------|--------------------|-------------------------|
//! | detected             | `ENTERED`, 0 s     | `STILL_PRESENT`, gap    |
//! | missed, exit roll ok | nothing            | `LEFT`, gap             |
//! | missed, no exit      | nothing            | nothing                 |
//!
//! The gap is measured from the previous detection, not from entry, so
//! `STILL_PRESENT` durations are per-interval rather than cumulative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{SimError, SimResult};
use crate::herd::{Cow, Herd};
use crate::sensors::Observation;
use crate::streaming::wire::iso_millis;

/// Occupancy transition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceStatus {
    Entered,
    StillPresent,
    Left,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Entered => "ENTERED",
            PresenceStatus::StillPresent => "STILL_PRESENT",
            PresenceStatus::Left => "LEFT",
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition as published on the presence topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub id: String,
    pub sensor_id: String,
    pub cow_id: String,
    pub status: PresenceStatus,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    /// Whole seconds since the cow's previous detection
    pub duration: u64,
}

/// Per-cow occupancy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceState {
    pub present: bool,
    pub last_detection: Option<DateTime<Utc>>,
    /// Always `None` while absent
    pub stall: Option<u32>,
}

/// Owns the presence state of every registered cow
#[derive(Debug, Default)]
pub struct PresenceTracker {
    states: HashMap<String, PresenceState>,
}

impl PresenceTracker {
    /// One absent state per cow in the herd
    pub fn new(herd: &Herd) -> Self {
        let states = herd
            .cows()
            .iter()
            .map(|cow| (cow.id.clone(), PresenceState::default()))
            .collect();
        Self { states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, cow_id: &str) -> SimResult<&PresenceState> {
        self.states
            .get(cow_id)
            .ok_or_else(|| SimError::UnknownEntity(cow_id.to_string()))
    }

    pub fn is_present(&self, cow_id: &str) -> SimResult<bool> {
        self.state(cow_id).map(|s| s.present)
    }

    /// Cows currently in a stall
    pub fn present_count(&self) -> usize {
        self.states.values().filter(|s| s.present).count()
    }

    /// Apply one tick's observation for `cow`. Unknown cows are rejected
    /// without touching any state.
    pub fn observe(
        &mut self,
        cow: &Cow,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> SimResult<Option<PresenceEvent>> {
        let state = self
            .states
            .get_mut(&cow.id)
            .ok_or_else(|| SimError::UnknownEntity(cow.id.clone()))?;

        let status = match (observation, state.present) {
            (Observation::Detected(_), false) => {
                state.present = true;
                state.stall = Some(cow.stall);
                state.last_detection = Some(now);
                return Ok(Some(event(cow, PresenceStatus::Entered, now, 0)));
            }
            (Observation::Detected(_), true) => PresenceStatus::StillPresent,
            (Observation::Missed { exit: true }, true) => PresenceStatus::Left,
            (Observation::Missed { .. }, _) => return Ok(None),
        };

        let duration = elapsed_secs(state.last_detection, now);
        match status {
            PresenceStatus::StillPresent => state.last_detection = Some(now),
            _ => {
                state.present = false;
                state.stall = None;
            }
        }

        Ok(Some(event(cow, status, now, duration)))
    }
}

fn elapsed_secs(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    since
        .map(|t| (now - t).num_seconds().max(0) as u64)
        .unwrap_or(0)
}

fn event(cow: &Cow, status: PresenceStatus, now: DateTime<Utc>, duration: u64) -> PresenceEvent {
    PresenceEvent {
        id: format!("pres-{}", Uuid::new_v4()),
        sensor_id: cow.sensor_id.clone(),
        cow_id: cow.id.clone(),
        status,
        timestamp: now,
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::RawDetection;
    use chrono::{Duration, TimeZone};

    fn cow(id: &str) -> Cow {
        Cow {
            id: id.to_string(),
            name: "Bella".to_string(),
            tag: "RFID001".to_string(),
            sensor_id: "RFID01".to_string(),
            stall: 1,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn detected(now: DateTime<Utc>) -> Observation {
        Observation::Detected(RawDetection {
            id: "det-test".to_string(),
            sensor_id: "RFID01".to_string(),
            rfid_tag: "RFID001".to_string(),
            timestamp: now,
            signal_strength: -50,
            raw_data: "{}".to_string(),
        })
    }

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(&Herd::new(vec![cow("cow-1")]))
    }

    #[test]
    fn test_first_detection_enters() {
        let mut tracker = tracker();
        let ev = tracker.observe(&cow("cow-1"), &detected(at(0)), at(0)).unwrap().unwrap();

        assert_eq!(ev.status, PresenceStatus::Entered);
        assert_eq!(ev.duration, 0);
        assert_eq!(ev.cow_id, "cow-1");
        assert_eq!(ev.sensor_id, "RFID01");

        let state = tracker.state("cow-1").unwrap();
        assert!(state.present);
        assert_eq!(state.stall, Some(1));
        assert_eq!(state.last_detection, Some(at(0)));
    }

    #[test]
    fn test_scenario_enter_then_still_present() {
        let mut tracker = tracker();
        let c = cow("cow-1");

        let first = tracker.observe(&c, &detected(at(0)), at(0)).unwrap().unwrap();
        assert_eq!((first.status, first.duration), (PresenceStatus::Entered, 0));

        let second = tracker.observe(&c, &detected(at(30)), at(30)).unwrap().unwrap();
        assert_eq!((second.status, second.duration), (PresenceStatus::StillPresent, 30));
    }

    #[test]
    fn test_still_present_measures_gap_not_occupancy() {
        let mut tracker = tracker();
        let c = cow("cow-1");
        tracker.observe(&c, &detected(at(0)), at(0)).unwrap();

        let mut last = 0;
        for now in [7, 19, 20, 65] {
            let ev = tracker.observe(&c, &detected(at(now)), at(now)).unwrap().unwrap();
            assert_eq!(ev.status, PresenceStatus::StillPresent);
            assert_eq!(ev.duration, (now - last) as u64);
            assert_eq!(tracker.state("cow-1").unwrap().last_detection, Some(at(now)));
            last = now;
        }
    }

    #[test]
    fn test_duration_floors_partial_seconds() {
        let mut tracker = tracker();
        let c = cow("cow-1");
        tracker.observe(&c, &detected(t0()), t0()).unwrap();

        let later = t0() + Duration::milliseconds(12_999);
        let ev = tracker.observe(&c, &detected(later), later).unwrap().unwrap();
        assert_eq!(ev.duration, 12);
    }

    #[test]
    fn test_scenario_leave_after_last_detection() {
        let mut tracker = tracker();
        let c = cow("cow-1");
        tracker.observe(&c, &detected(at(0)), at(0)).unwrap();
        tracker.observe(&c, &detected(at(30)), at(30)).unwrap();

        let ev = tracker
            .observe(&c, &Observation::Missed { exit: true }, at(45))
            .unwrap()
            .unwrap();
        assert_eq!(ev.status, PresenceStatus::Left);
        assert_eq!(ev.duration, 15);

        let state = tracker.state("cow-1").unwrap();
        assert!(!state.present);
        assert_eq!(state.stall, None);
    }

    #[test]
    fn test_exactly_one_left_per_exit() {
        let mut tracker = tracker();
        let c = cow("cow-1");
        tracker.observe(&c, &detected(at(0)), at(0)).unwrap();

        let left = tracker.observe(&c, &Observation::Missed { exit: true }, at(10)).unwrap();
        assert!(left.is_some());
        let again = tracker.observe(&c, &Observation::Missed { exit: true }, at(20)).unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn test_missed_without_exit_keeps_state() {
        let mut tracker = tracker();
        let c = cow("cow-1");
        tracker.observe(&c, &detected(at(0)), at(0)).unwrap();
        let before = tracker.state("cow-1").unwrap().clone();

        let ev = tracker.observe(&c, &Observation::Missed { exit: false }, at(5)).unwrap();
        assert!(ev.is_none());
        assert_eq!(tracker.state("cow-1").unwrap(), &before);
    }

    #[test]
    fn test_absent_and_missed_is_silent() {
        let mut tracker = tracker();
        let c = cow("cow-1");
        for exit in [false, true] {
            let ev = tracker.observe(&c, &Observation::Missed { exit }, at(1)).unwrap();
            assert!(ev.is_none());
        }
        assert_eq!(tracker.state("cow-1").unwrap(), &PresenceState::default());
    }

    #[test]
    fn test_reentry_after_leaving() {
        let mut tracker = tracker();
        let c = cow("cow-1");
        tracker.observe(&c, &detected(at(0)), at(0)).unwrap();
        tracker.observe(&c, &Observation::Missed { exit: true }, at(10)).unwrap();

        let ev = tracker.observe(&c, &detected(at(100)), at(100)).unwrap().unwrap();
        assert_eq!(ev.status, PresenceStatus::Entered);
        assert_eq!(ev.duration, 0);
    }

    #[test]
    fn test_clock_going_backwards_clamps_to_zero() {
        let mut tracker = tracker();
        let c = cow("cow-1");
        tracker.observe(&c, &detected(at(60)), at(60)).unwrap();

        let ev = tracker.observe(&c, &detected(at(10)), at(10)).unwrap().unwrap();
        assert_eq!(ev.duration, 0);
    }

    #[test]
    fn test_unknown_cow_rejected_without_mutation() {
        let mut tracker = tracker();
        let stranger = cow("cow-404");

        let err = tracker.observe(&stranger, &detected(at(0)), at(0)).unwrap_err();
        assert!(matches!(err, SimError::UnknownEntity(ref id) if id == "cow-404"));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.state("cow-404").is_err());
        assert_eq!(tracker.state("cow-1").unwrap(), &PresenceState::default());
    }

    #[test]
    fn test_replay_reproduces_events() {
        let c = cow("cow-1");
        let script = vec![
            (at(0), detected(at(0))),
            (at(8), Observation::Missed { exit: false }),
            (at(14), detected(at(14))),
            (at(20), Observation::Missed { exit: true }),
            (at(21), Observation::Missed { exit: true }),
            (at(40), detected(at(40))),
            (at(52), detected(at(52))),
        ];

        let run = |script: &[(DateTime<Utc>, Observation)]| {
            let mut tracker = tracker();
            script
                .iter()
                .filter_map(|(now, obs)| tracker.observe(&c, obs, *now).unwrap())
                .map(|ev| (ev.status, ev.timestamp, ev.duration, ev.cow_id, ev.sensor_id))
                .collect::<Vec<_>>()
        };

        let first = run(&script);
        assert_eq!(first, run(&script));
        assert_eq!(
            first.iter().map(|e| (e.0, e.2)).collect::<Vec<_>>(),
            vec![
                (PresenceStatus::Entered, 0),
                (PresenceStatus::StillPresent, 14),
                (PresenceStatus::Left, 6),
                (PresenceStatus::Entered, 0),
                (PresenceStatus::StillPresent, 12),
            ]
        );
    }

    #[test]
    fn test_wire_format() {
        let ev = PresenceEvent {
            id: "pres-1".to_string(),
            sensor_id: "RFID01".to_string(),
            cow_id: "cow-1".to_string(),
            status: PresenceStatus::StillPresent,
            timestamp: at(30),
            duration: 30,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["status"], "STILL_PRESENT");
        assert_eq!(json["timestamp"], "2025-01-01T00:00:30.000Z");
        assert_eq!(json["duration"], 30);
        assert_eq!(json["cow_id"], "cow-1");

        let back: PresenceEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }
}
