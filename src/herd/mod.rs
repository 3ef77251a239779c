// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Herd registry - the cows tracked during a run

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tracked cow and the sensor/stall it is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cow {
    pub id: String,
    pub name: String,
    /// Value programmed into the RFID ear tag
    pub tag: String,
    pub sensor_id: String,
    pub stall: u32,
}

/// Cow as stored by the farm records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CowRecord {
    pub id: String,
    pub farm_id: String,
    pub name: Option<String>,
    pub tag_number: String,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub status: String,
}

/// Sensor id for the n-th stall, 1-based
pub fn sensor_for_stall(stall: u32) -> String {
    format!("RFID{:02}", stall)
}

/// Immutable, ordered herd for one simulation run
#[derive(Debug, Clone, Default)]
pub struct Herd {
    cows: Vec<Cow>,
    index: HashMap<String, usize>,
}

impl Herd {
    pub fn new(cows: Vec<Cow>) -> Self {
        let index = cows
            .iter()
            .enumerate()
            .map(|(i, cow)| (cow.id.clone(), i))
            .collect();
        Self { cows, index }
    }

    /// Bind stored records to sensors and stalls by position: the n-th
    /// record gets sensor `RFIDnn` and stall n.
    pub fn from_records(records: &[CowRecord]) -> Self {
        let cows = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let stall = i as u32 + 1;
                Cow {
                    id: record.id.clone(),
                    name: record
                        .name
                        .clone()
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(|| format!("Cow {}", stall)),
                    tag: record.tag_number.clone(),
                    sensor_id: sensor_for_stall(stall),
                    stall,
                }
            })
            .collect();
        Self::new(cows)
    }

    pub fn cows(&self) -> &[Cow] {
        &self.cows
    }

    pub fn get(&self, id: &str) -> Option<&Cow> {
        self.index.get(id).map(|&i| &self.cows[i])
    }

    pub fn len(&self) -> usize {
        self.cows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cows.is_empty()
    }
}

/// Demo herd ids, shared by `seed` and `clear`
pub const DEMO_COW_IDS: [&str; 6] = [
    "demo-cow-001",
    "demo-cow-002",
    "demo-cow-003",
    "demo-cow-004",
    "demo-cow-005",
    "demo-cow-006",
];

/// The six demo cows for a farm
pub fn demo_records(farm_id: &str) -> Vec<CowRecord> {
    let rows = [
        ("Bella", "RFID001", "Holstein", (2020, 1, 15)),
        ("Luna", "RFID002", "Holstein", (2019, 8, 22)),
        ("Stella", "RFID003", "Holstein", (2021, 7, 8)),
        ("Daisy", "RFID004", "Angus", (2020, 12, 3)),
        ("Molly", "RFID005", "Jersey", (2021, 1, 18)),
        ("Ruby", "RFID006", "Holstein", (2019, 5, 12)),
    ];

    DEMO_COW_IDS
        .iter()
        .zip(rows)
        .map(|(id, (name, tag, breed, (y, m, d)))| CowRecord {
            id: id.to_string(),
            farm_id: farm_id.to_string(),
            name: Some(name.to_string()),
            tag_number: tag.to_string(),
            breed: Some(breed.to_string()),
            birth_date: NaiveDate::from_ymd_opt(y, m, d),
            status: "active".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_bound_by_position() {
        let mut records = demo_records("farm-001");
        records[1].name = None;

        let herd = Herd::from_records(&records);
        assert_eq!(herd.len(), 6);

        let first = &herd.cows()[0];
        assert_eq!(first.sensor_id, "RFID01");
        assert_eq!(first.stall, 1);
        assert_eq!(first.tag, "RFID001");

        let second = herd.get("demo-cow-002").unwrap();
        assert_eq!(second.name, "Cow 2");
        assert_eq!(second.sensor_id, "RFID02");
    }

    #[test]
    fn test_empty_herd() {
        let herd = Herd::from_records(&[]);
        assert!(herd.is_empty());
        assert!(herd.get("cow-1").is_none());
    }

    #[test]
    fn test_sensor_for_stall_padding() {
        assert_eq!(sensor_for_stall(3), "RFID03");
        assert_eq!(sensor_for_stall(12), "RFID12");
    }
}
