// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Database module - farm records and the event history written by `sync`

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::config::{DatabaseConfig, StallConfig};
use crate::error::{SimError, SimResult};
use crate::herd::CowRecord;
use crate::presence::PresenceEvent;
use crate::sensors::RawDetection;

/// Sqlite store. The connection closes when this is dropped.
pub struct Database {
    conn: Mutex<Connection>,
}

fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig) -> SimResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SimError::config(format!(
                        "cannot create database directory {:?}: {}",
                        parent, e
                    ))
                })?;
            }
        }

        let conn = Connection::open(&config.path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        "#,
        )?;

        let db = Self::from_connection(conn)?;
        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    pub fn open_in_memory() -> SimResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SimResult<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> SimResult<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cows (
                id TEXT PRIMARY KEY,
                farm_id TEXT NOT NULL,
                name TEXT,
                tag_number TEXT NOT NULL,
                breed TEXT,
                birth_date TEXT,
                status TEXT NOT NULL DEFAULT 'active'
            );

            CREATE INDEX IF NOT EXISTS idx_cows_farm ON cows(farm_id);
            CREATE INDEX IF NOT EXISTS idx_cows_tag ON cows(tag_number);

            CREATE TABLE IF NOT EXISTS stalls (
                farm_id TEXT NOT NULL,
                number INTEGER NOT NULL,
                sensor_id TEXT NOT NULL,
                status TEXT NOT NULL,
                PRIMARY KEY (farm_id, number)
            );

            CREATE TABLE IF NOT EXISTS detections (
                id TEXT PRIMARY KEY,
                sensor_id TEXT NOT NULL,
                cow_id TEXT,
                rfid_tag TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                signal_strength INTEGER NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_detections_timestamp ON detections(timestamp);

            CREATE TABLE IF NOT EXISTS presences (
                id TEXT PRIMARY KEY,
                sensor_id TEXT NOT NULL,
                cow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                duration INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_presences_cow ON presences(cow_id, timestamp);
        "#,
        )?;

        Ok(())
    }

    /// Insert a cow unless one with the same id exists. Returns whether a
    /// row was written.
    pub fn upsert_cow(&self, cow: &CowRecord) -> SimResult<bool> {
        let conn = self.conn.lock();
        let written = conn.execute(
            r#"INSERT OR IGNORE INTO cows
               (id, farm_id, name, tag_number, breed, birth_date, status)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                cow.id,
                cow.farm_id,
                cow.name,
                cow.tag_number,
                cow.breed,
                cow.birth_date.map(|d| d.to_string()),
                cow.status,
            ],
        )?;
        Ok(written > 0)
    }

    /// Cows of a farm, ordered by id
    pub fn cows_for_farm(&self, farm_id: &str) -> SimResult<Vec<CowRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, farm_id, name, tag_number, breed, birth_date, status
             FROM cows WHERE farm_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![farm_id], |row| {
            let birth_date: Option<String> = row.get(5)?;
            Ok(CowRecord {
                id: row.get(0)?,
                farm_id: row.get(1)?,
                name: row.get(2)?,
                tag_number: row.get(3)?,
                breed: row.get(4)?,
                birth_date: birth_date.and_then(|d| d.parse::<NaiveDate>().ok()),
                status: row.get(6)?,
            })
        })?;

        let mut cows = Vec::new();
        for row in rows {
            cows.push(row?);
        }
        Ok(cows)
    }

    pub fn delete_cows(&self, ids: &[&str]) -> SimResult<usize> {
        let conn = self.conn.lock();
        let mut deleted = 0;
        for id in ids {
            deleted += conn.execute("DELETE FROM cows WHERE id = ?1", params![id])?;
        }
        Ok(deleted)
    }

    pub fn cow_id_for_tag(&self, farm_id: &str, tag: &str) -> SimResult<Option<String>> {
        let conn = self.conn.lock();
        let id = conn
            .query_row(
                "SELECT id FROM cows WHERE farm_id = ?1 AND tag_number = ?2",
                params![farm_id, tag],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn upsert_stall(&self, farm_id: &str, stall: &StallConfig) -> SimResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT INTO stalls (farm_id, number, sensor_id, status) VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(farm_id, number) DO UPDATE SET sensor_id = excluded.sensor_id"#,
            params![farm_id, stall.number, stall.sensor_id, stall.status],
        )?;
        Ok(())
    }

    pub fn stalls_for_farm(&self, farm_id: &str) -> SimResult<Vec<StallConfig>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT number, sensor_id, status FROM stalls WHERE farm_id = ?1 ORDER BY number",
        )?;
        let rows = stmt.query_map(params![farm_id], |row| {
            Ok(StallConfig {
                number: row.get(0)?,
                sensor_id: row.get(1)?,
                status: row.get(2)?,
            })
        })?;

        let mut stalls = Vec::new();
        for row in rows {
            stalls.push(row?);
        }
        Ok(stalls)
    }

    /// Store a detection. Redelivered ids are ignored.
    pub fn store_detection(&self, detection: &RawDetection, cow_id: Option<&str>) -> SimResult<bool> {
        let conn = self.conn.lock();
        let written = conn.execute(
            r#"INSERT OR IGNORE INTO detections
               (id, sensor_id, cow_id, rfid_tag, timestamp, signal_strength, payload)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                detection.id,
                detection.sensor_id,
                cow_id,
                detection.rfid_tag,
                ts(&detection.timestamp),
                detection.signal_strength,
                detection.raw_data,
            ],
        )?;
        debug!(id = %detection.id, "stored detection");
        Ok(written > 0)
    }

    /// Store a presence transition. Redelivered ids are ignored.
    pub fn store_presence(&self, event: &PresenceEvent) -> SimResult<bool> {
        let conn = self.conn.lock();
        let written = conn.execute(
            r#"INSERT OR IGNORE INTO presences
               (id, sensor_id, cow_id, status, timestamp, duration)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                event.id,
                event.sensor_id,
                event.cow_id,
                event.status.as_str(),
                ts(&event.timestamp),
                event.duration as i64,
            ],
        )?;
        debug!(id = %event.id, "stored presence");
        Ok(written > 0)
    }

    /// Most recent presence status recorded for a cow
    pub fn latest_presence(&self, cow_id: &str) -> SimResult<Option<String>> {
        let conn = self.conn.lock();
        let status = conn
            .query_row(
                "SELECT status FROM presences WHERE cow_id = ?1
                 ORDER BY timestamp DESC, rowid DESC LIMIT 1",
                params![cow_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    /// Cows of a farm whose latest transition is not `LEFT`
    pub fn present_cow_count(&self, farm_id: &str) -> SimResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM cows c
               WHERE c.farm_id = ?1 AND (
                   SELECT p.status FROM presences p WHERE p.cow_id = c.id
                   ORDER BY p.timestamp DESC, p.rowid DESC LIMIT 1
               ) IN ('ENTERED', 'STILL_PRESENT')"#,
            params![farm_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_detections_since(&self, since: DateTime<Utc>) -> SimResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM detections WHERE timestamp >= ?1",
            params![ts(&since)],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Newest detections first, joined with the cow they were linked to
    pub fn recent_detections(&self, limit: usize) -> SimResult<Vec<StoredDetection>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT d.id, d.timestamp, d.sensor_id, c.name, c.tag_number, d.payload
               FROM detections d LEFT JOIN cows c ON c.id = d.cow_id
               ORDER BY d.timestamp DESC LIMIT ?1"#,
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(StoredDetection {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                sensor_id: row.get(2)?,
                cow_name: row.get(3)?,
                tag_number: row.get(4)?,
                payload: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

#[derive(Debug, Clone)]
pub struct StoredDetection {
    pub id: String,
    pub timestamp: String,
    pub sensor_id: String,
    pub cow_name: Option<String>,
    pub tag_number: Option<String>,
    pub payload: String,
}

impl StoredDetection {
    /// `rssi` from the stored reader frame, if it parses
    pub fn rssi(&self) -> Option<i64> {
        serde_json::from_str::<serde_json::Value>(&self.payload)
            .ok()?
            .get("rssi")?
            .as_i64()
    }
}
