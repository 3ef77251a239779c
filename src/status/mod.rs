//! Terminal status report of a farm

use chrono::{DateTime, Duration, Utc};
use std::fmt::{self, Write};

use crate::config::StallConfig;
use crate::db::{Database, StoredDetection};
use crate::error::SimResult;
use crate::herd::CowRecord;
use crate::stalls::{default_stalls, DEFAULT_STALL_COUNT};

/// Everything the report shows, gathered up front
struct Snapshot {
    cows: Vec<(CowRecord, bool)>,
    present: usize,
    recent_count: usize,
    recent: Vec<StoredDetection>,
}

/// Render the report for `farm_id`. `stalls` comes from config; an empty
/// list falls back to the stalls recorded for the farm, then the defaults.
pub fn render(
    db: &Database,
    farm_id: &str,
    stalls: &[StallConfig],
    now: DateTime<Utc>,
) -> SimResult<String> {
    let mut cows = Vec::new();
    for cow in db.cows_for_farm(farm_id)? {
        let present = matches!(
            db.latest_presence(&cow.id)?.as_deref(),
            Some("ENTERED") | Some("STILL_PRESENT")
        );
        cows.push((cow, present));
    }
    let snapshot = Snapshot {
        cows,
        present: db.present_cow_count(farm_id)?,
        recent_count: db.count_detections_since(now - Duration::hours(1))?,
        recent: db.recent_detections(10)?,
    };

    let fallback;
    let stalls = if stalls.is_empty() {
        fallback = match db.stalls_for_farm(farm_id)? {
            stored if stored.is_empty() => default_stalls(DEFAULT_STALL_COUNT),
            stored => stored,
        };
        &fallback[..]
    } else {
        stalls
    };

    let mut out = String::new();
    write_report(&mut out, &snapshot, stalls)?;
    Ok(out)
}

fn write_report(out: &mut impl Write, snapshot: &Snapshot, stalls: &[StallConfig]) -> fmt::Result {
    writeln!(out, "Cosva IoT Smart Farm - System Status")?;
    writeln!(out, "====================================\n")?;

    writeln!(out, "REGISTERED COWS:")?;
    if snapshot.cows.is_empty() {
        writeln!(out, "  No cows registered")?;
    }
    for (cow, present) in &snapshot.cows {
        writeln!(
            out,
            "  * {} ({}) - {}",
            cow.name.as_deref().unwrap_or("Unnamed"),
            cow.tag_number,
            cow.breed.as_deref().unwrap_or("N/A")
        )?;
        writeln!(out, "    {}", if *present { "PRESENT" } else { "not present" })?;
        if let Some(born) = cow.birth_date {
            writeln!(out, "    Born: {}", born)?;
        }
    }
    writeln!(out)?;

    writeln!(out, "STALLS:")?;
    for stall in stalls {
        let status = if stall.status == "available" { "available" } else { "occupied" };
        writeln!(out, "  Stall {}: {} ({})", stall.number, status, stall.sensor_id)?;
    }
    writeln!(out)?;

    writeln!(out, "STATISTICS:")?;
    writeln!(out, "  * Total cows: {}", snapshot.cows.len())?;
    writeln!(out, "  * Total stalls: {}", stalls.len())?;
    writeln!(out, "  * Cows present: {}", snapshot.present)?;
    writeln!(out, "  * Detections (last hour): {}", snapshot.recent_count)?;
    writeln!(out)?;

    writeln!(out, "RECENT DETECTIONS:")?;
    if snapshot.recent.is_empty() {
        writeln!(out, "  No recent detections")?;
    }
    for det in &snapshot.recent {
        let rssi = det
            .rssi()
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());
        writeln!(
            out,
            "  * {} - {} ({}) on {} ({})",
            det.timestamp,
            det.cow_name.as_deref().unwrap_or("Unknown cow"),
            det.tag_number.as_deref().unwrap_or("N/A"),
            det.sensor_id,
            rssi
        )?;
    }

    Ok(())
}
