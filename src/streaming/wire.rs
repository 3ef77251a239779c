//! Wire conventions shared by publishers and subscribers

/// Per-sensor topic for raw detections
pub fn detections_topic(sensor_id: &str) -> String {
    format!("sensors/rfid/{}/detections", sensor_id)
}

/// Per-sensor topic for presence transitions
pub fn presence_topic(sensor_id: &str) -> String {
    format!("sensors/rfid/{}/presence", sensor_id)
}

/// Subscription filter covering every sensor's detections
pub const DETECTIONS_FILTER: &str = "sensors/rfid/+/detections";

/// Subscription filter covering every sensor's presence transitions
pub const PRESENCE_FILTER: &str = "sensors/rfid/+/presence";

/// Which stream a topic belongs to, with the sensor id it names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKind<'a> {
    Detections(&'a str),
    Presence(&'a str),
}

pub fn parse_topic(topic: &str) -> Option<TopicKind<'_>> {
    let rest = topic.strip_prefix("sensors/rfid/")?;
    let (sensor_id, leaf) = rest.split_once('/')?;
    if sensor_id.is_empty() {
        return None;
    }
    match leaf {
        "detections" => Some(TopicKind::Detections(sensor_id)),
        "presence" => Some(TopicKind::Presence(sensor_id)),
        _ => None,
    }
}

/// ISO-8601 UTC timestamps with millisecond precision, e.g.
/// `2025-01-01T00:00:30.000Z`
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(detections_topic("RFID01"), "sensors/rfid/RFID01/detections");
        assert_eq!(presence_topic("RFID01"), "sensors/rfid/RFID01/presence");
    }

    #[test]
    fn test_parse_topic() {
        assert_eq!(
            parse_topic("sensors/rfid/RFID02/detections"),
            Some(TopicKind::Detections("RFID02"))
        );
        assert_eq!(
            parse_topic("sensors/rfid/RFID02/presence"),
            Some(TopicKind::Presence("RFID02"))
        );
        assert_eq!(parse_topic("sensors/rfid/RFID02/battery"), None);
        assert_eq!(parse_topic("sensors/rfid//presence"), None);
        assert_eq!(parse_topic("farm/RFID02/presence"), None);
    }
}
