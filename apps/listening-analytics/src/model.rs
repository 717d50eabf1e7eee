use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use std::sync::Arc;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
// Also matches values without a fractional part.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// One playback from the listening log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub user_id: String,
    pub song_id: String,
    pub timestamp: NaiveDateTime,
    pub duration_sec: u32,
}

/// Catalog row from the song metadata table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub genre: String,
    pub mood: String,
}

/// A listening event joined with the catalog row it references.
#[derive(Debug, Clone)]
pub struct EnrichedEvent {
    pub event: Event,
    pub item: Arc<Item>,
}

impl EnrichedEvent {
    pub fn user_id(&self) -> &str {
        &self.event.user_id
    }

    pub fn song_id(&self) -> &str {
        &self.event.song_id
    }
}

impl Serialize for EnrichedEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut row = serializer.serialize_struct("EnrichedEvent", 8)?;
        row.serialize_field("user_id", &self.event.user_id)?;
        row.serialize_field("song_id", &self.event.song_id)?;
        row.serialize_field("timestamp", &format_timestamp(&self.event.timestamp))?;
        row.serialize_field("duration_sec", &self.event.duration_sec)?;
        row.serialize_field("title", &self.item.title)?;
        row.serialize_field("artist", &self.item.artist)?;
        row.serialize_field("genre", &self.item.genre)?;
        row.serialize_field("mood", &self.item.mood)?;
        row.end()
    }
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_PARSE_FORMAT).ok()
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn parses_declared_timestamp_format() {
        let ts = parse_timestamp("2025-03-14 02:15:09").expect("timestamp");
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(ts.hour(), 2);
        assert_eq!(format_timestamp(&ts), "2025-03-14 02:15:09");
    }

    #[test]
    fn accepts_fractional_seconds_but_rejects_other_shapes() {
        assert!(parse_timestamp("2025-03-14 02:15:09.250").is_some());
        assert!(parse_timestamp("2025-03-14").is_none());
        assert!(parse_timestamp("14/03/2025 02:15:09").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn enriched_event_serializes_flat_record() {
        let item = Arc::new(Item {
            song_id: "S001".to_string(),
            title: "Golden Sky".to_string(),
            artist: "The Echoes".to_string(),
            genre: "Pop".to_string(),
            mood: "Happy".to_string(),
        });
        let row = EnrichedEvent {
            event: Event {
                user_id: "U1".to_string(),
                song_id: "S001".to_string(),
                timestamp: parse_timestamp("2025-03-14 02:15:09").unwrap(),
                duration_sec: 200,
            },
            item,
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["user_id"], "U1");
        assert_eq!(value["timestamp"], "2025-03-14 02:15:09");
        assert_eq!(value["duration_sec"], 200);
        assert_eq!(value["artist"], "The Echoes");
        assert_eq!(value["mood"], "Happy");
    }
}
