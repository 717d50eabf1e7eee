use crate::analysis::jobs::JobContext;
use crate::analysis::join::enrich;
use crate::analysis::partition::ShardPlan;
use crate::config::AnalyticsConfig;
use crate::model::{parse_timestamp, Event, Item};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}

pub fn event(user_id: &str, song_id: &str, timestamp: &str, duration_sec: u32) -> Event {
    Event {
        user_id: user_id.to_string(),
        song_id: song_id.to_string(),
        timestamp: parse_timestamp(timestamp).expect("fixture timestamp"),
        duration_sec,
    }
}

pub fn item(song_id: &str, title: &str, artist: &str, genre: &str, mood: &str) -> Arc<Item> {
    Arc::new(Item {
        song_id: song_id.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
        genre: genre.to_string(),
        mood: mood.to_string(),
    })
}

pub fn test_config() -> AnalyticsConfig {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let data_root = tempdir.keep();

    AnalyticsConfig {
        events_path: data_root.join("listening_logs.csv"),
        items_path: data_root.join("songs_metadata.csv"),
        output_root: data_root.join("output"),
        now: parse_timestamp("2025-03-15 12:00:00"),
        seed: Some(17),
        shards: 4,
        max_concurrent_jobs: 2,
        ..AnalyticsConfig::default()
    }
}

pub fn job_context(events: Vec<Event>, items: Vec<Arc<Item>>) -> JobContext {
    job_context_with(events, items, test_config())
}

pub fn job_context_with(events: Vec<Event>, items: Vec<Arc<Item>>, config: AnalyticsConfig) -> JobContext {
    let enriched = enrich(&events, &items);
    JobContext {
        plan: ShardPlan::new(config.shards),
        now: config.reference_now(),
        events,
        items,
        enriched,
        config,
    }
}

/// Two songs, one user who played the sad one twice.
pub fn scenario_a() -> (Vec<Event>, Vec<Arc<Item>>) {
    let items = vec![
        item("S001", "A", "X", "Pop", "Happy"),
        item("S002", "B", "Y", "Pop", "Sad"),
    ];
    let events = vec![
        event("U1", "S002", "2025-03-14 10:00:00", 200),
        event("U1", "S002", "2025-03-14 11:00:00", 210),
    ];
    (events, items)
}
