use crate::analysis::join::EnrichedRelation;
use crate::analysis::partition::ShardPlan;
use crate::config::AnalyticsConfig;
use crate::error::AnalyticsError;
use crate::model::{Event, Item};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a job may read. Built once after the join and shared read-only
/// by every job of the run.
#[derive(Debug)]
pub struct JobContext {
    pub events: Vec<Event>,
    pub items: Vec<Arc<Item>>,
    pub enriched: EnrichedRelation,
    pub plan: ShardPlan,
    /// Reference time for windowed analyses.
    pub now: NaiveDateTime,
    pub config: AnalyticsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteGenreRow {
    pub user_id: String,
    pub genre: String,
    pub play_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvgListenTimeRow {
    pub song_id: String,
    pub avg_duration_sec: f64,
    pub play_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopSongRow {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub play_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationRow {
    pub user_id: String,
    pub song_id: String,
    pub title: String,
    pub artist: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoyaltyRow {
    pub user_id: String,
    pub genre: String,
    pub loyalty_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightOwlRow {
    pub user_id: String,
    pub night_plays: u64,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{job_type} failed ({code}): {message}")]
pub struct JobFailure {
    pub job_type: String,
    pub code: String,
    pub message: String,
}

impl JobFailure {
    pub fn from_error(job_type: &str, err: &AnalyticsError) -> Self {
        Self {
            job_type: job_type.to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn unsupported(job_type: &str) -> Self {
        Self {
            job_type: job_type.to_string(),
            code: "unsupported_job_type".to_string(),
            message: format!("Unsupported job type: {job_type}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_type: String,
    pub location: String,
    pub rows: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub started_at: String,
    pub completed_at: String,
    pub reference_now: String,
    pub seed: Option<u64>,
    pub input_events: u64,
    pub input_items: u64,
    pub enriched_rows: u64,
    pub orphan_events: u64,
    pub rows: BTreeMap<String, u64>,
    pub timings_ms: BTreeMap<String, u64>,
    pub job_versions: BTreeMap<String, String>,
}

/// Summary returned to the caller after a successful commit.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_root: std::path::PathBuf,
    pub manifest: RunManifest,
}
