use crate::cli::Args;
use crate::model::parse_timestamp;
use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_EVENTS_PATH: &str = "data/listening_logs.csv";
const DEFAULT_ITEMS_PATH: &str = "data/songs_metadata.csv";
const DEFAULT_OUTPUT_ROOT: &str = "output";

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub events_path: PathBuf,
    pub items_path: PathBuf,
    pub output_root: PathBuf,
    /// Fixed reference time; `None` means the local wall clock at run start.
    pub now: Option<NaiveDateTime>,
    pub seed: Option<u64>,
    pub shards: u32,
    pub max_concurrent_jobs: usize,

    pub negative_mood: String,
    pub positive_mood: String,
    pub recommendations_per_user: usize,
    pub weekly_top_n: usize,
    pub weekly_window_days: i64,
    pub loyalty_cutoff: f64,
    pub night_start_hour: u32,
    pub night_end_hour: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            events_path: PathBuf::from(DEFAULT_EVENTS_PATH),
            items_path: PathBuf::from(DEFAULT_ITEMS_PATH),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            now: None,
            seed: None,
            shards: 16,
            max_concurrent_jobs: 4,
            negative_mood: "Sad".to_string(),
            positive_mood: "Happy".to_string(),
            recommendations_per_user: 3,
            weekly_top_n: 10,
            weekly_window_days: 7,
            loyalty_cutoff: 0.8,
            night_start_hour: 0,
            night_end_hour: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigOverrides {
    #[serde(default)]
    events_path: Option<String>,
    #[serde(default)]
    items_path: Option<String>,
    #[serde(default)]
    output_root: Option<String>,
    #[serde(default)]
    now: Option<String>,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    shards: Option<u32>,
    #[serde(default)]
    max_concurrent_jobs: Option<usize>,
    #[serde(default)]
    negative_mood: Option<String>,
    #[serde(default)]
    positive_mood: Option<String>,
    #[serde(default)]
    recommendations_per_user: Option<usize>,
    #[serde(default)]
    weekly_top_n: Option<usize>,
    #[serde(default)]
    weekly_window_days: Option<i64>,
    #[serde(default)]
    loyalty_cutoff: Option<f64>,
    #[serde(default)]
    night_start_hour: Option<u32>,
    #[serde(default)]
    night_end_hour: Option<u32>,
}

impl AnalyticsConfig {
    /// Defaults, then environment, then the JSON overrides file, then CLI flags.
    pub fn resolve(args: &Args) -> Result<Self> {
        let mut config = Self::from_env()?;

        let overrides_path = args
            .config
            .clone()
            .or_else(|| env_optional("ANALYTICS_CONFIG_PATH").map(PathBuf::from));
        if let Some(path) = overrides_path {
            if let Some(overrides) = load_config_overrides(&path) {
                apply_overrides(&mut config, &overrides)?;
            }
        }

        apply_args(&mut config, args)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            events_path: get("ANALYTICS_EVENTS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.events_path),
            items_path: get("ANALYTICS_ITEMS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.items_path),
            output_root: get("ANALYTICS_OUTPUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
            now: match get("ANALYTICS_NOW") {
                Some(raw) => Some(parse_now("ANALYTICS_NOW", &raw)?),
                None => None,
            },
            seed: parse_opt(&get, "ANALYTICS_SEED")?,
            shards: parse_opt(&get, "ANALYTICS_SHARDS")?.unwrap_or(defaults.shards),
            max_concurrent_jobs: parse_opt(&get, "ANALYTICS_MAX_CONCURRENT_JOBS")?
                .unwrap_or(defaults.max_concurrent_jobs),
            negative_mood: get("ANALYTICS_NEGATIVE_MOOD").unwrap_or(defaults.negative_mood),
            positive_mood: get("ANALYTICS_POSITIVE_MOOD").unwrap_or(defaults.positive_mood),
            recommendations_per_user: parse_opt(&get, "ANALYTICS_RECOMMENDATIONS_PER_USER")?
                .unwrap_or(defaults.recommendations_per_user),
            weekly_top_n: parse_opt(&get, "ANALYTICS_WEEKLY_TOP_N")?
                .unwrap_or(defaults.weekly_top_n),
            weekly_window_days: parse_opt(&get, "ANALYTICS_WEEKLY_WINDOW_DAYS")?
                .unwrap_or(defaults.weekly_window_days),
            loyalty_cutoff: parse_opt(&get, "ANALYTICS_LOYALTY_CUTOFF")?
                .unwrap_or(defaults.loyalty_cutoff),
            night_start_hour: parse_opt(&get, "ANALYTICS_NIGHT_START_HOUR")?
                .unwrap_or(defaults.night_start_hour),
            night_end_hour: parse_opt(&get, "ANALYTICS_NIGHT_END_HOUR")?
                .unwrap_or(defaults.night_end_hour),
        })
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.shards >= 1, "shards must be >= 1");
        anyhow::ensure!(self.max_concurrent_jobs >= 1, "max_concurrent_jobs must be >= 1");
        anyhow::ensure!(
            self.recommendations_per_user >= 1,
            "recommendations_per_user must be >= 1"
        );
        anyhow::ensure!(self.weekly_top_n >= 1, "weekly_top_n must be >= 1");
        anyhow::ensure!(self.weekly_window_days >= 1, "weekly_window_days must be >= 1");
        anyhow::ensure!(
            (0.0..1.0).contains(&self.loyalty_cutoff),
            "loyalty_cutoff must be in [0, 1), got {}",
            self.loyalty_cutoff
        );
        anyhow::ensure!(
            self.night_end_hour <= 24 && self.night_start_hour < self.night_end_hour,
            "night window must satisfy 0 <= start < end <= 24, got {}..{}",
            self.night_start_hour,
            self.night_end_hour
        );
        anyhow::ensure!(
            !self.negative_mood.trim().is_empty() && !self.positive_mood.trim().is_empty(),
            "moods must not be empty"
        );
        anyhow::ensure!(
            self.negative_mood != self.positive_mood,
            "negative_mood and positive_mood must differ (both {:?})",
            self.negative_mood
        );
        Ok(())
    }

    pub fn reference_now(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| Local::now().naive_local())
    }
}

fn load_config_overrides(path: &Path) -> Option<ConfigOverrides> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config overrides file not found; ignoring");
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read config overrides; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse config overrides; using env defaults"
            );
            None
        }
    }
}

fn apply_overrides(config: &mut AnalyticsConfig, overrides: &ConfigOverrides) -> Result<()> {
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    if let Some(path) = non_empty(&overrides.events_path) {
        config.events_path = PathBuf::from(path);
    }
    if let Some(path) = non_empty(&overrides.items_path) {
        config.items_path = PathBuf::from(path);
    }
    if let Some(path) = non_empty(&overrides.output_root) {
        config.output_root = PathBuf::from(path);
    }
    if let Some(raw) = non_empty(&overrides.now) {
        config.now = Some(parse_now("now", &raw)?);
    }
    if let Some(seed) = overrides.seed {
        config.seed = Some(seed);
    }
    if let Some(shards) = overrides.shards {
        config.shards = shards;
    }
    if let Some(value) = overrides.max_concurrent_jobs {
        config.max_concurrent_jobs = value;
    }
    if let Some(mood) = non_empty(&overrides.negative_mood) {
        config.negative_mood = mood;
    }
    if let Some(mood) = non_empty(&overrides.positive_mood) {
        config.positive_mood = mood;
    }
    if let Some(value) = overrides.recommendations_per_user {
        config.recommendations_per_user = value;
    }
    if let Some(value) = overrides.weekly_top_n {
        config.weekly_top_n = value;
    }
    if let Some(value) = overrides.weekly_window_days {
        config.weekly_window_days = value;
    }
    if let Some(value) = overrides.loyalty_cutoff {
        config.loyalty_cutoff = value;
    }
    if let Some(value) = overrides.night_start_hour {
        config.night_start_hour = value;
    }
    if let Some(value) = overrides.night_end_hour {
        config.night_end_hour = value;
    }
    Ok(())
}

fn apply_args(config: &mut AnalyticsConfig, args: &Args) -> Result<()> {
    if let Some(path) = args.events.clone() {
        config.events_path = path;
    }
    if let Some(path) = args.items.clone() {
        config.items_path = path;
    }
    if let Some(path) = args.output.clone() {
        config.output_root = path;
    }
    if let Some(raw) = args.now.as_deref() {
        config.now = Some(parse_now("--now", raw)?);
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(shards) = args.shards {
        config.shards = shards;
    }
    if let Some(value) = args.max_concurrent_jobs {
        config.max_concurrent_jobs = value;
    }
    Ok(())
}

fn parse_now(label: &str, raw: &str) -> Result<NaiveDateTime> {
    parse_timestamp(raw)
        .ok_or_else(|| anyhow!("invalid {label} (expected YYYY-MM-DD HH:MM:SS): {raw}"))
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid {key}: {raw}")),
        None => Ok(None),
    }
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
