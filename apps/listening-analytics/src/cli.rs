use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "listening-analytics",
    version,
    about = "Batch analytics over listening logs and song metadata"
)]
pub struct Args {
    /// Listening log CSV (user_id,song_id,timestamp,duration_sec).
    #[arg(long)]
    pub events: Option<PathBuf>,
    /// Song metadata CSV (song_id,title,artist,genre,mood).
    #[arg(long)]
    pub items: Option<PathBuf>,
    /// Output root; replaced as a whole on success.
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Optional JSON file with config overrides (otherwise ANALYTICS_CONFIG_PATH).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Reference time for the weekly window, "YYYY-MM-DD HH:MM:SS". Default: local now.
    #[arg(long)]
    pub now: Option<String>,
    /// Seed for recommendation sampling (reproducible runs).
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub shards: Option<u32>,
    #[arg(long)]
    pub max_concurrent_jobs: Option<usize>,
}
