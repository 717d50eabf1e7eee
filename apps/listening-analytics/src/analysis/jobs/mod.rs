mod avg_listen_time_v1;
mod enriched_dump_v1;
mod favorite_genres_v1;
mod genre_loyalty_v1;
mod mood_recommendations_v1;
mod night_owls_v1;
mod runner;
mod top_songs_week_v1;
mod types;

pub use runner::{AnalysisRunner, JOBS};
pub use types::*;
