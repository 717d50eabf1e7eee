use super::runner::stage;
use super::types::{AvgListenTimeRow, JobContext, JobFailure};
use crate::analysis::sink::OutputStaging;
use crate::analysis::window::sum_count_by;

pub const JOB_TYPE: &str = "avg_listen_time_v1";
pub const LOCATION: &str = "avg_listen_time_per_song";

pub fn execute(ctx: &JobContext, sink: &OutputStaging) -> Result<u64, JobFailure> {
    stage(sink, JOB_TYPE, LOCATION, &compute(ctx))
}

/// Reads the raw log, so plays of songs missing from the catalog still count.
pub fn compute(ctx: &JobContext) -> Vec<AvgListenTimeRow> {
    let totals = sum_count_by(
        &ctx.events,
        |event| event.song_id.as_str(),
        |event| u64::from(event.duration_sec),
    );

    let mut rows: Vec<AvgListenTimeRow> = totals
        .into_iter()
        .map(|(song_id, totals)| AvgListenTimeRow {
            song_id: song_id.to_string(),
            avg_duration_sec: totals.mean(),
            play_count: totals.count,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.play_count
            .cmp(&a.play_count)
            .then_with(|| a.song_id.cmp(&b.song_id))
    });
    rows
}
