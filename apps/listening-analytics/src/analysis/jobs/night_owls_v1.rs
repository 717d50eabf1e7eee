use super::runner::stage;
use super::types::{JobContext, JobFailure, NightOwlRow};
use crate::analysis::sink::OutputStaging;
use crate::analysis::window::count_by;
use crate::model::Event;
use chrono::Timelike;
use rayon::prelude::*;

pub const JOB_TYPE: &str = "night_owls_v1";
pub const LOCATION: &str = "night_owl_users";

pub fn execute(ctx: &JobContext, sink: &OutputStaging) -> Result<u64, JobFailure> {
    stage(sink, JOB_TYPE, LOCATION, &compute(ctx))
}

/// Plays per user whose hour of day falls in `[start, end)`, over the raw log.
pub fn compute(ctx: &JobContext) -> Vec<NightOwlRow> {
    let hours = ctx.config.night_start_hour..ctx.config.night_end_hour;
    let night: Vec<&Event> = ctx
        .events
        .par_iter()
        .filter(|event| hours.contains(&event.timestamp.hour()))
        .collect();

    let mut rows: Vec<NightOwlRow> = count_by(&night, |event| event.user_id.as_str())
        .into_iter()
        .map(|(user_id, night_plays)| NightOwlRow {
            user_id: user_id.to_string(),
            night_plays,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.night_plays
            .cmp(&a.night_plays)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    rows
}
