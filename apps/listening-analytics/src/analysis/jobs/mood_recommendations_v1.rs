use super::runner::stage;
use super::types::{JobContext, JobFailure, RecommendationRow};
use crate::analysis::partition::ShardPlan;
use crate::analysis::sampler::{sample_unheard, ExclusionSampleSpec};
use crate::analysis::sink::OutputStaging;
use crate::analysis::window::{count_by, top_k_per_group};
use crate::model::{EnrichedEvent, Item};
use std::cmp::Ordering;
use std::sync::Arc;

pub const JOB_TYPE: &str = "mood_recommendations_v1";
pub const LOCATION: &str = "happy_recommendations";

type MoodPlays<'a> = (&'a str, &'a str, u64);

fn by_plays_then_mood(a: &MoodPlays<'_>, b: &MoodPlays<'_>) -> Ordering {
    b.2.cmp(&a.2).then_with(|| a.1.cmp(b.1))
}

pub fn execute(ctx: &JobContext, sink: &OutputStaging) -> Result<u64, JobFailure> {
    stage(sink, JOB_TYPE, LOCATION, &compute(ctx))
}

/// Users whose most played mood (ties broken by mood name) is `mood`.
pub fn dominant_mood_cohort<'a>(rows: &'a [EnrichedEvent], plan: &ShardPlan, mood: &str) -> Vec<&'a str> {
    let plays: Vec<MoodPlays<'a>> = count_by(rows, |row| (row.user_id(), row.item.mood.as_str()))
        .into_iter()
        .map(|((user, row_mood), count)| (user, row_mood, count))
        .collect();

    let mut cohort: Vec<&str> = top_k_per_group(plays, plan, |row| row.0, by_plays_then_mood, 1)
        .into_iter()
        .filter(|(_, top_mood, _)| *top_mood == mood)
        .map(|(user, _, _)| user)
        .collect();
    cohort.sort_unstable();
    cohort
}

pub fn compute(ctx: &JobContext) -> Vec<RecommendationRow> {
    let config = &ctx.config;
    let cohort = dominant_mood_cohort(&ctx.enriched.rows, &ctx.plan, &config.negative_mood);
    let candidates: Vec<Arc<Item>> = ctx
        .items
        .iter()
        .filter(|item| item.mood == config.positive_mood)
        .cloned()
        .collect();
    tracing::info!(
        job_type = JOB_TYPE,
        cohort = cohort.len(),
        candidates = candidates.len(),
        negative_mood = %config.negative_mood,
        positive_mood = %config.positive_mood,
        "recommendation cohort selected"
    );

    let sampled = sample_unheard(
        &cohort,
        &ctx.enriched.rows,
        &candidates,
        &ctx.plan,
        ExclusionSampleSpec {
            per_user: config.recommendations_per_user,
            seed: config.seed,
        },
    );

    let mut rows: Vec<RecommendationRow> = sampled
        .into_iter()
        .map(|pick| RecommendationRow {
            user_id: pick.user_id,
            song_id: pick.item.song_id.clone(),
            title: pick.item.title.clone(),
            artist: pick.item.artist.clone(),
        })
        .collect();
    rows.sort_by(|a, b| a.user_id.cmp(&b.user_id).then_with(|| a.song_id.cmp(&b.song_id)));
    rows
}
