use super::runner::stage;
use super::types::{JobContext, JobFailure, LoyaltyRow};
use crate::analysis::sink::OutputStaging;
use crate::analysis::window::{count_by, max_ties_per_group, RatioThreshold};

pub const JOB_TYPE: &str = "genre_loyalty_v1";
pub const LOCATION: &str = "genre_loyalty_scores";

pub fn execute(ctx: &JobContext, sink: &OutputStaging) -> Result<u64, JobFailure> {
    stage(sink, JOB_TYPE, LOCATION, &compute(ctx))
}

/// `loyalty = plays of the user's top genre / all plays of the user`.
///
/// Every genre tied at the maximum yields its own row. Two tied genres hold at
/// most half of the plays each, so ties only pass a cutoff below 0.5.
pub fn compute(ctx: &JobContext) -> Vec<LoyaltyRow> {
    let threshold = RatioThreshold::new(ctx.config.loyalty_cutoff);
    let totals = count_by(&ctx.enriched.rows, |row| row.user_id());
    let plays: Vec<(&str, &str, u64)> = count_by(&ctx.enriched.rows, |row| {
        (row.user_id(), row.item.genre.as_str())
    })
    .into_iter()
    .map(|((user, genre), count)| (user, genre, count))
    .collect();

    let mut rows: Vec<LoyaltyRow> = max_ties_per_group(plays, &ctx.plan, |row| row.0, |row| row.2)
        .into_iter()
        .filter_map(|(user, genre, top)| {
            let total = totals.get(user).copied().unwrap_or(0);
            let score = if total == 0 {
                0.0
            } else {
                top as f64 / total as f64
            };
            threshold.admits(score).then(|| LoyaltyRow {
                user_id: user.to_string(),
                genre: genre.to_string(),
                loyalty_score: score,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.loyalty_score
            .total_cmp(&a.loyalty_score)
            .then_with(|| a.user_id.cmp(&b.user_id))
            .then_with(|| a.genre.cmp(&b.genre))
    });
    rows
}
