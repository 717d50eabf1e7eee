use super::runner::stage;
use super::types::{FavoriteGenreRow, JobContext, JobFailure};
use crate::analysis::sink::OutputStaging;
use crate::analysis::window::{count_by, top_k_per_group};
use std::cmp::Ordering;

pub const JOB_TYPE: &str = "favorite_genres_v1";
pub const LOCATION: &str = "user_favorite_genres";

type GenrePlays<'a> = (&'a str, &'a str, u64);

fn by_plays_then_genre(a: &GenrePlays<'_>, b: &GenrePlays<'_>) -> Ordering {
    b.2.cmp(&a.2).then_with(|| a.1.cmp(b.1))
}

pub fn execute(ctx: &JobContext, sink: &OutputStaging) -> Result<u64, JobFailure> {
    stage(sink, JOB_TYPE, LOCATION, &compute(ctx))
}

/// One row per user: the genre with the most enriched plays.
pub fn compute(ctx: &JobContext) -> Vec<FavoriteGenreRow> {
    let plays = count_by(&ctx.enriched.rows, |row| {
        (row.user_id(), row.item.genre.as_str())
    });
    let candidates: Vec<GenrePlays<'_>> = plays
        .into_iter()
        .map(|((user, genre), count)| (user, genre, count))
        .collect();

    let mut rows: Vec<FavoriteGenreRow> =
        top_k_per_group(candidates, &ctx.plan, |row| row.0, by_plays_then_genre, 1)
            .into_iter()
            .map(|(user, genre, play_count)| FavoriteGenreRow {
                user_id: user.to_string(),
                genre: genre.to_string(),
                play_count,
            })
            .collect();
    rows.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{event, item, job_context, scenario_a};

    #[test]
    fn scenario_a_user_prefers_pop() {
        let (events, items) = scenario_a();
        let rows = compute(&job_context(events, items));
        assert_eq!(
            rows,
            vec![FavoriteGenreRow {
                user_id: "U1".to_string(),
                genre: "Pop".to_string(),
                play_count: 2,
            }]
        );
    }

    #[test]
    fn one_row_per_user_sorted_with_lexical_tie_break() {
        let items = vec![
            item("S1", "a", "x", "Rock", "Sad"),
            item("S2", "b", "x", "Jazz", "Sad"),
            item("S3", "c", "x", "Pop", "Happy"),
        ];
        let events = vec![
            event("U2", "S1", "2025-03-14 10:00:00", 1),
            event("U2", "S2", "2025-03-14 10:00:00", 1),
            event("U1", "S3", "2025-03-14 10:00:00", 1),
            event("U1", "S3", "2025-03-14 10:00:00", 1),
            event("U1", "S1", "2025-03-14 10:00:00", 1),
            event("U3", "S404", "2025-03-14 10:00:00", 1),
        ];
        let rows = compute(&job_context(events, items));
        let flat: Vec<(&str, &str, u64)> = rows
            .iter()
            .map(|r| (r.user_id.as_str(), r.genre.as_str(), r.play_count))
            .collect();
        assert_eq!(flat, vec![("U1", "Pop", 2), ("U2", "Jazz", 1)]);
    }

    #[test]
    fn empty_log_yields_no_rows() {
        let (_, items) = scenario_a();
        assert!(compute(&job_context(vec![], items)).is_empty());
    }
}
