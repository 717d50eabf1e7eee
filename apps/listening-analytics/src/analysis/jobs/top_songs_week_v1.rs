use super::runner::stage;
use super::types::{JobContext, JobFailure, TopSongRow};
use crate::analysis::sink::OutputStaging;
use crate::analysis::window::{count_by, top_k};
use crate::model::EnrichedEvent;
use chrono::{Duration, NaiveDateTime};
use rayon::prelude::*;
use std::cmp::Ordering;

pub const JOB_TYPE: &str = "top_songs_week_v1";
pub const LOCATION: &str = "top_songs_this_week";

type SongPlays<'a> = ((&'a str, &'a str, &'a str), u64);

fn by_plays_then_song(a: &SongPlays<'_>, b: &SongPlays<'_>) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0 .0.cmp(b.0 .0))
}

pub fn execute(ctx: &JobContext, sink: &OutputStaging) -> Result<u64, JobFailure> {
    stage(sink, JOB_TYPE, LOCATION, &compute(ctx))
}

/// Inclusive `[now - days, now]`.
pub fn window_bounds(now: NaiveDateTime, days: i64) -> (NaiveDateTime, NaiveDateTime) {
    let start = Duration::try_days(days)
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(NaiveDateTime::MIN);
    (start, now)
}

pub fn compute(ctx: &JobContext) -> Vec<TopSongRow> {
    let (start, end) = window_bounds(ctx.now, ctx.config.weekly_window_days);
    let in_window: Vec<&EnrichedEvent> = ctx
        .enriched
        .rows
        .par_iter()
        .filter(|row| row.event.timestamp >= start && row.event.timestamp <= end)
        .collect();
    tracing::debug!(
        job_type = JOB_TYPE,
        window_start = %start,
        window_end = %end,
        rows = in_window.len(),
        "weekly window applied"
    );

    let plays: Vec<SongPlays<'_>> = count_by(&in_window, |row| {
        (row.song_id(), row.item.title.as_str(), row.item.artist.as_str())
    })
    .into_iter()
    .collect();

    top_k(plays, by_plays_then_song, ctx.config.weekly_top_n)
        .into_iter()
        .map(|((song_id, title, artist), play_count)| TopSongRow {
            song_id: song_id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            play_count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_timestamp;
    use crate::test_support::{event, item, job_context, job_context_with, test_config};

    #[test]
    fn window_edges_are_inclusive() {
        let items = vec![item("S1", "One", "X", "Pop", "Happy")];
        let events = vec![
            event("U1", "S1", "2025-03-08 12:00:00", 1),
            event("U1", "S1", "2025-03-15 12:00:00", 1),
            event("U1", "S1", "2025-03-08 11:59:59", 1),
            event("U1", "S1", "2025-03-15 12:00:01", 1),
        ];
        let rows = compute(&job_context(events, items));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].play_count, 2);
        assert_eq!(rows[0].title, "One");
    }

    #[test]
    fn keeps_top_n_with_song_id_tie_break() {
        let items: Vec<_> = (0..5)
            .map(|i| item(&format!("S{i}"), "t", "a", "Pop", "Happy"))
            .collect();
        let mut events = Vec::new();
        for (song, plays) in [("S0", 1), ("S1", 3), ("S2", 3), ("S3", 2), ("S4", 3)] {
            for _ in 0..plays {
                events.push(event("U1", song, "2025-03-14 10:00:00", 1));
            }
        }
        let mut config = test_config();
        config.weekly_top_n = 3;
        let rows = compute(&job_context_with(events, items, config));
        let order: Vec<(&str, u64)> = rows.iter().map(|r| (r.song_id.as_str(), r.play_count)).collect();
        assert_eq!(order, vec![("S1", 3), ("S2", 3), ("S4", 3)]);
    }

    #[test]
    fn different_reference_times_move_the_window() {
        let items = vec![item("S1", "One", "X", "Pop", "Happy")];
        let events = vec![event("U1", "S1", "2025-01-01 00:00:00", 1)];
        assert!(compute(&job_context(events.clone(), items.clone())).is_empty());

        let mut config = test_config();
        config.now = parse_timestamp("2025-01-03 00:00:00");
        assert_eq!(compute(&job_context_with(events, items, config)).len(), 1);
    }
}
