use crate::model::{EnrichedEvent, Event, Item};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct EnrichedRelation {
    pub rows: Vec<EnrichedEvent>,
    /// Events whose song_id has no catalog row. They are excluded from `rows`
    /// but still count toward analyses that read the raw log.
    pub orphan_events: u64,
}

/// Inner join of the listening log with the catalog on `song_id`.
///
/// The catalog is indexed once; events are probed in parallel and the output
/// keeps the log order.
pub fn enrich(events: &[Event], items: &[Arc<Item>]) -> EnrichedRelation {
    let started = Instant::now();
    let index: HashMap<&str, &Arc<Item>> = items
        .iter()
        .map(|item| (item.song_id.as_str(), item))
        .collect();

    let rows: Vec<EnrichedEvent> = events
        .par_iter()
        .filter_map(|event| {
            index.get(event.song_id.as_str()).map(|item| EnrichedEvent {
                event: event.clone(),
                item: Arc::clone(item),
            })
        })
        .collect();

    let orphan_events = (events.len() - rows.len()) as u64;
    tracing::info!(
        phase = "join",
        events = events.len(),
        items = items.len(),
        enriched = rows.len(),
        orphan_events,
        duration_ms = started.elapsed().as_millis() as u64,
        "listening log joined with song metadata; orphan events excluded from enriched relation"
    );
    EnrichedRelation {
        rows,
        orphan_events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{event, item};
    use std::collections::HashSet;

    #[test]
    fn cardinality_matches_events_with_known_songs() {
        let items = vec![
            item("S001", "A", "X", "Pop", "Happy"),
            item("S002", "B", "Y", "Pop", "Sad"),
            item("S003", "C", "Z", "Rock", "Chill"),
        ];
        let events = vec![
            event("U1", "S002", "2025-03-10 10:00:00", 200),
            event("U1", "S999", "2025-03-10 11:00:00", 100),
            event("U2", "S001", "2025-03-10 12:00:00", 150),
            event("U2", "S002", "2025-03-10 13:00:00", 90),
            event("U3", "S404", "2025-03-10 14:00:00", 30),
        ];
        let known: HashSet<&str> = items.iter().map(|i| i.song_id.as_str()).collect();
        let expected = events
            .iter()
            .filter(|e| known.contains(e.song_id.as_str()))
            .count();

        let relation = enrich(&events, &items);
        assert_eq!(relation.rows.len(), expected);
        assert_eq!(relation.orphan_events, 2);
        assert!(relation.rows.iter().all(|row| row.song_id() != "S999"));
        assert!(relation
            .rows
            .iter()
            .all(|row| row.item.song_id == row.event.song_id));
    }

    #[test]
    fn output_set_is_independent_of_event_order() {
        let items = vec![
            item("S001", "A", "X", "Pop", "Happy"),
            item("S002", "B", "Y", "Jazz", "Sad"),
        ];
        let mut events = vec![
            event("U1", "S001", "2025-03-10 10:00:00", 1),
            event("U2", "S002", "2025-03-10 10:00:01", 2),
            event("U3", "S003", "2025-03-10 10:00:02", 3),
            event("U4", "S001", "2025-03-10 10:00:03", 4),
        ];
        let key = |rel: &EnrichedRelation| {
            let mut rows: Vec<(String, String, u32)> = rel
                .rows
                .iter()
                .map(|r| (r.event.user_id.clone(), r.item.genre.clone(), r.event.duration_sec))
                .collect();
            rows.sort();
            rows
        };
        let forward = key(&enrich(&events, &items));
        events.reverse();
        let backward = key(&enrich(&events, &items));
        assert_eq!(forward, backward);
    }

    #[test]
    fn empty_inputs_join_to_empty_relation() {
        let relation = enrich(&[], &[]);
        assert!(relation.rows.is_empty());
        assert_eq!(relation.orphan_events, 0);

        let events = vec![event("U1", "S001", "2025-03-10 10:00:00", 1)];
        let relation = enrich(&events, &[]);
        assert!(relation.rows.is_empty());
        assert_eq!(relation.orphan_events, 1);
    }
}
