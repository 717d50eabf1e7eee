//! Grouped ranking and aggregation primitives.
//!
//! Every helper here is data-parallel: rows are either folded in parallel
//! chunks and merged, or hash-partitioned so that each group is owned by a
//! single shard. Orderings passed in must be total (measure first, then a
//! deterministic secondary key) so results never depend on input order.

use super::partition::ShardPlan;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

/// Bounded best-K buffer, kept sorted by `order` (smallest = best).
#[derive(Debug, Clone)]
pub struct TopK<R> {
    k: usize,
    rows: Vec<R>,
}

impl<R> TopK<R> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            rows: Vec::with_capacity(k.min(64)),
        }
    }

    pub fn offer<F>(&mut self, row: R, order: &F)
    where
        F: Fn(&R, &R) -> Ordering,
    {
        if self.k == 0 {
            return;
        }
        if self.rows.len() == self.k {
            match self.rows.last() {
                Some(worst) if order(&row, worst) != Ordering::Less => return,
                _ => {}
            }
        }
        let pos = self
            .rows
            .partition_point(|existing| order(existing, &row) != Ordering::Greater);
        self.rows.insert(pos, row);
        self.rows.truncate(self.k);
    }

    pub fn merge<F>(mut self, other: TopK<R>, order: &F) -> Self
    where
        F: Fn(&R, &R) -> Ordering,
    {
        for row in other.rows {
            self.offer(row, order);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_sorted_vec(self) -> Vec<R> {
        self.rows
    }
}

/// Global top-K: parallel partial buffers merged pairwise.
pub fn top_k<R, F>(rows: Vec<R>, order: F, k: usize) -> Vec<R>
where
    R: Send,
    F: Fn(&R, &R) -> Ordering + Sync,
{
    rows.into_par_iter()
        .fold(
            || TopK::new(k),
            |mut acc, row| {
                acc.offer(row, &order);
                acc
            },
        )
        .reduce(|| TopK::new(k), |a, b| a.merge(b, &order))
        .into_sorted_vec()
}

/// Keeps the best `k` rows of every group. Groups are routed to shards by key,
/// each shard ranks its own groups, and results are concatenated (group order
/// is unspecified; rows within a group come out best first).
pub fn top_k_per_group<R, G, F>(rows: Vec<R>, plan: &ShardPlan, group_of: G, order: F, k: usize) -> Vec<R>
where
    R: Send,
    G: Fn(&R) -> &str + Sync,
    F: Fn(&R, &R) -> Ordering + Sync,
{
    plan.partition(rows, |row| group_of(row))
        .into_par_iter()
        .flat_map_iter(|shard| {
            let mut groups: HashMap<String, TopK<R>> = HashMap::new();
            for row in shard {
                let key = group_of(&row).to_string();
                groups
                    .entry(key)
                    .or_insert_with(|| TopK::new(k))
                    .offer(row, &order);
            }
            groups.into_values().flat_map(TopK::into_sorted_vec)
        })
        .collect()
}

/// Keeps every row whose measure equals the maximum of its group, so ties at
/// the top all survive. Grouping and sharding follow `top_k_per_group`.
pub fn max_ties_per_group<R, G, M>(rows: Vec<R>, plan: &ShardPlan, group_of: G, measure_of: M) -> Vec<R>
where
    R: Send,
    G: Fn(&R) -> &str + Sync,
    M: Fn(&R) -> u64 + Sync,
{
    plan.partition(rows, |row| group_of(row))
        .into_par_iter()
        .flat_map_iter(|shard| {
            let mut groups: HashMap<String, (u64, Vec<R>)> = HashMap::new();
            for row in shard {
                let measure = measure_of(&row);
                let (best, kept) = groups.entry(group_of(&row).to_string()).or_default();
                if kept.is_empty() || measure > *best {
                    *best = measure;
                    kept.clear();
                    kept.push(row);
                } else if measure == *best {
                    kept.push(row);
                }
            }
            groups.into_values().flat_map(|(_, kept)| kept)
        })
        .collect()
}

pub fn count_by<'a, T, K, F>(rows: &'a [T], key_of: F) -> HashMap<K, u64>
where
    T: Sync,
    K: Hash + Eq + Send,
    F: Fn(&'a T) -> K + Sync,
{
    rows.par_iter()
        .fold(HashMap::new, |mut acc: HashMap<K, u64>, row| {
            *acc.entry(key_of(row)).or_insert(0) += 1;
            acc
        })
        .reduce(HashMap::new, |a, b| merge_maps(a, b, |x, y| *x += y))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SumCount {
    pub sum: u64,
    pub count: u64,
}

impl SumCount {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

pub fn sum_count_by<'a, T, K, FK, FV>(rows: &'a [T], key_of: FK, value_of: FV) -> HashMap<K, SumCount>
where
    T: Sync,
    K: Hash + Eq + Send,
    FK: Fn(&'a T) -> K + Sync,
    FV: Fn(&'a T) -> u64 + Sync,
{
    rows.par_iter()
        .fold(HashMap::new, |mut acc: HashMap<K, SumCount>, row| {
            let entry = acc.entry(key_of(row)).or_default();
            entry.sum += value_of(row);
            entry.count += 1;
            acc
        })
        .reduce(HashMap::new, |a, b| {
            merge_maps(a, b, |x, y| {
                x.sum += y.sum;
                x.count += y.count;
            })
        })
}

fn merge_maps<K, V, M>(a: HashMap<K, V>, b: HashMap<K, V>, combine: M) -> HashMap<K, V>
where
    K: Hash + Eq,
    M: Fn(&mut V, V),
{
    let (mut big, small) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    for (key, value) in small {
        match big.get_mut(&key) {
            Some(existing) => combine(existing, value),
            None => {
                big.insert(key, value);
            }
        }
    }
    big
}

/// Post-aggregation predicate: keeps values strictly above the cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioThreshold {
    pub cutoff: f64,
}

impl RatioThreshold {
    pub fn new(cutoff: f64) -> Self {
        Self { cutoff }
    }

    pub fn admits(&self, value: f64) -> bool {
        value.is_finite() && value > self.cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_count_then_name(a: &(&str, &str, u64), b: &(&str, &str, u64)) -> Ordering {
        b.2.cmp(&a.2).then_with(|| a.1.cmp(b.1))
    }

    #[test]
    fn top_k_buffer_keeps_best_rows_sorted() {
        let order = |a: &u64, b: &u64| b.cmp(a);
        let mut buf = TopK::new(3);
        for v in [5, 1, 9, 7, 3, 9] {
            buf.offer(v, &order);
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.into_sorted_vec(), vec![9, 9, 7]);
    }

    #[test]
    fn zero_k_keeps_nothing() {
        let order = |a: &u64, b: &u64| b.cmp(a);
        let mut buf = TopK::new(0);
        buf.offer(1, &order);
        assert!(buf.is_empty());
    }

    #[test]
    fn per_group_top_k_is_complete_and_dominant() {
        let rows = vec![
            ("U1", "Pop", 5),
            ("U1", "Rock", 2),
            ("U1", "Jazz", 9),
            ("U1", "Folk", 1),
            ("U2", "Pop", 3),
            ("U3", "Rock", 4),
            ("U3", "Indie", 4),
        ];
        let plan = ShardPlan::new(4);
        let k = 2;
        let top = top_k_per_group(rows.clone(), &plan, |r| r.0, by_count_then_name, k);

        for user in ["U1", "U2", "U3"] {
            let members: Vec<_> = rows.iter().filter(|r| r.0 == user).collect();
            let kept: Vec<_> = top.iter().filter(|r| r.0 == user).collect();
            assert_eq!(kept.len(), members.len().min(k), "{user}");
            let min_kept = kept.iter().map(|r| r.2).min().unwrap();
            for dropped in members.iter().filter(|m| !kept.contains(*m)) {
                assert!(dropped.2 <= min_kept);
            }
        }
    }

    #[test]
    fn ties_break_lexically_regardless_of_input_order() {
        let plan = ShardPlan::new(2);
        let forward = vec![("U1", "Rock", 4), ("U1", "Indie", 4), ("U1", "Pop", 1)];
        let mut backward = forward.clone();
        backward.reverse();
        let a = top_k_per_group(forward, &plan, |r| r.0, by_count_then_name, 1);
        let b = top_k_per_group(backward, &plan, |r| r.0, by_count_then_name, 1);
        assert_eq!(a, vec![("U1", "Indie", 4)]);
        assert_eq!(a, b);
    }

    #[test]
    fn max_ties_keep_every_row_at_the_group_maximum() {
        let rows = vec![
            ("U1", "Rock", 4u64),
            ("U1", "Pop", 1),
            ("U1", "Indie", 4),
            ("U2", "Jazz", 0),
            ("U3", "Folk", 2),
            ("U3", "Pop", 7),
        ];
        let mut kept = max_ties_per_group(rows, &ShardPlan::new(3), |r| r.0, |r| r.2);
        kept.sort();
        assert_eq!(
            kept,
            vec![("U1", "Indie", 4), ("U1", "Rock", 4), ("U2", "Jazz", 0), ("U3", "Pop", 7)]
        );
    }

    #[test]
    fn global_top_k_matches_sequential_sort() {
        let rows: Vec<u64> = (0..1_000).map(|i| (i * 7919) % 1_009).collect();
        let mut expected = rows.clone();
        expected.sort_by(|a, b| b.cmp(a));
        expected.truncate(10);
        assert_eq!(top_k(rows, |a: &u64, b: &u64| b.cmp(a), 10), expected);
    }

    #[test]
    fn counts_and_means_are_exact() {
        let rows = vec![("S1", 200u64), ("S1", 210), ("S2", 30), ("S1", 100)];
        let counts = count_by(&rows, |r| r.0);
        assert_eq!(counts["S1"], 3);
        assert_eq!(counts["S2"], 1);

        let sums = sum_count_by(&rows, |r| r.0, |r| r.1);
        assert_eq!(sums["S1"], SumCount { sum: 510, count: 3 });
        assert!((sums["S1"].mean() - 170.0).abs() < 1e-9);
        assert_eq!(SumCount::default().mean(), 0.0);
    }

    #[test]
    fn threshold_is_strict() {
        let threshold = RatioThreshold::new(0.8);
        assert!(!threshold.admits(0.8));
        assert!(threshold.admits(0.81));
        assert!(threshold.admits(1.0));
        assert!(!threshold.admits(f64::NAN));
    }
}
