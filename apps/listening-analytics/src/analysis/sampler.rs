//! Exclusion sampling: for every user in a cohort, draw up to K catalog items
//! the user has never played.
//!
//! The work is a group-wise anti-join followed by a bounded group-wise sample:
//!
//! 1. (user, song) pairs already played by the cohort are routed to the shard
//!    that owns the user.
//! 2. Each shard streams cohort × candidates for its own users, drops every
//!    pair present in step 1 and feeds the survivors into a per-user reservoir.
//!
//! Shards run in parallel and own their RNG and reservoirs, so there is no
//! shared mutable state and no per-user round trip through a coordinator.

use super::partition::ShardPlan;
use crate::model::{EnrichedEvent, Item};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Uniform fixed-size sample over a stream of unknown length (Algorithm R).
#[derive(Debug, Clone)]
pub struct Reservoir<T> {
    capacity: usize,
    seen: u64,
    items: Vec<T>,
}

impl<T> Reservoir<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: 0,
            items: Vec::with_capacity(capacity.min(16)),
        }
    }

    pub fn offer<R: Rng + ?Sized>(&mut self, item: T, rng: &mut R) {
        if self.capacity == 0 {
            return;
        }
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(item);
            return;
        }
        let slot = rng.gen_range(0..self.seen);
        if slot < self.capacity as u64 {
            self.items[slot as usize] = item;
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

#[derive(Debug, Clone)]
pub struct SampledItem {
    pub user_id: String,
    pub item: Arc<Item>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExclusionSampleSpec {
    pub per_user: usize,
    pub seed: Option<u64>,
}

pub fn sample_unheard(
    cohort: &[&str],
    enriched: &[EnrichedEvent],
    candidates: &[Arc<Item>],
    plan: &ShardPlan,
    spec: ExclusionSampleSpec,
) -> Vec<SampledItem> {
    if cohort.is_empty() || candidates.is_empty() || spec.per_user == 0 {
        return vec![];
    }

    let members: HashSet<&str> = cohort.iter().copied().collect();
    let heard_by_shard = plan.par_partition(enriched, |row| {
        members.contains(row.user_id()).then(|| row.user_id())
    });
    let cohort_by_shard = plan.partition(members.iter().copied(), |user| *user);

    cohort_by_shard
        .into_par_iter()
        .zip(heard_by_shard)
        .enumerate()
        .flat_map_iter(|(shard, (mut users, heard_rows))| {
            let mut heard: HashMap<&str, HashSet<&str>> = HashMap::new();
            for row in heard_rows {
                heard.entry(row.user_id()).or_default().insert(row.song_id());
            }

            let mut rng = shard_rng(spec.seed, shard);
            users.sort_unstable();
            let mut out = Vec::new();
            for user in users {
                let played = heard.get(user);
                let mut reservoir = Reservoir::new(spec.per_user);
                for item in candidates {
                    if played.is_some_and(|songs| songs.contains(item.song_id.as_str())) {
                        continue;
                    }
                    reservoir.offer(item, &mut rng);
                }
                tracing::trace!(shard, user, eligible = reservoir.seen(), "unheard candidates sampled");
                out.extend(reservoir.into_vec().into_iter().map(|item| SampledItem {
                    user_id: user.to_string(),
                    item: Arc::clone(item),
                }));
            }
            out
        })
        .collect()
}

fn shard_rng(seed: Option<u64>, shard: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(
            seed.wrapping_add(shard as u64)
                .wrapping_mul(0x9E37_79B9_7F4A_7C15),
        ),
        None => StdRng::from_entropy(),
    }
}
