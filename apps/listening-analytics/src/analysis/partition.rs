use rayon::prelude::*;
use xxhash_rust::xxh3::xxh3_64;

/// Hash partitioning for shard-local grouped work. Every row with the same key
/// lands in the same shard, so per-key state never crosses shard boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPlan {
    shards: u32,
}

impl ShardPlan {
    pub fn new(shards: u32) -> Self {
        Self {
            shards: shards.max(1),
        }
    }

    pub fn shards(&self) -> usize {
        self.shards as usize
    }

    pub fn shard_for_key(&self, key: &str) -> usize {
        (xxh3_64(key.as_bytes()) % self.shards as u64) as usize
    }

    pub fn partition<T, F>(&self, rows: impl IntoIterator<Item = T>, key_of: F) -> Vec<Vec<T>>
    where
        F: Fn(&T) -> &str,
    {
        let mut out: Vec<Vec<T>> = (0..self.shards()).map(|_| Vec::new()).collect();
        for row in rows {
            let shard = self.shard_for_key(key_of(&row));
            out[shard].push(row);
        }
        out
    }

    /// Parallel routing of borrowed rows; rows whose key is `None` are dropped.
    pub fn par_partition<'a, T, F>(&self, rows: &'a [T], key_of: F) -> Vec<Vec<&'a T>>
    where
        T: Sync,
        F: Fn(&'a T) -> Option<&'a str> + Sync,
    {
        let shards = self.shards();
        rows.par_iter()
            .fold(
                || vec![Vec::new(); shards],
                |mut acc: Vec<Vec<&'a T>>, row| {
                    if let Some(key) = key_of(row) {
                        acc[self.shard_for_key(key)].push(row);
                    }
                    acc
                },
            )
            .reduce(
                || vec![Vec::new(); shards],
                |mut a, b| {
                    for (into, from) in a.iter_mut().zip(b) {
                        into.extend(from);
                    }
                    a
                },
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_is_deterministic_and_in_range() {
        let plan = ShardPlan::new(16);
        let a = plan.shard_for_key("U000123");
        let b = plan.shard_for_key("U000123");
        assert_eq!(a, b);
        assert!(a < plan.shards());
    }

    #[test]
    fn zero_shards_collapse_to_one() {
        let plan = ShardPlan::new(0);
        assert_eq!(plan.shards(), 1);
        assert_eq!(plan.shard_for_key("anything"), 0);
    }

    #[test]
    fn partition_keeps_equal_keys_together() {
        let plan = ShardPlan::new(4);
        let rows = vec!["U1", "U2", "U1", "U3", "U2", "U1"];
        let shards = plan.partition(rows, |row| *row);
        assert_eq!(shards.len(), 4);
        assert_eq!(shards.iter().map(Vec::len).sum::<usize>(), 6);
        let home = plan.shard_for_key("U1");
        assert_eq!(shards[home].iter().filter(|r| **r == "U1").count(), 3);
    }

    #[test]
    fn par_partition_routes_like_partition_and_drops_unkeyed_rows() {
        let plan = ShardPlan::new(3);
        let rows: Vec<String> = (0..200).map(|i| format!("U{}", i % 17)).collect();
        let shards = plan.par_partition(&rows, |row| {
            if row.as_str() == "U0" {
                None
            } else {
                Some(row.as_str())
            }
        });
        let routed: usize = shards.iter().map(Vec::len).sum();
        assert_eq!(routed, rows.iter().filter(|r| r.as_str() != "U0").count());
        for (idx, shard) in shards.iter().enumerate() {
            assert!(shard.iter().all(|row| plan.shard_for_key(row) == idx));
        }
    }
}
