use std::sync::{
    atomic::{AtomicIsize, Ordering},
    OnceLock,
};

use super::CachePadded;

// A sharded atomic counter, tracking the number of live keys in the map.
pub struct Counter(Box<[CachePadded<AtomicIsize>]>);

impl Default for Counter {
    fn default() -> Counter {
        // Every map sizes its shards the same way, so query the CPU count once.
        static CPUS: OnceLock<usize> = OnceLock::new();
        let num_cpus = *CPUS.get_or_init(|| {
            std::thread::available_parallelism()
                .map(Into::into)
                .unwrap_or(1)
        });

        // A power of two, so a thread id can be masked to a shard.
        let shards = (0..num_cpus.next_power_of_two())
            .map(|_| Default::default())
            .collect();

        Counter(shards)
    }
}

impl Counter {
    // Returns the shard owned by the guard's thread.
    #[inline]
    pub fn get(&self, guard: &impl seize::Guard) -> &AtomicIsize {
        // Guard thread IDs are allocated densely, so masking them spreads
        // threads evenly across shards.
        let shard = guard.thread_id() & (self.0.len() - 1);

        &self.0[shard].value
    }

    // Returns the sum of all counter shards.
    #[inline]
    pub fn sum(&self) -> usize {
        self.0
            .iter()
            .map(|x| x.value.load(Ordering::Relaxed))
            .sum::<isize>()
            .try_into()
            // A removal may be counted before the insertion it observed,
            // in which case we assume the map is empty.
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_across_shards() {
        let collector = seize::Collector::new();
        let counter = Counter::default();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let guard = collector.enter();
                    for _ in 0..100 {
                        counter.get(&guard).fetch_add(1, Ordering::Relaxed);
                    }
                    counter.get(&guard).fetch_sub(10, Ordering::Relaxed);
                });
            }
        });

        assert_eq!(counter.sum(), 360);
    }

    #[test]
    fn negative_sum_is_empty() {
        let collector = seize::Collector::new();
        let counter = Counter::default();
        counter
            .get(&collector.enter())
            .fetch_sub(1, Ordering::Relaxed);
        assert_eq!(counter.sum(), 0);
    }
}
