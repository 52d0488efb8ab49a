use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

use index_storage::IndexName;

/// Hands out fragment names for one build run. Build-phase and merge-phase
/// names use different prefixes and independent counters, both starting at
/// zero, so no two calls ever return the same name.
#[derive(Debug)]
pub struct NameAllocator {
    build_prefix: IndexName,
    merge_prefix: IndexName,
    build_counter: AtomicU64,
    merge_counter: AtomicU64,
}

impl NameAllocator {
    pub fn new(build_prefix: IndexName, merge_prefix: IndexName) -> Self {
        Self {
            build_prefix,
            merge_prefix,
            build_counter: AtomicU64::new(0),
            merge_counter: AtomicU64::new(0),
        }
    }

    pub fn next_build_name(&self) -> IndexName {
        let n = self.build_counter.fetch_add(1, Ordering::Relaxed);
        IndexName::numbered(&self.build_prefix, n)
    }

    pub fn next_merge_name(&self) -> IndexName {
        let n = self.merge_counter.fetch_add(1, Ordering::Relaxed);
        IndexName::numbered(&self.merge_prefix, n)
    }

    pub fn num_build_names(&self) -> u64 {
        self.build_counter.load(Ordering::Relaxed)
    }

    pub fn num_merge_names(&self) -> u64 {
        self.merge_counter.load(Ordering::Relaxed)
    }

    /// True if `name` was handed out by this allocator.
    pub fn is_allocated(&self, name: &IndexName) -> bool {
        let allocated = |prefix: &IndexName, counter: &AtomicU64| {
            name.strip_prefix(&**prefix)
                .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|n| n.parse::<u64>().ok())
                // Counters never emit leading zeros, so "data_stream01" is foreign.
                .filter(|n| IndexName::numbered(prefix, *n) == *name)
                .is_some_and(|n| n < counter.load(Ordering::Relaxed))
        };
        allocated(&self.build_prefix, &self.build_counter)
            || allocated(&self.merge_prefix, &self.merge_counter)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        thread,
    };

    use index_storage::IndexName;

    use super::NameAllocator;

    fn allocator() -> NameAllocator {
        NameAllocator::new(
            "data_stream".parse().unwrap(),
            "data_merge".parse().unwrap(),
        )
    }

    #[test]
    fn test_counters_start_at_zero_and_are_independent() {
        let names = allocator();
        assert_eq!(&*names.next_build_name(), "data_stream0");
        assert_eq!(&*names.next_merge_name(), "data_merge0");
        assert_eq!(&*names.next_build_name(), "data_stream1");
        assert_eq!(&*names.next_build_name(), "data_stream2");
        assert_eq!(&*names.next_merge_name(), "data_merge1");
        assert_eq!(names.num_build_names(), 3);
        assert_eq!(names.num_merge_names(), 2);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 500;
        let names = allocator();
        let allocated: Vec<IndexName> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|i| {
                    let names = &names;
                    s.spawn(move || {
                        (0..PER_THREAD)
                            .map(|_| {
                                if i % 2 == 0 {
                                    names.next_build_name()
                                } else {
                                    names.next_merge_name()
                                }
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        let unique: HashSet<_> = allocated.iter().cloned().collect();
        assert_eq!(unique.len(), THREADS * PER_THREAD);
        assert_eq!(names.num_build_names() as usize, THREADS / 2 * PER_THREAD);
        assert!(allocated.iter().all(|name| names.is_allocated(name)));
    }

    #[test]
    fn test_is_allocated() {
        let names = allocator();
        let first = names.next_build_name();
        assert!(names.is_allocated(&first));
        for foreign in ["data_stream1", "data_stream01", "data_merge0", "data", "data_stream"] {
            assert!(
                !names.is_allocated(&foreign.parse().unwrap()),
                "{foreign} should not be allocated"
            );
        }
    }
}
