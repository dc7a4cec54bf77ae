//! Per-group span counters and the registry holding them.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::classify::SpanCategories;
use crate::key::GroupKey;

/// An accumulation period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Window {
    /// Since the previous rotation.
    Hourly,
    /// Since the last change of calendar day.
    Daily,
    /// Since the last change of calendar month.
    Monthly,
}

impl Window {
    /// All windows, in report order.
    pub const ALL: [Window; 3] = [Window::Hourly, Window::Daily, Window::Monthly];

    fn index(self) -> usize {
        match self {
            Window::Hourly => 0,
            Window::Daily => 1,
            Window::Monthly => 2,
        }
    }
}

/// A traffic classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// Every span.
    Total,
    /// HTTP server requests.
    Http,
    /// SQL-like database calls.
    Sql,
}

impl Category {
    /// All categories, in report order.
    pub const ALL: [Category; 3] = [Category::Total, Category::Http, Category::Sql];

    fn index(self) -> usize {
        match self {
            Category::Total => 0,
            Category::Http => 1,
            Category::Sql => 2,
        }
    }
}

/// A plain copy of the three category values of one window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowCounts {
    /// All spans.
    pub total: u64,
    /// HTTP server spans.
    pub http: u64,
    /// SQL spans.
    pub sql: u64,
}

impl WindowCounts {
    /// Value of one category.
    pub fn get(&self, category: Category) -> u64 {
        match category {
            Category::Total => self.total,
            Category::Http => self.http,
            Category::Sql => self.sql,
        }
    }
}

/// Nine independent counters: window × category.
///
/// Each counter is updated with its own atomic operation. A reader may see a
/// combination of values that never existed at a single instant.
#[derive(Default)]
pub struct CounterBlock {
    counters: [[AtomicU64; 3]; 3],
}

impl CounterBlock {
    fn counter(&self, window: Window, category: Category) -> &AtomicU64 {
        &self.counters[window.index()][category.index()]
    }

    /// Adds `amount` to every window of every category in `categories`.
    pub fn increment_all(&self, categories: SpanCategories, amount: u64) {
        for category in categories.iter() {
            for window in Window::ALL {
                self.counter(window, category)
                    .fetch_add(amount, Ordering::Relaxed);
            }
        }
    }

    /// Current value of one counter.
    pub fn get(&self, window: Window, category: Category) -> u64 {
        self.counter(window, category).load(Ordering::Relaxed)
    }

    /// Current values of one window.
    pub fn window(&self, window: Window) -> WindowCounts {
        WindowCounts {
            total: self.get(window, Category::Total),
            http: self.get(window, Category::Http),
            sql: self.get(window, Category::Sql),
        }
    }

    /// Removes a previously observed amount from one window, leaving any
    /// increments made after the observation in place.
    ///
    /// Saturates at zero, so committing the same observation twice never
    /// wraps a counter around.
    pub(crate) fn subtract(&self, window: Window, observed: WindowCounts) {
        for category in Category::ALL {
            let amount = observed.get(category);
            if amount > 0 {
                let _ = self.counter(window, category).fetch_update(
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                    |current| Some(current.saturating_sub(amount)),
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set(&self, window: Window, category: Category, value: u64) {
        self.counter(window, category)
            .store(value, Ordering::Relaxed);
    }
}

impl fmt::Debug for CounterBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterBlock")
            .field("hourly", &self.window(Window::Hourly))
            .field("daily", &self.window(Window::Daily))
            .field("monthly", &self.window(Window::Monthly))
            .finish()
    }
}

/// Concurrent mapping from [`GroupKey`] to its [`CounterBlock`].
///
/// Entries are created on first use and never removed. The map is sharded so
/// that ingestion for different groups does not contend on a single lock, and
/// the counters themselves are updated without holding any lock.
#[derive(Default)]
pub struct StatsRegistry {
    groups: DashMap<GroupKey, Arc<CounterBlock>>,
}

impl StatsRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        StatsRegistry::default()
    }

    /// Returns the counter block for `key`, creating it if needed.
    ///
    /// Concurrent callers with equal keys always receive the same block.
    pub fn get_or_create(&self, key: &GroupKey) -> Arc<CounterBlock> {
        if let Some(block) = self.groups.get(key) {
            return Arc::clone(block.value());
        }
        Arc::clone(self.groups.entry(key.clone()).or_default().value())
    }

    /// Returns the counter block for `key` if the group has been seen.
    pub fn get(&self, key: &GroupKey) -> Option<Arc<CounterBlock>> {
        self.groups.get(key).map(|block| Arc::clone(block.value()))
    }

    /// Copies out the current entries.
    ///
    /// Groups inserted while the copy is taken may or may not be included.
    pub fn entries(&self) -> Vec<(GroupKey, Arc<CounterBlock>)> {
        self.groups
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Visits a copy of the current entries without holding any map lock
    /// while `visitor` runs.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&GroupKey, &CounterBlock),
    {
        for (key, block) in self.entries() {
            visitor(&key, &block);
        }
    }

    /// Number of groups seen so far.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` if no span has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl fmt::Debug for StatsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsRegistry")
            .field("groups", &self.groups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, StatsRegistry, Window, WindowCounts};
    use crate::classify::SpanCategories;
    use crate::key::GroupKey;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn get_or_create_returns_same_block_for_equal_keys() {
        let registry = StatsRegistry::new();
        let a = registry.get_or_create(&GroupKey::new("svc", "dev"));
        let b = registry.get_or_create(&GroupKey::new("svc", "dev"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.get_or_create(&GroupKey::new("svc", "prod"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn increment_all_updates_every_window() {
        let registry = StatsRegistry::new();
        let block = registry.get_or_create(&GroupKey::default());

        block.increment_all(SpanCategories::other().with_http(), 1);
        block.increment_all(SpanCategories::other().with_sql(), 2);

        for window in Window::ALL {
            assert_eq!(
                block.window(window),
                WindowCounts {
                    total: 3,
                    http: 1,
                    sql: 2
                }
            );
        }
    }

    #[test]
    fn subtract_keeps_later_increments() {
        let registry = StatsRegistry::new();
        let block = registry.get_or_create(&GroupKey::default());
        block.increment_all(SpanCategories::other(), 5);

        let observed = block.window(Window::Hourly);
        block.increment_all(SpanCategories::other(), 2);
        block.subtract(Window::Hourly, observed);

        assert_eq!(block.get(Window::Hourly, Category::Total), 2);
        assert_eq!(block.get(Window::Daily, Category::Total), 7);
    }

    #[test]
    fn subtract_saturates_at_zero() {
        let registry = StatsRegistry::new();
        let block = registry.get_or_create(&GroupKey::default());
        block.increment_all(SpanCategories::other().with_sql(), 3);

        let observed = block.window(Window::Hourly);
        block.subtract(Window::Hourly, observed);
        block.subtract(Window::Hourly, observed);

        assert_eq!(block.window(Window::Hourly), WindowCounts::default());
        assert_eq!(block.get(Window::Monthly, Category::Sql), 3);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let registry = Arc::new(StatsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        registry
                            .get_or_create(&GroupKey::new("svc", "prod"))
                            .increment_all(SpanCategories::other().with_http(), 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let block = registry.get(&GroupKey::new("svc", "prod")).unwrap();
        assert_eq!(registry.len(), 1);
        for window in Window::ALL {
            assert_eq!(block.get(window, Category::Total), 8_000);
            assert_eq!(block.get(window, Category::Http), 8_000);
            assert_eq!(block.get(window, Category::Sql), 0);
        }
    }

    #[test]
    fn for_each_visits_every_group() {
        let registry = StatsRegistry::new();
        registry.get_or_create(&GroupKey::new("a", "dev"));
        registry.get_or_create(&GroupKey::new("b", "dev"));

        let mut seen = Vec::new();
        registry.for_each(|key, _| seen.push(key.clone()));
        seen.sort();

        assert_eq!(seen, vec![GroupKey::new("a", "dev"), GroupKey::new("b", "dev")]);
    }
}
