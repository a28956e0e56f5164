//! How a newly accepted or connected session is assigned to one of a
//! service's pool of [`SelectorProcessor`](crate::processor::SelectorProcessor)s.
//!
//! A strategy only picks an index into the pool; the actual handoff
//! (registering the session's stream with that processor's selector)
//! is the processor's own job.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Chooses which processor in a fixed-size pool should own the next
/// session.
pub trait SelectorStrategy: Send + Sync {
    /// `loads` is the current session count owned by each processor in
    /// the pool, indexed the same way the pool itself is. Returns the
    /// chosen index; implementations must return a value `< loads.len()`.
    fn choose(&self, loads: &[usize]) -> usize;
}

/// Cycles through the pool in order, wrapping around. The default
/// strategy: cheap, and fair under uniform connection lifetimes.
#[derive(Default)]
pub struct RoundRobinStrategy {
    next: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        RoundRobinStrategy {
            next: AtomicUsize::new(0),
        }
    }
}

impl SelectorStrategy for RoundRobinStrategy {
    fn choose(&self, loads: &[usize]) -> usize {
        assert!(!loads.is_empty(), "processor pool must not be empty");
        self.next.fetch_add(1, Ordering::Relaxed) % loads.len()
    }
}

/// Picks the processor currently holding the fewest sessions, breaking
/// ties by lowest index. Costs an O(pool size) scan per decision;
/// worth it when connection lifetimes are uneven enough that round
/// robin would let one processor's load drift away from the rest.
#[derive(Default)]
pub struct LeastLoadedStrategy;

impl LeastLoadedStrategy {
    pub fn new() -> Self {
        LeastLoadedStrategy
    }
}

impl SelectorStrategy for LeastLoadedStrategy {
    fn choose(&self, loads: &[usize]) -> usize {
        assert!(!loads.is_empty(), "processor pool must not be empty");
        loads
            .iter()
            .enumerate()
            .min_by_key(|&(_, &load)| load)
            .map(|(i, _)| i)
            .expect("non-empty pool")
    }
}
