//! Per-kind invalidation gate.
//!
//! Orders cache repopulation against invalidation. Each kind prefix owns a
//! generation counter. A read miss takes a ticket before querying storage and
//! may only populate the cache while the generation is unchanged; a write
//! bumps the generation and flushes under the same lock. A read that started
//! before an invalidation therefore never writes pre-write data after it.
//!
//! A prefix starts out unverified. The store may outlive the gate (a file
//! backed store across restarts, or writes made while caching was off), so
//! nothing found under the prefix is trusted until this gate has flushed it
//! once. A prefix whose flush failed stays pending. In both states tickets are
//! refused (reads bypass the cache) until a flush succeeds.

use super::lock::mutex_lock;
use super::store::{CacheError, CacheResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const SOURCE: &str = "cache::gate";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum FlushState {
    /// Not flushed by this gate yet.
    #[default]
    Unverified,
    Clean,
    /// The last flush failed.
    Pending,
}

#[derive(Debug, Default)]
struct PrefixState {
    generation: u64,
    flush: FlushState,
}

/// Proof that a read observed a given generation of one prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadTicket {
    generation: u64,
}

/// Result of an attempt to store a freshly loaded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulateOutcome {
    Stored,
    /// An invalidation happened after the ticket was taken.
    Stale,
    Failed(CacheError),
}

/// Result of invalidating a set of prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Entries removed across all flushed prefixes.
    pub flushed: usize,
    /// Prefixes left pending because their flush failed.
    pub failed: Vec<String>,
}

impl InvalidationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Shared by every cache decorator of one process.
#[derive(Debug, Default)]
pub struct InvalidationGate {
    prefixes: Mutex<HashMap<String, Arc<Mutex<PrefixState>>>>,
}

impl InvalidationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a read ticket, or `None` until `prefix` has been flushed
    /// successfully.
    pub fn ticket(&self, prefix: &str) -> Option<ReadTicket> {
        let slot = self.slot(prefix);
        let state = mutex_lock(&slot, SOURCE, "ticket");
        (state.flush == FlushState::Clean).then_some(ReadTicket {
            generation: state.generation,
        })
    }

    /// Runs `put` only if no invalidation of `prefix` happened since `ticket`.
    pub fn populate<F>(&self, prefix: &str, ticket: ReadTicket, put: F) -> PopulateOutcome
    where
        F: FnOnce() -> CacheResult<()>,
    {
        let slot = self.slot(prefix);
        let state = mutex_lock(&slot, SOURCE, "populate");
        if state.flush != FlushState::Clean || state.generation != ticket.generation {
            return PopulateOutcome::Stale;
        }
        match put() {
            Ok(()) => PopulateOutcome::Stored,
            Err(err) => PopulateOutcome::Failed(err),
        }
    }

    /// Bumps the generation of every prefix and flushes it.
    ///
    /// Must only be called after the write it follows is committed.
    pub fn invalidate<F>(&self, prefixes: &[String], mut flush: F) -> InvalidationReport
    where
        F: FnMut(&str) -> CacheResult<usize>,
    {
        let mut report = InvalidationReport::default();
        for prefix in prefixes {
            let slot = self.slot(prefix);
            let mut state = mutex_lock(&slot, SOURCE, "invalidate");
            state.generation = state.generation.wrapping_add(1);
            match flush(prefix) {
                Ok(removed) => {
                    state.flush = FlushState::Clean;
                    report.flushed += removed;
                }
                Err(_) => {
                    state.flush = FlushState::Pending;
                    report.failed.push(prefix.clone());
                }
            }
        }
        report
    }

    /// Runs the flush `prefix` still owes: the first flush of an unverified
    /// prefix, or the retry of a failed one.
    ///
    /// Returns `Ok(true)` when the prefix is usable (already clean or the
    /// flush succeeded). A failure leaves the prefix pending.
    pub fn retry_pending<F>(&self, prefix: &str, flush: F) -> CacheResult<bool>
    where
        F: FnOnce(&str) -> CacheResult<usize>,
    {
        let slot = self.slot(prefix);
        let mut state = mutex_lock(&slot, SOURCE, "retry_pending");
        if state.flush == FlushState::Clean {
            return Ok(true);
        }
        if let Err(err) = flush(prefix) {
            state.flush = FlushState::Pending;
            return Err(err);
        }
        state.flush = FlushState::Clean;
        state.generation = state.generation.wrapping_add(1);
        Ok(true)
    }

    /// Whether `prefix` still needs a successful flush before it is cached.
    pub fn needs_flush(&self, prefix: &str) -> bool {
        self.flush_state(prefix) != FlushState::Clean
    }

    /// Whether the last flush of `prefix` failed.
    pub fn is_pending(&self, prefix: &str) -> bool {
        self.flush_state(prefix) == FlushState::Pending
    }

    fn flush_state(&self, prefix: &str) -> FlushState {
        let slot = self.slot(prefix);
        let state = mutex_lock(&slot, SOURCE, "flush_state").flush;
        state
    }

    fn slot(&self, prefix: &str) -> Arc<Mutex<PrefixState>> {
        let mut prefixes = mutex_lock(&self.prefixes, SOURCE, "slot");
        Arc::clone(prefixes.entry(prefix.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const PAGES: &str = "folio:pages:";
    const POSTS: &str = "folio:posts:";

    fn verified_gate(prefixes: &[&str]) -> InvalidationGate {
        let gate = InvalidationGate::new();
        for prefix in prefixes {
            assert!(gate.retry_pending(prefix, |_| Ok(0)).unwrap());
        }
        gate
    }

    #[test]
    fn fresh_prefix_refuses_tickets_until_first_flush() {
        let gate = InvalidationGate::new();
        assert!(gate.needs_flush(PAGES));
        assert!(!gate.is_pending(PAGES));
        assert!(gate.ticket(PAGES).is_none());

        let flushed = Cell::new(0);
        assert!(gate
            .retry_pending(PAGES, |prefix| {
                assert_eq!(prefix, PAGES);
                flushed.set(flushed.get() + 1);
                Ok(7)
            })
            .unwrap());
        assert_eq!(flushed.get(), 1);
        assert!(gate.ticket(PAGES).is_some());

        // Already clean: no second flush.
        assert!(gate
            .retry_pending(PAGES, |_| {
                flushed.set(flushed.get() + 1);
                Ok(0)
            })
            .unwrap());
        assert_eq!(flushed.get(), 1);
    }

    #[test]
    fn failed_first_flush_marks_prefix_pending() {
        let gate = InvalidationGate::new();
        assert!(gate
            .retry_pending(PAGES, |_| Err(CacheError::Unavailable("down".to_string())))
            .is_err());
        assert!(gate.is_pending(PAGES));
        assert!(gate.ticket(PAGES).is_none());
    }

    #[test]
    fn populate_after_invalidation_is_rejected() {
        let gate = verified_gate(&[PAGES]);
        let ticket = gate.ticket(PAGES).unwrap();

        let report = gate.invalidate(&[PAGES.to_string()], |_| Ok(0));
        assert!(report.is_complete());

        let stored = Cell::new(false);
        let outcome = gate.populate(PAGES, ticket, || {
            stored.set(true);
            Ok(())
        });
        assert_eq!(outcome, PopulateOutcome::Stale);
        assert!(!stored.get());
    }

    #[test]
    fn populate_with_current_ticket_runs_put() {
        let gate = verified_gate(&[PAGES]);
        let ticket = gate.ticket(PAGES).unwrap();
        assert_eq!(gate.populate(PAGES, ticket, || Ok(())), PopulateOutcome::Stored);
    }

    #[test]
    fn invalidating_one_prefix_leaves_others_current() {
        let gate = verified_gate(&[PAGES, POSTS]);
        let posts_ticket = gate.ticket(POSTS).unwrap();
        gate.invalidate(&[PAGES.to_string()], |_| Ok(0));
        assert_eq!(
            gate.populate(POSTS, posts_ticket, || Ok(())),
            PopulateOutcome::Stored
        );
    }

    #[test]
    fn failed_flush_blocks_tickets_until_retry_succeeds() {
        let gate = InvalidationGate::new();
        let report = gate.invalidate(&[PAGES.to_string()], |_| {
            Err(CacheError::Unavailable("down".to_string()))
        });
        assert_eq!(report.failed, vec![PAGES.to_string()]);
        assert!(gate.is_pending(PAGES));
        assert!(gate.ticket(PAGES).is_none());

        assert!(gate
            .retry_pending(PAGES, |_| Err(CacheError::Unavailable("still down".to_string())))
            .is_err());
        assert!(gate.ticket(PAGES).is_none());

        assert!(gate.retry_pending(PAGES, |_| Ok(3)).unwrap());
        assert!(!gate.is_pending(PAGES));
        assert!(gate.ticket(PAGES).is_some());
    }
}
