//! Global atomic counters for persona evaluation.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a harness run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    judge_calls: AtomicU64,
    tokens_used: AtomicU64,
    evaluations_completed: AtomicU64,
    evaluations_failed: AtomicU64,
    corrections_attempted: AtomicU64,
    messages_blocked: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            judge_calls: AtomicU64::new(0),
            tokens_used: AtomicU64::new(0),
            evaluations_completed: AtomicU64::new(0),
            evaluations_failed: AtomicU64::new(0),
            corrections_attempted: AtomicU64::new(0),
            messages_blocked: AtomicU64::new(0),
        }
    }

    pub fn inc_judge_calls(&self) {
        self.judge_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "judge_calls", "counter incremented");
    }

    pub fn add_tokens(&self, tokens: u64) {
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn inc_evaluations_completed(&self) {
        self.evaluations_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_completed", "counter incremented");
    }

    pub fn inc_evaluations_failed(&self) {
        self.evaluations_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_failed", "counter incremented");
    }

    pub fn inc_corrections_attempted(&self) {
        self.corrections_attempted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "corrections_attempted", "counter incremented");
    }

    pub fn inc_messages_blocked(&self) {
        self.messages_blocked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "messages_blocked", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            judge_calls = self.judge_calls(),
            tokens_used = self.tokens_used(),
            evaluations_completed = self.evaluations_completed(),
            evaluations_failed = self.evaluations_failed(),
            corrections_attempted = self.corrections_attempted(),
            messages_blocked = self.messages_blocked(),
        );
    }

    pub fn judge_calls(&self) -> u64 {
        self.judge_calls.load(Ordering::Relaxed)
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    pub fn evaluations_completed(&self) -> u64 {
        self.evaluations_completed.load(Ordering::Relaxed)
    }

    pub fn evaluations_failed(&self) -> u64 {
        self.evaluations_failed.load(Ordering::Relaxed)
    }

    pub fn corrections_attempted(&self) -> u64 {
        self.corrections_attempted.load(Ordering::Relaxed)
    }

    pub fn messages_blocked(&self) -> u64 {
        self.messages_blocked.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.judge_calls.store(0, Ordering::Relaxed);
        self.tokens_used.store(0, Ordering::Relaxed);
        self.evaluations_completed.store(0, Ordering::Relaxed);
        self.evaluations_failed.store(0, Ordering::Relaxed);
        self.corrections_attempted.store(0, Ordering::Relaxed);
        self.messages_blocked.store(0, Ordering::Relaxed);
    }
}
