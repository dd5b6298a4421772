//! Absolute-deadline periodic ticker.
//!
//! Every periodic loop in the firmware (aggregator, motion producer, pulse
//! producer) paces itself with a [`Ticker`].  Deadlines are computed from
//! the previous *deadline*, not from the time the loop body finished, so
//! per-cycle processing jitter never accumulates into drift.
//!
//! ```text
//!   deadline:   D0        D1=D0+P     D2=D1+P     D3=D2+P
//!               │          │           │           │
//!   body:       ├──work──┤ ├─work─┤    ├─────work──┼──┤   (late, < P)
//!                                                  └─ D3 fires at once,
//!                                                     D4 = D3+P keeps phase
//!
//!   overrun > P:  skip the missed deadlines, re-anchor at now, count it.
//! ```

use log::debug;

use crate::app::ports::Clock;

/// Fixed-period ticker driven by an injected [`Clock`].
#[derive(Debug, Clone)]
pub struct Ticker {
    period_ms: u64,
    next_deadline_ms: u64,
    overruns: u32,
}

impl Ticker {
    /// First deadline is one period after `start_ms`.
    ///
    /// A zero period is bumped to 1 ms so the loop can never spin.
    pub fn new(period_ms: u32, start_ms: u64) -> Self {
        let period_ms = u64::from(period_ms.max(1));
        Self {
            period_ms,
            next_deadline_ms: start_ms + period_ms,
            overruns: 0,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn next_deadline_ms(&self) -> u64 {
        self.next_deadline_ms
    }

    /// Number of times the loop fell more than a whole period behind.
    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Pick the deadline to fire for a loop observed at `now_ms`, and
    /// advance the schedule past it.
    ///
    /// Returns `(deadline, overran)`.  Pure bookkeeping; the caller sleeps.
    pub fn advance(&mut self, now_ms: u64) -> (u64, bool) {
        let overran = now_ms > self.next_deadline_ms + self.period_ms;
        if overran {
            self.overruns = self.overruns.saturating_add(1);
            debug!(
                "TICK: overrun by {} ms, re-anchoring",
                now_ms - self.next_deadline_ms
            );
            self.next_deadline_ms = now_ms;
        }
        let fire_at = self.next_deadline_ms;
        self.next_deadline_ms += self.period_ms;
        (fire_at, overran)
    }

    /// Sleep until the next deadline.  Returns the deadline that fired.
    pub fn wait<C: Clock + ?Sized>(&mut self, clock: &C) -> u64 {
        let (deadline, _) = self.advance(clock.now_ms());
        clock.sleep_until_ms(deadline);
        deadline
    }
}
