//! The single route between the hub and its upstream supplier, modeled as a
//! two-state (operational / blocked) process driven by external disruption
//! arrivals.

/// Route availability state. Blocking is not scheduled here — the kernel
/// calls [`Route::block`] when a disruption-arrival event fires, and
/// [`Route::is_operational`] lazily clears an expired block the next time
/// anyone asks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Route {
    blocked: bool,
    unblock_time: f64,
    total_disruptions: u32,
    total_blocked_days: f64,
}

impl Route {
    /// Creates a route that starts operational.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the route can currently carry a shipment. Lazily clears the
    /// blocked flag if its scheduled unblock time has already passed.
    pub fn is_operational(&mut self, now: f64) -> bool {
        self.clear_expired_block(now);
        !self.blocked
    }

    /// Whether the route was blocked at `now`, without mutating state.
    /// Used for metrics snapshots that must not have side effects on the
    /// route's own bookkeeping.
    pub fn is_blocked_at(&self, now: f64) -> bool {
        self.blocked && now < self.unblock_time
    }

    fn clear_expired_block(&mut self, now: f64) {
        if self.blocked && now >= self.unblock_time {
            self.blocked = false;
        }
    }

    /// Blocks the route for `duration_days` starting at `now`. Blocking
    /// while already blocked extends from `now`, not from the prior
    /// unblock time — overlapping disruptions stack rather than queue, so
    /// `total_blocked_days` can exceed the wall-clock days actually spent
    /// blocked.
    pub fn block(&mut self, now: f64, duration_days: f64) {
        self.blocked = true;
        self.unblock_time = now + duration_days;
        self.total_disruptions += 1;
        self.total_blocked_days += duration_days;
    }

    /// Lead time in effect at `now`: the nominal lead time, plus whatever
    /// of the current block remains if the route is blocked.
    pub fn lead_time(&self, now: f64, nominal_lead_time_days: f64) -> f64 {
        if self.blocked {
            let remaining = (self.unblock_time - now).max(0.0);
            nominal_lead_time_days + remaining
        } else {
            nominal_lead_time_days
        }
    }

    /// Number of disruption events that have hit this route.
    pub fn total_disruptions(&self) -> u32 {
        self.total_disruptions
    }

    /// Cumulative blocked-days across all disruptions (may exceed the
    /// simulation horizon if disruptions overlap).
    pub fn total_blocked_days(&self) -> f64 {
        self.total_blocked_days
    }
}
