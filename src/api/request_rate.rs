//! Process-wide inbound request counter with a per-second breakdown.
//!
//! The report is printed once on shutdown.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::{
    collections::BTreeMap,
    fmt::Write,
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};
use tracing::error;

#[derive(Debug)]
struct RateState {
    total: u64,
    started_at: Instant,
    per_second: BTreeMap<u64, u64>,
}

impl RateState {
    fn new(started_at: Instant) -> Self {
        Self {
            total: 0,
            started_at,
            per_second: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct RequestRateTracker {
    state: Mutex<RateState>,
}

impl Default for RequestRateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRateTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RateState::new(Instant::now())),
        }
    }

    pub fn track_request(&self) {
        self.track_request_at(Instant::now());
    }

    /// Record a request observed at `at`, bucketed by whole seconds since start.
    pub fn track_request_at(&self, at: Instant) {
        let mut state = self.lock();
        let second = at.saturating_duration_since(state.started_at).as_secs();
        state.total += 1;
        *state.per_second.entry(second).or_insert(0) += 1;
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.lock().total
    }

    #[must_use]
    pub fn report(&self) -> String {
        self.report_at(Instant::now())
    }

    fn report_at(&self, now: Instant) -> String {
        let state = self.lock();
        if state.total == 0 {
            return "\n=== RPS Report ===\nNo requests received\n==================\n".to_string();
        }

        let elapsed = now.saturating_duration_since(state.started_at).as_secs_f64();
        // Request counts stay far below 2^52, so the conversion is exact.
        #[allow(clippy::cast_precision_loss)]
        let total = state.total as f64;
        let average = if elapsed > 0.0 {
            format!("{:.2}", total / elapsed)
        } else {
            "0".to_string()
        };

        let mut report = String::from("\n=== RPS Report ===\n");
        let _ = writeln!(report, "Total Requests: {}", state.total);
        let _ = writeln!(report, "Elapsed Time: {elapsed:.2}s");
        let _ = writeln!(report, "Average RPS: {average}");
        report.push_str("\n--- Requests Per Second ---\n");
        for (second, count) in &state.per_second {
            let plural = if *count == 1 { "" } else { "s" };
            let _ = writeln!(report, "Second {second}: {count} request{plural}");
        }
        report.push_str("===========================\n");
        report
    }

    /// Clear all counts and restart the clock.
    pub fn reset(&self) {
        *self.lock() = RateState::new(Instant::now());
    }

    fn lock(&self) -> MutexGuard<'_, RateState> {
        // Counters stay consistent even if a holder panicked, so keep going.
        self.state.lock().unwrap_or_else(|poisoned| {
            error!("Request rate tracker lock poisoned");
            poisoned.into_inner()
        })
    }
}

/// Middleware counting every request before it reaches routing.
pub async fn count_requests(
    State(tracker): State<Arc<RequestRateTracker>>,
    request: Request,
    next: Next,
) -> Response {
    tracker.track_request();
    next.run(request).await
}
