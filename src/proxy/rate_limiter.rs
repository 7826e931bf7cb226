//! Fixed-window request limiter keyed by client identity
//!
//! Each identity owns one [`RateWindow`] in a sharded map. The
//! increment-and-compare for a key happens under that key's entry lock, so
//! concurrent requests from one client are counted exactly while different
//! clients proceed in parallel.

use crate::domain::ClientIdentity;
use dashmap::DashMap;
use nutype::nutype;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Stale windows are swept once every this many checks
pub const SWEEP_INTERVAL: u64 = 256;

/// Window length in seconds
#[nutype(
    validate(greater = 0),
    derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, AsRef)
)]
pub struct WindowSeconds(u64);

/// Requests admitted per window
#[nutype(
    validate(greater = 0),
    derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, AsRef)
)]
pub struct MaxRequests(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_seconds: WindowSeconds,
    pub max_requests: MaxRequests,
}

impl RateLimitConfig {
    pub fn new(enabled: bool, window_seconds: WindowSeconds, max_requests: MaxRequests) -> Self {
        Self {
            enabled,
            window_seconds,
            max_requests,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(*self.window_seconds.as_ref())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: WindowSeconds::try_new(60).expect("60 is a valid window"),
            max_requests: MaxRequests::try_new(60).expect("60 is a valid limit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admitted,
    Rejected { retry_after_seconds: u64 },
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    window_start: Instant,
    count: u64,
}

impl RateWindow {
    fn fresh(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 1,
        }
    }

    /// `None` when the window end is past the clock's range; such a window
    /// never expires
    fn window_end(&self, window: Duration) -> Option<Instant> {
        self.window_start.checked_add(window)
    }

    fn expired(&self, now: Instant, window: Duration) -> bool {
        self.window_end(window).is_some_and(|end| now >= end)
    }
}

/// Remaining window time rounded up to whole seconds, never below one
fn retry_after(window_end: Option<Instant>, window: Duration, now: Instant) -> u64 {
    let remaining = match window_end {
        Some(end) => end.saturating_duration_since(now),
        None => window,
    };
    let mut seconds = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        seconds += 1;
    }
    seconds.max(1)
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<ClientIdentity, RateWindow>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one request for `identity` and decide whether it may proceed
    pub fn check(&self, identity: &ClientIdentity) -> RateDecision {
        if !self.config.enabled {
            return RateDecision::Admitted;
        }

        let now = Instant::now();
        let window = self.config.window();
        let max_requests = *self.config.max_requests.as_ref();

        let decision = {
            let mut entry = self
                .windows
                .entry(identity.clone())
                .or_insert_with(|| RateWindow {
                    window_start: now,
                    count: 0,
                });
            let state = entry.value_mut();

            if state.count == 0 || state.expired(now, window) {
                *state = RateWindow::fresh(now);
                RateDecision::Admitted
            } else {
                state.count += 1;
                if state.count > max_requests {
                    RateDecision::Rejected {
                        retry_after_seconds: retry_after(state.window_end(window), window, now),
                    }
                } else {
                    RateDecision::Admitted
                }
            }
        };

        if let RateDecision::Rejected {
            retry_after_seconds,
        } = decision
        {
            warn!(
                client = %identity,
                retry_after_seconds,
                "Rate limit exceeded"
            );
        }

        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.evict_stale(now);
        }

        decision
    }

    /// Drop every window that has fully elapsed at `now`
    pub fn evict_stale(&self, now: Instant) {
        let window = self.config.window();
        let before = self.windows.len();
        self.windows.retain(|_, state| !state.expired(now, window));
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.windows.len(), "Evicted stale rate windows");
        }
    }

    /// Number of identities currently holding a window
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }
}
