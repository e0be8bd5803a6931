//! Adaptive sliding-window rate governor
//!
//! The governor counts outbound requests in fixed-length windows and keeps a
//! short history of closed windows. Each time a window closes it compares the
//! total over the history against the upstream quota and nudges a per-request
//! delay up or down by a fixed step:
//!
//! - total above the high-water mark (75% of quota): delay grows
//! - total below the low-water mark (2/3 of quota): delay shrinks toward zero
//! - in between: delay is held
//!
//! The quota is per minute while the history spans `history * window`, so
//! both marks are prorated to that span (15s windows with a history of 4
//! cover exactly one minute).
//!
//! Callers invoke [`RateGovernor::record_request`] and then
//! [`RateGovernor::wait`] immediately before every HTTP call, so the delay is
//! paid before the request that would push the account over quota.

use crate::config::RateLimitSettings;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Governor tuning derived from configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Length of one counting window
    pub window: Duration,

    /// Number of closed windows retained
    pub history: usize,

    /// Upstream quota per minute
    pub quota_per_minute: u32,

    /// Delay adjustment applied per rollover
    pub step: Duration,
}

impl RateLimitConfig {
    /// Time covered by a full window history
    pub fn history_span(&self) -> Duration {
        let windows = u32::try_from(self.history).unwrap_or(u32::MAX);
        self.window.saturating_mul(windows)
    }

    /// The quota prorated to the history span, times `numerator / denominator`
    fn prorated_quota(&self, numerator: u128, denominator: u128) -> u32 {
        let span_ms = self.history_span().as_millis();
        let scaled =
            u128::from(self.quota_per_minute) * span_ms * numerator / (60_000 * denominator);
        u32::try_from(scaled).unwrap_or(u32::MAX)
    }

    /// Total above which the delay grows
    pub fn high_water(&self) -> u32 {
        self.prorated_quota(3, 4)
    }

    /// Total below which the delay shrinks
    pub fn low_water(&self) -> u32 {
        self.prorated_quota(2, 3)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from(&RateLimitSettings::default())
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            window: Duration::from_secs(settings.window_secs),
            history: settings.window_history,
            quota_per_minute: settings.quota_per_minute,
            step: Duration::from_millis(settings.step_ms),
        }
    }
}

/// Read-only view of the governor for statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSnapshot {
    /// Requests in the window history plus the open window
    pub current_request_total: u32,

    /// Delay currently applied before each request
    pub sleep_duration: Duration,
}

#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    request_count: u32,
    history: VecDeque<u32>,
    sleep_duration: Duration,
}

/// Thread-safe adaptive rate governor
#[derive(Debug)]
pub struct RateGovernor {
    config: RateLimitConfig,
    state: Mutex<RateWindow>,
}

impl RateGovernor {
    /// Creates a governor whose first window starts now
    pub fn new(config: RateLimitConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Creates a governor whose first window starts at `start`
    pub fn starting_at(config: RateLimitConfig, start: Instant) -> Self {
        let history = VecDeque::with_capacity(config.history);
        Self {
            config,
            state: Mutex::new(RateWindow {
                window_start: start,
                request_count: 0,
                history,
                sleep_duration: Duration::ZERO,
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Records one outbound request
    ///
    /// `tag` only labels the request in trace output.
    pub fn record_request(&self, tag: &str) {
        self.record_request_at(tag, Instant::now());
    }

    /// Records one outbound request issued at `now`
    pub fn record_request_at(&self, tag: &str, now: Instant) {
        let mut state = self.state.lock();

        let elapsed = now.saturating_duration_since(state.window_start);
        if elapsed >= self.config.window {
            self.roll_over(&mut state, now, elapsed);
        }

        state.request_count += 1;
        tracing::trace!(
            "Request {} recorded ({} in open window)",
            tag,
            state.request_count
        );
    }

    /// Closes the open window (and any idle windows after it) and adjusts the delay
    fn roll_over(&self, state: &mut RateWindow, now: Instant, elapsed: Duration) {
        let closed = state.request_count;
        push_bounded(&mut state.history, closed, self.config.history);

        // Windows with no traffic at all still age out the history
        let window_nanos = self.config.window.as_nanos().max(1);
        let idle_windows = (elapsed.as_nanos() / window_nanos).saturating_sub(1);
        let idle_windows = idle_windows.min(self.config.history as u128);
        for _ in 0..idle_windows {
            push_bounded(&mut state.history, 0, self.config.history);
        }

        let total: u64 = state.history.iter().map(|&count| u64::from(count)).sum();
        let previous = state.sleep_duration;

        if total > u64::from(self.config.high_water()) {
            state.sleep_duration += self.config.step;
        } else if total < u64::from(self.config.low_water()) {
            state.sleep_duration = state.sleep_duration.saturating_sub(self.config.step);
        }

        if state.sleep_duration != previous {
            tracing::debug!(
                "Window complete - {} requests in history, delay {:?} -> {:?}",
                total,
                previous,
                state.sleep_duration
            );
        } else {
            tracing::debug!("Window complete - {} requests in history", total);
        }

        state.request_count = 0;
        state.window_start = now;
    }

    /// Delay currently applied before each request
    pub fn sleep_duration(&self) -> Duration {
        self.state.lock().sleep_duration
    }

    /// Sleeps for the current delay; returns immediately when it is zero
    pub async fn wait(&self) {
        let delay = self.sleep_duration();
        if !delay.is_zero() {
            tracing::trace!("Rate governor delaying request by {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Current request total and delay
    pub fn snapshot(&self) -> RateSnapshot {
        let state = self.state.lock();
        RateSnapshot {
            current_request_total: state.history.iter().sum::<u32>() + state.request_count,
            sleep_duration: state.sleep_duration,
        }
    }

    /// Number of closed windows currently retained
    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

fn push_bounded(history: &mut VecDeque<u32>, count: u32, limit: usize) {
    history.push_back(count);
    while history.len() > limit {
        history.pop_front();
    }
}
