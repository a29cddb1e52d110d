//! Fixed-rate frame scheduler for Warden.
//!
//! Session and authentication logic never blocks: waiting is expressed as
//! state that is re-examined once per frame. This crate produces those
//! frames. One [`TickScheduler`] drives one session host.
//!
//! Overruns are handled by skipping: a frame that fires late schedules
//! the next one from *now*, so a slow frame never triggers a burst of
//! back-to-back frames.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = &mut shutdown => break,
//!         _ = scheduler.wait_for_tick() => {
//!             registry.tick();
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Frames per second, `1..=128`.
    pub tick_rate_hz: u32,
    /// Fraction of the frame budget (0.0–1.0) above which a frame logs a
    /// warning. Default: 0.80.
    pub budget_warn_threshold: f64,
    /// Collect per-frame timing in [`TickMetrics`].
    pub metrics_enabled: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: Self::DEFAULT_TICK_RATE_HZ,
            budget_warn_threshold: 0.80,
            metrics_enabled: true,
        }
    }
}

impl TickConfig {
    /// Handshake timeouts are measured in seconds; ten frames a second is
    /// plenty.
    pub const DEFAULT_TICK_RATE_HZ: u32 = 10;

    /// Maximum supported tick rate.
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// A config for a specific rate with default thresholds.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`TickScheduler::new`].
    ///
    /// - `tick_rate_hz` is forced into `1..=MAX_TICK_RATE_HZ`; sessions
    ///   must always be ticked, so there is no event-driven mode.
    /// - `budget_warn_threshold` is clamped to `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz == 0 {
            warn!("tick_rate_hz is 0, using 1");
            self.tick_rate_hz = 1;
        } else if self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                rate = self.tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick_rate_hz exceeds maximum, clamping"
            );
            self.tick_rate_hz = Self::MAX_TICK_RATE_HZ;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Duration of one frame.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}

// ---------------------------------------------------------------------------
// Tick info and metrics
// ---------------------------------------------------------------------------

/// One fired frame, returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Frame number, starting at 1.
    pub tick: u64,
    /// Nominal frame length.
    pub dt: Duration,
    /// The frame fired more than 10% late.
    pub overrun: bool,
    /// Whole frames skipped because of the overrun.
    pub ticks_skipped: u64,
}

/// Running totals, updated when `metrics_enabled` is set.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of frame work time (α = 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Work time of the last frame over the budget. >1.0 means overrun.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-rate frame scheduler with skip-ahead on overrun.
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Duration,
    tick_count: u64,
    next_tick: Instant,
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Creates a scheduler whose first frame fires one frame from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();
        debug!(
            rate_hz = config.tick_rate_hz,
            budget_ms = tick_duration.as_secs_f64() * 1000.0,
            "tick scheduler created"
        );
        Self {
            config,
            tick_duration,
            tick_count: 0,
            next_tick: Instant::now() + tick_duration,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    /// A scheduler for `tick_rate_hz` with default thresholds.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Waits until the next frame is due.
    ///
    /// Cancel safe: dropping the future before it resolves leaves the
    /// schedule unchanged.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let due = self.next_tick;
        time::sleep_until(due).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.tick_start = Some(now);

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > self.tick_duration / 10;
        let mut ticks_skipped = 0;
        if overrun {
            ticks_skipped = (late_by.as_nanos() / self.tick_duration.as_nanos()) as u64;
            if ticks_skipped > 0 {
                warn!(
                    tick = self.tick_count,
                    skipped = ticks_skipped,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "frame overrun, skipping ahead"
                );
            }
            self.metrics.total_overruns += 1;
        }
        self.next_tick = now + self.tick_duration;
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, overrun, "frame fired");

        TickInfo {
            tick: self.tick_count,
            dt: self.tick_duration,
            overrun,
            ticks_skipped,
        }
    }

    /// Records that the current frame's work finished. Enables budget
    /// warnings and timing metrics; a no-op if no frame is in progress.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.tick_duration.as_secs_f64();
        self.metrics.budget_utilization = utilization;

        if utilization >= 1.0 {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "frame exceeded its budget"
            );
        } else if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "frame approaching budget"
            );
        }

        if self.config.metrics_enabled {
            self.metrics.max_tick_time = self.metrics.max_tick_time.max(elapsed);
            let alpha = 0.1;
            let prev = self.metrics.avg_tick_time.as_secs_f64();
            self.metrics.avg_tick_time = Duration::from_secs_f64(
                prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha,
            );
        }
    }

    /// Frames fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Current metrics.
    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    /// The configured rate.
    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    /// Duration of one frame.
    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}
