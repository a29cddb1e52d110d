//! Scheduler timing under paused tokio time.

use std::time::Duration;

use tokio::time::{self, Instant};
use warden_tick::{TickConfig, TickScheduler};

#[test]
fn test_scheduler_initial_state() {
    let s = TickScheduler::new(TickConfig::default());
    assert_eq!(s.tick_count(), 0);
    assert_eq!(s.tick_rate_hz(), 10);
    assert_eq!(s.tick_duration(), Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_at_rate() {
    let mut scheduler = TickScheduler::with_rate(10);
    let start = Instant::now();

    let first = scheduler.wait_for_tick().await;
    let second = scheduler.wait_for_tick().await;

    assert_eq!(first.tick, 1);
    assert_eq!(second.tick, 2);
    assert!(!second.overrun);
    assert_eq!(second.dt, Duration::from_millis(100));
    let elapsed = Instant::now() - start;
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(210));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_skips_after_overrun() {
    let mut scheduler = TickScheduler::with_rate(10);
    scheduler.wait_for_tick().await;

    // Stall for three and a half frames.
    time::advance(Duration::from_millis(450)).await;
    let info = scheduler.wait_for_tick().await;

    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 3);
    assert_eq!(scheduler.metrics().total_overruns, 1);
    assert_eq!(scheduler.metrics().total_skipped, 3);

    // The next frame is scheduled from now, not from the missed deadline.
    let before = Instant::now();
    let next = scheduler.wait_for_tick().await;
    assert!(!next.overrun);
    assert!(Instant::now() - before >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_updates_metrics() {
    let mut scheduler = TickScheduler::with_rate(10);
    scheduler.wait_for_tick().await;
    time::advance(Duration::from_millis(50)).await;

    scheduler.record_tick_end();

    let metrics = scheduler.metrics();
    assert_eq!(metrics.total_ticks, 1);
    assert_eq!(metrics.max_tick_time, Duration::from_millis(50));
    assert!((metrics.budget_utilization - 0.5).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_cancelled_keeps_schedule() {
    let mut scheduler = TickScheduler::with_rate(10);

    let cancelled =
        time::timeout(Duration::from_millis(10), scheduler.wait_for_tick()).await;
    assert!(cancelled.is_err());
    assert_eq!(scheduler.tick_count(), 0);

    let info = scheduler.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert!(!info.overrun);
}
