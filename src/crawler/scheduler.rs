//! Request pacing and the periodic crawl trigger
//!
//! This module handles:
//! - The delay between consecutive listing pages, which grows slightly with
//!   the page index and carries random jitter so requests have no fixed cadence
//! - The hourly trigger that starts scheduled runs on the coordinator

use crate::config::{PacingConfig, ScheduleConfig};
use crate::crawler::Coordinator;
use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Computes the delay to wait after crawling `page`
#[derive(Debug, Clone)]
pub struct Pacing {
    config: PacingConfig,
}

impl Pacing {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    /// Delay before the page following `page`
    ///
    /// `base + page * per_page + jitter`, with jitter uniform in `[0, jitter_ms)`.
    pub fn delay_after(&self, page: u32) -> Duration {
        self.delay_with_rng(page, &mut rand::thread_rng())
    }

    pub fn delay_with_rng<R: Rng>(&self, page: u32, rng: &mut R) -> Duration {
        let jitter = if self.config.jitter_ms > 0 {
            rng.gen_range(0..self.config.jitter_ms)
        } else {
            0
        };

        let millis = self
            .config
            .base_delay_ms
            .saturating_add((page as u64).saturating_mul(self.config.per_page_delay_ms))
            .saturating_add(jitter);

        Duration::from_millis(millis)
    }
}

/// Time until the next multiple of `interval` since the Unix epoch
///
/// With the default one-hour interval this is the top of the next hour.
pub fn until_next_tick(now: SystemTime, interval: Duration) -> Duration {
    let interval_secs = interval.as_secs().max(1);
    let elapsed = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let remainder = elapsed % interval_secs;
    Duration::from_secs(interval_secs - remainder)
}

/// Runs the periodic trigger until Ctrl-C
///
/// Every tick calls `Coordinator::start_scheduled`, which does nothing when a
/// run is still in flight. Ticks missed during a long run are skipped rather
/// than replayed.
pub async fn run_schedule(coordinator: Coordinator, schedule: ScheduleConfig) {
    let period = Duration::from_secs(schedule.interval_secs);
    let first = until_next_tick(SystemTime::now(), period);

    tracing::info!(
        "Scheduler started: every {:?}, first run in {:?}",
        period,
        first
    );

    if schedule.run_on_start {
        trigger(&coordinator);
    }

    let mut ticker = interval_at(Instant::now() + first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => trigger(&coordinator),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, stopping scheduler");
                break;
            }
        }
    }
}

fn trigger(coordinator: &Coordinator) {
    tracing::info!("Starting scheduled crawl");
    if coordinator.start_scheduled().is_none() {
        tracing::info!("Crawl already in progress, skipping this tick");
    }
}
