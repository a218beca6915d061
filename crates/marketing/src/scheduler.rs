//! Background loop that advances enrollments and runs the daily trigger pass.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use liyaqa_core::config::MarketingConfig;
use liyaqa_segmentation::SegmentService;

use crate::executor::CampaignExecutor;
use crate::triggers::{TriggerEngine, TriggerReport};

/// What a single scheduler tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub steps_processed: usize,
    pub triggers: Option<TriggerReport>,
    pub segments_recalculated: usize,
}

pub struct MarketingScheduler {
    executor: CampaignExecutor,
    triggers: TriggerEngine,
    segments: Option<SegmentService>,
    interval: StdDuration,
    batch_size: usize,
    utc_offset_hours: i32,
    daily_hour: u32,
    last_daily_run: Mutex<Option<NaiveDate>>,
}

impl MarketingScheduler {
    pub fn new(executor: CampaignExecutor, triggers: TriggerEngine, config: &MarketingConfig) -> Self {
        Self {
            executor,
            triggers,
            segments: None,
            interval: StdDuration::from_secs(config.step_interval_secs.max(1)),
            batch_size: config.step_batch_size.max(1),
            utc_offset_hours: config.utc_offset_hours,
            daily_hour: config.daily_trigger_hour.min(23),
            last_daily_run: Mutex::new(None),
        }
    }

    /// Recount dynamic segments as part of the daily pass.
    pub fn with_segments(mut self, segments: SegmentService) -> Self {
        self.segments = Some(segments);
        self
    }

    /// One scheduler pass at `now`. Due steps always run; the daily pass
    /// runs on the first tick of each local day at or after the trigger hour.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport {
            steps_processed: self.executor.process_due_steps(now, self.batch_size),
            ..Default::default()
        };

        let local = now + Duration::hours(i64::from(self.utc_offset_hours));
        let today = local.date_naive();
        let daily_due = {
            let mut last = self.last_daily_run.lock();
            if local.hour() >= self.daily_hour && *last != Some(today) {
                *last = Some(today);
                true
            } else {
                false
            }
        };

        if daily_due {
            let triggers = self.triggers.run_daily_triggers(now);
            if let Some(segments) = &self.segments {
                report.segments_recalculated = segments.recalculate_all_dynamic(now);
            }
            info!(
                local_date = %today,
                enrolled = triggers.total(),
                segments = report.segments_recalculated,
                "Daily marketing pass complete"
            );
            report.triggers = Some(triggers);
        }
        report
    }

    /// Runs ticks on the configured interval until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "Marketing scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick(Utc::now());
                    if report.steps_processed > 0 {
                        metrics::counter!("marketing.scheduler.steps_processed")
                            .increment(report.steps_processed as u64);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        warn!("Marketing scheduler stopped");
    }
}
