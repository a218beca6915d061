use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use liyaqa_core::{LiyaqaError, LiyaqaResult};

use crate::store::MarketingStore;
use crate::types::{CampaignStatus, CampaignStep, EnrollmentStatus, MessageLog, MessageStatus};

#[derive(Debug, Clone, Serialize)]
pub struct MarketingOverview {
    pub active_campaigns: u64,
    pub draft_campaigns: u64,
    pub paused_campaigns: u64,
    pub messages_sent_last_30_days: u64,
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignAnalytics {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub status: CampaignStatus,
    pub total_enrolled: u64,
    pub active_enrollments: u64,
    pub completed_enrollments: u64,
    pub cancelled_enrollments: u64,
    pub completion_rate: f64,
    pub total_messages: u64,
    pub sent_messages: u64,
    pub delivered_messages: u64,
    pub failed_messages: u64,
    pub opened_messages: u64,
    pub clicked_messages: u64,
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AbVariantStats {
    pub variant: char,
    pub step_id: Uuid,
    pub sent: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
    pub open_rate: f64,
    pub click_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AbTestResult {
    pub step_number: u32,
    pub step_name: String,
    pub variants: Vec<AbVariantStats>,
    pub winner: Option<char>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelinePoint {
    pub date: NaiveDate,
    pub sent: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Funnel {
    total: u64,
    sent: u64,
    delivered: u64,
    opened: u64,
    clicked: u64,
    failed: u64,
}

impl Funnel {
    fn of<'a>(logs: impl IntoIterator<Item = &'a MessageLog>) -> Self {
        let mut f = Funnel::default();
        for log in logs {
            f.total += 1;
            f.sent += log.was_sent() as u64;
            f.delivered += log.was_delivered() as u64;
            f.opened += log.was_opened() as u64;
            f.clicked += log.was_clicked() as u64;
            f.failed += (log.status == MessageStatus::Failed) as u64;
        }
        f
    }
}

/// Percentage rounded to two decimals; 0 when the base is empty.
fn rate(part: u64, base: u64) -> f64 {
    if base == 0 {
        0.0
    } else {
        (part as f64 * 10_000.0 / base as f64).round() / 100.0
    }
}

/// Read-only reporting over campaigns and their message logs.
#[derive(Clone)]
pub struct MarketingAnalytics {
    store: MarketingStore,
}

impl MarketingAnalytics {
    pub fn new(store: MarketingStore) -> Self {
        Self { store }
    }

    pub fn overview(&self, tenant_id: Uuid, now: DateTime<Utc>) -> MarketingOverview {
        let campaigns = self
            .store
            .campaigns_where(|c| c.tenant_id == tenant_id && !c.is_template);
        let count = |status: CampaignStatus| campaigns.iter().filter(|c| c.status == status).count() as u64;

        let since = now - Duration::days(30);
        let logs: Vec<MessageLog> = campaigns
            .iter()
            .flat_map(|c| self.store.logs_for_campaign(c.id))
            .filter(|l| l.sent_at.map_or(false, |at| at >= since && at <= now))
            .collect();
        let funnel = Funnel::of(&logs);

        MarketingOverview {
            active_campaigns: count(CampaignStatus::Active),
            draft_campaigns: count(CampaignStatus::Draft),
            paused_campaigns: count(CampaignStatus::Paused),
            messages_sent_last_30_days: funnel.sent,
            delivery_rate: rate(funnel.delivered, funnel.sent),
            open_rate: rate(funnel.opened, funnel.sent),
            click_rate: rate(funnel.clicked, funnel.sent),
        }
    }

    pub fn campaign_analytics(&self, campaign_id: Uuid) -> LiyaqaResult<CampaignAnalytics> {
        let campaign = self
            .store
            .campaign(campaign_id)
            .ok_or_else(|| LiyaqaError::not_found("Campaign", campaign_id))?;
        let enrollments = self.store.enrollments_for(campaign_id);
        let by_status = |s: EnrollmentStatus| enrollments.iter().filter(|e| e.status == s).count() as u64;
        let completed = by_status(EnrollmentStatus::Completed);
        let logs = self.store.logs_for_campaign(campaign_id);
        let funnel = Funnel::of(&logs);

        Ok(CampaignAnalytics {
            campaign_id,
            campaign_name: campaign.name,
            status: campaign.status,
            total_enrolled: campaign.total_enrolled,
            active_enrollments: by_status(EnrollmentStatus::Active),
            completed_enrollments: completed,
            cancelled_enrollments: by_status(EnrollmentStatus::Cancelled),
            completion_rate: rate(completed, campaign.total_enrolled),
            total_messages: funnel.total,
            sent_messages: funnel.sent,
            delivered_messages: funnel.delivered,
            failed_messages: funnel.failed,
            opened_messages: funnel.opened,
            clicked_messages: funnel.clicked,
            delivery_rate: rate(funnel.delivered, funnel.sent),
            open_rate: rate(funnel.opened, funnel.sent),
            click_rate: rate(funnel.clicked, funnel.sent),
        })
    }

    /// Per A/B step, variant stats and the winner by click rate, then open
    /// rate. No winner when nothing was sent or the leaders tie.
    pub fn ab_test_results(&self, campaign_id: Uuid) -> LiyaqaResult<Vec<AbTestResult>> {
        self.store
            .campaign(campaign_id)
            .ok_or_else(|| LiyaqaError::not_found("Campaign", campaign_id))?;
        let logs = self.store.logs_for_campaign(campaign_id);

        let mut by_number: BTreeMap<u32, Vec<CampaignStep>> = BTreeMap::new();
        for step in self.store.steps_for(campaign_id).into_iter().filter(|s| s.is_ab_test) {
            by_number.entry(step.step_number).or_default().push(step);
        }

        let results = by_number
            .into_iter()
            .map(|(step_number, steps)| {
                let variants: Vec<AbVariantStats> = steps
                    .iter()
                    .map(|step| {
                        let f = Funnel::of(logs.iter().filter(|l| l.step_id == step.id));
                        AbVariantStats {
                            variant: step.ab_variant.unwrap_or('A'),
                            step_id: step.id,
                            sent: f.sent,
                            delivered: f.delivered,
                            opened: f.opened,
                            clicked: f.clicked,
                            open_rate: rate(f.opened, f.sent),
                            click_rate: rate(f.clicked, f.sent),
                        }
                    })
                    .collect();
                AbTestResult {
                    step_number,
                    step_name: steps.first().map(|s| s.name.clone()).unwrap_or_default(),
                    winner: pick_winner(&variants),
                    variants,
                }
            })
            .collect();
        Ok(results)
    }

    /// Daily message counts for the `days` days ending on `now`'s date.
    pub fn timeline(&self, campaign_id: Uuid, days: u32, now: DateTime<Utc>) -> LiyaqaResult<Vec<TimelinePoint>> {
        self.store
            .campaign(campaign_id)
            .ok_or_else(|| LiyaqaError::not_found("Campaign", campaign_id))?;
        let days = days.clamp(1, 365);
        let end = now.date_naive();
        let start = end - Duration::days(days as i64 - 1);

        let mut points: BTreeMap<NaiveDate, TimelinePoint> = (0..days as i64)
            .map(|offset| {
                let date = start + Duration::days(offset);
                (
                    date,
                    TimelinePoint {
                        date,
                        sent: 0,
                        delivered: 0,
                        opened: 0,
                        clicked: 0,
                    },
                )
            })
            .collect();

        for log in self.store.logs_for_campaign(campaign_id) {
            if let Some(p) = log.sent_at.and_then(|at| points.get_mut(&at.date_naive())) {
                p.sent += 1;
            }
            if let Some(p) = log.delivered_at.and_then(|at| points.get_mut(&at.date_naive())) {
                p.delivered += 1;
            }
            if let Some(p) = log.opened_at.and_then(|at| points.get_mut(&at.date_naive())) {
                p.opened += 1;
            }
            if let Some(p) = log.clicked_at.and_then(|at| points.get_mut(&at.date_naive())) {
                p.clicked += 1;
            }
        }
        Ok(points.into_values().collect())
    }
}

fn pick_winner(variants: &[AbVariantStats]) -> Option<char> {
    if variants.len() < 2 || variants.iter().all(|v| v.sent == 0) {
        return None;
    }
    let key = |v: &AbVariantStats| (v.click_rate, v.open_rate);
    let best = variants
        .iter()
        .max_by(|a, b| key(a).partial_cmp(&key(b)).unwrap_or(std::cmp::Ordering::Equal))?;
    let tied = variants.iter().filter(|v| key(v) == key(best)).count() > 1;
    if tied {
        None
    } else {
        Some(best.variant)
    }
}
