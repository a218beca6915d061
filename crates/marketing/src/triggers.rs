use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use liyaqa_core::{MemberDirectory, MemberStatus, OverdueInvoiceSource, SubscriptionStatus};

use crate::executor::CampaignExecutor;
use crate::store::MarketingStore;
use crate::types::{Campaign, CampaignStatus, EnrollMemberCommand, TriggerType};

/// Per-trigger enrollment counts from one daily run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TriggerReport {
    pub expiry_reminders: usize,
    pub win_back: usize,
    pub birthdays: usize,
    pub inactivity: usize,
    pub welcome: usize,
    pub payment_failed: usize,
}

impl TriggerReport {
    pub fn total(&self) -> usize {
        self.expiry_reminders
            + self.win_back
            + self.birthdays
            + self.inactivity
            + self.welcome
            + self.payment_failed
    }
}

/// Matches members against Active campaigns of each trigger type and
/// enrolls them.
#[derive(Clone)]
pub struct TriggerEngine {
    store: MarketingStore,
    executor: CampaignExecutor,
    directory: Arc<dyn MemberDirectory>,
    invoices: Option<Arc<dyn OverdueInvoiceSource>>,
    utc_offset_hours: i32,
}

impl TriggerEngine {
    pub fn new(store: MarketingStore, executor: CampaignExecutor) -> Self {
        let directory = executor.directory().clone();
        Self {
            store,
            executor,
            directory,
            invoices: None,
            utc_offset_hours: 3,
        }
    }

    pub fn with_invoice_source(mut self, invoices: Arc<dyn OverdueInvoiceSource>) -> Self {
        self.invoices = Some(invoices);
        self
    }

    pub fn with_utc_offset(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours;
        self.executor = self.executor.with_utc_offset(hours);
        self
    }

    /// Calendar date at the club's local offset.
    pub fn local_today(&self, now: DateTime<Utc>) -> NaiveDate {
        (now + Duration::hours(self.utc_offset_hours as i64)).date_naive()
    }

    fn campaigns_for(&self, trigger: TriggerType) -> Vec<Campaign> {
        self.store.campaigns_where(|c| {
            c.status == CampaignStatus::Active && c.trigger_type == trigger && !c.is_template
        })
    }

    fn enroll(&self, cmd: EnrollMemberCommand, now: DateTime<Utc>) -> bool {
        let campaign_id = cmd.campaign_id;
        match self.executor.enroll_member_at(cmd, now) {
            Ok(result) => result.is_some(),
            Err(e) => {
                error!(campaign_id = %campaign_id, error = %e, "Trigger enrollment failed");
                false
            }
        }
    }

    /// Active subscriptions ending exactly `days` after today.
    pub fn run_expiry_reminders(&self, now: DateTime<Utc>) -> usize {
        let today = self.local_today(now);
        let mut enrolled = 0;
        for campaign in self.campaigns_for(TriggerType::DaysBeforeExpiry) {
            let Some(days) = campaign.trigger_days() else { continue };
            let Some(target) = Duration::try_days(days).and_then(|d| today.checked_add_signed(d)) else {
                warn!(campaign_id = %campaign.id, days, "Trigger days out of range, skipping");
                continue;
            };
            for sub in self.directory.subscriptions_for_tenant(campaign.tenant_id) {
                if sub.status == SubscriptionStatus::Active
                    && sub.end_date == target
                    && campaign.trigger_config.matches_plan(sub.plan_id)
                {
                    let cmd = EnrollMemberCommand::new(campaign.id, sub.member_id)
                        .with_reference(sub.id, "subscription");
                    enrolled += self.enroll(cmd, now) as usize;
                }
            }
        }
        log_run("expiry reminder", enrolled);
        enrolled
    }

    /// Expired subscriptions that ended exactly `days` before today.
    pub fn run_win_back(&self, now: DateTime<Utc>) -> usize {
        let today = self.local_today(now);
        let mut enrolled = 0;
        for campaign in self.campaigns_for(TriggerType::DaysAfterExpiry) {
            let Some(days) = campaign.trigger_days() else { continue };
            let Some(target) = Duration::try_days(days).and_then(|d| today.checked_sub_signed(d)) else {
                warn!(campaign_id = %campaign.id, days, "Trigger days out of range, skipping");
                continue;
            };
            for sub in self.directory.subscriptions_for_tenant(campaign.tenant_id) {
                if sub.status == SubscriptionStatus::Expired
                    && sub.end_date == target
                    && campaign.trigger_config.matches_plan(sub.plan_id)
                {
                    let cmd = EnrollMemberCommand::new(campaign.id, sub.member_id)
                        .with_reference(sub.id, "subscription");
                    enrolled += self.enroll(cmd, now) as usize;
                }
            }
        }
        log_run("win-back", enrolled);
        enrolled
    }

    pub fn run_birthdays(&self, now: DateTime<Utc>) -> usize {
        let today = self.local_today(now);
        let mut enrolled = 0;
        for campaign in self.campaigns_for(TriggerType::Birthday) {
            for member in self.directory.members_for_tenant(campaign.tenant_id) {
                if member.has_birthday_on(today) {
                    let mut cmd = EnrollMemberCommand::new(campaign.id, member.id);
                    cmd.trigger_reference_type = Some("birthday".into());
                    enrolled += self.enroll(cmd, now) as usize;
                }
            }
        }
        log_run("birthday", enrolled);
        enrolled
    }

    /// Active members with no check-in during the last `days` days.
    pub fn run_inactivity(&self, now: DateTime<Utc>) -> usize {
        let mut enrolled = 0;
        for campaign in self.campaigns_for(TriggerType::DaysInactive) {
            let Some(days) = campaign.trigger_days() else { continue };
            let Some(cutoff) = Duration::try_days(days).and_then(|d| now.checked_sub_signed(d)) else {
                warn!(campaign_id = %campaign.id, days, "Trigger days out of range, skipping");
                continue;
            };
            for member in self.directory.members_for_tenant(campaign.tenant_id) {
                if member.status != MemberStatus::Active {
                    continue;
                }
                let inactive = self
                    .directory
                    .last_check_in(member.id)
                    .map_or(true, |last| last < cutoff);
                if inactive {
                    let mut cmd = EnrollMemberCommand::new(campaign.id, member.id);
                    cmd.trigger_reference_type = Some("inactivity".into());
                    enrolled += self.enroll(cmd, now) as usize;
                }
            }
        }
        log_run("inactivity", enrolled);
        enrolled
    }

    /// Active members who joined today.
    pub fn run_welcome(&self, now: DateTime<Utc>) -> usize {
        let today = self.local_today(now);
        let offset = Duration::hours(self.utc_offset_hours as i64);
        let mut enrolled = 0;
        for campaign in self.campaigns_for(TriggerType::MemberCreated) {
            for member in self.directory.members_for_tenant(campaign.tenant_id) {
                if member.status == MemberStatus::Active
                    && (member.joined_at + offset).date_naive() == today
                {
                    let mut cmd = EnrollMemberCommand::new(campaign.id, member.id);
                    cmd.trigger_reference_type = Some("member_created".into());
                    enrolled += self.enroll(cmd, now) as usize;
                }
            }
        }
        log_run("welcome", enrolled);
        enrolled
    }

    /// Members with overdue invoices; one enrollment per member per run.
    pub fn run_payment_failed(&self, now: DateTime<Utc>) -> usize {
        let Some(invoices) = &self.invoices else {
            debug!("No invoice source configured, skipping payment-failed trigger");
            return 0;
        };
        let mut enrolled = 0;
        for campaign in self.campaigns_for(TriggerType::PaymentFailed) {
            let mut seen: HashSet<Uuid> = HashSet::new();
            for (invoice_id, member_id) in invoices.overdue_invoices(campaign.tenant_id) {
                if !seen.insert(member_id) {
                    continue;
                }
                let cmd = EnrollMemberCommand::new(campaign.id, member_id)
                    .with_reference(invoice_id, "payment_failed");
                enrolled += self.enroll(cmd, now) as usize;
            }
        }
        log_run("payment failed", enrolled);
        enrolled
    }

    pub fn run_daily_triggers(&self, now: DateTime<Utc>) -> TriggerReport {
        let report = TriggerReport {
            expiry_reminders: self.run_expiry_reminders(now),
            win_back: self.run_win_back(now),
            birthdays: self.run_birthdays(now),
            inactivity: self.run_inactivity(now),
            welcome: self.run_welcome(now),
            payment_failed: self.run_payment_failed(now),
        };
        info!(total = report.total(), ?report, "Daily marketing triggers finished");
        report
    }
}

fn log_run(trigger: &str, enrolled: usize) {
    if enrolled > 0 {
        info!(trigger, enrolled, "Trigger enrolled members");
    } else {
        debug!(trigger, "Trigger enrolled nobody");
    }
}
