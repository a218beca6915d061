use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of drip sequence a campaign implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    WelcomeSequence,
    ExpiryReminder,
    WinBack,
    Birthday,
    InactivityAlert,
    PaymentReminder,
    Custom,
}

/// What enrolls a member into a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    MemberCreated,
    DaysBeforeExpiry,
    DaysAfterExpiry,
    Birthday,
    DaysInactive,
    PaymentFailed,
    Manual,
}

impl TriggerType {
    /// Day offset used when a campaign's trigger config leaves `days` unset.
    pub fn default_days(&self) -> Option<i64> {
        match self {
            TriggerType::DaysBeforeExpiry | TriggerType::DaysAfterExpiry => Some(7),
            TriggerType::DaysInactive => Some(14),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub days: Option<i64>,
    /// Preferred local send time; informational for channel providers.
    #[serde(default)]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub exclude_weekends: bool,
    /// Restricts subscription-based triggers to these plans when non-empty.
    #[serde(default)]
    pub plan_ids: Vec<Uuid>,
}

impl TriggerConfig {
    pub fn with_days(days: i64) -> Self {
        Self {
            days: Some(days),
            ..Default::default()
        }
    }

    pub fn matches_plan(&self, plan_id: Uuid) -> bool {
        self.plan_ids.is_empty() || self.plan_ids.contains(&plan_id)
    }
}

/// Lifecycle status of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
}

impl CampaignStatus {
    /// Campaign definition and steps may be changed.
    pub fn is_editable(&self) -> bool {
        matches!(self, CampaignStatus::Draft | CampaignStatus::Paused)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    pub status: CampaignStatus,
    pub trigger_type: TriggerType,
    pub trigger_config: TriggerConfig,
    pub segment_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_enrolled: u64,
    pub total_completed: u64,
    pub is_template: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(
        tenant_id: Uuid,
        name: impl Into<String>,
        campaign_type: CampaignType,
        trigger_type: TriggerType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            description: None,
            campaign_type,
            status: CampaignStatus::Draft,
            trigger_type,
            trigger_config: TriggerConfig::default(),
            segment_id: None,
            start_date: None,
            end_date: None,
            total_enrolled: 0,
            total_completed: 0,
            is_template: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active and `today` lies inside the optional date window.
    pub fn can_enroll(&self, today: NaiveDate) -> bool {
        self.status == CampaignStatus::Active
            && self.start_date.map_or(true, |start| today >= start)
            && self.end_date.map_or(true, |end| today <= end)
    }

    pub fn trigger_days(&self) -> Option<i64> {
        self.trigger_config
            .days
            .or_else(|| self.trigger_type.default_days())
    }
}

/// Delivery channel of a campaign step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketingChannel {
    Email,
    Sms,
    Whatsapp,
    Push,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStep {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub step_number: u32,
    pub name: String,
    pub channel: MarketingChannel,
    pub subject_en: Option<String>,
    pub subject_ar: Option<String>,
    pub body_en: String,
    pub body_ar: String,
    pub delay_days: u32,
    pub delay_hours: u32,
    pub is_ab_test: bool,
    pub ab_variant: Option<char>,
    pub ab_split_percentage: Option<u8>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl CampaignStep {
    pub fn total_delay_hours(&self) -> i64 {
        self.delay_days as i64 * 24 + self.delay_hours as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Cancelled,
}

/// A member's progress through one campaign. `current_step` is the number
/// of the last executed step (0 before the first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignEnrollment {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub member_id: Uuid,
    pub status: EnrollmentStatus,
    pub current_step: u32,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub next_step_due_at: Option<DateTime<Utc>>,
    pub ab_group: Option<char>,
    pub trigger_reference_id: Option<Uuid>,
    pub trigger_reference_type: Option<String>,
}

impl CampaignEnrollment {
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = EnrollmentStatus::Completed;
        self.completed_at = Some(now);
        self.next_step_due_at = None;
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = EnrollmentStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.next_step_due_at = None;
    }

    pub fn advance_to(&mut self, step_number: u32, next_due: DateTime<Utc>) {
        self.current_step = step_number;
        self.next_step_due_at = Some(next_due);
    }
}

/// Delivery status of a sent message. Ordered: a status only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLog {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub step_id: Uuid,
    pub enrollment_id: Uuid,
    pub member_id: Uuid,
    pub channel: MarketingChannel,
    pub status: MessageStatus,
    pub notification_id: Option<Uuid>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageLog {
    pub fn was_sent(&self) -> bool {
        self.sent_at.is_some()
    }

    pub fn was_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }

    pub fn was_opened(&self) -> bool {
        self.opened_at.is_some()
    }

    pub fn was_clicked(&self) -> bool {
        self.clicked_at.is_some()
    }

    pub fn mark_sent(&mut self, notification_id: Option<Uuid>, now: DateTime<Utc>) {
        self.status = MessageStatus::Sent;
        self.notification_id = notification_id;
        self.sent_at.get_or_insert(now);
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = MessageStatus::Failed;
        self.error_message = Some(reason.into());
        self.failed_at.get_or_insert(now);
    }

    /// Moves status forward to `to`, never backwards, and never out of Failed.
    pub fn advance(&mut self, to: MessageStatus, now: DateTime<Utc>) {
        if self.status == MessageStatus::Failed {
            return;
        }
        match to {
            MessageStatus::Delivered => {
                self.delivered_at.get_or_insert(now);
            }
            MessageStatus::Opened => {
                self.delivered_at.get_or_insert(now);
                self.opened_at.get_or_insert(now);
            }
            MessageStatus::Clicked => {
                self.delivered_at.get_or_insert(now);
                self.opened_at.get_or_insert(now);
                self.clicked_at.get_or_insert(now);
            }
            _ => {}
        }
        if to > self.status {
            self.status = to;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingType {
    Open,
    Click,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingPixel {
    pub token: String,
    pub message_log_id: Uuid,
    pub tracking_type: TrackingType,
    pub target_url: Option<String>,
    pub hits: u32,
    pub created_at: DateTime<Utc>,
}

// ─── Commands ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    /// Filled from the caller's tenant context by the API.
    #[serde(default = "Uuid::nil")]
    pub tenant_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_config: TriggerConfig,
    #[serde(default)]
    pub segment_id: Option<Uuid>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_template: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCampaign {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trigger_config: Option<TriggerConfig>,
    #[serde(default)]
    pub segment_id: Option<Uuid>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStep {
    pub name: String,
    pub channel: MarketingChannel,
    #[serde(default)]
    pub subject_en: Option<String>,
    #[serde(default)]
    pub subject_ar: Option<String>,
    pub body_en: String,
    pub body_ar: String,
    #[serde(default)]
    pub delay_days: u32,
    #[serde(default)]
    pub delay_hours: u32,
    #[serde(default)]
    pub is_ab_test: bool,
    #[serde(default)]
    pub ab_variant: Option<char>,
    #[serde(default)]
    pub ab_split_percentage: Option<u8>,
    /// Joins an existing A/B step number as another variant.
    #[serde(default)]
    pub step_number: Option<u32>,
}

impl CreateStep {
    pub fn email(name: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        let subject = subject.into();
        let body = body.into();
        Self {
            name: name.into(),
            channel: MarketingChannel::Email,
            subject_en: Some(subject.clone()),
            subject_ar: Some(subject),
            body_en: body.clone(),
            body_ar: body,
            delay_days: 0,
            delay_hours: 0,
            is_ab_test: false,
            ab_variant: None,
            ab_split_percentage: None,
            step_number: None,
        }
    }

    pub fn after_days(mut self, days: u32) -> Self {
        self.delay_days = days;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStep {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub channel: Option<MarketingChannel>,
    #[serde(default)]
    pub subject_en: Option<String>,
    #[serde(default)]
    pub subject_ar: Option<String>,
    #[serde(default)]
    pub body_en: Option<String>,
    #[serde(default)]
    pub body_ar: Option<String>,
    #[serde(default)]
    pub delay_days: Option<u32>,
    #[serde(default)]
    pub delay_hours: Option<u32>,
    #[serde(default)]
    pub ab_split_percentage: Option<u8>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollMemberCommand {
    pub campaign_id: Uuid,
    pub member_id: Uuid,
    #[serde(default)]
    pub trigger_reference_id: Option<Uuid>,
    #[serde(default)]
    pub trigger_reference_type: Option<String>,
}

impl EnrollMemberCommand {
    pub fn new(campaign_id: Uuid, member_id: Uuid) -> Self {
        Self {
            campaign_id,
            member_id,
            trigger_reference_id: None,
            trigger_reference_type: None,
        }
    }

    pub fn with_reference(mut self, id: Uuid, kind: impl Into<String>) -> Self {
        self.trigger_reference_id = Some(id);
        self.trigger_reference_type = Some(kind.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_enroll_respects_window() {
        let mut campaign = Campaign::new(
            Uuid::new_v4(),
            "Promo",
            CampaignType::Custom,
            TriggerType::Manual,
        );
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert!(!campaign.can_enroll(today));

        campaign.status = CampaignStatus::Active;
        assert!(campaign.can_enroll(today));

        campaign.start_date = NaiveDate::from_ymd_opt(2024, 3, 11);
        assert!(!campaign.can_enroll(today));

        campaign.start_date = NaiveDate::from_ymd_opt(2024, 3, 1);
        campaign.end_date = NaiveDate::from_ymd_opt(2024, 3, 10);
        assert!(campaign.can_enroll(today));
        campaign.end_date = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert!(!campaign.can_enroll(today));
    }

    #[test]
    fn test_trigger_days_default() {
        let mut campaign = Campaign::new(
            Uuid::new_v4(),
            "Lapsed",
            CampaignType::InactivityAlert,
            TriggerType::DaysInactive,
        );
        assert_eq!(campaign.trigger_days(), Some(14));
        campaign.trigger_config.days = Some(30);
        assert_eq!(campaign.trigger_days(), Some(30));
    }

    #[test]
    fn test_message_status_only_moves_forward() {
        let now = Utc::now();
        let mut log = MessageLog {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            step_id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            channel: MarketingChannel::Email,
            status: MessageStatus::Pending,
            notification_id: None,
            sent_at: None,
            delivered_at: None,
            opened_at: None,
            clicked_at: None,
            failed_at: None,
            error_message: None,
            created_at: now,
        };
        log.mark_sent(None, now);
        log.advance(MessageStatus::Clicked, now);
        assert_eq!(log.status, MessageStatus::Clicked);
        assert!(log.was_opened());

        let later = now + chrono::Duration::minutes(5);
        log.advance(MessageStatus::Opened, later);
        assert_eq!(log.status, MessageStatus::Clicked);
        assert_eq!(log.opened_at, Some(now));
    }
}
