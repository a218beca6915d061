use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use liyaqa_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use liyaqa_core::{LiyaqaError, LiyaqaResult, LocalizedText, Member, MemberDirectory, Page, PageRequest};

use crate::store::MarketingStore;
use crate::tracking::TrackingService;
use crate::types::{
    Campaign, CampaignEnrollment, CampaignStatus, CampaignStep, EnrollMemberCommand,
    EnrollmentStatus, MarketingChannel, MessageLog, MessageStatus, TrackingPixel, TrackingType,
};

const DEFAULT_AB_SPLIT: u8 = 50;

/// A rendered message handed to a delivery provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub member_id: Option<Uuid>,
    pub channel: MarketingChannel,
    pub recipient: String,
    pub subject: LocalizedText,
    pub body: LocalizedText,
    pub reference_id: Uuid,
}

/// Delivery provider seam (email gateway, SMS gateway). Returns the
/// provider's notification id.
pub trait Notifier: Send + Sync {
    fn send(&self, message: &OutboundMessage) -> anyhow::Result<Uuid>;
}

/// Notifier that only logs. Used when no provider is configured.
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn send(&self, message: &OutboundMessage) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        info!(
            notification_id = %id,
            channel = ?message.channel,
            recipient = %message.recipient,
            subject = %message.subject.en,
            "Dispatching marketing message"
        );
        Ok(id)
    }
}

/// Notifier that records every message, optionally failing each send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
    fail_with: Option<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(reason.into()),
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, message: &OutboundMessage) -> anyhow::Result<Uuid> {
        if let Some(reason) = &self.fail_with {
            anyhow::bail!("{reason}");
        }
        self.sent.lock().push(message.clone());
        Ok(Uuid::new_v4())
    }
}

/// Outcome of processing one due enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Executed { step_number: u32 },
    Completed,
    Cancelled,
    Skipped,
}

/// Runs campaigns: enrolls members, executes due steps, and renders and
/// dispatches messages.
#[derive(Clone)]
pub struct CampaignExecutor {
    store: MarketingStore,
    directory: Arc<dyn MemberDirectory>,
    notifier: Arc<dyn Notifier>,
    event_sink: Arc<dyn EventSink>,
    tracking: TrackingService,
    club_name: String,
    tracking_base_url: String,
    utc_offset_hours: i32,
}

impl std::fmt::Debug for CampaignExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignExecutor")
            .field("store", &self.store)
            .field("club_name", &self.club_name)
            .finish()
    }
}

impl CampaignExecutor {
    pub fn new(
        store: MarketingStore,
        directory: Arc<dyn MemberDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            tracking: TrackingService::new(store.clone()),
            store,
            directory,
            notifier,
            event_sink: noop_sink(),
            club_name: "Liyaqa".to_string(),
            tracking_base_url: "http://localhost:8080/api/marketing/track".to_string(),
            utc_offset_hours: 3,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn with_club_name(mut self, name: impl Into<String>) -> Self {
        self.club_name = name.into();
        self
    }

    pub fn with_tracking_base_url(mut self, url: impl Into<String>) -> Self {
        self.tracking_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Club offset from UTC; campaign windows are checked against the
    /// local calendar date.
    pub fn with_utc_offset(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    fn local_today(&self, now: DateTime<Utc>) -> chrono::NaiveDate {
        now.checked_add_signed(Duration::hours(i64::from(self.utc_offset_hours)))
            .unwrap_or(now)
            .date_naive()
    }

    pub fn directory(&self) -> &Arc<dyn MemberDirectory> {
        &self.directory
    }

    // ─── Enrollment ─────────────────────────────────────────────────────

    pub fn enroll_member(&self, cmd: EnrollMemberCommand) -> LiyaqaResult<Option<CampaignEnrollment>> {
        self.enroll_member_at(cmd, Utc::now())
    }

    /// Enrolls a member. `None` when the campaign is not accepting
    /// enrollments or the member is already actively enrolled.
    pub fn enroll_member_at(
        &self,
        cmd: EnrollMemberCommand,
        now: DateTime<Utc>,
    ) -> LiyaqaResult<Option<CampaignEnrollment>> {
        let campaign = self
            .store
            .campaign(cmd.campaign_id)
            .ok_or_else(|| LiyaqaError::not_found("Campaign", cmd.campaign_id))?;

        if !campaign.can_enroll(self.local_today(now)) {
            debug!(campaign_id = %campaign.id, "Campaign not accepting enrollments");
            return Ok(None);
        }
        if self.store.has_active_enrollment(cmd.campaign_id, cmd.member_id) {
            debug!(
                campaign_id = %cmd.campaign_id,
                member_id = %cmd.member_id,
                "Member already enrolled"
            );
            return Ok(None);
        }

        let steps = self.store.active_steps_for(cmd.campaign_id);
        let ab_group = steps
            .iter()
            .find(|s| s.is_ab_test)
            .map(|_| assign_ab_group(cmd.campaign_id, cmd.member_id, a_split(&steps)));
        let first_due = match steps.first() {
            Some(step) => due_after(now, step)?,
            None => now,
        };

        let enrollment = CampaignEnrollment {
            id: Uuid::new_v4(),
            campaign_id: cmd.campaign_id,
            member_id: cmd.member_id,
            status: EnrollmentStatus::Active,
            current_step: 0,
            enrolled_at: now,
            completed_at: None,
            cancelled_at: None,
            next_step_due_at: Some(first_due),
            ab_group,
            trigger_reference_id: cmd.trigger_reference_id,
            trigger_reference_type: cmd.trigger_reference_type,
        };

        if !self.store.insert_active_enrollment(enrollment.clone()) {
            return Ok(None);
        }
        if let Some(mut c) = self.store.campaigns.get_mut(&campaign.id) {
            c.total_enrolled += 1;
        }

        metrics::counter!("marketing.enrollments.created").increment(1);
        info!(
            enrollment_id = %enrollment.id,
            campaign_id = %enrollment.campaign_id,
            member_id = %enrollment.member_id,
            ab_group = ?enrollment.ab_group,
            "Enrolled member in campaign"
        );
        self.event_sink.emit(make_event(
            EventType::MemberEnrolled,
            Some(campaign.tenant_id),
            enrollment.id,
            serde_json::json!({
                "campaign_id": enrollment.campaign_id,
                "member_id": enrollment.member_id,
            }),
        ));
        Ok(Some(enrollment))
    }

    /// Enrolls each member; returns how many new enrollments were created.
    pub fn enroll_members(&self, campaign_id: Uuid, member_ids: &[Uuid]) -> LiyaqaResult<usize> {
        let now = Utc::now();
        let mut enrolled = 0;
        for member_id in member_ids {
            if self
                .enroll_member_at(EnrollMemberCommand::new(campaign_id, *member_id), now)?
                .is_some()
            {
                enrolled += 1;
            }
        }
        info!(campaign_id = %campaign_id, enrolled, "Bulk enrollment finished");
        Ok(enrolled)
    }

    pub fn enroll_segment(&self, campaign_id: Uuid, segment_member_ids: &[Uuid]) -> LiyaqaResult<usize> {
        self.enroll_members(campaign_id, segment_member_ids)
    }

    pub fn cancel_enrollment(&self, id: Uuid) -> LiyaqaResult<CampaignEnrollment> {
        let mut enrollment = self.get_enrollment(id)?;
        if enrollment.status != EnrollmentStatus::Active {
            return Err(LiyaqaError::InvalidState(format!(
                "Enrollment {id} is already {:?}",
                enrollment.status
            )));
        }
        enrollment.cancel(Utc::now());
        if !self.store.save_enrollment(enrollment.clone()) {
            return Err(LiyaqaError::InvalidState(format!(
                "Enrollment {id} ended while being cancelled"
            )));
        }
        info!(enrollment_id = %id, "Cancelled enrollment");
        self.emit_enrollment(EventType::EnrollmentCancelled, &enrollment);
        Ok(enrollment)
    }

    pub fn get_enrollment(&self, id: Uuid) -> LiyaqaResult<CampaignEnrollment> {
        self.store
            .enrollment(id)
            .ok_or_else(|| LiyaqaError::not_found("Enrollment", id))
    }

    pub fn list_enrollments(&self, campaign_id: Uuid, page: PageRequest) -> Page<CampaignEnrollment> {
        Page::from_vec(self.store.enrollments_for(campaign_id), page)
    }

    // ─── Step execution ─────────────────────────────────────────────────

    /// Processes up to `batch` due enrollments. Failures are logged per
    /// enrollment and do not stop the batch.
    pub fn process_due_steps(&self, now: DateTime<Utc>, batch: usize) -> usize {
        let due = self.store.due_enrollments(now, batch);
        let mut processed = 0;
        for enrollment in due {
            match self.process_enrollment(enrollment.id, now) {
                Ok(StepOutcome::Skipped) => {}
                Ok(_) => processed += 1,
                Err(e) => {
                    error!(enrollment_id = %enrollment.id, error = %e, "Failed to process enrollment step");
                }
            }
        }
        if processed > 0 {
            info!(processed, "Processed campaign steps");
        }
        processed
    }

    /// Advances one enrollment by a single step.
    pub fn process_enrollment(&self, enrollment_id: Uuid, now: DateTime<Utc>) -> LiyaqaResult<StepOutcome> {
        let mut enrollment = self.get_enrollment(enrollment_id)?;
        if enrollment.status != EnrollmentStatus::Active {
            return Ok(StepOutcome::Skipped);
        }

        let campaign = match self.store.campaign(enrollment.campaign_id) {
            Some(c) if c.status == CampaignStatus::Paused => {
                debug!(enrollment_id = %enrollment.id, "Campaign paused, skipping");
                return Ok(StepOutcome::Skipped);
            }
            Some(c) if c.status == CampaignStatus::Active => c,
            _ => {
                self.cancel_stale(&mut enrollment, now, "campaign no longer running");
                return Ok(StepOutcome::Cancelled);
            }
        };

        let Some(member) = self.directory.get_member(enrollment.member_id) else {
            self.cancel_stale(&mut enrollment, now, "member not found");
            return Ok(StepOutcome::Cancelled);
        };

        let steps = self.store.active_steps_for(campaign.id);
        let next_number = enrollment.current_step + 1;
        let Some(step) = select_variant(&steps, next_number, enrollment.ab_group) else {
            self.complete(&mut enrollment, &campaign, now);
            return Ok(StepOutcome::Completed);
        };

        let following = steps
            .iter()
            .filter(|s| s.step_number > next_number)
            .map(|s| s.step_number)
            .min()
            .and_then(|n| select_variant(&steps, n, enrollment.ab_group));
        let next_due = following.map(|next| due_after(now, next)).transpose()?;

        self.execute_step(&enrollment, step, &member, &campaign, now);

        match next_due {
            Some(due) => {
                enrollment.advance_to(next_number, due);
                if !self.store.save_enrollment(enrollment) {
                    debug!(enrollment_id = %enrollment_id, "Enrollment ended while processing");
                }
            }
            None => {
                enrollment.current_step = next_number;
                self.complete(&mut enrollment, &campaign, now);
            }
        }
        Ok(StepOutcome::Executed {
            step_number: next_number,
        })
    }

    fn complete(&self, enrollment: &mut CampaignEnrollment, campaign: &Campaign, now: DateTime<Utc>) {
        enrollment.complete(now);
        if !self.store.save_enrollment(enrollment.clone()) {
            debug!(enrollment_id = %enrollment.id, "Enrollment ended before completion");
            return;
        }
        if let Some(mut c) = self.store.campaigns.get_mut(&campaign.id) {
            c.total_completed += 1;
        }
        metrics::counter!("marketing.enrollments.completed").increment(1);
        info!(enrollment_id = %enrollment.id, campaign_id = %campaign.id, "Completed enrollment");
        self.emit_enrollment(EventType::EnrollmentCompleted, enrollment);
    }

    fn cancel_stale(&self, enrollment: &mut CampaignEnrollment, now: DateTime<Utc>, reason: &str) {
        enrollment.cancel(now);
        if !self.store.save_enrollment(enrollment.clone()) {
            return;
        }
        info!(enrollment_id = %enrollment.id, reason, "Cancelled enrollment");
        self.emit_enrollment(EventType::EnrollmentCancelled, enrollment);
    }

    /// Logs, renders, and dispatches one step for a member.
    fn execute_step(
        &self,
        enrollment: &CampaignEnrollment,
        step: &CampaignStep,
        member: &Member,
        campaign: &Campaign,
        now: DateTime<Utc>,
    ) -> MessageLog {
        let mut log = MessageLog {
            id: Uuid::new_v4(),
            campaign_id: campaign.id,
            step_id: step.id,
            enrollment_id: enrollment.id,
            member_id: member.id,
            channel: step.channel,
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

        let (subject, mut body) = self.render(step, member, &campaign.name);
        if step.channel == MarketingChannel::Email {
            // Click links need the log to exist.
            self.store.message_logs.insert(log.id, log.clone());
            let mut tracked = HashMap::new();
            body.en = self.track_links(&body.en, log.id, &mut tracked);
            if let Some(ar) = body.ar.take() {
                body.ar = Some(self.track_links(&ar, log.id, &mut tracked));
            }
            let pixel = new_pixel(log.id, TrackingType::Open, None, now);
            let pixel_url = format!("{}/open/{}", self.tracking_base_url, pixel.token);
            body.en.push_str(&pixel_tag(&pixel_url));
            if let Some(ar) = body.ar.as_mut() {
                ar.push_str(&pixel_tag(&pixel_url));
            }
            self.store.pixels.insert(pixel.token.clone(), pixel);
        }

        match self.dispatch(step.channel, member, subject, body, campaign.id) {
            Ok(notification_id) => {
                log.mark_sent(notification_id, now);
                metrics::counter!("marketing.messages.sent").increment(1);
                self.emit_log(EventType::MessageSent, campaign, &log);
            }
            Err(reason) => {
                warn!(
                    enrollment_id = %enrollment.id,
                    step_number = step.step_number,
                    reason = %reason,
                    "Campaign message failed"
                );
                log.mark_failed(reason, now);
                metrics::counter!("marketing.messages.failed").increment(1);
                self.emit_log(EventType::MessageFailed, campaign, &log);
            }
        }

        self.store.message_logs.insert(log.id, log.clone());
        debug!(
            enrollment_id = %enrollment.id,
            step_number = step.step_number,
            "Executed campaign step"
        );
        log
    }

    /// Replaces each http(s) link in `text` with a click-tracking URL.
    /// Links seen before in `tracked` reuse their token.
    fn track_links(&self, text: &str, log_id: Uuid, tracked: &mut HashMap<String, String>) -> String {
        rewrite_links(text, |target| {
            if let Some(url) = tracked.get(target) {
                return Some(url.clone());
            }
            match self.tracking.create_click_link(log_id, target) {
                Ok(pixel) => {
                    let url = format!("{}/click/{}", self.tracking_base_url, pixel.token);
                    tracked.insert(target.to_string(), url.clone());
                    Some(url)
                }
                Err(e) => {
                    debug!(message_log_id = %log_id, url = target, error = %e, "Link left untracked");
                    None
                }
            }
        })
    }

    fn dispatch(
        &self,
        channel: MarketingChannel,
        member: &Member,
        subject: LocalizedText,
        body: LocalizedText,
        reference_id: Uuid,
    ) -> Result<Option<Uuid>, String> {
        let recipient = match channel {
            MarketingChannel::Email => member
                .email
                .clone()
                .filter(|e| !e.is_empty())
                .ok_or_else(|| "No email address".to_string())?,
            MarketingChannel::Sms => member
                .phone
                .clone()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| "No phone number".to_string())?,
            // Template-approved providers pick these up from the log.
            MarketingChannel::Whatsapp | MarketingChannel::Push => return Ok(None),
        };
        let message = OutboundMessage {
            member_id: Some(member.id),
            channel,
            recipient,
            subject,
            body,
            reference_id,
        };
        self.notifier
            .send(&message)
            .map(Some)
            .map_err(|e| e.to_string())
    }

    fn render(&self, step: &CampaignStep, member: &Member, fallback_subject: &str) -> (LocalizedText, LocalizedText) {
        let subject_en = step.subject_en.as_deref().unwrap_or(fallback_subject);
        let subject_ar = step.subject_ar.as_deref().unwrap_or(fallback_subject);
        let subject = LocalizedText {
            en: personalize(subject_en, member, &self.club_name),
            ar: Some(personalize(subject_ar, member, &self.club_name)),
        };
        let body = LocalizedText {
            en: personalize(&step.body_en, member, &self.club_name),
            ar: Some(personalize(&step.body_ar, member, &self.club_name)),
        };
        (subject, body)
    }

    /// Sends a personalized sample of `step` without creating a log.
    pub fn send_test_step(
        &self,
        step_id: Uuid,
        email: Option<String>,
        phone: Option<String>,
    ) -> LiyaqaResult<OutboundMessage> {
        let step = self
            .store
            .step(step_id)
            .ok_or_else(|| LiyaqaError::not_found("CampaignStep", step_id))?;
        let campaign_name = self
            .store
            .campaign(step.campaign_id)
            .map(|c| c.name)
            .unwrap_or_default();

        let mut sample = Member::new(Uuid::nil(), "Test", "Member");
        sample.email = email;
        sample.phone = phone;
        let recipient = match step.channel {
            MarketingChannel::Email => sample.email.clone().ok_or_else(|| {
                LiyaqaError::Validation("Email address is required for an email test".into())
            })?,
            MarketingChannel::Sms | MarketingChannel::Whatsapp => {
                sample.phone.clone().ok_or_else(|| {
                    LiyaqaError::Validation("Phone number is required for this test".into())
                })?
            }
            MarketingChannel::Push => sample
                .email
                .clone()
                .or_else(|| sample.phone.clone())
                .unwrap_or_default(),
        };

        let (subject, body) = self.render(&step, &sample, &campaign_name);
        let message = OutboundMessage {
            member_id: None,
            channel: step.channel,
            recipient,
            subject,
            body,
            reference_id: step.campaign_id,
        };
        self.notifier
            .send(&message)
            .map_err(LiyaqaError::Internal)?;
        info!(step_id = %step_id, "Sent test message");
        Ok(message)
    }

    fn emit_enrollment(&self, event_type: EventType, enrollment: &CampaignEnrollment) {
        let tenant = self.store.campaign(enrollment.campaign_id).map(|c| c.tenant_id);
        self.event_sink.emit(make_event(
            event_type,
            tenant,
            enrollment.id,
            serde_json::json!({
                "campaign_id": enrollment.campaign_id,
                "member_id": enrollment.member_id,
            }),
        ));
    }

    fn emit_log(&self, event_type: EventType, campaign: &Campaign, log: &MessageLog) {
        self.event_sink.emit(make_event(
            event_type,
            Some(campaign.tenant_id),
            log.id,
            serde_json::json!({
                "campaign_id": campaign.id,
                "member_id": log.member_id,
                "channel": log.channel,
                "error": log.error_message,
            }),
        ));
    }
}

/// When `step` falls due if scheduled at `now`.
fn due_after(now: DateTime<Utc>, step: &CampaignStep) -> LiyaqaResult<DateTime<Utc>> {
    Duration::try_hours(step.total_delay_hours())
        .and_then(|delay| now.checked_add_signed(delay))
        .ok_or_else(|| {
            LiyaqaError::Validation(format!(
                "Delay of step {} is out of range",
                step.step_number
            ))
        })
}

/// Rewrites every `http://` or `https://` link in `text` through `link`.
/// Trailing punctuation stays outside the link; `None` keeps it as is.
fn rewrite_links(text: &str, mut link: impl FnMut(&str) -> Option<String>) -> String {
    const TRAILING: &[char] = &['.', ',', ';', ':', '!', '?', ')'];
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = [rest.find("https://"), rest.find("http://")]
        .into_iter()
        .flatten()
        .min()
    {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>'))
            .unwrap_or(tail.len());
        let target = tail[..end].trim_end_matches(TRAILING);
        match link(target) {
            Some(url) => out.push_str(&url),
            None => out.push_str(target),
        }
        rest = &tail[target.len()..];
    }
    out.push_str(rest);
    out
}

/// Split percentage of the A variant of the first A/B step.
fn a_split(steps: &[CampaignStep]) -> u8 {
    steps
        .iter()
        .filter(|s| s.is_ab_test)
        .find(|s| s.ab_variant == Some('A'))
        .or_else(|| steps.iter().find(|s| s.is_ab_test))
        .and_then(|s| s.ab_split_percentage)
        .unwrap_or(DEFAULT_AB_SPLIT)
        .min(100)
}

/// Stable bucket in `0..100` for a member within a campaign.
pub fn ab_bucket(campaign_id: Uuid, member_id: Uuid) -> u8 {
    let digest = Sha256::digest(format!("{campaign_id}:{member_id}").as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % 100) as u8
}

/// `'A'` when the member's bucket falls under the A-variant split.
pub fn assign_ab_group(campaign_id: Uuid, member_id: Uuid, split_a: u8) -> char {
    if ab_bucket(campaign_id, member_id) < split_a {
        'A'
    } else {
        'B'
    }
}

/// Step `number` for an enrollment: the variant matching `group` for A/B
/// steps, falling back to the first variant.
fn select_variant(steps: &[CampaignStep], number: u32, group: Option<char>) -> Option<&CampaignStep> {
    let mut candidates = steps.iter().filter(|s| s.step_number == number);
    let first = candidates.clone().next()?;
    if first.is_ab_test {
        if let Some(group) = group {
            if let Some(variant) = candidates.find(|s| s.ab_variant == Some(group)) {
                return Some(variant);
            }
        }
    }
    Some(first)
}

/// Replaces `{{placeholder}}` tokens with member data.
pub fn personalize(template: &str, member: &Member, club_name: &str) -> String {
    template
        .replace("{{firstName}}", &member.first_name)
        .replace("{{lastName}}", &member.last_name)
        .replace("{{fullName}}", &member.full_name())
        .replace("{{email}}", member.email.as_deref().unwrap_or(""))
        .replace("{{phone}}", member.phone.as_deref().unwrap_or(""))
        .replace("{{clubName}}", club_name)
}

pub(crate) fn new_pixel(
    message_log_id: Uuid,
    tracking_type: TrackingType,
    target_url: Option<String>,
    now: DateTime<Utc>,
) -> TrackingPixel {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    TrackingPixel {
        token,
        message_log_id,
        tracking_type,
        target_url,
        hits: 0,
        created_at: now,
    }
}

fn pixel_tag(url: &str) -> String {
    format!("<img src=\"{url}\" width=\"1\" height=\"1\" alt=\"\" />")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::CampaignService;
    use crate::types::{CampaignType, CreateCampaign, CreateStep, TriggerConfig, TriggerType};
    use liyaqa_core::event_bus::capture_sink;
    use liyaqa_core::InMemoryDirectory;

    struct Fixture {
        campaigns: CampaignService,
        executor: CampaignExecutor,
        directory: InMemoryDirectory,
        notifier: Arc<RecordingNotifier>,
        tenant: Uuid,
    }

    fn fixture() -> Fixture {
        let store = MarketingStore::new();
        let directory = InMemoryDirectory::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let executor = CampaignExecutor::new(
            store.clone(),
            Arc::new(directory.clone()),
            notifier.clone(),
        )
        .with_club_name("Iron Gym");
        Fixture {
            campaigns: CampaignService::new(store),
            executor,
            directory,
            notifier,
            tenant: Uuid::new_v4(),
        }
    }

    impl Fixture {
        fn campaign(&self, steps: Vec<CreateStep>) -> Campaign {
            let campaign = self
                .campaigns
                .create_campaign(CreateCampaign {
                    tenant_id: self.tenant,
                    name: "Welcome".into(),
                    description: None,
                    campaign_type: CampaignType::WelcomeSequence,
                    trigger_type: TriggerType::Manual,
                    trigger_config: TriggerConfig::default(),
                    segment_id: None,
                    start_date: None,
                    end_date: None,
                    is_template: false,
                })
                .unwrap();
            for step in steps {
                self.campaigns.add_step(campaign.id, step).unwrap();
            }
            self.campaigns.activate_campaign(campaign.id).unwrap()
        }

        fn member(&self, email: Option<&str>) -> Member {
            let mut member = Member::new(self.tenant, "Sara", "Ali");
            member.email = email.map(String::from);
            member.phone = Some("+966500000000".into());
            self.directory.upsert_member(member)
        }
    }

    #[test]
    fn test_enroll_member_schedules_first_step() {
        let fx = fixture();
        let campaign = fx.campaign(vec![CreateStep::email("Day 2", "Hi", "Body").after_days(2)]);
        let member = fx.member(Some("sara@example.com"));
        let now = Utc::now();

        let enrollment = fx
            .executor
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, member.id), now)
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.current_step, 0);
        assert_eq!(enrollment.status, EnrollmentStatus::Active);
        assert_eq!(enrollment.next_step_due_at, Some(now + Duration::hours(48)));
        assert!(enrollment.ab_group.is_none());
        assert_eq!(fx.campaigns.get_campaign(campaign.id).unwrap().total_enrolled, 1);
    }

    #[test]
    fn test_enroll_twice_returns_none() {
        let fx = fixture();
        let campaign = fx.campaign(vec![CreateStep::email("Day 1", "Hi", "Body")]);
        let member = fx.member(Some("sara@example.com"));
        let cmd = EnrollMemberCommand::new(campaign.id, member.id);
        assert!(fx.executor.enroll_member(cmd.clone()).unwrap().is_some());
        assert!(fx.executor.enroll_member(cmd).unwrap().is_none());
        assert_eq!(fx.campaigns.get_campaign(campaign.id).unwrap().total_enrolled, 1);
    }

    #[test]
    fn test_enroll_inactive_campaign_returns_none() {
        let fx = fixture();
        let campaign = fx.campaign(vec![CreateStep::email("Day 1", "Hi", "Body")]);
        fx.campaigns.pause_campaign(campaign.id).unwrap();
        let member = fx.member(Some("sara@example.com"));
        let result = fx
            .executor
            .enroll_member(EnrollMemberCommand::new(campaign.id, member.id))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_enroll_missing_campaign_is_not_found() {
        let fx = fixture();
        let err = fx
            .executor
            .enroll_member(EnrollMemberCommand::new(Uuid::new_v4(), Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::NotFound(_)));
    }

    #[test]
    fn test_process_due_steps_sends_and_completes() {
        let fx = fixture();
        let campaign = fx.campaign(vec![
            CreateStep::email("Day 0", "Welcome {{firstName}}", "Hi {{fullName}} at {{clubName}}"),
            CreateStep::email("Day 3", "Tips", "Tips").after_days(3),
        ]);
        let member = fx.member(Some("sara@example.com"));
        let now = Utc::now();
        let enrollment = fx
            .executor
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, member.id), now)
            .unwrap()
            .unwrap();

        assert_eq!(fx.executor.process_due_steps(now, 100), 1);
        let after_first = fx.executor.get_enrollment(enrollment.id).unwrap();
        assert_eq!(after_first.current_step, 1);
        assert_eq!(after_first.next_step_due_at, Some(now + Duration::days(3)));

        let sent = fx.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.en.starts_with("Hi Sara Ali at Iron Gym"));
        assert!(sent[0].body.en.contains("/open/"));
        assert_eq!(sent[0].recipient, "sara@example.com");

        // Not due yet.
        assert_eq!(fx.executor.process_due_steps(now + Duration::days(1), 100), 0);

        let later = now + Duration::days(3);
        assert_eq!(fx.executor.process_due_steps(later, 100), 1);
        let done = fx.executor.get_enrollment(enrollment.id).unwrap();
        assert_eq!(done.status, EnrollmentStatus::Completed);
        assert_eq!(done.current_step, 2);
        assert_eq!(fx.campaigns.get_campaign(campaign.id).unwrap().total_completed, 1);
        assert_eq!(fx.executor.store.logs_for_enrollment(enrollment.id).len(), 2);
    }

    #[test]
    fn test_email_without_address_fails_log() {
        let fx = fixture();
        let campaign = fx.campaign(vec![CreateStep::email("Day 0", "Hi", "Body")]);
        let member = fx.member(None);
        let now = Utc::now();
        let enrollment = fx
            .executor
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, member.id), now)
            .unwrap()
            .unwrap();
        fx.executor.process_due_steps(now, 100);

        let logs = fx.executor.store.logs_for_enrollment(enrollment.id);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, MessageStatus::Failed);
        assert_eq!(logs[0].error_message.as_deref(), Some("No email address"));
        assert!(fx.notifier.sent().is_empty());
    }

    #[test]
    fn test_provider_failure_recorded_on_log() {
        let store = MarketingStore::new();
        let directory = InMemoryDirectory::new();
        let executor = CampaignExecutor::new(
            store.clone(),
            Arc::new(directory.clone()),
            Arc::new(RecordingNotifier::failing("gateway timeout")),
        );
        let campaigns = CampaignService::new(store.clone());
        let tenant = Uuid::new_v4();
        let campaign = campaigns
            .create_campaign(CreateCampaign {
                tenant_id: tenant,
                name: "SMS".into(),
                description: None,
                campaign_type: CampaignType::Custom,
                trigger_type: TriggerType::Manual,
                trigger_config: TriggerConfig::default(),
                segment_id: None,
                start_date: None,
                end_date: None,
                is_template: false,
            })
            .unwrap();
        campaigns
            .add_step(
                campaign.id,
                CreateStep {
                    channel: MarketingChannel::Sms,
                    ..CreateStep::email("Text", "", "Hello")
                },
            )
            .unwrap();
        campaigns.activate_campaign(campaign.id).unwrap();
        let mut member = Member::new(tenant, "Omar", "K");
        member.phone = Some("+966511111111".into());
        let member = directory.upsert_member(member);

        let now = Utc::now();
        executor
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, member.id), now)
            .unwrap();
        assert_eq!(executor.process_due_steps(now, 10), 1);
        let logs = store.logs_for_campaign(campaign.id);
        assert_eq!(logs[0].status, MessageStatus::Failed);
        assert_eq!(logs[0].error_message.as_deref(), Some("gateway timeout"));
    }

    #[test]
    fn test_paused_campaign_skipped_archived_cancelled() {
        let fx = fixture();
        let campaign = fx.campaign(vec![CreateStep::email("Day 0", "Hi", "Body")]);
        let member = fx.member(Some("sara@example.com"));
        let now = Utc::now();
        let enrollment = fx
            .executor
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, member.id), now)
            .unwrap()
            .unwrap();

        fx.campaigns.pause_campaign(campaign.id).unwrap();
        assert_eq!(fx.executor.process_due_steps(now, 100), 0);
        assert_eq!(
            fx.executor.get_enrollment(enrollment.id).unwrap().status,
            EnrollmentStatus::Active
        );

        fx.campaigns.archive_campaign(campaign.id).unwrap();
        assert_eq!(
            fx.executor.get_enrollment(enrollment.id).unwrap().status,
            EnrollmentStatus::Cancelled
        );
    }

    #[test]
    fn test_missing_member_cancels_enrollment() {
        let fx = fixture();
        let campaign = fx.campaign(vec![CreateStep::email("Day 0", "Hi", "Body")]);
        let now = Utc::now();
        let enrollment = fx
            .executor
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, Uuid::new_v4()), now)
            .unwrap()
            .unwrap();
        assert_eq!(fx.executor.process_due_steps(now, 100), 1);
        assert_eq!(
            fx.executor.get_enrollment(enrollment.id).unwrap().status,
            EnrollmentStatus::Cancelled
        );
    }

    #[test]
    fn test_ab_group_selects_variant() {
        let fx = fixture();
        let store = fx.executor.store.clone();
        let draft = fx
            .campaigns
            .create_campaign(CreateCampaign {
                tenant_id: fx.tenant,
                name: "AB".into(),
                description: None,
                campaign_type: CampaignType::Custom,
                trigger_type: TriggerType::Manual,
                trigger_config: TriggerConfig::default(),
                segment_id: None,
                start_date: None,
                end_date: None,
                is_template: false,
            })
            .unwrap();
        let a = fx
            .campaigns
            .add_step(
                draft.id,
                CreateStep {
                    is_ab_test: true,
                    ab_variant: Some('A'),
                    ab_split_percentage: Some(50),
                    ..CreateStep::email("A", "Subject A", "Body A")
                },
            )
            .unwrap();
        fx.campaigns
            .add_step(
                draft.id,
                CreateStep {
                    is_ab_test: true,
                    ab_variant: Some('B'),
                    step_number: Some(a.step_number),
                    ..CreateStep::email("B", "Subject B", "Body B")
                },
            )
            .unwrap();
        fx.campaigns.activate_campaign(draft.id).unwrap();

        let now = Utc::now();
        for _ in 0..20 {
            let member = fx.member(Some("m@example.com"));
            let enrollment = fx
                .executor
                .enroll_member_at(EnrollMemberCommand::new(draft.id, member.id), now)
                .unwrap()
                .unwrap();
            let group = enrollment.ab_group.unwrap();
            assert_eq!(group, assign_ab_group(draft.id, member.id, 50));
        }
        fx.executor.process_due_steps(now, 100);

        for log in store.logs_for_campaign(draft.id) {
            let enrollment = store.enrollment(log.enrollment_id).unwrap();
            let step = store.step(log.step_id).unwrap();
            assert_eq!(step.ab_variant, enrollment.ab_group);
        }
    }

    #[test]
    fn test_ab_bucket_is_deterministic_and_bounded() {
        let campaign = Uuid::new_v4();
        for _ in 0..50 {
            let member = Uuid::new_v4();
            let bucket = ab_bucket(campaign, member);
            assert!(bucket < 100);
            assert_eq!(bucket, ab_bucket(campaign, member));
        }
        let member = Uuid::new_v4();
        assert_eq!(assign_ab_group(campaign, member, 100), 'A');
        assert_eq!(assign_ab_group(campaign, member, 0), 'B');
    }

    #[test]
    fn test_personalize_tokens() {
        let mut member = Member::new(Uuid::new_v4(), "Sara", "Ali");
        member.email = Some("sara@example.com".into());
        let text = personalize(
            "{{firstName}}|{{lastName}}|{{fullName}}|{{email}}|{{phone}}|{{clubName}}",
            &member,
            "Iron Gym",
        );
        assert_eq!(text, "Sara|Ali|Sara Ali|sara@example.com||Iron Gym");
    }

    #[test]
    fn test_send_test_step_does_not_log() {
        let fx = fixture();
        let campaign = fx.campaign(vec![CreateStep::email("Day 0", "Hi {{firstName}}", "Body")]);
        let step = fx.campaigns.get_steps(campaign.id).unwrap().remove(0);
        let message = fx
            .executor
            .send_test_step(step.id, Some("qa@example.com".into()), None)
            .unwrap();
        assert_eq!(message.subject.en, "Hi Test");
        assert_eq!(message.recipient, "qa@example.com");
        assert!(fx.executor.store.logs_for_campaign(campaign.id).is_empty());

        let err = fx.executor.send_test_step(step.id, None, None).unwrap_err();
        assert!(matches!(err, LiyaqaError::Validation(_)));
    }

    #[test]
    fn test_enrollment_events_emitted() {
        let sink = capture_sink();
        let fx = fixture();
        let executor = fx.executor.clone().with_event_sink(sink.clone());
        let campaign = fx.campaign(vec![CreateStep::email("Day 0", "Hi", "Body")]);
        let member = fx.member(Some("sara@example.com"));
        let now = Utc::now();
        executor
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, member.id), now)
            .unwrap();
        executor.process_due_steps(now, 10);
        assert_eq!(sink.count_type(EventType::MemberEnrolled), 1);
        assert_eq!(sink.count_type(EventType::MessageSent), 1);
        assert_eq!(sink.count_type(EventType::EnrollmentCompleted), 1);
    }

    #[test]
    fn test_out_of_range_delay_is_validation_error() {
        let fx = fixture();
        let campaign = fx.campaign(vec![
            CreateStep::email("Day 0", "Hi", "Body"),
            CreateStep::email("Later", "Hi", "Body"),
        ]);
        let member = fx.member(Some("sara@example.com"));
        let steps = fx.executor.store.steps_for(campaign.id);
        // Stored directly, bypassing step validation.
        fx.executor.store.steps.get_mut(&steps[1].id).unwrap().delay_days = u32::MAX;

        let now = Utc::now();
        let enrollment = fx
            .executor
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, member.id), now)
            .unwrap()
            .unwrap();
        let err = fx.executor.process_enrollment(enrollment.id, now).unwrap_err();
        assert!(matches!(err, LiyaqaError::Validation(_)));
        assert!(fx.notifier.sent().is_empty());
        assert_eq!(fx.executor.get_enrollment(enrollment.id).unwrap().current_step, 0);

        fx.executor.store.steps.get_mut(&steps[0].id).unwrap().delay_days = u32::MAX;
        let other = fx.member(Some("omar@example.com"));
        let err = fx
            .executor
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, other.id), now)
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::Validation(_)));
        assert!(!fx.executor.store.has_active_enrollment(campaign.id, other.id));
    }

    #[test]
    fn test_email_links_are_click_tracked() {
        let fx = fixture();
        let campaign = fx.campaign(vec![CreateStep::email(
            "Offer",
            "Hi",
            "Renew at https://liyaqa.example/renew?plan=gold. See you!",
        )]);
        let member = fx.member(Some("sara@example.com"));
        let now = Utc::now();
        let enrollment = fx
            .executor
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, member.id), now)
            .unwrap()
            .unwrap();
        fx.executor.process_due_steps(now, 10);

        let sent = fx.notifier.sent();
        let body = &sent[0].body.en;
        assert!(body.starts_with("Renew at http://localhost:8080/api/marketing/track/click/"));
        assert!(!body.contains("liyaqa.example"));
        assert!(body.contains(". See you!"));

        let log = &fx.executor.store.logs_for_enrollment(enrollment.id)[0];
        let clicks: Vec<TrackingPixel> = fx
            .executor
            .store
            .pixels_for_log(log.id)
            .into_iter()
            .filter(|p| p.tracking_type == TrackingType::Click)
            .collect();
        // English and Arabic bodies share one token per link.
        assert_eq!(clicks.len(), 1);
        assert!(sent[0].body.ar.as_deref().unwrap().contains(&clicks[0].token));

        let target = TrackingService::new(fx.executor.store.clone())
            .record_click(&clicks[0].token)
            .unwrap();
        assert_eq!(target, "https://liyaqa.example/renew?plan=gold");
    }

    #[test]
    fn test_rewrite_links_leaves_plain_text() {
        let text = "No links here, only http words.";
        assert_eq!(rewrite_links(text, |_| Some("x".into())), text);
        let both = rewrite_links("a http://one.example/x b (https://two.example/y)", |url| {
            Some(format!("<{}>", url.len()))
        });
        assert_eq!(both, "a <20> b (<21>)");
    }

    #[test]
    fn test_enrollment_window_uses_local_date() {
        let fx = fixture();
        let campaign = fx.campaign(vec![CreateStep::email("Day 0", "Hi", "Body")]);
        fx.executor.store.campaigns.get_mut(&campaign.id).unwrap().start_date =
            chrono::NaiveDate::from_ymd_opt(2024, 5, 2);
        let member = fx.member(Some("sara@example.com"));
        // 22:30 UTC on May 1st is already May 2nd at UTC+3.
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 5, 1, 22, 30, 0).unwrap();

        let utc = fx.executor.clone().with_utc_offset(0);
        assert!(utc
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, member.id), now)
            .unwrap()
            .is_none());
        let riyadh = fx.executor.clone().with_utc_offset(3);
        assert!(riyadh
            .enroll_member_at(EnrollMemberCommand::new(campaign.id, member.id), now)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_cancel_enrollment() {
        let fx = fixture();
        let campaign = fx.campaign(vec![CreateStep::email("Day 0", "Hi", "Body")]);
        let member = fx.member(Some("sara@example.com"));
        let enrollment = fx
            .executor
            .enroll_member(EnrollMemberCommand::new(campaign.id, member.id))
            .unwrap()
            .unwrap();
        let cancelled = fx.executor.cancel_enrollment(enrollment.id).unwrap();
        assert_eq!(cancelled.status, EnrollmentStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert!(matches!(
            fx.executor.cancel_enrollment(enrollment.id).unwrap_err(),
            LiyaqaError::InvalidState(_)
        ));
        // Re-enrollment allowed once the previous one ended.
        assert!(fx
            .executor
            .enroll_member(EnrollMemberCommand::new(campaign.id, member.id))
            .unwrap()
            .is_some());
    }
}
