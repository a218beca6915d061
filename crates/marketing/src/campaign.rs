use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use liyaqa_core::error::ensure;
use liyaqa_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use liyaqa_core::{LiyaqaError, LiyaqaResult, Page, PageRequest};

use crate::state_machine::CampaignStateMachine;
use crate::store::MarketingStore;
use crate::types::{
    Campaign, CampaignStatus, CampaignStep, CreateCampaign, CreateStep, EnrollmentStatus,
    UpdateCampaign, UpdateStep,
};

/// Trigger day offsets and step delays stay within about ten years.
pub const MAX_TRIGGER_DAYS: i64 = 3650;
pub const MAX_DELAY_DAYS: u32 = 3650;
/// One year.
pub const MAX_DELAY_HOURS: u32 = 24 * 365;

/// Campaign definitions and their steps: CRUD, lifecycle transitions,
/// duplication, and templates.
#[derive(Clone)]
pub struct CampaignService {
    store: MarketingStore,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for CampaignService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignService")
            .field("store", &self.store)
            .finish()
    }
}

impl CampaignService {
    pub fn new(store: MarketingStore) -> Self {
        Self {
            store,
            event_sink: noop_sink(),
        }
    }

    /// Attach an event sink for lifecycle events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn store(&self) -> &MarketingStore {
        &self.store
    }

    // ─── Campaigns ──────────────────────────────────────────────────────

    pub fn create_campaign(&self, cmd: CreateCampaign) -> LiyaqaResult<Campaign> {
        ensure(!cmd.name.trim().is_empty(), "Campaign name is required")?;
        validate_window(cmd.start_date, cmd.end_date)?;
        validate_trigger_days(cmd.trigger_config.days)?;

        let mut campaign = Campaign::new(
            cmd.tenant_id,
            cmd.name.trim(),
            cmd.campaign_type,
            cmd.trigger_type,
        );
        campaign.description = cmd.description;
        campaign.trigger_config = cmd.trigger_config;
        campaign.segment_id = cmd.segment_id;
        campaign.start_date = cmd.start_date;
        campaign.end_date = cmd.end_date;
        campaign.is_template = cmd.is_template;

        info!(campaign_id = %campaign.id, name = %campaign.name, "Creating campaign");
        self.store.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    pub fn get_campaign(&self, id: Uuid) -> LiyaqaResult<Campaign> {
        self.store
            .campaign(id)
            .ok_or_else(|| LiyaqaError::not_found("Campaign", id))
    }

    /// Non-template campaigns of a tenant, newest first.
    pub fn list_campaigns(&self, tenant_id: Uuid, page: PageRequest) -> Page<Campaign> {
        let list = self
            .store
            .campaigns_where(|c| c.tenant_id == tenant_id && !c.is_template);
        Page::from_vec(list, page)
    }

    pub fn update_campaign(&self, id: Uuid, cmd: UpdateCampaign) -> LiyaqaResult<Campaign> {
        let mut entry = self
            .store
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Campaign", id))?;
        if !entry.status.is_editable() {
            return Err(LiyaqaError::InvalidState(format!(
                "Campaign can only be updated in Draft or Paused status, was {:?}",
                entry.status
            )));
        }
        if let Some(name) = &cmd.name {
            ensure(!name.trim().is_empty(), "Campaign name is required")?;
        }
        if let Some(config) = &cmd.trigger_config {
            validate_trigger_days(config.days)?;
        }
        let start = cmd.start_date.or(entry.start_date);
        let end = cmd.end_date.or(entry.end_date);
        validate_window(start, end)?;

        if let Some(name) = cmd.name {
            entry.name = name.trim().to_string();
        }
        if cmd.description.is_some() {
            entry.description = cmd.description;
        }
        if let Some(config) = cmd.trigger_config {
            entry.trigger_config = config;
        }
        if cmd.segment_id.is_some() {
            entry.segment_id = cmd.segment_id;
        }
        entry.start_date = start;
        entry.end_date = end;
        entry.updated_at = Utc::now();

        info!(campaign_id = %id, "Updated campaign");
        Ok(entry.clone())
    }

    /// Deletes a Draft campaign and its steps.
    pub fn delete_campaign(&self, id: Uuid) -> LiyaqaResult<()> {
        let campaign = self.get_campaign(id)?;
        if campaign.status != CampaignStatus::Draft {
            return Err(LiyaqaError::InvalidState(
                "Only Draft campaigns can be deleted".into(),
            ));
        }
        self.store.steps.retain(|_, s| s.campaign_id != id);
        self.store.campaigns.remove(&id);
        info!(campaign_id = %id, "Deleted campaign");
        Ok(())
    }

    /// Draft or Paused → Active. Requires at least one active step.
    pub fn activate_campaign(&self, id: Uuid) -> LiyaqaResult<Campaign> {
        self.get_campaign(id)?;
        if self.store.active_steps_for(id).is_empty() {
            return Err(LiyaqaError::Validation(
                "Campaign must have at least one active step to be activated".into(),
            ));
        }
        let campaign = self.transition(id, CampaignStatus::Active)?;
        self.emit(EventType::CampaignActivated, &campaign);
        Ok(campaign)
    }

    pub fn pause_campaign(&self, id: Uuid) -> LiyaqaResult<Campaign> {
        let campaign = self.transition(id, CampaignStatus::Paused)?;
        self.emit(EventType::CampaignPaused, &campaign);
        Ok(campaign)
    }

    pub fn complete_campaign(&self, id: Uuid) -> LiyaqaResult<Campaign> {
        let campaign = self.transition(id, CampaignStatus::Completed)?;
        self.emit(EventType::CampaignCompleted, &campaign);
        Ok(campaign)
    }

    /// Archives the campaign and cancels its Active enrollments.
    pub fn archive_campaign(&self, id: Uuid) -> LiyaqaResult<Campaign> {
        let campaign = self.transition(id, CampaignStatus::Archived)?;
        let now = Utc::now();
        let mut cancelled = 0usize;
        for mut enrollment in self.store.enrollments_for(id) {
            if enrollment.status == EnrollmentStatus::Active {
                enrollment.cancel(now);
                if self.store.save_enrollment(enrollment) {
                    cancelled += 1;
                }
            }
        }
        info!(campaign_id = %id, cancelled, "Archived campaign");
        self.emit(EventType::CampaignArchived, &campaign);
        Ok(campaign)
    }

    fn transition(&self, id: Uuid, to: CampaignStatus) -> LiyaqaResult<Campaign> {
        let mut entry = self
            .store
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Campaign", id))?;
        let mut sm = CampaignStateMachine::new(entry.status);
        sm.transition(to)?;
        info!(campaign_id = %id, from = ?entry.status, to = ?to, "Campaign status change");
        entry.status = sm.state;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Copies a campaign and its steps as a new Draft with counters reset.
    pub fn duplicate_campaign(&self, source_id: Uuid, new_name: &str) -> LiyaqaResult<Campaign> {
        let source = self.get_campaign(source_id)?;
        self.copy_campaign(&source, source.tenant_id, new_name, source.is_template)
    }

    fn copy_campaign(
        &self,
        source: &Campaign,
        tenant_id: Uuid,
        new_name: &str,
        is_template: bool,
    ) -> LiyaqaResult<Campaign> {
        ensure(!new_name.trim().is_empty(), "Campaign name is required")?;
        let now = Utc::now();
        let copy = Campaign {
            id: Uuid::new_v4(),
            tenant_id,
            name: new_name.trim().to_string(),
            status: CampaignStatus::Draft,
            total_enrolled: 0,
            total_completed: 0,
            is_template,
            created_at: now,
            updated_at: now,
            ..source.clone()
        };
        self.store.campaigns.insert(copy.id, copy.clone());

        for step in self.store.steps_for(source.id) {
            let step_copy = CampaignStep {
                id: Uuid::new_v4(),
                campaign_id: copy.id,
                created_at: now,
                ..step
            };
            self.store.steps.insert(step_copy.id, step_copy);
        }

        info!(source_id = %source.id, campaign_id = %copy.id, "Copied campaign");
        Ok(copy)
    }

    // ─── Templates ──────────────────────────────────────────────────────

    pub fn list_templates(&self) -> Vec<Campaign> {
        let mut templates = self.store.campaigns_where(|c| c.is_template);
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        templates
    }

    /// Creates a tenant campaign (Draft, not a template) from a template.
    pub fn create_from_template(
        &self,
        template_id: Uuid,
        tenant_id: Uuid,
        name: &str,
    ) -> LiyaqaResult<Campaign> {
        let template = self.get_campaign(template_id)?;
        if !template.is_template {
            return Err(LiyaqaError::Validation(format!(
                "Campaign {template_id} is not a template"
            )));
        }
        self.copy_campaign(&template, tenant_id, name, false)
    }

    // ─── Steps ──────────────────────────────────────────────────────────

    /// Appends a step. A/B variants may join an existing A/B step number
    /// with a distinct variant letter.
    pub fn add_step(&self, campaign_id: Uuid, cmd: CreateStep) -> LiyaqaResult<CampaignStep> {
        let campaign = self.get_campaign(campaign_id)?;
        ensure_editable(&campaign)?;
        ensure(!cmd.name.trim().is_empty(), "Step name is required")?;
        ensure(!cmd.body_en.trim().is_empty(), "Step body is required")?;
        if let Some(split) = cmd.ab_split_percentage {
            ensure(split <= 100, "A/B split percentage must be between 0 and 100")?;
        }
        validate_delay(Some(cmd.delay_days), Some(cmd.delay_hours))?;

        let existing = self.store.steps_for(campaign_id);
        let variant = if cmd.is_ab_test {
            let letter = cmd.ab_variant.unwrap_or('A').to_ascii_uppercase();
            ensure(letter.is_ascii_alphabetic(), "A/B variant must be a letter")?;
            Some(letter)
        } else {
            None
        };

        let step_number = match cmd.step_number {
            Some(number) => {
                let peers: Vec<&CampaignStep> =
                    existing.iter().filter(|s| s.step_number == number).collect();
                if peers.is_empty() {
                    return Err(LiyaqaError::Validation(format!(
                        "Step number {number} does not exist"
                    )));
                }
                if !cmd.is_ab_test || peers.iter().any(|s| !s.is_ab_test) {
                    return Err(LiyaqaError::Conflict(format!(
                        "Step number {number} is already taken"
                    )));
                }
                if peers.iter().any(|s| s.ab_variant == variant) {
                    return Err(LiyaqaError::Conflict(format!(
                        "Variant {:?} already exists for step {number}",
                        variant
                    )));
                }
                number
            }
            None => existing.iter().map(|s| s.step_number).max().unwrap_or(0) + 1,
        };

        let step = CampaignStep {
            id: Uuid::new_v4(),
            campaign_id,
            step_number,
            name: cmd.name.trim().to_string(),
            channel: cmd.channel,
            subject_en: cmd.subject_en,
            subject_ar: cmd.subject_ar,
            body_en: cmd.body_en,
            body_ar: cmd.body_ar,
            delay_days: cmd.delay_days,
            delay_hours: cmd.delay_hours,
            is_ab_test: cmd.is_ab_test,
            ab_variant: variant,
            ab_split_percentage: if cmd.is_ab_test {
                cmd.ab_split_percentage
            } else {
                None
            },
            is_active: true,
            created_at: Utc::now(),
        };

        info!(
            campaign_id = %campaign_id,
            step_id = %step.id,
            step_number,
            "Added campaign step"
        );
        self.store.steps.insert(step.id, step.clone());
        Ok(step)
    }

    pub fn update_step(&self, step_id: Uuid, cmd: UpdateStep) -> LiyaqaResult<CampaignStep> {
        let step = self
            .store
            .step(step_id)
            .ok_or_else(|| LiyaqaError::not_found("CampaignStep", step_id))?;
        ensure_editable(&self.get_campaign(step.campaign_id)?)?;
        if let Some(split) = cmd.ab_split_percentage {
            ensure(split <= 100, "A/B split percentage must be between 0 and 100")?;
        }
        validate_delay(cmd.delay_days, cmd.delay_hours)?;

        let mut entry = self
            .store
            .steps
            .get_mut(&step_id)
            .ok_or_else(|| LiyaqaError::not_found("CampaignStep", step_id))?;
        if let Some(name) = cmd.name {
            ensure(!name.trim().is_empty(), "Step name is required")?;
            entry.name = name.trim().to_string();
        }
        if let Some(channel) = cmd.channel {
            entry.channel = channel;
        }
        if cmd.subject_en.is_some() {
            entry.subject_en = cmd.subject_en;
        }
        if cmd.subject_ar.is_some() {
            entry.subject_ar = cmd.subject_ar;
        }
        if let Some(body) = cmd.body_en {
            entry.body_en = body;
        }
        if let Some(body) = cmd.body_ar {
            entry.body_ar = body;
        }
        if let Some(days) = cmd.delay_days {
            entry.delay_days = days;
        }
        if let Some(hours) = cmd.delay_hours {
            entry.delay_hours = hours;
        }
        if entry.is_ab_test && cmd.ab_split_percentage.is_some() {
            entry.ab_split_percentage = cmd.ab_split_percentage;
        }
        if let Some(active) = cmd.is_active {
            entry.is_active = active;
        }
        info!(step_id = %step_id, "Updated campaign step");
        Ok(entry.clone())
    }

    /// Removes a step and closes the gap in step numbering.
    pub fn delete_step(&self, step_id: Uuid) -> LiyaqaResult<()> {
        let step = self
            .store
            .step(step_id)
            .ok_or_else(|| LiyaqaError::not_found("CampaignStep", step_id))?;
        ensure_editable(&self.get_campaign(step.campaign_id)?)?;

        self.store.steps.remove(&step_id);
        let number_still_used = self
            .store
            .steps_for(step.campaign_id)
            .iter()
            .any(|s| s.step_number == step.step_number);
        if !number_still_used {
            for mut s in self.store.steps.iter_mut() {
                if s.campaign_id == step.campaign_id && s.step_number > step.step_number {
                    s.step_number -= 1;
                }
            }
        }
        info!(step_id = %step_id, campaign_id = %step.campaign_id, "Deleted campaign step");
        Ok(())
    }

    pub fn get_step(&self, step_id: Uuid) -> LiyaqaResult<CampaignStep> {
        self.store
            .step(step_id)
            .ok_or_else(|| LiyaqaError::not_found("CampaignStep", step_id))
    }

    /// Steps ordered by step number then variant.
    pub fn get_steps(&self, campaign_id: Uuid) -> LiyaqaResult<Vec<CampaignStep>> {
        self.get_campaign(campaign_id)?;
        Ok(self.store.steps_for(campaign_id))
    }

    fn emit(&self, event_type: EventType, campaign: &Campaign) {
        self.event_sink.emit(make_event(
            event_type,
            Some(campaign.tenant_id),
            campaign.id,
            serde_json::json!({ "name": campaign.name, "status": campaign.status }),
        ));
    }
}

fn ensure_editable(campaign: &Campaign) -> LiyaqaResult<()> {
    if campaign.status.is_editable() {
        Ok(())
    } else {
        Err(LiyaqaError::InvalidState(format!(
            "Steps can only be changed while the campaign is Draft or Paused, was {:?}",
            campaign.status
        )))
    }
}

fn validate_trigger_days(days: Option<i64>) -> LiyaqaResult<()> {
    if let Some(days) = days {
        ensure(
            (0..=MAX_TRIGGER_DAYS).contains(&days),
            format!("Trigger days must be between 0 and {MAX_TRIGGER_DAYS}"),
        )?;
    }
    Ok(())
}

fn validate_delay(days: Option<u32>, hours: Option<u32>) -> LiyaqaResult<()> {
    if let Some(days) = days {
        ensure(
            days <= MAX_DELAY_DAYS,
            format!("Step delay days must not exceed {MAX_DELAY_DAYS}"),
        )?;
    }
    if let Some(hours) = hours {
        ensure(
            hours <= MAX_DELAY_HOURS,
            format!("Step delay hours must not exceed {MAX_DELAY_HOURS}"),
        )?;
    }
    Ok(())
}

fn validate_window(
    start: Option<chrono::NaiveDate>,
    end: Option<chrono::NaiveDate>,
) -> LiyaqaResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        ensure(start <= end, "Campaign start date must not be after end date")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CampaignType, MarketingChannel, TriggerConfig, TriggerType};
    use liyaqa_core::event_bus::capture_sink;

    fn service() -> CampaignService {
        CampaignService::new(MarketingStore::new())
    }

    fn create(service: &CampaignService, tenant_id: Uuid) -> Campaign {
        service
            .create_campaign(CreateCampaign {
                tenant_id,
                name: "Welcome Series".into(),
                description: Some("Onboarding".into()),
                campaign_type: CampaignType::WelcomeSequence,
                trigger_type: TriggerType::MemberCreated,
                trigger_config: TriggerConfig::default(),
                segment_id: None,
                start_date: None,
                end_date: None,
                is_template: false,
            })
            .unwrap()
    }

    fn ab_step(variant: char, number: Option<u32>) -> CreateStep {
        CreateStep {
            is_ab_test: true,
            ab_variant: Some(variant),
            ab_split_percentage: Some(50),
            step_number: number,
            ..CreateStep::email(format!("Variant {variant}"), "Hi", "Hello {{firstName}}")
        }
    }

    #[test]
    fn test_create_campaign_starts_in_draft() {
        let svc = service();
        let campaign = create(&svc, Uuid::new_v4());
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.total_enrolled, 0);
        assert_eq!(svc.get_campaign(campaign.id).unwrap().name, "Welcome Series");
    }

    #[test]
    fn test_create_campaign_rejects_blank_name() {
        let svc = service();
        let err = svc
            .create_campaign(CreateCampaign {
                tenant_id: Uuid::new_v4(),
                name: "  ".into(),
                description: None,
                campaign_type: CampaignType::Custom,
                trigger_type: TriggerType::Manual,
                trigger_config: TriggerConfig::default(),
                segment_id: None,
                start_date: None,
                end_date: None,
                is_template: false,
            })
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::Validation(_)));
    }

    #[test]
    fn test_trigger_days_are_bounded() {
        let svc = service();
        let err = svc
            .create_campaign(CreateCampaign {
                tenant_id: Uuid::new_v4(),
                name: "Far Future".into(),
                description: None,
                campaign_type: CampaignType::Custom,
                trigger_type: TriggerType::DaysBeforeExpiry,
                trigger_config: TriggerConfig::with_days(i64::MAX),
                segment_id: None,
                start_date: None,
                end_date: None,
                is_template: false,
            })
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::Validation(_)));

        let campaign = create(&svc, Uuid::new_v4());
        let err = svc
            .update_campaign(
                campaign.id,
                UpdateCampaign {
                    trigger_config: Some(TriggerConfig::with_days(MAX_TRIGGER_DAYS + 1)),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::Validation(_)));
        assert_eq!(svc.get_campaign(campaign.id).unwrap().trigger_config.days, None);

        let updated = svc
            .update_campaign(
                campaign.id,
                UpdateCampaign {
                    trigger_config: Some(TriggerConfig::with_days(MAX_TRIGGER_DAYS)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.trigger_config.days, Some(MAX_TRIGGER_DAYS));
    }

    #[test]
    fn test_get_missing_campaign_is_not_found() {
        let err = service().get_campaign(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, LiyaqaError::NotFound(_)));
    }

    #[test]
    fn test_list_campaigns_is_tenant_scoped() {
        let svc = service();
        let tenant = Uuid::new_v4();
        create(&svc, tenant);
        create(&svc, tenant);
        create(&svc, Uuid::new_v4());
        let page = svc.list_campaigns(tenant, PageRequest::default());
        assert_eq!(page.total_elements, 2);
    }

    #[test]
    fn test_update_rejected_when_active() {
        let svc = service();
        let campaign = create(&svc, Uuid::new_v4());
        svc.add_step(campaign.id, CreateStep::email("Day 1", "Hi", "Welcome"))
            .unwrap();
        svc.activate_campaign(campaign.id).unwrap();

        let err = svc
            .update_campaign(
                campaign.id,
                UpdateCampaign {
                    name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::InvalidState(_)));

        svc.pause_campaign(campaign.id).unwrap();
        let updated = svc
            .update_campaign(
                campaign.id,
                UpdateCampaign {
                    name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Renamed");
    }

    #[test]
    fn test_delete_only_in_draft() {
        let svc = service();
        let campaign = create(&svc, Uuid::new_v4());
        svc.add_step(campaign.id, CreateStep::email("Day 1", "Hi", "Welcome"))
            .unwrap();
        svc.activate_campaign(campaign.id).unwrap();
        assert!(matches!(
            svc.delete_campaign(campaign.id).unwrap_err(),
            LiyaqaError::InvalidState(_)
        ));

        let draft = create(&svc, Uuid::new_v4());
        svc.add_step(draft.id, CreateStep::email("Day 1", "Hi", "Welcome"))
            .unwrap();
        svc.delete_campaign(draft.id).unwrap();
        assert!(svc.store().steps_for(draft.id).is_empty());
        assert!(svc.get_campaign(draft.id).is_err());
    }

    #[test]
    fn test_activate_requires_steps() {
        let svc = service();
        let campaign = create(&svc, Uuid::new_v4());
        assert!(matches!(
            svc.activate_campaign(campaign.id).unwrap_err(),
            LiyaqaError::Validation(_)
        ));
        svc.add_step(campaign.id, CreateStep::email("Day 1", "Hi", "Welcome"))
            .unwrap();
        assert_eq!(
            svc.activate_campaign(campaign.id).unwrap().status,
            CampaignStatus::Active
        );
    }

    #[test]
    fn test_lifecycle_emits_events() {
        let sink = capture_sink();
        let svc = service().with_event_sink(sink.clone());
        let campaign = create(&svc, Uuid::new_v4());
        svc.add_step(campaign.id, CreateStep::email("Day 1", "Hi", "Welcome"))
            .unwrap();
        svc.activate_campaign(campaign.id).unwrap();
        svc.pause_campaign(campaign.id).unwrap();
        svc.archive_campaign(campaign.id).unwrap();
        assert_eq!(sink.count_type(EventType::CampaignActivated), 1);
        assert_eq!(sink.count_type(EventType::CampaignPaused), 1);
        assert_eq!(sink.count_type(EventType::CampaignArchived), 1);
    }

    #[test]
    fn test_complete_only_from_active() {
        let svc = service();
        let campaign = create(&svc, Uuid::new_v4());
        assert!(matches!(
            svc.complete_campaign(campaign.id),
            Err(LiyaqaError::InvalidState(_))
        ));
        svc.add_step(campaign.id, CreateStep::email("Day 1", "Hi", "Welcome"))
            .unwrap();
        svc.activate_campaign(campaign.id).unwrap();
        let done = svc.complete_campaign(campaign.id).unwrap();
        assert_eq!(done.status, CampaignStatus::Completed);
    }

    #[test]
    fn test_duplicate_copies_steps_as_draft() {
        let svc = service();
        let campaign = create(&svc, Uuid::new_v4());
        svc.add_step(campaign.id, CreateStep::email("Day 1", "Hi", "Welcome"))
            .unwrap();
        svc.add_step(campaign.id, CreateStep::email("Day 3", "Hi", "Tips").after_days(3))
            .unwrap();
        svc.activate_campaign(campaign.id).unwrap();

        let copy = svc
            .duplicate_campaign(campaign.id, "Welcome Series Copy")
            .unwrap();
        assert_eq!(copy.name, "Welcome Series Copy");
        assert_eq!(copy.status, CampaignStatus::Draft);
        assert_eq!(copy.campaign_type, campaign.campaign_type);
        let steps = svc.get_steps(copy.id).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].delay_days, 3);
        assert!(steps.iter().all(|s| s.campaign_id == copy.id));
    }

    #[test]
    fn test_add_step_numbers_sequentially() {
        let svc = service();
        let campaign = create(&svc, Uuid::new_v4());
        let first = svc
            .add_step(campaign.id, CreateStep::email("Day 1 Welcome", "Hi", "Welcome"))
            .unwrap();
        assert_eq!(first.step_number, 1);
        assert_eq!(first.channel, MarketingChannel::Email);
        svc.add_step(campaign.id, CreateStep::email("Two", "Hi", "Two"))
            .unwrap();
        let third = svc
            .add_step(campaign.id, CreateStep::email("Three", "Hi", "Three"))
            .unwrap();
        assert_eq!(third.step_number, 3);
    }

    #[test]
    fn test_ab_variant_joins_existing_step_number() {
        let svc = service();
        let campaign = create(&svc, Uuid::new_v4());
        let a = svc.add_step(campaign.id, ab_step('A', None)).unwrap();
        let b = svc
            .add_step(campaign.id, ab_step('B', Some(a.step_number)))
            .unwrap();
        assert_eq!(b.step_number, a.step_number);
        assert_eq!(b.ab_variant, Some('B'));

        let dup = svc.add_step(campaign.id, ab_step('B', Some(a.step_number)));
        assert!(matches!(dup.unwrap_err(), LiyaqaError::Conflict(_)));

        let plain = svc.add_step(
            campaign.id,
            CreateStep {
                step_number: Some(a.step_number),
                ..CreateStep::email("Plain", "Hi", "Body")
            },
        );
        assert!(matches!(plain.unwrap_err(), LiyaqaError::Conflict(_)));
    }

    #[test]
    fn test_step_delays_are_bounded() {
        let svc = service();
        let campaign = create(&svc, Uuid::new_v4());
        let err = svc
            .add_step(
                campaign.id,
                CreateStep {
                    delay_days: u32::MAX,
                    ..CreateStep::email("Later", "Hi", "Body")
                },
            )
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::Validation(_)));

        let step = svc
            .add_step(campaign.id, CreateStep::email("Now", "Hi", "Body"))
            .unwrap();
        let err = svc
            .update_step(
                step.id,
                UpdateStep {
                    delay_hours: Some(MAX_DELAY_HOURS + 1),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::Validation(_)));
        assert_eq!(svc.store().step(step.id).unwrap().delay_hours, 0);
    }

    #[test]
    fn test_add_step_rejected_when_active() {
        let svc = service();
        let campaign = create(&svc, Uuid::new_v4());
        svc.add_step(campaign.id, CreateStep::email("Day 1", "Hi", "Welcome"))
            .unwrap();
        svc.activate_campaign(campaign.id).unwrap();
        let err = svc
            .add_step(campaign.id, CreateStep::email("Day 2", "Hi", "More"))
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::InvalidState(_)));
    }

    #[test]
    fn test_delete_step_renumbers() {
        let svc = service();
        let campaign = create(&svc, Uuid::new_v4());
        svc.add_step(campaign.id, CreateStep::email("One", "Hi", "1"))
            .unwrap();
        let two = svc
            .add_step(campaign.id, CreateStep::email("Two", "Hi", "2"))
            .unwrap();
        svc.add_step(campaign.id, CreateStep::email("Three", "Hi", "3"))
            .unwrap();

        svc.delete_step(two.id).unwrap();
        let steps = svc.get_steps(campaign.id).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_number, 1);
        assert_eq!(steps[1].step_number, 2);
        assert_eq!(steps[1].name, "Three");
    }

    #[test]
    fn test_create_from_template() {
        let svc = service();
        let template = svc
            .create_campaign(CreateCampaign {
                tenant_id: Uuid::nil(),
                name: "Birthday Greeting".into(),
                description: None,
                campaign_type: CampaignType::Birthday,
                trigger_type: TriggerType::Birthday,
                trigger_config: TriggerConfig::default(),
                segment_id: None,
                start_date: None,
                end_date: None,
                is_template: true,
            })
            .unwrap();
        svc.add_step(template.id, CreateStep::email("Greeting", "Happy birthday", "🎉"))
            .unwrap();

        let tenant = Uuid::new_v4();
        let campaign = svc
            .create_from_template(template.id, tenant, "Our Birthday Campaign")
            .unwrap();
        assert_eq!(campaign.tenant_id, tenant);
        assert!(!campaign.is_template);
        assert_eq!(svc.get_steps(campaign.id).unwrap().len(), 1);
        assert_eq!(svc.list_templates().len(), 1);

        let err = svc
            .create_from_template(campaign.id, tenant, "Nope")
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::Validation(_)));
    }
}
