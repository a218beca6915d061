//! Tenant lifecycle: provisioning with an onboarding checklist, status
//! transitions, offboarding (deactivation, data export, archive), and the
//! client subscription.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use liyaqa_core::error::ensure;
use liyaqa_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use liyaqa_core::{LiyaqaError, LiyaqaResult, Money, Page, PageRequest};

use crate::audit::AuditLogger;
use crate::invites::is_valid_email;

/// Days tenant data is kept after archiving.
const DATA_RETENTION_DAYS: i64 = 365;

// ----- Types -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Provisioning,
    Active,
    Suspended,
    Deactivated,
    Archived,
}

impl TenantStatus {
    pub fn can_transition_to(self, next: TenantStatus) -> bool {
        use TenantStatus::*;
        matches!(
            (self, next),
            (Provisioning, Active)
                | (Active, Suspended)
                | (Active, Deactivated)
                | (Suspended, Active)
                | (Suspended, Deactivated)
                | (Deactivated, Active)
                | (Deactivated, Archived)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingTier {
    Starter,
    Professional,
    Enterprise,
}

impl PricingTier {
    pub fn monthly_price(self) -> Money {
        match self {
            Self::Starter => Money::from_sar(499),
            Self::Professional => Money::from_sar(999),
            Self::Enterprise => Money::from_sar(2499),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientSubscriptionStatus {
    Trial,
    Active,
    PastDue,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnboardingStep {
    TenantCreated,
    AdminAccountCreated,
    OrganizationSetup,
    SubscriptionActivated,
    InitialConfigDone,
    DataImported,
    TrainingScheduled,
    GoLive,
}

impl OnboardingStep {
    pub const ALL: [OnboardingStep; 8] = [
        Self::TenantCreated,
        Self::AdminAccountCreated,
        Self::OrganizationSetup,
        Self::SubscriptionActivated,
        Self::InitialConfigDone,
        Self::DataImported,
        Self::TrainingScheduled,
        Self::GoLive,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingItem {
    pub step: OnboardingStep,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub facility_name: String,
    pub subdomain: String,
    pub contact_email: String,
    pub status: TenantStatus,
    pub tier: PricingTier,
    pub subscription_status: ClientSubscriptionStatus,
    pub onboarding: Vec<OnboardingItem>,
    pub onboarded_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub data_retention_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Share of completed checklist steps, in percent.
    pub fn onboarding_progress(&self) -> f64 {
        if self.onboarding.is_empty() {
            return 0.0;
        }
        let done = self.onboarding.iter().filter(|i| i.completed).count();
        ((done as f64 / self.onboarding.len() as f64) * 10_000.0).round() / 100.0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionTenant {
    pub facility_name: String,
    pub subdomain: String,
    pub contact_email: String,
    #[serde(default = "default_tier")]
    pub tier: PricingTier,
}

fn default_tier() -> PricingTier {
    PricingTier::Starter
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
    ClientRequest,
    NonPayment,
    ContractEnded,
    Fraud,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivationLog {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub reason: DeactivationReason,
    pub notes: Option<String>,
    pub previous_status: TenantStatus,
    pub deactivated_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataExportFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataExportStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataExportJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub format: DataExportFormat,
    pub status: DataExportStatus,
    pub requested_by: Uuid,
    pub file_url: Option<String>,
    pub file_size_bytes: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ----- Service -----

#[derive(Clone)]
pub struct TenantService {
    tenants: Arc<DashMap<Uuid, Tenant>>,
    deactivation_logs: Arc<DashMap<Uuid, DeactivationLog>>,
    exports: Arc<DashMap<Uuid, DataExportJob>>,
    audit: AuditLogger,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for TenantService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantService")
            .field("tenants", &self.tenants.len())
            .finish()
    }
}

impl TenantService {
    pub fn new(audit: AuditLogger) -> Self {
        Self {
            tenants: Arc::new(DashMap::new()),
            deactivation_logs: Arc::new(DashMap::new()),
            exports: Arc::new(DashMap::new()),
            audit,
            event_sink: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Creates a tenant in `Provisioning` with its onboarding checklist;
    /// `TenantCreated` starts out complete.
    pub fn provision(&self, cmd: ProvisionTenant, actor_id: Uuid) -> LiyaqaResult<Tenant> {
        ensure(!cmd.facility_name.trim().is_empty(), "Facility name is required")?;
        ensure(is_valid_email(&cmd.contact_email), "Invalid contact email")?;
        let subdomain = cmd.subdomain.trim().to_lowercase();
        ensure(
            is_valid_subdomain(&subdomain),
            "Subdomain must be 3-63 lowercase letters, digits, or hyphens",
        )?;
        if self.tenants.iter().any(|t| t.subdomain == subdomain) {
            return Err(LiyaqaError::Conflict(format!(
                "Subdomain already taken: {subdomain}"
            )));
        }

        let now = Utc::now();
        let onboarding = OnboardingStep::ALL
            .iter()
            .map(|&step| {
                let done = step == OnboardingStep::TenantCreated;
                OnboardingItem {
                    step,
                    completed: done,
                    completed_at: done.then_some(now),
                    notes: None,
                }
            })
            .collect();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            facility_name: cmd.facility_name.trim().to_string(),
            subdomain,
            contact_email: cmd.contact_email.trim().to_lowercase(),
            status: TenantStatus::Provisioning,
            tier: cmd.tier,
            subscription_status: ClientSubscriptionStatus::Trial,
            onboarding,
            onboarded_at: None,
            deactivated_at: None,
            data_retention_until: None,
            created_at: now,
            updated_at: now,
        };
        self.tenants.insert(tenant.id, tenant.clone());
        info!(tenant_id = %tenant.id, subdomain = %tenant.subdomain, "Tenant provisioned");
        self.audit.log_action(
            tenant.id,
            actor_id,
            "tenant.provision",
            "tenant",
            tenant.id,
            serde_json::json!({ "subdomain": tenant.subdomain, "tier": tenant.tier }),
        );
        Ok(tenant)
    }

    pub fn get(&self, id: Uuid) -> LiyaqaResult<Tenant> {
        self.tenants
            .get(&id)
            .map(|t| t.clone())
            .ok_or_else(|| LiyaqaError::not_found("Tenant", id))
    }

    pub fn exists(&self, id: Uuid) -> bool {
        self.tenants.contains_key(&id)
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.tenants
            .get(&id)
            .is_some_and(|t| t.status == TenantStatus::Active)
    }

    /// Tenants, newest first, optionally filtered by status.
    pub fn list(&self, status: Option<TenantStatus>, page: PageRequest) -> Page<Tenant> {
        Page::from_vec(self.all(status), page)
    }

    pub fn all(&self, status: Option<TenantStatus>) -> Vec<Tenant> {
        let mut found: Vec<Tenant> = self
            .tenants
            .iter()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .map(|t| t.value().clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    /// Validated status change. `Deactivated` and `Archived` go through
    /// their offboarding rules.
    pub fn change_status(&self, id: Uuid, next: TenantStatus, actor_id: Uuid) -> LiyaqaResult<Tenant> {
        match next {
            TenantStatus::Deactivated => self.deactivate(id, DeactivationReason::Other, None, actor_id),
            TenantStatus::Archived => self.archive(id, actor_id),
            _ => self.transition(id, next, actor_id),
        }
    }

    pub fn suspend(&self, id: Uuid, reason: &str, actor_id: Uuid) -> LiyaqaResult<Tenant> {
        ensure(!reason.trim().is_empty(), "Suspension reason is required")?;
        let tenant = self.transition(id, TenantStatus::Suspended, actor_id)?;
        warn!(tenant_id = %id, reason, "Tenant suspended");
        Ok(tenant)
    }

    /// Deactivates an active or suspended tenant. Rejected while the
    /// client subscription is still active.
    pub fn deactivate(
        &self,
        id: Uuid,
        reason: DeactivationReason,
        notes: Option<String>,
        actor_id: Uuid,
    ) -> LiyaqaResult<Tenant> {
        let current = self.get(id)?;
        if current.subscription_status == ClientSubscriptionStatus::Active {
            return Err(LiyaqaError::Conflict(format!(
                "Tenant {id} has an active subscription; cancel it first"
            )));
        }
        let tenant = self.transition(id, TenantStatus::Deactivated, actor_id)?;
        let log = DeactivationLog {
            id: Uuid::new_v4(),
            tenant_id: id,
            reason,
            notes,
            previous_status: current.status,
            deactivated_by: actor_id,
            created_at: Utc::now(),
        };
        self.deactivation_logs.insert(log.id, log);
        info!(tenant_id = %id, reason = ?reason, "Tenant deactivated");
        Ok(tenant)
    }

    pub fn request_export(&self, id: Uuid, format: DataExportFormat, actor_id: Uuid) -> LiyaqaResult<DataExportJob> {
        self.get(id)?;
        let busy = self.exports.iter().any(|e| {
            e.tenant_id == id
                && matches!(e.status, DataExportStatus::Pending | DataExportStatus::InProgress)
        });
        if busy {
            return Err(LiyaqaError::Conflict(format!(
                "A data export is already in progress for tenant {id}"
            )));
        }
        let job = DataExportJob {
            id: Uuid::new_v4(),
            tenant_id: id,
            format,
            status: DataExportStatus::Pending,
            requested_by: actor_id,
            file_url: None,
            file_size_bytes: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.exports.insert(job.id, job.clone());
        self.audit.log_action(id, actor_id, "tenant.export.request", "data_export", job.id, serde_json::json!({ "format": format }));
        Ok(job)
    }

    pub fn complete_export(&self, export_id: Uuid, file_url: &str, file_size_bytes: u64) -> LiyaqaResult<DataExportJob> {
        ensure(!file_url.trim().is_empty(), "File URL is required")?;
        let mut job = self
            .exports
            .get_mut(&export_id)
            .ok_or_else(|| LiyaqaError::not_found("Data export", export_id))?;
        if !matches!(job.status, DataExportStatus::Pending | DataExportStatus::InProgress) {
            return Err(LiyaqaError::InvalidState(format!(
                "Export {export_id} is already {:?}",
                job.status
            )));
        }
        job.status = DataExportStatus::Completed;
        job.file_url = Some(file_url.to_string());
        job.file_size_bytes = Some(file_size_bytes);
        job.completed_at = Some(Utc::now());
        Ok(job.clone())
    }

    /// Archives a deactivated tenant once a data export has completed.
    pub fn archive(&self, id: Uuid, actor_id: Uuid) -> LiyaqaResult<Tenant> {
        let current = self.get(id)?;
        if current.status != TenantStatus::Deactivated {
            return Err(LiyaqaError::InvalidState(format!(
                "Only deactivated tenants can be archived; tenant {id} is {:?}",
                current.status
            )));
        }
        let exported = self
            .exports
            .iter()
            .any(|e| e.tenant_id == id && e.status == DataExportStatus::Completed);
        if !exported {
            return Err(LiyaqaError::InvalidState(format!(
                "Tenant {id} needs a completed data export before archiving"
            )));
        }
        self.transition(id, TenantStatus::Archived, actor_id)
    }

    /// Marks a checklist step complete. Completing a step twice keeps the
    /// first completion time.
    pub fn complete_onboarding_step(
        &self,
        id: Uuid,
        step: OnboardingStep,
        notes: Option<String>,
    ) -> LiyaqaResult<OnboardingItem> {
        let mut tenant = self
            .tenants
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Tenant", id))?;
        let now = Utc::now();
        let item = tenant
            .onboarding
            .iter_mut()
            .find(|i| i.step == step)
            .ok_or_else(|| LiyaqaError::not_found("Onboarding step", format!("{step:?}")))?;
        if !item.completed {
            item.completed = true;
            item.completed_at = Some(now);
            item.notes = notes;
        }
        let item = item.clone();
        tenant.updated_at = now;
        Ok(item)
    }

    pub fn activate_subscription(&self, id: Uuid) -> LiyaqaResult<Tenant> {
        let mut tenant = self
            .tenants
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Tenant", id))?;
        tenant.subscription_status = ClientSubscriptionStatus::Active;
        tenant.updated_at = Utc::now();
        Ok(tenant.clone())
    }

    pub fn cancel_subscription(&self, id: Uuid, actor_id: Uuid) -> LiyaqaResult<Tenant> {
        let mut tenant = self
            .tenants
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Tenant", id))?;
        if tenant.subscription_status == ClientSubscriptionStatus::Cancelled {
            return Err(LiyaqaError::InvalidState("Subscription is already cancelled".into()));
        }
        tenant.subscription_status = ClientSubscriptionStatus::Cancelled;
        tenant.updated_at = Utc::now();
        let tenant = tenant.clone();
        self.audit.log_action(id, actor_id, "tenant.subscription.cancel", "tenant", id, serde_json::json!({}));
        Ok(tenant)
    }

    pub fn change_tier(&self, id: Uuid, tier: PricingTier) -> LiyaqaResult<Tenant> {
        let mut tenant = self
            .tenants
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Tenant", id))?;
        tenant.tier = tier;
        tenant.updated_at = Utc::now();
        Ok(tenant.clone())
    }

    /// Deactivation history, newest first.
    pub fn deactivation_history(&self, id: Uuid) -> LiyaqaResult<Vec<DeactivationLog>> {
        self.get(id)?;
        let mut logs: Vec<DeactivationLog> = self
            .deactivation_logs
            .iter()
            .filter(|l| l.tenant_id == id)
            .map(|l| l.value().clone())
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(logs)
    }

    pub fn exports(&self, id: Uuid) -> LiyaqaResult<Vec<DataExportJob>> {
        self.get(id)?;
        let mut jobs: Vec<DataExportJob> = self
            .exports
            .iter()
            .filter(|e| e.tenant_id == id)
            .map(|e| e.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    fn transition(&self, id: Uuid, next: TenantStatus, actor_id: Uuid) -> LiyaqaResult<Tenant> {
        let mut tenant = self
            .tenants
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Tenant", id))?;
        let previous = tenant.status;
        if !previous.can_transition_to(next) {
            return Err(LiyaqaError::InvalidState(format!(
                "Tenant cannot move from {previous:?} to {next:?}"
            )));
        }
        let now = Utc::now();
        tenant.status = next;
        tenant.updated_at = now;
        match next {
            TenantStatus::Active if tenant.onboarded_at.is_none() => tenant.onboarded_at = Some(now),
            TenantStatus::Deactivated => tenant.deactivated_at = Some(now),
            TenantStatus::Archived => {
                tenant.data_retention_until = Some(now + Duration::days(DATA_RETENTION_DAYS));
            }
            _ => {}
        }
        let tenant = tenant.clone();

        info!(tenant_id = %id, from = ?previous, to = ?next, "Tenant status changed");
        metrics::counter!("platform.tenants.status_changes").increment(1);
        self.audit.log_action(
            id,
            actor_id,
            "tenant.status.change",
            "tenant",
            id,
            serde_json::json!({ "from": previous, "to": next }),
        );
        self.event_sink.emit(make_event(
            EventType::TenantStatusChanged,
            Some(id),
            id,
            serde_json::json!({ "from": previous, "to": next }),
        ));
        Ok(tenant)
    }
}

fn is_valid_subdomain(subdomain: &str) -> bool {
    (3..=63).contains(&subdomain.len())
        && subdomain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !subdomain.starts_with('-')
        && !subdomain.ends_with('-')
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use liyaqa_core::event_bus::capture_sink;

    pub(crate) fn provision(service: &TenantService, subdomain: &str) -> Tenant {
        service
            .provision(
                ProvisionTenant {
                    facility_name: "Test Gym".into(),
                    subdomain: subdomain.into(),
                    contact_email: "test@gym.com".into(),
                    tier: PricingTier::Professional,
                },
                Uuid::new_v4(),
            )
            .unwrap()
    }

    pub(crate) fn active_tenant(service: &TenantService, subdomain: &str) -> Tenant {
        let tenant = provision(service, subdomain);
        service
            .change_status(tenant.id, TenantStatus::Active, Uuid::new_v4())
            .unwrap()
    }

    #[test]
    fn test_provision_creates_checklist() {
        let service = TenantService::new(AuditLogger::new());
        let tenant = provision(&service, "test-gym");
        assert_eq!(tenant.status, TenantStatus::Provisioning);
        assert_eq!(tenant.onboarding.len(), 8);
        assert!(tenant.onboarding[0].completed);
        assert_eq!(tenant.onboarding_progress(), 12.5);
    }

    #[test]
    fn test_duplicate_subdomain_rejected() {
        let service = TenantService::new(AuditLogger::new());
        provision(&service, "test-gym");
        let err = service
            .provision(
                ProvisionTenant {
                    facility_name: "Other".into(),
                    subdomain: "Test-Gym".into(),
                    contact_email: "o@gym.com".into(),
                    tier: PricingTier::Starter,
                },
                Uuid::new_v4(),
            )
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::Conflict(_)));
    }

    #[test]
    fn test_status_transitions() {
        let sink = capture_sink();
        let service = TenantService::new(AuditLogger::new()).with_event_sink(sink.clone());
        let tenant = provision(&service, "test-gym");
        let actor = Uuid::new_v4();
        assert!(service.suspend(tenant.id, "overdue", actor).is_err());

        let active = service.change_status(tenant.id, TenantStatus::Active, actor).unwrap();
        assert!(active.onboarded_at.is_some());
        service.suspend(tenant.id, "overdue", actor).unwrap();
        assert!(matches!(
            service.change_status(tenant.id, TenantStatus::Provisioning, actor).unwrap_err(),
            LiyaqaError::InvalidState(_)
        ));
        service.change_status(tenant.id, TenantStatus::Active, actor).unwrap();
        assert_eq!(sink.count_type(EventType::TenantStatusChanged), 3);
    }

    #[test]
    fn test_deactivate_requires_cancelled_subscription() {
        let service = TenantService::new(AuditLogger::new());
        let tenant = active_tenant(&service, "test-gym");
        let actor = Uuid::new_v4();
        service.activate_subscription(tenant.id).unwrap();
        assert!(matches!(
            service
                .deactivate(tenant.id, DeactivationReason::ContractEnded, None, actor)
                .unwrap_err(),
            LiyaqaError::Conflict(_)
        ));

        service.cancel_subscription(tenant.id, actor).unwrap();
        let deactivated = service
            .deactivate(tenant.id, DeactivationReason::ContractEnded, Some("Contract expired".into()), actor)
            .unwrap();
        assert_eq!(deactivated.status, TenantStatus::Deactivated);
        assert!(deactivated.deactivated_at.is_some());

        let history = service.deactivation_history(tenant.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous_status, TenantStatus::Active);

        assert!(service
            .deactivate(tenant.id, DeactivationReason::Fraud, None, actor)
            .is_err());
    }

    #[test]
    fn test_offboarding_flow() {
        let service = TenantService::new(AuditLogger::new());
        let tenant = active_tenant(&service, "test-gym");
        let actor = Uuid::new_v4();
        service
            .deactivate(tenant.id, DeactivationReason::ClientRequest, None, actor)
            .unwrap();

        assert!(service.archive(tenant.id, actor).is_err());
        let job = service.request_export(tenant.id, DataExportFormat::Json, actor).unwrap();
        assert_eq!(job.status, DataExportStatus::Pending);
        assert!(service.request_export(tenant.id, DataExportFormat::Csv, actor).is_err());

        service.complete_export(job.id, "https://storage.example.com/export.json", 2048).unwrap();
        assert!(service.request_export(tenant.id, DataExportFormat::Csv, actor).is_ok());

        let archived = service.archive(tenant.id, actor).unwrap();
        assert_eq!(archived.status, TenantStatus::Archived);
        assert!(archived.data_retention_until.is_some());
        assert_eq!(service.exports(tenant.id).unwrap().len(), 2);
    }

    #[test]
    fn test_archive_requires_deactivated() {
        let service = TenantService::new(AuditLogger::new());
        let tenant = active_tenant(&service, "test-gym");
        assert!(matches!(
            service.archive(tenant.id, Uuid::new_v4()).unwrap_err(),
            LiyaqaError::InvalidState(_)
        ));
    }

    #[test]
    fn test_complete_onboarding_step_idempotent() {
        let service = TenantService::new(AuditLogger::new());
        let tenant = provision(&service, "test-gym");
        let first = service
            .complete_onboarding_step(tenant.id, OnboardingStep::InitialConfigDone, Some("Config done".into()))
            .unwrap();
        assert!(first.completed);
        assert_eq!(first.notes.as_deref(), Some("Config done"));
        let again = service
            .complete_onboarding_step(tenant.id, OnboardingStep::InitialConfigDone, None)
            .unwrap();
        assert_eq!(again.completed_at, first.completed_at);
        assert!(service
            .complete_onboarding_step(Uuid::new_v4(), OnboardingStep::GoLive, None)
            .is_err());
    }

    #[test]
    fn test_queries_on_unknown_tenant() {
        let service = TenantService::new(AuditLogger::new());
        assert!(matches!(
            service.deactivation_history(Uuid::new_v4()).unwrap_err(),
            LiyaqaError::NotFound(_)
        ));
        assert!(service.exports(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_audited() {
        let audit = AuditLogger::new();
        let service = TenantService::new(audit.clone());
        let tenant = active_tenant(&service, "test-gym");
        let entries = audit.query(tenant.id, None, None, None, 10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "tenant.status.change");
    }
}
