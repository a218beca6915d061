//! Time-boxed support sessions in which a platform user acts inside a
//! tenant. Every start, end, and expiry is written to the audit log.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use liyaqa_core::config::PlatformConfig;
use liyaqa_core::error::ensure;
use liyaqa_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use liyaqa_core::{LiyaqaError, LiyaqaResult};

use crate::audit::AuditLogger;
use crate::tenancy::TenantService;

const MIN_REASON_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpersonationSession {
    pub id: Uuid,
    pub platform_user_id: Uuid,
    pub tenant_id: Uuid,
    pub target_user_id: Option<Uuid>,
    pub reason: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ImpersonationSession {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && now < self.expires_at
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartImpersonation {
    pub platform_user_id: Uuid,
    pub tenant_id: Uuid,
    #[serde(default)]
    pub target_user_id: Option<Uuid>,
    pub reason: String,
    /// Defaults to the configured maximum.
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

#[derive(Clone)]
pub struct ImpersonationService {
    tenants: TenantService,
    audit: AuditLogger,
    max_minutes: i64,
    sessions: Arc<DashMap<Uuid, ImpersonationSession>>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ImpersonationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImpersonationService")
            .field("sessions", &self.sessions.len())
            .field("max_minutes", &self.max_minutes)
            .finish()
    }
}

impl ImpersonationService {
    pub fn new(tenants: TenantService, audit: AuditLogger, config: &PlatformConfig) -> Self {
        Self {
            tenants,
            audit,
            max_minutes: config.impersonation_max_minutes,
            sessions: Arc::new(DashMap::new()),
            event_sink: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn start(&self, cmd: StartImpersonation) -> LiyaqaResult<ImpersonationSession> {
        self.start_at(cmd, Utc::now())
    }

    pub fn start_at(&self, cmd: StartImpersonation, now: DateTime<Utc>) -> LiyaqaResult<ImpersonationSession> {
        let reason = cmd.reason.trim();
        ensure(
            reason.chars().count() >= MIN_REASON_LEN,
            format!("Reason must be at least {MIN_REASON_LEN} characters"),
        )?;
        let minutes = cmd.duration_minutes.unwrap_or(self.max_minutes);
        ensure(
            (1..=self.max_minutes).contains(&minutes),
            format!("Duration must be between 1 and {} minutes", self.max_minutes),
        )?;
        if !self.tenants.exists(cmd.tenant_id) {
            return Err(LiyaqaError::not_found("Tenant", cmd.tenant_id));
        }
        if self.active_for_at(cmd.platform_user_id, now).is_some() {
            return Err(LiyaqaError::Conflict(
                "An impersonation session is already active; end it first".into(),
            ));
        }

        let session = ImpersonationSession {
            id: Uuid::new_v4(),
            platform_user_id: cmd.platform_user_id,
            tenant_id: cmd.tenant_id,
            target_user_id: cmd.target_user_id,
            reason: reason.to_string(),
            status: SessionStatus::Active,
            started_at: now,
            expires_at: now + Duration::minutes(minutes),
            ended_at: None,
        };
        self.sessions.insert(session.id, session.clone());

        warn!(
            session_id = %session.id,
            platform_user_id = %session.platform_user_id,
            tenant_id = %session.tenant_id,
            "Impersonation started"
        );
        metrics::counter!("platform.impersonation.started").increment(1);
        self.audit.log_action(
            session.tenant_id,
            session.platform_user_id,
            "impersonation.start",
            "impersonation_session",
            session.id,
            serde_json::json!({
                "reason": session.reason,
                "target_user_id": session.target_user_id,
                "expires_at": session.expires_at,
            }),
        );
        self.emit(EventType::ImpersonationStarted, &session);
        Ok(session)
    }

    /// Ends a session early. Only the platform user who started it may.
    pub fn end(&self, session_id: Uuid, platform_user_id: Uuid) -> LiyaqaResult<ImpersonationSession> {
        let now = Utc::now();
        let mut session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| LiyaqaError::not_found("Impersonation session", session_id))?;
        if session.platform_user_id != platform_user_id {
            return Err(LiyaqaError::Forbidden("Session belongs to another user".into()));
        }
        if session.status != SessionStatus::Active {
            return Err(LiyaqaError::InvalidState(format!(
                "Session is already {:?}",
                session.status
            )));
        }
        session.status = SessionStatus::Ended;
        session.ended_at = Some(now);
        let ended = session.clone();
        drop(session);

        info!(session_id = %session_id, "Impersonation ended");
        self.audit.log_action(ended.tenant_id, platform_user_id, "impersonation.end", "impersonation_session", session_id, serde_json::json!({}));
        self.emit(EventType::ImpersonationEnded, &ended);
        Ok(ended)
    }

    pub fn active_for(&self, platform_user_id: Uuid) -> Option<ImpersonationSession> {
        self.active_for_at(platform_user_id, Utc::now())
    }

    pub fn active_for_at(&self, platform_user_id: Uuid, now: DateTime<Utc>) -> Option<ImpersonationSession> {
        self.sessions
            .iter()
            .find(|s| s.platform_user_id == platform_user_id && s.is_live(now))
            .map(|s| s.value().clone())
    }

    /// Returns the session while it is live. A session past its expiry is
    /// marked expired and rejected.
    pub fn validate(&self, session_id: Uuid, now: DateTime<Utc>) -> LiyaqaResult<ImpersonationSession> {
        let mut session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| LiyaqaError::not_found("Impersonation session", session_id))?;
        if session.is_live(now) {
            return Ok(session.clone());
        }
        if session.status == SessionStatus::Active {
            session.status = SessionStatus::Expired;
            session.ended_at = Some(session.expires_at);
            let expired = session.clone();
            drop(session);
            self.record_expiry(&expired);
        }
        Err(LiyaqaError::Unauthorized("Impersonation session is no longer active".into()))
    }

    /// Expires every active session past its expiry.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> usize {
        let mut expired = Vec::new();
        for mut session in self.sessions.iter_mut() {
            if session.status == SessionStatus::Active && now >= session.expires_at {
                session.status = SessionStatus::Expired;
                session.ended_at = Some(session.expires_at);
                expired.push(session.clone());
            }
        }
        for session in &expired {
            self.record_expiry(session);
        }
        expired.len()
    }

    pub fn count_active(&self, now: DateTime<Utc>) -> usize {
        self.sessions.iter().filter(|s| s.is_live(now)).count()
    }

    /// A tenant's sessions, newest first.
    pub fn list_for_tenant(&self, tenant_id: Uuid) -> Vec<ImpersonationSession> {
        let mut found: Vec<ImpersonationSession> = self
            .sessions
            .iter()
            .filter(|s| s.tenant_id == tenant_id)
            .map(|s| s.value().clone())
            .collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        found
    }

    fn record_expiry(&self, session: &ImpersonationSession) {
        info!(session_id = %session.id, "Impersonation expired");
        self.audit.log_action(
            session.tenant_id,
            session.platform_user_id,
            "impersonation.expire",
            "impersonation_session",
            session.id,
            serde_json::json!({}),
        );
        self.emit(EventType::ImpersonationEnded, session);
    }

    fn emit(&self, event_type: EventType, session: &ImpersonationSession) {
        self.event_sink.emit(make_event(
            event_type,
            Some(session.tenant_id),
            session.id,
            serde_json::json!({
                "platform_user_id": session.platform_user_id,
                "status": session.status,
            }),
        ));
    }
}
