//! Team invites and the staff roster they feed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use liyaqa_core::config::PlatformConfig;
use liyaqa_core::error::ensure;
use liyaqa_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use liyaqa_core::{LiyaqaError, LiyaqaResult};

use crate::audit::AuditLogger;
use crate::tenancy::TenantService;

const TOKEN_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Admin,
    Manager,
    Staff,
    Trainer,
    Receptionist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Revoked,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamInvite {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub role: TeamRole,
    #[serde(skip_serializing)]
    pub token: String,
    pub status: InviteStatus,
    pub invited_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: TeamRole,
    pub joined_at: DateTime<Utc>,
}

/// Loose shape check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
        }
        None => false,
    }
}

fn new_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct TeamService {
    tenants: TenantService,
    audit: AuditLogger,
    invites: Arc<DashMap<Uuid, TeamInvite>>,
    members: Arc<DashMap<Uuid, TeamMember>>,
    ttl: Duration,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for TeamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeamService")
            .field("invites", &self.invites.len())
            .field("members", &self.members.len())
            .finish()
    }
}

impl TeamService {
    pub fn new(tenants: TenantService, audit: AuditLogger, config: &PlatformConfig) -> Self {
        Self {
            tenants,
            audit,
            invites: Arc::new(DashMap::new()),
            members: Arc::new(DashMap::new()),
            ttl: Duration::days(config.invite_ttl_days),
            event_sink: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Invites an email to a tenant's team. Returns the invite including
    /// its token for delivery.
    pub fn invite(&self, tenant_id: Uuid, email: &str, role: TeamRole, invited_by: Uuid) -> LiyaqaResult<TeamInvite> {
        if !self.tenants.exists(tenant_id) {
            return Err(LiyaqaError::not_found("Tenant", tenant_id));
        }
        let email = email.trim().to_lowercase();
        ensure(is_valid_email(&email), format!("Invalid email: {email}"))?;
        if self.members.iter().any(|m| m.tenant_id == tenant_id && m.email == email) {
            return Err(LiyaqaError::Conflict(format!("{email} is already a team member")));
        }
        if self.invites.iter().any(|i| {
            i.tenant_id == tenant_id && i.email == email && i.status == InviteStatus::Pending
        }) {
            return Err(LiyaqaError::Conflict(format!("{email} already has a pending invite")));
        }

        let now = Utc::now();
        let invite = TeamInvite {
            id: Uuid::new_v4(),
            tenant_id,
            email,
            role,
            token: new_token(),
            status: InviteStatus::Pending,
            invited_by,
            created_at: now,
            expires_at: now + self.ttl,
            accepted_at: None,
        };
        self.invites.insert(invite.id, invite.clone());
        info!(invite_id = %invite.id, tenant_id = %tenant_id, role = ?role, "Team invite sent");
        self.audit.log_action(tenant_id, invited_by, "team.invite", "team_invite", invite.id, serde_json::json!({ "email": invite.email, "role": role }));
        Ok(invite)
    }

    pub fn accept(&self, token: &str, name: &str) -> LiyaqaResult<TeamMember> {
        self.accept_at(token, name, Utc::now())
    }

    pub fn accept_at(&self, token: &str, name: &str, now: DateTime<Utc>) -> LiyaqaResult<TeamMember> {
        ensure(!name.trim().is_empty(), "Name is required")?;
        let mut invite = self
            .invites
            .iter_mut()
            .find(|i| i.token == token)
            .ok_or_else(|| LiyaqaError::NotFound("Invite not found".into()))?;
        if invite.status == InviteStatus::Pending && now > invite.expires_at {
            invite.status = InviteStatus::Expired;
        }
        if invite.status != InviteStatus::Pending {
            return Err(LiyaqaError::InvalidState(format!(
                "Invite is {:?}",
                invite.status
            )));
        }
        invite.status = InviteStatus::Accepted;
        invite.accepted_at = Some(now);
        let member = TeamMember {
            id: Uuid::new_v4(),
            tenant_id: invite.tenant_id,
            email: invite.email.clone(),
            name: name.trim().to_string(),
            role: invite.role,
            joined_at: now,
        };
        drop(invite);

        self.members.insert(member.id, member.clone());
        info!(member_id = %member.id, tenant_id = %member.tenant_id, "Team invite accepted");
        self.audit.log_action(member.tenant_id, member.id, "team.invite.accept", "team_member", member.id, serde_json::json!({ "email": member.email }));
        self.event_sink.emit(make_event(
            EventType::InviteAccepted,
            Some(member.tenant_id),
            member.id,
            serde_json::json!({ "email": member.email, "role": member.role }),
        ));
        Ok(member)
    }

    pub fn revoke(&self, tenant_id: Uuid, invite_id: Uuid, actor_id: Uuid) -> LiyaqaResult<TeamInvite> {
        let mut invite = self.tenant_invite(tenant_id, invite_id)?;
        if invite.status != InviteStatus::Pending {
            return Err(LiyaqaError::InvalidState(format!(
                "Only pending invites can be revoked; invite is {:?}",
                invite.status
            )));
        }
        invite.status = InviteStatus::Revoked;
        let invite = invite.clone();
        self.audit.log_action(tenant_id, actor_id, "team.invite.revoke", "team_invite", invite_id, serde_json::json!({}));
        Ok(invite)
    }

    /// Issues a fresh token and expiry for a pending or expired invite.
    pub fn resend(&self, tenant_id: Uuid, invite_id: Uuid) -> LiyaqaResult<TeamInvite> {
        let mut invite = self.tenant_invite(tenant_id, invite_id)?;
        if !matches!(invite.status, InviteStatus::Pending | InviteStatus::Expired) {
            return Err(LiyaqaError::InvalidState(format!(
                "Invite is {:?}",
                invite.status
            )));
        }
        let now = Utc::now();
        invite.token = new_token();
        invite.status = InviteStatus::Pending;
        invite.expires_at = now + self.ttl;
        Ok(invite.clone())
    }

    /// A tenant's invites, newest first.
    pub fn list(&self, tenant_id: Uuid, status: Option<InviteStatus>) -> Vec<TeamInvite> {
        let mut found: Vec<TeamInvite> = self
            .invites
            .iter()
            .filter(|i| i.tenant_id == tenant_id && status.map_or(true, |s| i.status == s))
            .map(|i| i.value().clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    pub fn list_members(&self, tenant_id: Uuid) -> Vec<TeamMember> {
        let mut found: Vec<TeamMember> = self
            .members
            .iter()
            .filter(|m| m.tenant_id == tenant_id)
            .map(|m| m.value().clone())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Marks pending invites past their expiry as expired.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for mut invite in self.invites.iter_mut() {
            if invite.status == InviteStatus::Pending && now > invite.expires_at {
                invite.status = InviteStatus::Expired;
                expired += 1;
            }
        }
        if expired > 0 {
            debug!(expired, "Stale team invites expired");
        }
        expired
    }

    fn tenant_invite(
        &self,
        tenant_id: Uuid,
        invite_id: Uuid,
    ) -> LiyaqaResult<dashmap::mapref::one::RefMut<'_, Uuid, TeamInvite>> {
        match self.invites.get_mut(&invite_id) {
            Some(invite) if invite.tenant_id == tenant_id => Ok(invite),
            _ => Err(LiyaqaError::not_found("Invite", invite_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::tests::provision;
    use liyaqa_core::event_bus::capture_sink;

    fn service() -> (TeamService, Uuid) {
        let audit = AuditLogger::new();
        let tenants = TenantService::new(audit.clone());
        let tenant = provision(&tenants, "team-gym");
        (TeamService::new(tenants, audit, &PlatformConfig::default()), tenant.id)
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("coach@gym.sa"));
        assert!(!is_valid_email("coach@gym"));
        assert!(!is_valid_email("@gym.sa"));
        assert!(!is_valid_email("coach gym@gym.sa"));
        assert!(!is_valid_email("a@b@gym.sa"));
    }

    #[test]
    fn test_invite_and_accept() {
        let (team, tenant) = service();
        let sink = capture_sink();
        let team = team.with_event_sink(sink.clone());
        let invite = team.invite(tenant, "Coach@Gym.sa", TeamRole::Trainer, Uuid::new_v4()).unwrap();
        assert_eq!(invite.email, "coach@gym.sa");
        assert_eq!(invite.token.len(), TOKEN_LEN);

        let member = team.accept(&invite.token, "Sara").unwrap();
        assert_eq!(member.role, TeamRole::Trainer);
        assert_eq!(team.list_members(tenant).len(), 1);
        assert_eq!(sink.count_type(EventType::InviteAccepted), 1);

        assert!(team.accept(&invite.token, "Sara").is_err());
        assert!(matches!(
            team.invite(tenant, "coach@gym.sa", TeamRole::Staff, Uuid::new_v4()).unwrap_err(),
            LiyaqaError::Conflict(_)
        ));
    }

    #[test]
    fn test_duplicate_pending_invite_rejected() {
        let (team, tenant) = service();
        team.invite(tenant, "desk@gym.sa", TeamRole::Receptionist, Uuid::new_v4()).unwrap();
        assert!(team.invite(tenant, "desk@gym.sa", TeamRole::Staff, Uuid::new_v4()).is_err());
        assert!(team.invite(Uuid::new_v4(), "x@gym.sa", TeamRole::Staff, Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_expired_invite_cannot_be_accepted() {
        let (team, tenant) = service();
        let invite = team.invite(tenant, "late@gym.sa", TeamRole::Staff, Uuid::new_v4()).unwrap();
        let later = invite.expires_at + Duration::minutes(1);
        assert!(matches!(
            team.accept_at(&invite.token, "Late", later).unwrap_err(),
            LiyaqaError::InvalidState(_)
        ));

        let resent = team.resend(tenant, invite.id).unwrap();
        assert_ne!(resent.token, invite.token);
        assert_eq!(resent.status, InviteStatus::Pending);
        assert!(team.accept(&resent.token, "Late").is_ok());
    }

    #[test]
    fn test_revoke_and_expire_stale() {
        let (team, tenant) = service();
        let actor = Uuid::new_v4();
        let a = team.invite(tenant, "a@gym.sa", TeamRole::Staff, actor).unwrap();
        let b = team.invite(tenant, "b@gym.sa", TeamRole::Staff, actor).unwrap();
        team.revoke(tenant, a.id, actor).unwrap();
        assert!(team.revoke(tenant, a.id, actor).is_err());
        assert!(team.revoke(Uuid::new_v4(), b.id, actor).is_err());

        assert_eq!(team.expire_stale(Utc::now()), 0);
        assert_eq!(team.expire_stale(b.expires_at + Duration::seconds(1)), 1);
        assert_eq!(team.list(tenant, Some(InviteStatus::Expired)).len(), 1);
        assert_eq!(team.list(tenant, None).len(), 2);
    }
}
