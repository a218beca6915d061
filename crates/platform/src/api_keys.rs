//! Tenant API keys. Only the SHA-256 of a key is stored; the plaintext is
//! returned once, at generation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use liyaqa_core::config::PlatformConfig;
use liyaqa_core::error::ensure;
use liyaqa_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use liyaqa_core::{LiyaqaError, LiyaqaResult};

use crate::audit::AuditLogger;
use crate::tenancy::TenantService;

const SECRET_LEN: usize = 32;
const SECRET_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
/// Leading characters of the plaintext kept for display.
const DISPLAY_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyStatus {
    Active,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantApiKey {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub key_prefix: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub last_four: String,
    pub scopes: Vec<String>,
    pub status: ApiKeyStatus,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TenantApiKey {
    pub fn masked(&self) -> String {
        format!("****{}", self.last_four)
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == ApiKeyStatus::Active && self.expires_at.map_or(true, |exp| now < exp)
    }
}

/// A freshly generated key with its one-time plaintext.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedApiKey {
    #[serde(flatten)]
    pub key: TenantApiKey,
    pub plaintext: String,
}

/// Listing view that never exposes more than the last four characters.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeySummary {
    pub id: Uuid,
    pub name: String,
    pub masked_key: String,
    pub scopes: Vec<String>,
    pub status: ApiKeyStatus,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&TenantApiKey> for ApiKeySummary {
    fn from(key: &TenantApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name.clone(),
            masked_key: key.masked(),
            scopes: key.scopes.clone(),
            status: key.status,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            expires_at: key.expires_at,
        }
    }
}

/// Tenant identity resolved from an API key, attached to tenant requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub key_id: Uuid,
    pub scopes: Vec<String>,
}

pub fn hash_key(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

#[derive(Clone)]
pub struct ApiKeyService {
    tenants: TenantService,
    audit: AuditLogger,
    prefix: String,
    keys: Arc<DashMap<Uuid, TenantApiKey>>,
    /// key_hash -> key id
    by_hash: Arc<DashMap<String, Uuid>>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ApiKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyService")
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl ApiKeyService {
    pub fn new(tenants: TenantService, audit: AuditLogger, config: &PlatformConfig) -> Self {
        Self {
            tenants,
            audit,
            prefix: config.api_key_prefix.clone(),
            keys: Arc::new(DashMap::new()),
            by_hash: Arc::new(DashMap::new()),
            event_sink: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn generate(
        &self,
        tenant_id: Uuid,
        name: &str,
        scopes: Vec<String>,
        expires_at: Option<DateTime<Utc>>,
        actor_id: Uuid,
    ) -> LiyaqaResult<GeneratedApiKey> {
        if !self.tenants.exists(tenant_id) {
            return Err(LiyaqaError::not_found("Tenant", tenant_id));
        }
        ensure(!name.trim().is_empty(), "Key name is required")?;
        let now = Utc::now();
        if let Some(exp) = expires_at {
            ensure(exp > now, "Expiry must be in the future")?;
        }

        let mut rng = rand::thread_rng();
        let secret: String = (0..SECRET_LEN)
            .map(|_| SECRET_CHARSET[rng.gen_range(0..SECRET_CHARSET.len())] as char)
            .collect();
        let plaintext = format!("{}{}", self.prefix, secret);
        let key = TenantApiKey {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.trim().to_string(),
            key_prefix: plaintext.chars().take(DISPLAY_PREFIX_LEN).collect(),
            key_hash: hash_key(&plaintext),
            last_four: secret[SECRET_LEN - 4..].to_string(),
            scopes,
            status: ApiKeyStatus::Active,
            created_at: now,
            last_used_at: None,
            expires_at,
        };
        self.by_hash.insert(key.key_hash.clone(), key.id);
        self.keys.insert(key.id, key.clone());

        info!(key_id = %key.id, tenant_id = %tenant_id, "API key generated");
        metrics::counter!("platform.api_keys.created").increment(1);
        self.audit.log_action(tenant_id, actor_id, "api_key.create", "api_key", key.id, serde_json::json!({ "name": key.name }));
        self.event_sink.emit(make_event(
            EventType::ApiKeyCreated,
            Some(tenant_id),
            key.id,
            serde_json::json!({ "name": key.name }),
        ));
        Ok(GeneratedApiKey { key, plaintext })
    }

    /// A tenant's keys, newest first, masked.
    pub fn list(&self, tenant_id: Uuid) -> Vec<ApiKeySummary> {
        let mut keys: Vec<TenantApiKey> = self
            .keys
            .iter()
            .filter(|k| k.tenant_id == tenant_id)
            .map(|k| k.value().clone())
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        keys.iter().map(ApiKeySummary::from).collect()
    }

    pub fn revoke(&self, key_id: Uuid, actor_id: Uuid) -> LiyaqaResult<ApiKeySummary> {
        let mut key = self
            .keys
            .get_mut(&key_id)
            .ok_or_else(|| LiyaqaError::not_found("API key", key_id))?;
        if key.status == ApiKeyStatus::Revoked {
            return Err(LiyaqaError::InvalidState("API key is already revoked".into()));
        }
        key.status = ApiKeyStatus::Revoked;
        let revoked = key.clone();
        drop(key);

        warn!(key_id = %key_id, tenant_id = %revoked.tenant_id, "API key revoked");
        self.audit.log_action(revoked.tenant_id, actor_id, "api_key.revoke", "api_key", key_id, serde_json::json!({}));
        self.event_sink.emit(make_event(
            EventType::ApiKeyRevoked,
            Some(revoked.tenant_id),
            key_id,
            serde_json::json!({}),
        ));
        Ok(ApiKeySummary::from(&revoked))
    }

    pub fn authenticate(&self, plaintext: &str) -> LiyaqaResult<TenantContext> {
        self.authenticate_at(plaintext, Utc::now())
    }

    /// Resolves a plaintext key. Unknown, revoked, and expired keys are
    /// unauthorized; keys of a tenant that is not active are forbidden.
    pub fn authenticate_at(&self, plaintext: &str, now: DateTime<Utc>) -> LiyaqaResult<TenantContext> {
        let key_id = self
            .by_hash
            .get(&hash_key(plaintext))
            .map(|id| *id)
            .ok_or_else(|| LiyaqaError::Unauthorized("Invalid API key".into()))?;
        let mut key = self
            .keys
            .get_mut(&key_id)
            .ok_or_else(|| LiyaqaError::Unauthorized("Invalid API key".into()))?;
        if !key.is_usable(now) {
            debug!(key_id = %key_id, "Rejected unusable API key");
            return Err(LiyaqaError::Unauthorized("API key is revoked or expired".into()));
        }
        if !self.tenants.is_active(key.tenant_id) {
            return Err(LiyaqaError::Forbidden("Tenant is not active".into()));
        }
        key.last_used_at = Some(now);
        Ok(TenantContext {
            tenant_id: key.tenant_id,
            key_id,
            scopes: key.scopes.clone(),
        })
    }

    pub fn count_active(&self, now: DateTime<Utc>) -> usize {
        self.keys.iter().filter(|k| k.is_usable(now)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::tests::{active_tenant, provision};
    use crate::tenancy::TenantStatus;
    use chrono::Duration;

    fn service() -> (ApiKeyService, TenantService) {
        let audit = AuditLogger::new();
        let tenants = TenantService::new(audit.clone());
        (
            ApiKeyService::new(tenants.clone(), audit, &PlatformConfig::default()),
            tenants,
        )
    }

    #[test]
    fn test_generate_format() {
        let (keys, tenants) = service();
        let tenant = active_tenant(&tenants, "key-gym");
        let generated = keys
            .generate(tenant.id, "POS", vec!["shop".into()], None, Uuid::new_v4())
            .unwrap();
        let plaintext = &generated.plaintext;
        assert!(plaintext.starts_with("lq_"));
        assert_eq!(plaintext.len(), 3 + SECRET_LEN);
        assert!(plaintext[3..]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_eq!(generated.key.key_hash, hash_key(plaintext));
        assert_eq!(generated.key.key_hash.len(), 64);
        assert!(plaintext.ends_with(&generated.key.last_four));

        let listed = keys.list(tenant.id);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].masked_key, format!("****{}", generated.key.last_four));
    }

    #[test]
    fn test_authenticate() {
        let (keys, tenants) = service();
        let tenant = active_tenant(&tenants, "key-gym");
        let generated = keys
            .generate(tenant.id, "POS", vec![], None, Uuid::new_v4())
            .unwrap();
        let context = keys.authenticate(&generated.plaintext).unwrap();
        assert_eq!(context.tenant_id, tenant.id);
        assert!(keys.keys.get(&generated.key.id).unwrap().last_used_at.is_some());

        assert!(matches!(
            keys.authenticate("lq_wrong").unwrap_err(),
            LiyaqaError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_revoked_and_expired_keys_rejected() {
        let (keys, tenants) = service();
        let tenant = active_tenant(&tenants, "key-gym");
        let actor = Uuid::new_v4();
        let revoked = keys.generate(tenant.id, "Old", vec![], None, actor).unwrap();
        keys.revoke(revoked.key.id, actor).unwrap();
        assert!(keys.authenticate(&revoked.plaintext).is_err());
        assert!(keys.revoke(revoked.key.id, actor).is_err());

        let expiring = Utc::now() + Duration::hours(1);
        let temp = keys.generate(tenant.id, "Temp", vec![], Some(expiring), actor).unwrap();
        assert!(keys.authenticate_at(&temp.plaintext, expiring + Duration::seconds(1)).is_err());
        assert_eq!(keys.count_active(Utc::now()), 1);
    }

    #[test]
    fn test_inactive_tenant_forbidden() {
        let (keys, tenants) = service();
        let tenant = provision(&tenants, "key-gym");
        let generated = keys.generate(tenant.id, "POS", vec![], None, Uuid::new_v4()).unwrap();
        assert!(matches!(
            keys.authenticate(&generated.plaintext).unwrap_err(),
            LiyaqaError::Forbidden(_)
        ));
        tenants
            .change_status(tenant.id, TenantStatus::Active, Uuid::new_v4())
            .unwrap();
        assert!(keys.authenticate(&generated.plaintext).is_ok());
        assert!(keys.generate(Uuid::new_v4(), "x", vec![], None, Uuid::new_v4()).is_err());
    }
}
