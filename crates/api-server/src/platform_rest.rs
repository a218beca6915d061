//! Platform administration REST API, guarded by the platform admin token.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use liyaqa_core::{LiyaqaError, LiyaqaResult, Page};
use liyaqa_platform::analytics::PlatformSummary;
use liyaqa_platform::api_keys::{ApiKeySummary, GeneratedApiKey};
use liyaqa_platform::audit::{AuditEvent, ChainVerification};
use liyaqa_platform::impersonation::StartImpersonation;
use liyaqa_platform::tenancy::{
    DataExportFormat, DataExportJob, DeactivationLog, DeactivationReason, OnboardingItem, OnboardingStep,
    ProvisionTenant,
};
use liyaqa_platform::{ImpersonationSession, PricingTier, Tenant, TenantStatus};

use crate::auth::PlatformActor;
use crate::rest::{ApiResult, AppState, PageParams};

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/platform/tenants", get(list_tenants).post(provision_tenant))
        .route("/api/platform/tenants/:id", get(get_tenant))
        .route("/api/platform/tenants/:id/status", post(change_status))
        .route("/api/platform/tenants/:id/suspend", post(suspend_tenant))
        .route("/api/platform/tenants/:id/deactivate", post(deactivate_tenant))
        .route("/api/platform/tenants/:id/archive", post(archive_tenant))
        .route("/api/platform/tenants/:id/deactivations", get(deactivation_history))
        .route("/api/platform/tenants/:id/exports", get(list_exports).post(request_export))
        .route("/api/platform/exports/:id/complete", post(complete_export))
        .route("/api/platform/tenants/:id/onboarding", post(complete_onboarding_step))
        .route("/api/platform/tenants/:id/subscription/activate", post(activate_subscription))
        .route("/api/platform/tenants/:id/subscription/cancel", post(cancel_subscription))
        .route("/api/platform/tenants/:id/tier", put(change_tier))
        .route("/api/platform/tenants/:id/api-keys", get(list_api_keys).post(generate_api_key))
        .route("/api/platform/api-keys/:id/revoke", post(revoke_api_key))
        .route("/api/platform/tenants/:id/impersonation", get(tenant_impersonations))
        .route("/api/platform/impersonation", post(start_impersonation))
        .route("/api/platform/impersonation/active", get(active_impersonation))
        .route("/api/platform/impersonation/:id/validate", get(validate_impersonation))
        .route("/api/platform/impersonation/:id/end", post(end_impersonation))
        .route("/api/platform/analytics", get(summary))
        .route("/api/platform/analytics/export", get(export_tenants))
        .route("/api/platform/audit-log", get(audit_log))
        .route("/api/platform/audit-log/verify", get(verify_audit_log))
}

fn require_user(actor: PlatformActor) -> LiyaqaResult<Uuid> {
    if actor.0.is_nil() {
        Err(LiyaqaError::Validation("X-Platform-User header is required".into()))
    } else {
        Ok(actor.0)
    }
}

// ─── Tenants ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TenantQuery {
    pub status: Option<TenantStatus>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

/// GET /api/platform/tenants
pub async fn list_tenants(State(state): State<AppState>, Query(query): Query<TenantQuery>) -> Json<Page<Tenant>> {
    let page = PageParams {
        page: query.page,
        size: query.size,
    };
    Json(state.tenants.list(query.status, page.into()))
}

/// POST /api/platform/tenants
pub async fn provision_tenant(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
    Json(cmd): Json<ProvisionTenant>,
) -> ApiResult<(StatusCode, Json<Tenant>)> {
    let tenant = state.tenants.provision(cmd, actor.0)?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

/// GET /api/platform/tenants/:id
pub async fn get_tenant(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.tenants.get(id)?))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: TenantStatus,
}

/// POST /api/platform/tenants/:id/status
pub async fn change_status(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusChange>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.tenants.change_status(id, req.status, actor.0)?))
}

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    pub reason: String,
}

/// POST /api/platform/tenants/:id/suspend
pub async fn suspend_tenant(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
    Path(id): Path<Uuid>,
    Json(req): Json<SuspendRequest>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.tenants.suspend(id, &req.reason, actor.0)?))
}

#[derive(Debug, Deserialize)]
pub struct DeactivateRequest {
    pub reason: DeactivationReason,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /api/platform/tenants/:id/deactivate
pub async fn deactivate_tenant(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
    Path(id): Path<Uuid>,
    Json(req): Json<DeactivateRequest>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.tenants.deactivate(id, req.reason, req.notes, actor.0)?))
}

/// POST /api/platform/tenants/:id/archive
pub async fn archive_tenant(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.tenants.archive(id, actor.0)?))
}

/// GET /api/platform/tenants/:id/deactivations
pub async fn deactivation_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<DeactivationLog>>> {
    Ok(Json(state.tenants.deactivation_history(id)?))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub format: DataExportFormat,
}

/// POST /api/platform/tenants/:id/exports
pub async fn request_export(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
    Path(id): Path<Uuid>,
    Json(req): Json<ExportRequest>,
) -> ApiResult<(StatusCode, Json<DataExportJob>)> {
    let job = state.tenants.request_export(id, req.format, actor.0)?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /api/platform/tenants/:id/exports
pub async fn list_exports(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<DataExportJob>>> {
    Ok(Json(state.tenants.exports(id)?))
}

#[derive(Debug, Deserialize)]
pub struct CompleteExport {
    pub file_url: String,
    pub file_size_bytes: u64,
}

/// POST /api/platform/exports/:id/complete
pub async fn complete_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteExport>,
) -> ApiResult<Json<DataExportJob>> {
    Ok(Json(state.tenants.complete_export(id, &req.file_url, req.file_size_bytes)?))
}

#[derive(Debug, Deserialize)]
pub struct OnboardingRequest {
    pub step: OnboardingStep,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /api/platform/tenants/:id/onboarding
pub async fn complete_onboarding_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<OnboardingRequest>,
) -> ApiResult<Json<OnboardingItem>> {
    Ok(Json(state.tenants.complete_onboarding_step(id, req.step, req.notes)?))
}

/// POST /api/platform/tenants/:id/subscription/activate
pub async fn activate_subscription(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.tenants.activate_subscription(id)?))
}

/// POST /api/platform/tenants/:id/subscription/cancel
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.tenants.cancel_subscription(id, actor.0)?))
}

#[derive(Debug, Deserialize)]
pub struct TierChange {
    pub tier: PricingTier,
}

/// PUT /api/platform/tenants/:id/tier
pub async fn change_tier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TierChange>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.tenants.change_tier(id, req.tier)?))
}

// ─── API keys ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GenerateKeyRequest {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// GET /api/platform/tenants/:id/api-keys
pub async fn list_api_keys(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ApiKeySummary>>> {
    state.tenants.get(id)?;
    Ok(Json(state.api_keys.list(id)))
}

/// POST /api/platform/tenants/:id/api-keys
///
/// The plaintext key is only ever returned here.
pub async fn generate_api_key(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
    Path(id): Path<Uuid>,
    Json(req): Json<GenerateKeyRequest>,
) -> ApiResult<(StatusCode, Json<GeneratedApiKey>)> {
    let key = state
        .api_keys
        .generate(id, &req.name, req.scopes, req.expires_at, actor.0)?;
    Ok((StatusCode::CREATED, Json(key)))
}

/// POST /api/platform/api-keys/:id/revoke
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiKeySummary>> {
    Ok(Json(state.api_keys.revoke(id, actor.0)?))
}

// ─── Impersonation ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ImpersonationRequest {
    pub tenant_id: Uuid,
    #[serde(default)]
    pub target_user_id: Option<Uuid>,
    pub reason: String,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

/// POST /api/platform/impersonation
pub async fn start_impersonation(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
    Json(req): Json<ImpersonationRequest>,
) -> ApiResult<(StatusCode, Json<ImpersonationSession>)> {
    let session = state.impersonation.start(StartImpersonation {
        platform_user_id: require_user(actor)?,
        tenant_id: req.tenant_id,
        target_user_id: req.target_user_id,
        reason: req.reason,
        duration_minutes: req.duration_minutes,
    })?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/platform/impersonation/active
pub async fn active_impersonation(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
) -> ApiResult<Json<Option<ImpersonationSession>>> {
    let user = require_user(actor)?;
    Ok(Json(state.impersonation.active_for(user)))
}

/// GET /api/platform/impersonation/:id/validate
pub async fn validate_impersonation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ImpersonationSession>> {
    Ok(Json(state.impersonation.validate(id, Utc::now())?))
}

/// POST /api/platform/impersonation/:id/end
pub async fn end_impersonation(
    State(state): State<AppState>,
    Extension(actor): Extension<PlatformActor>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ImpersonationSession>> {
    let user = require_user(actor)?;
    Ok(Json(state.impersonation.end(id, user)?))
}

/// GET /api/platform/tenants/:id/impersonation
pub async fn tenant_impersonations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ImpersonationSession>>> {
    state.tenants.get(id)?;
    Ok(Json(state.impersonation.list_for_tenant(id)))
}

// ─── Analytics and audit ────────────────────────────────────────────────

/// GET /api/platform/analytics
pub async fn summary(State(state): State<AppState>) -> Json<PlatformSummary> {
    Json(state.platform_analytics.summary(Utc::now()))
}

/// GET /api/platform/analytics/export
pub async fn export_tenants(State(state): State<AppState>) -> impl IntoResponse {
    metrics::counter!("platform.exports.csv").increment(1);
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"tenants.csv\""),
        ],
        state.platform_analytics.export_tenants_csv(),
    )
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub tenant_id: Uuid,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub action: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/platform/audit-log?tenant_id=
pub async fn audit_log(State(state): State<AppState>, Query(query): Query<AuditQuery>) -> Json<Vec<AuditEvent>> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_AUDIT_LIMIT);
    Json(
        state
            .audit
            .query(query.tenant_id, query.from, query.to, query.action.as_deref(), limit),
    )
}

/// GET /api/platform/audit-log/verify
pub async fn verify_audit_log(State(state): State<AppState>) -> Json<ChainVerification> {
    Json(state.audit.verify_chain())
}
