//! Team REST API: staff invites and members of the caller's tenant.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use liyaqa_platform::invites::InviteStatus;
use liyaqa_platform::{TeamInvite, TeamMember, TeamRole, TenantContext};

use crate::rest::{ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/team/invites", get(list_invites).post(create_invite))
        .route("/api/team/invites/:id/revoke", post(revoke_invite))
        .route("/api/team/invites/:id/resend", post(resend_invite))
        .route("/api/team/members", get(list_members))
}

/// Invitees hold a token, not an API key.
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/api/team/invites/accept", post(accept_invite))
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub role: TeamRole,
}

#[derive(Debug, Default, Deserialize)]
pub struct InviteQuery {
    pub status: Option<InviteStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub token: String,
    pub name: String,
}

/// GET /api/team/invites
pub async fn list_invites(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<InviteQuery>,
) -> Json<Vec<TeamInvite>> {
    Json(state.team.list(ctx.tenant_id, query.status))
}

/// POST /api/team/invites
pub async fn create_invite(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<(StatusCode, Json<TeamInvite>)> {
    let invite = state
        .team
        .invite(ctx.tenant_id, &req.email, req.role, ctx.key_id)?;
    Ok((StatusCode::CREATED, Json(invite)))
}

/// POST /api/team/invites/:id/revoke
pub async fn revoke_invite(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TeamInvite>> {
    Ok(Json(state.team.revoke(ctx.tenant_id, id, ctx.key_id)?))
}

/// POST /api/team/invites/:id/resend
pub async fn resend_invite(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TeamInvite>> {
    Ok(Json(state.team.resend(ctx.tenant_id, id)?))
}

/// POST /api/team/invites/accept
pub async fn accept_invite(
    State(state): State<AppState>,
    Json(req): Json<AcceptRequest>,
) -> ApiResult<(StatusCode, Json<TeamMember>)> {
    let member = state.team.accept(&req.token, &req.name)?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// GET /api/team/members
pub async fn list_members(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> Json<Vec<TeamMember>> {
    Json(state.team.list_members(ctx.tenant_id))
}
