//! Member directory REST API: the members, subscriptions, and check-ins
//! that marketing triggers and segments read.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use liyaqa_core::error::ensure;
use liyaqa_core::{
    Gender, LiyaqaError, LiyaqaResult, Member, MemberDirectory, MemberStatus, Page, SubscriptionRecord,
    SubscriptionStatus,
};
use liyaqa_platform::TenantContext;

use crate::rest::{ApiResult, AppState, PageParams};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/members", get(list_members).post(create_member))
        .route("/api/members/:id", get(get_member).delete(delete_member))
        .route("/api/members/:id/subscriptions", get(list_subscriptions).post(add_subscription))
        .route("/api/members/:id/check-ins", get(list_check_ins).post(record_check_in))
}

fn owned_member(state: &AppState, ctx: &TenantContext, id: Uuid) -> LiyaqaResult<Member> {
    state
        .directory
        .get_member(id)
        .filter(|m| m.tenant_id == ctx.tenant_id)
        .ok_or_else(|| LiyaqaError::not_found("Member", id))
}

#[derive(Debug, Deserialize)]
pub struct CreateMember {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<MemberStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// GET /api/members
pub async fn list_members(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(page): Query<PageParams>,
) -> Json<Page<Member>> {
    let members = state.directory.members_for_tenant(ctx.tenant_id);
    Json(Page::from_vec(members, page.into()))
}

/// POST /api/members
pub async fn create_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<CreateMember>,
) -> ApiResult<(StatusCode, Json<Member>)> {
    ensure(!req.first_name.trim().is_empty(), "First name is required")?;
    ensure(!req.last_name.trim().is_empty(), "Last name is required")?;
    let mut member = Member::new(ctx.tenant_id, req.first_name.trim(), req.last_name.trim());
    member.email = req.email;
    member.phone = req.phone;
    member.gender = req.gender;
    member.date_of_birth = req.date_of_birth;
    if let Some(status) = req.status {
        member.status = status;
    }
    member.tags = req.tags;
    Ok((StatusCode::CREATED, Json(state.directory.upsert_member(member))))
}

/// GET /api/members/:id
pub async fn get_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Member>> {
    Ok(Json(owned_member(&state, &ctx, id)?))
}

/// DELETE /api/members/:id
pub async fn delete_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_member(&state, &ctx, id)?;
    state.directory.remove_member(id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AddSubscription {
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub end_date: NaiveDate,
}

/// GET /api/members/:id/subscriptions
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<SubscriptionRecord>>> {
    owned_member(&state, &ctx, id)?;
    Ok(Json(state.directory.subscriptions_for_member(id)))
}

/// POST /api/members/:id/subscriptions
pub async fn add_subscription(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddSubscription>,
) -> ApiResult<(StatusCode, Json<SubscriptionRecord>)> {
    owned_member(&state, &ctx, id)?;
    let record = state.directory.add_subscription(SubscriptionRecord {
        id: Uuid::new_v4(),
        member_id: id,
        plan_id: req.plan_id,
        status: req.status,
        end_date: req.end_date,
    });
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckInRequest {
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// GET /api/members/:id/check-ins
pub async fn list_check_ins(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<DateTime<Utc>>>> {
    owned_member(&state, &ctx, id)?;
    Ok(Json(state.directory.check_ins(id)))
}

/// POST /api/members/:id/check-ins
pub async fn record_check_in(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<CheckInRequest>,
) -> ApiResult<StatusCode> {
    owned_member(&state, &ctx, id)?;
    state.directory.record_check_in(id, req.at.unwrap_or_else(Utc::now));
    Ok(StatusCode::CREATED)
}
