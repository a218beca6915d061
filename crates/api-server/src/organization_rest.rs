//! Organization REST API: organizations, clubs, locations, and the gender
//! access policies of locations.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use liyaqa_core::{Gender, Page};
use liyaqa_platform::gender::{AccessDecision, GenderSchedule, GenderStatus, PolicyInfo, ScheduleInput};
use liyaqa_platform::organization::{
    CreateClub, CreateLocation, CreateOrganization, StatusAction, UpdateClub, UpdateLocation, UpdateOrganization,
};
use liyaqa_platform::{Club, GenderPolicy, GenderPolicyService, Location, Organization, TenantContext};

use crate::rest::{ApiResult, AppState, CountResponse, PageParams};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/organizations", get(list_organizations).post(create_organization))
        .route("/api/organizations/:id", get(get_organization).put(update_organization))
        .route("/api/organizations/:id/:action", post(organization_status))
        .route("/api/clubs", get(list_clubs).post(create_club))
        .route("/api/clubs/:id", get(get_club).put(update_club))
        .route("/api/clubs/:id/:action", post(club_status))
        .route("/api/locations", get(list_locations).post(create_location))
        .route("/api/locations/:id", get(get_location).put(update_location))
        .route("/api/locations/:id/:action", post(location_status))
        .route("/api/gender-policies", get(supported_policies))
        .route("/api/gender-policies/locations/:id", get(current_status).put(update_policy))
        .route("/api/gender-policies/locations/:id/access", get(check_access))
        .route(
            "/api/gender-policies/locations/:id/schedules",
            get(list_schedules).post(add_schedule).delete(delete_all_schedules),
        )
        .route(
            "/api/gender-policies/schedules/:id",
            put(update_schedule).delete(delete_schedule),
        )
}

// ─── Organizations ──────────────────────────────────────────────────────

/// GET /api/organizations
pub async fn list_organizations(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(page): Query<PageParams>,
) -> Json<Page<Organization>> {
    Json(state.organizations.list_organizations(ctx.tenant_id, page.into()))
}

/// POST /api/organizations
pub async fn create_organization(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(cmd): Json<CreateOrganization>,
) -> ApiResult<(StatusCode, Json<Organization>)> {
    let org = state.organizations.create_organization(ctx.tenant_id, cmd)?;
    Ok((StatusCode::CREATED, Json(org)))
}

/// GET /api/organizations/:id
pub async fn get_organization(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Organization>> {
    Ok(Json(state.organizations.get_organization(ctx.tenant_id, id)?))
}

/// PUT /api/organizations/:id
pub async fn update_organization(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<UpdateOrganization>,
) -> ApiResult<Json<Organization>> {
    Ok(Json(state.organizations.update_organization(ctx.tenant_id, id, cmd)?))
}

/// POST /api/organizations/:id/{activate|suspend|close}
pub async fn organization_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((id, action)): Path<(Uuid, StatusAction)>,
) -> ApiResult<Json<Organization>> {
    Ok(Json(state.organizations.organization_status(ctx.tenant_id, id, action)?))
}

// ─── Clubs ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ClubQuery {
    pub organization_id: Option<Uuid>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

/// GET /api/clubs
pub async fn list_clubs(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<ClubQuery>,
) -> Json<Page<Club>> {
    let page = PageParams {
        page: query.page,
        size: query.size,
    };
    Json(state
        .organizations
        .list_clubs(ctx.tenant_id, query.organization_id, page.into()))
}

/// POST /api/clubs
pub async fn create_club(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(cmd): Json<CreateClub>,
) -> ApiResult<(StatusCode, Json<Club>)> {
    let club = state.organizations.create_club(ctx.tenant_id, cmd)?;
    Ok((StatusCode::CREATED, Json(club)))
}

/// GET /api/clubs/:id
pub async fn get_club(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Club>> {
    Ok(Json(state.organizations.get_club(ctx.tenant_id, id)?))
}

/// PUT /api/clubs/:id
pub async fn update_club(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<UpdateClub>,
) -> ApiResult<Json<Club>> {
    Ok(Json(state.organizations.update_club(ctx.tenant_id, id, cmd)?))
}

/// POST /api/clubs/:id/{activate|suspend|close}
pub async fn club_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((id, action)): Path<(Uuid, StatusAction)>,
) -> ApiResult<Json<Club>> {
    Ok(Json(state.organizations.club_status(ctx.tenant_id, id, action)?))
}

// ─── Locations ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    pub club_id: Option<Uuid>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

/// GET /api/locations
pub async fn list_locations(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<LocationQuery>,
) -> Json<Page<Location>> {
    let page = PageParams {
        page: query.page,
        size: query.size,
    };
    Json(state
        .organizations
        .list_locations(ctx.tenant_id, query.club_id, page.into()))
}

/// POST /api/locations
pub async fn create_location(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(cmd): Json<CreateLocation>,
) -> ApiResult<(StatusCode, Json<Location>)> {
    let location = state.organizations.create_location(ctx.tenant_id, cmd)?;
    Ok((StatusCode::CREATED, Json(location)))
}

/// GET /api/locations/:id
pub async fn get_location(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Location>> {
    Ok(Json(state.organizations.get_location(ctx.tenant_id, id)?))
}

/// PUT /api/locations/:id
pub async fn update_location(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<UpdateLocation>,
) -> ApiResult<Json<Location>> {
    Ok(Json(state.organizations.update_location(ctx.tenant_id, id, cmd)?))
}

/// POST /api/locations/:id/{activate|suspend|close}
pub async fn location_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((id, action)): Path<(Uuid, StatusAction)>,
) -> ApiResult<Json<Location>> {
    Ok(Json(state.organizations.location_status(ctx.tenant_id, id, action)?))
}

// ─── Gender policies ────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyUpdate {
    pub policy: GenderPolicy,
}

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub gender: Gender,
}

/// GET /api/gender-policies
pub async fn supported_policies() -> Json<Vec<PolicyInfo>> {
    Json(GenderPolicyService::supported_policies())
}

/// GET /api/gender-policies/locations/:id
pub async fn current_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GenderStatus>> {
    Ok(Json(state.gender.current_status(ctx.tenant_id, id, state.local_now())?))
}

/// PUT /api/gender-policies/locations/:id
pub async fn update_policy(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<PolicyUpdate>,
) -> ApiResult<Json<Location>> {
    Ok(Json(state.gender.update_location_policy(ctx.tenant_id, id, req.policy)?))
}

/// GET /api/gender-policies/locations/:id/access?gender=
pub async fn check_access(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<AccessQuery>,
) -> ApiResult<Json<AccessDecision>> {
    let decision = state
        .gender
        .can_access_location(ctx.tenant_id, id, query.gender, state.local_now())?;
    Ok(Json(decision))
}

/// GET /api/gender-policies/locations/:id/schedules
pub async fn list_schedules(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<GenderSchedule>>> {
    Ok(Json(state.gender.schedules(ctx.tenant_id, id)?))
}

/// POST /api/gender-policies/locations/:id/schedules
pub async fn add_schedule(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<ScheduleInput>,
) -> ApiResult<(StatusCode, Json<GenderSchedule>)> {
    let schedule = state.gender.add_schedule(ctx.tenant_id, id, input)?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// DELETE /api/gender-policies/locations/:id/schedules
pub async fn delete_all_schedules(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CountResponse>> {
    let count = state.gender.delete_all(ctx.tenant_id, id)?;
    Ok(Json(CountResponse { count }))
}

/// PUT /api/gender-policies/schedules/:id
pub async fn update_schedule(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<ScheduleInput>,
) -> ApiResult<Json<GenderSchedule>> {
    Ok(Json(state.gender.update_schedule(ctx.tenant_id, id, input)?))
}

/// DELETE /api/gender-policies/schedules/:id
pub async fn delete_schedule(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.gender.delete_schedule(ctx.tenant_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}
