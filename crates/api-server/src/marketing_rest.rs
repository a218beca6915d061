//! Marketing REST API: campaigns, steps, enrollments, analytics,
//! templates, segments, and the public tracking endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use liyaqa_core::{LiyaqaResult, Member, Page, PageRequest};
use liyaqa_marketing::analytics::{AbTestResult, CampaignAnalytics, MarketingOverview, TimelinePoint};
use liyaqa_marketing::types::{
    Campaign, CampaignEnrollment, CampaignStep, CreateCampaign, CreateStep, UpdateCampaign, UpdateStep,
};
use liyaqa_marketing::OutboundMessage;
use liyaqa_platform::TenantContext;
use liyaqa_segmentation::{CreateSegment, Segment, UpdateSegment};

use crate::rest::{ensure_tenant, ApiResult, AppState, CountResponse, MemberIds, PageParams};

/// 1x1 transparent GIF served for open tracking.
const TRACKING_PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

const DEFAULT_TIMELINE_DAYS: u32 = 30;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/marketing/campaigns", get(list_campaigns).post(create_campaign))
        .route(
            "/api/marketing/campaigns/:id",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route("/api/marketing/campaigns/:id/activate", post(activate_campaign))
        .route("/api/marketing/campaigns/:id/pause", post(pause_campaign))
        .route("/api/marketing/campaigns/:id/complete", post(complete_campaign))
        .route("/api/marketing/campaigns/:id/archive", post(archive_campaign))
        .route("/api/marketing/campaigns/:id/duplicate", post(duplicate_campaign))
        .route("/api/marketing/campaigns/:id/steps", get(list_steps).post(add_step))
        .route("/api/marketing/campaigns/:id/enroll", post(enroll_members))
        .route("/api/marketing/campaigns/:id/enroll-segment/:segment_id", post(enroll_segment))
        .route("/api/marketing/campaigns/:id/enrollments", get(list_enrollments))
        .route("/api/marketing/campaigns/:id/analytics", get(campaign_analytics))
        .route("/api/marketing/campaigns/:id/ab-results", get(ab_results))
        .route("/api/marketing/campaigns/:id/timeline", get(timeline))
        .route("/api/marketing/steps/:id", get(get_step).put(update_step).delete(delete_step))
        .route("/api/marketing/steps/:id/test", post(send_test_step))
        .route("/api/marketing/enrollments/:id", get(get_enrollment))
        .route("/api/marketing/enrollments/:id/cancel", post(cancel_enrollment))
        .route("/api/marketing/overview", get(overview))
        .route("/api/marketing/templates", get(list_templates))
        .route("/api/marketing/templates/:id/use", post(use_template))
        .route("/api/marketing/segments", get(list_segments).post(create_segment))
        .route(
            "/api/marketing/segments/:id",
            get(get_segment).put(update_segment).delete(delete_segment),
        )
        .route("/api/marketing/segments/:id/members", get(preview_segment).post(add_segment_members))
        .route(
            "/api/marketing/segments/:id/members/:member_id",
            axum::routing::delete(remove_segment_member),
        )
        .route("/api/marketing/segments/:id/recalculate", post(recalculate_segment))
}

/// Tracking links are opened from mail clients, so they carry no API key.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/marketing/track/open/:token", get(track_open))
        .route("/api/marketing/track/click/:token", get(track_click))
}

// ─── Ownership lookups ──────────────────────────────────────────────────

fn owned_campaign(state: &AppState, ctx: &TenantContext, id: Uuid) -> LiyaqaResult<Campaign> {
    let campaign = state.campaigns.get_campaign(id)?;
    ensure_tenant(ctx.tenant_id, campaign.tenant_id, "Campaign", id)?;
    Ok(campaign)
}

fn owned_step(state: &AppState, ctx: &TenantContext, id: Uuid) -> LiyaqaResult<CampaignStep> {
    let step = state.campaigns.get_step(id)?;
    let campaign = state.campaigns.get_campaign(step.campaign_id)?;
    ensure_tenant(ctx.tenant_id, campaign.tenant_id, "CampaignStep", id)?;
    Ok(step)
}

fn owned_enrollment(state: &AppState, ctx: &TenantContext, id: Uuid) -> LiyaqaResult<CampaignEnrollment> {
    let enrollment = state.executor.get_enrollment(id)?;
    let campaign = state.campaigns.get_campaign(enrollment.campaign_id)?;
    ensure_tenant(ctx.tenant_id, campaign.tenant_id, "CampaignEnrollment", id)?;
    Ok(enrollment)
}

fn owned_segment(state: &AppState, ctx: &TenantContext, id: Uuid) -> LiyaqaResult<Segment> {
    let segment = state.segments.get_segment(id)?;
    ensure_tenant(ctx.tenant_id, segment.tenant_id, "Segment", id)?;
    Ok(segment)
}

/// Drops ids that are not members of the caller's tenant.
fn tenant_members(state: &AppState, ctx: &TenantContext, ids: &[Uuid]) -> Vec<Uuid> {
    use liyaqa_core::MemberDirectory;
    ids.iter()
        .copied()
        .filter(|id| {
            state
                .directory
                .get_member(*id)
                .is_some_and(|m| m.tenant_id == ctx.tenant_id)
        })
        .collect()
}

// ─── Campaigns ──────────────────────────────────────────────────────────

/// GET /api/marketing/campaigns
pub async fn list_campaigns(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(page): Query<PageParams>,
) -> Json<Page<Campaign>> {
    Json(state.campaigns.list_campaigns(ctx.tenant_id, page.into()))
}

/// POST /api/marketing/campaigns
pub async fn create_campaign(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(mut cmd): Json<CreateCampaign>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    cmd.tenant_id = ctx.tenant_id;
    cmd.is_template = false;
    let campaign = state.campaigns.create_campaign(cmd)?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /api/marketing/campaigns/:id
pub async fn get_campaign(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    Ok(Json(owned_campaign(&state, &ctx, id)?))
}

/// PUT /api/marketing/campaigns/:id
pub async fn update_campaign(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<UpdateCampaign>,
) -> ApiResult<Json<Campaign>> {
    owned_campaign(&state, &ctx, id)?;
    Ok(Json(state.campaigns.update_campaign(id, cmd)?))
}

/// DELETE /api/marketing/campaigns/:id
pub async fn delete_campaign(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_campaign(&state, &ctx, id)?;
    state.campaigns.delete_campaign(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/marketing/campaigns/:id/activate
pub async fn activate_campaign(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    owned_campaign(&state, &ctx, id)?;
    Ok(Json(state.campaigns.activate_campaign(id)?))
}

/// POST /api/marketing/campaigns/:id/pause
pub async fn pause_campaign(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    owned_campaign(&state, &ctx, id)?;
    Ok(Json(state.campaigns.pause_campaign(id)?))
}

/// POST /api/marketing/campaigns/:id/complete
pub async fn complete_campaign(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    owned_campaign(&state, &ctx, id)?;
    Ok(Json(state.campaigns.complete_campaign(id)?))
}

/// POST /api/marketing/campaigns/:id/archive
pub async fn archive_campaign(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    owned_campaign(&state, &ctx, id)?;
    Ok(Json(state.campaigns.archive_campaign(id)?))
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

/// POST /api/marketing/campaigns/:id/duplicate
pub async fn duplicate_campaign(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<NameRequest>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    owned_campaign(&state, &ctx, id)?;
    let copy = state.campaigns.duplicate_campaign(id, &req.name)?;
    Ok((StatusCode::CREATED, Json(copy)))
}

// ─── Steps ──────────────────────────────────────────────────────────────

/// GET /api/marketing/campaigns/:id/steps
pub async fn list_steps(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<CampaignStep>>> {
    owned_campaign(&state, &ctx, id)?;
    Ok(Json(state.campaigns.get_steps(id)?))
}

/// POST /api/marketing/campaigns/:id/steps
pub async fn add_step(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<CreateStep>,
) -> ApiResult<(StatusCode, Json<CampaignStep>)> {
    owned_campaign(&state, &ctx, id)?;
    let step = state.campaigns.add_step(id, cmd)?;
    Ok((StatusCode::CREATED, Json(step)))
}

/// GET /api/marketing/steps/:id
pub async fn get_step(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CampaignStep>> {
    Ok(Json(owned_step(&state, &ctx, id)?))
}

/// PUT /api/marketing/steps/:id
pub async fn update_step(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<UpdateStep>,
) -> ApiResult<Json<CampaignStep>> {
    owned_step(&state, &ctx, id)?;
    Ok(Json(state.campaigns.update_step(id, cmd)?))
}

/// DELETE /api/marketing/steps/:id
pub async fn delete_step(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_step(&state, &ctx, id)?;
    state.campaigns.delete_step(id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct TestStepRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// POST /api/marketing/steps/:id/test
pub async fn send_test_step(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<TestStepRequest>,
) -> ApiResult<Json<OutboundMessage>> {
    owned_step(&state, &ctx, id)?;
    Ok(Json(state.executor.send_test_step(id, req.email, req.phone)?))
}

// ─── Enrollments ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollResponse {
    pub enrolled: usize,
}

/// POST /api/marketing/campaigns/:id/enroll
pub async fn enroll_members(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<MemberIds>,
) -> ApiResult<Json<EnrollResponse>> {
    owned_campaign(&state, &ctx, id)?;
    let members = tenant_members(&state, &ctx, &req.member_ids);
    let enrolled = state.executor.enroll_members(id, &members)?;
    Ok(Json(EnrollResponse { enrolled }))
}

/// POST /api/marketing/campaigns/:id/enroll-segment/:segment_id
pub async fn enroll_segment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((id, segment_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<EnrollResponse>> {
    owned_campaign(&state, &ctx, id)?;
    owned_segment(&state, &ctx, segment_id)?;
    let members = state.segments.member_ids(segment_id)?;
    let enrolled = state.executor.enroll_segment(id, &members)?;
    Ok(Json(EnrollResponse { enrolled }))
}

/// GET /api/marketing/campaigns/:id/enrollments
pub async fn list_enrollments(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<CampaignEnrollment>>> {
    owned_campaign(&state, &ctx, id)?;
    Ok(Json(state.executor.list_enrollments(id, page.into())))
}

/// GET /api/marketing/enrollments/:id
pub async fn get_enrollment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CampaignEnrollment>> {
    Ok(Json(owned_enrollment(&state, &ctx, id)?))
}

/// POST /api/marketing/enrollments/:id/cancel
pub async fn cancel_enrollment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CampaignEnrollment>> {
    owned_enrollment(&state, &ctx, id)?;
    Ok(Json(state.executor.cancel_enrollment(id)?))
}

// ─── Analytics ──────────────────────────────────────────────────────────

/// GET /api/marketing/campaigns/:id/analytics
pub async fn campaign_analytics(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CampaignAnalytics>> {
    owned_campaign(&state, &ctx, id)?;
    Ok(Json(state.marketing_analytics.campaign_analytics(id)?))
}

/// GET /api/marketing/campaigns/:id/ab-results
pub async fn ab_results(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<AbTestResult>>> {
    owned_campaign(&state, &ctx, id)?;
    Ok(Json(state.marketing_analytics.ab_test_results(id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct TimelineParams {
    pub days: Option<u32>,
}

/// GET /api/marketing/campaigns/:id/timeline
pub async fn timeline(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Query(params): Query<TimelineParams>,
) -> ApiResult<Json<Vec<TimelinePoint>>> {
    owned_campaign(&state, &ctx, id)?;
    let days = params.days.unwrap_or(DEFAULT_TIMELINE_DAYS);
    Ok(Json(state.marketing_analytics.timeline(id, days, Utc::now())?))
}

/// GET /api/marketing/overview
pub async fn overview(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> Json<MarketingOverview> {
    Json(state.marketing_analytics.overview(ctx.tenant_id, Utc::now()))
}

// ─── Templates ──────────────────────────────────────────────────────────

/// GET /api/marketing/templates
pub async fn list_templates(State(state): State<AppState>) -> Json<Vec<Campaign>> {
    Json(state.campaigns.list_templates())
}

/// POST /api/marketing/templates/:id/use
pub async fn use_template(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<NameRequest>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    let campaign = state.campaigns.create_from_template(id, ctx.tenant_id, &req.name)?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

// ─── Segments ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SegmentQuery {
    pub search: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

/// GET /api/marketing/segments
pub async fn list_segments(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<SegmentQuery>,
) -> Json<Page<Segment>> {
    let page: PageRequest = PageParams {
        page: query.page,
        size: query.size,
    }
    .into();
    let found = match query.search.as_deref().map(str::trim) {
        Some(term) if !term.is_empty() => state.segments.search_segments(ctx.tenant_id, term, page),
        _ => state.segments.list_segments(ctx.tenant_id, page),
    };
    Json(found)
}

/// POST /api/marketing/segments
pub async fn create_segment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(mut cmd): Json<CreateSegment>,
) -> ApiResult<(StatusCode, Json<Segment>)> {
    cmd.tenant_id = ctx.tenant_id;
    let segment = state.segments.create_segment(cmd)?;
    Ok((StatusCode::CREATED, Json(segment)))
}

/// GET /api/marketing/segments/:id
pub async fn get_segment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Segment>> {
    Ok(Json(owned_segment(&state, &ctx, id)?))
}

/// PUT /api/marketing/segments/:id
pub async fn update_segment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<UpdateSegment>,
) -> ApiResult<Json<Segment>> {
    owned_segment(&state, &ctx, id)?;
    Ok(Json(state.segments.update_segment(id, cmd)?))
}

/// DELETE /api/marketing/segments/:id
pub async fn delete_segment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_segment(&state, &ctx, id)?;
    state.segments.delete_segment(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/marketing/segments/:id/members
pub async fn preview_segment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<Member>>> {
    owned_segment(&state, &ctx, id)?;
    Ok(Json(state.segments.preview_members(id, page.into())?))
}

/// POST /api/marketing/segments/:id/members
pub async fn add_segment_members(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<MemberIds>,
) -> ApiResult<Json<CountResponse>> {
    owned_segment(&state, &ctx, id)?;
    let members = tenant_members(&state, &ctx, &req.member_ids);
    let count = state.segments.add_members(id, &members)?;
    Ok(Json(CountResponse { count }))
}

/// DELETE /api/marketing/segments/:id/members/:member_id
pub async fn remove_segment_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((id, member_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    owned_segment(&state, &ctx, id)?;
    state.segments.remove_member(id, member_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/marketing/segments/:id/recalculate
pub async fn recalculate_segment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Segment>> {
    owned_segment(&state, &ctx, id)?;
    Ok(Json(state.segments.recalculate_count(id)?))
}

// ─── Tracking ───────────────────────────────────────────────────────────

/// GET /api/marketing/track/open/:token
///
/// Always answers with the pixel so mail clients render cleanly.
pub async fn track_open(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    if let Err(e) = state.tracking.record_open(&token) {
        debug!(error = %e, "Ignoring open for unknown token");
    }
    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        TRACKING_PIXEL,
    )
        .into_response()
}

/// GET /api/marketing/track/click/:token
pub async fn track_click(State(state): State<AppState>, Path(token): Path<String>) -> ApiResult<Redirect> {
    let target = state.tracking.record_click(&token)?;
    Ok(Redirect::temporary(&target))
}
