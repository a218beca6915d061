//! Member invoice REST API.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use liyaqa_billing::invoice::{CreateInvoice, CreateSubscriptionInvoice, IssueInvoice, RecordPayment};
use liyaqa_billing::service::BulkOutcome;
use liyaqa_billing::{ComplianceSubmission, Invoice, InvoiceFilter, InvoiceStatus};
use liyaqa_core::{LiyaqaError, LiyaqaResult, LocalizedText, MemberDirectory, Page};
use liyaqa_platform::TenantContext;

use crate::rest::{ensure_tenant, ApiResult, AppState, CountResponse, PageParams};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/invoices", get(search_invoices).post(create_invoice))
        .route("/api/invoices/from-subscription", post(create_from_subscription))
        .route("/api/invoices/pending-count", get(pending_count))
        .route("/api/invoices/number/:number", get(get_by_number))
        .route("/api/invoices/bulk/issue", post(bulk_issue))
        .route("/api/invoices/bulk/cancel", post(bulk_cancel))
        .route("/api/invoices/:id", get(get_invoice).delete(delete_invoice))
        .route("/api/invoices/:id/notes", put(update_notes))
        .route("/api/invoices/:id/issue", post(issue_invoice))
        .route("/api/invoices/:id/payments", post(record_payment))
        .route("/api/invoices/:id/cancel", post(cancel_invoice))
        .route("/api/invoices/:id/report", post(report_invoice))
        .route("/api/invoices/:id/submissions", get(list_submissions))
}

fn owned_invoice(state: &AppState, ctx: &TenantContext, id: Uuid) -> LiyaqaResult<Invoice> {
    let invoice = state.invoices.get_invoice(id)?;
    ensure_tenant(ctx.tenant_id, invoice.tenant_id, "Invoice", id)?;
    Ok(invoice)
}

/// The billed member and organization must both belong to the caller.
fn ensure_parties(state: &AppState, ctx: &TenantContext, member_id: Uuid, organization_id: Uuid) -> LiyaqaResult<()> {
    state
        .directory
        .get_member(member_id)
        .filter(|m| m.tenant_id == ctx.tenant_id)
        .ok_or_else(|| LiyaqaError::not_found("Member", member_id))?;
    state
        .organizations
        .get_organization(ctx.tenant_id, organization_id)?;
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceQuery {
    pub member_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub search: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

/// GET /api/invoices
pub async fn search_invoices(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<InvoiceQuery>,
) -> Json<Page<Invoice>> {
    let filter = InvoiceFilter {
        tenant_id: Some(ctx.tenant_id),
        member_id: query.member_id,
        status: query.status,
        search: query.search,
        from: query.from,
        to: query.to,
    };
    let page = PageParams {
        page: query.page,
        size: query.size,
    };
    Json(state.invoices.search(&filter, page.into()))
}

/// POST /api/invoices
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(mut cmd): Json<CreateInvoice>,
) -> ApiResult<(StatusCode, Json<Invoice>)> {
    ensure_parties(&state, &ctx, cmd.member_id, cmd.organization_id)?;
    cmd.tenant_id = ctx.tenant_id;
    Ok((StatusCode::CREATED, Json(state.invoices.create_invoice(cmd)?)))
}

/// POST /api/invoices/from-subscription
pub async fn create_from_subscription(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(mut cmd): Json<CreateSubscriptionInvoice>,
) -> ApiResult<(StatusCode, Json<Invoice>)> {
    ensure_parties(&state, &ctx, cmd.member_id, cmd.organization_id)?;
    cmd.tenant_id = ctx.tenant_id;
    Ok((StatusCode::CREATED, Json(state.invoices.create_from_subscription(cmd)?)))
}

/// GET /api/invoices/pending-count
pub async fn pending_count(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> Json<CountResponse> {
    Json(CountResponse {
        count: state.invoices.count_pending(ctx.tenant_id),
    })
}

/// GET /api/invoices/number/:number
pub async fn get_by_number(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(number): Path<String>,
) -> ApiResult<Json<Invoice>> {
    let invoice = state.invoices.get_by_number(&number)?;
    if invoice.tenant_id != ctx.tenant_id {
        return Err(LiyaqaError::not_found("Invoice", number).into());
    }
    Ok(Json(invoice))
}

/// GET /api/invoices/:id
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Invoice>> {
    Ok(Json(owned_invoice(&state, &ctx, id)?))
}

/// DELETE /api/invoices/:id
pub async fn delete_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_invoice(&state, &ctx, id)?;
    state.invoices.delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct NotesRequest {
    #[serde(default)]
    pub notes: Option<LocalizedText>,
}

/// PUT /api/invoices/:id/notes
pub async fn update_notes(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<NotesRequest>,
) -> ApiResult<Json<Invoice>> {
    owned_invoice(&state, &ctx, id)?;
    Ok(Json(state.invoices.update_notes(id, req.notes)?))
}

/// POST /api/invoices/:id/issue
pub async fn issue_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<IssueInvoice>,
) -> ApiResult<Json<Invoice>> {
    owned_invoice(&state, &ctx, id)?;
    Ok(Json(state.invoices.issue(id, cmd)?))
}

/// POST /api/invoices/:id/payments
pub async fn record_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<RecordPayment>,
) -> ApiResult<Json<Invoice>> {
    owned_invoice(&state, &ctx, id)?;
    Ok(Json(state.invoices.record_payment(id, cmd)?))
}

/// POST /api/invoices/:id/cancel
pub async fn cancel_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Invoice>> {
    owned_invoice(&state, &ctx, id)?;
    Ok(Json(state.invoices.cancel(id)?))
}

/// POST /api/invoices/:id/report
///
/// Rejections are recorded on the submission, not returned as errors.
pub async fn report_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ComplianceSubmission>> {
    let invoice = owned_invoice(&state, &ctx, id)?;
    Ok(Json(state.compliance.report(&invoice)))
}

/// GET /api/invoices/:id/submissions
pub async fn list_submissions(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ComplianceSubmission>>> {
    owned_invoice(&state, &ctx, id)?;
    Ok(Json(state.compliance.submissions_for(id)))
}

// ─── Bulk ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BulkIssueRequest {
    pub ids: Vec<Uuid>,
    pub issue_date: NaiveDate,
    #[serde(default)]
    pub payment_due_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub ids: Vec<Uuid>,
}

/// Splits ids into the caller's invoices and outcomes for the rest.
fn partition_owned(state: &AppState, ctx: &TenantContext, ids: &[Uuid]) -> (Vec<Uuid>, Vec<BulkOutcome>) {
    let mut owned = Vec::new();
    let mut rejected = Vec::new();
    for id in ids {
        match owned_invoice(state, ctx, *id) {
            Ok(_) => owned.push(*id),
            Err(e) => rejected.push(BulkOutcome {
                invoice_id: *id,
                invoice: None,
                error: Some(e.to_string()),
            }),
        }
    }
    (owned, rejected)
}

/// POST /api/invoices/bulk/issue
pub async fn bulk_issue(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<BulkIssueRequest>,
) -> Json<Vec<BulkOutcome>> {
    let (owned, mut outcomes) = partition_owned(&state, &ctx, &req.ids);
    let mut issued = state
        .invoices
        .bulk_issue(&owned, req.issue_date, req.payment_due_days);
    issued.append(&mut outcomes);
    Json(issued)
}

/// POST /api/invoices/bulk/cancel
pub async fn bulk_cancel(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<BulkRequest>,
) -> Json<Vec<BulkOutcome>> {
    let (owned, mut outcomes) = partition_owned(&state, &ctx, &req.ids);
    let mut cancelled = state.invoices.bulk_cancel(&owned);
    cancelled.append(&mut outcomes);
    Json(cancelled)
}
