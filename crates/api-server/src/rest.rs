//! Shared REST plumbing: application state, operational endpoints, and
//! the mapping from domain errors to HTTP responses.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use liyaqa_billing::{ComplianceService, InvoiceService, SandboxReportingClient};
use liyaqa_core::config::{AppConfig, MarketingConfig};
use liyaqa_core::{EventSink, InMemoryDirectory, LiyaqaError, LiyaqaResult, MemberDirectory, PageRequest};
use liyaqa_marketing::{
    CampaignExecutor, CampaignService, MarketingAnalytics, MarketingScheduler, MarketingStore, Notifier,
    TrackingService, TriggerEngine,
};
use liyaqa_platform::{
    ApiKeyService, AuditLogger, GenderPolicyService, ImpersonationService, OrganizationService, PlatformAnalytics,
    TeamService, TenantService,
};
use liyaqa_segmentation::SegmentService;
use liyaqa_shop::{CatalogService, OrderService};

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub node_id: String,
    pub start_time: Instant,
    pub platform_admin_token: Arc<str>,
    pub utc_offset_hours: i32,
    pub directory: InMemoryDirectory,
    pub campaigns: CampaignService,
    pub executor: CampaignExecutor,
    pub tracking: TrackingService,
    pub marketing_analytics: MarketingAnalytics,
    pub segments: SegmentService,
    pub invoices: InvoiceService,
    pub compliance: ComplianceService,
    pub catalog: CatalogService,
    pub orders: OrderService,
    pub audit: AuditLogger,
    pub tenants: TenantService,
    pub organizations: OrganizationService,
    pub gender: GenderPolicyService,
    pub api_keys: ApiKeyService,
    pub impersonation: ImpersonationService,
    pub team: TeamService,
    pub platform_analytics: PlatformAnalytics,
}

impl AppState {
    /// Wires every service over one member directory and one event sink.
    pub fn new(
        config: &AppConfig,
        directory: InMemoryDirectory,
        notifier: Arc<dyn Notifier>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let members: Arc<dyn MemberDirectory> = Arc::new(directory.clone());
        let store = MarketingStore::new();
        let campaigns = CampaignService::new(store.clone()).with_event_sink(events.clone());
        let executor = CampaignExecutor::new(store.clone(), members.clone(), notifier)
            .with_event_sink(events.clone())
            .with_club_name(config.marketing.club_name.clone())
            .with_tracking_base_url(config.marketing.tracking_base_url.clone())
            .with_utc_offset(config.marketing.utc_offset_hours);
        let tracking = TrackingService::new(store.clone()).with_event_sink(events.clone());
        let catalog = CatalogService::new();
        let orders = OrderService::new(catalog.clone()).with_event_sink(events.clone());

        let audit = AuditLogger::new();
        let tenants = TenantService::new(audit.clone()).with_event_sink(events.clone());
        let organizations = OrganizationService::new();
        let api_keys =
            ApiKeyService::new(tenants.clone(), audit.clone(), &config.platform).with_event_sink(events.clone());
        let impersonation = ImpersonationService::new(tenants.clone(), audit.clone(), &config.platform)
            .with_event_sink(events.clone());
        let team = TeamService::new(tenants.clone(), audit.clone(), &config.platform).with_event_sink(events.clone());

        Self {
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
            platform_admin_token: Arc::from(config.api.platform_admin_token.as_str()),
            utc_offset_hours: config.marketing.utc_offset_hours,
            directory,
            campaigns,
            executor,
            tracking,
            marketing_analytics: MarketingAnalytics::new(store),
            segments: SegmentService::new(members),
            invoices: InvoiceService::new(&config.billing).with_event_sink(events),
            compliance: ComplianceService::new(Arc::new(SandboxReportingClient), config.billing.vat_number.clone()),
            catalog,
            orders,
            platform_analytics: PlatformAnalytics::new(tenants.clone(), api_keys.clone(), impersonation.clone()),
            gender: GenderPolicyService::new(organizations.clone()),
            audit,
            tenants,
            organizations,
            api_keys,
            impersonation,
            team,
        }
    }

    /// Scheduler over this state's executor, with overdue invoices feeding
    /// the payment-failed trigger.
    pub fn marketing_scheduler(&self, config: &MarketingConfig) -> MarketingScheduler {
        let triggers = TriggerEngine::new(self.campaigns.store().clone(), self.executor.clone())
            .with_invoice_source(Arc::new(self.invoices.clone()))
            .with_utc_offset(config.utc_offset_hours);
        MarketingScheduler::new(self.executor.clone(), triggers, config).with_segments(self.segments.clone())
    }

    /// Wall-clock time at the clubs, used for gender schedules.
    pub fn local_now(&self) -> NaiveDateTime {
        (Utc::now() + Duration::hours(i64::from(self.utc_offset_hours))).naive_utc()
    }
}

// ─── Errors ─────────────────────────────────────────────────────────────

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Domain error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub LiyaqaError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<LiyaqaError> for ApiError {
    fn from(err: LiyaqaError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            LiyaqaError::NotFound(_) => StatusCode::NOT_FOUND,
            LiyaqaError::Validation(_) => StatusCode::BAD_REQUEST,
            LiyaqaError::Conflict(_) => StatusCode::CONFLICT,
            LiyaqaError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LiyaqaError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LiyaqaError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        metrics::counter!("api.errors", "code" => self.0.code()).increment(1);
        let body = ErrorResponse {
            error: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Records owned by another tenant are reported as missing.
pub(crate) fn ensure_tenant(caller: Uuid, owner: Uuid, entity: &str, id: Uuid) -> LiyaqaResult<()> {
    if caller == owner {
        Ok(())
    } else {
        Err(LiyaqaError::not_found(entity, id))
    }
}

// ─── Request helpers ────────────────────────────────────────────────────

/// `page`/`size` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        let defaults = PageRequest::default();
        PageRequest {
            page: params.page.unwrap_or(defaults.page),
            size: params.size.unwrap_or(defaults.size),
        }
    }
}

/// Body carrying a list of member ids.
#[derive(Debug, Deserialize)]
pub struct MemberIds {
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

// ─── Operational endpoints ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub tenants: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        tenants: state.tenants.all(None).len(),
    })
}

/// GET /ready
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
