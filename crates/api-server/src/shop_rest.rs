//! Shop REST API: catalog management and member orders.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use liyaqa_core::{LiyaqaError, LiyaqaResult, LocalizedText, MemberDirectory, Page};
use liyaqa_platform::TenantContext;
use liyaqa_shop::types::{CreateProduct, ProductFilter, ProductStatus, ProductType, UpdateProduct};
use liyaqa_shop::{Order, Product, ProductCategory};

use crate::rest::{ensure_tenant, ApiResult, AppState, PageParams};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/shop/products", get(list_products).post(create_product))
        .route(
            "/api/shop/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/api/shop/products/:id/publish", post(publish_product))
        .route("/api/shop/products/:id/activate", post(activate_product))
        .route("/api/shop/products/:id/deactivate", post(deactivate_product))
        .route("/api/shop/products/:id/discontinue", post(discontinue_product))
        .route("/api/shop/products/:id/stock", post(adjust_stock))
        .route("/api/shop/products/:id/bundle-items", get(bundle_items))
        .route("/api/shop/categories", get(list_categories).post(create_category))
        .route("/api/shop/categories/:id", put(update_category).delete(delete_category))
        .route("/api/shop/orders", get(list_orders).post(create_order))
        .route("/api/shop/orders/:id", get(get_order))
        .route("/api/shop/orders/:id/items", post(add_item))
        .route(
            "/api/shop/orders/:id/items/:product_id",
            put(set_item_quantity).delete(remove_item),
        )
        .route("/api/shop/orders/:id/checkout", post(checkout))
        .route("/api/shop/orders/:id/pay", post(mark_paid))
        .route("/api/shop/orders/:id/fulfil", post(fulfil))
        .route("/api/shop/orders/:id/cancel", post(cancel_order))
}

fn owned_product(state: &AppState, ctx: &TenantContext, id: Uuid) -> LiyaqaResult<Product> {
    let product = state.catalog.get_product(id)?;
    ensure_tenant(ctx.tenant_id, product.tenant_id, "Product", id)?;
    Ok(product)
}

fn owned_category(state: &AppState, ctx: &TenantContext, id: Uuid) -> LiyaqaResult<ProductCategory> {
    let category = state.catalog.get_category(id)?;
    ensure_tenant(ctx.tenant_id, category.tenant_id, "ProductCategory", id)?;
    Ok(category)
}

fn owned_order(state: &AppState, ctx: &TenantContext, id: Uuid) -> LiyaqaResult<Order> {
    let order = state.orders.get(id)?;
    ensure_tenant(ctx.tenant_id, order.tenant_id, "Order", id)?;
    Ok(order)
}

fn ensure_member(state: &AppState, ctx: &TenantContext, member_id: Uuid) -> LiyaqaResult<()> {
    state
        .directory
        .get_member(member_id)
        .filter(|m| m.tenant_id == ctx.tenant_id)
        .map(|_| ())
        .ok_or_else(|| LiyaqaError::not_found("Member", member_id))
}

// ─── Products ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub status: Option<ProductStatus>,
    pub product_type: Option<ProductType>,
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

/// GET /api/shop/products
pub async fn list_products(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<ProductQuery>,
) -> Json<Page<Product>> {
    let filter = ProductFilter {
        status: query.status,
        product_type: query.product_type,
        category_id: query.category_id,
        search: query.search,
    };
    let page = PageParams {
        page: query.page,
        size: query.size,
    };
    Json(state.catalog.list_products(ctx.tenant_id, &filter, page.into()))
}

/// POST /api/shop/products
pub async fn create_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(mut cmd): Json<CreateProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    cmd.tenant_id = ctx.tenant_id;
    let product = state.catalog.create_product(cmd)?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /api/shop/products/:id
pub async fn get_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Product>> {
    Ok(Json(owned_product(&state, &ctx, id)?))
}

/// PUT /api/shop/products/:id
pub async fn update_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<UpdateProduct>,
) -> ApiResult<Json<Product>> {
    owned_product(&state, &ctx, id)?;
    Ok(Json(state.catalog.update_product(id, cmd)?))
}

/// DELETE /api/shop/products/:id
pub async fn delete_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_product(&state, &ctx, id)?;
    state.catalog.delete_product(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/shop/products/:id/publish
pub async fn publish_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Product>> {
    owned_product(&state, &ctx, id)?;
    Ok(Json(state.catalog.publish(id)?))
}

/// POST /api/shop/products/:id/activate
pub async fn activate_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Product>> {
    owned_product(&state, &ctx, id)?;
    Ok(Json(state.catalog.activate(id)?))
}

/// POST /api/shop/products/:id/deactivate
pub async fn deactivate_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Product>> {
    owned_product(&state, &ctx, id)?;
    Ok(Json(state.catalog.deactivate(id)?))
}

/// POST /api/shop/products/:id/discontinue
pub async fn discontinue_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Product>> {
    owned_product(&state, &ctx, id)?;
    Ok(Json(state.catalog.discontinue(id)?))
}

#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    pub delta: i64,
}

/// POST /api/shop/products/:id/stock
pub async fn adjust_stock(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<StockAdjustment>,
) -> ApiResult<Json<Product>> {
    owned_product(&state, &ctx, id)?;
    Ok(Json(state.catalog.adjust_stock(id, req.delta)?))
}

#[derive(Debug, Serialize)]
pub struct BundleComponent {
    pub product: Product,
    pub quantity: u32,
}

/// GET /api/shop/products/:id/bundle-items
pub async fn bundle_items(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<BundleComponent>>> {
    owned_product(&state, &ctx, id)?;
    let components = state
        .catalog
        .bundle_items(id)?
        .into_iter()
        .map(|(product, quantity)| BundleComponent { product, quantity })
        .collect();
    Ok(Json(components))
}

// ─── Categories ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCategory {
    pub name: LocalizedText,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCategory {
    pub name: Option<LocalizedText>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

/// GET /api/shop/categories
pub async fn list_categories(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> Json<Vec<ProductCategory>> {
    Json(state.catalog.list_categories(ctx.tenant_id))
}

/// POST /api/shop/categories
pub async fn create_category(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<CreateCategory>,
) -> ApiResult<(StatusCode, Json<ProductCategory>)> {
    let category = state
        .catalog
        .create_category(ctx.tenant_id, req.name, req.sort_order)?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/shop/categories/:id
pub async fn update_category(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCategory>,
) -> ApiResult<Json<ProductCategory>> {
    owned_category(&state, &ctx, id)?;
    let category = state
        .catalog
        .update_category(id, req.name, req.sort_order, req.is_active)?;
    Ok(Json(category))
}

/// DELETE /api/shop/categories/:id
pub async fn delete_category(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_category(&state, &ctx, id)?;
    state.catalog.delete_category(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Orders ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub member_id: Uuid,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrder {
    pub member_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AddItem {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct SetQuantity {
    pub quantity: u32,
}

/// GET /api/shop/orders?member_id=
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<OrderQuery>,
) -> ApiResult<Json<Page<Order>>> {
    ensure_member(&state, &ctx, query.member_id)?;
    let page = PageParams {
        page: query.page,
        size: query.size,
    };
    Ok(Json(state.orders.list_by_member(query.member_id, page.into())))
}

/// POST /api/shop/orders
pub async fn create_order(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<CreateOrder>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    ensure_member(&state, &ctx, req.member_id)?;
    let order = state.orders.create_cart(ctx.tenant_id, req.member_id);
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/shop/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    Ok(Json(owned_order(&state, &ctx, id)?))
}

/// POST /api/shop/orders/:id/items
pub async fn add_item(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddItem>,
) -> ApiResult<Json<Order>> {
    owned_order(&state, &ctx, id)?;
    owned_product(&state, &ctx, req.product_id)?;
    Ok(Json(state.orders.add_item(id, req.product_id, req.quantity)?))
}

/// PUT /api/shop/orders/:id/items/:product_id
pub async fn set_item_quantity(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SetQuantity>,
) -> ApiResult<Json<Order>> {
    owned_order(&state, &ctx, id)?;
    Ok(Json(state.orders.set_item_quantity(id, product_id, req.quantity)?))
}

/// DELETE /api/shop/orders/:id/items/:product_id
pub async fn remove_item(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Order>> {
    owned_order(&state, &ctx, id)?;
    Ok(Json(state.orders.remove_item(id, product_id)?))
}

/// POST /api/shop/orders/:id/checkout
pub async fn checkout(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    owned_order(&state, &ctx, id)?;
    Ok(Json(state.orders.checkout(id)?))
}

/// POST /api/shop/orders/:id/pay
pub async fn mark_paid(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    owned_order(&state, &ctx, id)?;
    Ok(Json(state.orders.mark_paid(id)?))
}

/// POST /api/shop/orders/:id/fulfil
pub async fn fulfil(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    owned_order(&state, &ctx, id)?;
    Ok(Json(state.orders.fulfil(id)?))
}

/// POST /api/shop/orders/:id/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    owned_order(&state, &ctx, id)?;
    Ok(Json(state.orders.cancel(id)?))
}
