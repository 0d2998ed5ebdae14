//! REST API for the supplies tracker
//!
//! Exposes CRUD endpoints for products, companies and purchases plus the
//! analytics endpoints, all under `/api`. Handlers are thin pass-throughs
//! to the store; errors map to HTTP via the unified error type.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use crate::analytics::{compare_supplier_prices, rank_top_products, PriceComparison, ProductSpending};
use crate::database;
use crate::error::TrackerError;
use crate::models::{
    Company, CompanyDetail, CompanyPayload, Product, ProductDetail, ProductPayload,
    PurchaseDetail, PurchasePayload, Stats,
};
use crate::validation;

/// Shared application state (thread-safe database connection)
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        match self {
            TrackerError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid data", "details": details })),
            )
                .into_response(),
            TrackerError::NotFound(entity) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("{} not found", entity) })),
            )
                .into_response(),
            TrackerError::Database(e) => {
                log::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, TrackerError>;

/// GET /health
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": database::now_timestamp(),
    }))
}

// ── Products ───────────────────────────────────────────────────────────────

/// GET /api/products
async fn list_products_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<ProductDetail>>> {
    let conn = state.db.lock().unwrap();
    Ok(Json(database::list_products(&conn)?))
}

/// GET /api/products/{id}
async fn get_product_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ProductDetail>> {
    let conn = state.db.lock().unwrap();
    let product = database::get_product(&conn, id)?.ok_or(TrackerError::NotFound("Product"))?;
    Ok(Json(product))
}

/// POST /api/products
async fn create_product_handler(
    State(state): State<AppState>,
    Json(payload): Json<ProductPayload>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let product = validation::validate_new_product(&payload).map_err(TrackerError::Validation)?;
    let conn = state.db.lock().unwrap();
    let created = database::insert_product(&conn, &product)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/products/{id}
async fn update_product_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ProductPayload>,
) -> ApiResult<Json<Product>> {
    validation::validate_product_patch(&payload).map_err(TrackerError::Validation)?;
    let mut conn = state.db.lock().unwrap();
    let updated = database::update_product(&mut conn, id, &payload)?
        .ok_or(TrackerError::NotFound("Product"))?;
    Ok(Json(updated))
}

/// DELETE /api/products/{id}
async fn delete_product_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let conn = state.db.lock().unwrap();
    if database::delete_product(&conn, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(TrackerError::NotFound("Product"))
    }
}

// ── Companies ──────────────────────────────────────────────────────────────

/// GET /api/companies
async fn list_companies_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<CompanyDetail>>> {
    let conn = state.db.lock().unwrap();
    Ok(Json(database::list_companies(&conn)?))
}

/// GET /api/companies/{id}
async fn get_company_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CompanyDetail>> {
    let conn = state.db.lock().unwrap();
    let company = database::get_company(&conn, id)?.ok_or(TrackerError::NotFound("Company"))?;
    Ok(Json(company))
}

/// POST /api/companies
async fn create_company_handler(
    State(state): State<AppState>,
    Json(payload): Json<CompanyPayload>,
) -> ApiResult<(StatusCode, Json<Company>)> {
    let company = validation::validate_new_company(&payload).map_err(TrackerError::Validation)?;
    let conn = state.db.lock().unwrap();
    let created = database::insert_company(&conn, &company)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/companies/{id}
async fn update_company_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CompanyPayload>,
) -> ApiResult<Json<Company>> {
    validation::validate_company_patch(&payload).map_err(TrackerError::Validation)?;
    let mut conn = state.db.lock().unwrap();
    let updated = database::update_company(&mut conn, id, &payload)?
        .ok_or(TrackerError::NotFound("Company"))?;
    Ok(Json(updated))
}

/// DELETE /api/companies/{id}
async fn delete_company_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let conn = state.db.lock().unwrap();
    if database::delete_company(&conn, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(TrackerError::NotFound("Company"))
    }
}

// ── Purchases ──────────────────────────────────────────────────────────────

/// GET /api/purchases
async fn list_purchases_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PurchaseDetail>>> {
    let conn = state.db.lock().unwrap();
    Ok(Json(database::list_purchases(&conn)?))
}

/// GET /api/purchases/{id}
async fn get_purchase_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PurchaseDetail>> {
    let conn = state.db.lock().unwrap();
    let purchase = database::get_purchase(&conn, id)?.ok_or(TrackerError::NotFound("Purchase"))?;
    Ok(Json(purchase))
}

/// POST /api/purchases
async fn create_purchase_handler(
    State(state): State<AppState>,
    Json(payload): Json<PurchasePayload>,
) -> ApiResult<(StatusCode, Json<PurchaseDetail>)> {
    let purchase = validation::validate_new_purchase(&payload).map_err(TrackerError::Validation)?;
    let mut conn = state.db.lock().unwrap();
    let created = database::insert_purchase(&mut conn, &purchase)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/purchases/{id}
async fn update_purchase_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<PurchasePayload>,
) -> ApiResult<Json<PurchaseDetail>> {
    let patch = validation::validate_purchase_patch(&payload).map_err(TrackerError::Validation)?;
    let mut conn = state.db.lock().unwrap();
    let updated = database::update_purchase(&mut conn, id, &patch)?
        .ok_or(TrackerError::NotFound("Purchase"))?;
    Ok(Json(updated))
}

/// DELETE /api/purchases/{id}
async fn delete_purchase_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let conn = state.db.lock().unwrap();
    if database::delete_purchase(&conn, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(TrackerError::NotFound("Purchase"))
    }
}

// ── Analytics ──────────────────────────────────────────────────────────────

/// GET /api/analytics/stats
async fn stats_handler(State(state): State<AppState>) -> ApiResult<Json<Stats>> {
    let conn = state.db.lock().unwrap();
    Ok(Json(Stats {
        total_products: database::count_products(&conn)?,
        total_companies: database::count_companies(&conn)?,
        total_purchases: database::count_purchases(&conn)?,
        total_spent: database::total_spent(&conn)?,
        recent_purchases: database::recent_purchases(&conn, 10)?,
    }))
}

/// GET /api/analytics/product/{productId}/price-comparison
async fn price_comparison_handler(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> ApiResult<Json<PriceComparison>> {
    let conn = state.db.lock().unwrap();
    let purchases = database::purchases_with_company(&conn, product_id)?;
    Ok(Json(compare_supplier_prices(product_id, &purchases)))
}

/// Top-products query parameters
#[derive(Deserialize)]
struct TopProductsParams {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    10
}

/// GET /api/analytics/top-products?limit={limit}
async fn top_products_handler(
    State(state): State<AppState>,
    Query(params): Query<TopProductsParams>,
) -> ApiResult<Json<Vec<ProductSpending>>> {
    let conn = state.db.lock().unwrap();
    let products = database::products_with_purchases(&conn)?;
    Ok(Json(rank_top_products(products, params.limit)))
}

/// Build the API router
pub fn create_router(db: Arc<Mutex<Connection>>) -> Router {
    let state = AppState { db };

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/products",
            get(list_products_handler).post(create_product_handler),
        )
        .route(
            "/api/products/{id}",
            get(get_product_handler)
                .put(update_product_handler)
                .delete(delete_product_handler),
        )
        .route(
            "/api/companies",
            get(list_companies_handler).post(create_company_handler),
        )
        .route(
            "/api/companies/{id}",
            get(get_company_handler)
                .put(update_company_handler)
                .delete(delete_company_handler),
        )
        .route(
            "/api/purchases",
            get(list_purchases_handler).post(create_purchase_handler),
        )
        .route(
            "/api/purchases/{id}",
            get(get_purchase_handler)
                .put(update_purchase_handler)
                .delete(delete_purchase_handler),
        )
        .route("/api/analytics/stats", get(stats_handler))
        .route(
            "/api/analytics/product/{productId}/price-comparison",
            get(price_comparison_handler),
        )
        .route("/api/analytics/top-products", get(top_products_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server (async)
///
/// Binds to 0.0.0.0 (all interfaces) to work with Docker port mapping.
/// When running locally, use firewall rules to restrict access.
pub async fn serve(
    db: Arc<Mutex<Connection>>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(db);
    let addr = format!("0.0.0.0:{}", port);

    log::info!("API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        log::info!("Shutdown signal received");
    }
}
