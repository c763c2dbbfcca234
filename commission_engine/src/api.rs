//! HTTP API for the Commission Engine.
//!
//! This module exposes the calculator and the record keeping around it
//! using the [`axum`](https://crates.io/crates/axum) framework.  Every
//! `/api` route except the calculator and the sign-up/sign-in pair needs
//! an `Authorization: Bearer <token>` header obtained from
//! `POST /api/auth/sign-in`.

use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::blob::{image_extension, BlobStore, FsBlobStore};
use crate::commission::calculate_commissions;
use crate::config::AppConfig;
use crate::engine::{month_bounds, monthly_stats};
use crate::error::{AppError, AppResult};
use crate::identity::{IdentityProvider, MemoryIdentity};
use crate::models::{
    CommissionBreakdown, MonthlyStats, NewSale, NewSpiff, Notification, SaleEntry, SaleRecord,
    SaleWithCommission, Session, ShareRequest, SpiffEntry, User,
};
use crate::sharing::Sharing;
use crate::store::{MemoryStore, RecordQuery, RecordStore, SortOrder};

/// Application state shared across requests.
pub struct AppState {
    pub records: Arc<dyn RecordStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub blobs: Arc<dyn BlobStore>,
    pub sharing: Sharing,
}

impl AppState {
    pub fn new(
        records: Arc<dyn RecordStore>,
        identity: Arc<dyn IdentityProvider>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let sharing = Sharing::new(records.clone(), identity.clone());
        Self {
            records,
            identity,
            blobs,
            sharing,
        }
    }

    /// In-memory records and identities, proofs on disk under the
    /// configured blob directory.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryIdentity::new()),
            Arc::new(FsBlobStore::new(
                config.blob_dir.clone(),
                config.public_blob_url.clone(),
            )),
        )
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/commissions/calculate", post(calculate_handler))
        .route("/api/auth/register", post(register))
        .route("/api/auth/sign-in", post(sign_in))
        .route("/api/auth/sign-out", post(sign_out))
        .route("/api/auth/me", get(me))
        .route("/api/users/lookup", get(lookup_user))
        .route("/api/sales", get(list_sales).post(create_sale))
        .route(
            "/api/sales/:id",
            get(get_sale).put(update_sale).delete(delete_sale),
        )
        .route("/api/spiffs", get(list_spiffs).post(create_spiff))
        .route(
            "/api/spiffs/:id",
            get(get_spiff).put(update_spiff).delete(delete_spiff),
        )
        .route("/api/spiffs/:id/proof", post(upload_proof))
        .route("/proofs/*path", get(serve_proof))
        .route("/api/stats/monthly", get(stats_handler))
        .route("/api/shares", get(list_shares).post(create_share))
        .route("/api/shares/:id/accept", post(accept_share))
        .route("/api/shares/:id/reject", post(reject_share))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/:id/read", post(mark_notification_read))
        .with_state(state)
}

/// Launch the API server and block until it terminates.
pub async fn serve(config: AppConfig) -> Result<()> {
    let router = build_router(Arc::new(AppState::from_config(&config)));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<User> {
    let Some(token) = bearer_token(headers) else {
        tracing::warn!("request without bearer token");
        return Err(AppError::Unauthorized);
    };
    state.identity.current_user(token).await.map_err(|err| {
        tracing::warn!("rejected bearer token");
        err
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Handler for POST /api/commissions/calculate
async fn calculate_handler(Json(entry): Json<SaleEntry>) -> Json<CommissionBreakdown> {
    Json(calculate_commissions(&entry))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct SignInRequest {
    email: String,
    #[serde(default)]
    password: String,
}

async fn register(
    State(state): State<SharedState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state
        .identity
        .register(&request.email, &request.display_name, &request.password)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn sign_in(
    State(state): State<SharedState>,
    Json(request): Json<SignInRequest>,
) -> AppResult<Json<Session>> {
    let session = state
        .identity
        .sign_in(&request.email, &request.password)
        .await?;
    Ok(Json(session))
}

async fn sign_out(State(state): State<SharedState>, headers: HeaderMap) -> AppResult<StatusCode> {
    authenticate(&state, &headers).await?;
    if let Some(token) = bearer_token(&headers) {
        state.identity.sign_out(token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(state): State<SharedState>, headers: HeaderMap) -> AppResult<Json<User>> {
    Ok(Json(authenticate(&state, &headers).await?))
}

#[derive(Debug, Deserialize)]
struct LookupQuery {
    email: String,
}

async fn lookup_user(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<LookupQuery>,
) -> AppResult<Json<User>> {
    authenticate(&state, &headers).await?;
    let user = state
        .identity
        .lookup_by_email(&query.email)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

#[derive(Debug, Default, Deserialize)]
struct RangeQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    order: Option<SortOrder>,
}

impl RangeQuery {
    fn for_owner(self, owner_id: Uuid) -> RecordQuery {
        RecordQuery {
            owner_id,
            from: self.from,
            to: self.to,
            order: self.order.unwrap_or_default(),
        }
    }
}

/// Largest price accepted on a stored sale.
const MAX_PRICE: f64 = 100_000_000.0;
/// Largest single spiff accepted, in dollars.
const MAX_SPIFF_AMOUNT: i64 = 1_000_000;

fn check_amount(name: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() || !(0.0..=MAX_PRICE).contains(&value) {
        return Err(AppError::InvalidInput(format!(
            "{name} must be between 0 and {MAX_PRICE}"
        )));
    }
    Ok(())
}

fn validate_sale(sale: &NewSale) -> AppResult<()> {
    if sale.customer_name.trim().is_empty() {
        return Err(AppError::InvalidInput("customer_name is required".to_string()));
    }
    let entry = &sale.entry;
    check_amount("sale_price", entry.sale_price)?;
    let optional = [
        ("accessories_price", entry.accessories_price),
        ("warranty_price", entry.warranty_price),
        ("warranty_cost", entry.warranty_cost),
        ("maintenance_price", entry.maintenance_price),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            check_amount(name, value)?;
        }
    }
    Ok(())
}

fn validate_spiff(spiff: &NewSpiff) -> AppResult<()> {
    if !(0..=MAX_SPIFF_AMOUNT).contains(&spiff.amount) {
        return Err(AppError::InvalidInput(format!(
            "amount must be between 0 and {MAX_SPIFF_AMOUNT}"
        )));
    }
    Ok(())
}

fn with_commission(sale: SaleRecord) -> SaleWithCommission {
    let commission = calculate_commissions(&sale.entry);
    SaleWithCommission { sale, commission }
}

async fn owned_sale(state: &AppState, user: &User, id: Uuid) -> AppResult<SaleRecord> {
    state
        .records
        .get_sale(id)
        .await?
        .filter(|s| s.owner_id == user.id)
        .ok_or(AppError::NotFound)
}

async fn owned_spiff(state: &AppState, user: &User, id: Uuid) -> AppResult<SpiffEntry> {
    state
        .records
        .get_spiff(id)
        .await?
        .filter(|s| s.owner_id == user.id)
        .ok_or(AppError::NotFound)
}

async fn list_sales(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(range): Query<RangeQuery>,
) -> AppResult<Json<Vec<SaleWithCommission>>> {
    let user = authenticate(&state, &headers).await?;
    let sales = state.records.query_sales(&range.for_owner(user.id)).await?;
    Ok(Json(sales.into_iter().map(with_commission).collect()))
}

async fn create_sale(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<NewSale>,
) -> AppResult<(StatusCode, Json<SaleWithCommission>)> {
    let user = authenticate(&state, &headers).await?;
    validate_sale(&request)?;
    let sale = SaleRecord {
        id: Uuid::new_v4(),
        owner_id: user.id,
        sold_on: request.sold_on,
        customer_name: request.customer_name,
        vehicle: request.vehicle,
        stock_number: request.stock_number,
        shared_from: None,
        created_at: Utc::now(),
        entry: request.entry,
    };
    let sale = state.records.insert_sale(sale).await?;
    tracing::info!(sale_id = %sale.id, owner = %user.id, "recorded sale");
    Ok((StatusCode::CREATED, Json(with_commission(sale))))
}

async fn get_sale(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SaleWithCommission>> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(with_commission(owned_sale(&state, &user, id).await?)))
}

async fn update_sale(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<NewSale>,
) -> AppResult<Json<SaleWithCommission>> {
    let user = authenticate(&state, &headers).await?;
    validate_sale(&request)?;
    let existing = owned_sale(&state, &user, id).await?;
    let updated = SaleRecord {
        sold_on: request.sold_on,
        customer_name: request.customer_name,
        vehicle: request.vehicle,
        stock_number: request.stock_number,
        entry: request.entry,
        ..existing
    };
    let updated = state.records.update_sale(updated).await?;
    Ok(Json(with_commission(updated)))
}

async fn delete_sale(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user = authenticate(&state, &headers).await?;
    owned_sale(&state, &user, id).await?;
    state.records.delete_sale(id).await?;
    tracing::info!(sale_id = %id, "deleted sale");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_spiffs(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(range): Query<RangeQuery>,
) -> AppResult<Json<Vec<SpiffEntry>>> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(
        state.records.query_spiffs(&range.for_owner(user.id)).await?,
    ))
}

async fn create_spiff(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<NewSpiff>,
) -> AppResult<(StatusCode, Json<SpiffEntry>)> {
    let user = authenticate(&state, &headers).await?;
    validate_spiff(&request)?;
    let spiff = SpiffEntry {
        id: Uuid::new_v4(),
        owner_id: user.id,
        awarded_on: request.awarded_on,
        amount: request.amount,
        description: request.description,
        proof_path: None,
        proof_url: None,
        created_at: Utc::now(),
    };
    let spiff = state.records.insert_spiff(spiff).await?;
    tracing::info!(spiff_id = %spiff.id, owner = %user.id, "recorded spiff");
    Ok((StatusCode::CREATED, Json(spiff)))
}

async fn get_spiff(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SpiffEntry>> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(owned_spiff(&state, &user, id).await?))
}

async fn update_spiff(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<NewSpiff>,
) -> AppResult<Json<SpiffEntry>> {
    let user = authenticate(&state, &headers).await?;
    validate_spiff(&request)?;
    let existing = owned_spiff(&state, &user, id).await?;
    let updated = SpiffEntry {
        awarded_on: request.awarded_on,
        amount: request.amount,
        description: request.description,
        ..existing
    };
    Ok(Json(state.records.update_spiff(updated).await?))
}

async fn delete_spiff(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user = authenticate(&state, &headers).await?;
    let spiff = owned_spiff(&state, &user, id).await?;
    state.records.delete_spiff(id).await?;
    if let Some(path) = spiff.proof_path {
        state.blobs.delete(&path).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/spiffs/:id/proof; the request body is the image.
async fn upload_proof(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<SpiffEntry>> {
    let user = authenticate(&state, &headers).await?;
    let spiff = owned_spiff(&state, &user, id).await?;
    if body.is_empty() {
        return Err(AppError::InvalidInput("proof image is empty".to_string()));
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let ext = image_extension(content_type)?;

    let path = format!("{}/{}.{ext}", user.id, spiff.id);
    state.blobs.upload(&path, &body).await?;
    if let Some(previous) = spiff.proof_path.as_deref().filter(|p| *p != path) {
        state.blobs.delete(previous).await?;
    }
    let updated = SpiffEntry {
        proof_url: Some(state.blobs.public_url(&path)),
        proof_path: Some(path),
        ..spiff
    };
    Ok(Json(state.records.update_spiff(updated).await?))
}

async fn serve_proof(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> AppResult<impl IntoResponse> {
    let bytes = state.blobs.read(&path).await?;
    let content_type = match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("png") => "image/png",
        Some("jpg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    year: i32,
    month: u32,
}

async fn stats_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<MonthlyStats>> {
    let user = authenticate(&state, &headers).await?;
    let (from, to) = month_bounds(query.year, query.month)?;
    let range = RecordQuery {
        owner_id: user.id,
        from: Some(from),
        to: Some(to),
        order: SortOrder::Asc,
    };
    let sales = state.records.query_sales(&range).await?;
    let spiffs = state.records.query_spiffs(&range).await?;
    Ok(Json(monthly_stats(query.year, query.month, &sales, &spiffs)?))
}

#[derive(Debug, Deserialize)]
struct CreateShareRequest {
    sale_id: Uuid,
    recipient_email: String,
}

async fn list_shares(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<ShareRequest>>> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(state.sharing.pending_for(&user).await))
}

async fn create_share(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<CreateShareRequest>,
) -> AppResult<(StatusCode, Json<ShareRequest>)> {
    let user = authenticate(&state, &headers).await?;
    let share = state
        .sharing
        .create_share(&user, request.sale_id, &request.recipient_email)
        .await?;
    Ok((StatusCode::CREATED, Json(share)))
}

async fn accept_share(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ShareRequest>> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(state.sharing.respond(&user, id, true).await?))
}

async fn reject_share(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ShareRequest>> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(state.sharing.respond(&user, id, false).await?))
}

async fn list_notifications(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<Notification>>> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(state.sharing.unread_notifications(&user).await))
}

async fn mark_notification_read(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user = authenticate(&state, &headers).await?;
    state.sharing.mark_read(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
