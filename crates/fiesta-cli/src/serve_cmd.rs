use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use fiesta_core::ServiceError;
use fiesta_core::guest::{self, NewGuest};
use fiesta_core::holiday::{self, HolidayChanges, NewHoliday};
use fiesta_db::models::{Guest, Holiday, Restaurant, STATUS_PENDING};
use fiesta_db::queries::restaurants as restaurant_db;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

/// Domain and storage failures both surface as 400 with the error text.
impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        if let ServiceError::Storage(ref source) = err {
            error!(error = %format!("{source:#}"), "storage failure");
        }
        Self::bad_request(format!("{err:#}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl Pagination {
    fn validate(&self) -> Result<(i64, i64), AppError> {
        if self.skip < 0 || self.limit < 0 {
            return Err(AppError::bad_request("skip and limit must not be negative"));
        }
        Ok((self.skip, self.limit))
    }
}

#[derive(Debug, Deserialize)]
pub struct HolidayCreate {
    pub theme: String,
    pub details: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_address: Option<String>,
}

/// Absent and `null` fields are both left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct HolidayUpdate {
    pub theme: Option<String>,
    pub details: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GuestCreate {
    pub name: String,
    #[serde(default, alias = "external_id")]
    pub telegram_id: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    STATUS_PENDING.to_owned()
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(pool: PgPool) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/holidays", get(list_holidays).post(create_holiday))
        .route("/holidays/", get(list_holidays).post(create_holiday))
        .route(
            "/holidays/{id}",
            get(get_holiday).put(update_holiday).delete(delete_holiday),
        )
        .route("/holidays/{id}/guests", get(list_guests).post(add_guest))
        .route("/holidays/{id}/guests/", get(list_guests).post(add_guest))
        .route("/guests/{id}/status", patch(update_guest_status))
        .route("/guests/{id}", delete(remove_guest))
        .route("/restaurant", get(list_restaurants))
        .route("/restaurant/", get(list_restaurants))
        .layer(CorsLayer::permissive())
        .with_state(pool)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(pool: PgPool, bind: &str, port: u16) -> Result<()> {
    let app = build_router(pool);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("fiesta serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("fiesta serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Welcome to the fiesta API",
        "health": "/health",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn create_holiday(
    State(pool): State<PgPool>,
    Json(body): Json<HolidayCreate>,
) -> Result<(StatusCode, Json<Holiday>), AppError> {
    let new = NewHoliday {
        theme: &body.theme,
        details: &body.details,
        latitude: body.latitude,
        longitude: body.longitude,
        location_address: body.location_address.as_deref(),
    };
    let holiday = holiday::create_holiday(&pool, &new).await?;
    Ok((StatusCode::CREATED, Json(holiday)))
}

async fn list_holidays(
    State(pool): State<PgPool>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Holiday>>, AppError> {
    let (skip, limit) = page.validate()?;
    Ok(Json(holiday::list_holidays(&pool, skip, limit).await?))
}

async fn get_holiday(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
) -> Result<Json<Holiday>, AppError> {
    holiday::get_holiday(&pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Holiday not found"))
}

async fn update_holiday(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
    Json(body): Json<HolidayUpdate>,
) -> Result<Json<Holiday>, AppError> {
    let changes = HolidayChanges {
        theme: body.theme.as_deref(),
        details: body.details.as_deref(),
        latitude: body.latitude,
        longitude: body.longitude,
        location_address: body.location_address.as_deref(),
    };
    holiday::update_holiday(&pool, id, &changes)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Holiday not found"))
}

async fn delete_holiday(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    if holiday::delete_holiday(&pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("Holiday not found"))
    }
}

async fn add_guest(
    State(pool): State<PgPool>,
    Path(holiday_id): Path<i32>,
    Json(body): Json<GuestCreate>,
) -> Result<(StatusCode, Json<Guest>), AppError> {
    let new = NewGuest {
        name: &body.name,
        telegram_id: body.telegram_id.as_deref(),
        status: &body.status,
    };
    let guest = guest::add_guest(&pool, holiday_id, &new).await?;
    Ok((StatusCode::CREATED, Json(guest)))
}

async fn list_guests(
    State(pool): State<PgPool>,
    Path(holiday_id): Path<i32>,
) -> Result<Json<Vec<Guest>>, AppError> {
    Ok(Json(guest::list_guests(&pool, holiday_id).await?))
}

async fn update_guest_status(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<Guest>, AppError> {
    guest::update_status(&pool, id, &body.status)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Guest not found"))
}

async fn remove_guest(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    if guest::remove_guest(&pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("Guest not found"))
    }
}

async fn list_restaurants(
    State(pool): State<PgPool>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Restaurant>>, AppError> {
    let (skip, limit) = page.validate()?;
    let restaurants = restaurant_db::list_restaurants(&pool, skip, limit)
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(restaurants))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
