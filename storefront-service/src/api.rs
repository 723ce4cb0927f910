use std::sync::Arc;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use shared::*;
use uuid::Uuid;
use crate::addresses::AddressStore;
use crate::health::{HealthProbe, HealthReport};
use crate::sweeper::DeliverySweeper;

/// Set by the authenticating gateway in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub sweeper: DeliverySweeper,
    pub addresses: Arc<dyn AddressStore>,
    pub health: Arc<dyn HealthProbe>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

fn internal_error(context: &str, e: anyhow::Error) -> ApiError {
    tracing::error!("{}: {}", context, e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{}: {}", context, e))
}

fn address_not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "Address not found")
}

/// Caller identity forwarded by the gateway.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(AuthUser)
            .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Authentication required"))
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/addresses", get(list_addresses).post(create_address))
        .route(
            "/addresses/:id",
            get(get_address).put(update_address).delete(delete_address),
        )
        .route("/admin/auto-delivery/run", post(run_auto_delivery))
        .route("/admin/auto-delivery/stats", get(auto_delivery_stats))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health.probe().await;
    let status = if report.connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn list_addresses(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Address>>, ApiError> {
    state
        .addresses
        .list(user_id)
        .await
        .map(Json)
        .map_err(|e| internal_error("Failed to list addresses", e))
}

pub async fn get_address(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Address>, ApiError> {
    match state.addresses.get(user_id, id).await {
        Ok(Some(address)) => Ok(Json(address)),
        Ok(None) => Err(address_not_found()),
        Err(e) => Err(internal_error("Failed to load address", e)),
    }
}

pub async fn create_address(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<NewAddress>,
) -> Result<(StatusCode, Json<Address>), ApiError> {
    request
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let address = state
        .addresses
        .create(user_id, request)
        .await
        .map_err(|e| internal_error("Failed to create address", e))?;

    tracing::info!("Created address {} for user {}", address.id, user_id);
    Ok((StatusCode::CREATED, Json(address)))
}

pub async fn update_address(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AddressChanges>,
) -> Result<Json<Address>, ApiError> {
    request
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    match state.addresses.update(user_id, id, request).await {
        Ok(Some(address)) => Ok(Json(address)),
        Ok(None) => Err(address_not_found()),
        Err(e) => Err(internal_error("Failed to update address", e)),
    }
}

pub async fn delete_address(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    match state.addresses.delete(user_id, id).await {
        Ok(true) => {
            tracing::info!("Deleted address {} for user {}", id, user_id);
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(address_not_found()),
        Err(e) => Err(internal_error("Failed to delete address", e)),
    }
}

pub async fn run_auto_delivery(State(state): State<AppState>) -> Json<SweepReport> {
    Json(state.sweeper.sweep().await)
}

pub async fn auto_delivery_stats(State(state): State<AppState>) -> Json<DeliveryStats> {
    Json(state.sweeper.stats().await)
}
