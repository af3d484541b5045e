use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::{OrderId, OrderStatus, ShopError, UserId};
use std::sync::Arc;

use crate::models::{CreateOrderRequest, Order};
use crate::workflow::OrderWorkflow;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<OrderWorkflow>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    Shop(ShopError),
    MissingUser,
}

impl From<ShopError> for ApiError {
    fn from(err: ShopError) -> Self {
        ApiError::Shop(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::MissingUser => (
                StatusCode::UNAUTHORIZED,
                format!("missing or invalid {} header", USER_ID_HEADER),
            ),
            ApiError::Shop(err) => {
                let status = match &err {
                    ShopError::NotFound { .. } => StatusCode::NOT_FOUND,
                    ShopError::InvalidArgument(_) | ShopError::InvalidTransition { .. } => {
                        StatusCode::BAD_REQUEST
                    }
                    ShopError::InsufficientStock { .. } | ShopError::Conflict { .. } => {
                        StatusCode::CONFLICT
                    }
                };
                (status, err.to_string())
            }
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// The already-authenticated caller, as forwarded by the gateway.
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .map(CurrentUser)
            .ok_or(ApiError::MissingUser)
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/orders", post(create_order).get(list_my_orders))
        .route("/api/orders/admin/all", get(list_all_orders))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/status", put(update_order_status))
        .route("/api/orders/:id/cancel", post(cancel_order))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.workflow.create_order(user_id, request)?;
    tracing::info!("Order created: {} for user {}", order.id, user_id);
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_my_orders(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Json<Vec<Order>> {
    Json(state.workflow.list_orders_for_user(user_id))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.workflow.get_order(id)?))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<StatusCode, ApiError> {
    let status: OrderStatus = request.status.parse()?;
    state.workflow.update_order_status(id, status)?;
    tracing::info!("Order {} status updated to {}", id, status);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.workflow.cancel_order(id)?))
}

pub async fn list_all_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderPage>, ApiError> {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(20);
    let (orders, total_count) = state.workflow.list_all_orders(page, page_size)?;

    Ok(Json(OrderPage {
        orders,
        total_count,
        page,
        page_size,
    }))
}

pub async fn health_check() -> &'static str {
    "OK"
}
