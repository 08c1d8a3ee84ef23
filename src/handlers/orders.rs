use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::entities::order::{OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::services::orders::OrderFilters;
use crate::AppState;

use super::common::success_response;

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/my-orders", get(my_orders))
        .route("/:order_id", get(get_order))
        .route("/:order_id/status", patch(update_order_status))
}

async fn my_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filters): Query<OrderFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.my_orders(user.user_id, filters).await?;
    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get_order_for_user(&order_id, user.user_id, user.is_admin())
        .await?;
    Ok(success_response(order))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

/// Admin-only fulfillment and payment status transitions.
async fn update_order_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<String>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;

    let order = state
        .services
        .orders
        .update_status(&order_id, payload.status, payload.payment_status)
        .await?;

    Ok(success_response(order))
}
