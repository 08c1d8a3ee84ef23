use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::AppState;

use super::common::{success_response, validate_input};

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:product_id", put(update_item).delete(remove_item))
}

async fn get_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.get_cart_detail(user.user_id).await?;
    Ok(success_response(cart))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

async fn add_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .carts
        .add_item(user.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(success_response(cart))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

async fn update_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .carts
        .update_item_quantity(user.user_id, product_id, payload.quantity)
        .await?;
    Ok(success_response(cart))
}

async fn remove_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .carts
        .remove_item(user.user_id, product_id)
        .await?;
    Ok(success_response(cart))
}
