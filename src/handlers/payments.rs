use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::AppState;

use super::common::{success_response, validate_input, ApiResponse};

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/validate-voucher", post(validate_voucher))
        .route("/momo/callback", post(momo_callback))
        .route("/momo/redirect", get(momo_redirect))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    /// Product ids picked from the cart for this order.
    #[validate(length(min = 1, message = "select at least one item"))]
    pub selected_items: Vec<Uuid>,
    pub voucher_code: Option<String>,
}

async fn checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let outcome = state
        .services
        .checkout
        .checkout(user.user_id, payload.selected_items, payload.voucher_code)
        .await?;

    Ok(success_response(outcome))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateVoucherRequest {
    #[validate(length(min = 1))]
    pub code: String,
    pub order_total: Decimal,
}

async fn validate_voucher(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(payload): Json<ValidateVoucherRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let (_, quote) = state
        .services
        .vouchers
        .validate(&payload.code, payload.order_total)
        .await?;

    Ok(success_response(quote))
}

/// Server-to-server notification (IPN) from the wallet gateway.
#[derive(Debug, Deserialize)]
pub struct MomoCallback {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "resultCode")]
    pub result_code: i64,
    #[serde(default)]
    pub message: Option<String>,
}

/// The gateway retries on non-200, so this endpoint acknowledges every
/// notification it can parse; failures are reported in the body only.
async fn momo_callback(
    State(state): State<AppState>,
    Json(payload): Json<MomoCallback>,
) -> Json<ApiResponse<()>> {
    info!(order_id = %payload.order_id, result_code = payload.result_code, "Gateway notification received");

    match state
        .services
        .checkout
        .handle_gateway_callback(&payload.order_id, payload.result_code, payload.message)
        .await
    {
        Ok(_) => Json(ApiResponse::message("notification processed")),
        Err(e) => {
            error!(order_id = %payload.order_id, "Gateway notification failed: {}", e);
            Json(ApiResponse {
                success: false,
                data: None,
                message: Some(e.response_message()),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MomoRedirectQuery {
    #[serde(rename = "orderId", default)]
    pub order_id: Option<String>,
    #[serde(rename = "resultCode", default)]
    pub result_code: Option<i64>,
}

/// Browser return leg. Settlement happens through the IPN; this only routes
/// the customer back to the storefront with the outcome in the query string.
async fn momo_redirect(
    State(state): State<AppState>,
    Query(query): Query<MomoRedirectQuery>,
) -> Redirect {
    let payment = match query.result_code {
        Some(0) => "success",
        _ => "error",
    };
    let order_id = query.order_id.unwrap_or_default();

    let target = format!(
        "{}/payment-result?orderId={}&payment={}",
        state.config.frontend_url.trim_end_matches('/'),
        order_id,
        payment
    );

    Redirect::to(&target)
}
