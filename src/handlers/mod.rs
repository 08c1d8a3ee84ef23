pub mod carts;
pub mod common;
pub mod orders;
pub mod payments;

use std::sync::Arc;

use axum::Router;
use sea_orm::DatabaseConnection;

use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::services::{CartService, CheckoutService, OrderService, VoucherService};
use crate::AppState;

/// Service container handed to every handler through [`AppState`].
#[derive(Clone)]
pub struct AppServices {
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub vouchers: VoucherService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        request_prefix: String,
    ) -> Self {
        let carts = CartService::new(db.clone(), event_sender.clone());
        let vouchers = VoucherService::new(db.clone(), event_sender.clone());
        let orders = OrderService::new(db.clone(), event_sender.clone());
        let checkout = CheckoutService::new(
            db,
            gateway,
            vouchers.clone(),
            carts.clone(),
            event_sender,
            request_prefix,
        );

        Self {
            carts,
            checkout,
            orders,
            vouchers,
        }
    }
}

/// The versioned API surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/payments", payments::payment_routes())
        .nest("/orders", orders::order_routes())
        .nest("/carts", carts::cart_routes())
}
