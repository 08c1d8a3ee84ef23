#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection};
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::db::{ensure_schema, establish_connection_with_config, DbConfig};
use storefront_api::entities::voucher::DiscountType;
use storefront_api::entities::{cart, cart_item, product, voucher};
use storefront_api::errors::ServiceError;
use storefront_api::events::{Event, EventSender};
use storefront_api::gateway::{PaymentGateway, PaymentRequest, PaymentSession};
use storefront_api::handlers::AppServices;

/// Gateway stub that accepts every payment request.
pub struct FakeGateway;

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentSession, ServiceError> {
        Ok(PaymentSession {
            pay_url: format!("https://pay.test/{}", request.order_id),
        })
    }
}

/// Gateway stub that refuses every payment request.
pub struct RefusingGateway;

#[async_trait]
impl PaymentGateway for RefusingGateway {
    async fn create_payment(
        &self,
        _request: &PaymentRequest,
    ) -> Result<PaymentSession, ServiceError> {
        Err(ServiceError::ExternalServiceError(
            "payment gateway refused the request (code 99): declined".to_string(),
        ))
    }
}

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub events: mpsc::Receiver<Event>,
}

/// Fresh in-memory database with the schema applied and services wired to
/// the given gateway stub. A single pooled connection keeps the in-memory
/// database shared.
pub async fn setup_with_gateway(gateway: Arc<dyn PaymentGateway>) -> TestApp {
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let db = establish_connection_with_config(&config)
        .await
        .expect("connect to in-memory sqlite");
    ensure_schema(&db).await.expect("create schema");
    let db = Arc::new(db);

    let (tx, events) = mpsc::channel(64);
    let event_sender = Arc::new(EventSender::new(tx));

    let services = AppServices::new(db.clone(), gateway, event_sender, "MOMO".to_string());

    TestApp {
        db,
        services,
        events,
    }
}

pub async fn setup() -> TestApp {
    setup_with_gateway(Arc::new(FakeGateway)).await
}

pub async fn seed_product(
    db: &DatabaseConnection,
    name: &str,
    price: Decimal,
    stock: i32,
) -> product::Model {
    let now = Utc::now();
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        price: Set(price),
        stock: Set(stock),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert product")
}

pub async fn seed_voucher(
    db: &DatabaseConnection,
    code: &str,
    discount_type: DiscountType,
    discount_value: Decimal,
    min_order_value: Decimal,
    max_discount: Decimal,
    quantity: i32,
) -> voucher::Model {
    let now = Utc::now();
    voucher::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        description: Set(None),
        discount_type: Set(discount_type),
        discount_value: Set(discount_value),
        min_order_value: Set(min_order_value),
        max_discount: Set(max_discount),
        start_date: Set(Some(now - Duration::days(1))),
        end_date: Set(Some(now + Duration::days(30))),
        quantity: Set(quantity),
        usage_limit: Set(1),
        active: Set(true),
        used_count: Set(0),
        temp_reserved: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert voucher")
}

pub async fn seed_cart_with_item(
    db: &DatabaseConnection,
    user_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> cart::Model {
    let now = Utc::now();
    let cart = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert cart");

    cart_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        cart_id: Set(cart.id),
        product_id: Set(product_id),
        quantity: Set(quantity),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert cart item");

    cart
}
