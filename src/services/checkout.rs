//! Checkout orchestrator: prices the selected cart lines, applies the
//! voucher, opens a gateway payment session and records the pending order.
//! The payment callback settles the order later.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    EntityTrait, QueryFilter,
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::{self, OrderStatus, PaymentStatus, VoucherSnapshot};
use crate::entities::{order_item, product, Order, OrderItem, Product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{PaymentGateway, PaymentRequest};

use super::carts::CartService;
use super::vouchers::{VoucherQuote, VoucherService};

/// Everything the client needs to continue the payment.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub order_number: String,
    pub pay_url: String,
    pub total_amount: Decimal,
    pub discount: Decimal,
    pub final_amount: Decimal,
    pub voucher: Option<VoucherQuote>,
}

/// Result of handling a gateway notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The notification settled the order.
    Processed,
    /// The order was already settled; the notification was acknowledged
    /// without side effects.
    Replay,
}

struct PricedLine {
    product_id: Uuid,
    name: String,
    unit_price: Decimal,
    quantity: i32,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    vouchers: VoucherService,
    carts: CartService,
    event_sender: Arc<EventSender>,
    /// Prefix for gateway request ids, normally the partner code.
    request_prefix: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        vouchers: VoucherService,
        carts: CartService,
        event_sender: Arc<EventSender>,
        request_prefix: String,
    ) -> Self {
        Self {
            db,
            gateway,
            vouchers,
            carts,
            event_sender,
            request_prefix,
        }
    }

    /// Resolves the selection against the cart and prices it from the live
    /// catalog, checking stock as it goes.
    async fn price_selection(
        &self,
        user_id: Uuid,
        selected: &[Uuid],
    ) -> Result<(Vec<PricedLine>, Decimal), ServiceError> {
        if selected.is_empty() {
            return Err(ServiceError::ValidationError(
                "no items selected for checkout".to_string(),
            ));
        }

        let cart_items = self.carts.items(user_id).await?;
        if cart_items.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".to_string()));
        }

        let by_product: HashMap<Uuid, i32> = cart_items
            .iter()
            .map(|item| (item.product_id, item.quantity))
            .collect();

        let mut lines = Vec::with_capacity(selected.len());
        let mut total = Decimal::ZERO;

        for product_id in selected {
            let quantity = *by_product.get(product_id).ok_or_else(|| {
                ServiceError::ValidationError(format!("Product {product_id} is not in the cart"))
            })?;

            let product = Product::find_by_id(*product_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {product_id} not found"))
                })?;

            if product.stock < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "{}: requested {}, available {}",
                    product.name, quantity, product.stock
                )));
            }

            total += product.price * Decimal::from(quantity);
            lines.push(PricedLine {
                product_id: product.id,
                name: product.name,
                unit_price: product.price,
                quantity,
            });
        }

        Ok((lines, total))
    }

    /// Runs the whole checkout. The order is persisted only after the gateway
    /// accepts the payment request, so a gateway failure leaves no trace.
    ///
    /// Stock is checked here but decremented in the callback; two concurrent
    /// checkouts can both pass the check and the later callback may drive
    /// stock below zero. Accepted for now; reservations would close the gap.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        selected: Vec<Uuid>,
        voucher_code: Option<String>,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let (lines, total) = self.price_selection(user_id, &selected).await?;

        let voucher_result = match voucher_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            Some(code) => Some(self.vouchers.validate(code, total).await?),
            None => None,
        };

        let (discount, final_amount, quote) = match &voucher_result {
            Some((_, quote)) => (quote.discount_amount, quote.final_amount, Some(quote.clone())),
            None => (Decimal::ZERO, total, None),
        };

        let millis = Utc::now().timestamp_millis();
        let order_number = format!("ORDER_{millis}");
        let request_id = format!("{}{}", self.request_prefix, millis);

        let session = self
            .gateway
            .create_payment(&PaymentRequest {
                request_id: request_id.clone(),
                order_id: order_number.clone(),
                amount: final_amount,
                order_info: "Order payment".to_string(),
                extra_data: quote.as_ref().map(|q| q.code.clone()).unwrap_or_default(),
            })
            .await?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let voucher_data = match &voucher_result {
            Some((_, quote)) => {
                let snapshot = VoucherSnapshot {
                    code: quote.code.clone(),
                    discount_type: quote.discount_type.clone(),
                    discount_value: quote.discount_value,
                    discount_amount: quote.discount_amount,
                };
                Some(serde_json::to_value(snapshot).map_err(|e| {
                    ServiceError::InternalError(format!("voucher snapshot: {e}"))
                })?)
            }
            None => None,
        };

        order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(user_id),
            total_amount: Set(total),
            discount: Set(discount),
            final_amount: Set(final_amount),
            voucher_code: Set(quote.as_ref().map(|q| q.code.clone())),
            voucher_data: Set(voucher_data),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set("momo".to_string()),
            gateway_request_id: Set(Some(request_id)),
            failure_reason: Set(None),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        for line in &lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
            }
            .insert(&*self.db)
            .await?;
        }

        if let Some((voucher, quote)) = &voucher_result {
            self.vouchers.reserve(voucher.id, &quote.code).await?;
        }

        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                order_number: order_number.clone(),
                user_id,
                final_amount,
            })
            .await;

        info!(order_number = %order_number, %final_amount, "Checkout opened");

        Ok(CheckoutOutcome {
            order_number,
            pay_url: session.pay_url,
            total_amount: total,
            discount,
            final_amount,
            voucher: quote,
        })
    }

    /// Settles an order from a gateway notification. `result_code == 0` is
    /// success; anything else is a failure. Notifications for already-settled
    /// orders are acknowledged and ignored.
    #[instrument(skip(self))]
    pub async fn handle_gateway_callback(
        &self,
        order_number: &str,
        result_code: i64,
        message: Option<String>,
    ) -> Result<CallbackOutcome, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number} not found")))?;

        if order.payment_status.is_settled() {
            warn!(order_number, "Duplicate gateway notification ignored");
            return Ok(CallbackOutcome::Replay);
        }

        if result_code == 0 {
            self.settle_paid(order).await?;
        } else {
            let reason = message.unwrap_or_else(|| format!("gateway result code {result_code}"));
            self.settle_failed(order, reason).await?;
        }

        Ok(CallbackOutcome::Processed)
    }

    async fn settle_paid(&self, order: order::Model) -> Result<(), ServiceError> {
        let paid_at = Utc::now();
        let user_id = order.user_id;
        let order_id = order.id;
        let order_number = order.order_number.clone();
        let voucher_code = order.voucher_code.clone();

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Processing);
        active.payment_status = Set(PaymentStatus::Paid);
        active.paid_at = Set(Some(paid_at));
        active.updated_at = Set(paid_at);
        active.update(&*self.db).await?;

        // Stock was checked at checkout; the decrement here is unconditional
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        let mut product_ids = Vec::with_capacity(items.len());
        for item in &items {
            Product::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(item.quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(product::Column::Id.eq(item.product_id))
                .exec(&*self.db)
                .await?;
            product_ids.push(item.product_id);
        }

        self.carts.remove_purchased(user_id, &product_ids).await?;

        if let Some(code) = voucher_code {
            if let Some(voucher) = self.vouchers.find_by_code(&code).await? {
                self.vouchers.commit_usage(voucher.id, &code).await?;
            }
        }

        self.event_sender
            .send_or_log(Event::OrderPaid {
                order_number,
                paid_at,
            })
            .await;

        Ok(())
    }

    async fn settle_failed(
        &self,
        order: order::Model,
        reason: String,
    ) -> Result<(), ServiceError> {
        let order_number = order.order_number.clone();
        let voucher_code = order.voucher_code.clone();

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Failed);
        active.payment_status = Set(PaymentStatus::Failed);
        active.failure_reason = Set(Some(reason.clone()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        if let Some(code) = voucher_code {
            if let Some(voucher) = self.vouchers.find_by_code(&code).await? {
                self.vouchers.release_hold(voucher.id, &code).await?;
            }
        }

        self.event_sender
            .send_or_log(Event::PaymentFailed {
                order_number,
                reason,
            })
            .await;

        Ok(())
    }
}
