use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::entities::{order_item, Order, OrderItem, Product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Query filters for the order history listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilters {
    pub status: Option<OrderStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    /// Matched against product names, case-insensitively.
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemView {
    pub product_id: Uuid,
    /// Name captured at checkout time.
    pub name: String,
    /// Current catalog name; populated only on the history listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_name: Option<String>,
    /// Current catalog price; populated only on the history listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Decimal>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub total_amount: Decimal,
    pub discount: Decimal,
    pub final_amount: Decimal,
    pub voucher_code: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Resolves a path reference that may be either the order's id or its
    /// gateway-facing order number.
    async fn find_by_reference(&self, reference: &str) -> Result<order::Model, ServiceError> {
        let found = if let Ok(id) = Uuid::parse_str(reference) {
            Order::find_by_id(id).one(&*self.db).await?
        } else {
            Order::find()
                .filter(order::Column::OrderNumber.eq(reference))
                .one(&*self.db)
                .await?
        };

        found.ok_or_else(|| ServiceError::NotFound(format!("Order {reference} not found")))
    }

    /// Assembles the order view. The single-order view reports pure
    /// checkout-time snapshots; the history listing additionally enriches
    /// each line with the live catalog name and price.
    async fn build_view(
        &self,
        model: order::Model,
        enrich_from_catalog: bool,
    ) -> Result<OrderView, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(model.id))
            .all(&*self.db)
            .await?;

        let mut views = Vec::with_capacity(items.len());
        for item in items {
            let live = if enrich_from_catalog {
                Product::find_by_id(item.product_id).one(&*self.db).await?
            } else {
                None
            };
            views.push(OrderItemView {
                product_id: item.product_id,
                name: item.name,
                current_name: live.as_ref().map(|p| p.name.clone()),
                current_price: live.as_ref().map(|p| p.price),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.unit_price * Decimal::from(item.quantity),
            });
        }

        Ok(OrderView {
            id: model.id,
            order_number: model.order_number,
            total_amount: model.total_amount,
            discount: model.discount,
            final_amount: model.final_amount,
            voucher_code: model.voucher_code,
            status: model.status,
            payment_status: model.payment_status,
            payment_method: model.payment_method,
            failure_reason: model.failure_reason,
            paid_at: model.paid_at,
            created_at: model.created_at,
            items: views,
        })
    }

    /// Fetches one order, enforcing ownership unless the caller is an admin.
    #[instrument(skip(self))]
    pub async fn get_order_for_user(
        &self,
        reference: &str,
        user_id: Uuid,
        is_admin: bool,
    ) -> Result<OrderView, ServiceError> {
        let model = self.find_by_reference(reference).await?;

        if !is_admin && model.user_id != user_id {
            // Do not reveal that the order exists
            return Err(ServiceError::NotFound(format!(
                "Order {reference} not found"
            )));
        }

        self.build_view(model, false).await
    }

    /// The caller's order history, newest first. Status and date filters are
    /// applied in the query; the keyword filter runs after loading because it
    /// matches against live product names.
    #[instrument(skip(self))]
    pub async fn my_orders(
        &self,
        user_id: Uuid,
        filters: OrderFilters,
    ) -> Result<Vec<OrderView>, ServiceError> {
        let mut query = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt);

        if let Some(status) = filters.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(from) = filters.from_date {
            query = query.filter(order::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filters.to_date {
            query = query.filter(order::Column::CreatedAt.lte(to));
        }

        let models = query.all(&*self.db).await?;

        let mut views = Vec::with_capacity(models.len());
        for model in models {
            views.push(self.build_view(model, true).await?);
        }

        if let Some(keyword) = filters
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
        {
            let needle = keyword.to_lowercase();
            views.retain(|view| {
                view.items.iter().any(|item| {
                    item.current_name
                        .as_deref()
                        .unwrap_or(&item.name)
                        .to_lowercase()
                        .contains(&needle)
                })
            });
        }

        Ok(views)
    }

    /// Admin status update. Fulfillment status moves only along the
    /// transition table; payment status flips are unrestricted but stamp
    /// `paid_at` on the first move to paid.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        reference: &str,
        new_status: Option<OrderStatus>,
        new_payment_status: Option<PaymentStatus>,
    ) -> Result<OrderView, ServiceError> {
        if new_status.is_none() && new_payment_status.is_none() {
            return Err(ServiceError::ValidationError(
                "nothing to update: provide status or payment_status".to_string(),
            ));
        }

        let model = self.find_by_reference(reference).await?;
        let old_status = model.status;
        let order_number = model.order_number.clone();

        // Terminal orders are closed records: neither fulfillment nor payment
        // status may change
        if old_status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "order is {} and cannot change status",
                old_status.as_str()
            )));
        }

        let mut active: order::ActiveModel = model.clone().into();

        if let Some(next) = new_status {
            if !old_status.can_transition_to(next) {
                let allowed = old_status
                    .allowed_next()
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ServiceError::InvalidOperation(format!(
                    "cannot move order from {} to {}; allowed: [{}]",
                    old_status.as_str(),
                    next.as_str(),
                    allowed
                )));
            }
            active.status = Set(next);
        }

        if let Some(payment) = new_payment_status {
            active.payment_status = Set(payment);
            if payment == PaymentStatus::Paid && model.paid_at.is_none() {
                active.paid_at = Set(Some(Utc::now()));
            }
        }

        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        if let Some(next) = new_status {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_number,
                    old_status: old_status.as_str().to_string(),
                    new_status: next.as_str().to_string(),
                })
                .await;
        }

        self.build_view(updated, false).await
    }
}
