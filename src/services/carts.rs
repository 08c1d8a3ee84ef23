use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::{cart, cart_item, Cart, CartItem, Product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// One cart line priced from the live catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub stock: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartDetail {
    pub cart_id: Uuid,
    pub items: Vec<CartLine>,
    pub total: Decimal,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Each user has at most one cart; it is created lazily on first use.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let created = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        Ok(created)
    }

    /// Raw cart lines, unpriced. Checkout uses this to resolve the selection.
    #[instrument(skip(self))]
    pub async fn items(&self, user_id: Uuid) -> Result<Vec<cart_item::Model>, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&*self.db)
            .await?;
        Ok(items)
    }

    /// Cart priced from the live catalog. Lines whose product has been
    /// removed from the catalog are dropped from the view, not deleted.
    #[instrument(skip(self))]
    pub async fn get_cart_detail(&self, user_id: Uuid) -> Result<CartDetail, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&*self.db)
            .await?;

        let mut lines = Vec::with_capacity(items.len());
        let mut total = Decimal::ZERO;

        for item in items {
            let Some(product) = Product::find_by_id(item.product_id).one(&*self.db).await? else {
                continue;
            };
            let line_total = product.price * Decimal::from(item.quantity);
            total += line_total;
            lines.push(CartLine {
                product_id: product.id,
                name: product.name,
                unit_price: product.price,
                quantity: item.quantity,
                line_total,
                stock: product.stock,
            });
        }

        Ok(CartDetail {
            cart_id: cart.id,
            items: lines,
            total,
        })
    }

    /// Adds a product to the cart, merging with an existing line.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartDetail, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        let cart = self.get_or_create_cart(user_id).await?;
        let now = Utc::now();

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .one(&*self.db)
            .await?;

        match existing {
            Some(line) => {
                let merged = line.quantity + quantity;
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(merged);
                active.updated_at = Set(now);
                active.update(&*self.db).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?;
            }
        }

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: product.id,
            })
            .await;

        self.get_cart_detail(user_id).await
    }

    /// Replaces the quantity of an existing cart line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartDetail, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let cart = self.get_or_create_cart(user_id).await?;
        let line = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {product_id} is not in the cart"))
            })?;

        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: cart.id,
                product_id,
            })
            .await;

        self.get_cart_detail(user_id).await
    }

    /// Removes a line from the cart. Removing an absent line is a no-op.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartDetail, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                product_id,
            })
            .await;

        self.get_cart_detail(user_id).await
    }

    /// Clears the purchased lines after a successful payment callback.
    #[instrument(skip(self))]
    pub async fn remove_purchased(
        &self,
        user_id: Uuid,
        product_ids: &[Uuid],
    ) -> Result<(), ServiceError> {
        if product_ids.is_empty() {
            return Ok(());
        }

        let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(());
        };

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.is_in(product_ids.iter().copied()))
            .exec(&*self.db)
            .await?;

        Ok(())
    }
}
