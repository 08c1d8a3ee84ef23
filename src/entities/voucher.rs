use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discount code. `used_count` tracks confirmed redemptions; `temp_reserved`
/// counts holds placed by in-flight checkouts that have not settled yet.
/// Invariants: `used_count <= quantity` when `quantity > 0`, and
/// `temp_reserved >= 0` at all times.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Stored upper-cased; lookups normalize before comparing.
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub discount_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub min_order_value: Decimal,
    /// Cap for percent discounts; zero means uncapped.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub max_discount: Decimal,
    #[sea_orm(nullable)]
    pub start_date: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub end_date: Option<DateTime<Utc>>,
    /// Total redemptions allowed; zero means unlimited.
    pub quantity: i32,
    /// Per-user limit declared by the catalog; not enforced anywhere yet.
    pub usage_limit: i32,
    pub active: bool,
    pub used_count: i32,
    pub temp_reserved: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[sea_orm(string_value = "percent")]
    Percent,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

impl DiscountType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Percent => "percent",
            Self::Fixed => "fixed",
        }
    }
}
