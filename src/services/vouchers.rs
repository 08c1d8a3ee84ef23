use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::voucher::{self, DiscountType};
use crate::entities::Voucher;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Why a voucher cannot be applied. Checks run in this order; the first
/// failure wins.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VoucherRejection {
    #[error("Voucher is not active")]
    Inactive,
    #[error("Voucher is not yet valid")]
    NotStarted,
    #[error("Voucher has expired")]
    Expired,
    #[error("Voucher has been fully redeemed")]
    Exhausted,
    #[error("Order total must be at least {min} to use this voucher")]
    MinOrderNotMet { min: Decimal },
}

/// Priced outcome of applying a voucher to an order total. Carries the terms
/// that produced the numbers so callers can snapshot them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoucherQuote {
    pub code: String,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub max_discount: Decimal,
    pub quantity: i32,
    pub used_count: i32,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
}

/// Pure evaluation of a voucher against an order total at a point in time.
/// No store access; the service wraps this with lookup and counter updates.
pub fn quote(
    voucher: &voucher::Model,
    order_total: Decimal,
    now: DateTime<Utc>,
) -> Result<VoucherQuote, VoucherRejection> {
    if !voucher.active {
        return Err(VoucherRejection::Inactive);
    }
    if let Some(start) = voucher.start_date {
        if now < start {
            return Err(VoucherRejection::NotStarted);
        }
    }
    if let Some(end) = voucher.end_date {
        if now > end {
            return Err(VoucherRejection::Expired);
        }
    }
    // quantity == 0 means unlimited; holds count against the budget
    if voucher.quantity > 0 && voucher.used_count + voucher.temp_reserved >= voucher.quantity {
        return Err(VoucherRejection::Exhausted);
    }
    if order_total < voucher.min_order_value {
        return Err(VoucherRejection::MinOrderNotMet {
            min: voucher.min_order_value,
        });
    }

    let mut discount = match voucher.discount_type {
        DiscountType::Percent => {
            let raw = order_total * voucher.discount_value / Decimal::ONE_HUNDRED;
            if voucher.max_discount > Decimal::ZERO && raw > voucher.max_discount {
                voucher.max_discount
            } else {
                raw
            }
        }
        DiscountType::Fixed => voucher.discount_value,
    };

    // A discount never exceeds the total; the final amount never goes negative
    if discount > order_total {
        discount = order_total;
    }

    Ok(VoucherQuote {
        code: voucher.code.clone(),
        discount_type: voucher.discount_type.as_str().to_string(),
        discount_value: voucher.discount_value,
        max_discount: voucher.max_discount,
        quantity: voucher.quantity,
        used_count: voucher.used_count,
        discount_amount: discount,
        final_amount: order_total - discount,
    })
}

#[derive(Clone)]
pub struct VoucherService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl VoucherService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Looks up a voucher by code, case-insensitively. Codes are stored
    /// upper-cased.
    #[instrument(skip(self))]
    pub async fn find_by_code(&self, code: &str) -> Result<Option<voucher::Model>, ServiceError> {
        let normalized = code.trim().to_uppercase();
        let found = Voucher::find()
            .filter(voucher::Column::Code.eq(normalized))
            .one(&*self.db)
            .await?;
        Ok(found)
    }

    /// Resolves a code and prices it against the given total.
    ///
    /// Unknown codes map to 404; every other rejection is a 400 carrying the
    /// rejection message verbatim.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        order_total: Decimal,
    ) -> Result<(voucher::Model, VoucherQuote), ServiceError> {
        let voucher = self
            .find_by_code(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Voucher {} not found", code.trim().to_uppercase())))?;

        let quote = quote(&voucher, order_total, Utc::now())
            .map_err(|rejection| ServiceError::ValidationError(rejection.to_string()))?;

        Ok((voucher, quote))
    }

    /// Places a hold for an in-flight checkout: `temp_reserved += 1`.
    #[instrument(skip(self))]
    pub async fn reserve(&self, voucher_id: Uuid, code: &str) -> Result<(), ServiceError> {
        Voucher::update_many()
            .col_expr(
                voucher::Column::TempReserved,
                Expr::col(voucher::Column::TempReserved).add(1),
            )
            .col_expr(voucher::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(voucher::Column::Id.eq(voucher_id))
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::VoucherReserved { code: code.to_string() })
            .await;
        Ok(())
    }

    /// Converts a hold into a redemption on successful payment:
    /// `used_count += 1`, `temp_reserved -= 1`. The decrement is guarded so a
    /// replayed or unmatched callback cannot drive `temp_reserved` negative;
    /// if no hold remains, only the redemption is counted.
    #[instrument(skip(self))]
    pub async fn commit_usage(&self, voucher_id: Uuid, code: &str) -> Result<(), ServiceError> {
        let result = Voucher::update_many()
            .col_expr(
                voucher::Column::UsedCount,
                Expr::col(voucher::Column::UsedCount).add(1),
            )
            .col_expr(
                voucher::Column::TempReserved,
                Expr::col(voucher::Column::TempReserved).sub(1),
            )
            .col_expr(voucher::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(voucher::Column::Id.eq(voucher_id))
            .filter(voucher::Column::TempReserved.gt(0))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            Voucher::update_many()
                .col_expr(
                    voucher::Column::UsedCount,
                    Expr::col(voucher::Column::UsedCount).add(1),
                )
                .col_expr(voucher::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(voucher::Column::Id.eq(voucher_id))
                .exec(&*self.db)
                .await?;
        }

        self.event_sender
            .send_or_log(Event::VoucherRedeemed { code: code.to_string() })
            .await;
        Ok(())
    }

    /// Releases a hold on failed payment: `temp_reserved -= 1`, guarded
    /// against going negative.
    #[instrument(skip(self))]
    pub async fn release_hold(&self, voucher_id: Uuid, code: &str) -> Result<(), ServiceError> {
        Voucher::update_many()
            .col_expr(
                voucher::Column::TempReserved,
                Expr::col(voucher::Column::TempReserved).sub(1),
            )
            .col_expr(voucher::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(voucher::Column::Id.eq(voucher_id))
            .filter(voucher::Column::TempReserved.gt(0))
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::VoucherReleased { code: code.to_string() })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn sample_voucher() -> voucher::Model {
        let now = Utc::now();
        voucher::Model {
            id: Uuid::new_v4(),
            code: "SALE10".into(),
            description: None,
            discount_type: DiscountType::Percent,
            discount_value: dec!(10),
            min_order_value: dec!(100000),
            max_discount: Decimal::ZERO,
            start_date: Some(now - Duration::days(1)),
            end_date: Some(now + Duration::days(1)),
            quantity: 100,
            usage_limit: 1,
            active: true,
            used_count: 0,
            temp_reserved: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn percent_discount_uncapped() {
        let q = quote(&sample_voucher(), dec!(500000), Utc::now()).unwrap();
        assert_eq!(q.discount_amount, dec!(50000));
        assert_eq!(q.final_amount, dec!(450000));
    }

    #[test]
    fn percent_discount_capped() {
        let mut v = sample_voucher();
        v.max_discount = dec!(30000);
        let q = quote(&v, dec!(500000), Utc::now()).unwrap();
        assert_eq!(q.discount_amount, dec!(30000));
        assert_eq!(q.final_amount, dec!(470000));
    }

    #[test]
    fn fixed_discount_clamped_to_total() {
        let mut v = sample_voucher();
        v.discount_type = DiscountType::Fixed;
        v.discount_value = dec!(200000);
        v.min_order_value = Decimal::ZERO;

        let q = quote(&v, dec!(150000), Utc::now()).unwrap();
        assert_eq!(q.discount_amount, dec!(150000));
        assert_eq!(q.final_amount, Decimal::ZERO);
    }

    #[test]
    fn min_order_not_met() {
        let err = quote(&sample_voucher(), dec!(99999), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            VoucherRejection::MinOrderNotMet { min: dec!(100000) }
        );
    }

    #[test]
    fn inactive_wins_over_other_checks() {
        let mut v = sample_voucher();
        v.active = false;
        v.end_date = Some(Utc::now() - Duration::days(1));
        assert_eq!(
            quote(&v, dec!(500000), Utc::now()).unwrap_err(),
            VoucherRejection::Inactive
        );
    }

    #[test]
    fn not_yet_started() {
        let mut v = sample_voucher();
        v.start_date = Some(Utc::now() + Duration::days(1));
        assert_eq!(
            quote(&v, dec!(500000), Utc::now()).unwrap_err(),
            VoucherRejection::NotStarted
        );
    }

    #[test]
    fn expired() {
        let mut v = sample_voucher();
        v.end_date = Some(Utc::now() - Duration::hours(1));
        assert_eq!(
            quote(&v, dec!(500000), Utc::now()).unwrap_err(),
            VoucherRejection::Expired
        );
    }

    #[test]
    fn exhausted_counts_holds_against_budget() {
        let mut v = sample_voucher();
        v.quantity = 10;
        v.used_count = 8;
        v.temp_reserved = 2;
        assert_eq!(
            quote(&v, dec!(500000), Utc::now()).unwrap_err(),
            VoucherRejection::Exhausted
        );
    }

    #[test]
    fn zero_quantity_means_unlimited() {
        let mut v = sample_voucher();
        v.quantity = 0;
        v.used_count = 1_000_000;
        assert!(quote(&v, dec!(500000), Utc::now()).is_ok());
    }

    #[test]
    fn quote_carries_the_voucher_terms() {
        let mut v = sample_voucher();
        v.max_discount = dec!(30000);
        v.used_count = 7;

        let q = quote(&v, dec!(500000), Utc::now()).unwrap();
        assert_eq!(q.code, "SALE10");
        assert_eq!(q.discount_type, "percent");
        assert_eq!(q.discount_value, dec!(10));
        assert_eq!(q.max_discount, dec!(30000));
        assert_eq!(q.quantity, 100);
        assert_eq!(q.used_count, 7);
    }

    #[test]
    fn quote_is_pure() {
        let v = sample_voucher();
        let now = Utc::now();
        assert_eq!(quote(&v, dec!(500000), now), quote(&v, dec!(500000), now));
    }
}
