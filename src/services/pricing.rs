//! Pure pricing computation. No I/O, no suspension; recomputed on every cart
//! or coupon change rather than cached.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{AppliedCoupon, CartLine, DiscountKind};

/// Totals derived from a cart snapshot and an optional applied coupon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub discounted_subtotal: Decimal,
    pub item_count: i32,
}

impl CartTotals {
    pub fn empty() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            discounted_subtotal: Decimal::ZERO,
            item_count: 0,
        }
    }
}

/// Discount a coupon grants against a subtotal.
///
/// Fixed discounts are capped at the subtotal so the total can never go
/// negative; percent discounts are `subtotal * value / 100`. An optional
/// `max_discount_amount` caps either kind.
pub fn discount_for(coupon: &AppliedCoupon, subtotal: Decimal) -> Decimal {
    let discount = match coupon.discount_kind {
        DiscountKind::Fixed => coupon.discount_value.min(subtotal),
        DiscountKind::Percent => subtotal * coupon.discount_value / Decimal::from(100),
    };

    let capped = match coupon.max_discount_amount {
        Some(cap) => discount.min(cap),
        None => discount,
    };

    capped.max(Decimal::ZERO)
}

/// Computes subtotal, discount, discounted subtotal, and item count from the
/// given lines and optionally applied coupon.
pub fn compute_totals(lines: &[CartLine], coupon: Option<&AppliedCoupon>) -> CartTotals {
    let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
    let item_count: i32 = lines.iter().map(|l| l.quantity).sum();

    let discount_amount = coupon
        .map(|c| discount_for(c, subtotal))
        .unwrap_or(Decimal::ZERO);

    CartTotals {
        subtotal,
        discount_amount,
        discounted_subtotal: (subtotal - discount_amount).max(Decimal::ZERO),
        item_count,
    }
}
