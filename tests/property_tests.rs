//! Property-based tests for the pricing and delivery-fee algebra.
//!
//! These verify the invariants across a wide range of inputs rather than
//! fixed scenarios: subtotal shape, discount caps, non-negative totals, and
//! the exact free-delivery rule.

use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use checkout_core::models::{AppliedCoupon, CartLine, DeliverySettings, DiscountKind};
use checkout_core::services::pricing::{compute_totals, discount_for};
use checkout_core::services::resolve_delivery_fee;

fn money_strategy() -> impl Strategy<Value = Decimal> {
    // Two-decimal amounts up to 10_000.00
    (0i64..1_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn line_strategy() -> impl Strategy<Value = CartLine> {
    (money_strategy(), 1i32..50)
        .prop_map(|(unit_price, quantity)| CartLine::new(Uuid::new_v4(), quantity, unit_price))
}

fn cart_strategy() -> impl Strategy<Value = Vec<CartLine>> {
    prop::collection::vec(line_strategy(), 0..12)
}

fn fixed_coupon(value: Decimal, cap: Option<Decimal>) -> AppliedCoupon {
    AppliedCoupon {
        code: "FIXED".to_string(),
        discount_kind: DiscountKind::Fixed,
        discount_value: value,
        min_purchase_amount: None,
        max_discount_amount: cap,
        display: String::new(),
    }
}

fn percent_coupon(value: Decimal, cap: Option<Decimal>) -> AppliedCoupon {
    AppliedCoupon {
        code: "PCT".to_string(),
        discount_kind: DiscountKind::Percent,
        discount_value: value,
        min_purchase_amount: None,
        max_discount_amount: cap,
        display: String::new(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn subtotal_is_sum_of_line_totals_and_never_negative(lines in cart_strategy()) {
        let totals = compute_totals(&lines, None);

        let expected: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();
        prop_assert_eq!(totals.subtotal, expected);
        prop_assert!(totals.subtotal >= Decimal::ZERO);

        let expected_count: i32 = lines.iter().map(|l| l.quantity).sum();
        prop_assert_eq!(totals.item_count, expected_count);
    }

    #[test]
    fn fixed_discount_is_min_of_value_and_subtotal(
        lines in cart_strategy(),
        value in money_strategy(),
    ) {
        let coupon = fixed_coupon(value, None);
        let totals = compute_totals(&lines, Some(&coupon));

        prop_assert_eq!(totals.discount_amount, value.min(totals.subtotal));
        prop_assert!(totals.discount_amount <= totals.subtotal);
    }

    #[test]
    fn capped_percent_discount_is_min_of_pct_amount_and_cap(
        lines in cart_strategy(),
        pct in (1i64..100).prop_map(Decimal::from),
        cap in money_strategy(),
    ) {
        let coupon = percent_coupon(pct, Some(cap));
        let totals = compute_totals(&lines, Some(&coupon));

        let raw = totals.subtotal * pct / Decimal::from(100);
        prop_assert_eq!(totals.discount_amount, raw.min(cap));
    }

    #[test]
    fn discounted_subtotal_never_negative(
        lines in cart_strategy(),
        value in money_strategy(),
        percent in prop::bool::ANY,
    ) {
        let coupon = if percent {
            percent_coupon(value.min(Decimal::from(100)), None)
        } else {
            fixed_coupon(value, None)
        };
        let totals = compute_totals(&lines, Some(&coupon));

        prop_assert!(totals.discounted_subtotal >= Decimal::ZERO);
        prop_assert_eq!(
            totals.discounted_subtotal,
            (totals.subtotal - totals.discount_amount).max(Decimal::ZERO)
        );
    }

    #[test]
    fn discount_never_negative_standalone(
        value in money_strategy(),
        subtotal in money_strategy(),
        cap in proptest::option::of(money_strategy()),
    ) {
        let coupon = fixed_coupon(value, cap);
        prop_assert!(discount_for(&coupon, subtotal) >= Decimal::ZERO);
    }

    #[test]
    fn fee_is_free_exactly_when_rule_holds(
        base_fee in money_strategy(),
        enabled in prop::bool::ANY,
        threshold in proptest::option::of(money_strategy()),
        subtotal in money_strategy(),
    ) {
        let settings = DeliverySettings {
            base_fee,
            free_delivery_enabled: enabled,
            free_delivery_threshold: threshold,
        };
        let resolved = resolve_delivery_fee(&settings, subtotal);

        let expected_free = enabled && threshold.map(|t| subtotal >= t).unwrap_or(false);
        prop_assert_eq!(resolved.is_free, expected_free);
        if expected_free {
            prop_assert_eq!(resolved.fee, Decimal::ZERO);
        } else {
            prop_assert_eq!(resolved.fee, base_fee);
        }
    }
}
