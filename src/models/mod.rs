use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Synchronization state of a cart line against the remote store.
///
/// A line is `PendingWrite` from the moment a local mutation is applied until
/// the remote write is acknowledged. Order placement only ever reads
/// `Confirmed` lines, so an order is never created against an unconfirmed
/// mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LineSync {
    PendingWrite,
    #[default]
    Confirmed,
}

/// A single cart line: a product reference, a quantity, and the unit price
/// snapshotted when the product was added. Prices are never silently
/// re-fetched after that point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub sync: LineSync,
}

impl CartLine {
    pub fn new(product_id: Uuid, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            quantity,
            unit_price,
            sync: LineSync::PendingWrite,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Kind of discount a coupon grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percent,
    Fixed,
}

/// A coupon record as held by the remote coupon authority.
///
/// Read-only from this crate; expiry, total usage limit, and per-user
/// one-time-use are all enforced server-side in a single atomic check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_value: Decimal,
    pub min_purchase_amount: Option<Decimal>,
    pub max_discount_amount: Option<Decimal>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub applicable_product_ids: Option<Vec<Uuid>>,
    pub applicable_category_ids: Option<Vec<Uuid>>,
}

/// Denormalized snapshot of a successfully validated coupon.
///
/// Held in session state only. Discarded on explicit removal, on a cart
/// mutation that invalidates eligibility, or after order placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_value: Decimal,
    pub min_purchase_amount: Option<Decimal>,
    pub max_discount_amount: Option<Decimal>,
    pub display: String,
}

impl AppliedCoupon {
    pub fn from_coupon(coupon: &Coupon) -> Self {
        let display = match coupon.discount_kind {
            DiscountKind::Percent => format!("{}% off", coupon.discount_value.normalize()),
            DiscountKind::Fixed => format!("{} off", coupon.discount_value.normalize()),
        };
        Self {
            code: coupon.code.clone(),
            discount_kind: coupon.discount_kind,
            discount_value: coupon.discount_value,
            min_purchase_amount: coupon.min_purchase_amount,
            max_discount_amount: coupon.max_discount_amount,
            display,
        }
    }
}

/// Delivery fee configuration fetched from the remote settings store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySettings {
    pub base_fee: Decimal,
    pub free_delivery_enabled: bool,
    pub free_delivery_threshold: Option<Decimal>,
}

/// How the order should be delivered. A scheduled delivery must carry a
/// selected slot before checkout can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryOption {
    Asap,
    Scheduled { slot: Option<DateTime<Utc>> },
}

/// Initial status of every order created by this crate. Later transitions
/// belong to order fulfillment, outside this core.
pub const ORDER_STATUS_PENDING: &str = "pending";

/// An order row. Created exactly once per successful checkout and immutable
/// from this crate's perspective afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub delivery_address_id: Uuid,
    /// `None` iff the order is cash-on-delivery.
    pub payment_method_id: Option<Uuid>,
    pub status: String,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub delivery_fee: Decimal,
    pub total_amount: Decimal,
    pub applied_coupon_code: Option<String>,
    pub is_cash_on_delivery: bool,
    pub estimated_delivery: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// An order line, one per cart line present at placement time, carrying the
/// unit price exactly as captured in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}
