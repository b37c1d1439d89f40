use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Checkout screen section an error is routed back to, so the UI can scroll
/// and focus the part that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSection {
    Address,
    Payment,
    Delivery,
    Coupon,
    Order,
    Generic,
}

/// Checkout requirement that a readiness validation can flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutField {
    DeliveryAddress,
    PaymentMethod,
    DeliverySlot,
    Cart,
}

/// A single field-scoped readiness violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub section: ErrorSection,
    pub field: CheckoutField,
    pub message: String,
}

impl FieldError {
    pub fn new(section: ErrorSection, field: CheckoutField, message: impl Into<String>) -> Self {
        Self {
            section,
            field,
            message: message.into(),
        }
    }
}

/// Coupon validation failures, in the order the rules are evaluated.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum CouponError {
    #[error("Coupon code is empty")]
    EmptyCode,

    /// The remote authority rejected the code; carries the server-provided
    /// reason (unknown, expired, usage limit reached, already used).
    #[error("Coupon rejected: {0}")]
    Invalid(String),

    /// The live cart subtotal is below the coupon's minimum purchase amount.
    /// `shortfall` is exactly how much more the user must add.
    #[error("Minimum purchase of {minimum} not met; add {shortfall} more")]
    BelowMinimumPurchase { minimum: Decimal, shortfall: Decimal },
}

/// Error taxonomy for the checkout core. Every remote rejection is converted
/// into one of these at the service boundary; no raw transport error reaches
/// the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum CheckoutError {
    /// Checkout readiness violations, field-scoped and reported all at once.
    /// The first element is the first violated requirement, for auto-focus.
    #[error("Checkout blocked: {} requirement(s) not met", .0.len())]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Submission reached with no confirmed cart lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// The order row write failed. Fully recoverable: nothing was persisted
    /// and the cart is untouched.
    #[error("Order creation failed: {0}")]
    OrderCreation(String),

    /// The order row was persisted but its items were not. The cart is left
    /// intact for a retry; no rollback of the order row is attempted because
    /// the remote authority offers no multi-statement transaction.
    #[error("Order {order_id} was created but its items were not: {reason}")]
    PartialOrder { order_id: Uuid, reason: String },

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    /// Resume found the cart no longer matching the persisted order row.
    /// Nothing was written; the cart must be brought back to the priced
    /// state (or the order voided) before resuming.
    #[error("Order {order_id} was priced at subtotal {expected} but the cart now totals {actual}")]
    ResumeMismatch {
        order_id: Uuid,
        expected: Decimal,
        actual: Decimal,
    },

    /// Transport failure classified into a section where possible.
    #[error("Remote call failed ({section:?}): {message}")]
    Network {
        section: ErrorSection,
        message: String,
    },
}

impl CheckoutError {
    /// Section of the checkout screen this error should attach to.
    pub fn section(&self) -> ErrorSection {
        match self {
            CheckoutError::Validation(errors) => errors
                .first()
                .map(|e| e.section)
                .unwrap_or(ErrorSection::Generic),
            CheckoutError::Coupon(_) => ErrorSection::Coupon,
            CheckoutError::InvalidInput(_) => ErrorSection::Generic,
            CheckoutError::EmptyCart
            | CheckoutError::OrderCreation(_)
            | CheckoutError::PartialOrder { .. }
            | CheckoutError::OrderNotFound(_)
            | CheckoutError::ResumeMismatch { .. } => ErrorSection::Order,
            CheckoutError::Network { section, .. } => *section,
        }
    }

    /// Whether the current attempt may be retried as-is. A partial order must
    /// go through the explicit resume path instead, and a resume mismatch
    /// needs the cart corrected first.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CheckoutError::PartialOrder { .. } | CheckoutError::ResumeMismatch { .. }
        )
    }
}
