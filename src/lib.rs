//! Checkout and order placement core for a grocery commerce platform.
//!
//! This crate owns the pricing, coupon validation, delivery-fee, cart state,
//! and order placement logic of the checkout flow, together with the
//! consistency guarantees around the two-phase Order + OrderItem write. The
//! remote backend is reached only through the injected interfaces in
//! [`backend`]; UI, transport, authentication, and the persistence engine
//! itself live elsewhere.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod backend;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod services;

pub use backend::{CartBackend, CouponAuthority, DeliverySettingsStore, OrderBackend};
pub use config::CheckoutConfig;
pub use errors::{CheckoutError, CheckoutField, CouponError, ErrorSection, FieldError};
pub use events::{Event, EventSender};
pub use models::{
    AppliedCoupon, CartLine, Coupon, DeliveryOption, DeliverySettings, DiscountKind, Order,
    OrderItem,
};
pub use services::{
    CartService, CartTotals, CheckoutRequest, CheckoutService, CheckoutState, CouponService,
    DeliveryFee, DeliveryService, PlacedOrder, ResumeOutcome,
};

use tracing_subscriber::EnvFilter;

/// Initializes tracing for binaries and integration tests. Respects
/// `RUST_LOG`, falling back to the given filter. Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
