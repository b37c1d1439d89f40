pub mod cart;
pub mod checkout;
pub mod coupons;
pub mod delivery;
pub mod pricing;

pub use cart::CartService;
pub use checkout::{
    validate_readiness, CheckoutRequest, CheckoutService, CheckoutState, PlacedOrder,
    ResumeOutcome,
};
pub use coupons::CouponService;
pub use delivery::{resolve_delivery_fee, DeliveryFee, DeliveryService};
pub use pricing::{compute_totals, CartTotals};
