//! Order placement orchestration.
//!
//! Drives a single checkout attempt through
//! `Idle → Validating → Submitting → Succeeded`, with `Blocked` on readiness
//! violations and `Failed` on submission errors. The remote store offers no
//! multi-statement transaction, so the Order row and its OrderItem batch are
//! two strictly ordered writes and the gap between them is handled
//! explicitly: a partial order is surfaced as its own failure, the cart is
//! left intact, and `resume_order_items` can complete the order later
//! without duplicating the row.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::backend::OrderBackend;
use crate::config::CheckoutConfig;
use crate::errors::{CheckoutError, CheckoutField, ErrorSection, FieldError};
use crate::events::{Event, EventSender};
use crate::models::{
    AppliedCoupon, CartLine, DeliveryOption, Order, OrderItem, ORDER_STATUS_PENDING,
};
use crate::services::cart::CartService;
use crate::services::coupons::CouponService;
use crate::services::delivery::DeliveryService;
use crate::services::pricing::{self, CartTotals};

/// Caller-selected checkout inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub delivery_address_id: Option<Uuid>,
    pub payment_method_id: Option<Uuid>,
    pub is_cash_on_delivery: bool,
    pub delivery_option: DeliveryOption,
}

/// Observable state of the current checkout attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CheckoutState {
    Idle,
    Validating,
    Submitting,
    Succeeded(Uuid),
    Blocked(Vec<FieldError>),
    Failed(CheckoutError),
}

/// Result of a successful placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    pub order_number: String,
    pub total_amount: Decimal,
    pub estimated_delivery: DateTime<Utc>,
}

/// Result of `resume_order_items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeOutcome {
    ItemsCreated(usize),
    /// The order already has items; nothing was written.
    AlreadyComplete,
}

/// Collects every violated checkout requirement, in evaluation order, so the
/// caller can surface all of them at once and focus the first.
pub fn validate_readiness(request: &CheckoutRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if request.delivery_address_id.is_none() {
        errors.push(FieldError::new(
            ErrorSection::Address,
            CheckoutField::DeliveryAddress,
            "Select a delivery address",
        ));
    }

    if !request.is_cash_on_delivery && request.payment_method_id.is_none() {
        errors.push(FieldError::new(
            ErrorSection::Payment,
            CheckoutField::PaymentMethod,
            "Select a payment method or choose cash on delivery",
        ));
    }

    if matches!(
        request.delivery_option,
        DeliveryOption::Scheduled { slot: None }
    ) {
        errors.push(FieldError::new(
            ErrorSection::Delivery,
            CheckoutField::DeliverySlot,
            "Select a delivery time slot",
        ));
    }

    errors
}

pub struct CheckoutService {
    cart: Arc<CartService>,
    coupons: CouponService,
    delivery: DeliveryService,
    orders: Arc<dyn OrderBackend>,
    events: EventSender,
    config: Arc<CheckoutConfig>,
    applied: RwLock<Option<AppliedCoupon>>,
    state: RwLock<CheckoutState>,
}

impl CheckoutService {
    pub fn new(
        cart: Arc<CartService>,
        coupons: CouponService,
        delivery: DeliveryService,
        orders: Arc<dyn OrderBackend>,
        events: EventSender,
        config: Arc<CheckoutConfig>,
    ) -> Self {
        Self {
            cart,
            coupons,
            delivery,
            orders,
            events,
            config,
            applied: RwLock::new(None),
            state: RwLock::new(CheckoutState::Idle),
        }
    }

    pub async fn state(&self) -> CheckoutState {
        self.state.read().await.clone()
    }

    pub async fn applied_coupon(&self) -> Option<AppliedCoupon> {
        self.applied.read().await.clone()
    }

    /// Current totals from the full cart and the applied coupon. Derived on
    /// every call; nothing is cached.
    pub async fn totals(&self) -> CartTotals {
        let lines = self.cart.lines().await;
        let applied = self.applied.read().await;
        pricing::compute_totals(&lines, applied.as_ref())
    }

    /// Validates a coupon code against the live pre-discount subtotal and
    /// holds the snapshot in session state.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, code: &str) -> Result<AppliedCoupon, CheckoutError> {
        let subtotal = pricing::compute_totals(&self.cart.lines().await, None).subtotal;
        let applied = self
            .coupons
            .apply_coupon(code, self.cart.user_id(), subtotal)
            .await?;
        *self.applied.write().await = Some(applied.clone());
        Ok(applied)
    }

    /// Clears the applied coupon. Purely local; no remote effect.
    pub async fn remove_coupon(&self) -> Option<AppliedCoupon> {
        let removed = self.applied.write().await.take();
        if let Some(coupon) = &removed {
            self.events
                .send_or_log(Event::CouponRemoved {
                    user_id: self.cart.user_id(),
                    code: coupon.code.clone(),
                })
                .await;
        }
        removed
    }

    /// Re-validates the applied coupon after a cart mutation, against the
    /// subtotal computed from the mutated cart. A coupon that no longer
    /// qualifies is dropped and the reason returned, so it never silently
    /// stays applied below its minimum purchase.
    #[instrument(skip(self))]
    pub async fn sync_coupon_with_cart(&self) -> Result<Option<AppliedCoupon>, CheckoutError> {
        let current = self.applied.read().await.clone();
        let Some(current) = current else {
            return Ok(None);
        };

        let subtotal = pricing::compute_totals(&self.cart.lines().await, None).subtotal;
        match self
            .coupons
            .revalidate(&current, self.cart.user_id(), subtotal)
            .await
        {
            Ok(fresh) => {
                *self.applied.write().await = Some(fresh.clone());
                Ok(Some(fresh))
            }
            Err(e) => {
                *self.applied.write().await = None;
                self.events
                    .send_or_log(Event::CouponDropped {
                        user_id: self.cart.user_id(),
                        code: current.code.clone(),
                        reason: e.to_string(),
                    })
                    .await;
                warn!(code = %current.code, "Dropped coupon after cart change");
                Err(e)
            }
        }
    }

    /// Adds a product through the cart store, then re-validates the applied
    /// coupon against the mutated cart. A coupon that stops qualifying is
    /// dropped (session state cleared, event emitted); the cart mutation
    /// itself stands either way.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        product_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
    ) -> Result<CartLine, CheckoutError> {
        let line = self.cart.add_item(product_id, quantity, unit_price).await?;
        self.resync_coupon().await;
        Ok(line)
    }

    /// Sets a line quantity through the cart store, then re-validates the
    /// applied coupon against the mutated cart.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<(), CheckoutError> {
        self.cart.update_quantity(line_id, quantity).await?;
        self.resync_coupon().await;
        Ok(())
    }

    /// Removes a line through the cart store, then re-validates the applied
    /// coupon against the mutated cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, line_id: Uuid) -> Result<(), CheckoutError> {
        self.cart.remove_item(line_id).await?;
        self.resync_coupon().await;
        Ok(())
    }

    async fn resync_coupon(&self) {
        if self.applied.read().await.is_some() {
            // A dropped coupon is surfaced through its event and the cleared
            // session state; it never fails the cart mutation.
            let _ = self.sync_coupon_with_cart().await;
        }
    }

    /// Abandons the current attempt if submission has not begun. Once
    /// `Submitting` starts the remote writes are awaited to completion, so a
    /// mid-flight attempt cannot be cancelled.
    pub async fn abandon(&self) -> bool {
        let mut state = self.state.write().await;
        match *state {
            CheckoutState::Submitting => false,
            _ => {
                *state = CheckoutState::Idle;
                true
            }
        }
    }

    /// Places the order: validates readiness, recomputes everything from the
    /// confirmed cart, writes the order row and then its items, clears the
    /// cart, and reports the created order.
    #[instrument(skip(self, request), fields(user_id = %self.cart.user_id()))]
    pub async fn place_order(
        &self,
        request: &CheckoutRequest,
    ) -> Result<PlacedOrder, CheckoutError> {
        self.set_state(CheckoutState::Validating).await;

        let violations = validate_readiness(request);
        if !violations.is_empty() {
            warn!(count = violations.len(), "Checkout blocked");
            self.set_state(CheckoutState::Blocked(violations.clone()))
                .await;
            return Err(CheckoutError::Validation(violations));
        }

        self.set_state(CheckoutState::Submitting).await;

        // Re-read the cart now rather than trusting anything captured during
        // validation; only remotely confirmed lines are placed.
        let lines = self.cart.confirmed_lines().await;
        if lines.is_empty() {
            return Err(self.fail(CheckoutError::EmptyCart).await);
        }
        let subtotal = pricing::compute_totals(&lines, None).subtotal;

        // The coupon must still hold against the fresh subtotal.
        let applied = self.applied.read().await.clone();
        let applied = match applied {
            Some(current) => {
                match self
                    .coupons
                    .revalidate(&current, self.cart.user_id(), subtotal)
                    .await
                {
                    Ok(fresh) => Some(fresh),
                    Err(e) => {
                        *self.applied.write().await = None;
                        self.events
                            .send_or_log(Event::CouponDropped {
                                user_id: self.cart.user_id(),
                                code: current.code.clone(),
                                reason: e.to_string(),
                            })
                            .await;
                        return Err(self.fail(e).await);
                    }
                }
            }
            None => None,
        };

        let totals = pricing::compute_totals(&lines, applied.as_ref());

        // Free-delivery threshold is evaluated against the pre-discount
        // subtotal.
        let delivery_fee = match self.delivery.fee_for_subtotal(totals.subtotal).await {
            Ok(fee) => fee,
            Err(e) => return Err(self.fail(e).await),
        };

        let created_at = Utc::now();
        let order_id = Uuid::new_v4();
        let estimated_delivery = self.estimated_delivery(&request.delivery_option, created_at);
        let order = Order {
            id: order_id,
            order_number: format!("ORD-{}", order_id.to_string()[..8].to_uppercase()),
            user_id: self.cart.user_id(),
            delivery_address_id: request
                .delivery_address_id
                .unwrap_or_else(Uuid::nil),
            payment_method_id: if request.is_cash_on_delivery {
                None
            } else {
                request.payment_method_id
            },
            status: ORDER_STATUS_PENDING.to_string(),
            subtotal: totals.subtotal,
            discount_amount: totals.discount_amount,
            delivery_fee: delivery_fee.fee,
            total_amount: (totals.subtotal - totals.discount_amount + delivery_fee.fee)
                .round_dp(2),
            applied_coupon_code: applied.as_ref().map(|c| c.code.clone()),
            is_cash_on_delivery: request.is_cash_on_delivery,
            estimated_delivery,
            created_at,
        };

        // Phase one: the order row. A failure here is fully recoverable; the
        // cart is untouched and the attempt can simply be retried.
        if let Err(e) = self.orders.create_order(&order).await {
            return Err(self
                .fail(CheckoutError::OrderCreation(e.message.clone()))
                .await);
        }
        self.events.send_or_log(Event::OrderCreated(order_id)).await;

        // Phase two: the item batch, prices exactly as captured in the cart.
        let items = order_items_from_lines(order_id, &lines);
        if let Err(e) = self.orders.create_order_items(&items).await {
            error!(%order_id, reason = %e.message, "Order created without items");
            self.events
                .send_or_log(Event::PartialOrderDetected { order_id })
                .await;
            return Err(self
                .fail(CheckoutError::PartialOrder {
                    order_id,
                    reason: e.message,
                })
                .await);
        }
        self.events
            .send_or_log(Event::OrderItemsCreated {
                order_id,
                item_count: items.len(),
            })
            .await;

        // Only now is the cart cleared; a remote clear failure does not
        // invalidate the placed order.
        if let Err(e) = self.cart.clear().await {
            warn!(%order_id, "Cart clear after placement failed: {}", e);
        }
        *self.applied.write().await = None;

        self.set_state(CheckoutState::Succeeded(order_id)).await;
        info!(%order_id, total = %order.total_amount, "Order placed");

        Ok(PlacedOrder {
            order_id,
            order_number: order.order_number,
            total_amount: order.total_amount,
            estimated_delivery,
        })
    }

    /// Idempotent recovery for an order left without items: re-creates the
    /// item batch from the current confirmed cart, then clears the cart. If
    /// the order already has items nothing is written.
    ///
    /// The cart stays editable between a partial failure and the resume, so
    /// the lines about to be written are checked against the subtotal the
    /// order was priced at. On divergence nothing is written; charging the
    /// stored total for different goods is never acceptable.
    #[instrument(skip(self))]
    pub async fn resume_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<ResumeOutcome, CheckoutError> {
        let order = self
            .orders
            .find_order(order_id)
            .await
            .map_err(|e| CheckoutError::Network {
                section: e.section.unwrap_or(ErrorSection::Order),
                message: e.message,
            })?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        let existing = self
            .orders
            .count_order_items(order_id)
            .await
            .map_err(|e| CheckoutError::Network {
                section: e.section.unwrap_or(ErrorSection::Order),
                message: e.message,
            })?;
        if existing > 0 {
            info!(%order_id, existing, "Order already has items; nothing to resume");
            return Ok(ResumeOutcome::AlreadyComplete);
        }

        let lines = self.cart.confirmed_lines().await;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let current_subtotal = pricing::compute_totals(&lines, None).subtotal;
        if current_subtotal != order.subtotal {
            error!(
                %order_id,
                expected = %order.subtotal,
                actual = %current_subtotal,
                "Cart diverged from the priced order; refusing to resume"
            );
            return Err(CheckoutError::ResumeMismatch {
                order_id,
                expected: order.subtotal,
                actual: current_subtotal,
            });
        }

        let items = order_items_from_lines(order.id, &lines);
        self.orders
            .create_order_items(&items)
            .await
            .map_err(|e| CheckoutError::PartialOrder {
                order_id,
                reason: e.message,
            })?;

        if let Err(e) = self.cart.clear().await {
            warn!(%order_id, "Cart clear after resume failed: {}", e);
        }
        *self.applied.write().await = None;

        self.events
            .send_or_log(Event::OrderItemsResumed {
                order_id,
                item_count: items.len(),
            })
            .await;
        self.set_state(CheckoutState::Succeeded(order_id)).await;
        info!(%order_id, items = items.len(), "Resumed order items");

        Ok(ResumeOutcome::ItemsCreated(items.len()))
    }

    fn estimated_delivery(
        &self,
        option: &DeliveryOption,
        created_at: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let asap = created_at + Duration::minutes(self.config.estimated_delivery_minutes);
        match option {
            DeliveryOption::Asap => asap,
            DeliveryOption::Scheduled { slot } => slot.unwrap_or(asap),
        }
    }

    async fn set_state(&self, state: CheckoutState) {
        *self.state.write().await = state;
    }

    async fn fail(&self, err: CheckoutError) -> CheckoutError {
        self.events
            .send_or_log(Event::OrderPlacementFailed {
                user_id: self.cart.user_id(),
                reason: err.to_string(),
            })
            .await;
        self.set_state(CheckoutState::Failed(err.clone())).await;
        err
    }
}

fn order_items_from_lines(order_id: Uuid, lines: &[CartLine]) -> Vec<OrderItem> {
    lines
        .iter()
        .map(|line| OrderItem {
            id: Uuid::new_v4(),
            order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        })
        .collect()
}
