//! Coupon validation.
//!
//! Existence, expiry, usage limits, and per-user one-time-use all live behind
//! a single server-evaluated call: those counters are shared mutable state
//! across concurrent clients and must never be decided from a local cache.
//! Only the minimum-purchase rule is checked locally, because it depends on
//! the live client-side cart.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::backend::CouponAuthority;
use crate::config::CheckoutConfig;
use crate::errors::{CheckoutError, CouponError, ErrorSection};
use crate::events::{Event, EventSender};
use crate::models::AppliedCoupon;

#[derive(Clone)]
pub struct CouponService {
    authority: Arc<dyn CouponAuthority>,
    events: EventSender,
    config: Arc<CheckoutConfig>,
}

impl CouponService {
    pub fn new(
        authority: Arc<dyn CouponAuthority>,
        events: EventSender,
        config: Arc<CheckoutConfig>,
    ) -> Self {
        Self {
            authority,
            events,
            config,
        }
    }

    /// Validates a coupon code against the remote authority and the live
    /// subtotal, returning the applied snapshot.
    ///
    /// Rules are evaluated in order and the first violation wins:
    /// empty code, remote rejection, minimum purchase. The subtotal passed in
    /// must be the current pre-discount cart subtotal.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn apply_coupon(
        &self,
        code: &str,
        user_id: Uuid,
        current_subtotal: Decimal,
    ) -> Result<AppliedCoupon, CheckoutError> {
        let applied = self.validate(code, user_id, current_subtotal).await?;

        self.events
            .send_or_log(Event::CouponApplied {
                user_id,
                code: applied.code.clone(),
            })
            .await;

        info!(code = %applied.code, "Applied coupon");
        Ok(applied)
    }

    /// Re-runs remote and minimum-purchase validation for an already applied
    /// coupon after a material cart change. Required, not cosmetic: a coupon
    /// that no longer meets its minimum must not silently remain applied.
    #[instrument(skip(self, applied), fields(code = %applied.code, user_id = %user_id))]
    pub async fn revalidate(
        &self,
        applied: &AppliedCoupon,
        user_id: Uuid,
        current_subtotal: Decimal,
    ) -> Result<AppliedCoupon, CheckoutError> {
        self.validate(&applied.code, user_id, current_subtotal).await
    }

    async fn validate(
        &self,
        code: &str,
        user_id: Uuid,
        current_subtotal: Decimal,
    ) -> Result<AppliedCoupon, CheckoutError> {
        let normalized = code.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(CouponError::EmptyCode.into());
        }
        if normalized.len() > self.config.coupon_code_max_length {
            return Err(CouponError::Invalid("Coupon code is too long".to_string()).into());
        }

        let decision = self
            .authority
            .validate_for_user(&normalized, user_id)
            .await
            .map_err(|e| CheckoutError::Network {
                section: e.section.unwrap_or(ErrorSection::Coupon),
                message: e.message,
            })?;

        if !decision.valid {
            let reason = decision
                .reason
                .unwrap_or_else(|| "Coupon is not valid".to_string());
            warn!(code = %normalized, %reason, "Coupon rejected by authority");
            return Err(CouponError::Invalid(reason).into());
        }

        let coupon = decision.coupon.ok_or_else(|| {
            CouponError::Invalid("Authority accepted the code without a coupon record".to_string())
        })?;

        if let Some(minimum) = coupon.min_purchase_amount {
            if current_subtotal < minimum {
                return Err(CouponError::BelowMinimumPurchase {
                    minimum,
                    shortfall: minimum - current_subtotal,
                }
                .into());
            }
        }

        Ok(AppliedCoupon::from_coupon(&coupon))
    }
}
