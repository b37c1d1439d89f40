//! In-memory implementation of the backend interfaces.
//!
//! Used by the test suite and local runs. The two order write paths have
//! failure-injection switches so the orchestrator's no-rollback semantics
//! can be exercised without a real backend.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::{
    CartBackend, CouponAuthority, CouponDecision, DeliverySettingsStore, OrderBackend, RemoteError,
};
use crate::errors::ErrorSection;
use crate::models::{CartLine, Coupon, DeliverySettings, LineSync, Order, OrderItem};

pub struct MemoryBackend {
    carts: DashMap<Uuid, Vec<CartLine>>,
    coupons: DashMap<String, Coupon>,
    /// user ids that have redeemed a given code, keyed by code
    redemptions: DashMap<String, HashSet<Uuid>>,
    settings: RwLock<DeliverySettings>,
    orders: DashMap<Uuid, Order>,
    order_items: DashMap<Uuid, Vec<OrderItem>>,
    fail_cart_writes: AtomicBool,
    fail_order_create: AtomicBool,
    fail_item_create: AtomicBool,
}

impl MemoryBackend {
    pub fn new(settings: DeliverySettings) -> Self {
        Self {
            carts: DashMap::new(),
            coupons: DashMap::new(),
            redemptions: DashMap::new(),
            settings: RwLock::new(settings),
            orders: DashMap::new(),
            order_items: DashMap::new(),
            fail_cart_writes: AtomicBool::new(false),
            fail_order_create: AtomicBool::new(false),
            fail_item_create: AtomicBool::new(false),
        }
    }

    pub fn insert_coupon(&self, coupon: Coupon) {
        self.coupons.insert(coupon.code.clone(), coupon);
    }

    pub async fn set_delivery_settings(&self, settings: DeliverySettings) {
        *self.settings.write().await = settings;
    }

    pub fn fail_cart_writes(&self, fail: bool) {
        self.fail_cart_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_order_create(&self, fail: bool) {
        self.fail_order_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_item_create(&self, fail: bool) {
        self.fail_item_create.store(fail, Ordering::SeqCst);
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn items_for_order(&self, order_id: Uuid) -> Vec<OrderItem> {
        self.order_items
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn stored_lines(&self, user_id: Uuid) -> Vec<CartLine> {
        self.carts
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CartBackend for MemoryBackend {
    async fn lines_for_user(&self, user_id: Uuid) -> Result<Vec<CartLine>, RemoteError> {
        let mut lines = self.stored_lines(user_id);
        // A line read back from the store is confirmed by definition.
        for line in &mut lines {
            line.sync = LineSync::Confirmed;
        }
        Ok(lines)
    }

    async fn upsert_line(&self, user_id: Uuid, line: &CartLine) -> Result<(), RemoteError> {
        if self.fail_cart_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::new("cart write rejected"));
        }

        let mut stored = CartLine {
            sync: LineSync::Confirmed,
            ..line.clone()
        };
        let mut entry = self.carts.entry(user_id).or_default();
        if let Some(existing) = entry.iter_mut().find(|l| l.id == line.id) {
            std::mem::swap(existing, &mut stored);
        } else {
            entry.push(stored);
        }
        Ok(())
    }

    async fn delete_line(&self, user_id: Uuid, line_id: Uuid) -> Result<(), RemoteError> {
        if self.fail_cart_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::new("cart write rejected"));
        }

        if let Some(mut entry) = self.carts.get_mut(&user_id) {
            entry.retain(|l| l.id != line_id);
        }
        Ok(())
    }

    async fn clear_for_user(&self, user_id: Uuid) -> Result<(), RemoteError> {
        if self.fail_cart_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::new("cart write rejected"));
        }

        self.carts.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl CouponAuthority for MemoryBackend {
    async fn validate_for_user(
        &self,
        code: &str,
        user_id: Uuid,
    ) -> Result<CouponDecision, RemoteError> {
        let coupon = match self.coupons.get(code) {
            Some(entry) => entry.value().clone(),
            None => return Ok(CouponDecision::rejected("Coupon code not recognized")),
        };

        if Utc::now() >= coupon.valid_until {
            return Ok(CouponDecision::rejected("Coupon has expired"));
        }

        if let Some(limit) = coupon.usage_limit {
            if coupon.used_count >= limit {
                return Ok(CouponDecision::rejected("Coupon usage limit reached"));
            }
        }

        let already_used = self
            .redemptions
            .get(code)
            .map(|users| users.contains(&user_id))
            .unwrap_or(false);
        if already_used {
            return Ok(CouponDecision::rejected(
                "Coupon already used on a previous order",
            ));
        }

        Ok(CouponDecision::accepted(coupon))
    }
}

#[async_trait]
impl DeliverySettingsStore for MemoryBackend {
    async fn fetch(&self) -> Result<DeliverySettings, RemoteError> {
        Ok(self.settings.read().await.clone())
    }
}

#[async_trait]
impl OrderBackend for MemoryBackend {
    async fn create_order(&self, order: &Order) -> Result<Uuid, RemoteError> {
        if self.fail_order_create.load(Ordering::SeqCst) {
            return Err(RemoteError::classified(
                "order write rejected",
                ErrorSection::Order,
            ));
        }

        self.orders.insert(order.id, order.clone());

        // Redemption bookkeeping lives server-side in production; mirror it
        // here so one-coupon-per-user behaves across placements.
        if let Some(code) = &order.applied_coupon_code {
            self.redemptions
                .entry(code.clone())
                .or_default()
                .insert(order.user_id);
            if let Some(mut coupon) = self.coupons.get_mut(code) {
                coupon.used_count += 1;
            }
        }

        Ok(order.id)
    }

    async fn create_order_items(&self, items: &[OrderItem]) -> Result<(), RemoteError> {
        if self.fail_item_create.load(Ordering::SeqCst) {
            return Err(RemoteError::classified(
                "order item write rejected",
                ErrorSection::Order,
            ));
        }

        for item in items {
            self.order_items
                .entry(item.order_id)
                .or_default()
                .push(item.clone());
        }
        Ok(())
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, RemoteError> {
        Ok(self.orders.get(&order_id).map(|entry| entry.value().clone()))
    }

    async fn count_order_items(&self, order_id: Uuid) -> Result<u64, RemoteError> {
        Ok(self
            .order_items
            .get(&order_id)
            .map(|items| items.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscountKind;
    use rust_decimal_macros::dec;

    fn settings() -> DeliverySettings {
        DeliverySettings {
            base_fee: dec!(40),
            free_delivery_enabled: false,
            free_delivery_threshold: None,
        }
    }

    fn coupon(code: &str) -> Coupon {
        Coupon {
            code: code.to_string(),
            discount_kind: DiscountKind::Fixed,
            discount_value: dec!(50),
            min_purchase_amount: None,
            max_discount_amount: None,
            valid_until: Utc::now() + chrono::Duration::days(7),
            usage_limit: None,
            used_count: 0,
            applicable_product_ids: None,
            applicable_category_ids: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_then_read_back_confirmed() {
        let backend = MemoryBackend::new(settings());
        let user_id = Uuid::new_v4();
        let line = CartLine::new(Uuid::new_v4(), 2, dec!(100));

        backend.upsert_line(user_id, &line).await.expect("upsert");
        let lines = backend.lines_for_user(user_id).await.expect("read");

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].id, line.id);
        assert_eq!(lines[0].sync, LineSync::Confirmed);
    }

    #[tokio::test]
    async fn test_unknown_coupon_rejected() {
        let backend = MemoryBackend::new(settings());
        let decision = backend
            .validate_for_user("NOPE", Uuid::new_v4())
            .await
            .expect("call");
        assert!(!decision.valid);
        assert!(decision.reason.is_some());
    }

    #[tokio::test]
    async fn test_expired_coupon_rejected() {
        let backend = MemoryBackend::new(settings());
        let mut expired = coupon("OLD");
        expired.valid_until = Utc::now() - chrono::Duration::hours(1);
        backend.insert_coupon(expired);

        let decision = backend
            .validate_for_user("OLD", Uuid::new_v4())
            .await
            .expect("call");
        assert!(!decision.valid);
        assert_eq!(decision.reason.as_deref(), Some("Coupon has expired"));
    }

    #[tokio::test]
    async fn test_usage_limit_enforced() {
        let backend = MemoryBackend::new(settings());
        let mut limited = coupon("LIM");
        limited.usage_limit = Some(1);
        limited.used_count = 1;
        backend.insert_coupon(limited);

        let decision = backend
            .validate_for_user("LIM", Uuid::new_v4())
            .await
            .expect("call");
        assert!(!decision.valid);
    }

    #[tokio::test]
    async fn test_per_user_one_time_use() {
        let backend = MemoryBackend::new(settings());
        backend.insert_coupon(coupon("ONCE"));
        let user_id = Uuid::new_v4();

        let order = Order {
            id: Uuid::new_v4(),
            order_number: "ORD-TEST0001".to_string(),
            user_id,
            delivery_address_id: Uuid::new_v4(),
            payment_method_id: None,
            status: crate::models::ORDER_STATUS_PENDING.to_string(),
            subtotal: dec!(100),
            discount_amount: dec!(50),
            delivery_fee: dec!(40),
            total_amount: dec!(90),
            applied_coupon_code: Some("ONCE".to_string()),
            is_cash_on_delivery: true,
            estimated_delivery: Utc::now(),
            created_at: Utc::now(),
        };
        backend.create_order(&order).await.expect("create order");

        let decision = backend.validate_for_user("ONCE", user_id).await.expect("call");
        assert!(!decision.valid);

        // A different user is still allowed.
        let other = backend
            .validate_for_user("ONCE", Uuid::new_v4())
            .await
            .expect("call");
        assert!(other.valid);
    }

    #[tokio::test]
    async fn test_item_write_failure_injection() {
        let backend = MemoryBackend::new(settings());
        backend.fail_item_create(true);

        let item = OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: 1,
            unit_price: dec!(10),
        };
        let err = backend
            .create_order_items(std::slice::from_ref(&item))
            .await
            .expect_err("must fail");
        assert_eq!(err.section, Some(ErrorSection::Order));

        backend.fail_item_create(false);
        backend
            .create_order_items(std::slice::from_ref(&item))
            .await
            .expect("succeeds after reset");
        assert_eq!(backend.count_order_items(item.order_id).await.expect("count"), 1);
    }
}
