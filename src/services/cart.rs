//! Authoritative cart line store for the current user.
//!
//! Mutations are local-first: the in-memory list changes immediately with the
//! touched line marked `PendingWrite`, the remote write is awaited without
//! blocking other readers, and the line is marked `Confirmed` once the store
//! acknowledges. If the remote write fails the local mutation is rolled back
//! and a classified error returned, so local and remote state reconcile.

use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::backend::{CartBackend, RemoteError};
use crate::errors::{CheckoutError, ErrorSection};
use crate::events::{Event, EventSender};
use crate::models::{CartLine, LineSync};

pub struct CartService {
    user_id: Uuid,
    backend: Arc<dyn CartBackend>,
    events: EventSender,
    lines: RwLock<Vec<CartLine>>,
    /// Set when a remote clear failed after the lines already became order
    /// items; the clear is replayed before the next hydrate reads anything.
    pending_remote_clear: AtomicBool,
}

fn remote(e: RemoteError) -> CheckoutError {
    CheckoutError::Network {
        section: e.section.unwrap_or(ErrorSection::Generic),
        message: e.message,
    }
}

impl CartService {
    pub fn new(user_id: Uuid, backend: Arc<dyn CartBackend>, events: EventSender) -> Self {
        Self {
            user_id,
            backend,
            events,
            lines: RwLock::new(Vec::new()),
            pending_remote_clear: AtomicBool::new(false),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Replaces the local list with the remote state. Called once per session
    /// before the cart is shown. A remote clear still owed from a previous
    /// placement is replayed first, so already-ordered lines are never
    /// resurrected.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn hydrate(&self) -> Result<(), CheckoutError> {
        if self.pending_remote_clear.load(Ordering::SeqCst) {
            self.backend
                .clear_for_user(self.user_id)
                .await
                .map_err(remote)?;
            self.pending_remote_clear.store(false, Ordering::SeqCst);
            self.lines.write().await.clear();
            info!(user_id = %self.user_id, "Replayed pending remote cart clear");
            return Ok(());
        }

        let lines = self
            .backend
            .lines_for_user(self.user_id)
            .await
            .map_err(remote)?;
        *self.lines.write().await = lines;
        Ok(())
    }

    /// Snapshot of all lines, including ones still awaiting remote
    /// confirmation.
    pub async fn lines(&self) -> Vec<CartLine> {
        self.lines.read().await.clone()
    }

    /// Snapshot of lines the remote store has acknowledged. Order placement
    /// reads only these.
    pub async fn confirmed_lines(&self) -> Vec<CartLine> {
        self.lines
            .read()
            .await
            .iter()
            .filter(|l| l.sync == LineSync::Confirmed)
            .cloned()
            .collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.lines.read().await.is_empty()
    }

    /// Adds a product to the cart, merging quantities onto an existing line
    /// for the same product. The unit price is the caller's snapshot of the
    /// product price at read time.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn add_item(
        &self,
        product_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
    ) -> Result<CartLine, CheckoutError> {
        if quantity < 1 {
            return Err(CheckoutError::InvalidInput(format!(
                "Quantity must be at least 1, got {}",
                quantity
            )));
        }

        // Local-first mutation; remember enough to roll back.
        let (pending, previous_quantity) = {
            let mut lines = self.lines.write().await;
            match lines.iter_mut().find(|l| l.product_id == product_id) {
                Some(existing) => {
                    let previous = existing.quantity;
                    existing.quantity += quantity;
                    existing.sync = LineSync::PendingWrite;
                    (existing.clone(), Some(previous))
                }
                None => {
                    let line = CartLine::new(product_id, quantity, unit_price);
                    lines.push(line.clone());
                    (line, None)
                }
            }
        };

        match self.backend.upsert_line(self.user_id, &pending).await {
            Ok(()) => {
                let confirmed = self.confirm_line(pending.id).await;
                self.events
                    .send_or_log(Event::CartItemAdded {
                        user_id: self.user_id,
                        product_id,
                        quantity,
                    })
                    .await;
                info!(%product_id, quantity, "Added cart item");
                Ok(confirmed.unwrap_or(pending))
            }
            Err(e) => {
                let mut lines = self.lines.write().await;
                match previous_quantity {
                    Some(previous) => {
                        if let Some(line) = lines.iter_mut().find(|l| l.id == pending.id) {
                            line.quantity = previous;
                            line.sync = LineSync::Confirmed;
                        }
                    }
                    None => lines.retain(|l| l.id != pending.id),
                }
                Err(remote(e))
            }
        }
    }

    /// Sets a line's quantity. A quantity of zero or less removes the line.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn update_quantity(
        &self,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<(), CheckoutError> {
        if quantity <= 0 {
            return self.remove_item(line_id).await;
        }

        let (pending, previous_quantity) = {
            let mut lines = self.lines.write().await;
            let line = lines.iter_mut().find(|l| l.id == line_id).ok_or_else(|| {
                CheckoutError::InvalidInput(format!("Cart line {} not found", line_id))
            })?;
            let previous = line.quantity;
            line.quantity = quantity;
            line.sync = LineSync::PendingWrite;
            (line.clone(), previous)
        };

        match self.backend.upsert_line(self.user_id, &pending).await {
            Ok(()) => {
                self.confirm_line(line_id).await;
                self.events
                    .send_or_log(Event::CartItemUpdated {
                        user_id: self.user_id,
                        line_id,
                        quantity,
                    })
                    .await;
                Ok(())
            }
            Err(e) => {
                let mut lines = self.lines.write().await;
                if let Some(line) = lines.iter_mut().find(|l| l.id == line_id) {
                    line.quantity = previous_quantity;
                    line.sync = LineSync::Confirmed;
                }
                Err(remote(e))
            }
        }
    }

    /// Removes a line from the cart.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn remove_item(&self, line_id: Uuid) -> Result<(), CheckoutError> {
        let removed = {
            let mut lines = self.lines.write().await;
            let position = lines.iter().position(|l| l.id == line_id).ok_or_else(|| {
                CheckoutError::InvalidInput(format!("Cart line {} not found", line_id))
            })?;
            (position, lines.remove(position))
        };

        match self.backend.delete_line(self.user_id, line_id).await {
            Ok(()) => {
                self.events
                    .send_or_log(Event::CartItemRemoved {
                        user_id: self.user_id,
                        line_id,
                    })
                    .await;
                Ok(())
            }
            Err(e) => {
                let (position, line) = removed;
                let mut lines = self.lines.write().await;
                let position = position.min(lines.len());
                lines.insert(position, line);
                Err(remote(e))
            }
        }
    }

    /// Empties the cart locally and remotely. Invoked only by the order
    /// placement flow after a confirmed successful order write, never
    /// speculatively. The local list is cleared even if the remote delete
    /// fails: the lines have already become order items. A failed remote
    /// clear is remembered and replayed by the next `hydrate`.
    pub(crate) async fn clear(&self) -> Result<(), CheckoutError> {
        self.lines.write().await.clear();

        let result = self
            .backend
            .clear_for_user(self.user_id)
            .await
            .map_err(remote);
        self.pending_remote_clear
            .store(result.is_err(), Ordering::SeqCst);

        self.events
            .send_or_log(Event::CartCleared {
                user_id: self.user_id,
            })
            .await;
        info!(user_id = %self.user_id, "Cleared cart");
        result
    }

    async fn confirm_line(&self, line_id: Uuid) -> Option<CartLine> {
        let mut lines = self.lines.write().await;
        let line = lines.iter_mut().find(|l| l.id == line_id)?;
        line.sync = LineSync::Confirmed;
        Some(line.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::models::DeliverySettings;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn backend() -> Arc<MemoryBackend> {
        Arc::new(MemoryBackend::new(DeliverySettings {
            base_fee: dec!(40),
            free_delivery_enabled: false,
            free_delivery_threshold: None,
        }))
    }

    fn cart(backend: Arc<MemoryBackend>) -> CartService {
        let (events, _rx) = EventSender::channel(32);
        CartService::new(Uuid::new_v4(), backend, events)
    }

    #[tokio::test]
    async fn test_add_item_confirms_after_remote_ack() {
        let service = cart(backend());
        let line = service
            .add_item(Uuid::new_v4(), 2, dec!(100))
            .await
            .expect("add");

        assert_eq!(line.sync, LineSync::Confirmed);
        assert_eq!(service.confirmed_lines().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_same_product_merges_quantity() {
        let service = cart(backend());
        let product_id = Uuid::new_v4();

        service
            .add_item(product_id, 2, dec!(10))
            .await
            .expect("first add");
        service
            .add_item(product_id, 3, dec!(10))
            .await
            .expect("second add");

        let lines = service.lines().await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_add_rejects_non_positive_quantity() {
        let service = cart(backend());
        let err = service
            .add_item(Uuid::new_v4(), 0, dec!(10))
            .await
            .expect_err("zero quantity");
        assert_matches!(err, CheckoutError::InvalidInput(_));
    }

    #[tokio::test]
    async fn test_failed_add_rolls_back_local_state() {
        let remote = backend();
        let service = cart(remote.clone());
        remote.fail_cart_writes(true);

        let err = service
            .add_item(Uuid::new_v4(), 1, dec!(10))
            .await
            .expect_err("remote rejected");
        assert_matches!(err, CheckoutError::Network { .. });
        assert!(service.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_merge_restores_previous_quantity() {
        let remote = backend();
        let service = cart(remote.clone());
        let product_id = Uuid::new_v4();
        service
            .add_item(product_id, 2, dec!(10))
            .await
            .expect("seed");

        remote.fail_cart_writes(true);
        service
            .add_item(product_id, 5, dec!(10))
            .await
            .expect_err("remote rejected");

        let lines = service.lines().await;
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[0].sync, LineSync::Confirmed);
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let service = cart(backend());
        let line = service
            .add_item(Uuid::new_v4(), 2, dec!(10))
            .await
            .expect("add");

        service
            .update_quantity(line.id, 0)
            .await
            .expect("update to zero");
        assert!(service.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_update_restores_previous_quantity() {
        let remote = backend();
        let service = cart(remote.clone());
        let line = service
            .add_item(Uuid::new_v4(), 2, dec!(10))
            .await
            .expect("add");

        remote.fail_cart_writes(true);
        service
            .update_quantity(line.id, 7)
            .await
            .expect_err("remote rejected");

        let lines = service.lines().await;
        assert_eq!(lines[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_failed_remove_reinserts_line() {
        let remote = backend();
        let service = cart(remote.clone());
        let line = service
            .add_item(Uuid::new_v4(), 1, dec!(10))
            .await
            .expect("add");

        remote.fail_cart_writes(true);
        service
            .remove_item(line.id)
            .await
            .expect_err("remote rejected");
        assert_eq!(service.lines().await.len(), 1);
    }

    #[tokio::test]
    async fn test_hydrate_loads_remote_lines() {
        let remote = backend();
        let user_id = Uuid::new_v4();
        let stored = CartLine::new(Uuid::new_v4(), 2, dec!(50));
        remote.upsert_line(user_id, &stored).await.expect("seed");

        let (events, _rx) = EventSender::channel(8);
        let service = CartService::new(user_id, remote, events);
        service.hydrate().await.expect("hydrate");

        let lines = service.confirmed_lines().await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].unit_price, dec!(50));
    }

    #[tokio::test]
    async fn test_failed_remote_clear_is_replayed_on_hydrate() {
        let remote = backend();
        let service = cart(remote.clone());
        service
            .add_item(Uuid::new_v4(), 2, dec!(10))
            .await
            .expect("add");

        remote.fail_cart_writes(true);
        service.clear().await.expect_err("remote clear rejected");
        assert!(service.is_empty().await);
        // The remote copy still holds the ordered line.
        assert_eq!(remote.stored_lines(service.user_id()).len(), 1);

        // Next session: hydrate replays the clear instead of resurrecting
        // the already-ordered lines.
        remote.fail_cart_writes(false);
        service.hydrate().await.expect("hydrate");
        assert!(service.is_empty().await);
        assert!(remote.stored_lines(service.user_id()).is_empty());
    }

    #[tokio::test]
    async fn test_clear_empties_local_and_remote() {
        let remote = backend();
        let service = cart(remote.clone());
        service
            .add_item(Uuid::new_v4(), 1, dec!(10))
            .await
            .expect("add");

        service.clear().await.expect("clear");
        assert!(service.is_empty().await);
        assert!(remote.stored_lines(service.user_id()).is_empty());
    }
}
