//! Interfaces to the remote backend-as-a-service.
//!
//! The persistence engine is out of scope for this crate; everything it needs
//! from the backend is expressed as the four trait groups below, injected
//! into the services so the core runs against a fake in tests exactly as it
//! runs against the real client in production.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ErrorSection;
use crate::models::{CartLine, Coupon, DeliverySettings, Order, OrderItem};

pub mod memory;

/// A rejected or failed remote call, with an optional hint about which
/// checkout section caused it. Converted into the crate error taxonomy at
/// the service boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    pub section: Option<ErrorSection>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            section: None,
        }
    }

    pub fn classified(message: impl Into<String>, section: ErrorSection) -> Self {
        Self {
            message: message.into(),
            section: Some(section),
        }
    }
}

/// Remote cart persistence: the durable copy of each user's cart lines.
#[async_trait]
pub trait CartBackend: Send + Sync {
    async fn lines_for_user(&self, user_id: Uuid) -> Result<Vec<CartLine>, RemoteError>;

    /// Inserts the line or updates its quantity if it already exists.
    async fn upsert_line(&self, user_id: Uuid, line: &CartLine) -> Result<(), RemoteError>;

    async fn delete_line(&self, user_id: Uuid, line_id: Uuid) -> Result<(), RemoteError>;

    async fn clear_for_user(&self, user_id: Uuid) -> Result<(), RemoteError>;
}

/// Outcome of the single server-evaluated coupon check. Expiry, total usage
/// limit, and per-user one-time-use are all decided remotely because the
/// usage counters are shared mutable state across concurrent clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponDecision {
    pub valid: bool,
    pub reason: Option<String>,
    pub coupon: Option<Coupon>,
}

impl CouponDecision {
    pub fn accepted(coupon: Coupon) -> Self {
        Self {
            valid: true,
            reason: None,
            coupon: Some(coupon),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            coupon: None,
        }
    }
}

#[async_trait]
pub trait CouponAuthority: Send + Sync {
    async fn validate_for_user(
        &self,
        code: &str,
        user_id: Uuid,
    ) -> Result<CouponDecision, RemoteError>;
}

/// Read-only delivery fee configuration.
#[async_trait]
pub trait DeliverySettingsStore: Send + Sync {
    async fn fetch(&self) -> Result<DeliverySettings, RemoteError>;
}

/// Order persistence. Order and order-item creation are two separate calls
/// with no transaction spanning them; the orchestrator owns the consequences.
#[async_trait]
pub trait OrderBackend: Send + Sync {
    /// Persists the order row and returns its id.
    async fn create_order(&self, order: &Order) -> Result<Uuid, RemoteError>;

    /// Persists the item batch for an already created order.
    async fn create_order_items(&self, items: &[OrderItem]) -> Result<(), RemoteError>;

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, RemoteError>;

    async fn count_order_items(&self, order_id: Uuid) -> Result<u64, RemoteError>;
}
