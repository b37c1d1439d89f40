//! Delivery fee resolution: a pure rule over the remote delivery settings
//! and the current subtotal. Single source of truth for the fee shown in the
//! summary and the fee written to the order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use crate::backend::DeliverySettingsStore;
use crate::errors::{CheckoutError, ErrorSection};
use crate::models::DeliverySettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFee {
    pub fee: Decimal,
    pub is_free: bool,
}

/// Resolves the applicable delivery fee for a subtotal.
///
/// Delivery is free exactly when free delivery is enabled, a threshold is
/// configured, and the subtotal meets it. The subtotal evaluated here is the
/// pre-discount subtotal.
pub fn resolve_delivery_fee(settings: &DeliverySettings, subtotal: Decimal) -> DeliveryFee {
    let is_free = settings.free_delivery_enabled
        && settings
            .free_delivery_threshold
            .map(|threshold| subtotal >= threshold)
            .unwrap_or(false);

    DeliveryFee {
        fee: if is_free {
            Decimal::ZERO
        } else {
            settings.base_fee
        },
        is_free,
    }
}

/// Fetches delivery settings through the injected store and applies the pure
/// resolution rule.
#[derive(Clone)]
pub struct DeliveryService {
    settings_store: Arc<dyn DeliverySettingsStore>,
}

impl DeliveryService {
    pub fn new(settings_store: Arc<dyn DeliverySettingsStore>) -> Self {
        Self { settings_store }
    }

    #[instrument(skip(self))]
    pub async fn fee_for_subtotal(&self, subtotal: Decimal) -> Result<DeliveryFee, CheckoutError> {
        let settings = self.settings_store.fetch().await.map_err(|e| {
            CheckoutError::Network {
                section: e.section.unwrap_or(ErrorSection::Delivery),
                message: e.message,
            }
        })?;

        Ok(resolve_delivery_fee(&settings, subtotal))
    }
}
