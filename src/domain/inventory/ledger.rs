use std::sync::Arc;

use uuid::Uuid;

use crate::store::{BatchStockMutation, InventoryStore, StockMutation};

use super::errors::StockError;

// ============================================================================
// Stock Ledger
// ============================================================================
//
// Owns per-variation available quantity. Reservation (decrement) and
// release (increment) delegate to the inventory store's atomic conditional
// updates; the ledger validates quantities, translates outcomes into
// domain errors, and logs every mutation.
//
// Release idempotency is the caller's responsibility: the order state
// machine guarantees at most one release per order.
//
// ============================================================================

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn InventoryStore>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Reserve `qty` units of one variation. Fails without any mutation if
    /// the available stock is short.
    pub async fn reserve(&self, variation_id: Uuid, qty: i32) -> Result<i32, StockError> {
        if qty <= 0 {
            return Err(StockError::InvalidQuantity(qty));
        }

        match self.store.try_decrement(variation_id, qty).await? {
            StockMutation::Applied { remaining } => {
                tracing::info!(
                    variation_id = %variation_id,
                    quantity = qty,
                    remaining = remaining,
                    "stock reserved"
                );
                Ok(remaining)
            }
            StockMutation::Insufficient { available } => Err(StockError::Insufficient {
                variation_id,
                requested: qty,
                available,
            }),
            StockMutation::NotFound => Err(StockError::VariationNotFound(variation_id)),
        }
    }

    /// Return `qty` units of one variation to the shelf.
    pub async fn release(&self, variation_id: Uuid, qty: i32) -> Result<i32, StockError> {
        if qty <= 0 {
            return Err(StockError::InvalidQuantity(qty));
        }

        match self.store.increment(variation_id, qty).await? {
            StockMutation::Applied { remaining } => {
                tracing::info!(
                    variation_id = %variation_id,
                    quantity = qty,
                    remaining = remaining,
                    "stock released"
                );
                Ok(remaining)
            }
            StockMutation::Insufficient { .. } => unreachable!("increment has no condition"),
            StockMutation::NotFound => Err(StockError::VariationNotFound(variation_id)),
        }
    }

    /// Reserve every line of an order inside one all-or-nothing
    /// transaction. On any shortfall nothing is decremented.
    pub async fn reserve_lines(&self, lines: &[(Uuid, i32)]) -> Result<(), StockError> {
        if lines.is_empty() {
            return Ok(());
        }
        if let Some(&(_, qty)) = lines.iter().find(|&&(_, qty)| qty <= 0) {
            return Err(StockError::InvalidQuantity(qty));
        }

        match self.store.try_decrement_all(lines).await? {
            BatchStockMutation::Applied => {
                tracing::info!(line_count = lines.len(), "order lines reserved");
                Ok(())
            }
            BatchStockMutation::Insufficient {
                variation_id,
                requested,
                available,
            } => Err(StockError::Insufficient {
                variation_id,
                requested,
                available,
            }),
            BatchStockMutation::NotFound { variation_id } => {
                Err(StockError::VariationNotFound(variation_id))
            }
        }
    }

    /// Release every line of an order in one transaction.
    pub async fn release_lines(&self, lines: &[(Uuid, i32)]) -> Result<(), StockError> {
        if lines.is_empty() {
            return Ok(());
        }
        self.store.increment_all(lines).await?;
        tracing::info!(line_count = lines.len(), "order lines released");
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
