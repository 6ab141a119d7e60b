use uuid::Uuid;

use crate::store::StoreError;

// ============================================================================
// Stock Ledger Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StockError {
    #[error("insufficient stock for variation {variation_id}: requested {requested}, available {available}")]
    Insufficient {
        variation_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("variation {0} not found")]
    VariationNotFound(Uuid),

    #[error("stock quantities must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error(transparent)]
    Store(#[from] StoreError),
}
