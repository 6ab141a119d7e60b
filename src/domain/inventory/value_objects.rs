use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Inventory Value Objects
// ============================================================================

/// A purchasable variant of an article (color/size), owning the available
/// stock counter. Invariant: `stock >= 0` at all times; mutated only
/// through the stock ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variation {
    pub id: Uuid,
    pub article_id: Uuid,
    pub stock: i32,
}

/// 1:1 shadow of [`Variation::stock`], kept for audit/update history.
/// The stock ledger keeps both equal within the same logical transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockRecord {
    pub variation_id: Uuid,
    pub quantity: i32,
    pub updated_at: DateTime<Utc>,
}
