use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::claim::Claim;
use crate::domain::delivery::{Delivery, DeliveryStatus};
use crate::domain::inventory::{StockRecord, Variation};
use crate::domain::order::{Order, OrderStatus};
use crate::utils::IsTransient;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

// ============================================================================
// Persistence Seam - Repository Traits
// ============================================================================
//
// One trait per aggregate, injected at construction (never an ambient
// client). Two implementations: InMemoryStore (dev/test, one lock over all
// tables) and PgStore (Postgres via sqlx, atomic conditional updates).
//
// Concurrency correctness lives HERE, not in the callers: multiple service
// instances may run at once, so every stock mutation is a single atomic
// conditional update at the storage layer.
//
// ============================================================================

/// Failures of the storage backend itself. Domain-level absence is an
/// `Option`/outcome-enum, never an error of this type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("stored row could not be decoded: {0}")]
    Corrupted(String),

    #[error("stock shadow record out of sync for variation {variation_id}")]
    ShadowOutOfSync { variation_id: Uuid },
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Outcome of a single conditional stock mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockMutation {
    /// Decrement/increment applied; `remaining` is the stock afterwards.
    Applied { remaining: i32 },
    /// The conditional check `stock >= qty` failed; nothing changed.
    Insufficient { available: i32 },
    /// No such variation; nothing changed.
    NotFound,
}

/// Outcome of an all-or-nothing multi-line reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStockMutation {
    /// Every line reserved within one transaction.
    Applied,
    /// A line fell short; the whole transaction rolled back.
    Insufficient {
        variation_id: Uuid,
        requested: i32,
        available: i32,
    },
    /// A line referenced a missing variation; the whole transaction
    /// rolled back.
    NotFound { variation_id: Uuid },
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn variation(&self, id: Uuid) -> Result<Option<Variation>, StoreError>;

    /// Shadow record for audit reads.
    async fn stock_record(&self, variation_id: Uuid) -> Result<Option<StockRecord>, StoreError>;

    /// Insert a variation together with its shadow record (seeding/admin).
    async fn insert_variation(&self, variation: Variation) -> Result<(), StoreError>;

    /// Atomic conditional decrement: applies `stock -= qty` only if
    /// `stock >= qty`, and mirrors the shadow record in the same
    /// transaction. Two concurrent calls can never jointly drive stock
    /// negative.
    async fn try_decrement(&self, id: Uuid, qty: i32) -> Result<StockMutation, StoreError>;

    /// Atomic increment, shadow mirrored in the same transaction.
    async fn increment(&self, id: Uuid, qty: i32) -> Result<StockMutation, StoreError>;

    /// All-or-nothing conditional decrement across several lines in one
    /// transaction.
    async fn try_decrement_all(
        &self,
        lines: &[(Uuid, i32)],
    ) -> Result<BatchStockMutation, StoreError>;

    /// Increment several lines in one transaction (reservation release).
    async fn increment_all(&self, lines: &[(Uuid, i32)]) -> Result<(), StoreError>;
}

/// Outcome of a delivery insert; the 1:1 order constraint is checked
/// atomically by the store, not by a read-then-write in the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryInsert {
    Inserted,
    DuplicateOrder,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<(), StoreError>;

    /// Cascading delete as one unit of work: the order, its lines, its
    /// delivery (if any), and its claims all go, and `release_lines` is
    /// credited back to stock within the same transaction.
    async fn delete_cascade(
        &self,
        id: Uuid,
        release_lines: &[(Uuid, i32)],
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn insert(&self, delivery: &Delivery) -> Result<DeliveryInsert, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Delivery>, StoreError>;

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Delivery>, StoreError>;

    async fn update_status(&self, id: Uuid, status: DeliveryStatus) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn insert(&self, claim: &Claim) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Claim>, StoreError>;

    async fn list_by_order(&self, order_id: Uuid) -> Result<Vec<Claim>, StoreError>;

    async fn update(&self, claim: &Claim) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}
