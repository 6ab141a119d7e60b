use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::claim::Claim;
use crate::domain::delivery::{Delivery, DeliveryStatus};
use crate::domain::inventory::{StockRecord, Variation};
use crate::domain::order::{Order, OrderStatus};

use super::{
    BatchStockMutation, ClaimStore, DeliveryInsert, DeliveryStore, InventoryStore, OrderStore,
    StockMutation, StoreError,
};

// ============================================================================
// In-Memory Store - Dev Mode & Tests
// ============================================================================
//
// One mutex over all tables: every trait method is a transaction, which is
// exactly the atomicity contract the Postgres implementation provides with
// real transactions. Concurrent reservations serialize on the lock, so the
// conditional check and the decrement are indivisible.
//
// ============================================================================

#[derive(Default)]
struct Tables {
    variations: HashMap<Uuid, Variation>,
    stock_records: HashMap<Uuid, StockRecord>,
    orders: HashMap<Uuid, Order>,
    deliveries: HashMap<Uuid, Delivery>,
    delivery_by_order: HashMap<Uuid, Uuid>,
    claims: HashMap<Uuid, Claim>,
}

impl Tables {
    fn decrement_one(&mut self, id: Uuid, qty: i32) -> StockMutation {
        let Some(variation) = self.variations.get_mut(&id) else {
            return StockMutation::NotFound;
        };
        if variation.stock < qty {
            return StockMutation::Insufficient {
                available: variation.stock,
            };
        }
        variation.stock -= qty;
        let remaining = variation.stock;
        self.mirror_shadow(id, remaining);
        StockMutation::Applied { remaining }
    }

    fn increment_one(&mut self, id: Uuid, qty: i32) -> StockMutation {
        let Some(variation) = self.variations.get_mut(&id) else {
            return StockMutation::NotFound;
        };
        variation.stock += qty;
        let remaining = variation.stock;
        self.mirror_shadow(id, remaining);
        StockMutation::Applied { remaining }
    }

    fn mirror_shadow(&mut self, variation_id: Uuid, quantity: i32) {
        self.stock_records.insert(
            variation_id,
            StockRecord {
                variation_id,
                quantity,
                updated_at: Utc::now(),
            },
        );
    }
}

pub struct InMemoryStore {
    inner: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Tables::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn variation(&self, id: Uuid) -> Result<Option<Variation>, StoreError> {
        Ok(self.inner.lock().await.variations.get(&id).cloned())
    }

    async fn stock_record(&self, variation_id: Uuid) -> Result<Option<StockRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .stock_records
            .get(&variation_id)
            .cloned())
    }

    async fn insert_variation(&self, variation: Variation) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        let stock = variation.stock;
        let id = variation.id;
        tables.variations.insert(id, variation);
        tables.mirror_shadow(id, stock);
        Ok(())
    }

    async fn try_decrement(&self, id: Uuid, qty: i32) -> Result<StockMutation, StoreError> {
        Ok(self.inner.lock().await.decrement_one(id, qty))
    }

    async fn increment(&self, id: Uuid, qty: i32) -> Result<StockMutation, StoreError> {
        Ok(self.inner.lock().await.increment_one(id, qty))
    }

    async fn try_decrement_all(
        &self,
        lines: &[(Uuid, i32)],
    ) -> Result<BatchStockMutation, StoreError> {
        let mut tables = self.inner.lock().await;

        // Check every line before touching anything; the lock makes the
        // whole check-then-apply indivisible.
        for &(variation_id, qty) in lines {
            match tables.variations.get(&variation_id) {
                None => return Ok(BatchStockMutation::NotFound { variation_id }),
                Some(v) if v.stock < qty => {
                    return Ok(BatchStockMutation::Insufficient {
                        variation_id,
                        requested: qty,
                        available: v.stock,
                    })
                }
                Some(_) => {}
            }
        }

        for &(variation_id, qty) in lines {
            tables.decrement_one(variation_id, qty);
        }
        Ok(BatchStockMutation::Applied)
    }

    async fn increment_all(&self, lines: &[(Uuid, i32)]) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        for &(variation_id, qty) in lines {
            tables.increment_one(variation_id, qty);
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .orders
            .insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.lock().await.orders.get(&id).cloned())
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if let Some(order) = tables.orders.get_mut(&id) {
            order.status = status;
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_cascade(
        &self,
        id: Uuid,
        release_lines: &[(Uuid, i32)],
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;

        tables.orders.remove(&id);
        if let Some(delivery_id) = tables.delivery_by_order.remove(&id) {
            tables.deliveries.remove(&delivery_id);
        }
        tables.claims.retain(|_, claim| claim.order_id != id);

        for &(variation_id, qty) in release_lines {
            tables.increment_one(variation_id, qty);
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryStore for InMemoryStore {
    async fn insert(&self, delivery: &Delivery) -> Result<DeliveryInsert, StoreError> {
        let mut tables = self.inner.lock().await;
        if tables.delivery_by_order.contains_key(&delivery.order_id) {
            return Ok(DeliveryInsert::DuplicateOrder);
        }
        tables
            .delivery_by_order
            .insert(delivery.order_id, delivery.id);
        tables.deliveries.insert(delivery.id, delivery.clone());
        Ok(DeliveryInsert::Inserted)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Delivery>, StoreError> {
        Ok(self.inner.lock().await.deliveries.get(&id).cloned())
    }

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Delivery>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .delivery_by_order
            .get(&order_id)
            .and_then(|id| tables.deliveries.get(id))
            .cloned())
    }

    async fn update_status(&self, id: Uuid, status: DeliveryStatus) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if let Some(delivery) = tables.deliveries.get_mut(&id) {
            delivery.status = status;
            delivery.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if let Some(delivery) = tables.deliveries.remove(&id) {
            tables.delivery_by_order.remove(&delivery.order_id);
        }
        Ok(())
    }
}

#[async_trait]
impl ClaimStore for InMemoryStore {
    async fn insert(&self, claim: &Claim) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .claims
            .insert(claim.id, claim.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Claim>, StoreError> {
        Ok(self.inner.lock().await.claims.get(&id).cloned())
    }

    async fn list_by_order(&self, order_id: Uuid) -> Result<Vec<Claim>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .claims
            .values()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn update(&self, claim: &Claim) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .claims
            .insert(claim.id, claim.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.lock().await.claims.remove(&id);
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
