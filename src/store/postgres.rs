use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::claim::{Claim, ClaimStatus};
use crate::domain::delivery::{Delivery, DeliveryAddress, DeliveryStatus};
use crate::domain::inventory::{StockRecord, Variation};
use crate::domain::order::{Order, OrderLine, OrderStatus};
use crate::utils::{retry_transient, IsTransient, RetryConfig};

use super::{
    BatchStockMutation, ClaimStore, DeliveryInsert, DeliveryStore, InventoryStore, OrderStore,
    StockMutation, StoreError,
};

// ============================================================================
// Postgres Store
// ============================================================================
//
// Stock reservation is a single conditional UPDATE:
//
//     UPDATE variations SET stock = stock - $qty
//     WHERE id = $id AND stock >= $qty
//
// so two concurrent reservations can never jointly drive stock negative,
// regardless of how many service instances run. Multi-line reservation and
// cascading deletion are multi-statement transactions; serialization and
// deadlock conflicts inside them are replayed with backoff.
//
// ============================================================================

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS variations (
        id UUID PRIMARY KEY,
        article_id UUID NOT NULL,
        stock INTEGER NOT NULL CHECK (stock >= 0)
    )",
    "CREATE TABLE IF NOT EXISTS stock_records (
        variation_id UUID PRIMARY KEY REFERENCES variations (id) ON DELETE CASCADE,
        quantity INTEGER NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        buyer_id UUID NOT NULL,
        total_price NUMERIC NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS order_lines (
        order_id UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        article_id UUID NOT NULL,
        variation_id UUID,
        quantity INTEGER NOT NULL,
        unit_price NUMERIC NOT NULL,
        PRIMARY KEY (order_id, position)
    )",
    "CREATE TABLE IF NOT EXISTS deliveries (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL UNIQUE REFERENCES orders (id) ON DELETE CASCADE,
        courier_id UUID,
        street TEXT NOT NULL,
        city TEXT NOT NULL,
        postal_code TEXT NOT NULL,
        country TEXT NOT NULL,
        scheduled_date DATE NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS claims (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        claimant_id UUID NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
];

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Create the tables when they do not exist yet. Run once at startup.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("database schema ensured");
        Ok(())
    }

    async fn decrement_all_tx(&self, lines: &[(Uuid, i32)]) -> Result<BatchStockMutation, TxError> {
        let mut tx = self.pool.begin().await.map_err(TxError)?;

        for &(variation_id, qty) in lines {
            let row = sqlx::query(
                "UPDATE variations SET stock = stock - $2
                 WHERE id = $1 AND stock >= $2
                 RETURNING stock",
            )
            .bind(variation_id)
            .bind(qty)
            .fetch_optional(&mut *tx)
            .await
            .map_err(TxError)?;

            match row {
                Some(row) => {
                    let remaining: i32 = row.try_get("stock").map_err(TxError)?;
                    mirror_shadow(&mut tx, variation_id, remaining)
                        .await
                        .map_err(TxError)?;
                }
                None => {
                    // Dropping the transaction rolls back earlier lines.
                    let available = sqlx::query("SELECT stock FROM variations WHERE id = $1")
                        .bind(variation_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(TxError)?;
                    return Ok(match available {
                        Some(row) => BatchStockMutation::Insufficient {
                            variation_id,
                            requested: qty,
                            available: row.try_get("stock").map_err(TxError)?,
                        },
                        None => BatchStockMutation::NotFound { variation_id },
                    });
                }
            }
        }

        tx.commit().await.map_err(TxError)?;
        Ok(BatchStockMutation::Applied)
    }
}

/// Transaction-scoped error wrapper: only serialization and deadlock
/// conflicts are worth replaying; the transaction is guaranteed rolled
/// back in both cases.
struct TxError(sqlx::Error);

impl std::fmt::Display for TxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl IsTransient for TxError {
    fn is_transient(&self) -> bool {
        matches!(
            &self.0,
            sqlx::Error::Database(db)
                if matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupted(e.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Mirror the shadow record after a stock mutation, inside the same
/// transaction. Zero rows updated means the shadow is missing.
async fn mirror_shadow(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    variation_id: Uuid,
    quantity: i32,
) -> Result<(), sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE stock_records SET quantity = $2, updated_at = NOW() WHERE variation_id = $1",
    )
    .bind(variation_id)
    .bind(quantity)
    .execute(&mut **tx)
    .await?;

    if updated.rows_affected() != 1 {
        tracing::error!(variation_id = %variation_id, "stock shadow record missing");
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Distinguish a missing shadow row from an ordinary backend failure.
fn shadow_err(variation_id: Uuid) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| match e {
        sqlx::Error::RowNotFound => StoreError::ShadowOutOfSync { variation_id },
        other => StoreError::from(other),
    }
}

fn order_status(row: &PgRow) -> Result<OrderStatus, StoreError> {
    let raw: String = row.try_get("status")?;
    OrderStatus::from_str(&raw).map_err(StoreError::Corrupted)
}

fn delivery_from_row(row: &PgRow) -> Result<Delivery, StoreError> {
    let raw_status: String = row.try_get("status")?;
    Ok(Delivery {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        courier_id: row.try_get("courier_id")?,
        address: DeliveryAddress {
            street: row.try_get("street")?,
            city: row.try_get("city")?,
            postal_code: row.try_get("postal_code")?,
            country: row.try_get("country")?,
        },
        scheduled_date: row.try_get::<NaiveDate, _>("scheduled_date")?,
        status: DeliveryStatus::from_str(&raw_status).map_err(StoreError::Corrupted)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn claim_from_row(row: &PgRow) -> Result<Claim, StoreError> {
    let raw_status: String = row.try_get("status")?;
    Ok(Claim {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        claimant_id: row.try_get("claimant_id")?,
        description: row.try_get("description")?,
        status: ClaimStatus::from_str(&raw_status).map_err(StoreError::Corrupted)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn variation(&self, id: Uuid) -> Result<Option<Variation>, StoreError> {
        let row = sqlx::query("SELECT id, article_id, stock FROM variations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(Variation {
                id: row.try_get("id")?,
                article_id: row.try_get("article_id")?,
                stock: row.try_get("stock")?,
            })
        })
        .transpose()
        .map_err(StoreError::from)
    }

    async fn stock_record(&self, variation_id: Uuid) -> Result<Option<StockRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT variation_id, quantity, updated_at FROM stock_records WHERE variation_id = $1",
        )
        .bind(variation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(StockRecord {
                variation_id: row.try_get("variation_id")?,
                quantity: row.try_get("quantity")?,
                updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            })
        })
        .transpose()
        .map_err(StoreError::from)
    }

    async fn insert_variation(&self, variation: Variation) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO variations (id, article_id, stock) VALUES ($1, $2, $3)")
            .bind(variation.id)
            .bind(variation.article_id)
            .bind(variation.stock)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO stock_records (variation_id, quantity, updated_at) VALUES ($1, $2, NOW())",
        )
        .bind(variation.id)
        .bind(variation.stock)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn try_decrement(&self, id: Uuid, qty: i32) -> Result<StockMutation, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "UPDATE variations SET stock = stock - $2
             WHERE id = $1 AND stock >= $2
             RETURNING stock",
        )
        .bind(id)
        .bind(qty)
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => {
                let remaining: i32 = row.try_get("stock")?;
                mirror_shadow(&mut tx, id, remaining)
                    .await
                    .map_err(shadow_err(id))?;
                tx.commit().await?;
                Ok(StockMutation::Applied { remaining })
            }
            None => {
                let available = sqlx::query("SELECT stock FROM variations WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
                Ok(match available {
                    Some(row) => StockMutation::Insufficient {
                        available: row.try_get("stock")?,
                    },
                    None => StockMutation::NotFound,
                })
            }
        }
    }

    async fn increment(&self, id: Uuid, qty: i32) -> Result<StockMutation, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "UPDATE variations SET stock = stock + $2 WHERE id = $1 RETURNING stock",
        )
        .bind(id)
        .bind(qty)
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => {
                let remaining: i32 = row.try_get("stock")?;
                mirror_shadow(&mut tx, id, remaining)
                    .await
                    .map_err(shadow_err(id))?;
                tx.commit().await?;
                Ok(StockMutation::Applied { remaining })
            }
            None => Ok(StockMutation::NotFound),
        }
    }

    async fn try_decrement_all(
        &self,
        lines: &[(Uuid, i32)],
    ) -> Result<BatchStockMutation, StoreError> {
        retry_transient(RetryConfig::in_request(), |_attempt| {
            self.decrement_all_tx(lines)
        })
        .await
        .map_err(|TxError(e)| StoreError::from(e))
    }

    async fn increment_all(&self, lines: &[(Uuid, i32)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for &(variation_id, qty) in lines {
            let row = sqlx::query(
                "UPDATE variations SET stock = stock + $2 WHERE id = $1 RETURNING stock",
            )
            .bind(variation_id)
            .bind(qty)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = row {
                let remaining: i32 = row.try_get("stock")?;
                mirror_shadow(&mut tx, variation_id, remaining)
                    .await
                    .map_err(shadow_err(variation_id))?;
            } else {
                tracing::warn!(variation_id = %variation_id, "release for unknown variation skipped");
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (id, buyer_id, total_price, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(order.id)
        .bind(order.buyer_id)
        .bind(order.total_price)
        .bind(order.status.to_string())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_lines
                     (order_id, position, article_id, variation_id, quantity, unit_price)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.id)
            .bind(position as i32)
            .bind(line.article_id)
            .bind(line.variation_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let Some(row) = sqlx::query(
            "SELECT id, buyer_id, total_price, status, created_at, updated_at
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let line_rows = sqlx::query(
            "SELECT article_id, variation_id, quantity, unit_price
             FROM order_lines WHERE order_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut lines = Vec::with_capacity(line_rows.len());
        for line_row in &line_rows {
            lines.push(OrderLine {
                article_id: line_row.try_get("article_id")?,
                variation_id: line_row.try_get("variation_id")?,
                quantity: line_row.try_get("quantity")?,
                unit_price: line_row.try_get::<Decimal, _>("unit_price")?,
            });
        }

        Ok(Some(Order {
            id: row.try_get("id")?,
            buyer_id: row.try_get("buyer_id")?,
            lines,
            total_price: row.try_get::<Decimal, _>("total_price")?,
            status: order_status(&row)?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        }))
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_cascade(
        &self,
        id: Uuid,
        release_lines: &[(Uuid, i32)],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for &(variation_id, qty) in release_lines {
            let row = sqlx::query(
                "UPDATE variations SET stock = stock + $2 WHERE id = $1 RETURNING stock",
            )
            .bind(variation_id)
            .bind(qty)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = row {
                let remaining: i32 = row.try_get("stock")?;
                mirror_shadow(&mut tx, variation_id, remaining)
                    .await
                    .map_err(shadow_err(variation_id))?;
            }
        }

        // Lines, delivery, and claims go with the order via ON DELETE CASCADE.
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryStore for PgStore {
    async fn insert(&self, delivery: &Delivery) -> Result<DeliveryInsert, StoreError> {
        // The UNIQUE (order_id) constraint makes the 1:1 check atomic.
        let result = sqlx::query(
            "INSERT INTO deliveries
                 (id, order_id, courier_id, street, city, postal_code, country,
                  scheduled_date, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (order_id) DO NOTHING",
        )
        .bind(delivery.id)
        .bind(delivery.order_id)
        .bind(delivery.courier_id)
        .bind(&delivery.address.street)
        .bind(&delivery.address.city)
        .bind(&delivery.address.postal_code)
        .bind(&delivery.address.country)
        .bind(delivery.scheduled_date)
        .bind(delivery.status.to_string())
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(DeliveryInsert::DuplicateOrder)
        } else {
            Ok(DeliveryInsert::Inserted)
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Delivery>, StoreError> {
        let row = sqlx::query("SELECT * FROM deliveries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Delivery>, StoreError> {
        let row = sqlx::query("SELECT * FROM deliveries WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn update_status(&self, id: Uuid, status: DeliveryStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE deliveries SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM deliveries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClaimStore for PgStore {
    async fn insert(&self, claim: &Claim) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO claims
                 (id, order_id, claimant_id, description, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(claim.id)
        .bind(claim.order_id)
        .bind(claim.claimant_id)
        .bind(&claim.description)
        .bind(claim.status.to_string())
        .bind(claim.created_at)
        .bind(claim.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Claim>, StoreError> {
        let row = sqlx::query("SELECT * FROM claims WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(claim_from_row).transpose()
    }

    async fn list_by_order(&self, order_id: Uuid) -> Result<Vec<Claim>, StoreError> {
        let rows = sqlx::query("SELECT * FROM claims WHERE order_id = $1 ORDER BY created_at")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(claim_from_row).collect()
    }

    async fn update(&self, claim: &Claim) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE claims SET description = $2, status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(claim.id)
        .bind(&claim.description)
        .bind(claim.status.to_string())
        .bind(claim.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM claims WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// The conditional-update and transaction paths above need a live Postgres;
// they are exercised by the in-memory twin's unit tests (same trait
// contract) and by integration runs against a real database.
