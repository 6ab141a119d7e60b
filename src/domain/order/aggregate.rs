use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;
use super::value_objects::{OrderLine, OrderStatus};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// Owns the line items, the snapshotted total price, and the status state
// machine. Stock mutations themselves live in the stock ledger; the
// aggregate only *decides* when a reservation must be released, and reports
// that decision as a side effect for the orchestrator to carry out.
//
// ============================================================================

/// What the caller must do to the stock ledger after a successful
/// transition or deletion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    /// Reservation stays as it is (or was already released/consumed).
    None,
    /// Release every reserved line quantity, exactly once.
    Release,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a new pending order from validated lines. The total is the sum
    /// of the line subtotals at their snapshotted unit prices.
    pub fn new(buyer_id: Uuid, lines: Vec<OrderLine>) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::EmptyLines);
        }
        for line in &lines {
            if line.quantity <= 0 {
                return Err(OrderError::InvalidQuantity(line.quantity));
            }
        }

        let total_price = lines.iter().map(OrderLine::subtotal).sum();
        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            buyer_id,
            lines,
            total_price,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// The (variation, quantity) pairs this order holds reservations for.
    /// Lines without a variation carry no stock and reserve nothing.
    pub fn reserved_lines(&self) -> Vec<(Uuid, i32)> {
        self.lines
            .iter()
            .filter_map(|l| l.variation_id.map(|v| (v, l.quantity)))
            .collect()
    }

    /// Apply a status transition, validating it against the state machine.
    ///
    /// Returns the stock side effect the orchestrator must apply. A release
    /// is emitted exactly once per order: on entering `cancelled`, or on
    /// `pending -> refunded`. `cancelled -> refunded` emits nothing because
    /// cancellation already released.
    pub fn transition(&mut self, to: OrderStatus) -> Result<StockEffect, OrderError> {
        let from = self.status;
        if from.is_terminal() {
            return Err(OrderError::TerminalState(from));
        }
        if !from.can_transition_to(to) {
            return Err(OrderError::InvalidTransition { from, to });
        }

        let effect = match (from, to) {
            (_, OrderStatus::Cancelled) => StockEffect::Release,
            (OrderStatus::Pending, OrderStatus::Refunded) => StockEffect::Release,
            _ => StockEffect::None,
        };

        self.status = to;
        self.updated_at = Utc::now();
        Ok(effect)
    }

    /// A transition requested by a client (buyer, seller, or administrator),
    /// as opposed to one driven by the delivery tracker.
    ///
    /// Delivery-driven targets are rejected outright, and `preparing` is
    /// only reachable from `pending` here; the `ready_for_delivery ->
    /// preparing` edge belongs to delivery deletion alone.
    pub fn client_transition(&mut self, to: OrderStatus) -> Result<StockEffect, OrderError> {
        if to.is_delivery_driven() {
            return Err(OrderError::DeliveryControlled(to));
        }
        if to == OrderStatus::Preparing && self.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.transition(to)
    }

    /// Check deletion eligibility and compute its stock side effect without
    /// mutating the order. Deletion is permitted only from `pending` or
    /// `cancelled`, and releases stock only when the order is still
    /// `pending` (a cancelled order released at cancellation).
    pub fn deletion_effect(&self) -> Result<StockEffect, OrderError> {
        if !self.status.is_deletable() {
            return Err(OrderError::NotDeletable(self.status));
        }
        if self.status.holds_reservation() {
            Ok(StockEffect::Release)
        } else {
            Ok(StockEffect::None)
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(variation: Option<Uuid>, quantity: i32, price: Decimal) -> OrderLine {
        OrderLine {
            article_id: Uuid::new_v4(),
            variation_id: variation,
            quantity,
            unit_price: price,
        }
    }

    fn pending_order() -> Order {
        Order::new(
            Uuid::new_v4(),
            vec![line(Some(Uuid::new_v4()), 2, Decimal::new(1000, 2))],
        )
        .unwrap()
    }

    #[test]
    fn test_new_order_is_pending_with_summed_total() {
        let order = Order::new(
            Uuid::new_v4(),
            vec![
                line(Some(Uuid::new_v4()), 2, Decimal::new(1000, 2)), // 2 x 10.00
                line(None, 1, Decimal::new(550, 2)),                  // 1 x 5.50
            ],
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_price, Decimal::new(2550, 2));
    }

    #[test]
    fn test_new_order_rejects_empty_and_bad_quantities() {
        let buyer = Uuid::new_v4();
        assert_eq!(Order::new(buyer, vec![]), Err(OrderError::EmptyLines));

        let bad = line(None, 0, Decimal::ONE);
        assert_eq!(
            Order::new(buyer, vec![bad]),
            Err(OrderError::InvalidQuantity(0))
        );
    }

    #[test]
    fn test_reserved_lines_skip_variationless_lines() {
        let variation = Uuid::new_v4();
        let order = Order::new(
            Uuid::new_v4(),
            vec![
                line(Some(variation), 3, Decimal::ONE),
                line(None, 1, Decimal::ONE),
            ],
        )
        .unwrap();

        assert_eq!(order.reserved_lines(), vec![(variation, 3)]);
    }

    #[test]
    fn test_cancellation_releases_stock() {
        let mut order = pending_order();
        let effect = order.transition(OrderStatus::Cancelled).unwrap();
        assert_eq!(effect, StockEffect::Release);
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_refund_after_cancellation_does_not_release_again() {
        let mut order = pending_order();
        order.transition(OrderStatus::Cancelled).unwrap();
        let effect = order.transition(OrderStatus::Refunded).unwrap();
        assert_eq!(effect, StockEffect::None);
    }

    #[test]
    fn test_direct_refund_from_pending_releases() {
        let mut order = pending_order();
        let effect = order.transition(OrderStatus::Refunded).unwrap();
        assert_eq!(effect, StockEffect::Release);
    }

    #[test]
    fn test_terminal_state_blocks_everything() {
        let mut order = pending_order();
        order.transition(OrderStatus::Refunded).unwrap();

        assert_eq!(
            order.transition(OrderStatus::Pending),
            Err(OrderError::TerminalState(OrderStatus::Refunded))
        );
    }

    #[test]
    fn test_client_cannot_set_delivery_driven_statuses() {
        let mut order = pending_order();
        for target in [
            OrderStatus::ReadyForDelivery,
            OrderStatus::InDelivery,
            OrderStatus::Delivered,
        ] {
            assert_eq!(
                order.client_transition(target),
                Err(OrderError::DeliveryControlled(target))
            );
        }
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_client_preparing_only_from_pending() {
        let mut order = pending_order();
        order.transition(OrderStatus::ReadyForDelivery).unwrap();

        // The revert edge exists in the machine for delivery deletion, but a
        // client must not be able to walk it.
        assert_eq!(
            order.client_transition(OrderStatus::Preparing),
            Err(OrderError::InvalidTransition {
                from: OrderStatus::ReadyForDelivery,
                to: OrderStatus::Preparing,
            })
        );
    }

    #[test]
    fn test_deletion_effect_by_status() {
        let order = pending_order();
        assert_eq!(order.deletion_effect(), Ok(StockEffect::Release));

        let mut cancelled = pending_order();
        cancelled.transition(OrderStatus::Cancelled).unwrap();
        assert_eq!(cancelled.deletion_effect(), Ok(StockEffect::None));

        let mut prepared = pending_order();
        prepared.transition(OrderStatus::Preparing).unwrap();
        assert_eq!(
            prepared.deletion_effect(),
            Err(OrderError::NotDeletable(OrderStatus::Preparing))
        );
    }
}
