use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Order Value Objects
// ============================================================================

/// A single product/variation/quantity entry within an order.
///
/// The unit price is snapshotted from the catalog at creation time; it is
/// never re-read from the live article afterwards.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderLine {
    pub article_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderLine {
    /// Line total at the snapshotted unit price.
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Order lifecycle status.
///
/// Happy path: `pending → preparing → ready_for_delivery → in_delivery →
/// delivered`. Side branches: `pending|preparing → cancelled` and
/// `cancelled|pending → refunded`. `delivered` and `refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Preparing,
    ReadyForDelivery,
    InDelivery,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// No transition is permitted out of a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Refunded)
    }

    /// Orders may only be destroyed while pending or cancelled.
    pub fn is_deletable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Cancelled)
    }

    /// Whether stock reserved at creation is still held in this status.
    /// Delivered orders have consumed their reservation; cancelled and
    /// refunded orders have released it.
    pub fn holds_reservation(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending
                | OrderStatus::Preparing
                | OrderStatus::ReadyForDelivery
                | OrderStatus::InDelivery
        )
    }

    /// The declared transition table.
    ///
    /// `ready_for_delivery → preparing` and `in_delivery → preparing` are the
    /// reverts applied when a not-yet-completed delivery is deleted.
    /// `ready_for_delivery → delivered` covers a courier completing a
    /// delivery that was never marked in transit.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Preparing)
                | (Pending, ReadyForDelivery)
                | (Preparing, ReadyForDelivery)
                | (ReadyForDelivery, InDelivery)
                | (ReadyForDelivery, Delivered)
                | (ReadyForDelivery, Preparing)
                | (InDelivery, Delivered)
                | (InDelivery, Preparing)
                | (Pending, Cancelled)
                | (Preparing, Cancelled)
                | (Pending, Refunded)
                | (Cancelled, Refunded)
        )
    }

    /// Statuses reached only through the delivery tracker, never set
    /// directly by a client.
    pub fn is_delivery_driven(&self) -> bool {
        matches!(
            self,
            OrderStatus::ReadyForDelivery | OrderStatus::InDelivery | OrderStatus::Delivered
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::ReadyForDelivery => "ready_for_delivery",
            OrderStatus::InDelivery => "in_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    // Stored status strings vary in casing across the legacy data, so
    // parsing is case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready_for_delivery" => Ok(OrderStatus::ReadyForDelivery),
            "in_delivery" => Ok(OrderStatus::InDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_line_subtotal() {
        let line = OrderLine {
            article_id: Uuid::new_v4(),
            variation_id: Some(Uuid::new_v4()),
            quantity: 3,
            unit_price: Decimal::new(1250, 2), // 12.50
        };
        assert_eq!(line.subtotal(), Decimal::new(3750, 2));
    }

    #[test]
    fn test_happy_path_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(ReadyForDelivery));
        assert!(ReadyForDelivery.can_transition_to(InDelivery));
        assert!(InDelivery.can_transition_to(Delivered));
    }

    #[test]
    fn test_side_branches() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Preparing.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Refunded));
        assert!(Cancelled.can_transition_to(Refunded));
    }

    #[test]
    fn test_terminal_statuses_have_no_outgoing_edges() {
        use OrderStatus::*;
        let all = [
            Pending,
            Preparing,
            ReadyForDelivery,
            InDelivery,
            Delivered,
            Cancelled,
            Refunded,
        ];
        for next in all {
            assert!(!Delivered.can_transition_to(next), "delivered -> {next}");
            assert!(!Refunded.can_transition_to(next), "refunded -> {next}");
        }
        assert!(Delivered.is_terminal());
        assert!(Refunded.is_terminal());
    }

    #[test]
    fn test_forbidden_transitions() {
        use OrderStatus::*;
        assert!(!Pending.can_transition_to(InDelivery));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Preparing.can_transition_to(Delivered));
        assert!(!ReadyForDelivery.can_transition_to(Cancelled));
        assert!(!InDelivery.can_transition_to(Cancelled));
        assert!(!Preparing.can_transition_to(Refunded));
    }

    #[test]
    fn test_deletable_statuses() {
        use OrderStatus::*;
        assert!(Pending.is_deletable());
        assert!(Cancelled.is_deletable());
        assert!(!Preparing.is_deletable());
        assert!(!Delivered.is_deletable());
        assert!(!Refunded.is_deletable());
    }

    #[test]
    fn test_reservation_held_until_release_or_fulfillment() {
        use OrderStatus::*;
        assert!(Pending.holds_reservation());
        assert!(InDelivery.holds_reservation());
        assert!(!Delivered.holds_reservation());
        assert!(!Cancelled.holds_reservation());
        assert!(!Refunded.holds_reservation());
    }

    #[test]
    fn test_parsing_is_case_insensitive() {
        // Legacy rows carry mixed casing.
        assert_eq!("Pending".parse::<OrderStatus>(), Ok(OrderStatus::Pending));
        assert_eq!(
            "READY_FOR_DELIVERY".parse::<OrderStatus>(),
            Ok(OrderStatus::ReadyForDelivery)
        );
        assert_eq!(
            " delivered ".parse::<OrderStatus>(),
            Ok(OrderStatus::Delivered)
        );
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        use OrderStatus::*;
        for status in [
            Pending,
            Preparing,
            ReadyForDelivery,
            InDelivery,
            Delivered,
            Cancelled,
            Refunded,
        ] {
            assert_eq!(status.to_string().parse::<OrderStatus>(), Ok(status));
        }
    }
}
