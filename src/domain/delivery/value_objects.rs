use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::order::OrderStatus;

// ============================================================================
// Delivery Value Objects
// ============================================================================

/// Delivery address fields, carried verbatim on the delivery record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// Delivery fulfillment status.
///
/// The legacy system inferred the order status from free-text wording
/// ("in progress", "delivered"). That is re-architected here as an explicit
/// enum with a declared mapping to [`OrderStatus`]; the legacy wordings
/// survive only as parse aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Scheduled,
    InTransit,
    Delivered,
}

impl DeliveryStatus {
    /// The order status this delivery status drives, if any. Propagation is
    /// one-directional: delivery -> order only.
    pub fn order_status(&self) -> Option<OrderStatus> {
        match self {
            DeliveryStatus::Scheduled => None,
            DeliveryStatus::InTransit => Some(OrderStatus::InDelivery),
            DeliveryStatus::Delivered => Some(OrderStatus::Delivered),
        }
    }

    /// A completed delivery blocks deletion of the delivery record.
    pub fn is_completed(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered)
    }

    /// Forward-only progression; a courier may complete a delivery that was
    /// never marked in transit. Setting the current status again is a no-op
    /// and allowed.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        self == next
            || matches!(
                (self, next),
                (Scheduled, InTransit) | (Scheduled, Delivered) | (InTransit, Delivered)
            )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryStatus::Scheduled => "scheduled",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
        };
        f.write_str(s)
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    // Accepts the canonical names plus the free-text wordings the legacy
    // data carried. Anything else is rejected rather than silently ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(DeliveryStatus::Scheduled),
            "in_transit" | "in transit" | "in_progress" | "in progress" => {
                Ok(DeliveryStatus::InTransit)
            }
            "delivered" | "completed" | "complete" => Ok(DeliveryStatus::Delivered),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_mapping_table() {
        assert_eq!(DeliveryStatus::Scheduled.order_status(), None);
        assert_eq!(
            DeliveryStatus::InTransit.order_status(),
            Some(OrderStatus::InDelivery)
        );
        assert_eq!(
            DeliveryStatus::Delivered.order_status(),
            Some(OrderStatus::Delivered)
        );
    }

    #[test]
    fn test_forward_only_progression() {
        use DeliveryStatus::*;
        assert!(Scheduled.can_transition_to(InTransit));
        assert!(Scheduled.can_transition_to(Delivered));
        assert!(InTransit.can_transition_to(Delivered));

        assert!(!InTransit.can_transition_to(Scheduled));
        assert!(!Delivered.can_transition_to(InTransit));
        assert!(!Delivered.can_transition_to(Scheduled));
    }

    #[test]
    fn test_same_status_is_a_permitted_noop() {
        use DeliveryStatus::*;
        for s in [Scheduled, InTransit, Delivered] {
            assert!(s.can_transition_to(s));
        }
    }

    #[test]
    fn test_legacy_wordings_parse_as_aliases() {
        assert_eq!(
            "in progress".parse::<DeliveryStatus>(),
            Ok(DeliveryStatus::InTransit)
        );
        assert_eq!(
            "In Progress".parse::<DeliveryStatus>(),
            Ok(DeliveryStatus::InTransit)
        );
        assert_eq!(
            "completed".parse::<DeliveryStatus>(),
            Ok(DeliveryStatus::Delivered)
        );
        assert_eq!(
            "Delivered".parse::<DeliveryStatus>(),
            Ok(DeliveryStatus::Delivered)
        );
    }

    #[test]
    fn test_unknown_wordings_are_rejected() {
        assert!("on the truck".parse::<DeliveryStatus>().is_err());
        assert!("".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn test_only_delivered_counts_as_completed() {
        assert!(DeliveryStatus::Delivered.is_completed());
        assert!(!DeliveryStatus::Scheduled.is_completed());
        assert!(!DeliveryStatus::InTransit.is_completed());
    }
}
