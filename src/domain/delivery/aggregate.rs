use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DeliveryError;
use super::value_objects::{DeliveryAddress, DeliveryStatus};

// ============================================================================
// Delivery - Fulfillment Record for one Order
// ============================================================================
//
// At most one delivery exists per order (the store enforces the uniqueness
// atomically; the aggregate only models the record and its own small state
// machine). Its status is the externally visible fulfillment state and
// feeds back into the order status through the mapping table in
// value_objects.rs.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Assigned courier; nullable until dispatch assigns one.
    pub courier_id: Option<Uuid>,
    pub address: DeliveryAddress,
    pub scheduled_date: NaiveDate,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(
        order_id: Uuid,
        address: DeliveryAddress,
        courier_id: Option<Uuid>,
        scheduled_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            courier_id,
            address,
            scheduled_date,
            status: DeliveryStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the given user is the courier assigned to this delivery.
    pub fn is_assigned_to(&self, user_id: Uuid) -> bool {
        self.courier_id == Some(user_id)
    }

    /// Advance the delivery status. Returns `true` when the status actually
    /// changed (a same-status update is a permitted no-op that must not
    /// re-trigger order propagation).
    pub fn set_status(&mut self, to: DeliveryStatus) -> Result<bool, DeliveryError> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(DeliveryError::InvalidTransition { from, to });
        }
        if from == to {
            return Ok(false);
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(true)
    }

    /// Deletion is permitted only while the delivery is not completed.
    pub fn check_deletable(&self) -> Result<(), DeliveryError> {
        if self.status.is_completed() {
            return Err(DeliveryError::AlreadyCompleted);
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery() -> Delivery {
        Delivery::new(
            Uuid::new_v4(),
            DeliveryAddress {
                street: "12 quai des Chartrons".into(),
                city: "Bordeaux".into(),
                postal_code: "33000".into(),
                country: "FR".into(),
            },
            None,
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        )
    }

    #[test]
    fn test_new_delivery_starts_scheduled() {
        let d = delivery();
        assert_eq!(d.status, DeliveryStatus::Scheduled);
        assert_eq!(d.courier_id, None);
    }

    #[test]
    fn test_set_status_reports_actual_change() {
        let mut d = delivery();
        assert!(d.set_status(DeliveryStatus::InTransit).unwrap());
        // Same status again: permitted, but no change to propagate.
        assert!(!d.set_status(DeliveryStatus::InTransit).unwrap());
        assert!(d.set_status(DeliveryStatus::Delivered).unwrap());
    }

    #[test]
    fn test_set_status_rejects_backward_moves() {
        let mut d = delivery();
        d.set_status(DeliveryStatus::Delivered).unwrap();
        assert_eq!(
            d.set_status(DeliveryStatus::Scheduled),
            Err(DeliveryError::InvalidTransition {
                from: DeliveryStatus::Delivered,
                to: DeliveryStatus::Scheduled,
            })
        );
    }

    #[test]
    fn test_completed_delivery_is_not_deletable() {
        let mut d = delivery();
        assert_eq!(d.check_deletable(), Ok(()));

        d.set_status(DeliveryStatus::Delivered).unwrap();
        assert_eq!(d.check_deletable(), Err(DeliveryError::AlreadyCompleted));
    }

    #[test]
    fn test_courier_assignment_check() {
        let courier = Uuid::new_v4();
        let mut d = delivery();
        assert!(!d.is_assigned_to(courier));

        d.courier_id = Some(courier);
        assert!(d.is_assigned_to(courier));
        assert!(!d.is_assigned_to(Uuid::new_v4()));
    }
}
