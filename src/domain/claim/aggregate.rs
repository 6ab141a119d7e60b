use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::ClaimError;
use super::value_objects::ClaimStatus;

// ============================================================================
// Claim - Dispute Record against an Order
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub id: Uuid,
    pub order_id: Uuid,
    pub claimant_id: Uuid,
    pub description: String,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    pub fn new(order_id: Uuid, claimant_id: Uuid, description: String) -> Result<Self, ClaimError> {
        if description.trim().is_empty() {
            return Err(ClaimError::EmptyDescription);
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            order_id,
            claimant_id,
            description,
            status: ClaimStatus::PendingReview,
            created_at: now,
            updated_at: now,
        })
    }

    /// Administrator-driven status move. Any enum value is reachable from
    /// any other; claims carry no state machine of their own.
    pub fn set_status(&mut self, status: ClaimStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Claimant-driven free-text update.
    pub fn set_description(&mut self, description: String) -> Result<(), ClaimError> {
        if description.trim().is_empty() {
            return Err(ClaimError::EmptyDescription);
        }
        self.description = description;
        self.updated_at = Utc::now();
        Ok(())
    }
}
