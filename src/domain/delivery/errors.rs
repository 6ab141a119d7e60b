use uuid::Uuid;

use super::value_objects::DeliveryStatus;

// ============================================================================
// Delivery Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeliveryError {
    #[error("order {0} already has a delivery")]
    AlreadyExists(Uuid),

    #[error("a completed delivery cannot be deleted")]
    AlreadyCompleted,

    #[error("invalid delivery status transition: {from} -> {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
}
