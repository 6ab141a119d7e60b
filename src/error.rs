use uuid::Uuid;

use crate::auth::AuthError;
use crate::domain::claim::ClaimError;
use crate::domain::delivery::DeliveryError;
use crate::domain::inventory::StockError;
use crate::domain::order::{OrderError, OrderStatus};
use crate::store::StoreError;
use crate::utils::IsTransient;

// ============================================================================
// Error Taxonomy
// ============================================================================
//
// Every operation surfaces exactly one of these. Domain module errors
// convert in at the orchestrator boundary; the API layer maps kinds to
// HTTP statuses. Nothing is swallowed on the way except notification-sink
// failures, which are logged by the orchestrator.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    // --- Validation: rejected before any state change ---
    #[error("invalid request: {0}")]
    Validation(String),

    // --- NotFound / Forbidden / Unauthenticated ---
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("caller is not allowed to perform this operation")]
    Forbidden,

    #[error("authentication failed")]
    Unauthenticated,

    // --- Conflicts: the requested transition contradicts current state ---
    #[error("insufficient stock for variation {variation_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variation_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("order {order_id} already has a delivery")]
    DeliveryAlreadyExists { order_id: Uuid },

    #[error("a completed delivery cannot be deleted")]
    DeliveryAlreadyCompleted,

    #[error("order in status {status} cannot be deleted")]
    InvalidStateForDeletion { status: OrderStatus },

    #[error("order in terminal status {status} cannot change")]
    TerminalStateViolation { status: OrderStatus },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    // --- Dependency: persistence layer failed; safe to retry the whole op ---
    #[error("storage dependency failure: {0}")]
    Dependency(#[from] StoreError),
}

/// Stable error kind, the unit the API layer maps to an HTTP status and
/// the metrics label on failed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Unauthenticated,
    Conflict,
    Dependency,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Dependency => "dependency",
        }
    }
}

impl FulfillmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::Validation(_) => ErrorKind::Validation,
            FulfillmentError::NotFound(_) => ErrorKind::NotFound,
            FulfillmentError::Forbidden => ErrorKind::Forbidden,
            FulfillmentError::Unauthenticated => ErrorKind::Unauthenticated,
            FulfillmentError::InsufficientStock { .. }
            | FulfillmentError::DeliveryAlreadyExists { .. }
            | FulfillmentError::DeliveryAlreadyCompleted
            | FulfillmentError::InvalidStateForDeletion { .. }
            | FulfillmentError::TerminalStateViolation { .. }
            | FulfillmentError::InvalidStatusTransition { .. } => ErrorKind::Conflict,
            FulfillmentError::Dependency(_) => ErrorKind::Dependency,
        }
    }
}

impl IsTransient for FulfillmentError {
    fn is_transient(&self) -> bool {
        match self {
            FulfillmentError::Dependency(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<AuthError> for FulfillmentError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated => FulfillmentError::Unauthenticated,
        }
    }
}

impl From<OrderError> for FulfillmentError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::EmptyLines | OrderError::InvalidQuantity(_) => {
                FulfillmentError::Validation(e.to_string())
            }
            OrderError::DeliveryControlled(_) => FulfillmentError::Validation(e.to_string()),
            OrderError::TerminalState(status) => {
                FulfillmentError::TerminalStateViolation { status }
            }
            OrderError::InvalidTransition { from, to } => FulfillmentError::InvalidStatusTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            OrderError::NotDeletable(status) => {
                FulfillmentError::InvalidStateForDeletion { status }
            }
        }
    }
}

impl From<StockError> for FulfillmentError {
    fn from(e: StockError) -> Self {
        match e {
            StockError::Insufficient {
                variation_id,
                requested,
                available,
            } => FulfillmentError::InsufficientStock {
                variation_id,
                requested,
                available,
            },
            StockError::VariationNotFound(_) => FulfillmentError::NotFound("variation"),
            StockError::InvalidQuantity(_) => FulfillmentError::Validation(e.to_string()),
            StockError::Store(inner) => FulfillmentError::Dependency(inner),
        }
    }
}

impl From<DeliveryError> for FulfillmentError {
    fn from(e: DeliveryError) -> Self {
        match e {
            DeliveryError::AlreadyExists(order_id) => {
                FulfillmentError::DeliveryAlreadyExists { order_id }
            }
            DeliveryError::AlreadyCompleted => FulfillmentError::DeliveryAlreadyCompleted,
            DeliveryError::InvalidTransition { from, to } => {
                FulfillmentError::InvalidStatusTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                }
            }
        }
    }
}

impl From<ClaimError> for FulfillmentError {
    fn from(e: ClaimError) -> Self {
        match e {
            ClaimError::EmptyDescription => FulfillmentError::Validation(e.to_string()),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
