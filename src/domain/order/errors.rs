use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("an order needs at least one line")]
    EmptyLines,

    #[error("invalid line quantity: {0}")]
    InvalidQuantity(i32),

    #[error("order in terminal status {0} cannot change")]
    TerminalState(OrderStatus),

    #[error("invalid order status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("order status {0} is driven by the delivery tracker, not settable by a client")]
    DeliveryControlled(OrderStatus),

    #[error("order in status {0} cannot be deleted")]
    NotDeletable(OrderStatus),
}
