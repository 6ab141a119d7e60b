// ============================================================================
// Inventory Domain - Variations, Stock Shadow, Stock Ledger
// ============================================================================
//
// The stock counter is the only contended resource in the system; the
// ledger routes every mutation through the store's atomic conditional
// updates and keeps the audit shadow in lockstep.
//
// ============================================================================

pub mod errors;
pub mod ledger;
pub mod value_objects;

pub use errors::StockError;
pub use ledger::StockLedger;
pub use value_objects::{StockRecord, Variation};
