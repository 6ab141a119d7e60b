// ============================================================================
// Claim Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClaimError {
    #[error("a claim needs a non-empty description")]
    EmptyDescription,
}
