use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identity / Authorization Collaborator
// ============================================================================
//
// The real identity provider lives outside this service; its contract is
// "token in, {user_id, role} out". The orchestrator only ever sees the
// resolved AuthContext. StaticIdentityProvider is the dev/test stand-in.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Seller,
    Courier,
    Administrator,
}

/// The resolved caller of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication failed")]
    Unauthenticated,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to a caller, or fail with `Unauthenticated`.
    async fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError>;
}

/// Fixed token -> caller map for dev mode and tests.
#[derive(Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, AuthContext>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, context: AuthContext) -> Self {
        self.tokens.insert(token.to_string(), context);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError> {
        self.tokens
            .get(token)
            .copied()
            .ok_or(AuthError::Unauthenticated)
    }
}
