use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Claim Value Objects
// ============================================================================

/// Claim review status. Enum-constrained; only an administrator moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    PendingReview,
    InProgress,
    Rejected,
    Refunded,
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClaimStatus::PendingReview => "pending_review",
            ClaimStatus::InProgress => "in_progress",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending_review" => Ok(ClaimStatus::PendingReview),
            "in_progress" => Ok(ClaimStatus::InProgress),
            "rejected" => Ok(ClaimStatus::Rejected),
            "refunded" => Ok(ClaimStatus::Refunded),
            other => Err(format!("unknown claim status: {other}")),
        }
    }
}
