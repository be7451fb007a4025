use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A non-blocking observation logged by `RiskGate` or trade-time
/// self-trading detection: pattern flags, related-account hits, and
/// anything else worth a human review pass without rejecting the order
/// outright. Grounded in `risk_manager_v2.go`'s `logRiskEvent`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RiskEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: String,
    pub detail: String,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A blocking rejection: the check that fired, denormalized onto the
/// account it denied. Grounded in `risk_manager_v2.go`'s `logViolation`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Violation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub violation_type: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}
