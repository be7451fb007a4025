use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "withdrawal_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Processing,
    Completed,
    Rejected,
    Failed,
}

/// A user-initiated withdrawal request. Full withdrawal-risk policy
/// (KYC tiers, daily limits, quick-in-out detection) belongs to the
/// external account/custody service; the engine only freezes the
/// corresponding balance and records the request.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub chain: String,
    pub amount: Decimal,
    pub address: String,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// An address a user has pre-approved for withdrawals without the
/// additional quick-in-out scrutiny `RiskGate`'s withdrawal path applies
/// to unrecognized destinations.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WithdrawalWhitelist {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}
