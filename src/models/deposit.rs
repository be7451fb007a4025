use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "deposit_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Confirmed,
    Credited,
    Failed,
}

/// An external deposit observed by a chain-watching collaborator and
/// credited to a user's `UserAsset.available` once confirmed. The engine
/// itself never originates a deposit; it only records and settles against
/// one.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Deposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub chain: String,
    pub amount: Decimal,
    pub tx_hash: String,
    pub status: DepositStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}
