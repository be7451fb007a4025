#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A user's balance of a single currency. Invariants: `available >= 0`,
/// `frozen >= 0`; the sum of `available + frozen` across a match is
/// preserved apart from the fee debit (see `crate::ledger`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAsset {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub chain: String,
    pub available: Decimal,
    pub frozen: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl UserAsset {
    pub fn total(&self) -> Decimal {
        self.available + self.frozen
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub currency: String,
    pub available: Decimal,
    pub frozen: Decimal,
    pub total: Decimal,
}

impl From<UserAsset> for BalanceResponse {
    fn from(asset: UserAsset) -> Self {
        Self {
            currency: asset.currency.clone(),
            available: asset.available,
            frozen: asset.frozen,
            total: asset.total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn total_sums_available_and_frozen() {
        let asset = UserAsset {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            currency: "USDT".into(),
            chain: "".into(),
            available: dec!(100),
            frozen: dec!(25),
            updated_at: Utc::now(),
        };
        assert_eq!(asset.total(), dec!(125));
    }
}
