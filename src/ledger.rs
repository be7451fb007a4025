//! Component F: atomic balance transitions.
//!
//! Every operation here is a single Postgres transaction: `SELECT ... FOR
//! UPDATE` the row(s) involved, check the invariant, write the new split,
//! commit. A failure on any leg rolls the whole transaction back, which is
//! what lets `orchestrator::TradingService` treat a settlement failure as
//! "this trade never happened" on failure.
//!
//! Grounded on `order_service.go`'s `freezeOrderAssetsWithTx` /
//! `processTradeSettlementWithTx`: that source takes the same four-leg shape
//! (buyer base credit, buyer quote debit, seller base debit, seller quote
//! credit) inside one GORM transaction. We preserve the chain constant
//! ("ERC20") the source hardcodes for every asset row, since nothing in this
//! engine distinguishes settlement by chain.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Trade;

/// Asset rows created by this engine all live on this chain identifier,
/// matching the source's hardcoded "ERC20" — settlement never branches on
/// chain, only currency.
pub const DEFAULT_CHAIN: &str = "ERC20";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient available balance: user {user_id} currency {currency}")]
    InsufficientAvailable { user_id: Uuid, currency: String },
    #[error("insufficient frozen balance: user {user_id} currency {currency}")]
    InsufficientFrozen { user_id: Uuid, currency: String },
    #[error("no asset row for user {user_id} currency {currency}")]
    MissingAsset { user_id: Uuid, currency: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn kind(&self) -> crate::errors::ErrorKind {
        use crate::errors::ErrorKind;
        match self {
            LedgerError::InsufficientAvailable { .. } | LedgerError::InsufficientFrozen { .. } => {
                ErrorKind::InsufficientBalance
            }
            LedgerError::MissingAsset { .. } | LedgerError::Database(_) => ErrorKind::Internal,
        }
    }
}

/// Atomic freeze/unfreeze/settle transitions over the `user_assets` table.
pub struct LedgerWriter {
    pool: PgPool,
}

impl LedgerWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Moves `amount` from available to frozen. Requires `available >=
    /// amount`; rejects and leaves the row untouched otherwise.
    pub async fn freeze(&self, user_id: Uuid, currency: &str, amount: Decimal) -> Result<(), LedgerError> {
        tracing::trace!(%user_id, currency, %amount, "ledger: freeze");
        let mut tx = self.pool.begin().await?;
        let row = lock_asset(&mut tx, user_id, currency).await?;
        if row.available < amount {
            return Err(LedgerError::InsufficientAvailable {
                user_id,
                currency: currency.to_string(),
            });
        }
        update_asset(&mut tx, user_id, currency, -amount, amount).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Moves `amount` back from frozen to available. Requires `frozen >=
    /// amount`.
    pub async fn unfreeze(&self, user_id: Uuid, currency: &str, amount: Decimal) -> Result<(), LedgerError> {
        tracing::trace!(%user_id, currency, %amount, "ledger: unfreeze");
        let mut tx = self.pool.begin().await?;
        let row = lock_asset(&mut tx, user_id, currency).await?;
        if row.frozen < amount {
            return Err(LedgerError::InsufficientFrozen {
                user_id,
                currency: currency.to_string(),
            });
        }
        update_asset(&mut tx, user_id, currency, amount, -amount).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Settles one trade: buyer receives base into available and pays
    /// quote+fee out of frozen; seller pays base+fee out of frozen and
    /// receives quote into available. All four legs commit together or not
    /// at all.
    pub async fn settle(&self, trade: &Trade, base_currency: &str, quote_currency: &str) -> Result<(), LedgerError> {
        tracing::trace!(trade_id = %trade.id, "ledger: settle");
        let mut tx = self.pool.begin().await?;

        // Buyer: +quantity base available, -(amount + buyer_fee) quote frozen.
        update_asset(&mut tx, trade.buyer_id, base_currency, trade.quantity, Decimal::ZERO).await?;
        let buyer_quote = lock_asset(&mut tx, trade.buyer_id, quote_currency).await?;
        let buyer_quote_debit = trade.amount + trade.buyer_fee;
        if buyer_quote.frozen < buyer_quote_debit {
            return Err(LedgerError::InsufficientFrozen {
                user_id: trade.buyer_id,
                currency: quote_currency.to_string(),
            });
        }
        update_asset(&mut tx, trade.buyer_id, quote_currency, Decimal::ZERO, -buyer_quote_debit).await?;

        // Seller: -(quantity + seller_fee) base frozen, +amount quote available.
        let seller_base = lock_asset(&mut tx, trade.seller_id, base_currency).await?;
        let seller_base_debit = trade.quantity + trade.seller_fee;
        if seller_base.frozen < seller_base_debit {
            return Err(LedgerError::InsufficientFrozen {
                user_id: trade.seller_id,
                currency: base_currency.to_string(),
            });
        }
        update_asset(&mut tx, trade.seller_id, base_currency, Decimal::ZERO, -seller_base_debit).await?;
        update_asset(&mut tx, trade.seller_id, quote_currency, trade.amount, Decimal::ZERO).await?;

        tx.commit().await?;
        Ok(())
    }
}

struct AssetRow {
    available: Decimal,
    frozen: Decimal,
}

async fn lock_asset(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    currency: &str,
) -> Result<AssetRow, LedgerError> {
    let row = sqlx::query_as::<_, (Decimal, Decimal)>(
        "SELECT available, frozen FROM user_assets WHERE user_id = $1 AND currency = $2 FOR UPDATE",
    )
    .bind(user_id)
    .bind(currency)
    .fetch_optional(&mut **tx)
    .await?;

    match row {
        Some((available, frozen)) => Ok(AssetRow { available, frozen }),
        None => Err(LedgerError::MissingAsset {
            user_id,
            currency: currency.to_string(),
        }),
    }
}

/// Applies `available_delta`/`frozen_delta` to an existing asset row. Deltas
/// may be negative; callers have already validated sufficiency under the
/// same transaction's row lock.
async fn update_asset(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    currency: &str,
    available_delta: Decimal,
    frozen_delta: Decimal,
) -> Result<(), LedgerError> {
    sqlx::query(
        "UPDATE user_assets SET available = available + $1, frozen = frozen + $2, updated_at = now() \
         WHERE user_id = $3 AND currency = $4",
    )
    .bind(available_delta)
    .bind(frozen_delta)
    .bind(user_id)
    .bind(currency)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// `freeze` followed by `unfreeze` of the same amount is a no-op on the
    /// available/frozen split — the round-trip invariant exercised
    /// here at the arithmetic level since the row-lock path needs a live pool.
    #[test]
    fn round_trip_delta_cancels() {
        let available = dec!(100);
        let frozen = dec!(0);
        let amount = dec!(40);

        let after_freeze = (available - amount, frozen + amount);
        let after_unfreeze = (after_freeze.0 + amount, after_freeze.1 - amount);

        assert_eq!(after_unfreeze, (available, frozen));
    }

    #[test]
    fn settle_leg_amounts_match_trade_fields() {
        let trade = Trade {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            buy_order_id: Uuid::new_v4(),
            sell_order_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            price: dec!(50000),
            quantity: dec!(0.4),
            amount: dec!(20000),
            buyer_fee: dec!(20),
            seller_fee: dec!(0.0004),
            trade_time: chrono::Utc::now(),
        };

        let buyer_quote_debit = trade.amount + trade.buyer_fee;
        let seller_base_debit = trade.quantity + trade.seller_fee;
        assert_eq!(buyer_quote_debit, dec!(20020));
        assert_eq!(seller_base_debit, dec!(0.4004));
    }
}
