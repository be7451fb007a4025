use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Trading pair configuration. Immutable to the engine between admin updates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradingPair {
    pub symbol: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub price_precision: i32,
    pub quantity_precision: i32,
    pub min_quantity: Decimal,
    pub max_quantity: Decimal,
    pub min_notional: Decimal,
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn inactive_pair_is_distinguishable() {
        let pair = TradingPair {
            symbol: "BTCUSDT".into(),
            base_currency: "BTC".into(),
            quote_currency: "USDT".into(),
            price_precision: 2,
            quantity_precision: 6,
            min_quantity: dec!(0.0001),
            max_quantity: dec!(1000),
            min_notional: dec!(10),
            maker_fee_rate: dec!(0.0002),
            taker_fee_rate: dec!(0.001),
            is_active: false,
            created_at: Utc::now(),
        };
        assert!(!pair.is_active);
    }
}
