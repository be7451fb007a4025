use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A completed match between a buy and a sell order. Immutable once emitted.
///
/// `amount = price * quantity`. Fee semantics are preserved from the
/// originating engine for fidelity: `buyer_fee` is denominated in quote,
/// `seller_fee` in base (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trade {
    pub id: Uuid,
    pub symbol: String,
    pub buy_order_id: Uuid,
    pub sell_order_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub price: Decimal,
    pub quantity: Decimal,
    pub amount: Decimal,
    pub buyer_fee: Decimal,
    pub seller_fee: Decimal,
    pub trade_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amount_equals_price_times_quantity() {
        let trade = Trade {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            buy_order_id: Uuid::new_v4(),
            sell_order_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            price: dec!(50000),
            quantity: dec!(0.4),
            amount: dec!(50000) * dec!(0.4),
            buyer_fee: dec!(20),
            seller_fee: dec!(0.0004),
            trade_time: Utc::now(),
        };
        assert_eq!(trade.amount, dec!(20000));
    }
}
