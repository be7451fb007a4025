use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_side", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order type. The four trigger variants share the order lifecycle with
/// `limit`/`market` but are dormant until `TriggerMonitor` promotes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_type", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Limit,
    Market,
    StopLoss,
    TakeProfit,
    StopLimit,
    TrailingStop,
}

impl OrderType {
    pub fn is_trigger_type(&self) -> bool {
        matches!(
            self,
            OrderType::StopLoss | OrderType::TakeProfit | OrderType::StopLimit | OrderType::TrailingStop
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
            OrderType::StopLoss => "stop_loss",
            OrderType::TakeProfit => "take_profit",
            OrderType::StopLimit => "stop_limit",
            OrderType::TrailingStop => "trailing_stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Partial,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "time_in_force", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

/// A resting or historical order.
///
/// Invariants: `0 <= filled_quantity <= quantity`; `avg_price =
/// filled_amount / filled_quantity` whenever `filled_quantity > 0`; limit
/// orders (and triggered stop-limits) carry `price > 0`; stop variants carry
/// the matching trigger field.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub filled_amount: Decimal,
    pub avg_price: Decimal,
    pub fee: Decimal,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,

    pub stop_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub trailing_delta: Option<Decimal>,
    pub triggered: bool,
    pub trigger_time: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn remaining(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled_quantity >= self.quantity
    }

    /// Applies one fill leg to this order: updates filled quantity, filled
    /// amount, running average price, and accumulated fee.
    pub fn apply_fill(&mut self, trade_qty: Decimal, trade_price: Decimal, fee: Decimal, now: DateTime<Utc>) {
        self.filled_quantity += trade_qty;
        self.filled_amount += trade_qty * trade_price;
        self.fee += fee;
        if self.filled_quantity > Decimal::ZERO {
            self.avg_price = self.filled_amount / self.filled_quantity;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            price: order.price,
            quantity: order.quantity,
            filled_quantity: order.filled_quantity,
            remaining_quantity: order.remaining(),
            status: order.status,
            created_at: order.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_order() -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: dec!(100),
            quantity: dec!(1.0),
            filled_quantity: Decimal::ZERO,
            filled_amount: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            fee: Decimal::ZERO,
            status: OrderStatus::Pending,
            time_in_force: TimeInForce::Gtc,
            stop_price: None,
            take_profit_price: None,
            trailing_delta: None,
            triggered: false,
            trigger_time: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn apply_fill_updates_avg_price_and_fee() {
        let mut order = base_order();
        order.apply_fill(dec!(0.4), dec!(100), dec!(0.02), Utc::now());
        assert_eq!(order.filled_quantity, dec!(0.4));
        assert_eq!(order.filled_amount, dec!(40));
        assert_eq!(order.avg_price, dec!(100));
        assert_eq!(order.fee, dec!(0.02));
        assert_eq!(order.remaining(), dec!(0.6));
        assert!(!order.is_fully_filled());
    }

    #[test]
    fn terminal_status_classification() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Partial.is_terminal());
    }

    #[test]
    fn trigger_type_classification() {
        assert!(OrderType::StopLoss.is_trigger_type());
        assert!(OrderType::TrailingStop.is_trigger_type());
        assert!(!OrderType::Limit.is_trigger_type());
        assert!(!OrderType::Market.is_trigger_type());
    }
}
