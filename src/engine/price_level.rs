use crate::models::Order;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use uuid::Uuid;

/// All resting orders at a single price, in arrival (FIFO) order.
///
/// `volume` is a cache of the sum of `remaining()` across the queue,
/// maintained incrementally by `push_back`/`remove` rather than recomputed
/// on every read; `recompute_volume` exists to repair it after a bulk
/// mutation (e.g. restoring a FOK shadow match) and as a debug-assertion
/// cross-check.
#[derive(Debug, Default)]
pub struct PriceLevel {
    orders: VecDeque<Order>,
    volume: Decimal,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
            volume: Decimal::ZERO,
        }
    }

    pub fn push_back(&mut self, order: Order) {
        self.volume += order.remaining();
        self.orders.push_back(order);
    }

    pub fn peek_front(&self) -> Option<&Order> {
        self.orders.front()
    }

    pub fn peek_front_mut(&mut self) -> Option<&mut Order> {
        self.orders.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<Order> {
        let order = self.orders.pop_front()?;
        self.volume -= order.remaining();
        Some(order)
    }

    /// Removes a specific resting order by id (used for cancellation,
    /// O(n) in the level's depth which is bounded in practice).
    pub fn remove(&mut self, order_id: Uuid) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == order_id)?;
        let order = self.orders.remove(pos)?;
        self.volume -= order.remaining();
        Some(order)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    /// Recomputes the cached volume from scratch. Called after any mutation
    /// that touches remaining quantities without going through `push_back`/
    /// `pop_front`/`remove` (notably in-place fills via `peek_front_mut`).
    pub fn recompute_volume(&mut self) {
        self.volume = self.orders.iter().map(|o| o.remaining()).sum();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, OrderType, Side, TimeInForce};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn order(qty: Decimal) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: dec!(100),
            quantity: qty,
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
    fn volume_tracks_pushes_and_pops() {
        let mut level = PriceLevel::new();
        level.push_back(order(dec!(1.0)));
        level.push_back(order(dec!(2.0)));
        assert_eq!(level.volume(), dec!(3.0));
        level.pop_front();
        assert_eq!(level.volume(), dec!(2.0));
        assert!(!level.is_empty());
    }

    #[test]
    fn remove_by_id_updates_volume() {
        let mut level = PriceLevel::new();
        let o1 = order(dec!(1.0));
        let id = o1.id;
        level.push_back(o1);
        level.push_back(order(dec!(1.5)));
        let removed = level.remove(id);
        assert!(removed.is_some());
        assert_eq!(level.volume(), dec!(1.5));
    }

    #[test]
    fn recompute_volume_matches_incremental_tracking() {
        let mut level = PriceLevel::new();
        level.push_back(order(dec!(1.0)));
        level.push_back(order(dec!(2.0)));
        if let Some(front) = level.peek_front_mut() {
            front.filled_quantity = dec!(0.4);
        }
        level.recompute_volume();
        assert_eq!(level.volume(), dec!(2.6));
    }

    #[test]
    fn fifo_ordering_preserved() {
        let mut level = PriceLevel::new();
        let first = order(dec!(1.0));
        let first_id = first.id;
        level.push_back(first);
        level.push_back(order(dec!(1.0)));
        assert_eq!(level.peek_front().unwrap().id, first_id);
    }
}
