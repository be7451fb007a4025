use crate::engine::price_level::PriceLevel;
use crate::models::{Order, Side};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A depth-of-book snapshot: top `limit` levels per side, each as
/// `(price, aggregate remaining quantity, order count)`.
#[derive(Debug, Clone)]
pub struct Depth {
    pub bids: Vec<(Decimal, Decimal, usize)>,
    pub asks: Vec<(Decimal, Decimal, usize)>,
}

/// One symbol's resting order book.
///
/// Bids are keyed ascending by price and read in reverse (highest first);
/// asks are keyed ascending and read forward (lowest first). `order_index`
/// gives O(log n) cancellation without a full-book scan. Per the
/// concurrency model, `bids`/`asks` are the "book-internal" lock level: a
/// caller already holding the registry's symbol-write lock may take these,
/// but never the reverse.
pub struct OrderBook {
    pub symbol: String,
    bids: RwLock<BTreeMap<Decimal, PriceLevel>>,
    asks: RwLock<BTreeMap<Decimal, PriceLevel>>,
    order_index: DashMap<Uuid, (Side, Decimal)>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: RwLock::new(BTreeMap::new()),
            asks: RwLock::new(BTreeMap::new()),
            order_index: DashMap::new(),
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.read().keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.read().keys().next().copied()
    }

    pub fn add(&self, order: Order) {
        let side = order.side;
        let price = order.price;
        let id = order.id;
        let mut book = self.side_write(side);
        book.entry(price).or_insert_with(PriceLevel::new).push_back(order);
        drop(book);
        self.order_index.insert(id, (side, price));
    }

    pub fn cancel(&self, order_id: Uuid) -> Option<Order> {
        let (side, price) = *self.order_index.get(&order_id)?;
        let mut book = self.side_write(side);
        let removed = book.get_mut(&price).and_then(|level| level.remove(order_id));
        if let Some(level) = book.get(&price) {
            if level.is_empty() {
                book.remove(&price);
            }
        }
        drop(book);
        if removed.is_some() {
            self.order_index.remove(&order_id);
        }
        removed
    }

    pub fn contains(&self, order_id: Uuid) -> bool {
        self.order_index.contains_key(&order_id)
    }

    pub fn lookup(&self, order_id: Uuid) -> Option<Order> {
        let (side, price) = *self.order_index.get(&order_id)?;
        let book = self.side_read(side);
        book.get(&price)?.iter().find(|o| o.id == order_id).cloned()
    }

    /// Index an order at a new resting price/side, used by the matching
    /// engine after it partially fills a level and needs the index to keep
    /// pointing at the (unchanged) price.
    pub(crate) fn reindex(&self, order_id: Uuid, side: Side, price: Decimal) {
        self.order_index.insert(order_id, (side, price));
    }

    pub(crate) fn unindex(&self, order_id: Uuid) {
        self.order_index.remove(&order_id);
    }

    pub(crate) fn bids_mut(&self) -> parking_lot::RwLockWriteGuard<'_, BTreeMap<Decimal, PriceLevel>> {
        self.bids.write()
    }

    pub(crate) fn asks_mut(&self) -> parking_lot::RwLockWriteGuard<'_, BTreeMap<Decimal, PriceLevel>> {
        self.asks.write()
    }

    fn side_write(&self, side: Side) -> parking_lot::RwLockWriteGuard<'_, BTreeMap<Decimal, PriceLevel>> {
        match side {
            Side::Buy => self.bids.write(),
            Side::Sell => self.asks.write(),
        }
    }

    fn side_read(&self, side: Side) -> parking_lot::RwLockReadGuard<'_, BTreeMap<Decimal, PriceLevel>> {
        match side {
            Side::Buy => self.bids.read(),
            Side::Sell => self.asks.read(),
        }
    }

    pub fn depth(&self, limit: usize) -> Depth {
        let bids = self
            .bids
            .read()
            .iter()
            .rev()
            .take(limit)
            .map(|(price, level)| (*price, level.volume(), level.len()))
            .collect();
        let asks = self
            .asks
            .read()
            .iter()
            .take(limit)
            .map(|(price, level)| (*price, level.volume(), level.len()))
            .collect();
        Depth { bids, asks }
    }

    pub fn order_count(&self) -> usize {
        self.order_index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, OrderType, TimeInForce};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn order(side: Side, price: Decimal, qty: Decimal) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            side,
            order_type: OrderType::Limit,
            price,
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
    fn best_bid_and_ask_track_extremes() {
        let book = OrderBook::new("BTCUSDT");
        book.add(order(Side::Buy, dec!(100), dec!(1)));
        book.add(order(Side::Buy, dec!(101), dec!(1)));
        book.add(order(Side::Sell, dec!(102), dec!(1)));
        book.add(order(Side::Sell, dec!(103), dec!(1)));
        assert_eq!(book.best_bid(), Some(dec!(101)));
        assert_eq!(book.best_ask(), Some(dec!(102)));
    }

    #[test]
    fn cancel_removes_order_and_empties_level() {
        let book = OrderBook::new("BTCUSDT");
        let o = order(Side::Buy, dec!(100), dec!(1));
        let id = o.id;
        book.add(o);
        assert!(book.contains(id));
        let cancelled = book.cancel(id);
        assert!(cancelled.is_some());
        assert!(!book.contains(id));
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn depth_aggregates_volume_per_level() {
        let book = OrderBook::new("BTCUSDT");
        book.add(order(Side::Buy, dec!(100), dec!(1)));
        book.add(order(Side::Buy, dec!(100), dec!(2)));
        book.add(order(Side::Sell, dec!(102), dec!(1.5)));
        let depth = book.depth(10);
        assert_eq!(depth.bids, vec![(dec!(100), dec!(3), 2)]);
        assert_eq!(depth.asks, vec![(dec!(102), dec!(1.5), 1)]);
    }
}
