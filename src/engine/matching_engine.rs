use crate::engine::order_book::{Depth, OrderBook};
use crate::models::{Order, OrderStatus, OrderType, Side, TimeInForce, Trade};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Fee rates applied at settlement. The source engine charges the buyer a
/// fee in quote and the seller a fee in base, both at a flat rate — not a
/// maker/taker differentiated schedule — preserved here for fidelity (see
/// DESIGN.md). `maker_fee_rate` is carried in configuration for a future
/// maker-rebate feature but is not read by the matching loop today.
#[derive(Debug, Clone, Copy)]
pub struct FeeConfig {
    pub buyer_fee_rate: Decimal,
    pub seller_fee_rate: Decimal,
}

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("invalid order: {0}")]
    InvalidInput(String),
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("order not found: {0}")]
    NotFound(Uuid),
    #[error("order {0} is already terminal")]
    Terminal(Uuid),
    #[error("trade stream closed")]
    StreamClosed,
    #[error("order would self-trade for user {0}")]
    SelfTrade(Uuid),
    #[error("internal matching error: {0}")]
    Internal(String),
}

impl MatchingError {
    pub fn kind(&self) -> crate::errors::ErrorKind {
        use crate::errors::ErrorKind;
        match self {
            MatchingError::InvalidInput(_) => ErrorKind::InvalidInput,
            MatchingError::UnknownSymbol(_) => ErrorKind::UnknownSymbol,
            MatchingError::NotFound(_) => ErrorKind::NotFound,
            MatchingError::Terminal(_) => ErrorKind::Terminal,
            MatchingError::SelfTrade(_) => ErrorKind::SelfTrading,
            MatchingError::StreamClosed | MatchingError::Internal(_) => ErrorKind::Internal,
        }
    }
}

fn validate(order: &Order) -> Result<(), MatchingError> {
    if order.symbol.trim().is_empty() {
        return Err(MatchingError::InvalidInput("symbol must not be empty".into()));
    }
    if order.quantity <= Decimal::ZERO {
        return Err(MatchingError::InvalidInput("quantity must be positive".into()));
    }
    if matches!(order.order_type, OrderType::Limit) && order.price <= Decimal::ZERO {
        return Err(MatchingError::InvalidInput("limit price must be positive".into()));
    }
    Ok(())
}

/// Price-time-priority matching core (component D). Owns the per-symbol
/// order books and the bounded trade stream; knows nothing about risk
/// checks or balance settlement — those are composed by
/// `crate::engine::orchestrator::TradingService`.
pub struct MatchingEngine {
    books: DashMap<String, Arc<OrderBook>>,
    trade_tx: mpsc::Sender<Trade>,
    fee: FeeConfig,
}

impl MatchingEngine {
    pub fn new(trade_channel_capacity: usize, fee: FeeConfig) -> (Self, mpsc::Receiver<Trade>) {
        let (tx, rx) = mpsc::channel(trade_channel_capacity);
        (
            Self {
                books: DashMap::new(),
                trade_tx: tx,
                fee,
            },
            rx,
        )
    }

    fn get_or_create_book(&self, symbol: &str) -> Arc<OrderBook> {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(OrderBook::new(symbol)))
            .clone()
    }

    pub fn book(&self, symbol: &str) -> Option<Arc<OrderBook>> {
        self.books.get(symbol).map(|b| b.clone())
    }

    pub fn depth(&self, symbol: &str, levels: usize) -> Option<Depth> {
        self.book(symbol).map(|b| b.depth(levels))
    }

    pub fn best(&self, symbol: &str) -> Option<(Option<Decimal>, Option<Decimal>)> {
        self.book(symbol).map(|b| (b.best_bid(), b.best_ask()))
    }

    pub fn lookup(&self, symbol: &str, order_id: Uuid) -> Option<Order> {
        self.book(symbol).and_then(|b| b.lookup(order_id))
    }

    /// Submits an incoming order, matching it against the book and, if
    /// time-in-force allows, resting the remainder. Returns the updated
    /// taker order and the (possibly empty) list of trades it produced, in
    /// emission order.
    pub async fn submit(&self, mut order: Order) -> Result<(Order, Vec<Trade>), MatchingError> {
        validate(&order)?;
        order.status = OrderStatus::Pending;
        let book = self.get_or_create_book(&order.symbol);

        if Self::self_trade_conflict(&book, &order) {
            return Err(MatchingError::SelfTrade(order.user_id));
        }

        if order.time_in_force == TimeInForce::Fok && !Self::fok_fillable(&book, &order) {
            order.status = OrderStatus::Cancelled;
            return Ok((order, Vec::new()));
        }

        let trades = self.match_against_book(&book, &mut order)?;
        self.resolve_tif(&mut order);

        for trade in &trades {
            self.trade_tx
                .send(trade.clone())
                .await
                .map_err(|_| MatchingError::StreamClosed)?;
        }

        Ok((order, trades))
    }

    pub fn cancel(&self, symbol: &str, order_id: Uuid) -> Result<Order, MatchingError> {
        let book = self.book(symbol).ok_or_else(|| MatchingError::UnknownSymbol(symbol.to_string()))?;
        let mut order = book.cancel(order_id).ok_or(MatchingError::NotFound(order_id))?;
        if order.status.is_terminal() {
            // Should not happen: a terminal order is never resting. Guard anyway.
            return Err(MatchingError::Terminal(order_id));
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        Ok(order)
    }

    /// Non-mutating check used by FOK: sums available opposite-side volume,
    /// respecting the taker's limit price, until it covers the full
    /// requested quantity. This is the "first pass" of the two-pass shadow
    /// match described in the design notes — it never touches the book.
    fn fok_fillable(book: &OrderBook, order: &Order) -> bool {
        let mut remaining = order.quantity;
        let limit = if matches!(order.order_type, OrderType::Limit) {
            Some(order.price)
        } else {
            None
        };

        match order.side {
            Side::Buy => {
                for (price, level) in book.asks_mut().iter() {
                    if remaining <= Decimal::ZERO {
                        break;
                    }
                    if let Some(limit) = limit {
                        if *price > limit {
                            break;
                        }
                    }
                    remaining -= level.volume().min(remaining);
                }
            }
            Side::Sell => {
                for (price, level) in book.bids_mut().iter().rev() {
                    if remaining <= Decimal::ZERO {
                        break;
                    }
                    if let Some(limit) = limit {
                        if *price < limit {
                            break;
                        }
                    }
                    remaining -= level.volume().min(remaining);
                }
            }
        }
        remaining <= Decimal::ZERO
    }

    /// Non-mutating shadow scan: would the incoming order cross a resting
    /// order from the same user before its fillable quantity is exhausted?
    /// Run ahead of `fok_fillable`/`match_against_book` so a self-trade is
    /// rejected outright — no trade emitted, no resting order touched.
    fn self_trade_conflict(book: &OrderBook, order: &Order) -> bool {
        let mut remaining = order.quantity;
        let limit = if matches!(order.order_type, OrderType::Limit) {
            Some(order.price)
        } else {
            None
        };

        match order.side {
            Side::Buy => {
                for (price, level) in book.asks_mut().iter() {
                    if remaining <= Decimal::ZERO {
                        break;
                    }
                    if let Some(limit) = limit {
                        if *price > limit {
                            break;
                        }
                    }
                    for maker in level.iter() {
                        if remaining <= Decimal::ZERO {
                            break;
                        }
                        if maker.user_id == order.user_id {
                            return true;
                        }
                        remaining -= maker.remaining().min(remaining);
                    }
                }
            }
            Side::Sell => {
                for (price, level) in book.bids_mut().iter().rev() {
                    if remaining <= Decimal::ZERO {
                        break;
                    }
                    if let Some(limit) = limit {
                        if *price < limit {
                            break;
                        }
                    }
                    for maker in level.iter() {
                        if remaining <= Decimal::ZERO {
                            break;
                        }
                        if maker.user_id == order.user_id {
                            return true;
                        }
                        remaining -= maker.remaining().min(remaining);
                    }
                }
            }
        }
        false
    }

    /// The second pass: actually walks and mutates the opposite side,
    /// producing trades. Only ever called after `fok_fillable` has already
    /// confirmed sufficient depth for FOK orders, so this pass cannot run
    /// dry partway through an FOK fill.
    fn match_against_book(&self, book: &OrderBook, taker: &mut Order) -> Result<Vec<Trade>, MatchingError> {
        let mut trades = Vec::new();
        let limit = if matches!(taker.order_type, OrderType::Limit) {
            Some(taker.price)
        } else {
            None
        };

        let prices: Vec<Decimal> = match taker.side {
            Side::Buy => book.asks_mut().keys().copied().collect(),
            Side::Sell => book.bids_mut().keys().copied().collect(),
        };
        let prices_in_priority: Vec<Decimal> = match taker.side {
            Side::Buy => prices,
            Side::Sell => prices.into_iter().rev().collect(),
        };

        'levels: for price in prices_in_priority {
            if taker.remaining() <= Decimal::ZERO {
                break;
            }
            if let Some(limit) = limit {
                let crosses = match taker.side {
                    Side::Buy => price <= limit,
                    Side::Sell => price >= limit,
                };
                if !crosses {
                    break;
                }
            }

            let mut side_map = match taker.side {
                Side::Buy => book.asks_mut(),
                Side::Sell => book.bids_mut(),
            };
            let Some(level) = side_map.get_mut(&price) else { continue };

            loop {
                if taker.remaining() <= Decimal::ZERO {
                    break;
                }
                let Some(maker) = level.peek_front_mut() else { break };

                let trade_qty = taker.remaining().min(maker.remaining());
                let trade_price = maker.price;
                let trade_amount = trade_qty * trade_price;
                let buyer_fee = trade_amount * self.fee.buyer_fee_rate;
                let seller_fee = trade_qty * self.fee.seller_fee_rate;
                let now = Utc::now();

                let (buy_order_id, sell_order_id, buyer_id, seller_id) = match taker.side {
                    Side::Buy => (taker.id, maker.id, taker.user_id, maker.user_id),
                    Side::Sell => (maker.id, taker.id, maker.user_id, taker.user_id),
                };

                let trade = Trade {
                    id: Uuid::new_v4(),
                    symbol: taker.symbol.clone(),
                    buy_order_id,
                    sell_order_id,
                    buyer_id,
                    seller_id,
                    price: trade_price,
                    quantity: trade_qty,
                    amount: trade_amount,
                    buyer_fee,
                    seller_fee,
                    trade_time: now,
                };

                let maker_fee = match taker.side {
                    Side::Buy => seller_fee,
                    Side::Sell => buyer_fee,
                };
                maker.apply_fill(trade_qty, trade_price, maker_fee, now);
                let taker_fee = match taker.side {
                    Side::Buy => buyer_fee,
                    Side::Sell => seller_fee,
                };
                taker.apply_fill(trade_qty, trade_price, taker_fee, now);

                let maker_filled = maker.is_fully_filled();
                if maker_filled {
                    let mut maker_done = level.pop_front().expect("front checked above");
                    maker_done.status = OrderStatus::Filled;
                    book.unindex(maker_done.id);
                } else {
                    maker.status = OrderStatus::Partial;
                    level.recompute_volume();
                }

                trades.push(trade);

                if taker.is_fully_filled() {
                    taker.status = OrderStatus::Filled;
                    break 'levels;
                }
            }

            if level.is_empty() {
                side_map.remove(&price);
            }
        }

        if !trades.is_empty() && !taker.is_fully_filled() {
            taker.status = OrderStatus::Partial;
        }

        Ok(trades)
    }

    /// Applies time-in-force disposition to the taker after matching:
    /// GTC rests any remainder, IOC/market cancel it, FOK never reaches
    /// this with a remainder (the shadow pass already guaranteed a full fill).
    fn resolve_tif(&self, order: &mut Order) {
        let remaining = order.remaining();
        if remaining <= Decimal::ZERO {
            order.status = OrderStatus::Filled;
            return;
        }

        match (order.order_type, order.time_in_force) {
            (OrderType::Market, _) | (_, TimeInForce::Ioc) => {
                order.status = if order.filled_quantity > Decimal::ZERO {
                    OrderStatus::Partial
                } else {
                    OrderStatus::Cancelled
                };
                if order.time_in_force == TimeInForce::Ioc || matches!(order.order_type, OrderType::Market) {
                    order.status = OrderStatus::Cancelled;
                }
            }
            (_, TimeInForce::Gtc) => {
                let book = self.get_or_create_book(&order.symbol);
                order.status = if order.filled_quantity > Decimal::ZERO {
                    OrderStatus::Partial
                } else {
                    OrderStatus::Pending
                };
                book.add(order.clone());
            }
            (_, TimeInForce::Fok) => {
                // Unreachable given fok_fillable's guarantee, but handled for completeness.
                order.status = OrderStatus::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, OrderType, Side, TimeInForce};
    use rust_decimal_macros::dec;

    fn fee() -> FeeConfig {
        FeeConfig {
            buyer_fee_rate: dec!(0.001),
            seller_fee_rate: dec!(0.001),
        }
    }

    fn new_order(side: Side, order_type: OrderType, price: Decimal, qty: Decimal, tif: TimeInForce) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            side,
            order_type,
            price,
            quantity: qty,
            filled_quantity: Decimal::ZERO,
            filled_amount: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            fee: Decimal::ZERO,
            status: OrderStatus::Pending,
            time_in_force: tif,
            stop_price: None,
            take_profit_price: None,
            trailing_delta: None,
            triggered: false,
            trigger_time: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn scenario_empty_book_then_partial_fill() {
        let (engine, _rx) = MatchingEngine::new(100, fee());
        let (sell, trades) = engine
            .submit(new_order(Side::Sell, OrderType::Limit, dec!(50000), dec!(1.0), TimeInForce::Gtc))
            .await
            .unwrap();
        assert_eq!(sell.status, OrderStatus::Pending);
        assert!(trades.is_empty());

        let depth = engine.depth("BTCUSDT", 10).unwrap();
        assert_eq!(depth.asks, vec![(dec!(50000), dec!(1.0), 1)]);
        assert!(depth.bids.is_empty());

        let (buy, trades) = engine
            .submit(new_order(Side::Buy, OrderType::Limit, dec!(50000), dec!(0.4), TimeInForce::Gtc))
            .await
            .unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, dec!(50000));
        assert_eq!(trades[0].quantity, dec!(0.4));
        assert_eq!(trades[0].amount, dec!(20000));
        assert_eq!(trades[0].buyer_fee, dec!(20));
        assert_eq!(trades[0].seller_fee, dec!(0.0004));
        assert_eq!(buy.status, OrderStatus::Filled);

        let resting = engine.lookup("BTCUSDT", sell.id).unwrap();
        assert_eq!(resting.status, OrderStatus::Partial);
        assert_eq!(resting.remaining(), dec!(0.6));
    }

    #[tokio::test]
    async fn scenario_market_buy_insufficient_liquidity() {
        let (engine, _rx) = MatchingEngine::new(100, fee());
        engine
            .submit(new_order(Side::Sell, OrderType::Limit, dec!(100), dec!(1.0), TimeInForce::Gtc))
            .await
            .unwrap();
        engine
            .submit(new_order(Side::Sell, OrderType::Limit, dec!(101), dec!(0.5), TimeInForce::Gtc))
            .await
            .unwrap();

        let (taker, trades) = engine
            .submit(new_order(Side::Buy, OrderType::Market, Decimal::ZERO, dec!(2.0), TimeInForce::Ioc))
            .await
            .unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!(taker.status, OrderStatus::Cancelled);
        assert_eq!(taker.filled_quantity, dec!(1.5));
    }

    #[tokio::test]
    async fn scenario_fok_fails_leaves_book_untouched() {
        let (engine, _rx) = MatchingEngine::new(100, fee());
        let (maker, _) = engine
            .submit(new_order(Side::Sell, OrderType::Limit, dec!(100), dec!(1.0), TimeInForce::Gtc))
            .await
            .unwrap();

        let (taker, trades) = engine
            .submit(new_order(Side::Buy, OrderType::Limit, dec!(100), dec!(1.5), TimeInForce::Fok))
            .await
            .unwrap();

        assert!(trades.is_empty());
        assert_eq!(taker.status, OrderStatus::Cancelled);
        let untouched = engine.lookup("BTCUSDT", maker.id).unwrap();
        assert_eq!(untouched.remaining(), dec!(1.0));
    }

    #[tokio::test]
    async fn scenario_ioc_partial_fill() {
        let (engine, _rx) = MatchingEngine::new(100, fee());
        engine
            .submit(new_order(Side::Sell, OrderType::Limit, dec!(100), dec!(1.0), TimeInForce::Gtc))
            .await
            .unwrap();

        let (taker, trades) = engine
            .submit(new_order(Side::Buy, OrderType::Limit, dec!(100), dec!(1.5), TimeInForce::Ioc))
            .await
            .unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(taker.status, OrderStatus::Cancelled);
        assert_eq!(taker.filled_quantity, dec!(1.0));
    }

    #[tokio::test]
    async fn scenario_price_time_priority() {
        let (engine, _rx) = MatchingEngine::new(100, fee());
        let (s1, _) = engine
            .submit(new_order(Side::Sell, OrderType::Limit, dec!(100), dec!(1.0), TimeInForce::Gtc))
            .await
            .unwrap();
        let (s2, _) = engine
            .submit(new_order(Side::Sell, OrderType::Limit, dec!(100), dec!(1.0), TimeInForce::Gtc))
            .await
            .unwrap();

        let (_, trades) = engine
            .submit(new_order(Side::Buy, OrderType::Limit, dec!(100), dec!(1.5), TimeInForce::Gtc))
            .await
            .unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].sell_order_id, s1.id);
        assert_eq!(trades[0].quantity, dec!(1.0));
        assert_eq!(trades[1].sell_order_id, s2.id);
        assert_eq!(trades[1].quantity, dec!(0.5));
    }

    #[tokio::test]
    async fn self_trade_is_rejected_and_book_untouched() {
        let (engine, _rx) = MatchingEngine::new(100, fee());
        let resting_order = new_order(Side::Sell, OrderType::Limit, dec!(100), dec!(1.0), TimeInForce::Gtc);
        let user = resting_order.user_id;
        let (resting, _) = engine.submit(resting_order).await.unwrap();

        let mut taker = new_order(Side::Buy, OrderType::Limit, dec!(100), dec!(1.0), TimeInForce::Gtc);
        taker.user_id = user;
        let result = engine.submit(taker).await;

        assert!(matches!(result, Err(MatchingError::SelfTrade(id)) if id == user));
        let untouched = engine.lookup("BTCUSDT", resting.id).unwrap();
        assert_eq!(untouched.status, OrderStatus::Pending);
        assert_eq!(untouched.remaining(), dec!(1.0));
    }

    #[tokio::test]
    async fn cancel_rejects_unknown_order() {
        let (engine, _rx) = MatchingEngine::new(100, fee());
        engine.get_or_create_book("BTCUSDT");
        let result = engine.cancel("BTCUSDT", Uuid::new_v4());
        assert!(matches!(result, Err(MatchingError::NotFound(_))));
    }
}
