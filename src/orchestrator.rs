//! `TradingService`: the façade that composes risk, ledger, and matching
//! into the single entry point external collaborators call through. Grounded
//! on `order_service.go`'s `OrderService` — same "validate, freeze, match,
//! per-trade settle" shape, adapted from one big GORM transaction into the
//! matching-engine-plus-explicit-ledger-legs split this crate uses instead.
//!
//! The matching engine's own bounded trade channel (component H) is
//! consumed by a single background task spawned in `new`, which persists
//! every trade and fans it out to `subscribe_trades` callers over a
//! `broadcast` channel — `submit_order`'s returned `Vec<Trade>` is for
//! settlement bookkeeping, not for delivery; delivery already happened once
//! the matching engine pushed onto its channel.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::engine::{FeeConfig, MatchingEngine};
use crate::errors::EngineError;
use crate::ledger::LedgerWriter;
use crate::models::{Order, OrderStatus, OrderType, Side, Trade, TradingPair};
use crate::risk::RiskGate;

const TRADE_BROADCAST_CAPACITY: usize = 4096;

pub struct TradingService {
    ctx: EngineContext,
    engine: MatchingEngine,
    risk: RiskGate,
    ledger: LedgerWriter,
    trade_broadcast: broadcast::Sender<Trade>,
}

impl TradingService {
    pub fn new(ctx: EngineContext) -> Arc<Self> {
        let fee = FeeConfig {
            buyer_fee_rate: ctx.config.taker_fee_rate,
            seller_fee_rate: ctx.config.taker_fee_rate,
        };
        let (engine, trade_rx) = MatchingEngine::new(ctx.config.trade_channel_capacity, fee);
        let risk = RiskGate::new(ctx.db.clone(), ctx.config.clone());
        let ledger = LedgerWriter::new(ctx.db.clone());
        let (trade_broadcast, _) = broadcast::channel(TRADE_BROADCAST_CAPACITY);

        let service = Arc::new(Self {
            ctx,
            engine,
            risk,
            ledger,
            trade_broadcast,
        });

        let db = service.ctx.db.clone();
        let broadcast_tx = service.trade_broadcast.clone();
        tokio::spawn(run_trade_consumer(trade_rx, db, broadcast_tx));

        service
    }

    pub fn subscribe_trades(&self) -> broadcast::Receiver<Trade> {
        self.trade_broadcast.subscribe()
    }

    pub fn depth(&self, symbol: &str, levels: usize) -> Option<crate::engine::Depth> {
        self.engine.depth(symbol, levels)
    }

    pub fn best(&self, symbol: &str) -> Option<(Option<Decimal>, Option<Decimal>)> {
        self.engine.best(symbol)
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Validates, freezes collateral, matches, and settles every resulting
    /// trade. Returns the (possibly partially filled) order as it stands
    /// after matching.
    ///
    /// A dormant stop/TP/trailing order bypasses risk, ledger, and
    /// the book entirely: it is only persisted, pending `TriggerMonitor`
    /// converting it to a live market or limit order and re-submitting it
    /// through this same entry point.
    pub async fn submit_order(&self, mut order: Order) -> Result<(Order, Vec<Trade>), EngineError> {
        crate::metrics::record_order_submitted(&order.side.to_string(), order.order_type.as_str());

        if order.order_type.is_trigger_type() && !order.triggered {
            order.status = OrderStatus::Pending;
            order.updated_at = Utc::now();
            crate::db::insert_order(&self.ctx.db, &order).await.map_err(crate::ledger::LedgerError::from)?;
            return Ok((order, Vec::new()));
        }

        let user = crate::db::fetch_user(&self.ctx.db, order.user_id).await.map_err(crate::ledger::LedgerError::from)?;
        let pair = crate::db::fetch_trading_pair(&self.ctx.db, &order.symbol)
            .await
            .map_err(crate::ledger::LedgerError::from)?;

        let reference_price = self.reference_price(&order, &pair);

        if self.ctx.config.risk_gate_enabled {
            self.risk
                .validate_order(&user, &order.symbol, order.order_type, order.quantity, reference_price)
                .await?;
        }

        let (freeze_currency, freeze_amount) =
            freeze_leg(&order, &pair, reference_price, self.ctx.config.market_order_slippage_band_pct);
        self.ledger.freeze(order.user_id, &freeze_currency, freeze_amount).await?;

        order.updated_at = Utc::now();
        let match_timer = crate::metrics::Timer::new();
        let submit_result = self.engine.submit(order).await;
        crate::metrics::record_order_match_duration(match_timer.elapsed_secs());
        let (mut order, trades) = match submit_result {
            Ok(ok) => ok,
            Err(err) => {
                // Matching never touched the book; give the collateral back.
                let _ = self.ledger.unfreeze(order.user_id, &freeze_currency, freeze_amount).await;
                return Err(err.into());
            }
        };

        if !trades.is_empty() {
            crate::metrics::record_order_matched(order.order_type.as_str());
        }
        for trade in &trades {
            self.settle_trade(trade, &pair).await?;
            crate::metrics::record_trade_executed(&trade.symbol, trade.amount.to_f64().unwrap_or(0.0));
        }

        if order.order_type == OrderType::Market && order.side == Side::Buy {
            self.true_up_market_buy(&order, &pair, freeze_amount).await?;
        }

        if order.status.is_terminal() || order.filled_quantity > Decimal::ZERO {
            crate::db::update_order(&self.ctx.db, &order).await.map_err(crate::ledger::LedgerError::from)?;
        } else {
            crate::db::insert_order(&self.ctx.db, &order).await.map_err(crate::ledger::LedgerError::from)?;
        }
        order.updated_at = Utc::now();

        Ok((order, trades))
    }

    /// Cancels a resting order on behalf of `user_id`. The order's symbol is
    /// not known to the caller up front (`cancel_order(user_id,
    /// order_id)` façade), so this first resolves it from the persisted row.
    pub async fn cancel_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order, EngineError> {
        let stored = crate::db::fetch_order(&self.ctx.db, order_id)
            .await
            .map_err(crate::ledger::LedgerError::from)?;

        if stored.user_id != user_id {
            return Err(EngineError::Forbidden(format!("order {order_id} does not belong to {user_id}")));
        }

        // A dormant trigger order never touched the book or the ledger
        // (see `submit_order`), so cancelling it is a pure status flip.
        if stored.order_type.is_trigger_type() && !stored.triggered {
            if stored.status.is_terminal() {
                return Err(crate::engine::MatchingError::Terminal(order_id).into());
            }
            let mut cancelled = stored;
            cancelled.status = OrderStatus::Cancelled;
            cancelled.updated_at = Utc::now();
            crate::db::update_order(&self.ctx.db, &cancelled).await.map_err(crate::ledger::LedgerError::from)?;
            self.risk.record_cancel(user_id);
            crate::metrics::record_order_cancelled();
            return Ok(cancelled);
        }

        let mut cancelled = self.engine.cancel(&stored.symbol, order_id)?;
        if cancelled.user_id != user_id {
            return Err(EngineError::Forbidden(format!("order {order_id} does not belong to {user_id}")));
        }

        let pair = crate::db::fetch_trading_pair(&self.ctx.db, &stored.symbol)
            .await
            .map_err(crate::ledger::LedgerError::from)?;
        let (currency, amount) =
            freeze_leg(&cancelled, &pair, cancelled.price, self.ctx.config.market_order_slippage_band_pct);
        let remaining_ratio_amount = if cancelled.quantity > Decimal::ZERO {
            amount * cancelled.remaining() / cancelled.quantity
        } else {
            Decimal::ZERO
        };
        self.ledger.unfreeze(user_id, &currency, remaining_ratio_amount).await?;

        cancelled.status = OrderStatus::Cancelled;
        cancelled.updated_at = Utc::now();
        crate::db::update_order(&self.ctx.db, &cancelled).await.map_err(crate::ledger::LedgerError::from)?;

        self.risk.record_cancel(user_id);
        crate::metrics::record_order_cancelled();
        Ok(cancelled)
    }

    async fn settle_trade(&self, trade: &Trade, pair: &TradingPair) -> Result<(), EngineError> {
        let buyer = crate::db::fetch_user(&self.ctx.db, trade.buyer_id).await.map_err(crate::ledger::LedgerError::from)?;
        let seller = crate::db::fetch_user(&self.ctx.db, trade.seller_id).await.map_err(crate::ledger::LedgerError::from)?;

        match self.risk.check_trade(trade, &buyer, &seller).await {
            Ok(()) => {
                self.ledger.settle(trade, &pair.base_currency, &pair.quote_currency).await?;
                Ok(())
            }
            Err(err) => {
                // Settlement is withheld; the trade itself already matched
                // and was emitted. Self-trades are rejected before this
                // point (MatchingEngine::submit's shadow scan), so this
                // path is reached only by the related-account/wash-trading
                // checks, which can't be evaluated until both sides of the
                // trade are known.
                tracing::error!(trade_id = %trade.id, error = %err, "trade-time risk check rejected settlement");
                Err(err.into())
            }
        }
    }

    /// Computes the reference price used for the notional/deviation risk
    /// checks and for sizing the market-buy freeze: the order's own limit
    /// price when one exists, otherwise the opposing best price, falling
    /// back to the last trade price when the book is empty.
    fn reference_price(&self, order: &Order, pair: &TradingPair) -> Decimal {
        if matches!(order.order_type, OrderType::Limit | OrderType::StopLimit) {
            return order.price;
        }
        let best = self.engine.best(&order.symbol);
        let opposing = match (order.side, best) {
            (Side::Buy, Some((_, ask))) => ask,
            (Side::Sell, Some((bid, _))) => bid,
            _ => None,
        };
        opposing.unwrap_or_else(|| {
            if pair.min_notional > Decimal::ZERO && order.quantity > Decimal::ZERO {
                pair.min_notional / order.quantity
            } else {
                Decimal::ONE
            }
        })
    }

    /// Unfreezes the difference between the over-reserved market-buy
    /// collateral and what was actually spent, once the fill is known.
    async fn true_up_market_buy(&self, order: &Order, pair: &TradingPair, frozen: Decimal) -> Result<(), EngineError> {
        let actually_spent = order.filled_amount + order.fee;
        if frozen > actually_spent {
            self.ledger
                .unfreeze(order.user_id, &pair.quote_currency, frozen - actually_spent)
                .await?;
        }
        Ok(())
    }
}

/// Buy orders freeze quote currency; sell orders freeze base currency.
/// Market buys over-reserve by `reference_price * quantity * (1 +
/// slippage_pct)` against the best ask (or a reference-price fallback) and
/// are trued up after fill — see `TradingService::true_up_market_buy`. This
/// resolves the open question on market-buy freeze sizing: over-reserve
/// rather than risk insufficient collateral.
fn freeze_leg(order: &Order, pair: &TradingPair, reference_price: Decimal, slippage_pct: Decimal) -> (String, Decimal) {
    match order.side {
        Side::Buy => {
            let amount = if matches!(order.order_type, OrderType::Limit | OrderType::StopLimit) {
                order.price * order.quantity
            } else {
                reference_price * order.quantity * (Decimal::ONE + slippage_pct)
            };
            (pair.quote_currency.clone(), amount)
        }
        Side::Sell => (pair.base_currency.clone(), order.quantity),
    }
}

async fn run_trade_consumer(mut trade_rx: mpsc::Receiver<Trade>, db: PgPool, broadcast_tx: broadcast::Sender<Trade>) {
    while let Some(trade) = trade_rx.recv().await {
        if let Err(err) = crate::db::insert_trade(&db, &trade).await {
            tracing::error!(trade_id = %trade.id, error = %err, "failed to persist trade");
        }
        let _ = broadcast_tx.send(trade);
    }
    tracing::warn!("trade consumer stopped: matching engine channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn pair() -> TradingPair {
        TradingPair {
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
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn order(side: Side, order_type: OrderType, price: Decimal, qty: Decimal) -> Order {
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
            time_in_force: crate::models::TimeInForce::Gtc,
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
    fn buy_limit_freezes_price_times_quantity_in_quote() {
        let o = order(Side::Buy, OrderType::Limit, dec!(50000), dec!(0.5));
        let (currency, amount) = freeze_leg(&o, &pair(), dec!(50000), Decimal::ZERO);
        assert_eq!(currency, "USDT");
        assert_eq!(amount, dec!(25000));
    }

    #[test]
    fn sell_limit_freezes_quantity_in_base() {
        let o = order(Side::Sell, OrderType::Limit, dec!(50000), dec!(0.5));
        let (currency, amount) = freeze_leg(&o, &pair(), dec!(50000), Decimal::ZERO);
        assert_eq!(currency, "BTC");
        assert_eq!(amount, dec!(0.5));
    }

    #[test]
    fn market_buy_freezes_reference_price_times_quantity() {
        let o = order(Side::Buy, OrderType::Market, Decimal::ZERO, dec!(1));
        let (currency, amount) = freeze_leg(&o, &pair(), dec!(51000), Decimal::ZERO);
        assert_eq!(currency, "USDT");
        assert_eq!(amount, dec!(51000));
    }
}
