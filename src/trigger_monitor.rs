//! Component G: promotes dormant stop/take-profit/trailing orders.
//!
//! Grounded on `stop_order_monitor.go`'s poll loop: on a fixed tick, pull
//! every pending untriggered trigger-type order (`db::fetch_pending_trigger_orders`,
//! backed by the partial index on `orders`), compute each symbol's reference
//! price once, and test it against the order's trigger predicate. A hit
//! converts the order into the live type it stands in for and re-submits it
//! through `TradingService::submit_order` — which this time runs the full
//! risk/ledger/match path, since `triggered` is now `true`.
//!
//! Reference price is the last trade price, falling back to the mid of best
//! bid/ask when the symbol hasn't traded yet; an order for a
//! symbol with neither is left pending for the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::models::{Order, OrderType, Side};
use crate::orchestrator::TradingService;

pub struct TriggerMonitor {
    service: Arc<TradingService>,
    tick_interval: Duration,
}

impl TriggerMonitor {
    pub fn new(service: Arc<TradingService>, tick_interval: Duration) -> Self {
        Self { service, tick_interval }
    }

    /// Spawns the polling task. The returned handle is not awaited by
    /// callers; the monitor runs for the lifetime of the process.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.tick_interval);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    async fn tick(&self) {
        let timer = crate::metrics::Timer::new();

        let pending = match crate::db::fetch_pending_trigger_orders(&self.service.context().db).await {
            Ok(orders) => orders,
            Err(err) => {
                tracing::error!(error = %err, "trigger monitor: failed to load pending orders");
                crate::metrics::record_trigger_tick_duration(timer.elapsed_secs());
                return;
            }
        };

        for order in pending {
            let Some(reference_price) = self.reference_price(&order.symbol).await else {
                continue;
            };

            if let Some(promoted) = promote_if_triggered(&order, reference_price) {
                crate::metrics::record_trigger_fired(order.order_type.as_str());
                self.fire(order, promoted).await;
            } else if let Some(updated_stop) = trailing_advance(&order, reference_price) {
                self.update_trailing_stop(&order, updated_stop).await;
            }
        }

        crate::metrics::record_trigger_tick_duration(timer.elapsed_secs());
    }

    /// The most recent trade price for the symbol, falling back to the mid
    /// of best bid/ask when the symbol hasn't traded yet.
    async fn reference_price(&self, symbol: &str) -> Option<Decimal> {
        if let Some(last) = crate::db::last_trade_price(&self.service.context().db, symbol).await.ok().flatten() {
            return Some(last);
        }
        if let Some((Some(bid), Some(ask))) = self.service.best(symbol) {
            return Some((bid + ask) / Decimal::TWO);
        }
        None
    }

    async fn fire(&self, mut order: Order, promoted: PromotedOrder) {
        order.order_type = promoted.order_type;
        order.price = promoted.price;
        order.triggered = true;
        order.trigger_time = Some(Utc::now());
        order.updated_at = Utc::now();

        tracing::info!(order_id = %order.id, symbol = %order.symbol, new_type = ?order.order_type, "trigger order firing");

        if let Err(err) = self.service.submit_order(order).await {
            tracing::error!(error = %err, "trigger monitor: re-submission of triggered order failed");
        }
    }

    async fn update_trailing_stop(&self, order: &Order, new_stop: Decimal) {
        let mut updated = order.clone();
        updated.stop_price = Some(new_stop);
        updated.updated_at = Utc::now();
        if let Err(err) = crate::db::update_order(&self.service.context().db, &updated).await {
            tracing::warn!(order_id = %order.id, error = %err, "trigger monitor: failed to advance trailing stop");
        }
    }
}

struct PromotedOrder {
    order_type: OrderType,
    price: Decimal,
}

/// Tests `order`'s trigger predicate against `reference_price`. Returns the
/// live order type/price to promote to when triggered, `None` otherwise.
///
/// - `stop_loss` (sell armed below, buy armed above) fires when price
///   crosses through `stop_price` against the position, becoming a market
///   order.
/// - `take_profit` fires the opposite direction, also becoming a market
///   order.
/// - `stop_limit` fires the same as stop_loss but becomes a limit order at
///   its own `price`, not the trigger price.
/// - `trailing_stop` fires like stop_loss once the price has moved back
///   `trailing_delta` from its favorable extreme; see `trailing_advance` for
///   the monotonic stop-price update that happens before firing is possible.
fn promote_if_triggered(order: &Order, reference_price: Decimal) -> Option<PromotedOrder> {
    match order.order_type {
        OrderType::StopLoss => {
            let stop = order.stop_price?;
            let crossed = match order.side {
                Side::Sell => reference_price <= stop,
                Side::Buy => reference_price >= stop,
            };
            crossed.then_some(PromotedOrder {
                order_type: OrderType::Market,
                price: Decimal::ZERO,
            })
        }
        OrderType::TakeProfit => {
            let target = order.take_profit_price?;
            let crossed = match order.side {
                Side::Sell => reference_price >= target,
                Side::Buy => reference_price <= target,
            };
            crossed.then_some(PromotedOrder {
                order_type: OrderType::Market,
                price: Decimal::ZERO,
            })
        }
        OrderType::StopLimit => {
            let stop = order.stop_price?;
            let crossed = match order.side {
                Side::Sell => reference_price <= stop,
                Side::Buy => reference_price >= stop,
            };
            crossed.then_some(PromotedOrder {
                order_type: OrderType::Limit,
                price: order.price,
            })
        }
        OrderType::TrailingStop => {
            let stop = order.stop_price?;
            let crossed = match order.side {
                Side::Sell => reference_price <= stop,
                Side::Buy => reference_price >= stop,
            };
            crossed.then_some(PromotedOrder {
                order_type: OrderType::Market,
                price: Decimal::ZERO,
            })
        }
        OrderType::Limit | OrderType::Market => None,
    }
}

/// For an armed-but-not-yet-triggered trailing stop, advances `stop_price`
/// when the reference price has moved further in the position's favor,
/// never the other way — the trailing-stop monotonicity invariant. Returns
/// `None` when no order type or no advance applies.
fn trailing_advance(order: &Order, reference_price: Decimal) -> Option<Decimal> {
    if order.order_type != OrderType::TrailingStop {
        return None;
    }
    let delta = order.trailing_delta?;
    let current_stop = order.stop_price?;

    let candidate = match order.side {
        // A trailing stop protecting a long position trails below the
        // market; it only ever moves up.
        Side::Sell => reference_price - delta,
        // A trailing stop protecting a short position trails above the
        // market; it only ever moves down.
        Side::Buy => reference_price + delta,
    };

    match order.side {
        Side::Sell if candidate > current_stop => Some(candidate),
        Side::Buy if candidate < current_stop => Some(candidate),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn trigger_order(side: Side, order_type: OrderType) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            side,
            order_type,
            price: dec!(49000),
            quantity: dec!(1),
            filled_quantity: Decimal::ZERO,
            filled_amount: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            fee: Decimal::ZERO,
            status: crate::models::OrderStatus::Pending,
            time_in_force: crate::models::TimeInForce::Gtc,
            stop_price: Some(dec!(49500)),
            take_profit_price: Some(dec!(51000)),
            trailing_delta: Some(dec!(500)),
            triggered: false,
            trigger_time: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stop_loss_sell_fires_when_price_drops_to_stop() {
        let order = trigger_order(Side::Sell, OrderType::StopLoss);
        assert!(promote_if_triggered(&order, dec!(49500)).is_some());
        assert!(promote_if_triggered(&order, dec!(49600)).is_none());
    }

    #[test]
    fn stop_loss_buy_fires_when_price_rises_to_stop() {
        let order = trigger_order(Side::Buy, OrderType::StopLoss);
        assert!(promote_if_triggered(&order, dec!(49500)).is_some());
        assert!(promote_if_triggered(&order, dec!(49000)).is_none());
    }

    #[test]
    fn take_profit_sell_fires_when_price_rises_to_target() {
        let order = trigger_order(Side::Sell, OrderType::TakeProfit);
        assert!(promote_if_triggered(&order, dec!(51000)).is_some());
        assert!(promote_if_triggered(&order, dec!(50000)).is_none());
    }

    #[test]
    fn take_profit_buy_fires_when_price_drops_to_target() {
        let order = trigger_order(Side::Buy, OrderType::TakeProfit);
        assert!(promote_if_triggered(&order, dec!(51000)).is_some());
        assert!(promote_if_triggered(&order, dec!(52000)).is_none());
    }

    #[test]
    fn stop_limit_promotes_to_limit_at_own_price() {
        let order = trigger_order(Side::Sell, OrderType::StopLimit);
        let promoted = promote_if_triggered(&order, dec!(49500)).expect("should trigger");
        assert_eq!(promoted.order_type, OrderType::Limit);
        assert_eq!(promoted.price, dec!(49000));
    }

    #[test]
    fn trailing_stop_sell_trails_up_only() {
        let mut order = trigger_order(Side::Sell, OrderType::TrailingStop);
        order.stop_price = Some(dec!(49500));

        // Price rises: stop should advance up by the same delta.
        let advanced = trailing_advance(&order, dec!(50200)).expect("should advance");
        assert_eq!(advanced, dec!(49700));

        // Price falls back: stop must not retreat.
        order.stop_price = Some(advanced);
        assert!(trailing_advance(&order, dec!(49900)).is_none());
    }

    #[test]
    fn trailing_stop_buy_trails_down_only() {
        let mut order = trigger_order(Side::Buy, OrderType::TrailingStop);
        order.stop_price = Some(dec!(49500));

        let advanced = trailing_advance(&order, dec!(48800)).expect("should advance");
        assert_eq!(advanced, dec!(49300));

        order.stop_price = Some(advanced);
        assert!(trailing_advance(&order, dec!(49100)).is_none());
    }

    #[test]
    fn trailing_stop_fires_once_price_reverses_past_stop() {
        let mut order = trigger_order(Side::Sell, OrderType::TrailingStop);
        order.stop_price = Some(dec!(49700));
        assert!(promote_if_triggered(&order, dec!(49700)).is_some());
        assert!(promote_if_triggered(&order, dec!(49800)).is_none());
    }

    #[test]
    fn non_trigger_types_never_fire() {
        let order = trigger_order(Side::Buy, OrderType::Limit);
        assert!(promote_if_triggered(&order, dec!(1)).is_none());
        assert!(trailing_advance(&order, dec!(1)).is_none());
    }
}
