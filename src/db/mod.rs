//! Persistence layer: thin query functions over the tables defined in
//! `migrations/`. No ORM — plain `sqlx::query_as` against runtime-bound
//! `PgPool`, matching how the rest of the pack reaches for `sqlx` directly
//! rather than a query builder.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Order, Trade, TradingPair, User, UserAsset};

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, email, kyc_level, status, register_ip, last_login_ip, created_at, updated_at \
         FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn fetch_trading_pair(pool: &PgPool, symbol: &str) -> Result<TradingPair, sqlx::Error> {
    sqlx::query_as::<_, TradingPair>(
        "SELECT symbol, base_currency, quote_currency, price_precision, quantity_precision, \
         min_quantity, max_quantity, min_notional, maker_fee_rate, taker_fee_rate, is_active, created_at \
         FROM trading_pairs WHERE symbol = $1",
    )
    .bind(symbol)
    .fetch_one(pool)
    .await
}

/// Used by the `seed` CLI subcommand to populate demo accounts.
pub async fn insert_user(pool: &PgPool, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, email, kyc_level, status, register_ip, last_login_ip, created_at, updated_at) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8) ON CONFLICT (id) DO NOTHING",
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(user.kyc_level)
    .bind(user.status)
    .bind(&user.register_ip)
    .bind(&user.last_login_ip)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Used by the `seed` CLI subcommand to populate demo trading pairs.
pub async fn insert_trading_pair(pool: &PgPool, pair: &TradingPair) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO trading_pairs (symbol, base_currency, quote_currency, price_precision, \
         quantity_precision, min_quantity, max_quantity, min_notional, maker_fee_rate, taker_fee_rate, \
         is_active, created_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12) \
         ON CONFLICT (symbol) DO NOTHING",
    )
    .bind(&pair.symbol)
    .bind(&pair.base_currency)
    .bind(&pair.quote_currency)
    .bind(pair.price_precision)
    .bind(pair.quantity_precision)
    .bind(pair.min_quantity)
    .bind(pair.max_quantity)
    .bind(pair.min_notional)
    .bind(pair.maker_fee_rate)
    .bind(pair.taker_fee_rate)
    .bind(pair.is_active)
    .bind(pair.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Used by the `seed` CLI subcommand to fund demo accounts with a starting
/// balance. Upserts so re-running `seed` is idempotent.
pub async fn upsert_user_asset(pool: &PgPool, asset: &UserAsset) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_assets (id, user_id, currency, chain, available, frozen, updated_at) \
         VALUES ($1,$2,$3,$4,$5,$6,$7) \
         ON CONFLICT (user_id, currency) DO UPDATE SET available = EXCLUDED.available, updated_at = EXCLUDED.updated_at",
    )
    .bind(asset.id)
    .bind(asset.user_id)
    .bind(&asset.currency)
    .bind(&asset.chain)
    .bind(asset.available)
    .bind(asset.frozen)
    .bind(asset.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_order(pool: &PgPool, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO orders (id, user_id, symbol, side, order_type, price, quantity, filled_quantity, \
         filled_amount, avg_price, fee, status, time_in_force, stop_price, take_profit_price, \
         trailing_delta, triggered, trigger_time, created_at, updated_at) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20)",
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(&order.symbol)
    .bind(order.side)
    .bind(order.order_type)
    .bind(order.price)
    .bind(order.quantity)
    .bind(order.filled_quantity)
    .bind(order.filled_amount)
    .bind(order.avg_price)
    .bind(order.fee)
    .bind(order.status)
    .bind(order.time_in_force)
    .bind(order.stop_price)
    .bind(order.take_profit_price)
    .bind(order.trailing_delta)
    .bind(order.triggered)
    .bind(order.trigger_time)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_order(pool: &PgPool, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE orders SET filled_quantity = $2, filled_amount = $3, avg_price = $4, fee = $5, \
         status = $6, price = $7, order_type = $8, triggered = $9, trigger_time = $10, stop_price = $11, \
         updated_at = $12 WHERE id = $1",
    )
    .bind(order.id)
    .bind(order.filled_quantity)
    .bind(order.filled_amount)
    .bind(order.avg_price)
    .bind(order.fee)
    .bind(order.status)
    .bind(order.price)
    .bind(order.order_type)
    .bind(order.triggered)
    .bind(order.trigger_time)
    .bind(order.stop_price)
    .bind(order.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_order(pool: &PgPool, order_id: Uuid) -> Result<Order, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        "SELECT id, user_id, symbol, side, order_type, price, quantity, filled_quantity, filled_amount, \
         avg_price, fee, status, time_in_force, stop_price, take_profit_price, trailing_delta, \
         triggered, trigger_time, created_at, updated_at FROM orders WHERE id = $1",
    )
    .bind(order_id)
    .fetch_one(pool)
    .await
}

/// Pending, untriggered stop/trigger orders, the exact predicate
/// `stop_order_monitor.go`'s `checkStopOrders` polls on.
pub async fn fetch_pending_trigger_orders(pool: &PgPool) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        "SELECT id, user_id, symbol, side, order_type, price, quantity, filled_quantity, filled_amount, \
         avg_price, fee, status, time_in_force, stop_price, take_profit_price, trailing_delta, \
         triggered, trigger_time, created_at, updated_at \
         FROM orders \
         WHERE order_type IN ('stop_loss', 'take_profit', 'stop_limit', 'trailing_stop') \
           AND status = 'pending' AND triggered = false",
    )
    .fetch_all(pool)
    .await
}

/// Serves `recent_trades(symbol, limit)` straight from the trade store,
/// without taking any lock on the live book.
pub async fn fetch_recent_trades(pool: &PgPool, symbol: &str, limit: i64) -> Result<Vec<Trade>, sqlx::Error> {
    sqlx::query_as::<_, Trade>(
        "SELECT id, symbol, buy_order_id, sell_order_id, buyer_id, seller_id, price, quantity, amount, \
         buyer_fee, seller_fee, trade_time FROM trades WHERE symbol = $1 ORDER BY trade_time DESC LIMIT $2",
    )
    .bind(symbol)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn last_trade_price(pool: &PgPool, symbol: &str) -> Result<Option<Decimal>, sqlx::Error> {
    let row: Option<(Decimal,)> =
        sqlx::query_as("SELECT price FROM trades WHERE symbol = $1 ORDER BY trade_time DESC LIMIT 1")
            .bind(symbol)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(p,)| p))
}

pub async fn insert_trade(pool: &PgPool, trade: &Trade) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO trades (id, symbol, buy_order_id, sell_order_id, buyer_id, seller_id, price, \
         quantity, amount, buyer_fee, seller_fee, trade_time) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
    )
    .bind(trade.id)
    .bind(&trade.symbol)
    .bind(trade.buy_order_id)
    .bind(trade.sell_order_id)
    .bind(trade.buyer_id)
    .bind(trade.seller_id)
    .bind(trade.price)
    .bind(trade.quantity)
    .bind(trade.amount)
    .bind(trade.buyer_fee)
    .bind(trade.seller_fee)
    .bind(trade.trade_time)
    .execute(pool)
    .await?;
    Ok(())
}
