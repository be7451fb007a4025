//! Test-data generation for the `seed` CLI subcommand: a handful of demo
//! trading pairs, users, and starting balances so a freshly migrated
//! database has something to match orders against.
//!
//! Grounded on the originating service's fixture-seeding conventions (demo
//! accounts funded with round starting balances); generalized here to the
//! five core models this engine persists.

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::ledger::DEFAULT_CHAIN;
use crate::models::{TradingPair, User, UserAsset, UserStatus};

const DEMO_USER_COUNT: usize = 5;
const DEMO_STARTING_QUOTE: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);
const DEMO_STARTING_BASE: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

struct DemoPair {
    symbol: &'static str,
    base: &'static str,
    quote: &'static str,
}

const DEMO_PAIRS: &[DemoPair] = &[
    DemoPair { symbol: "BTCUSDT", base: "BTC", quote: "USDT" },
    DemoPair { symbol: "ETHUSDT", base: "ETH", quote: "USDT" },
];

/// Seeds trading pairs, demo users, and starting balances. Safe to run more
/// than once: pairs and users are inserted with `ON CONFLICT DO NOTHING`,
/// balances are upserted to the same starting amount.
pub async fn run(pool: &PgPool) -> anyhow::Result<()> {
    for pair in DEMO_PAIRS {
        let trading_pair = TradingPair {
            symbol: pair.symbol.to_string(),
            base_currency: pair.base.to_string(),
            quote_currency: pair.quote.to_string(),
            price_precision: 2,
            quantity_precision: 6,
            min_quantity: Decimal::new(1, 4),
            max_quantity: Decimal::new(1_000, 0),
            min_notional: Decimal::new(10, 0),
            maker_fee_rate: Decimal::new(2, 4),
            taker_fee_rate: Decimal::new(1, 3),
            is_active: true,
            created_at: Utc::now(),
        };
        crate::db::insert_trading_pair(pool, &trading_pair).await?;
        tracing::info!(symbol = pair.symbol, "seeded trading pair");
    }

    let mut rng = rand::thread_rng();
    for i in 0..DEMO_USER_COUNT {
        let user = User {
            id: Uuid::new_v4(),
            email: format!("demo-trader-{i}@example.test"),
            kyc_level: 1,
            status: UserStatus::Active,
            register_ip: Some(format!("10.0.0.{}", rng.gen_range(1..254))),
            last_login_ip: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        crate::db::insert_user(pool, &user).await?;

        for pair in DEMO_PAIRS {
            fund(pool, user.id, pair.base, DEMO_STARTING_BASE).await?;
            fund(pool, user.id, pair.quote, DEMO_STARTING_QUOTE).await?;
        }
        tracing::info!(user_id = %user.id, email = %user.email, "seeded demo user");
    }

    Ok(())
}

async fn fund(pool: &PgPool, user_id: Uuid, currency: &str, amount: Decimal) -> anyhow::Result<()> {
    let asset = UserAsset {
        id: Uuid::new_v4(),
        user_id,
        currency: currency.to_string(),
        chain: DEFAULT_CHAIN.to_string(),
        available: amount,
        frozen: Decimal::ZERO,
        updated_at: Utc::now(),
    };
    crate::db::upsert_user_asset(pool, &asset).await?;
    Ok(())
}
