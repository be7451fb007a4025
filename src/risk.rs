//! Component E: pre-trade and trade-time risk controls.
//!
//! `validate_order` runs the five-step short-circuit chain `order_service.go`
//! drives through `RiskManager.ValidateOrder`: account state, submission
//! rate, notional size, price deviation from the last trade, then a
//! non-blocking pattern scan. `check_trade` runs after a match is produced
//! and before settlement, mirroring `DetectSelfTrading` — direct self-trades
//! and same-IP related accounts abort the trade; wash-trading frequency and
//! price-abnormality are logged only, under a "flags do not block,
//! rejections do" rule (see DESIGN.md for why this overrides the
//! original's blocking `detectAbnormalTradingPattern`).
//!
//! The rate limiter reuses the sliding-window-over-a-`DashMap` shape of
//! `auth::rate_limit::RateLimiter`, generalized from per-IP HTTP throttling
//! to per-user order submission.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::{RiskEvent, Trade, User, Violation};

const LAST_TRADE_CACHE_TTL: Duration = Duration::from_secs(5);
const PATTERN_WINDOW: Duration = Duration::from_secs(5 * 60);
const EXCESSIVE_CANCEL_THRESHOLD: usize = 20;
const REPEAT_QUANTITY_THRESHOLD: usize = 4;
const REPEAT_QUANTITY_TOLERANCE_PCT: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01
const WASH_TRADE_PAIR_THRESHOLD: usize = 5;
const WASH_TRADE_PRICE_DEVIATION_PCT: Decimal = Decimal::from_parts(20, 0, 0, false, 2); // 0.20

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("account {0} is not active")]
    AccountInactive(Uuid),
    #[error("order submission rate exceeded for account {0}")]
    RateLimited(Uuid),
    #[error("order notional {notional} exceeds cap {cap}")]
    NotionalExceeded { notional: Decimal, cap: Decimal },
    #[error("order price deviates {actual_pct} from last trade, cap {cap_pct}")]
    PriceDeviation { actual_pct: Decimal, cap_pct: Decimal },
    #[error("self-trade detected: buyer and seller are the same account {0}")]
    SelfTrade(Uuid),
    #[error("related accounts detected: {buyer} and {seller} share a registration or login IP")]
    RelatedAccounts { buyer: Uuid, seller: Uuid },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RiskError {
    pub fn kind(&self) -> crate::errors::ErrorKind {
        use crate::errors::ErrorKind;
        match self {
            RiskError::AccountInactive(_) => ErrorKind::Forbidden,
            RiskError::RateLimited(_) => ErrorKind::RateLimited,
            RiskError::NotionalExceeded { .. } | RiskError::PriceDeviation { .. } => ErrorKind::RiskRejected,
            RiskError::SelfTrade(_) | RiskError::RelatedAccounts { .. } => ErrorKind::SelfTrading,
            RiskError::Database(_) => ErrorKind::Internal,
        }
    }
}

struct CachedPrice {
    price: Decimal,
    cached_at: Instant,
}

/// Pre-trade and trade-time checks, holding only in-memory bookkeeping
/// (sliding windows, a short-TTL last-trade cache) alongside a handle to the
/// database for the durable `RiskEvent`/`Violation` trail and the cache-miss
/// fallback query.
pub struct RiskGate {
    db: PgPool,
    config: Arc<EngineConfig>,
    rate_limits: DashMap<Uuid, VecDeque<Instant>>,
    last_trade_cache: DashMap<String, CachedPrice>,
    cancel_history: DashMap<Uuid, VecDeque<Instant>>,
    quantity_history: DashMap<Uuid, VecDeque<Decimal>>,
    trade_pair_history: DashMap<(Uuid, Uuid), VecDeque<Instant>>,
    recent_trade_prices: DashMap<String, VecDeque<(Instant, Decimal)>>,
}

impl RiskGate {
    pub fn new(db: PgPool, config: Arc<EngineConfig>) -> Self {
        Self {
            db,
            config,
            rate_limits: DashMap::new(),
            last_trade_cache: DashMap::new(),
            cancel_history: DashMap::new(),
            quantity_history: DashMap::new(),
            trade_pair_history: DashMap::new(),
            recent_trade_prices: DashMap::new(),
        }
    }

    /// Pre-trade validation chain. `reference_price` is the price the caller
    /// will use for notional/deviation checks: the limit price for limit
    /// orders, or the book's best opposing price for market orders. The
    /// deviation check itself only applies to limit-priced order types
    /// (`Limit`/`StopLimit`) — a market order has no price of its own to
    /// deviate, and gating it on the opposing best price would reject
    /// legitimate market orders in a fast-moving book.
    pub async fn validate_order(
        &self,
        user: &User,
        symbol: &str,
        order_type: crate::models::OrderType,
        quantity: Decimal,
        reference_price: Decimal,
    ) -> Result<(), RiskError> {
        if !user.is_active() {
            crate::metrics::record_risk_rejection("account_inactive");
            return Err(RiskError::AccountInactive(user.id));
        }

        if let Err(err) = self.check_rate_limit(user.id) {
            crate::metrics::record_risk_rejection("rate_limited");
            return Err(err);
        }

        let notional = reference_price * quantity;
        if notional > self.config.risk_max_notional {
            crate::metrics::record_risk_rejection("notional_exceeded");
            return Err(RiskError::NotionalExceeded {
                notional,
                cap: self.config.risk_max_notional,
            });
        }

        let is_limit_priced = matches!(
            order_type,
            crate::models::OrderType::Limit | crate::models::OrderType::StopLimit
        );
        if is_limit_priced {
            if let Err(err) = self.check_price_deviation(symbol, reference_price).await {
                crate::metrics::record_risk_rejection("price_deviation");
                return Err(err);
            }
        }

        // Non-blocking: logged as RiskEvent rows, never rejects the order.
        if let Some(flag) = self.detect_pattern(user.id, quantity) {
            self.log_risk_event(user.id, &flag, None).await;
        }

        Ok(())
    }

    /// Trade-time checks run after a match but before settlement. Self-trades
    /// and related-account matches abort the trade; wash-trading frequency
    /// and price-abnormality are recorded as flags only.
    pub async fn check_trade(&self, trade: &Trade, buyer: &User, seller: &User) -> Result<(), RiskError> {
        if trade.buyer_id == trade.seller_id {
            self.log_violation(trade.buyer_id, "self_trade", &format!("trade {}", trade.id)).await;
            return Err(RiskError::SelfTrade(trade.buyer_id));
        }

        if accounts_related(buyer, seller) {
            self.log_violation(
                trade.buyer_id,
                "related_accounts",
                &format!("trade {} shares an IP with account {}", trade.id, trade.seller_id),
            )
            .await;
            return Err(RiskError::RelatedAccounts {
                buyer: trade.buyer_id,
                seller: trade.seller_id,
            });
        }

        if self.is_wash_trading(trade.buyer_id, trade.seller_id) {
            self.log_risk_event(trade.buyer_id, "wash_trading_pattern", Some(trade.id)).await;
        }

        if self.is_price_abnormal(&trade.symbol, trade.price) {
            self.log_risk_event(trade.buyer_id, "price_abnormality", Some(trade.id)).await;
        }

        self.record_trade(trade);
        Ok(())
    }

    /// Called by the orchestrator after a cancel, feeding the excessive-
    /// cancellation pattern flag.
    pub fn record_cancel(&self, user_id: Uuid) {
        let now = Instant::now();
        let mut entry = self.cancel_history.entry(user_id).or_default();
        entry.push_back(now);
        prune_window(&mut entry, now, PATTERN_WINDOW);
    }

    fn check_rate_limit(&self, user_id: Uuid) -> Result<(), RiskError> {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.risk_rate_limit_window_secs);
        let mut entry = self.rate_limits.entry(user_id).or_default();
        prune_window(&mut entry, now, window);
        entry.push_back(now);
        if entry.len() as u32 > self.config.risk_rate_limit_count {
            return Err(RiskError::RateLimited(user_id));
        }
        Ok(())
    }

    async fn check_price_deviation(&self, symbol: &str, reference_price: Decimal) -> Result<(), RiskError> {
        let last_price = match self.last_trade_price(symbol).await? {
            Some(price) => price,
            None => return Ok(()), // no trading history yet, nothing to deviate from
        };
        if last_price == Decimal::ZERO {
            return Ok(());
        }
        let deviation = ((reference_price - last_price) / last_price).abs();
        if deviation > self.config.risk_price_deviation_pct {
            return Err(RiskError::PriceDeviation {
                actual_pct: deviation,
                cap_pct: self.config.risk_price_deviation_pct,
            });
        }
        Ok(())
    }

    async fn last_trade_price(&self, symbol: &str) -> Result<Option<Decimal>, RiskError> {
        if let Some(cached) = self.last_trade_cache.get(symbol) {
            if cached.cached_at.elapsed() < LAST_TRADE_CACHE_TTL {
                return Ok(Some(cached.price));
            }
        }

        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT price FROM trades WHERE symbol = $1 ORDER BY trade_time DESC LIMIT 1")
                .bind(symbol)
                .fetch_optional(&self.db)
                .await?;

        if let Some((price,)) = row {
            self.last_trade_cache.insert(
                symbol.to_string(),
                CachedPrice {
                    price,
                    cached_at: Instant::now(),
                },
            );
            Ok(Some(price))
        } else {
            Ok(None)
        }
    }

    /// Flags (does not reject) excessive cancellations or a suspicious run
    /// of near-identical order quantities, mirroring
    /// `detectAbnormalTradingPattern`'s two checks.
    fn detect_pattern(&self, user_id: Uuid, quantity: Decimal) -> Option<&'static str> {
        if let Some(history) = self.cancel_history.get(&user_id) {
            if history.len() > EXCESSIVE_CANCEL_THRESHOLD {
                return Some("excessive_cancellations");
            }
        }

        let now = Instant::now();
        let mut entry = self.quantity_history.entry(user_id).or_default();
        entry.push_back(quantity);
        while entry.len() > REPEAT_QUANTITY_THRESHOLD {
            entry.pop_front();
        }
        let _ = now;
        if entry.len() >= REPEAT_QUANTITY_THRESHOLD
            && entry.iter().all(|q| approx_equal(*q, quantity, REPEAT_QUANTITY_TOLERANCE_PCT))
        {
            return Some("fixed_quantity_repeat");
        }

        None
    }

    fn is_wash_trading(&self, buyer_id: Uuid, seller_id: Uuid) -> bool {
        let key = if buyer_id < seller_id {
            (buyer_id, seller_id)
        } else {
            (seller_id, buyer_id)
        };
        let now = Instant::now();
        let mut entry = self.trade_pair_history.entry(key).or_default();
        prune_window(&mut entry, now, PATTERN_WINDOW);
        entry.push_back(now);
        entry.len() > WASH_TRADE_PAIR_THRESHOLD
    }

    fn is_price_abnormal(&self, symbol: &str, price: Decimal) -> bool {
        let now = Instant::now();
        let mut entry = self.recent_trade_prices.entry(symbol.to_string()).or_default();
        prune_window_pairs(&mut entry, now, PATTERN_WINDOW);

        let abnormal = if entry.is_empty() {
            false
        } else {
            let sum: Decimal = entry.iter().map(|(_, p)| *p).sum();
            let avg = sum / Decimal::from(entry.len() as u64);
            if avg == Decimal::ZERO {
                false
            } else {
                ((price - avg) / avg).abs() > WASH_TRADE_PRICE_DEVIATION_PCT
            }
        };

        entry.push_back((now, price));
        abnormal
    }

    fn record_trade(&self, trade: &Trade) {
        self.last_trade_cache.insert(
            trade.symbol.clone(),
            CachedPrice {
                price: trade.price,
                cached_at: Instant::now(),
            },
        );
    }

    async fn log_risk_event(&self, user_id: Uuid, event_type: &str, order_id: Option<Uuid>) {
        crate::metrics::record_risk_event(event_type);
        let event = RiskEvent {
            id: Uuid::new_v4(),
            user_id,
            event_type: event_type.to_string(),
            detail: String::new(),
            order_id,
            created_at: chrono::Utc::now(),
        };
        if let Err(err) = sqlx::query(
            "INSERT INTO risk_events (id, user_id, event_type, detail, order_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(&event.event_type)
        .bind(&event.detail)
        .bind(event.order_id)
        .bind(event.created_at)
        .execute(&self.db)
        .await
        {
            tracing::warn!(%user_id, event_type, error = %err, "failed to persist risk event");
        }
    }

    async fn log_violation(&self, user_id: Uuid, violation_type: &str, detail: &str) {
        crate::metrics::record_risk_rejection(violation_type);
        let violation = Violation {
            id: Uuid::new_v4(),
            user_id,
            violation_type: violation_type.to_string(),
            detail: detail.to_string(),
            created_at: chrono::Utc::now(),
        };
        if let Err(err) = sqlx::query(
            "INSERT INTO violations (id, user_id, violation_type, detail, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(violation.id)
        .bind(violation.user_id)
        .bind(&violation.violation_type)
        .bind(&violation.detail)
        .bind(violation.created_at)
        .execute(&self.db)
        .await
        {
            tracing::error!(%user_id, violation_type, error = %err, "failed to persist violation");
        }
    }
}

/// Same-IP heuristic for related accounts, grounded in
/// `DetectRelatedAccounts`'s join on `register_ip`/`last_login_ip` rather
/// than any graph-based analysis.
fn accounts_related(buyer: &User, seller: &User) -> bool {
    let shares = |a: &Option<String>, b: &Option<String>| match (a, b) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    };
    shares(&buyer.register_ip, &seller.register_ip)
        || shares(&buyer.last_login_ip, &seller.last_login_ip)
        || shares(&buyer.register_ip, &seller.last_login_ip)
        || shares(&buyer.last_login_ip, &seller.register_ip)
}

/// Whether `a` is within `tolerance_pct` of `b`. Used for the fixed-quantity
/// pattern flag, which looks for orders of "approximately" the same size
/// rather than requiring an exact match.
fn approx_equal(a: Decimal, b: Decimal, tolerance_pct: Decimal) -> bool {
    if b == Decimal::ZERO {
        return a == b;
    }
    ((a - b) / b).abs() <= tolerance_pct
}

fn prune_window(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = entries.front() {
        if now.duration_since(*front) >= window {
            entries.pop_front();
        } else {
            break;
        }
    }
}

fn prune_window_pairs(entries: &mut VecDeque<(Instant, Decimal)>, now: Instant, window: Duration) {
    while let Some((front, _)) = entries.front() {
        if now.duration_since(*front) >= window {
            entries.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn user(status: crate::models::UserStatus, ip: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "trader@example.com".into(),
            kyc_level: 1,
            status,
            register_ip: ip.map(str::to_string),
            last_login_ip: ip.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn related_accounts_share_an_ip() {
        let buyer = user(crate::models::UserStatus::Active, Some("1.2.3.4"));
        let seller = user(crate::models::UserStatus::Active, Some("1.2.3.4"));
        assert!(accounts_related(&buyer, &seller));
    }

    #[test]
    fn distinct_ips_are_not_related() {
        let buyer = user(crate::models::UserStatus::Active, Some("1.2.3.4"));
        let seller = user(crate::models::UserStatus::Active, Some("5.6.7.8"));
        assert!(!accounts_related(&buyer, &seller));
    }

    #[test]
    fn prune_window_drops_stale_entries() {
        let mut entries = VecDeque::new();
        let old = Instant::now() - Duration::from_secs(600);
        entries.push_back(old);
        entries.push_back(Instant::now());
        prune_window(&mut entries, Instant::now(), PATTERN_WINDOW);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn notional_cap_arithmetic() {
        let cap = dec!(1000000);
        let notional = dec!(50000) * dec!(25);
        assert!(notional > cap);
    }

    #[test]
    fn approx_equal_allows_one_percent_drift() {
        assert!(approx_equal(dec!(100), dec!(100.9), REPEAT_QUANTITY_TOLERANCE_PCT));
        assert!(!approx_equal(dec!(100), dec!(102), REPEAT_QUANTITY_TOLERANCE_PCT));
    }
}
