//! Process-wide configuration, loaded once at startup.
//!
//! Layers environment variables (optionally from a `.env` file via `dotenvy`,
//! loaded by the caller before `EngineConfig::load`) over the defaults below
//! using the `config` crate, the same approach the originating service uses
//! for its `AppConfig`.

use serde::Deserialize;

fn default_matching_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "EngineConfig::default_database_url")]
    pub database_url: String,

    #[serde(default = "default_matching_worker_count")]
    pub matching_worker_count: usize,

    #[serde(default = "EngineConfig::default_trade_channel_capacity")]
    pub trade_channel_capacity: usize,

    #[serde(default = "EngineConfig::default_rate_limit_count")]
    pub risk_rate_limit_count: u32,
    #[serde(default = "EngineConfig::default_rate_limit_window_secs")]
    pub risk_rate_limit_window_secs: u64,

    #[serde(default = "EngineConfig::default_max_notional")]
    pub risk_max_notional: rust_decimal::Decimal,
    #[serde(default = "EngineConfig::default_price_deviation_pct")]
    pub risk_price_deviation_pct: rust_decimal::Decimal,

    #[serde(default = "EngineConfig::default_trigger_tick_interval_secs")]
    pub trigger_tick_interval_secs: u64,

    #[serde(default = "EngineConfig::default_true")]
    pub trigger_monitor_enabled: bool,
    #[serde(default = "EngineConfig::default_true")]
    pub risk_gate_enabled: bool,

    #[serde(default = "EngineConfig::default_maker_fee_rate")]
    pub maker_fee_rate: rust_decimal::Decimal,
    #[serde(default = "EngineConfig::default_taker_fee_rate")]
    pub taker_fee_rate: rust_decimal::Decimal,

    #[serde(default = "EngineConfig::default_slippage_band_pct")]
    pub market_order_slippage_band_pct: rust_decimal::Decimal,

    #[serde(default = "EngineConfig::default_metrics_port")]
    pub metrics_port: u16,

    #[serde(default = "EngineConfig::default_http_port")]
    pub http_port: u16,
}

impl EngineConfig {
    fn default_database_url() -> String {
        "postgres://localhost/spotclob".to_string()
    }
    fn default_trade_channel_capacity() -> usize {
        10_000
    }
    fn default_rate_limit_count() -> u32 {
        10
    }
    fn default_rate_limit_window_secs() -> u64 {
        10
    }
    fn default_max_notional() -> rust_decimal::Decimal {
        rust_decimal::Decimal::new(1_000_000, 0)
    }
    fn default_price_deviation_pct() -> rust_decimal::Decimal {
        rust_decimal::Decimal::new(10, 2) // 0.10
    }
    fn default_trigger_tick_interval_secs() -> u64 {
        1
    }
    fn default_true() -> bool {
        true
    }
    fn default_maker_fee_rate() -> rust_decimal::Decimal {
        rust_decimal::Decimal::new(2, 4) // 0.0002
    }
    fn default_taker_fee_rate() -> rust_decimal::Decimal {
        rust_decimal::Decimal::new(1, 3) // 0.001, matches original engine.go's flat fee rate
    }
    fn default_slippage_band_pct() -> rust_decimal::Decimal {
        rust_decimal::Decimal::new(5, 2) // 0.05
    }
    fn default_metrics_port() -> u16 {
        9090
    }
    fn default_http_port() -> u16 {
        8080
    }

    /// Load configuration from the environment, falling back to the defaults
    /// above for anything unset. Validates thresholds before returning.
    pub fn load() -> anyhow::Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("SPOTCLOB").separator("__"))
            .build()?;

        let engine_config: EngineConfig = match cfg.try_deserialize() {
            Ok(c) => c,
            Err(_) => {
                // No environment overrides present; use pure defaults by
                // deserializing an empty map through the `#[serde(default...)]` chain.
                config::Config::builder()
                    .build()?
                    .try_deserialize()
                    .unwrap_or_else(|_| EngineConfig::defaults())
            }
        };

        engine_config.validate()?;
        Ok(engine_config)
    }

    fn defaults() -> Self {
        Self {
            database_url: Self::default_database_url(),
            matching_worker_count: default_matching_worker_count(),
            trade_channel_capacity: Self::default_trade_channel_capacity(),
            risk_rate_limit_count: Self::default_rate_limit_count(),
            risk_rate_limit_window_secs: Self::default_rate_limit_window_secs(),
            risk_max_notional: Self::default_max_notional(),
            risk_price_deviation_pct: Self::default_price_deviation_pct(),
            trigger_tick_interval_secs: Self::default_trigger_tick_interval_secs(),
            trigger_monitor_enabled: true,
            risk_gate_enabled: true,
            maker_fee_rate: Self::default_maker_fee_rate(),
            taker_fee_rate: Self::default_taker_fee_rate(),
            market_order_slippage_band_pct: Self::default_slippage_band_pct(),
            metrics_port: Self::default_metrics_port(),
            http_port: Self::default_http_port(),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.database_url.is_empty(), "database_url must not be empty");
        anyhow::ensure!(self.trade_channel_capacity > 0, "trade_channel_capacity must be positive");
        anyhow::ensure!(self.risk_rate_limit_count > 0, "risk_rate_limit_count must be positive");
        anyhow::ensure!(
            self.risk_max_notional > rust_decimal::Decimal::ZERO,
            "risk_max_notional must be positive"
        );
        anyhow::ensure!(
            self.risk_price_deviation_pct > rust_decimal::Decimal::ZERO,
            "risk_price_deviation_pct must be positive"
        );
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.trade_channel_capacity, 10_000);
        assert_eq!(cfg.risk_rate_limit_count, 10);
    }
}
