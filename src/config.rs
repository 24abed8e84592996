// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : kline_sma_trader — async SMA crossover paper trader in Rust
Module  : config.rs
Version : 0.1.0
Author  : kline_sma_trader contributors
License : MIT

Summary : Streams Binance klines for one symbol, detects short/long SMA
          crossovers, paper-trades a single LONG position, persists every
          sample/signal/order/position, and exposes health + Prometheus metrics.
=============================================================================
*/
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use url::Url;

use crate::error::ConfigError;

/// Raw CLI / ENV input. Every flag has an ENV fallback so `.env` keeps working.
#[derive(Parser, Clone, Debug)]
#[command(name = "kline_sma_trader", version, about = "Binance kline SMA crossover paper trader")]
pub struct Args {
    #[arg(long, env = "SYMBOL", default_value = "BTCUSDT")]
    pub symbol: String,

    /// Kline interval, e.g. 1s, 1m, 5m
    #[arg(long, env = "KLINE_INTERVAL", default_value = "1s")]
    pub interval: String,

    #[arg(long, env = "BINANCE_WS_URL", default_value = "wss://stream.binance.com:9443/ws")]
    pub ws_base: String,

    #[arg(long, env = "SHORT_TERM_PERIOD", default_value_t = 50)]
    pub short_period: usize,

    #[arg(long, env = "LONG_TERM_PERIOD", default_value_t = 200)]
    pub long_period: usize,

    #[arg(long, env = "UNIT_QTY", default_value = "1.0")]
    pub unit_qty: Decimal,

    /// JSONL store; in-memory store when absent
    #[arg(long, env = "RECORD_FILE")]
    pub record_file: Option<PathBuf>,

    /// Samples per symbol kept in the in-memory index (raised to the long period if smaller)
    #[arg(long, env = "SAMPLE_RETENTION", default_value_t = 1000)]
    pub sample_retention: usize,

    #[arg(long, env = "HTTP_PORT", default_value_t = 9898)]
    pub http_port: u16,

    #[arg(long, env = "TICK_CHANNEL_CAPACITY", default_value_t = 1024)]
    pub channel_capacity: usize,

    #[arg(long, env = "BACKOFF_INITIAL_SECS", default_value_t = 1)]
    pub backoff_initial_secs: u64,

    #[arg(long, env = "BACKOFF_MAX_SECS", default_value_t = 60)]
    pub backoff_max_secs: u64,
}

/// Parameters shared by the detector, the ledger and the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct StrategyParams {
    pub short_period: usize,
    pub long_period: usize,
    pub unit_qty: Decimal,
}

impl StrategyParams {
    pub fn new(short_period: usize, long_period: usize, unit_qty: Decimal) -> Result<Self, ConfigError> {
        if short_period == 0 {
            return Err(ConfigError::Zero("short period"));
        }
        if long_period == 0 {
            return Err(ConfigError::Zero("long period"));
        }
        if short_period >= long_period {
            return Err(ConfigError::PeriodOrder { short: short_period, long: long_period });
        }
        if unit_qty <= Decimal::ZERO {
            return Err(ConfigError::UnitQty(unit_qty.to_string()));
        }
        Ok(Self { short_period, long_period, unit_qty })
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub symbol: String,
    pub interval: String,
    pub stream_url: Url,
    pub strategy: StrategyParams,
    pub record_file: Option<PathBuf>,
    pub sample_retention: usize,
    pub http_port: u16,
    pub channel_capacity: usize,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Args {
    pub fn validate(self) -> Result<Settings, ConfigError> {
        let symbol = self.symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(ConfigError::Empty("symbol"));
        }
        let interval = self.interval.trim().to_string();
        if interval.is_empty() {
            return Err(ConfigError::Empty("interval"));
        }
        let strategy = StrategyParams::new(self.short_period, self.long_period, self.unit_qty)?;
        if self.channel_capacity == 0 {
            return Err(ConfigError::Zero("channel capacity"));
        }
        if self.backoff_initial_secs == 0 || self.backoff_initial_secs > self.backoff_max_secs {
            return Err(ConfigError::Backoff {
                initial: self.backoff_initial_secs,
                max: self.backoff_max_secs,
            });
        }
        let stream_url = stream_url(&self.ws_base, &symbol, &interval)?;
        let sample_retention = self.sample_retention.max(strategy.long_period);

        Ok(Settings {
            symbol,
            interval,
            stream_url,
            strategy,
            record_file: self.record_file,
            sample_retention,
            http_port: self.http_port,
            channel_capacity: self.channel_capacity,
            backoff_initial: Duration::from_secs(self.backoff_initial_secs),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
        })
    }
}

/// `{base}/{symbol_lower}@kline_{interval}`, e.g. `wss://stream.binance.com:9443/ws/btcusdt@kline_1s`
pub fn stream_url(ws_base: &str, symbol: &str, interval: &str) -> Result<Url, ConfigError> {
    let raw = format!(
        "{}/{}@kline_{}",
        ws_base.trim_end_matches('/'),
        symbol.to_lowercase(),
        interval
    );
    let url = Url::parse(&raw).map_err(|e| ConfigError::BadUrl { url: raw.clone(), reason: e.to_string() })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::BadUrl { url: raw, reason: format!("unsupported scheme {other}") }),
    }
}

pub fn load() -> Result<Settings, ConfigError> {
    // Pastikan .env dibaca sebelum clap melihat ENV
    let _ = dotenv();
    Args::parse().validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ENV_KEYS: &[&str] = &[
        "SYMBOL",
        "KLINE_INTERVAL",
        "BINANCE_WS_URL",
        "SHORT_TERM_PERIOD",
        "LONG_TERM_PERIOD",
        "UNIT_QTY",
        "RECORD_FILE",
        "SAMPLE_RETENTION",
        "HTTP_PORT",
        "TICK_CHANNEL_CAPACITY",
        "BACKOFF_INITIAL_SECS",
        "BACKOFF_MAX_SECS",
    ];

    // clap falls back to ENV; keep the host environment out of these tests
    fn parse<const N: usize>(argv: [&str; N]) -> Args {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
        Args::parse_from(argv)
    }

    fn args() -> Args {
        parse(["kline_sma_trader"])
    }

    #[test]
    fn defaults_are_btcusdt_50_200() {
        let s = args().validate().unwrap();
        assert_eq!(s.symbol, "BTCUSDT");
        assert_eq!(s.strategy.short_period, 50);
        assert_eq!(s.strategy.long_period, 200);
        assert_eq!(s.strategy.unit_qty, dec!(1.0));
        assert_eq!(s.backoff_initial, Duration::from_secs(1));
        assert_eq!(s.backoff_max, Duration::from_secs(60));
        assert_eq!(s.sample_retention, 1000);
        assert_eq!(s.stream_url.as_str(), "wss://stream.binance.com:9443/ws/btcusdt@kline_1s");
    }

    #[test]
    fn cli_flags_override_defaults() {
        let s = parse([
            "kline_sma_trader",
            "--symbol", "ethusdt",
            "--interval", "1m",
            "--short-period", "5",
            "--long-period", "10",
            "--ws-base", "ws://127.0.0.1:9000/ws/",
        ])
        .validate()
        .unwrap();
        assert_eq!(s.symbol, "ETHUSDT");
        assert_eq!(s.stream_url.as_str(), "ws://127.0.0.1:9000/ws/ethusdt@kline_1m");
        assert_eq!(s.strategy.long_period, 10);
    }

    #[test]
    fn retention_never_below_long_period() {
        let mut a = args();
        a.sample_retention = 3;
        assert_eq!(a.validate().unwrap().sample_retention, 200);
    }

    #[test]
    fn rejects_inverted_periods() {
        let mut a = args();
        a.short_period = 20;
        a.long_period = 10;
        assert!(matches!(a.validate(), Err(ConfigError::PeriodOrder { short: 20, long: 10 })));
    }

    #[test]
    fn rejects_bad_backoff_and_qty() {
        let mut a = args();
        a.backoff_initial_secs = 0;
        assert!(matches!(a.validate(), Err(ConfigError::Backoff { .. })));

        assert!(matches!(StrategyParams::new(5, 10, dec!(0)), Err(ConfigError::UnitQty(_))));
    }

    #[test]
    fn rejects_non_ws_scheme() {
        assert!(matches!(stream_url("https://example.com", "BTCUSDT", "1s"), Err(ConfigError::BadUrl { .. })));
    }
}
