// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Ingestion --------
pub static WS_MESSAGES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("websocket_messages_total", "Total WebSocket messages received").unwrap()
});

pub static WS_MALFORMED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("malformed_messages_total", "WebSocket messages dropped as malformed").unwrap()
});

pub static WS_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("ws_connected", "1 if the kline stream is connected, 0 otherwise").unwrap()
});

pub static WS_RECONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("ws_reconnects_total", "Number of reconnect attempts to the kline stream").unwrap()
});

// -------- Strategy / ledger --------
pub static SIGNALS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trading_signals_total", "Total trading signals generated (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

pub static ORDERS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("orders_total", "paper orders filled").unwrap());

pub static POSITIONS_OPENED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("positions_opened_total", "positions opened").unwrap());

pub static POSITIONS_CLOSED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("positions_closed_total", "positions closed").unwrap());

pub static PNL_REALIZED: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pnl_realized", "realized PnL since start (quote currency)").unwrap());

// Latency of one on_tick (seconds)
pub static LATENCY: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(HistogramOpts::new(
        "operation_latency_seconds",
        "Time spent processing operations",
    ))
    .unwrap()
});

// -------- Host --------
pub static CPU_USAGE: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("cpu_usage_percent", "Current CPU usage percentage").unwrap());

pub static MEMORY_USAGE: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("memory_usage_percent", "Current memory usage percentage").unwrap());

pub static DISK_USAGE: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("disk_usage_percent", "Current disk usage percentage").unwrap());

// -------- Persistence --------
pub static STORE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("store_errors_total", "failed store writes (label: op)"),
        &["op"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry; double init is harmless
    for m in [
        REGISTRY.register(Box::new(WS_MESSAGES.clone())),
        REGISTRY.register(Box::new(WS_MALFORMED.clone())),
        REGISTRY.register(Box::new(WS_CONNECTED.clone())),
        REGISTRY.register(Box::new(WS_RECONNECTS.clone())),
        REGISTRY.register(Box::new(SIGNALS.clone())),
        REGISTRY.register(Box::new(ORDERS.clone())),
        REGISTRY.register(Box::new(POSITIONS_OPENED.clone())),
        REGISTRY.register(Box::new(POSITIONS_CLOSED.clone())),
        REGISTRY.register(Box::new(PNL_REALIZED.clone())),
        REGISTRY.register(Box::new(LATENCY.clone())),
        REGISTRY.register(Box::new(STORE_ERRORS.clone())),
        REGISTRY.register(Box::new(CPU_USAGE.clone())),
        REGISTRY.register(Box::new(MEMORY_USAGE.clone())),
        REGISTRY.register(Box::new(DISK_USAGE.clone())),
    ] {
        let _ = m;
    }
}

const SYSTEM_FAMILIES: [&str; 3] = ["cpu_usage_percent", "memory_usage_percent", "disk_usage_percent"];

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    encode(REGISTRY.gather())
}

// Host gauges only (/metrics/system)
pub fn encode_system_metrics() -> Vec<u8> {
    let families = REGISTRY
        .gather()
        .into_iter()
        .filter(|f| SYSTEM_FAMILIES.contains(&f.get_name()))
        .collect();
    encode(families)
}

fn encode(families: Vec<prometheus::proto::MetricFamily>) -> Vec<u8> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_counters_show_up_in_text_output() {
        init();
        init();
        WS_MESSAGES.inc();
        SIGNALS.with_label_values(&["BUY"]).inc();
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("websocket_messages_total"));
        assert!(text.contains("trading_signals_total{kind=\"BUY\"}"));
    }

    #[test]
    fn system_text_holds_only_host_gauges() {
        init();
        CPU_USAGE.set(12.5);
        let text = String::from_utf8(encode_system_metrics()).unwrap();
        assert!(text.contains("cpu_usage_percent"));
        assert!(text.contains("memory_usage_percent"));
        assert!(text.contains("disk_usage_percent"));
        assert!(!text.contains("websocket_messages_total"));
    }
}
