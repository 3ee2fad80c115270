use crate::cache::{InMemoryResponseCache, ResponseCache};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use taskmarket::config::MarketConfig;
use taskmarket::marketplace::Marketplace;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) market: Marketplace,
    pub(crate) cache: Arc<dyn ResponseCache>,
    pub(crate) cache_ttl: Duration,
}

impl AppState {
    pub(crate) fn new(
        market: Marketplace,
        config: &MarketConfig,
        metrics: PrometheusHandle,
        readiness: Arc<AtomicBool>,
    ) -> Self {
        Self {
            readiness,
            metrics: Arc::new(metrics),
            market,
            cache: Arc::new(InMemoryResponseCache::default()),
            cache_ttl: config.cache_ttl,
        }
    }
}

pub(crate) fn parse_amount(raw: &str) -> Result<Decimal, String> {
    let amount: Decimal = raw
        .trim()
        .parse()
        .map_err(|err| format!("failed to parse '{raw}' as a decimal amount ({err})"))?;
    if amount <= Decimal::ZERO {
        return Err(format!("amount must be positive, got {amount}"));
    }
    Ok(amount)
}
