use crate::cache::ResponseCache;
use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_market_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskmarket::config::AppConfig;
use taskmarket::error::AppError;
use taskmarket::marketplace::Marketplace;
use taskmarket::telemetry;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (market, _notifications) = Marketplace::in_memory(&config.market);

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState::new(
        market,
        &config.market,
        prometheus_handle,
        readiness_flag.clone(),
    );
    let sweeper = if args.no_sweeper {
        None
    } else {
        Some(spawn_sweeper(&app_state, config.market.sweep_interval))
    };

    let app = with_market_routes(&app_state)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        sweep_interval_secs = config.market.sweep_interval.as_secs(),
        sweeper = sweeper.is_some(),
        "task marketplace ready"
    );

    let served = axum::serve(listener, app).await;
    if let Some(handle) = sweeper {
        handle.abort();
    }
    served?;
    Ok(())
}

/// Background sweep that drops cached responses whenever a pass changes jobs or orders.
fn spawn_sweeper(state: &AppState, period: Duration) -> JoinHandle<()> {
    let cache = state.cache.clone();
    state.market.sweeper.clone().spawn(period, move |report| {
        debug!(
            published = report.published.len(),
            frozen = report.frozen.len(),
            expired_orders = report.expired_orders.len(),
            "sweep changed state; clearing response cache"
        );
        cache.invalidate_all();
    })
}
