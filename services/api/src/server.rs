use crate::cli::ServeArgs;
use crate::infra::{AppState, Backend};
use crate::jobs;
use crate::routes::with_service_routes;
use at_voucher::config::AppConfig;
use at_voucher::error::AppError;
use at_voucher::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let services = Backend::new(&config)?.spawn_delivery_worker(&config);
    if !args.no_jobs {
        let interval = Duration::from_secs(config.inbound.sweep_interval_secs.max(1));
        tokio::spawn(jobs::run_periodic(services.clone(), interval));
    }

    let app = with_service_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "voucher administration service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
