use crate::cli::ServeArgs;
use crate::infra::{seeded_infrastructure, AppState};
use crate::routes::with_enrollment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use classroom::config::AppConfig;
use classroom::error::AppError;
use classroom::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

const DEFAULT_SEEDED_CAPACITY: u32 = 30;

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

    let infra = seeded_infrastructure(DEFAULT_SEEDED_CAPACITY)?;
    let admission_service = Arc::new(infra.admission_service(config.admission));

    let app = with_enrollment_routes(admission_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        max_commit_attempts = config.admission.max_commit_attempts,
        "course admission service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
