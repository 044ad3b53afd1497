use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_application_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use citizenship_workflow::config::AppConfig;
use citizenship_workflow::error::AppError;
use citizenship_workflow::telemetry;
use citizenship_workflow::workflows::citizenship::{
    CitizenshipApplicationService, InMemoryApplicationStore, TracingAuditSink,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryApplicationStore::new());
    let application_service = Arc::new(CitizenshipApplicationService::new(
        store,
        Arc::new(TracingAuditSink),
        config.workflow.clone(),
    ));

    let app = with_application_routes(application_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        reference_prefix = config.workflow.reference_prefix(),
        "citizenship workflow service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
