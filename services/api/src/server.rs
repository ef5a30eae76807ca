use crate::cli::ServeArgs;
use crate::infra::{AppState, ChannelEscalationPublisher, InMemoryCatalog, InMemoryPreferenceSets};
use crate::routes::with_allocation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use course_allocation::config::AppConfig;
use course_allocation::error::AppError;
use course_allocation::telemetry;
use course_allocation::workflows::allocation::{
    AllocationServices, CatalogImporter, EscalationEvent,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
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

    let (escalations, receiver) = ChannelEscalationPublisher::channel();
    tokio::spawn(drain_escalations(receiver));

    let services = Arc::new(AllocationServices::new(
        Arc::new(InMemoryCatalog::default()),
        Arc::new(InMemoryPreferenceSets::default()),
        Arc::new(escalations),
        config.allocation.policy(),
    ));

    if let Some(path) = args.faculty_csv.take() {
        let seeded = CatalogImporter::faculty_from_path(&services.catalog, &path)?;
        info!(rows = seeded.len(), path = %path.display(), "faculty catalog seeded");
    }
    if let Some(path) = args.course_csv.take() {
        let seeded = CatalogImporter::courses_from_path(&services.catalog, &path)?;
        info!(rows = seeded.len(), path = %path.display(), "course catalog seeded");
    }

    let app = with_allocation_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        environment = ?config.environment,
        %addr,
        max_courses_per_faculty = config.allocation.max_courses_per_faculty,
        "course allocation service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

async fn drain_escalations(mut receiver: UnboundedReceiver<EscalationEvent>) {
    while let Some(event) = receiver.recv().await {
        info!(
            topic = "course-assignment-llm",
            faculty_id = %event.faculty_id,
            course_id = %event.course_id,
            term_id = %event.term_id,
            preference_rank = event.preference_rank,
            "escalation dispatched"
        );
    }
}
