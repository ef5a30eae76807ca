use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use course_allocation::workflows::allocation::{
    allocation_router, AllocationServices, CatalogRepository, EscalationPublisher,
    PreferenceSetRepository,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_allocation_routes<C, P, E>(
    services: Arc<AllocationServices<C, P, E>>,
) -> axum::Router
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    allocation_router(services)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{ChannelEscalationPublisher, InMemoryCatalog, InMemoryPreferenceSets};
    use axum::body::Body;
    use axum::http::Request;
    use course_allocation::workflows::allocation::AllocationPolicy;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let (escalations, _receiver) = ChannelEscalationPublisher::channel();
        let services = Arc::new(AllocationServices::new(
            Arc::new(InMemoryCatalog::default()),
            Arc::new(InMemoryPreferenceSets::default()),
            Arc::new(escalations),
            AllocationPolicy::default(),
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_allocation_routes(services).layer(Extension(state))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let initializing = app(false)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(initializing.status(), StatusCode::SERVICE_UNAVAILABLE);

        let ready = app(true)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(ready.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn allocation_routes_are_mounted() {
        let response = app(true)
            .oneshot(
                Request::post("/api/v1/admin/terms")
                    .header("x-principal-role", "admin")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"year":2025,"season":"FALL"}"#))
                    .expect("request"),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
