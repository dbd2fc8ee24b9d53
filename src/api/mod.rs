pub mod control;
pub mod error;
pub mod health;
pub mod response;
pub mod status;
pub mod v1;

use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::Config, context::CoreContext};

pub fn router(ctx: Arc<CoreContext>, cfg: &Config) -> Router {
    Router::new()
        .nest("/api/v1", v1::router(ctx.clone(), cfg))
        .route("/health", axum::routing::get(health::health_check))
        .route("/health/ready", axum::routing::get(health::readiness_check))
        .route("/health/live", axum::routing::get(health::liveness_check))
        .with_state(ctx)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(feature = "swagger")]
pub fn with_swagger(app: Router) -> Router {
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    #[derive(OpenApi)]
    #[openapi(paths(), components())]
    struct ApiDoc;

    app.merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
}

#[cfg(feature = "metrics")]
pub fn with_metrics(app: Router) -> Router {
    use axum_prometheus::PrometheusMetricLayer;
    let (layer, handle) = PrometheusMetricLayer::pair();
    app.layer(layer).route("/metrics", axum::routing::get(move || async move { handle.render() }))
}
