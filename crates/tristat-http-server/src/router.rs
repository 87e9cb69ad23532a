use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, classify::StatusInRangeAsFailures, trace::TraceLayer,
};

use crate::api::{self, TristatState};

pub(crate) fn router(state: TristatState) -> Router {
    // 400..=599 status response codes will be logged as errors
    let classifier = StatusInRangeAsFailures::new(400..=599).into_make_classifier();
    let log_layer = TraceLayer::new(classifier);
    Router::new()
        .route("/health", get(api::health))
        // to compute a statistic with this party as the orchestrator:
        .route("/compute/{kind}", post(api::compute))
        // called by the orchestrating party:
        .route("/sum", post(api::sum))
        .route("/beaver_mask", post(api::beaver_mask))
        .route("/beaver_compute", post(api::beaver_compute))
        .with_state(state)
        // panics will result in 500 status code responses instead of bringing down the server
        .layer(CatchPanicLayer::new())
        // sealed triple batches easily exceed the default limit of 2MB
        .layer(DefaultBodyLimit::disable())
        .layer(ServiceBuilder::new().layer(log_layer))
}
