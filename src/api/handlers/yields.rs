use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::api::state::AppState;
use crate::model::SourceStats;

/// Short shared-cache lifetime with a longer stale-serve window.
pub const CACHE_CONTROL: &str = "public, s-maxage=60, stale-while-revalidate=300";

/// `GET /api/yields`: a freshly assembled result. Always 200.
pub async fn get_yields(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.aggregator.assemble().await;
    ([(header::CACHE_CONTROL, CACHE_CONTROL)], Json(result))
}

/// `GET /api/sources`: lifetime per-source counters.
pub async fn get_sources(State(state): State<AppState>) -> Json<Vec<SourceStats>> {
    Json(state.aggregator.stats())
}
