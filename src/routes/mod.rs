pub mod auth;
pub mod feed;
pub mod interactions;
pub mod posts;

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application router.
pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.uploads_dir);

    Router::new()
        .merge(auth::router())
        .merge(feed::router())
        .merge(posts::router(state.config.storage.max_upload_bytes))
        .merge(interactions::router())
        .nest_service("/uploads", uploads)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
