pub mod config;
pub mod error;
pub mod form;
pub mod handlers;
pub mod models;
pub mod photos;
pub mod store;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use handlers::AppState;
pub use photos::PhotoManager;
pub use store::Store;

/// Builds the REST router over the given state.
pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    // CORS: allow all
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Uploads
        .route("/uploads/:filename", get(handlers::serve_upload))
        // Health
        .route("/health", get(handlers::health))
        // Cards
        .route("/api/cards", get(handlers::list_cards).post(handlers::create_card))
        .route(
            "/api/cards/:id",
            get(handlers::get_card)
                .put(handlers::update_card)
                .delete(handlers::delete_card),
        )
        // Photos
        .route(
            "/api/cards/:id/photo",
            post(handlers::upload_photo).delete(handlers::delete_photo),
        )
        // Tags
        .route("/api/tags", get(handlers::list_tags))
        // Middleware
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
