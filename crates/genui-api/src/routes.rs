use crate::{handlers, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Generations
        .route("/api/generate", post(handlers::start_generation))
        .route("/api/generations", get(handlers::list_generations))
        .route("/api/generations/{id}", get(handlers::get_generation))
        .route("/api/view/{id}", get(handlers::view_generation))
        .route("/generate", get(handlers::generate_sync))
        // Runtime configuration
        .route(
            "/api/config",
            get(handlers::get_config).put(handlers::update_config),
        )
        .route("/api/config/reset", post(handlers::reset_config))
        // Progress stream
        .route("/api/events", get(handlers::stream_events))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(TraceLayer::new_for_http())
}
