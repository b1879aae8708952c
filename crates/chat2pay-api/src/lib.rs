pub mod config;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod security;
pub mod services;
pub mod state;
pub mod utils;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::security::middleware::merchant_auth_middleware;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // Public routes (shopper facing)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/api/products/ask", post(handlers::ask::ask_product_handler))
        .route(
            "/api/sessions/{session_id}/connect",
            post(handlers::sessions::connect_session_handler),
        )
        .route(
            "/api/sessions/{session_id}",
            delete(handlers::sessions::reset_session_handler),
        )
        .route(
            "/api/sessions/{session_id}/history",
            get(handlers::sessions::session_history_handler),
        )
        .route("/ws/chat/{session_id}", get(handlers::ws::ws_chat_handler));

    // Merchant routes (signed headers required)
    let merchant_routes = Router::new()
        .route("/api/products", post(handlers::products::create_product_handler))
        .route(
            "/api/products/batch",
            post(handlers::products::create_products_batch_handler),
        )
        .route("/api/products/{id}", get(handlers::products::get_product_handler))
        .layer(middleware::from_fn_with_state(
            state.header_validator.clone(),
            merchant_auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(merchant_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
