use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::post,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    error::AppError,
    handlers::{authorization, health},
    methods,
    middleware_layer,
    state::AppState,
};

/// RPC payloads are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Builds the application router.
///
/// Every route, the fallback included, sits behind the admission pipeline.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(86400));

    Router::new()
        .route(methods::LOGIN, post(authorization::login))
        .route(methods::REFRESH_TOKEN, post(authorization::refresh_token))
        .route(methods::LOGOUT, post(authorization::logout))
        .route(methods::GET_CURRENT_SESSION, post(authorization::get_current_session))
        .route(methods::LIST_ACTIVE_SESSIONS, post(authorization::list_active_sessions))
        .route(methods::REVOKE_SESSION, post(authorization::revoke_session))
        .route(methods::CHANGE_PASSWORD, post(authorization::change_password))
        .route(methods::HEALTH_CHECK, post(health::check))
        .fallback(|| async { AppError::NotFound })
        .layer(from_fn_with_state(
            state.clone(),
            middleware_layer::pipeline::admit,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::default().include_headers(false))
                        .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                        .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
                )
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(cors),
        )
        .with_state(state)
}
