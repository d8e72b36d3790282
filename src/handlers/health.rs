use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn check() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "SERVING" }))
}
