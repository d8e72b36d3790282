use axum::extract::FromRequest;

use crate::error::AppError;

/// A JSON request body whose rejections are reported as [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Payload<T>(pub T);
