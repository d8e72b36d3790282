use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
///
/// Each variant maps onto one call-status class of the RPC surface.
/// Anything that is a fault rather than an expected outcome collapses to
/// `internal` on the wire; the detail only reaches the log.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The connection pool could not be built.
    #[error("Pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A token could not be encoded.
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// A row was missing an expected column.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// Missing, malformed, expired or forged credentials, or a revoked session.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// The caller is known but may not perform the operation.
    #[error("Permission denied")]
    PermissionDenied,

    /// The per-client rate limit tripped.
    #[error("Rate limit exceeded")]
    ResourceExhausted,

    /// A request argument was rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A request payload failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] garde::Report),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The status class reported to the caller.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::PermissionDenied => "permission_denied",
            AppError::ResourceExhausted => "resource_exhausted",
            AppError::InvalidArgument(_) | AppError::Validation(_) => "invalid_argument",
            AppError::NotFound => "not_found",
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::CreatePool(_)
            | AppError::Token(_)
            | AppError::MissingData(_)
            | AppError::Internal(_) => "internal",
        }
    }
}

/// Body rejections become `invalid_argument` without echoing the parser's
/// message back to the caller.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        let message = match rejection {
            JsonRejection::MissingJsonContentType(_) => "expected an application/json body",
            JsonRejection::JsonSyntaxError(_) => "request body is not valid JSON",
            JsonRejection::JsonDataError(_) => "request body does not match the expected shape",
            _ => "request body could not be read",
        };
        AppError::InvalidArgument(message.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Pool creation error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }

            AppError::Token(ref e) => {
                tracing::error!("Token error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }

            AppError::MissingData(ref column) => {
                tracing::error!("Missing column in row: {}", column);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }

            AppError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "missing or invalid token".to_string())
            }

            AppError::PermissionDenied => {
                tracing::warn!("Permission denied");
                (StatusCode::FORBIDDEN, "permission denied".to_string())
            }

            AppError::ResourceExhausted => {
                (StatusCode::TOO_MANY_REQUESTS, "too many requests".to_string())
            }

            AppError::InvalidArgument(ref msg) => {
                tracing::debug!("Invalid argument: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Validation(ref report) => {
                tracing::debug!("Validation error: {}", report);
                (StatusCode::BAD_REQUEST, report.to_string())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "resource not found".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "code": self.code(),
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"code":"internal","error":"internal error"}"#.to_string());

        (
            status,
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
