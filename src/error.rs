use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Failures surfaced by the credential store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Backend(other.into()),
        }
    }
}

/// Outcomes of the authentication and password reset flows.
///
/// `InvalidCredentials`, `InvalidSession` and `InvalidOrExpiredToken` all
/// render the same response body so clients cannot tell them apart.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("email already registered")]
    DuplicateEmail,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid session")]
    InvalidSession,
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("authentication required")]
    Unauthenticated,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            StoreError::NotFound => AuthError::Internal(anyhow::anyhow!("record not found")),
            StoreError::Backend(e) => AuthError::Internal(e),
        }
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::InvalidSession
            | AuthError::InvalidOrExpiredToken
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AuthError::InvalidInput(msg) => msg.clone(),
            AuthError::DuplicateEmail => "Email already registered".to_string(),
            AuthError::InvalidCredentials
            | AuthError::InvalidSession
            | AuthError::InvalidOrExpiredToken => "not authorized".to_string(),
            AuthError::Unauthenticated => "authentication required".to_string(),
            AuthError::Internal(e) => {
                error!(error = %e, "internal error");
                "internal server error".to_string()
            }
        };
        (status, body).into_response()
    }
}
