use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use crate::auth::cookies::{cookie_value, SESSION_COOKIE_NAME};
use crate::auth::extractors::CurrentUser;
use crate::error::AuthError;
use crate::state::AppState;

/// Resolve the session cookie, if any, into a [`CurrentUser`] extension.
///
/// A missing, unknown or unresolvable session never fails the request; the
/// handler just sees no user. Protected routes enforce presence through
/// [`RequireUser`](crate::auth::extractors::RequireUser).
pub async fn set_user(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(token) = cookie_value(req.headers(), SESSION_COOKIE_NAME) {
        match state.auth.resolve_session(&token).await {
            Ok(user) => {
                req.extensions_mut().insert(CurrentUser(user));
            }
            Err(AuthError::InvalidSession) => debug!("session cookie did not resolve"),
            Err(e) => error!(error = %e, "session lookup failed"),
        }
    }
    next.run(req).await
}
