use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use tracing::{error, instrument};

use crate::{
    auth::{
        cookies::{clear_session_cookie, cookie_value, session_cookie, SESSION_COOKIE_NAME},
        csrf::CsrfToken,
        dto::{
            CredentialsRequest, CsrfResponse, ForgotPasswordRequest, MessageResponse, PublicUser,
            ResetPasswordRequest, ResetTokenQuery,
        },
        extractors::RequireUser,
        repo_types::User,
    },
    error::AuthError,
    state::AppState,
};

const FORGOT_PW_MESSAGE: &str =
    "If that address belongs to an account, a reset link is on its way.";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/csrf", get(csrf_token))
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/signout", post(signout))
        .route("/forgot-pw", post(forgot_password))
        .route("/reset-pw", get(check_reset_token).post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me))
}

/// Respond with the user and a fresh session cookie.
fn signed_in(
    state: &AppState,
    status: StatusCode,
    user: User,
    token: &str,
) -> Result<Response, AuthError> {
    let cookie = session_cookie(token, state.config.session.cookie_secure)
        .map_err(|e| AuthError::Internal(e.into()))?;
    Ok((status, [(SET_COOKIE, cookie)], Json(PublicUser::from(user))).into_response())
}

pub async fn csrf_token(Extension(CsrfToken(token)): Extension<CsrfToken>) -> Json<CsrfResponse> {
    Json(CsrfResponse { csrf_token: token })
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, AuthError> {
    let (user, token) = state.auth.signup(&payload.email, &payload.password).await?;
    signed_in(&state, StatusCode::CREATED, user, &token)
}

#[instrument(skip(state, payload))]
pub async fn signin(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, AuthError> {
    let user = state
        .auth
        .authenticate(&payload.email, &payload.password)
        .await?;
    let token = state.auth.create_session(&user).await?;
    signed_in(&state, StatusCode::OK, user, &token)
}

#[instrument(skip(state, headers))]
pub async fn signout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE_NAME) {
        if let Err(e) = state.auth.end_session(&token).await {
            error!(error = %e, "failed to end session");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    match clear_session_cookie(state.config.session.cookie_secure) {
        Ok(cookie) => (StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response(),
        Err(e) => AuthError::Internal(e.into()).into_response(),
    }
}

/// Same response whether or not the address is registered.
#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    state.resets.request_reset(&payload.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: FORGOT_PW_MESSAGE,
        }),
    ))
}

#[instrument(skip(state, query))]
pub async fn check_reset_token(
    State(state): State<AppState>,
    Query(query): Query<ResetTokenQuery>,
) -> Result<StatusCode, AuthError> {
    state.resets.check_reset(&query.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Response, AuthError> {
    let (user, token) = state
        .resets
        .complete_reset(&payload.token, &payload.password)
        .await?;
    signed_in(&state, StatusCode::OK, user, &token)
}

#[instrument(skip(user))]
pub async fn get_me(RequireUser(user): RequireUser) -> Json<PublicUser> {
    Json(PublicUser::from(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_me_returns_public_fields_only() {
        let state = AppState::fake();
        let (user, _) = state.auth.signup("me@x.com", "Secret123!").await.unwrap();

        let Json(me) = get_me(RequireUser(user.clone())).await;
        assert_eq!(me.id, user.id);
        assert_eq!(me.email, "me@x.com");
    }

    #[tokio::test]
    async fn forgot_password_answers_alike_for_known_and_unknown_emails() {
        let state = AppState::fake();
        state.auth.signup("known@x.com", "Secret123!").await.unwrap();

        for email in ["known@x.com", "unknown@x.com"] {
            let (status, Json(body)) = forgot_password(
                State(state.clone()),
                Json(ForgotPasswordRequest {
                    email: email.to_string(),
                }),
            )
            .await
            .unwrap();
            assert_eq!(status, StatusCode::ACCEPTED);
            assert_eq!(body.message, FORGOT_PW_MESSAGE);
        }
    }

    #[tokio::test]
    async fn signout_clears_cookie_without_a_session() {
        let res = signout(State(AppState::fake()), HeaderMap::new()).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let cookie = res.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE_NAME}=;")));
        assert!(cookie.contains("Max-Age=0"));
    }
}
