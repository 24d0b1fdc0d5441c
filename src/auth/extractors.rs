use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::ACCEPT, request::Parts, HeaderMap},
    response::{IntoResponse, Redirect, Response},
};
use tracing::warn;

use crate::auth::repo_types::User;
use crate::error::AuthError;

/// User resolved from the session cookie by the session middleware.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Gate for protected routes: yields the signed-in user or rejects.
pub struct RequireUser(pub User);

/// Rejection for [`RequireUser`]. Browsers are sent to the sign-in page,
/// API clients get a 401.
#[derive(Debug)]
pub enum Unauthenticated {
    Redirect,
    Challenge,
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"))
}

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        match self {
            Unauthenticated::Redirect => Redirect::to("/signin").into_response(),
            Unauthenticated::Challenge => AuthError::Unauthenticated.into_response(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<CurrentUser>() {
            Some(CurrentUser(user)) => Ok(RequireUser(user.clone())),
            None => {
                warn!(path = %parts.uri.path(), "unauthenticated request to protected route");
                if wants_html(&parts.headers) {
                    Err(Unauthenticated::Redirect)
                } else {
                    Err(Unauthenticated::Challenge)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request, StatusCode};
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn parts(accept: Option<&'static str>) -> Parts {
        let mut builder = Request::builder().uri("/users/me");
        if let Some(a) = accept {
            builder = builder.header(ACCEPT, HeaderValue::from_static(a));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn passes_through_attached_user() {
        let mut p = parts(None);
        let user = User {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            password_hash: "h".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        p.extensions.insert(CurrentUser(user.clone()));
        let RequireUser(got) = RequireUser::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(got.id, user.id);
    }

    #[tokio::test]
    async fn rejects_api_clients_with_401() {
        let mut p = parts(Some("application/json"));
        let err = RequireUser::from_request_parts(&mut p, &()).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn redirects_browsers_to_signin() {
        let mut p = parts(Some("text/html,application/xhtml+xml"));
        let res = RequireUser::from_request_parts(&mut p, &())
            .await
            .err()
            .unwrap()
            .into_response();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()["location"], "/signin");
    }
}
