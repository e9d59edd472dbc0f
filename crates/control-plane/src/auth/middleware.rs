// Authentication extractor
// Decision: Bearer header for API clients, access_token cookie for the dashboard
// Decision: `token` query parameter for WebSocket and EventSource, which cannot set headers

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use super::config::AuthConfig;
use super::jwt::JwtService;
use crate::api::common::ErrorResponse;

/// Authentication error
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingCredentials,
    #[error("Invalid authorization header")]
    MalformedHeader,
    #[error("Invalid or expired token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(self.to_string())),
        )
            .into_response()
    }
}

/// Authenticated user context extracted from request
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// User ID
    pub id: Uuid,
    /// User email
    pub email: String,
}

/// Auth state shared across routes
#[derive(Clone)]
pub struct AuthState {
    pub jwt_service: Arc<JwtService>,
}

impl AuthState {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            jwt_service: Arc::new(JwtService::new(config.jwt.clone())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        let token = extract_token(parts)?.ok_or(AuthError::MissingCredentials)?;
        validate_jwt_token(&token, &auth_state)
    }
}

/// Find a bearer token in the header, cookie or query string (in that order)
fn extract_token(parts: &Parts) -> Result<Option<String>, AuthError> {
    if let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::MalformedHeader)?;
        let token = auth_str
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MalformedHeader)?;
        return Ok(Some(token.trim().to_string()));
    }

    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get("access_token") {
        return Ok(Some(cookie.value().to_string()));
    }

    let token = Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|q| q.0.token)
        .filter(|t| !t.is_empty());
    Ok(token)
}

fn validate_jwt_token(token: &str, auth_state: &AuthState) -> Result<AuthUser, AuthError> {
    let claims = auth_state
        .jwt_service
        .validate_access_token(token)
        .map_err(|e| {
            tracing::debug!("JWT validation failed: {}", e);
            AuthError::InvalidToken
        })?;

    let id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

    Ok(AuthUser {
        id,
        email: claims.email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn auth_state() -> AuthState {
        AuthState::new(&AuthConfig::with_secret("middleware-test-secret"))
    }

    async fn extract(request: Request<()>) -> Result<AuthUser, AuthError> {
        let state = auth_state();
        let (mut parts, _) = request.into_parts();
        AuthUser::from_request_parts(&mut parts, &state).await
    }

    fn token_for(user_id: Uuid) -> String {
        auth_state()
            .jwt_service
            .generate_access_token(user_id, "u@example.com")
            .unwrap()
    }

    #[tokio::test]
    async fn test_bearer_header() {
        let id = Uuid::now_v7();
        let request = Request::builder()
            .header(header::AUTHORIZATION, format!("Bearer {}", token_for(id)))
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_cookie() {
        let id = Uuid::now_v7();
        let request = Request::builder()
            .header(header::COOKIE, format!("access_token={}", token_for(id)))
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_query_parameter() {
        let id = Uuid::now_v7();
        let request = Request::builder()
            .uri(format!("/realtime/x?token={}", token_for(id)))
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_missing_and_invalid() {
        let request = Request::builder().uri("/realtime/x").body(()).unwrap();
        assert!(matches!(
            extract(request).await,
            Err(AuthError::MissingCredentials)
        ));

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(())
            .unwrap();
        assert!(matches!(extract(request).await, Err(AuthError::InvalidToken)));

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc")
            .body(())
            .unwrap();
        assert!(matches!(
            extract(request).await,
            Err(AuthError::MalformedHeader)
        ));
    }
}
