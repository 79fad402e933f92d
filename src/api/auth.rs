//! Authentication routes and the authenticated-user extractor.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::{debug, info};

use super::server::AppState;
use crate::auth::{ACCESS_COOKIE, IssuedTokens, REFRESH_COOKIE, hash_password, verify_password};
use crate::error::{ApiError, ApiResult};
use crate::types::User;

/// The user a request is authenticated as, taken from the access-token cookie.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(ACCESS_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

        let user_id = state.keys().verify_access(&token).map_err(|e| {
            debug!("Rejected access token: {}", e);
            ApiError::unauthorized("Invalid or expired access token")
        })?;

        Ok(AuthUser { user_id })
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    message: &'static str,
    user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

/// Minimal address shape check: one `@`, non-empty local part, dotted domain.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn validate_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::invalid_value("email", "Email is required"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::invalid_value("email", "Invalid email address"));
    }
    Ok(email)
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < 6 {
        return Err(ApiError::invalid_value(
            "password",
            "Password must be at least 6 characters",
        ));
    }
    Ok(())
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid_value("body", rejection.body_text()))
}

/// Attach a fresh token pair to the jar. Each cookie lives as long as its token.
fn with_session(jar: CookieJar, tokens: IssuedTokens, secure: bool) -> CookieJar {
    let build = |name: &'static str, value: String, ttl_secs: u64| {
        Cookie::build((name, value))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX)))
            .build()
    };
    jar.add(build(ACCESS_COOKIE, tokens.access, tokens.access_ttl_secs))
        .add(build(REFRESH_COOKIE, tokens.refresh, tokens.refresh_ttl_secs))
}

fn without_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

fn issue(state: &AppState, user_id: i64) -> ApiResult<IssuedTokens> {
    state.keys().issue(user_id).map_err(ApiError::internal)
}

/// `POST /auth/register`
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<RegisterBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = json_body(payload)?;

    let name = body.name.trim().to_string();
    if name.chars().count() < 2 {
        return Err(ApiError::invalid_value(
            "name",
            "Name must be at least 2 characters",
        ));
    }
    let email = validate_email(&body.email)?;
    validate_password(&body.password)?;

    let password = body.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(ApiError::internal)??;

    let user = state.db().create_user(&name, &email, &hash)?;
    let tokens = issue(&state, user.id)?;
    info!(user_id = user.id, "Registered user");

    Ok((
        StatusCode::CREATED,
        with_session(jar, tokens, state.secure_cookies()),
        Json(AuthResponse {
            message: "Registration successful",
            user,
        }),
    ))
}

/// `POST /auth/login`
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = json_body(payload)?;
    let email = validate_email(&body.email)?;
    validate_password(&body.password)?;

    let invalid = || ApiError::unauthorized("Invalid email or password");
    let (user, hash) = state.db().get_user_credentials(&email)?.ok_or_else(invalid)?;

    let password = body.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(ApiError::internal)?;
    if !matches {
        return Err(invalid());
    }

    let tokens = issue(&state, user.id)?;
    debug!(user_id = user.id, "User logged in");

    Ok((
        with_session(jar, tokens, state.secure_cookies()),
        Json(AuthResponse {
            message: "Login successful",
            user,
        }),
    ))
}

/// `POST /auth/logout`
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        without_session(jar),
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    )
}

/// `POST /auth/refresh`: rotate both tokens using the refresh cookie.
pub async fn refresh(State(state): State<AppState>, jar: CookieJar) -> ApiResult<impl IntoResponse> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::unauthorized("Refresh token not found"))?;

    let user_id = state
        .keys()
        .verify_refresh(&token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired refresh token"))?;

    let tokens = issue(&state, user_id)?;
    Ok((
        with_session(jar, tokens, state.secure_cookies()),
        Json(MessageResponse {
            message: "Token refreshed successfully",
        }),
    ))
}

/// `GET /auth/me`
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<User>> {
    let user = state
        .db()
        .get_user(auth.user_id)?
        .ok_or_else(ApiError::user_not_found)?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("ada@example.com"));
        assert!(!is_valid_email("ada.example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada@@example.com"));
        assert!(!is_valid_email("a da@example.com"));
    }

    #[test]
    fn short_password_is_rejected() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }
}
