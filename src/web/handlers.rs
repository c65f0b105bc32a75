use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::pages;
use crate::auth::{Admission, AuthError, AuthStatus, SESSION_COOKIE};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::stream::{mjpeg_response, StreamEncoder, ViewerGuard};

/// Login page with an error line
fn login_failure(status: StatusCode, error: AuthError) -> Response {
    (status, Html(pages::login_page(Some(&error.to_string())))).into_response()
}

/// Stream overview
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthStatus>,
) -> Response {
    if !auth.is_authenticated() {
        return Html(pages::login_page(None)).into_response();
    }
    Html(pages::index_page(state.topics.names(), !state.dev_mode())).into_response()
}

/// Configured topic names
pub async fn list_topics(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthStatus>,
) -> Result<Json<Vec<String>>> {
    if !auth.is_authenticated() {
        return Err(AppError::Unauthorized);
    }
    Ok(Json(state.topics.names().to_vec()))
}

pub async fn login_form(Extension(auth): Extension<AuthStatus>) -> Response {
    if auth.is_authenticated() {
        return Redirect::to("/").into_response();
    }
    Html(pages::login_page(None)).into_response()
}

/// Login form; missing fields count as a failed attempt
#[derive(Deserialize)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    cookies: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    if state.dev_mode() {
        return Ok(Redirect::to("/").into_response());
    }

    if state.limiter.admit().await == Admission::LockedOut {
        return Ok(login_failure(
            StatusCode::TOO_MANY_REQUESTS,
            AuthError::RetryLater,
        ));
    }

    // Argon2 verification is CPU bound
    let verified = match (state.credentials.clone(), form.username, form.password) {
        (Some(credentials), Some(username), Some(password)) => {
            tokio::task::spawn_blocking(move || credentials.verify(&username, &password))
                .await
                .map_err(|e| AppError::Internal(format!("credential check failed: {}", e)))?
        }
        _ => false,
    };

    if !verified {
        let failures = state.limiter.record_failure().await;
        warn!("Failed login attempt ({} since last reset)", failures);
        return Ok(login_failure(StatusCode::UNAUTHORIZED, AuthError::InvalidLogin));
    }

    state.limiter.record_success();
    let username = state
        .credentials
        .as_ref()
        .map(|c| c.username().to_string())
        .unwrap_or_default();
    let session = state.sessions.create(&username);
    info!("User {} logged in", username);

    let cookie = Cookie::build((SESSION_COOKIE, session.id))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(i64::from(
            state.config.auth.session_timeout_secs,
        )))
        .build();

    Ok((cookies.add(cookie), Redirect::to("/")).into_response())
}

pub async fn logout(State(state): State<Arc<AppState>>, cookies: CookieJar) -> Response {
    if state.dev_mode() {
        return Redirect::to("/").into_response();
    }

    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        if state.sessions.delete(cookie.value()) {
            info!("Session logged out");
        }
    }

    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();

    (cookies.remove(cookie), Redirect::to("/login")).into_response()
}

/// MJPEG stream of one topic
pub async fn topic_stream(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthStatus>,
    Path(topic): Path<String>,
) -> Result<Response> {
    let Some(queue) = state.topics.get(&topic) else {
        return Err(AppError::InvalidRequest);
    };
    if !auth.is_authenticated() {
        return Ok(Html(pages::login_page(None)).into_response());
    }

    let guard = ViewerGuard::new(uuid::Uuid::new_v4().to_string(), queue.clone());
    let encoder = StreamEncoder::new(
        topic,
        Some(queue),
        state.config.stream.jpeg_quality,
        &state.typeface,
    );
    Ok(mjpeg_response(encoder, Some(guard), state.idle_interval()))
}
