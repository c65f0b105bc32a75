use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use super::Session;
use crate::state::AppState;

/// Session cookie name
pub const SESSION_COOKIE: &str = "visualizer_session";

/// Login state of the current request, inserted by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct AuthStatus {
    pub session: Option<Session>,
    /// Development mode: every request counts as logged in
    pub dev_mode: bool,
}

impl AuthStatus {
    pub fn is_authenticated(&self) -> bool {
        self.dev_mode || self.session.is_some()
    }
}

/// Extract session ID from request
pub fn extract_session_id(cookies: &CookieJar, headers: &axum::http::HeaderMap) -> Option<String> {
    // First try cookie
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    // Then try Authorization header (Bearer token)
    if let Some(auth_header) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Authentication middleware
///
/// Resolves the session but never rejects: pages decide for themselves
/// whether to show content or the login form.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    cookies: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session = extract_session_id(&cookies, request.headers())
        .and_then(|session_id| state.sessions.get(&session_id));

    request.extensions_mut().insert(AuthStatus {
        session,
        dev_mode: state.dev_mode(),
    });
    next.run(request).await
}
