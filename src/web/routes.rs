use axum::{
    http::{header, HeaderValue},
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use super::handlers;
use crate::auth::auth_middleware;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/", get(handlers::index))
        .route("/topics", get(handlers::list_topics))
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route("/:topic", get(handlers::topic_stream))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ));

    // HSTS only makes sense over HTTPS
    let router = if state.dev_mode() {
        router
    } else {
        router.layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::Typeface;
    use crate::auth::{hash_password, Credentials, SESSION_COOKIE};
    use crate::config::{AppConfig, TopicConfig, TransportConfig};
    use crate::pipeline::TopicRegistry;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    fn app(dev_mode: bool) -> (Router, Arc<AppState>) {
        let mut config = AppConfig {
            dev_mode,
            ..Default::default()
        };
        config.topics.push(TopicConfig {
            name: "camera1".to_string(),
            publisher: None,
            transport: TransportConfig::default(),
            labels: Default::default(),
            draw_results: true,
            channel_order: Default::default(),
        });

        let topics = TopicRegistry::new(config.topics.iter().map(|t| t.name.clone()), 4);
        let credentials = (!dev_mode)
            .then(|| Credentials::new("admin", hash_password("secret").unwrap()));
        let typeface = Typeface::builtin().unwrap();
        let state = AppState::new(Arc::new(config), topics, credentials, typeface);
        (create_router(state.clone()), state)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    fn post_login(form: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap()
    }

    fn login(username: &str, password: &str) -> Request<Body> {
        post_login(&format!("username={}&password={}", username, password))
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn session_cookie(response: &Response) -> String {
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("Secure"));
        assert!(set_cookie.contains("SameSite=Strict"));
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_unauthenticated_stream_shows_login() {
        let (router, _) = app(false);
        let response = router.oneshot(get("/camera1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert!(response
            .headers()
            .contains_key(header::STRICT_TRANSPORT_SECURITY));
        let body = body_text(response).await;
        assert!(body.contains(r#"action="/login""#));
    }

    #[tokio::test]
    async fn test_unknown_topic_is_invalid_request() {
        let (router, _) = app(false);
        let response = router.oneshot(get("/nope")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("Invalid Request"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failures_trigger_lockout() {
        let (router, state) = app(false);

        for _ in 0..3 {
            let response = router.clone().oneshot(login("admin", "wrong")).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(body_text(response).await.contains("Invalid Login"));
        }
        assert_eq!(state.limiter.failures(), 3);

        // Correct credentials are not even checked during the lockout
        let response = router.clone().oneshot(login("admin", "secret")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(body_text(response).await.contains("Retry after a while"));
        assert_eq!(state.limiter.failures(), 0);
        assert!(state.sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_login_form_counts_as_failure() {
        let (router, state) = app(false);

        for form in ["username=admin", "password=secret", ""] {
            let response = router.clone().oneshot(post_login(form)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(body_text(response).await.contains("Invalid Login"));
        }
        assert_eq!(state.limiter.failures(), 3);

        let response = router.oneshot(login("admin", "secret")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_login_then_stream() {
        let (router, state) = app(false);

        let response = router.clone().oneshot(login("admin", "secret")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
        let cookie = session_cookie(&response);
        assert!(cookie.starts_with(SESSION_COOKIE));

        let response = router
            .clone()
            .oneshot(get_with_cookie("/topics", &cookie))
            .await
            .unwrap();
        assert_eq!(body_text(response).await, r#"["camera1"]"#);

        let response = router
            .clone()
            .oneshot(get_with_cookie("/camera1", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );
        let queue = state.topics.get("camera1").unwrap();
        assert_eq!(queue.viewer_count(), 1);
        drop(response);
        assert_eq!(queue.viewer_count(), 0);

        // Logout invalidates the session
        let response = router
            .clone()
            .oneshot(get_with_cookie("/logout", &cookie))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], "/login");
        assert!(state.sessions.is_empty());
        let response = router
            .oneshot(get_with_cookie("/topics", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_dev_mode_skips_login() {
        let (router, _) = app(true);

        let response = router.clone().oneshot(get("/camera1")).await.unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );
        assert!(!response
            .headers()
            .contains_key(header::STRICT_TRANSPORT_SECURITY));

        let response = router.oneshot(get("/")).await.unwrap();
        let body = body_text(response).await;
        assert!(body.contains(r#"<img src="/camera1""#));
        assert!(!body.contains("/logout"));
    }
}
