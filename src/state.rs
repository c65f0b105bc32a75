use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::annotate::Typeface;
use crate::auth::{Credentials, LoginAttemptLimiter, SessionStore};
use crate::config::AppConfig;
use crate::pipeline::TopicRegistry;

/// Application-wide state shared across handlers
pub struct AppState {
    /// Validated configuration, fixed for the process lifetime
    pub config: Arc<AppConfig>,
    /// Topic queues
    pub topics: TopicRegistry,
    /// Session store
    pub sessions: Arc<SessionStore>,
    /// Login account; `None` only in development mode
    pub credentials: Option<Credentials>,
    /// Login attempt limiter
    pub limiter: LoginAttemptLimiter,
    /// Font for placeholder frames
    pub typeface: Typeface,
    /// Cancelled on shutdown
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        topics: TopicRegistry,
        credentials: Option<Credentials>,
        typeface: Typeface,
    ) -> Arc<Self> {
        let sessions = Arc::new(SessionStore::new(i64::from(
            config.auth.session_timeout_secs,
        )));
        let limiter = LoginAttemptLimiter::new(config.limiter.clone());
        Arc::new(Self {
            config,
            topics,
            sessions,
            credentials,
            limiter,
            typeface,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn dev_mode(&self) -> bool {
        self.config.dev_mode
    }

    /// Sleep between chunks that carry no new frame
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.config.stream.idle_interval_ms)
    }
}
