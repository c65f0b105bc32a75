mod credentials;
pub mod limiter;
pub mod middleware;
mod session;

use thiserror::Error;

pub use credentials::{hash_password, verify_password, Credentials};
pub use limiter::{Admission, LoginAttemptLimiter};
pub use middleware::{auth_middleware, extract_session_id, AuthStatus, SESSION_COOKIE};
pub use session::{Session, SessionStore};

/// Login failure, shown on the login page
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid Login")]
    InvalidLogin,

    #[error("Retry after a while")]
    RetryLater,

    #[error("password hashing failed: {0}")]
    Hash(String),
}
