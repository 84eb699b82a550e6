//! Error types for the RevSport upstream client.

use thiserror::Error;

/// Errors that can occur while talking to the RevSport upstream.
#[derive(Debug, Error, Clone)]
pub enum RevSportError {
    /// Network/HTTP request failed at the transport level
    #[error("Network error: {message}")]
    Network { message: String },

    /// No CSRF token could be extracted from the login page.
    ///
    /// Fatal: the login page structure has changed and no amount of
    /// retrying will produce a token.
    #[error("CSRF token not found on login page")]
    CsrfNotFound,

    /// The upstream rejected the submitted credentials
    #[error("Login rejected (status {status}): {message}")]
    LoginRejected { status: u16, message: String },

    /// The upstream returned a raw 403 on the credential POST
    #[error("Login blocked by upstream: {message}")]
    Blocked { message: String },

    /// The upstream returned 429 on the credential POST
    #[error("Rate limited by upstream")]
    RateLimited,

    /// The post-login verification page did not look logged-in
    #[error("Login verification failed: {reason}")]
    VerificationFailed { reason: String },

    /// Authenticated request kept coming back 401/403 after re-login
    #[error("Authentication retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// `get_*` was called before `login()` was ever invoked
    #[error("Client has never logged in; call login() first")]
    NotAuthenticated,

    /// The upstream returned a non-auth HTTP error (5xx, 404, ...)
    #[error("Upstream returned status {status} for {url}")]
    Upstream { status: u16, url: String },

    /// URL parsing/construction failed
    #[error("URL error: {message}")]
    UrlError { message: String },

    /// Circuit breaker is open due to repeated failed syncs
    #[error("Circuit breaker open - too many recent sync failures")]
    CircuitBreakerOpen,
}

impl RevSportError {
    /// Returns true if this error belongs to the authentication taxonomy,
    /// i.e. it is fatal to the current `login()`/read call site.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            RevSportError::CsrfNotFound
                | RevSportError::LoginRejected { .. }
                | RevSportError::Blocked { .. }
                | RevSportError::RateLimited
                | RevSportError::VerificationFailed { .. }
                | RevSportError::RetriesExhausted { .. }
                | RevSportError::NotAuthenticated
        )
    }

    /// Returns true if this error is potentially transient.
    ///
    /// Transient failures feed the circuit breaker; structural ones
    /// (e.g. a changed login page) do not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RevSportError::Network { .. }
                | RevSportError::RateLimited
                | RevSportError::RetriesExhausted { .. }
                | RevSportError::Upstream { .. }
        )
    }
}

impl From<reqwest::Error> for RevSportError {
    fn from(err: reqwest::Error) -> Self {
        RevSportError::Network {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for RevSportError {
    fn from(err: url::ParseError) -> Self {
        RevSportError::UrlError {
            message: err.to_string(),
        }
    }
}
