//! HTTP session client for the RevSport upstream.
//!
//! Owns exactly one authenticated cookie session and serves reads over
//! it, transparently re-authenticating on expiry. The login protocol is
//! three sequential steps:
//! 1. GET the login page and extract the CSRF token
//! 2. POST form-encoded credentials with browser-like headers
//! 3. After a short settle delay, GET a members-only page and verify
//!    that it looks logged in
//!
//! Each RevSport tenant must get its own client instance; cookie jars
//! are never shared across tenants.

use super::error::RevSportError;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use reqwest::header::{ORIGIN, REFERER, SET_COOKIE};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Paths on the upstream host.
const LOGIN_PATH: &str = "/login";
const MEMBERS_PATH: &str = "/members";

/// Maximum re-authentication retries after the first 401/403 on a read
/// (3 attempts overall). Hard invariant: many concurrent stale requests
/// must not each spin up independent re-login cycles against the
/// upstream.
const MAX_AUTH_RETRIES: u32 = 2;

// Static selectors for login markup - compiled once
static CSRF_INPUT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name='_token']").unwrap());
static CSRF_META_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[name='csrf-token']").unwrap());
static CSRF_META_ALT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[name='_csrf']").unwrap());
static LOGOUT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='logout'], form[action*='logout']").unwrap());
static PASSWORD_INPUT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[type='password']").unwrap());
static LOGIN_ERROR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".alert-danger, .alert, .error").unwrap());

/// Configuration for the RevSport client.
#[derive(Debug, Clone)]
pub struct RevSportConfig {
    /// Base URL of the tenant's RevSport site
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Enables response-body-preview logging
    pub debug: bool,
    /// User agent string
    pub user_agent: String,
    /// Settle delay between credential POST and verification GET
    pub verify_delay: Duration,
    /// Base unit for the exponential re-auth backoff (2^n * base)
    pub backoff_base: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for RevSportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://client.revolutionise.com.au".to_string(),
            username: String::new(),
            password: String::new(),
            debug: false,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            verify_delay: Duration::from_millis(750),
            backoff_base: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RevSportConfig {
    /// Creates a config with credentials and otherwise default settings.
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            ..Self::default()
        }
    }
}

type LoginFuture = Shared<BoxFuture<'static, Result<(), RevSportError>>>;

/// Client for one tenant's RevSport session.
///
/// Cheap to clone; clones share the same session state.
#[derive(Clone)]
pub struct RevSportClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// HTTP client with the session cookie store
    http: Client,
    config: RevSportConfig,
    base_url: Url,
    /// True only after a verified login; reset on 401/403
    authenticated: AtomicBool,
    /// Whether login() has ever been invoked on this instance
    login_invoked: AtomicBool,
    /// The single in-flight login attempt, shared by all concurrent
    /// callers and cleared on completion
    pending_login: Mutex<Option<LoginFuture>>,
}

impl RevSportClient {
    /// Creates a new client. The session starts unauthenticated.
    pub fn new(config: RevSportConfig) -> Result<Self, RevSportError> {
        let base_url = Url::parse(&config.base_url)?;

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RevSportError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                base_url,
                authenticated: AtomicBool::new(false),
                login_invoked: AtomicBool::new(false),
                pending_login: Mutex::new(None),
            }),
        })
    }

    /// Whether the session is currently believed to be authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::Acquire)
    }

    /// Logs in to the upstream, or joins the login already in flight.
    ///
    /// If already authenticated this returns immediately without any
    /// network call. Concurrent callers never trigger parallel login
    /// sequences: they all await the same stored attempt and observe
    /// the same outcome.
    pub async fn login(&self) -> Result<(), RevSportError> {
        self.inner.login_invoked.store(true, Ordering::Release);

        if self.inner.authenticated.load(Ordering::Acquire) {
            return Ok(());
        }

        let fut = {
            let mut pending = self
                .inner
                .pending_login
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            // Re-check under the lock: another caller may have finished
            // logging in between our check and acquiring the lock.
            if self.inner.authenticated.load(Ordering::Acquire) {
                return Ok(());
            }

            if let Some(fut) = pending.as_ref() {
                debug!("Joining login attempt already in flight");
                fut.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let fut: LoginFuture = async move {
                    let result = inner.run_login().await;
                    if result.is_ok() {
                        inner.authenticated.store(true, Ordering::Release);
                    }
                    inner
                        .pending_login
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take();
                    result
                }
                .boxed()
                .shared();
                *pending = Some(fut.clone());
                fut
            }
        };

        fut.await
    }

    /// Issues an authenticated GET and returns the response body text.
    pub async fn get_text(&self, path: &str) -> Result<String, RevSportError> {
        let response = self.request(path).await?;
        Ok(response.text().await?)
    }

    /// Issues an authenticated GET and deserializes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RevSportError> {
        let response = self.request(path).await?;
        Ok(response.json().await?)
    }

    /// The shared read path: GET with re-authentication on expiry.
    ///
    /// A 401/403 flips the session to unauthenticated, backs off
    /// exponentially, re-logs-in (through the shared login mutex) and
    /// re-issues the GET, up to `MAX_AUTH_RETRIES` retries. Any other
    /// HTTP error propagates unchanged - it is not an auth problem.
    async fn request(&self, path: &str) -> Result<reqwest::Response, RevSportError> {
        if !self.inner.login_invoked.load(Ordering::Acquire) {
            return Err(RevSportError::NotAuthenticated);
        }

        let url = self.inner.url(path)?;
        let mut retries: u32 = 0;

        loop {
            let response = self.inner.http.get(url.clone()).send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                self.inner.authenticated.store(false, Ordering::Release);

                if retries >= MAX_AUTH_RETRIES {
                    return Err(RevSportError::RetriesExhausted {
                        attempts: retries + 1,
                    });
                }

                let delay = self.backoff_delay(retries);
                warn!(
                    url = %url,
                    status = status.as_u16(),
                    retry = retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Session expired; backing off before re-login"
                );
                tokio::time::sleep(delay).await;
                self.login().await?;
                retries += 1;
                continue;
            }

            if status.as_u16() >= 400 {
                return Err(RevSportError::Upstream {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            return Ok(response);
        }
    }

    /// Exponential backoff for re-authentication: base * 2^retry_count.
    fn backoff_delay(&self, retry_count: u32) -> Duration {
        self.inner.config.backoff_base * 2u32.pow(retry_count.min(10))
    }
}

impl ClientInner {
    fn url(&self, path: &str) -> Result<Url, RevSportError> {
        Ok(self.base_url.join(path)?)
    }

    /// The three-step login protocol. Each step must succeed before the
    /// next begins; any failure leaves the session unauthenticated.
    async fn run_login(&self) -> Result<(), RevSportError> {
        // Step 1: fetch the login page and extract the CSRF token
        let login_url = self.url(LOGIN_PATH)?;
        info!(url = %login_url, "Fetching login page");

        let page = self.http.get(login_url.clone()).send().await?.text().await?;
        if self.config.debug {
            debug!(body_preview = preview(&page), "Login page body");
        }

        let csrf_token = extract_csrf_token(&page).ok_or(RevSportError::CsrfNotFound)?;
        debug!("Extracted CSRF token from login page");

        // Step 2: submit credentials with browser-like headers
        let form = [
            ("_token", csrf_token.as_str()),
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
            ("remember", "1"),
        ];
        let response = self
            .http
            .post(login_url.clone())
            .header(REFERER, login_url.as_str())
            .header(ORIGIN, self.base_url.origin().ascii_serialization())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let cookie_count = response.headers().get_all(SET_COOKIE).iter().count();
        info!(
            status = status.as_u16(),
            cookies_set = cookie_count,
            "Credential POST completed"
        );

        if status == StatusCode::FORBIDDEN {
            return Err(RevSportError::Blocked {
                message: "credential POST returned 403".to_string(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RevSportError::RateLimited);
        }
        if status.as_u16() >= 400 {
            if cookie_count == 0 {
                let body = response.text().await.unwrap_or_default();
                let message = extract_login_error(&body)
                    .unwrap_or_else(|| format!("status {}", status.as_u16()));
                return Err(RevSportError::LoginRejected {
                    status: status.as_u16(),
                    message,
                });
            }
            // The upstream is known to return error-like statuses on
            // logins that actually succeeded, as long as cookies were
            // set. Defer the decision to verification.
            warn!(
                status = status.as_u16(),
                "Error status on credential POST but session cookies were set; deferring to verification"
            );
        }

        // Step 3: verify after letting the session establish
        tokio::time::sleep(self.config.verify_delay).await;

        let verify_url = self.url(MEMBERS_PATH)?;
        let body = self.http.get(verify_url).send().await?.text().await?;
        if self.config.debug {
            debug!(body_preview = preview(&body), "Verification page body");
        }
        verify_logged_in(&body)?;

        info!("Login verified");
        Ok(())
    }
}

/// Extracts the CSRF token from login page markup.
///
/// Tries, in order: a hidden form field, the `csrf-token` meta tag,
/// then the `_csrf` meta tag. The login page changing shape enough to
/// break all three is fatal and not retryable.
fn extract_csrf_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    if let Some(input) = document.select(&CSRF_INPUT_SELECTOR).next() {
        if let Some(value) = input.value().attr("value") {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    for selector in [&*CSRF_META_SELECTOR, &*CSRF_META_ALT_SELECTOR] {
        if let Some(meta) = document.select(selector).next() {
            if let Some(content) = meta.value().attr("content") {
                if !content.is_empty() {
                    return Some(content.to_string());
                }
            }
        }
    }

    None
}

/// Scrapes a human-readable error message from a login failure body.
fn extract_login_error(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&LOGIN_ERROR_SELECTOR)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
}

/// Decides whether a members page looks logged in.
///
/// Both conditions are required: a logout control must be present AND
/// no login form/password field may be present. A logout control alone
/// is not sufficient.
fn verify_logged_in(html: &str) -> Result<(), RevSportError> {
    let document = Html::parse_document(html);
    let has_logout = document.select(&LOGOUT_SELECTOR).next().is_some();
    let has_login_form = document.select(&PASSWORD_INPUT_SELECTOR).next().is_some();

    if has_logout && !has_login_form {
        Ok(())
    } else {
        Err(RevSportError::VerificationFailed {
            reason: format!(
                "logout control present: {}, login form present: {}",
                has_logout, has_login_form
            ),
        })
    }
}

/// Truncates a body to a loggable preview without splitting a char.
fn preview(s: &str) -> &str {
    let mut end = s.len().min(500);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
