//! Minimal HTTP client with safe logging, retries, and bearer/basic auth.
//!
//! - Request options: `Auth`, query params, timeout, retries
//! - Redacts sensitive query params and never logs secret values
//! - Retries network failures, 429 and 5xx with exponential backoff and `Retry-After`
//! - Raw responses ([`RawResponse`]) for callers that interpret status/body themselves
//! - Optional outbound proxy ([`HttpClient::with_proxy`])
//! - Optional *raw* request/response logging via `VIGIL_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```no_run
//! # async fn demo() -> Result<(), vigil_http::HttpError> {
//! let client = vigil_http::HttpClient::new("https://api.example.com")?;
//! let got: serde_json::Value = client
//!     .get_json("v1/items", vigil_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! Security: `Auth::Bearer` values are sanitized before use, and logs only
//! ever include the auth kind, not the secret.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, Proxy, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::borrow::Cow;
use std::env;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

const RAW_ENV: &str = "VIGIL_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;
const SNIPPET_MAX: usize = 500;

const SECRET_QUERY_KEYS: &[&str] = &[
    "access_token",
    "authorization",
    "auth",
    "key",
    "api_key",
    "token",
    "secret",
    "client_secret",
    "bearer",
];

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    /// True for a final 429 (after retries were spent).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, HttpError::Api { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS)
    }
}

// ==============================
// Auth & Request Options
// ==============================

/// Authentication strategies supported by the HTTP client helpers.
///
/// ```
/// use vigil_http::Auth;
///
/// let bearer = Auth::Bearer("token");
/// assert!(matches!(bearer, Auth::Bearer("token")));
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Authorization: Bearer <token>
    Bearer(&'a str),
    /// Authorization: Basic base64(user:password)
    Basic { user: &'a str, password: &'a str },
}

impl Auth<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Auth::Bearer(_) => "bearer",
            Auth::Basic { .. } => "basic",
        }
    }
}

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use vigil_http::RequestOpts;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     retries: Some(0),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(!opts.allow_absolute);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub auth: Option<Auth<'a>>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
    /// If true and `path` is an absolute URL, use it as-is (ignore base).
    pub allow_absolute: bool,
}

/// Request payload variants.
#[derive(Clone, Debug)]
pub enum Body<'a> {
    /// Pre-serialized JSON bytes, sent with `Content-Type: application/json`.
    Json(Vec<u8>),
    /// `application/x-www-form-urlencoded` pairs.
    Form(Vec<(&'a str, Cow<'a, str>)>),
}

/// A response whose status has not been interpreted yet.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// First few hundred bytes of the body, for logs and error messages.
    pub fn snippet(&self) -> String {
        snip_body(&self.body)
    }

    /// Decode the body as JSON regardless of the status code.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::Decode(e.to_string(), self.snippet()))
    }

    fn request_id(&self) -> String {
        self.headers
            .get("x-request-id")
            .or_else(|| self.headers.get("x-correlation-id"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    }

    /// Turn a non-2xx status into [`HttpError::Api`], then decode JSON.
    fn into_json<T: DeserializeOwned>(self, req_id: &str) -> Result<T, HttpError> {
        if !self.status.is_success() {
            let message = extract_error_message(&self.body);
            let request_id = self.request_id();
            tracing::warn!(
                req_id=%req_id,
                status=%self.status,
                message=%message,
                x_request_id=%request_id,
                "http.error"
            );
            return Err(HttpError::Api {
                status: self.status,
                message,
                request_id,
            });
        }
        serde_json::from_slice::<T>(&self.body).map_err(|e| {
            let snippet = self.snippet();
            tracing::warn!(
                req_id=%req_id,
                serde_line=%e.line(),
                serde_col=%e.column(),
                serde_err=%e.to_string(),
                body_snippet=%snippet,
                "http.response.decode_error"
            );
            HttpError::Decode(e.to_string(), snippet)
        })
    }
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use vigil_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Self::builder()
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
        })
    }

    fn builder() -> reqwest::ClientBuilder {
        Client::builder().connect_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// Route every request through `proxy_url`.
    ///
    /// On error the client is handed back untouched so callers can carry on unproxied.
    pub fn with_proxy(self, proxy_url: &str) -> Result<Self, (Self, HttpError)> {
        let proxy = match Proxy::all(proxy_url) {
            Ok(proxy) => proxy,
            Err(e) => return Err((self, HttpError::Build(format!("invalid proxy URL: {e}")))),
        };
        match Self::builder().proxy(proxy).build() {
            Ok(inner) => Ok(Self { inner, ..self }),
            Err(e) => Err((self, HttpError::Build(e.to_string()))),
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    // ==============================
    // Typed helpers
    // ==============================

    /// GET JSON with per-request options (query/auth/timeout/retries).
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let (req_id, resp) = self.execute(Method::GET, path, None, opts).await?;
        resp.into_json(&req_id)
    }

    /// GET a body as text; non-2xx statuses become [`HttpError::Api`].
    pub async fn get_text(&self, path: &str, opts: RequestOpts<'_>) -> Result<String, HttpError> {
        let (_, resp) = self.execute(Method::GET, path, None, opts).await?;
        if !resp.status.is_success() {
            return Err(HttpError::Api {
                status: resp.status,
                message: extract_error_message(&resp.body),
                request_id: resp.request_id(),
            });
        }
        Ok(resp.text().into_owned())
    }

    /// POST a url-encoded form and decode a JSON reply.
    pub async fn post_form_opts<'a, T>(
        &self,
        path: &str,
        form: Vec<(&'a str, Cow<'a, str>)>,
        opts: RequestOpts<'a>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let (req_id, resp) = self
            .execute(Method::POST, path, Some(Body::Form(form)), opts)
            .await?;
        resp.into_json(&req_id)
    }

    /// POST pre-serialized JSON and return the response without judging its status.
    pub async fn post_raw(
        &self,
        path: &str,
        json_body: Vec<u8>,
        opts: RequestOpts<'_>,
    ) -> Result<RawResponse, HttpError> {
        let (_, resp) = self
            .execute(Method::POST, path, Some(Body::Json(json_body)), opts)
            .await?;
        Ok(resp)
    }

    // ==============================
    // Core request implementation
    // ==============================

    fn resolve(&self, path: &str, allow_absolute: bool) -> Result<Url, HttpError> {
        if allow_absolute {
            if let Ok(abs) = Url::parse(path) {
                return Ok(abs);
            }
        }
        self.base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))
    }

    /// Send with retries. Only transport failures are errors here; any status comes back.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Body<'_>>,
        opts: RequestOpts<'_>,
    ) -> Result<(String, RawResponse), HttpError> {
        let url = self.resolve(path, opts.allow_absolute)?;
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let auth_kind = opts.auth.as_ref().map(Auth::kind).unwrap_or("none");

        let query: Vec<(&str, Cow<'_, str>)> = opts.query.clone().unwrap_or_default();
        let bearer = match &opts.auth {
            Some(Auth::Bearer(tok)) => Some(sanitize_api_key(tok)?),
            _ => None,
        };

        let req_id = format!(
            "r{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );

        let mut attempt = 0usize;
        loop {
            let mut rb = self
                .inner
                .request(method.clone(), url.clone())
                .timeout(timeout);

            if !query.is_empty() {
                let pairs: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_ref())).collect();
                rb = rb.query(&pairs);
            }

            match &body {
                Some(Body::Json(bytes)) => {
                    rb = rb
                        .header(CONTENT_TYPE, "application/json")
                        .body(bytes.clone());
                }
                Some(Body::Form(pairs)) => {
                    let pairs: Vec<(&str, &str)> =
                        pairs.iter().map(|(k, v)| (*k, v.as_ref())).collect();
                    rb = rb.form(&pairs);
                }
                None => {}
            }

            match &opts.auth {
                Some(Auth::Bearer(_)) => {
                    if let Some(tok) = &bearer {
                        rb = rb.bearer_auth(tok);
                    }
                }
                Some(Auth::Basic { user, password }) => {
                    rb = rb.basic_auth(user, Some(password));
                }
                None => {}
            }

            tracing::debug!(
                req_id=%req_id,
                attempt=attempt + 1,
                max_retries,
                method=%method,
                host_path=%format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                query=?redact_query(&query),
                timeout_ms=timeout.as_millis() as u64,
                auth_kind,
                has_body=%body.is_some(),
                "http.request.start"
            );

            if raw_enabled() {
                let preview = match &body {
                    Some(Body::Json(bytes)) => {
                        let mut s = String::from_utf8_lossy(bytes).to_string();
                        if s.len() > RAW_MAX_BODY {
                            s = s.chars().take(RAW_MAX_BODY).collect();
                        }
                        s
                    }
                    Some(Body::Form(pairs)) => format!("{} form fields", pairs.len()),
                    None => String::new(),
                };
                tracing::debug!(target: "http.raw", %req_id, %method, url=%url.path(), body=%preview, "request");
            }

            let t0 = std::time::Instant::now();
            let sent = rb.send().await;
            let resp = match sent {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            message=%err,
                            "http.retrying.network_send"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(req_id=%req_id, attempt, message=%err, "http.network_error.send");
                    return Err(HttpError::Network(err.to_string()));
                }
            };

            let status = resp.status();
            let headers = resp.headers().clone();
            let bytes = match resp.bytes().await {
                Ok(bytes) => bytes.to_vec(),
                Err(err) => {
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            message=%err,
                            "http.retrying.network_body"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(req_id=%req_id, attempt, message=%err, "http.network_error.body");
                    return Err(HttpError::Network(err.to_string()));
                }
            };

            let raw = RawResponse {
                status,
                headers,
                body: bytes,
            };

            tracing::debug!(
                req_id=%req_id,
                %status,
                duration_ms=t0.elapsed().as_millis() as u64,
                body_len=raw.body.len(),
                x_request_id=%raw.request_id(),
                rate_limit.remaining=?raw.headers.get("x-rate-limit-remaining").and_then(|v| v.to_str().ok()),
                rate_limit.reset=?raw.headers.get("x-rate-limit-reset").and_then(|v| v.to_str().ok()),
                "http.response.headers"
            );
            if raw_enabled() {
                tracing::info!(
                    target: "http.raw",
                    %req_id,
                    %status,
                    headers=?redact_headers(&raw.headers),
                    body=%String::from_utf8_lossy(&raw.body[..raw.body.len().min(RAW_MAX_BODY)]),
                    "response"
                );
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < max_retries {
                attempt += 1;
                let delay = match retry_after_delay_secs(&raw.headers) {
                    Some(secs) => Duration::from_secs(secs),
                    None if status == StatusCode::TOO_MANY_REQUESTS => {
                        backoff(attempt).max(Duration::from_millis(1100))
                    }
                    None => backoff(attempt),
                };
                tracing::warn!(
                    req_id=%req_id,
                    %status,
                    attempt,
                    max_retries,
                    backoff_ms=delay.as_millis() as u64,
                    body_snippet=%raw.snippet(),
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            return Ok((req_id, raw));
        }
    }
}

// ==============================
// Helpers
// ==============================

fn backoff(attempt: usize) -> Duration {
    Duration::from_millis(200u64.saturating_mul(1 << (attempt.saturating_sub(1)).min(16)))
}

fn extract_error_message(body: &[u8]) -> String {
    // Twitter: {"errors":[{"message":"...", "detail":"...", "title":"..."}]}
    #[derive(Deserialize)]
    struct TwErrors {
        errors: Vec<TwErr>,
    }
    #[derive(Deserialize)]
    struct TwErr {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        title: String,
    }

    // Generic: {"message":"..."} or {"detail":"..."} or {"error":"..."}
    #[derive(Deserialize)]
    struct Msg {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        error: String,
    }

    if let Ok(tw) = serde_json::from_slice::<TwErrors>(body) {
        if let Some(first) = tw.errors.into_iter().next() {
            for candidate in [first.detail, first.message, first.title] {
                if !candidate.is_empty() {
                    return candidate;
                }
            }
        }
    }
    if let Ok(m) = serde_json::from_slice::<Msg>(body) {
        for candidate in [m.message, m.detail, m.error] {
            if !candidate.is_empty() {
                return candidate;
            }
        }
    }
    snip_body(body)
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .parse()
        .ok()
}

fn snip_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > SNIPPET_MAX {
        let mut snip: String = text.chars().take(SNIPPET_MAX).collect();
        snip.push_str("...");
        snip
    } else {
        text.into_owned()
    }
}

fn redact_query(q: &[(&str, Cow<'_, str>)]) -> Vec<(String, String)> {
    q.iter()
        .map(|(k, v)| {
            let secret = SECRET_QUERY_KEYS.contains(&k.to_ascii_lowercase().as_str());
            (
                (*k).to_string(),
                if secret {
                    "<redacted>".to_string()
                } else {
                    v.to_string()
                },
            )
        })
        .collect()
}

fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let val = if key.eq_ignore_ascii_case("authorization")
                || key.eq_ignore_ascii_case("set-cookie")
            {
                "<redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();
    s.retain(|ch| !ch.is_ascii_whitespace());

    if !s.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }

    HeaderValue::from_str(&format!("Bearer {}", s))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(s)
}
