//! Official tier: thin wrapper around the X v2 API plus the per-account walk over it.
//!
//! Each account costs two calls (handle → id lookup, then a small timeline page
//! with `created_at,text`). A failure for one account is logged and skipped.
use crate::x::tier::{AccountFailure, FailureKind, FetchStrategy, FetchTier, Paced, Pacing, TierReport};
use crate::x::types::{TimelineResponse, TokenResponse, UserLookupResponse};
use crate::x::window::{parse_post_timestamp, TimeWindow};
use async_trait::async_trait;
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use vigil_common::{AccountTarget, IntelligenceItem};
use vigil_http::{Auth, HttpClient, HttpError, RequestOpts};

pub const TWITTER_API_BASE: &str = "https://api.twitter.com";
const TIMELINE_MAX_RESULTS: u32 = 10;

/// Credentials for the v2 API.
#[derive(Clone)]
pub enum ApiCredentials {
    Bearer(String),
    /// Consumer key/secret, exchanged for an app-only bearer token once per run.
    ConsumerPair { key: String, secret: String },
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiCredentials::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            ApiCredentials::ConsumerPair { .. } => f.write_str("ConsumerPair(<redacted>)"),
        }
    }
}

impl ApiCredentials {
    /// Prefer a bearer token; fall back to a complete key/secret pair.
    pub fn from_parts(bearer: Option<&str>, key: Option<&str>, secret: Option<&str>) -> Option<Self> {
        let clean = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        if let Some(b) = clean(bearer) {
            return Some(ApiCredentials::Bearer(b));
        }
        match (clean(key), clean(secret)) {
            (Some(key), Some(secret)) => Some(ApiCredentials::ConsumerPair { key, secret }),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct TwitterApi {
    http: HttpClient,
}

impl TwitterApi {
    pub fn new() -> Result<Self, HttpError> {
        Self::with_base(TWITTER_API_BASE)
    }

    pub fn with_base(base: &str) -> Result<Self, HttpError> {
        let http = HttpClient::new(base)?.with_timeout(Duration::from_secs(20));
        Ok(Self { http })
    }

    /// Exchange a consumer key/secret for an app-only bearer token.
    pub async fn app_only_token(&self, key: &str, secret: &str) -> Result<String, HttpError> {
        let resp: TokenResponse = self
            .http
            .post_form_opts(
                "oauth2/token",
                vec![("grant_type", Cow::Borrowed("client_credentials"))],
                RequestOpts {
                    auth: Some(Auth::Basic {
                        user: key,
                        password: secret,
                    }),
                    retries: Some(0),
                    ..Default::default()
                },
            )
            .await?;
        if !resp.token_type.eq_ignore_ascii_case("bearer") {
            return Err(HttpError::Decode(
                format!("unexpected token_type `{}`", resp.token_type),
                String::new(),
            ));
        }
        Ok(resp.access_token)
    }

    pub async fn lookup_user(&self, bearer: &str, username: &str) -> Result<UserLookupResponse, HttpError> {
        self.http
            .get_json(
                &format!("2/users/by/username/{username}"),
                RequestOpts {
                    auth: Some(Auth::Bearer(bearer)),
                    retries: Some(0),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn user_timeline(
        &self,
        bearer: &str,
        user_id: &str,
        max_results: u32,
    ) -> Result<TimelineResponse, HttpError> {
        let max_results = max_results.clamp(5, 100);
        let resp: TimelineResponse = self
            .http
            .get_json(
                &format!("2/users/{user_id}/tweets"),
                RequestOpts {
                    auth: Some(Auth::Bearer(bearer)),
                    query: Some(vec![
                        ("tweet.fields", "created_at,text".into()),
                        ("max_results", max_results.to_string().into()),
                    ]),
                    retries: Some(0),
                    ..Default::default()
                },
            )
            .await?;
        tracing::debug!(user_id, result_count=?resp.meta.as_ref().and_then(|m| m.result_count), "x.official.timeline");
        Ok(resp)
    }
}

/// Canonical status URL for a handle/id pair.
pub fn status_url(handle: &str, id: &str) -> String {
    format!("https://twitter.com/{handle}/status/{id}")
}

pub struct OfficialTier {
    api: TwitterApi,
    credentials: Option<ApiCredentials>,
    pacing: Pacing,
    max_results: u32,
}

impl OfficialTier {
    pub fn new(api: TwitterApi, credentials: Option<ApiCredentials>) -> Self {
        Self {
            api,
            credentials,
            pacing: Pacing::steady(Duration::from_secs(2)),
            max_results: TIMELINE_MAX_RESULTS,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_max_results(mut self, n: u32) -> Self {
        self.max_results = n;
        self
    }

    async fn bearer(&self) -> Result<String, String> {
        match &self.credentials {
            Some(ApiCredentials::Bearer(token)) => Ok(token.clone()),
            Some(ApiCredentials::ConsumerPair { key, secret }) => self
                .api
                .app_only_token(key, secret)
                .await
                .map_err(|e| format!("app-only token exchange failed: {e}")),
            None => Err("no API credentials configured".to_string()),
        }
    }

    async fn fetch_account(
        &self,
        bearer: &str,
        account: &AccountTarget,
        window: &TimeWindow,
    ) -> Result<Vec<IntelligenceItem>, (AccountFailure, Paced)> {
        let failed = |kind: FailureKind, err: &HttpError| {
            let (kind, paced) = if err.is_rate_limited() {
                (FailureKind::RateLimited, Paced::RateLimited)
            } else {
                (kind, Paced::Failure)
            };
            (AccountFailure::new(account, kind, err.to_string()), paced)
        };

        let lookup = self
            .api
            .lookup_user(bearer, account.handle())
            .await
            .map_err(|e| failed(FailureKind::Lookup, &e))?;
        let Some(user) = lookup.data else {
            let detail = lookup
                .errors
                .as_deref()
                .and_then(|errs| errs.first())
                .map(|p| p.describe())
                .unwrap_or_else(|| "user not found".to_string());
            return Err((
                AccountFailure::new(account, FailureKind::Lookup, detail),
                Paced::Failure,
            ));
        };

        let timeline = self
            .api
            .user_timeline(bearer, &user.id, self.max_results)
            .await
            .map_err(|e| failed(FailureKind::Timeline, &e))?;

        let tweets = match timeline.data {
            Some(tweets) if !tweets.is_empty() => tweets,
            _ => {
                if let Some(problem) = timeline.errors.as_deref().and_then(|errs| errs.first()) {
                    return Err((
                        AccountFailure::new(account, FailureKind::Timeline, problem.describe()),
                        Paced::Failure,
                    ));
                }
                tracing::info!(account=%account, "x.official.no_recent_posts");
                return Ok(Vec::new());
            }
        };

        let mut items = Vec::new();
        for tweet in tweets {
            let Some(at) = tweet.created_at.as_deref().and_then(parse_post_timestamp) else {
                continue;
            };
            if !window.admits(at) {
                continue;
            }
            if let Some(item) = IntelligenceItem::new(
                status_url(account.handle(), &tweet.id),
                format!("@{}: {}", account.handle(), tweet.text),
            ) {
                items.push(item);
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl FetchStrategy for OfficialTier {
    fn tier(&self) -> FetchTier {
        FetchTier::OfficialApi
    }

    fn is_available(&self) -> bool {
        self.credentials.is_some()
    }

    async fn fetch(&self, accounts: &[AccountTarget], window: &TimeWindow) -> TierReport {
        let bearer = match self.bearer().await {
            Ok(b) => b,
            Err(reason) => {
                tracing::warn!(%reason, "x.official.aborted");
                return TierReport::aborted(reason);
            }
        };

        let mut report = TierReport::default();
        tracing::info!(accounts = accounts.len(), "x.official.start");

        for account in accounts {
            let paced = match self.fetch_account(&bearer, account, window).await {
                Ok(items) => {
                    tracing::info!(account=%account, items = items.len(), "x.official.account_done");
                    report.items.extend(items);
                    Paced::Success
                }
                Err((failure, paced)) => {
                    tracing::warn!(
                        account=%account,
                        kind=?failure.kind,
                        detail=%failure.detail,
                        "x.official.account_failed"
                    );
                    report.failures.push(failure);
                    paced
                }
            };
            self.pacing.pause(paced).await;
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_wins_over_pair() {
        let c = ApiCredentials::from_parts(Some("tok"), Some("k"), Some("s")).unwrap();
        assert!(matches!(c, ApiCredentials::Bearer(t) if t == "tok"));
    }

    #[test]
    fn incomplete_pair_means_no_credentials() {
        assert!(ApiCredentials::from_parts(Some("  "), Some("k"), None).is_none());
        let c = ApiCredentials::from_parts(None, Some("k"), Some("s")).unwrap();
        assert!(matches!(c, ApiCredentials::ConsumerPair { .. }));
    }

    #[test]
    fn debug_never_prints_secrets() {
        let c = ApiCredentials::Bearer("super-secret".into());
        assert!(!format!("{c:?}").contains("super-secret"));
    }

    #[test]
    fn status_url_shape() {
        assert_eq!(status_url("jack", "20"), "https://twitter.com/jack/status/20");
    }
}
