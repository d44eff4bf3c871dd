//! Embedded tier: a credential-free scraper built into the binary.
//!
//! The public profile timeline page embeds its data as a `__NEXT_DATA__` JSON
//! document, newest post first. Posts are consumed as a stream so an account
//! can be abandoned at the first post older than the window.
use crate::x::official::status_url;
use crate::x::tier::{AccountFailure, FailureKind, FetchStrategy, FetchTier, Paced, Pacing, TierReport};
use crate::x::window::{parse_post_timestamp, TimeWindow};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use time::OffsetDateTime;
use vigil_common::{AccountTarget, IntelligenceItem};
use vigil_http::{HttpClient, HttpError, RequestOpts};

pub const SYNDICATION_BASE: &str = "https://syndication.twitter.com";
const STREAM_LIMIT: usize = 20;
const PER_ACCOUNT_CAP: usize = 5;

static NEXT_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*id="__NEXT_DATA__"[^>]*>(.*?)</script>"#).expect("valid regex")
});

/// A post as scraped, with its timestamp already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedPost {
    pub id: String,
    pub text: String,
    pub username: String,
    pub permanent_url: String,
    pub created_at: OffsetDateTime,
}

/// Yields an account's recent posts, newest first, at most `limit` of them.
pub trait TimelineSource: Send + Sync {
    fn recent_posts<'a>(
        &'a self,
        account: &'a AccountTarget,
        limit: usize,
    ) -> BoxStream<'a, Result<ScrapedPost>>;
}

#[derive(Debug, Deserialize)]
struct NextData {
    props: Props,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Props {
    page_props: PageProps,
}

#[derive(Debug, Deserialize)]
struct PageProps {
    #[serde(default)]
    timeline: Option<Timeline>,
}

#[derive(Debug, Deserialize)]
struct Timeline {
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<EntryContent>,
}

#[derive(Debug, Deserialize)]
struct EntryContent {
    #[serde(default)]
    tweet: Option<SyndicatedTweet>,
}

#[derive(Debug, Deserialize)]
struct SyndicatedTweet {
    id_str: String,
    #[serde(default)]
    full_text: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    user: Option<SyndicatedUser>,
}

#[derive(Debug, Deserialize)]
struct SyndicatedUser {
    screen_name: String,
}

/// Pull the posts out of a profile timeline page, in page order.
///
/// Entries whose timestamp cannot be parsed are dropped.
pub fn extract_timeline(html: &str, fallback_handle: &str) -> Result<Vec<ScrapedPost>> {
    let raw = NEXT_DATA
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| anyhow!("page has no __NEXT_DATA__ document"))?;
    let doc: NextData = serde_json::from_str(raw).context("unexpected __NEXT_DATA__ shape")?;

    let entries = doc
        .props
        .page_props
        .timeline
        .map(|t| t.entries)
        .unwrap_or_default();

    let mut posts = Vec::with_capacity(entries.len());
    for entry in entries {
        if !entry.kind.is_empty() && entry.kind != "tweet" {
            continue;
        }
        let Some(tweet) = entry.content.and_then(|c| c.tweet) else {
            continue;
        };
        let Some(created_at) = parse_post_timestamp(&tweet.created_at) else {
            tracing::debug!(id=%tweet.id_str, created_at=%tweet.created_at, "x.embedded.bad_timestamp");
            continue;
        };
        let username = tweet
            .user
            .map(|u| u.screen_name)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| fallback_handle.to_string());
        posts.push(ScrapedPost {
            permanent_url: status_url(&username, &tweet.id_str),
            text: tweet.full_text.or(tweet.text).unwrap_or_default(),
            id: tweet.id_str,
            username,
            created_at,
        });
    }
    Ok(posts)
}

/// Scrapes the public syndication timeline.
#[derive(Clone)]
pub struct SyndicationScraper {
    http: HttpClient,
}

impl SyndicationScraper {
    /// Build against the public endpoint, optionally through `proxy`.
    pub fn new(proxy: Option<&str>) -> Result<Self, HttpError> {
        Self::with_base(SYNDICATION_BASE, proxy)
    }

    /// A proxy that cannot be configured is logged and ignored.
    pub fn with_base(base: &str, proxy: Option<&str>) -> Result<Self, HttpError> {
        let mut http = HttpClient::new(base)?
            .with_timeout(Duration::from_secs(20))
            .with_retries(1);
        if let Some(proxy_url) = proxy {
            http = match http.with_proxy(proxy_url) {
                Ok(proxied) => {
                    tracing::info!("x.embedded.proxy_enabled");
                    proxied
                }
                Err((plain, e)) => {
                    tracing::warn!(error=%e, "x.embedded.proxy_failed");
                    plain
                }
            };
        }
        Ok(Self { http })
    }

    async fn fetch_page(&self, account: &AccountTarget) -> Result<Vec<ScrapedPost>> {
        let html = self
            .http
            .get_text(
                &format!("srv/timeline-profile/screen-name/{}", account.handle()),
                RequestOpts::default(),
            )
            .await?;
        extract_timeline(&html, account.handle())
    }
}

impl TimelineSource for SyndicationScraper {
    fn recent_posts<'a>(
        &'a self,
        account: &'a AccountTarget,
        limit: usize,
    ) -> BoxStream<'a, Result<ScrapedPost>> {
        Box::pin(async_stream::stream! {
            match self.fetch_page(account).await {
                Ok(posts) => {
                    for post in posts.into_iter().take(limit) {
                        yield Ok(post);
                    }
                }
                Err(e) => yield Err(e),
            }
        })
    }
}

pub struct EmbeddedTier<S> {
    source: S,
    pacing: Pacing,
    stream_limit: usize,
    per_account_cap: usize,
}

impl<S: TimelineSource> EmbeddedTier<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            pacing: Pacing::steady(Duration::from_secs(2)),
            stream_limit: STREAM_LIMIT,
            per_account_cap: PER_ACCOUNT_CAP,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_per_account_cap(mut self, cap: usize) -> Self {
        self.per_account_cap = cap.max(1);
        self
    }

    /// Consume one account's stream until it leaves the window or hits the cap.
    async fn fetch_account(
        &self,
        account: &AccountTarget,
        window: &TimeWindow,
        items: &mut Vec<IntelligenceItem>,
    ) -> Option<AccountFailure> {
        let mut stream = self.source.recent_posts(account, self.stream_limit);
        let mut taken = 0usize;
        while let Some(next) = stream.next().await {
            let post = match next {
                Ok(post) => post,
                Err(e) => {
                    return Some(AccountFailure::new(account, FailureKind::Stream, format!("{e:#}")));
                }
            };
            // Feed is newest-first: the first stale post ends the account.
            if !window.admits(post.created_at) {
                break;
            }
            if let Some(item) = IntelligenceItem::new(
                post.permanent_url,
                format!("@{}: {}", account.handle(), post.text),
            ) {
                items.push(item);
                taken += 1;
            }
            if taken >= self.per_account_cap {
                break;
            }
        }
        None
    }
}

#[async_trait]
impl<S: TimelineSource> FetchStrategy for EmbeddedTier<S> {
    fn tier(&self) -> FetchTier {
        FetchTier::EmbeddedScraper
    }

    async fn fetch(&self, accounts: &[AccountTarget], window: &TimeWindow) -> TierReport {
        let mut report = TierReport::default();
        tracing::info!(accounts = accounts.len(), "x.embedded.start");

        for account in accounts {
            let before = report.items.len();
            let paced = match self.fetch_account(account, window, &mut report.items).await {
                None => {
                    tracing::info!(account=%account, items = report.items.len() - before, "x.embedded.account_done");
                    Paced::Success
                }
                Some(failure) => {
                    tracing::warn!(account=%account, detail=%failure.detail, "x.embedded.account_failed");
                    report.failures.push(failure);
                    Paced::Failure
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
    use std::sync::{Arc, Mutex};
    use time::macros::datetime;
    use vigil_common::FixedClock;

    const NOW: OffsetDateTime = datetime!(2025-06-10 12:00 UTC);

    /// Serves canned posts and records how many the tier actually pulled.
    struct CannedSource {
        posts: Vec<Result<ScrapedPost, String>>,
        pulled: Arc<Mutex<usize>>,
    }

    impl TimelineSource for CannedSource {
        fn recent_posts<'a>(
            &'a self,
            _account: &'a AccountTarget,
            limit: usize,
        ) -> BoxStream<'a, Result<ScrapedPost>> {
            let pulled = self.pulled.clone();
            Box::pin(async_stream::stream! {
                for p in self.posts.iter().take(limit) {
                    *pulled.lock().unwrap() += 1;
                    yield p.clone().map_err(|e| anyhow!(e));
                }
            })
        }
    }

    fn post(id: u32, hours_ago: i64) -> Result<ScrapedPost, String> {
        Ok(ScrapedPost {
            id: id.to_string(),
            text: format!("post {id}"),
            username: "alice".into(),
            permanent_url: status_url("alice", &id.to_string()),
            created_at: NOW - time::Duration::hours(hours_ago),
        })
    }

    fn window() -> TimeWindow {
        TimeWindow::last_24_hours(Arc::new(FixedClock::new(NOW)))
    }

    #[tokio::test]
    async fn stops_at_first_stale_post() {
        let pulled = Arc::new(Mutex::new(0));
        let source = CannedSource {
            posts: vec![post(1, 1), post(2, 3), post(3, 30), post(4, 2)],
            pulled: pulled.clone(),
        };
        let tier = EmbeddedTier::new(source).with_pacing(Pacing::none());
        let report = tier.fetch(&[AccountTarget::new("alice")], &window()).await;

        let links: Vec<&str> = report.items.iter().map(|i| i.link()).collect();
        assert_eq!(
            links,
            vec![
                "https://twitter.com/alice/status/1",
                "https://twitter.com/alice/status/2"
            ]
        );
        assert_eq!(*pulled.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn caps_each_account() {
        let pulled = Arc::new(Mutex::new(0));
        let source = CannedSource {
            posts: (1..=8).map(|i| post(i, 1)).collect(),
            pulled: pulled.clone(),
        };
        let tier = EmbeddedTier::new(source).with_pacing(Pacing::none());
        let accounts = [AccountTarget::new("alice"), AccountTarget::new("bob")];
        let report = tier.fetch(&accounts, &window()).await;

        assert_eq!(report.items.len(), 2 * PER_ACCOUNT_CAP);
        assert_eq!(report.items[PER_ACCOUNT_CAP].summary(), "@bob: post 1");
        assert_eq!(*pulled.lock().unwrap(), 2 * PER_ACCOUNT_CAP);
    }

    #[tokio::test]
    async fn stream_error_ends_only_that_account() {
        let source = CannedSource {
            posts: vec![post(1, 1), Err("connection reset".into()), post(2, 1)],
            pulled: Arc::new(Mutex::new(0)),
        };
        let tier = EmbeddedTier::new(source).with_pacing(Pacing::none());
        let accounts = [AccountTarget::new("alice"), AccountTarget::new("bob")];
        let report = tier.fetch(&accounts, &window()).await;

        assert_eq!(report.items.len(), 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].kind, FailureKind::Stream);
    }

    #[test]
    fn next_data_pattern_captures_the_script_body() {
        let html = "<script src=\"a.js\"></script>\n<script type=\"application/json\" id=\"__NEXT_DATA__\">\n{\"a\":1}\n</script>";
        let caps = NEXT_DATA.captures(html).unwrap();
        assert_eq!(caps[1].trim(), r#"{"a":1}"#);
        assert!(NEXT_DATA.captures("<script id=\"__OTHER__\">{}</script>").is_none());
    }

    #[test]
    fn extracts_posts_from_next_data() {
        let html = r#"<html><body><script id="__NEXT_DATA__" type="application/json">
        {"props":{"pageProps":{"timeline":{"entries":[
          {"type":"tweet","content":{"tweet":{"id_str":"11","full_text":"hello","created_at":"Tue Jun 10 11:00:00 +0000 2025","user":{"screen_name":"alice"}}}},
          {"type":"tweet","content":{"tweet":{"id_str":"12","text":"no date","created_at":"garbage"}}},
          {"type":"tweet","content":{"tweet":{"id_str":"13","text":"short","created_at":"2025-06-09T11:00:00Z"}}}
        ]}}}}
        </script></body></html>"#;

        let posts = extract_timeline(html, "alice").unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].text, "hello");
        assert_eq!(posts[0].created_at, datetime!(2025-06-10 11:00 UTC));
        assert_eq!(posts[1].permanent_url, "https://twitter.com/alice/status/13");
    }

    #[test]
    fn page_without_next_data_is_an_error() {
        assert!(extract_timeline("<html>rate limited</html>", "alice").is_err());
    }
}
