//! Delegated tier: an external, session-authenticated crawler run once per account.
//!
//! The crawler prints a JSON array of posts, possibly preceded by diagnostic
//! lines, to stdout/stderr. Anything it fails to deliver for one account is
//! logged and skipped; the next account still runs after a cool-down.
use crate::x::tier::{AccountFailure, FailureKind, FetchStrategy, FetchTier, Paced, Pacing, TierReport};
use crate::x::window::{parse_post_timestamp, TimeWindow};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use vigil_common::{AccountTarget, IntelligenceItem};

/// What the external crawler left behind for one account.
#[derive(Debug, Clone)]
pub struct DelegatedOutput {
    pub success: bool,
    /// stdout followed by stderr.
    pub combined: String,
}

/// Runs the external crawler for one account. Faked in tests.
#[async_trait]
pub trait DelegatedFetcher: Send + Sync {
    async fn run(&self, account: &AccountTarget) -> Result<DelegatedOutput>;
}

/// Spawns `<program> <args..> <handle>` and captures its output.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandFetcher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DelegatedFetcher for CommandFetcher {
    async fn run(&self, account: &AccountTarget) -> Result<DelegatedOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(account.handle())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow!("crawler timed out after {:?}", self.timeout))?
            .with_context(|| format!("failed to spawn `{}`", self.program))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(DelegatedOutput {
            success: output.status.success(),
            combined,
        })
    }
}

/// One record of the crawler's JSON array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedPost {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub permanent_url: String,
    #[serde(default)]
    pub username: String,
}

/// Pull the JSON array out of the crawler's output, skipping anything before the first `[`.
pub fn parse_delegated_output(combined: &str) -> Result<Vec<DelegatedPost>> {
    let start = combined
        .find('[')
        .ok_or_else(|| anyhow!("no JSON array in crawler output"))?;
    let mut stream =
        serde_json::Deserializer::from_str(&combined[start..]).into_iter::<Vec<DelegatedPost>>();
    match stream.next() {
        Some(Ok(posts)) => Ok(posts),
        Some(Err(e)) => Err(anyhow!("crawler output is not a post array: {e}")),
        None => Err(anyhow!("crawler output ended before the JSON array")),
    }
}

/// HTTP 429 or an explicit "too many requests" in the crawler's output.
pub fn is_rate_limited(output: &str) -> bool {
    output.contains("429") || output.to_ascii_lowercase().contains("too many requests")
}

fn snip(s: &str) -> String {
    const MAX: usize = 300;
    if s.chars().count() > MAX {
        let mut out: String = s.chars().take(MAX).collect();
        out.push_str("...");
        out
    } else {
        s.to_string()
    }
}

pub struct DelegatedTier<F> {
    fetcher: F,
    pacing: Pacing,
}

impl<F: DelegatedFetcher> DelegatedTier<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            pacing: Pacing::delegated(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Fetch one account; `Err` carries the failure plus the cool-down it earns.
    async fn fetch_account(
        &self,
        account: &AccountTarget,
        window: &TimeWindow,
    ) -> std::result::Result<Vec<IntelligenceItem>, (AccountFailure, Paced)> {
        let output = self.fetcher.run(account).await.map_err(|e| {
            (
                AccountFailure::new(account, FailureKind::Process, format!("{e:#}")),
                Paced::Failure,
            )
        })?;

        let classify = |kind: FailureKind, detail: String| {
            if is_rate_limited(&output.combined) {
                (
                    AccountFailure::new(account, FailureKind::RateLimited, detail),
                    Paced::RateLimited,
                )
            } else {
                (AccountFailure::new(account, kind, detail), Paced::Failure)
            }
        };

        if !output.success {
            return Err(classify(
                FailureKind::Process,
                format!("crawler exited unsuccessfully: {}", snip(&output.combined)),
            ));
        }

        let posts = parse_delegated_output(&output.combined)
            .map_err(|e| classify(FailureKind::MalformedOutput, format!("{e}: {}", snip(&output.combined))))?;

        let mut items = Vec::new();
        for post in posts {
            let Some(at) = parse_post_timestamp(&post.created_at) else {
                tracing::warn!(account=%account, id=%post.id, created_at=%post.created_at, "x.delegated.bad_timestamp");
                continue;
            };
            if !window.admits(at) {
                continue;
            }
            let author = if post.username.trim().is_empty() {
                account.handle()
            } else {
                post.username.trim()
            };
            if let Some(item) =
                IntelligenceItem::new(post.permanent_url.trim(), format!("@{}: {}", author, post.text))
            {
                items.push(item);
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl<F: DelegatedFetcher> FetchStrategy for DelegatedTier<F> {
    fn tier(&self) -> FetchTier {
        FetchTier::DelegatedScraper
    }

    async fn fetch(&self, accounts: &[AccountTarget], window: &TimeWindow) -> TierReport {
        let mut report = TierReport::default();
        tracing::info!(accounts = accounts.len(), "x.delegated.start");

        for account in accounts {
            tracing::info!(account=%account, "x.delegated.account");
            let paced = match self.fetch_account(account, window).await {
                Ok(items) => {
                    tracing::info!(account=%account, items = items.len(), "x.delegated.account_done");
                    report.items.extend(items);
                    Paced::Success
                }
                Err((failure, paced)) => {
                    tracing::warn!(
                        account=%account,
                        kind=?failure.kind,
                        detail=%failure.detail,
                        "x.delegated.account_failed"
                    );
                    if paced == Paced::RateLimited {
                        tracing::warn!(account=%account, "x.delegated.rate_limited");
                    }
                    report.failures.push(failure);
                    paced
                }
            };
            self.pacing.pause(paced).await;
        }

        report
    }
}
