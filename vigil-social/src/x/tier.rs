//! Shared vocabulary for fetch tiers: names, the strategy trait, per-run reports and pacing.
use crate::x::window::TimeWindow;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use vigil_common::{AccountTarget, IntelligenceItem};

/// The three acquisition strategies, declared in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FetchTier {
    /// External session-authenticated crawler, one process per account.
    DelegatedScraper,
    /// Official v2 API, only when credentials exist.
    OfficialApi,
    /// Built-in scraper with no credential requirement.
    EmbeddedScraper,
}

impl FetchTier {
    pub const PRIORITY: [FetchTier; 3] = [
        FetchTier::DelegatedScraper,
        FetchTier::OfficialApi,
        FetchTier::EmbeddedScraper,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FetchTier::DelegatedScraper => "delegated_scraper",
            FetchTier::OfficialApi => "official_api",
            FetchTier::EmbeddedScraper => "embedded_scraper",
        }
    }
}

impl fmt::Display for FetchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// The fetch could not be run at all (spawn error, timeout, transport error).
    Process,
    /// Output arrived but held no usable JSON array.
    MalformedOutput,
    /// The source signalled throttling.
    RateLimited,
    /// Handle → user id resolution failed.
    Lookup,
    /// Timeline retrieval failed.
    Timeline,
    /// The post stream broke mid-way.
    Stream,
}

/// One account that was skipped, and why.
#[derive(Debug, Clone, Serialize)]
pub struct AccountFailure {
    pub account: AccountTarget,
    pub kind: FailureKind,
    pub detail: String,
}

impl AccountFailure {
    pub fn new(account: &AccountTarget, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            account: account.clone(),
            kind,
            detail: detail.into(),
        }
    }
}

/// Everything one tier produced during a run. Partial success is the normal case.
#[derive(Debug, Clone, Default)]
pub struct TierReport {
    pub items: Vec<IntelligenceItem>,
    pub failures: Vec<AccountFailure>,
    /// Set when the tier gave up before touching any account (e.g. credential exchange failed).
    pub aborted: Option<String>,
}

impl TierReport {
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            aborted: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// How an account's fetch ended, for choosing the cool-down that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paced {
    Success,
    Failure,
    RateLimited,
}

/// Sleeps applied between accounts of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub after_success: Duration,
    pub after_failure: Duration,
    pub after_rate_limit: Duration,
}

impl Pacing {
    /// Long gaps for the session-authenticated crawler: 15 s, 5 s, 2 min.
    pub fn delegated() -> Self {
        Self {
            after_success: Duration::from_secs(15),
            after_failure: Duration::from_secs(5),
            after_rate_limit: Duration::from_secs(120),
        }
    }

    /// The same delay whatever the outcome.
    pub fn steady(delay: Duration) -> Self {
        Self {
            after_success: delay,
            after_failure: delay,
            after_rate_limit: delay,
        }
    }

    /// No sleeping at all; used by tests.
    pub fn none() -> Self {
        Self::steady(Duration::ZERO)
    }

    pub fn delay_for(&self, outcome: Paced) -> Duration {
        match outcome {
            Paced::Success => self.after_success,
            Paced::Failure => self.after_failure,
            Paced::RateLimited => self.after_rate_limit,
        }
    }

    pub async fn pause(&self, outcome: Paced) {
        let delay = self.delay_for(outcome);
        if !delay.is_zero() {
            tracing::debug!(?outcome, delay_ms = delay.as_millis() as u64, "x.pacing.sleep");
            tokio::time::sleep(delay).await;
        }
    }
}

/// One acquisition strategy. Implementations walk `accounts` in order, one at a time.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn tier(&self) -> FetchTier;

    /// Whether this tier may be attempted at all (e.g. credentials configured).
    fn is_available(&self) -> bool {
        true
    }

    async fn fetch(&self, accounts: &[AccountTarget], window: &TimeWindow) -> TierReport;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_matches_declaration_order() {
        let mut sorted = FetchTier::PRIORITY;
        sorted.sort();
        assert_eq!(sorted, FetchTier::PRIORITY);
    }

    #[test]
    fn delegated_pacing_picks_cooldown_by_outcome() {
        let p = Pacing::delegated();
        assert_eq!(p.delay_for(Paced::Success), Duration::from_secs(15));
        assert_eq!(p.delay_for(Paced::Failure), Duration::from_secs(5));
        assert_eq!(p.delay_for(Paced::RateLimited), Duration::from_secs(120));
    }
}
