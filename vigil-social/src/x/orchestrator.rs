//! Tiered acquisition with fallback.
//!
//! Tiers run in [`FetchTier::PRIORITY`] order. The first one that returns at
//! least one post wins and the rest are never touched; a tier that returns
//! nothing hands over to the next. Only when every tier comes back empty does
//! the run fail.
use crate::x::tier::{AccountFailure, FetchStrategy, FetchTier};
use crate::x::window::TimeWindow;
use serde::Serialize;
use std::fmt;
use vigil_common::{AccountTarget, IntelligenceItem};

#[derive(Debug, Clone, Serialize)]
pub enum AttemptOutcome {
    /// Not attempted (e.g. no credentials).
    Skipped { reason: String },
    /// Attempted, produced nothing inside the window.
    Empty {
        failures: Vec<AccountFailure>,
        aborted: Option<String>,
    },
    /// Attempted and produced posts; ends the run.
    Won {
        items: usize,
        failures: Vec<AccountFailure>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TierAttempt {
    pub tier: FetchTier,
    pub outcome: AttemptOutcome,
}

/// A successful run: the winning tier, its posts, and what happened on the way there.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub tier: FetchTier,
    pub items: Vec<IntelligenceItem>,
    pub attempts: Vec<TierAttempt>,
}

impl FetchReport {
    /// Accounts the winning tier had to skip.
    pub fn skipped_accounts(&self) -> &[AccountFailure] {
        self.attempts
            .iter()
            .find_map(|a| match &a.outcome {
                AttemptOutcome::Won { failures, .. } => Some(failures.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("no tier produced posts inside the window (attempted: {})", summarize(.attempts))]
    Exhausted { attempts: Vec<TierAttempt> },
}

fn summarize(attempts: &[TierAttempt]) -> String {
    if attempts.is_empty() {
        return "none".to_string();
    }
    attempts
        .iter()
        .map(|a| match &a.outcome {
            AttemptOutcome::Skipped { .. } => format!("{} (skipped)", a.tier),
            AttemptOutcome::Empty { failures, .. } => {
                format!("{} ({} account failures)", a.tier, failures.len())
            }
            AttemptOutcome::Won { .. } => a.tier.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct Orchestrator {
    strategies: Vec<Box<dyn FetchStrategy>>,
    window: TimeWindow,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tiers", &self.tiers())
            .field("window", &self.window)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            strategies: Vec::new(),
            window,
        }
    }

    /// Register a tier. A second strategy for the same tier replaces the first.
    pub fn with_strategy<S: FetchStrategy + 'static>(mut self, strategy: S) -> Self {
        let tier = strategy.tier();
        self.strategies.retain(|s| s.tier() != tier);
        self.strategies.push(Box::new(strategy));
        self.strategies.sort_by_key(|s| s.tier());
        self
    }

    /// Registered tiers in the order they will be tried.
    pub fn tiers(&self) -> Vec<FetchTier> {
        self.strategies.iter().map(|s| s.tier()).collect()
    }

    pub async fn fetch(&self, targets: &[AccountTarget]) -> Result<FetchReport, AcquisitionError> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let tier = strategy.tier();
            if !strategy.is_available() {
                tracing::info!(%tier, "x.tier.skipped");
                attempts.push(TierAttempt {
                    tier,
                    outcome: AttemptOutcome::Skipped {
                        reason: "not configured".to_string(),
                    },
                });
                continue;
            }

            tracing::info!(%tier, accounts = targets.len(), "x.tier.start");
            let report = strategy.fetch(targets, &self.window).await;

            if report.is_empty() {
                tracing::warn!(
                    %tier,
                    failures = report.failures.len(),
                    aborted = ?report.aborted,
                    "x.tier.empty_falling_through"
                );
                attempts.push(TierAttempt {
                    tier,
                    outcome: AttemptOutcome::Empty {
                        failures: report.failures,
                        aborted: report.aborted,
                    },
                });
                continue;
            }

            tracing::info!(
                %tier,
                items = report.items.len(),
                failures = report.failures.len(),
                "x.tier.won"
            );
            attempts.push(TierAttempt {
                tier,
                outcome: AttemptOutcome::Won {
                    items: report.items.len(),
                    failures: report.failures,
                },
            });
            return Ok(FetchReport {
                tier,
                items: report.items,
                attempts,
            });
        }

        tracing::warn!(attempted = attempts.len(), "x.tiers.exhausted");
        Err(AcquisitionError::Exhausted { attempts })
    }
}
