//! X (Twitter) acquisition: three fetch tiers behind one orchestrator.
//!
//! Tiers are tried in priority order (delegated crawler, official API, embedded
//! scraper) and the first one to produce posts inside the trailing window wins.
//! Accounts inside a tier are walked one at a time with a cool-down between them.
pub mod delegated;
pub mod embedded;
pub mod official;
pub mod orchestrator;
pub mod tier;
pub mod types;
pub mod window;

pub use delegated::{CommandFetcher, DelegatedFetcher, DelegatedTier};
pub use embedded::{EmbeddedTier, SyndicationScraper, TimelineSource};
pub use official::{ApiCredentials, OfficialTier, TwitterApi};
pub use orchestrator::{AcquisitionError, AttemptOutcome, FetchReport, Orchestrator, TierAttempt};
pub use tier::{AccountFailure, FailureKind, FetchStrategy, FetchTier, Pacing, TierReport};
pub use window::TimeWindow;
