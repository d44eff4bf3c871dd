//! Common types and utilities shared across Vigil crates.
//!
//! This crate defines the record shape handed from the acquisition side to the
//! delivery side, the clock abstraction both of them read time from, shared
//! error types, and the observability helpers used by binaries and tests.
//!
//! # Overview
//!
//! - [`IntelligenceItem`]: one discovered post (`link` + `summary`)
//! - [`AccountTarget`]: one monitored account handle
//! - [`Clock`], [`SystemClock`], [`FixedClock`]: wall-clock access
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`VigilError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! ```rust
//! use vigil_common::{AccountTarget, IntelligenceItem};
//!
//! let handle = AccountTarget::new("@taviso");
//! assert_eq!(handle.handle(), "taviso");
//!
//! let item = IntelligenceItem::new("https://x.com/taviso/status/1", "@taviso: hi").unwrap();
//! assert_eq!(item.link(), "https://x.com/taviso/status/1");
//! assert!(IntelligenceItem::new("", "@taviso: hi").is_none());
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use time::OffsetDateTime;

pub mod observability;

/// One discovered post.
///
/// Both fields are guaranteed non-empty; use [`IntelligenceItem::new`] to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntelligenceItem {
    link: String,
    summary: String,
}

impl IntelligenceItem {
    /// Returns `None` when either the link or the summary is blank.
    pub fn new(link: impl Into<String>, summary: impl Into<String>) -> Option<Self> {
        let link = link.into();
        let summary = summary.into();
        if link.trim().is_empty() || summary.trim().is_empty() {
            return None;
        }
        Some(Self { link, summary })
    }

    /// Permanent URL of the post.
    pub fn link(&self) -> &str {
        &self.link
    }

    /// Author handle plus body text, untruncated.
    pub fn summary(&self) -> &str {
        &self.summary
    }
}

/// A monitored account handle, stored without a leading `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountTarget(String);

impl AccountTarget {
    pub fn new(handle: impl AsRef<str>) -> Self {
        Self(handle.as_ref().trim().trim_start_matches('@').to_string())
    }

    pub fn handle(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl From<&str> for AccountTarget {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AccountTarget {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Source of "now". Every read goes back to the clock, so long runs observe time moving.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A settable clock for tests and replays.
///
/// ```
/// use time::macros::datetime;
/// use vigil_common::{Clock, FixedClock};
///
/// let clock = FixedClock::new(datetime!(2025-01-01 00:00 UTC));
/// clock.advance(time::Duration::hours(2));
/// assert_eq!(clock.now(), datetime!(2025-01-01 02:00 UTC));
/// ```
#[derive(Debug)]
pub struct FixedClock {
    at: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(at: OffsetDateTime) -> Self {
        Self { at: Mutex::new(at) }
    }

    pub fn set(&self, at: OffsetDateTime) {
        if let Ok(mut guard) = self.at.lock() {
            *guard = at;
        }
    }

    pub fn advance(&self, by: time::Duration) {
        if let Ok(mut guard) = self.at.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        match self.at.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Error types used across the Vigil system.
#[derive(thiserror::Error, Debug)]
pub enum VigilError {
    /// Configuration was incomplete or invalid, found while wiring or before delivery.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else bubbled up from a collaborator.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenient alias for results that use [`VigilError`].
pub type Result<T> = std::result::Result<T, VigilError>;

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn account_target_strips_at_sign_and_whitespace() {
        let t = AccountTarget::new("  @SwiftOnSecurity ");
        assert_eq!(t.handle(), "SwiftOnSecurity");
        assert_eq!(t.to_string(), "@SwiftOnSecurity");
    }

    #[test]
    fn item_rejects_blank_fields() {
        assert!(IntelligenceItem::new("https://x.com/a/status/1", "  ").is_none());
        assert!(IntelligenceItem::new(" ", "@a: text").is_none());
        assert!(IntelligenceItem::new("https://x.com/a/status/1", "@a: text").is_some());
    }

    #[test]
    fn fixed_clock_moves_only_when_told() {
        let clock = FixedClock::new(datetime!(2025-03-01 12:00 UTC));
        assert_eq!(clock.now(), clock.now());
        clock.set(datetime!(2025-03-02 12:00 UTC));
        assert_eq!(clock.now(), datetime!(2025-03-02 12:00 UTC));
    }
}
