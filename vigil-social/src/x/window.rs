//! Trailing time window and post timestamp parsing.
use std::fmt;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime};
use vigil_common::Clock;

/// `Mon Jan 02 15:04:05 +0000 2006`, the classic `created_at` shape.
const RUBY_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short] [month repr:short] [day] [hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute] [year]"
);

/// Accepts posts whose timestamp lies in `[now - span, now]`.
///
/// `now` is read from the clock on every call, so a window used through a long
/// run slides forward with it.
#[derive(Clone)]
pub struct TimeWindow {
    span: Duration,
    clock: Arc<dyn Clock>,
}

impl TimeWindow {
    pub fn trailing(span: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { span, clock }
    }

    pub fn last_24_hours(clock: Arc<dyn Clock>) -> Self {
        Self::trailing(Duration::hours(24), clock)
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    pub fn admits(&self, at: OffsetDateTime) -> bool {
        let now = self.clock.now();
        at <= now && now - at <= self.span
    }
}

impl fmt::Debug for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeWindow").field("span", &self.span).finish()
    }
}

/// Parse a post timestamp: RubyDate first, then RFC 3339.
pub fn parse_post_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    OffsetDateTime::parse(raw, RUBY_DATE)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
        .ok()
}

/// Render a timestamp the way [`parse_post_timestamp`] reads it first.
pub fn format_ruby_date(at: OffsetDateTime) -> Option<String> {
    at.format(RUBY_DATE).ok()
}
