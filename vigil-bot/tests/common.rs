use std::sync::Arc;

use time::macros::datetime;
use time::OffsetDateTime;
use vigil_bot::onebot::{OneBotDispatcher, OneBotSettings};
use vigil_common::{FixedClock, IntelligenceItem};

pub const NOW: OffsetDateTime = datetime!(2025-06-10 12:00 UTC);

pub fn dispatcher(settings: OneBotSettings) -> OneBotDispatcher {
    OneBotDispatcher::new(settings).with_clock(Arc::new(FixedClock::new(NOW)))
}

pub fn items() -> Vec<IntelligenceItem> {
    vec![
        IntelligenceItem::new("https://twitter.com/alice/status/1", "@alice: new CVE writeup").unwrap(),
        IntelligenceItem::new("https://twitter.com/bob/status/2", "@bob: patch now").unwrap(),
    ]
}
