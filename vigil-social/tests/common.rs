use std::sync::{Arc, OnceLock};

use time::macros::datetime;
use time::OffsetDateTime;
use vigil_common::observability::{LogConfig, LogFormat};
use vigil_common::FixedClock;
use vigil_social::x::TimeWindow;

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

/// Reference "now" shared by the integration tests.
pub const NOW: OffsetDateTime = datetime!(2025-06-10 12:00 UTC);

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "vigil-tests",
            log_dir: Some(std::env::temp_dir().join("vigil-tests")),
            emit_stderr: true,
            format: if std::env::var("VIGIL_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug",
        };

        vigil_common::observability::init_logging(config).unwrap_or_default()
    });
}

pub fn window_at_now() -> TimeWindow {
    TimeWindow::last_24_hours(Arc::new(FixedClock::new(NOW)))
}
