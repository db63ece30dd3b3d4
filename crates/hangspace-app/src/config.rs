//! Application configuration.

use std::time::Duration;

use chrono::FixedOffset;
use hangspace_core::format::utc_offset;

/// How long a toast stays visible.
pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_secs(3);

/// View-layer settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Toast auto-dismiss delay.
    pub toast_duration: Duration,
    /// Offset used when formatting timestamps.
    pub utc_offset: FixedOffset,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { toast_duration: DEFAULT_TOAST_DURATION, utc_offset: utc_offset() }
    }
}
