//! Engine tunables.

use std::time::Duration;

/// Default section budget: 32 minutes.
pub const DEFAULT_SECTION_SECONDS: u64 = 32 * 60;

/// Configuration shared by the exam session and the editor session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a start or load may take before it is flagged as slow.
    /// The request is never cancelled.
    pub slow_start_threshold: Duration,
    /// Clock tick period.
    pub tick_interval: Duration,
    /// Quiet period before the editor autosaves a dirty draft.
    pub autosave_debounce: Duration,
    /// Maximum resend passes when flushing answers before final submission.
    pub flush_passes: u32,
    /// Budget for sections that do not carry their own.
    pub default_section_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            slow_start_threshold: Duration::from_secs(15),
            tick_interval: Duration::from_secs(1),
            autosave_debounce: Duration::from_secs(2),
            flush_passes: 3,
            default_section_seconds: DEFAULT_SECTION_SECONDS,
        }
    }
}
