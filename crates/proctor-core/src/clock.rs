//! Section countdown clock.
//!
//! The clock counts whole seconds and is advanced by [`SessionClock::tick`],
//! which the session controller calls once per tick interval while the
//! section is active. Remaining time never increases and never goes below
//! zero; expiry is reported exactly once per activation.

use std::fmt;

use chrono::{DateTime, Utc};

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTick {
    /// The clock advanced and time remains.
    Running { remaining: u64 },
    /// This tick reached zero.
    Expired,
    /// The clock is paused, stopped, or already expired; nothing changed.
    Idle,
}

type ExpireCallback = Box<dyn FnMut() + Send>;

pub struct SessionClock {
    budget: u64,
    remaining: u64,
    running: bool,
    expired: bool,
    on_expire: Option<ExpireCallback>,
}

impl fmt::Debug for SessionClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClock")
            .field("budget", &self.budget)
            .field("remaining", &self.remaining)
            .field("running", &self.running)
            .field("expired", &self.expired)
            .finish()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::stopped()
    }
}

impl SessionClock {
    /// A clock that has not been started.
    pub fn stopped() -> Self {
        Self {
            budget: 0,
            remaining: 0,
            running: false,
            expired: false,
            on_expire: None,
        }
    }

    /// Start a fresh countdown of `duration_seconds`.
    pub fn start(&mut self, duration_seconds: u64) {
        self.budget = duration_seconds;
        self.remaining = duration_seconds;
        self.running = true;
        self.expired = false;
    }

    /// Rebuild a running clock from the server's record of when the section
    /// started, so a reload cannot grant extra time.
    pub fn reconstruct(budget: u64, started_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let elapsed = (now - started_at).num_seconds().max(0) as u64;
        Self {
            budget,
            remaining: budget.saturating_sub(elapsed),
            running: true,
            expired: false,
            on_expire: None,
        }
    }

    /// Register a callback invoked when the countdown reaches zero.
    pub fn on_expire(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_expire = Some(Box::new(callback));
    }

    /// Advance by one second.
    pub fn tick(&mut self) -> ClockTick {
        if !self.running || self.expired {
            return ClockTick::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return ClockTick::Running {
                remaining: self.remaining,
            };
        }
        self.expired = true;
        self.running = false;
        if let Some(callback) = self.on_expire.as_mut() {
            callback();
        }
        ClockTick::Expired
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Resume ticking. Has no effect once expired.
    pub fn resume(&mut self) {
        if !self.expired {
            self.running = true;
        }
    }

    /// Stop for good; used when the session is torn down.
    pub fn stop(&mut self) {
        self.running = false;
        self.on_expire = None;
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }
}

/// Remaining seconds of a section: `budget - (now - started_at)`, clamped to 0.
pub fn remaining_seconds(budget: u64, started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    SessionClock::reconstruct(budget, started_at, now).remaining()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn ninety_second_section_expires_once_after_ninety_one_ticks() {
        let mut clock = SessionClock::stopped();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        clock.on_expire(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        clock.start(90);

        let mut expirations = 0;
        let mut last = u64::MAX;
        for _ in 0..91 {
            match clock.tick() {
                ClockTick::Running { remaining } => {
                    assert!(remaining < last);
                    last = remaining;
                }
                ClockTick::Expired => expirations += 1,
                ClockTick::Idle => {}
            }
        }
        assert_eq!(expirations, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(clock.remaining(), 0);
    }

    #[test]
    fn paused_clock_does_not_move() {
        let mut clock = SessionClock::stopped();
        clock.start(10);
        clock.tick();
        clock.pause();
        assert_eq!(clock.tick(), ClockTick::Idle);
        assert_eq!(clock.remaining(), 9);
        clock.resume();
        assert_eq!(clock.tick(), ClockTick::Running { remaining: 8 });
    }

    #[test]
    fn resume_after_expiry_is_ignored() {
        let mut clock = SessionClock::stopped();
        clock.start(1);
        assert_eq!(clock.tick(), ClockTick::Expired);
        clock.resume();
        assert!(!clock.is_running());
        assert_eq!(clock.tick(), ClockTick::Idle);
    }

    #[test]
    fn reconstruct_uses_server_timestamp() {
        let started = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let now = started + Duration::seconds(600);
        let clock = SessionClock::reconstruct(1920, started, now);
        assert_eq!(clock.remaining(), 1320);
        assert_eq!(clock.budget(), 1920);
    }

    #[test]
    fn reconstruct_clamps_to_zero_and_expires_on_next_tick() {
        let started = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let now = started + Duration::seconds(5000);
        let mut clock = SessionClock::reconstruct(1920, started, now);
        assert_eq!(clock.remaining(), 0);
        assert_eq!(clock.tick(), ClockTick::Expired);
        assert_eq!(clock.tick(), ClockTick::Idle);
    }

    #[test]
    fn future_start_timestamp_grants_no_extra_time() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let started = now + Duration::seconds(30);
        assert_eq!(remaining_seconds(90, started, now), 90);
    }

    #[test]
    fn remaining_formula_holds_for_many_offsets() {
        let started = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        for elapsed in [0i64, 1, 59, 89, 90, 91, 1000] {
            let now = started + Duration::seconds(elapsed);
            let expected = (90 - elapsed).max(0) as u64;
            assert_eq!(remaining_seconds(90, started, now), expected);
        }
    }
}
