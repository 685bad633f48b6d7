//! Single-slot scheduled task used for debounced autosave.
//!
//! Scheduling again replaces the pending deadline; there is never more
//! than one.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Cancel any pending deadline and schedule a new one `delay` from now.
    pub fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Wait for the pending deadline and consume it.
    ///
    /// Never completes when nothing is scheduled. Cancel-safe: dropping the
    /// future leaves the deadline in place.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn reschedule_pushes_deadline_back() {
        let mut debounce = Debouncer::new(Duration::from_secs(2));
        let start = Instant::now();
        debounce.schedule();
        tokio::time::advance(Duration::from_millis(1500)).await;
        debounce.schedule();

        debounce.fired().await;
        assert!(Instant::now() - start >= Duration::from_millis(3500));
        assert!(!debounce.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_debounce_never_fires() {
        let mut debounce = Debouncer::new(Duration::from_secs(2));
        debounce.schedule();
        debounce.cancel();
        let result = tokio::time::timeout(Duration::from_secs(10), debounce.fired()).await;
        assert!(result.is_err());
    }
}
