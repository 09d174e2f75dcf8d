use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// deadline and cancellation signal carried into every store call
///
/// clones share the cancellation flag, so canceling any clone cancels all.
#[derive(Clone, Debug, Default)]
pub struct Context {
    deadline: Option<Instant>,
    canceled: Arc<AtomicBool>,
}

impl Context {
    /// no deadline, never canceled unless asked
    pub fn background() -> Self {
        Self::default()
    }

    /// a context expiring `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_at(Instant::now() + timeout)
    }

    /// a context expiring at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::background().deadline_at(deadline)
    }

    /// same cancellation flag, tighter of the two deadlines
    pub fn deadline_at(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        };
        Self {
            deadline: Some(deadline),
            canceled: Arc::clone(&self.canceled),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// fail if canceled or past the deadline
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(Error::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_live() {
        assert!(Context::background().check().is_ok());
    }

    #[test]
    fn test_cancel_shared_between_clones() {
        let ctx = Context::background();
        let clone = ctx.clone();
        clone.cancel();
        assert!(matches!(ctx.check(), Err(Error::Canceled)));
    }

    #[test]
    fn test_deadline_exceeded() {
        let ctx = Context::with_deadline(Instant::now());
        assert!(matches!(ctx.check(), Err(Error::DeadlineExceeded)));
    }

    #[test]
    fn test_deadline_in_future() {
        let ctx = Context::with_timeout(Duration::from_secs(60));
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_tighter_deadline_wins() {
        let now = Instant::now();
        let ctx = Context::with_deadline(now + Duration::from_secs(10));
        let tighter = ctx.deadline_at(now + Duration::from_secs(1));
        let looser = ctx.deadline_at(now + Duration::from_secs(100));
        assert_eq!(tighter.deadline(), Some(now + Duration::from_secs(1)));
        assert_eq!(looser.deadline(), Some(now + Duration::from_secs(10)));
    }
}
