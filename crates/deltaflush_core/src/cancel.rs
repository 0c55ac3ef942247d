//! Cancellation tokens for blocking waits.

use crate::event::DeltaEvent;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Interrupts blocking waits.
///
/// Every blocking operation takes a token. Cancelling it, or letting its
/// deadline pass, makes waits that have not yet been satisfied return
/// [`FlushError::Interrupted`](crate::FlushError::Interrupted). Clones share
/// the same cancellation state, so one clone can be handed to another thread
/// to cancel a wait in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    /// Events that threads are currently blocked on with this token.
    listeners: Mutex<Vec<Weak<DeltaEvent>>>,
}

impl CancelToken {
    /// Creates a token without a deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(CancelInner {
                deadline: Some(deadline),
                ..CancelInner::default()
            }),
        }
    }

    /// Creates a token that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Creates a token from an optional timeout; `None` never expires.
    #[must_use]
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::new, Self::with_timeout)
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Returns true once the token was cancelled or its deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Cancels the token and wakes every wait blocked on it.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);

        let listeners: Vec<Arc<DeltaEvent>> = self
            .inner
            .listeners
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for event in listeners {
            event.wake_all();
        }
    }

    /// Registers `event` so that [`cancel`](Self::cancel) can wake a thread
    /// blocked on it. The registration lasts as long as the returned guard.
    pub(crate) fn listen(&self, event: &Arc<DeltaEvent>) -> ListenGuard<'_> {
        let weak = Arc::downgrade(event);
        self.inner.listeners.lock().push(weak.clone());
        ListenGuard {
            token: self,
            event: weak,
        }
    }
}

/// Keeps an event registered with a token.
pub(crate) struct ListenGuard<'a> {
    token: &'a CancelToken,
    event: Weak<DeltaEvent>,
}

impl Drop for ListenGuard<'_> {
    fn drop(&mut self) {
        let mut listeners = self.token.inner.listeners.lock();
        if let Some(pos) = listeners.iter().position(|w| w.ptr_eq(&self.event)) {
            listeners.swap_remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_token_is_live() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.deadline().is_none());
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn past_deadline_counts_as_cancelled() {
        let token = CancelToken::with_deadline(Instant::now());
        assert!(token.is_cancelled());
    }

    #[test]
    fn from_timeout_none_never_expires() {
        let token = CancelToken::from_timeout(None);
        assert!(token.deadline().is_none());
        let token = CancelToken::from_timeout(Some(Duration::from_secs(60)));
        assert!(token.deadline().is_some());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn listen_guard_unregisters() {
        let token = CancelToken::new();
        let event = Arc::new(DeltaEvent::new());
        {
            let _guard = token.listen(&event);
            assert_eq!(token.inner.listeners.lock().len(), 1);
        }
        assert!(token.inner.listeners.lock().is_empty());
    }
}
