//! Broadcast channel for delta state changes.

use crate::cancel::CancelToken;
use crate::error::{FlushError, FlushResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Wakes every waiter whenever delta state changes.
///
/// The channel keeps no state besides a generation counter. A waiter reads
/// the generation, evaluates its condition, and blocks only while the
/// generation is unchanged, so a change made between the check and the block
/// is never missed.
#[derive(Debug, Default)]
pub struct DeltaEvent {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl DeltaEvent {
    /// Creates a new channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Advances the generation and wakes every waiter.
    ///
    /// Callers must have made their state change visible first.
    pub fn broadcast(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.condvar.notify_all();
    }

    /// Wakes every waiter without advancing the generation, so they only
    /// re-check their cancellation tokens.
    pub(crate) fn wake_all(&self) {
        let _generation = self.generation.lock();
        self.condvar.notify_all();
    }

    /// Blocks until the generation moves past `seen` or `cancel` fires.
    pub(crate) fn wait_past(self: &Arc<Self>, seen: u64, cancel: &CancelToken) -> FlushResult<()> {
        let _listener = cancel.listen(self);
        let mut generation = self.generation.lock();
        loop {
            if *generation != seen {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(FlushError::Interrupted);
            }
            match cancel.deadline() {
                Some(deadline) => {
                    let timed_out = self.condvar.wait_until(&mut generation, deadline).timed_out();
                    if timed_out && *generation == seen {
                        return Err(FlushError::Interrupted);
                    }
                }
                None => self.condvar.wait(&mut generation),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn broadcast_advances_generation() {
        let event = DeltaEvent::new();
        let before = event.generation();
        event.broadcast();
        assert_eq!(event.generation(), before + 1);
    }

    #[test]
    fn wait_returns_immediately_on_stale_generation() {
        let event = Arc::new(DeltaEvent::new());
        let seen = event.generation();
        event.broadcast();
        event.wait_past(seen, &CancelToken::new()).unwrap();
    }

    #[test]
    fn waiter_woken_by_broadcast() {
        let event = Arc::new(DeltaEvent::new());
        let seen = event.generation();
        let e2 = Arc::clone(&event);
        let handle = thread::spawn(move || e2.wait_past(seen, &CancelToken::new()));
        thread::sleep(Duration::from_millis(20));
        event.broadcast();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn waiter_woken_by_cancel() {
        let event = Arc::new(DeltaEvent::new());
        let seen = event.generation();
        let token = CancelToken::new();
        let (e2, t2) = (Arc::clone(&event), token.clone());
        let handle = thread::spawn(move || e2.wait_past(seen, &t2));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(FlushError::Interrupted)));
        assert_eq!(event.generation(), seen);
    }

    #[test]
    fn deadline_expires_wait() {
        let event = Arc::new(DeltaEvent::new());
        let seen = event.generation();
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        let result = event.wait_past(seen, &token);
        assert!(matches!(result, Err(FlushError::Interrupted)));
    }
}
