//! Timer management for the production runner.
//!
//! Provides a tokio-based timer implementation for the deterministic
//! state machine. Timers are spawned as tokio tasks and can be
//! cancelled; setting a timer with the same id replaces the previous
//! one, which is exactly the pacemaker's restart semantics.

use meridian_core::{Event, TimerId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Convert a TimerId to the corresponding Event.
fn timer_event(id: TimerId) -> Event {
    match id {
        TimerId::Pacemaker => Event::PacemakerTimeout,
    }
}

/// Manages timers for the production runner.
///
/// Each timer is a tokio task that sleeps for the specified duration
/// and then sends the appropriate timer event to the event channel.
pub struct TimerManager {
    /// Active timers (id -> task handle).
    timers: HashMap<TimerId, JoinHandle<()>>,
    /// Event sender for timer fires.
    event_tx: mpsc::Sender<Event>,
}

impl TimerManager {
    pub fn new(event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            timers: HashMap::new(),
            event_tx,
        }
    }

    /// Set a timer that will fire after the given duration.
    ///
    /// If a timer with the same ID already exists, it is cancelled
    /// first.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);

        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(?id, "timer fired");
            let _ = event_tx.send(timer_event(id)).await;
        });

        self.timers.insert(id, handle);
        debug!(?id, ?duration, "timer set");
    }

    /// Cancel a timer. A no-op if it does not exist or already fired.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            trace!(?id, "timer cancelled");
        }
    }

    /// Cancel all timers. Called during shutdown.
    pub fn cancel_all(&mut self) {
        for (id, handle) in self.timers.drain() {
            handle.abort();
            trace!(?id, "timer cancelled (shutdown)");
        }
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timer_fires() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::Pacemaker, Duration::from_millis(10));

        let event = tokio::time::timeout(Duration::from_millis(500), event_rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert!(matches!(event, Event::PacemakerTimeout));
    }

    #[tokio::test]
    async fn cancelled_timer_does_not_fire() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::Pacemaker, Duration::from_millis(50));
        manager.cancel_timer(TimerId::Pacemaker);

        let result = tokio::time::timeout(Duration::from_millis(150), event_rx.recv()).await;
        assert!(result.is_err(), "timer should have been cancelled");
    }

    #[tokio::test]
    async fn setting_again_replaces_the_deadline() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::Pacemaker, Duration::from_secs(60));
        manager.set_timer(TimerId::Pacemaker, Duration::from_millis(10));

        let event = tokio::time::timeout(Duration::from_millis(500), event_rx.recv())
            .await
            .expect("the replacement timer should fire promptly")
            .expect("channel closed");
        assert!(matches!(event, Event::PacemakerTimeout));
    }
}
