//! The tokio event loop around the state machine.
//!
//! One task serializes every state transition. Inbound wire messages
//! are decoded by [`InboundHandler`] and queued; the pacemaker timer
//! posts into the same queue; outbound sends run as fire-and-forget
//! background tasks that report failures back as events. The background
//! tasks never touch consensus state.

use crate::{Metrics, TimerManager, Transport};
use meridian_bft::ConsensusState;
use meridian_core::{Action, Event, StateMachine};
use meridian_messages::{decode_message, encode_message, CodecError, TOPIC_CONSENSUS};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Decodes wire payloads into dispatcher events.
///
/// Hand this to the transport's message subscription; it is cheap to
/// clone and safe to call from any task.
#[derive(Clone)]
pub struct InboundHandler {
    event_tx: mpsc::Sender<Event>,
}

impl InboundHandler {
    /// Decode one wire message and queue it for the dispatcher.
    /// Undecodable payloads are logged and dropped.
    pub async fn on_wire_message(&self, topic: &str, bytes: &[u8]) {
        if topic != TOPIC_CONSENSUS {
            debug!(topic, "ignoring message on foreign topic");
            return;
        }
        match decode_message(bytes) {
            Ok(message) => {
                let event = Event::MessageReceived {
                    message: Box::new(message),
                };
                if self.event_tx.send(event).await.is_err() {
                    warn!("dispatcher is gone; dropping inbound message");
                }
            }
            Err(err) => warn!(error = %err, "undecodable consensus message"),
        }
    }
}

/// The production driver: owns the engine, the timer manager, and the
/// transport handle.
pub struct ProductionRunner<T: Transport + 'static> {
    state: ConsensusState,
    transport: Arc<T>,
    timers: TimerManager,
    event_tx: mpsc::Sender<Event>,
    event_rx: mpsc::Receiver<Event>,
    metrics: Option<Metrics>,
    started_at: Instant,
}

impl<T: Transport + 'static> ProductionRunner<T> {
    pub fn new(state: ConsensusState, transport: Arc<T>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let timers = TimerManager::new(event_tx.clone());
        Self {
            state,
            transport,
            timers,
            event_tx,
            event_rx,
            metrics: None,
            started_at: Instant::now(),
        }
    }

    /// Attach runner metrics.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The handler to subscribe on the transport.
    pub fn inbound_handler(&self) -> InboundHandler {
        InboundHandler {
            event_tx: self.event_tx.clone(),
        }
    }

    /// A sender for feeding events directly (tests, local tooling).
    pub fn event_sender(&self) -> mpsc::Sender<Event> {
        self.event_tx.clone()
    }

    /// Drive consensus. Runs until the owning task is aborted (the
    /// runner keeps a sender for timers and send failures, so the
    /// channel never closes on its own).
    pub async fn run(mut self) {
        let actions = self.state.start();
        self.execute_actions(actions);

        while let Some(event) = self.event_rx.recv().await {
            if let Some(metrics) = &self.metrics {
                if matches!(event, Event::MessageReceived { .. }) {
                    metrics.messages_received.inc();
                }
            }
            self.state.set_time(self.started_at.elapsed());
            let actions = self.state.handle(event);
            self.execute_actions(actions);
        }
        debug!("event channel closed; consensus runner stopping");
    }

    fn execute_actions(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast { message } => match encode_message(&message) {
                    Ok(bytes) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.messages_sent.inc();
                        }
                        self.spawn_send(None, bytes);
                    }
                    Err(err) => log_encode_error(&err),
                },
                Action::Send { to, message } => match encode_message(&message) {
                    Ok(bytes) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.messages_sent.inc();
                        }
                        self.spawn_send(Some(to), bytes);
                    }
                    Err(err) => log_encode_error(&err),
                },
                Action::SetTimer { id, duration } => self.timers.set_timer(id, duration),
                Action::CancelTimer { id } => self.timers.cancel_timer(id),
                Action::EmitCommitted { height, .. } => {
                    if let Some(metrics) = &self.metrics {
                        metrics.blocks_committed.inc();
                        metrics.committed_height.set(height.0 as i64);
                    }
                }
            }
        }
    }

    /// Fire-and-forget outbound send. The task owns nothing but the
    /// bytes and a way to report failure; it cannot mutate consensus
    /// state.
    fn spawn_send(&self, to: Option<meridian_types::Address>, bytes: Vec<u8>) {
        let transport = self.transport.clone();
        let event_tx = self.event_tx.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let result = match to {
                Some(peer) => transport.send(peer, TOPIC_CONSENSUS, bytes),
                None => transport.broadcast(TOPIC_CONSENSUS, bytes),
            };
            if let Err(err) = result {
                if let Some(metrics) = &metrics {
                    metrics.send_failures.inc();
                }
                let _ = event_tx
                    .send(Event::OutboundFailed {
                        peer: to,
                        reason: err.to_string(),
                    })
                    .await;
            }
        });
    }
}

fn log_encode_error(err: &CodecError) {
    error!(error = %err, "failed to encode outbound message");
}
