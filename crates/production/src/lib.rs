//! Production driver for the consensus engine.
//!
//! The engine itself is a synchronous state machine; this crate is the
//! thin asynchronous shell around it:
//!
//! - [`runner::ProductionRunner`]: one tokio task draining an event
//!   channel through the state machine and executing its actions
//! - [`timers::TimerManager`]: the pacemaker timer as a tokio task
//! - [`transport::Transport`]: the boundary to the p2p layer, which is
//!   an external collaborator
//! - [`telemetry`]: tracing subscriber setup and the prometheus
//!   registry
//!
//! Outbound sends are fire-and-forget background tasks; delivery
//! failures are posted back into the event channel and logged by the
//! dispatcher. Nothing in this crate mutates consensus state outside
//! the runner task.

mod config;
mod metrics;
mod runner;
mod telemetry;
mod timers;
mod transport;

pub use config::{ConfigError, NodeConfig};
pub use metrics::Metrics;
pub use runner::{InboundHandler, ProductionRunner};
pub use telemetry::{init_tracing, render_metrics, TelemetryError};
pub use timers::TimerManager;
pub use transport::{Transport, TransportError};
