//! BFT consensus state machine.
//!
//! This crate implements a leader-driven HotStuff consensus engine as
//! a synchronous, event-driven state machine.
//!
//! # Architecture
//!
//! The state machine processes events synchronously:
//!
//! - `Event::MessageReceived` → dispatch on (role, message type)
//! - `Event::PacemakerTimeout` → interrupt the round, start the next one
//!
//! All network I/O is performed by the runner via returned `Action`s.
//! The utility layer (block building, application, commit) and leader
//! election are collaborators passed in at construction; the engine
//! holds only the interfaces it calls.
//!
//! # Consensus Protocol (HotStuff)
//!
//! Each height runs one or more rounds. A round walks the five-step
//! pipeline:
//!
//! ```text
//! NewRound --votes→ (leader aggregates) --propose→ Prepare
//! Prepare  --votes→ PreCommit --votes→ Commit --votes→ Decide
//! any step --timeout or protocol error→ round + 1, back to NewRound
//! ```
//!
//! ## Safety
//!
//! - **Quorum certificates**: every step transition past Prepare is
//!   justified by a certificate carrying more than ⅔·N distinct valid
//!   partial signatures over the same (height, step, round, block).
//!
//! - **Locking**: a replica that sees a PreCommit certificate locks on
//!   its block and will only accept later proposals that extend the
//!   locked block or carry a higher justify certificate.
//!
//! ## Liveness
//!
//! - **Pacemaker**: a per-step timer with exponential back-off. On
//!   timeout the round is interrupted, the round number increments, a
//!   new leader is elected, and every validator re-announces its high
//!   prepare certificate so progress made in the dead round survives.
//!
//! # Resources
//!
//! - [HotStuff paper](https://arxiv.org/pdf/1803.05069.pdf)

mod config;
mod election;
mod error;
mod leader;
mod pacemaker;
mod pool;
mod replica;
mod state;
mod traits;

pub mod testonly;
#[cfg(test)]
mod tests;

pub use config::ConsensusConfig;
pub use election::{ElectionError, LeaderElection, RoundRobinElection};
pub use error::{QcError, ValidationError};
pub use pacemaker::Pacemaker;
pub use pool::{MessagePool, PoolError};
pub use state::{ConsensusState, NotInValidatorSet, Role};
pub use traits::{UtilityError, UtilityProvider};
