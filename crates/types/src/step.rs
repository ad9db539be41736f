//! The HotStuff pipeline steps.

use serde::{Deserialize, Serialize};

/// One step of the HotStuff pipeline for a single (height, round).
///
/// The derived ordering is load-bearing: certificate comparisons of the
/// form "justify at step ≥ s" use it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum HotstuffStep {
    /// Validators announce themselves (and their high prepare QC) to the
    /// new leader.
    NewRound = 1,
    /// The leader has proposed a block; replicas vote on it.
    Prepare = 2,
    /// A PrepareQC exists; replicas acknowledge it.
    PreCommit = 3,
    /// A PreCommitQC exists; replicas lock on the block.
    Commit = 4,
    /// A CommitQC exists; the block is final.
    Decide = 5,
}

impl HotstuffStep {
    pub const ALL: [HotstuffStep; 5] = [
        HotstuffStep::NewRound,
        HotstuffStep::Prepare,
        HotstuffStep::PreCommit,
        HotstuffStep::Commit,
        HotstuffStep::Decide,
    ];

    /// The step after this one. `Decide` is terminal.
    pub fn next(self) -> Option<HotstuffStep> {
        match self {
            HotstuffStep::NewRound => Some(HotstuffStep::Prepare),
            HotstuffStep::Prepare => Some(HotstuffStep::PreCommit),
            HotstuffStep::PreCommit => Some(HotstuffStep::Commit),
            HotstuffStep::Commit => Some(HotstuffStep::Decide),
            HotstuffStep::Decide => None,
        }
    }

    /// Short name for logs and telemetry labels.
    pub fn as_str(self) -> &'static str {
        match self {
            HotstuffStep::NewRound => "NewRound",
            HotstuffStep::Prepare => "Prepare",
            HotstuffStep::PreCommit => "PreCommit",
            HotstuffStep::Commit => "Commit",
            HotstuffStep::Decide => "Decide",
        }
    }
}

impl std::fmt::Display for HotstuffStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a consensus message is a leader proposal or a validator vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Propose = 1,
    Vote = 2,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Propose => "Propose",
            MessageType::Vote => "Vote",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
