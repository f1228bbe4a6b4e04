//! Filter stages for the identity pipeline.
//!
//! Two stage kinds exist:
//! - [`RewriteStage`] - ordered search/replace rules that transform the
//!   working identity
//! - [`MatchGate`] - allow or deny lists that accept or reject it
//!
//! Stages are immutable once built. Patterns are normalized and compiled at
//! construction, so evaluation only reads precompiled data and stages can be
//! shared freely across threads.

pub mod gate;
pub mod rewrite;

pub use gate::{MatchGate, Polarity};
pub use rewrite::{RewriteRule, RewriteStage};

use std::fmt;

/// One unit of the filter pipeline.
#[derive(Debug, Clone)]
pub enum Stage {
    Rewrite(RewriteStage),
    MatchGate(MatchGate),
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Rewrite(_) => StageKind::Rewrite,
            Stage::MatchGate(gate) => match gate.polarity() {
                Polarity::Allow => StageKind::AllowList,
                Polarity::Deny => StageKind::DenyList,
            },
        }
    }
}

impl From<RewriteStage> for Stage {
    fn from(stage: RewriteStage) -> Self {
        Stage::Rewrite(stage)
    }
}

impl From<MatchGate> for Stage {
    fn from(gate: MatchGate) -> Self {
        Stage::MatchGate(gate)
    }
}

/// Stage classification for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Rewrite,
    AllowList,
    DenyList,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Rewrite => write!(f, "rewrite"),
            StageKind::AllowList => write!(f, "allow list"),
            StageKind::DenyList => write!(f, "deny list"),
        }
    }
}
