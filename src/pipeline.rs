//! Ordered filter pipeline.
//!
//! The pipeline is built once while configuration is resolved and is
//! read-only afterwards. Each evaluation owns its working identity, runs the
//! stages in registration order and stops at the first rejection.

use crate::config::IdentityConfig;
use crate::error::IdentityError;
use crate::filter::{MatchGate, RewriteStage, Stage, StageKind};
use rayon::prelude::*;

/// Why an identity was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// A match gate said no.
    Gate { stage: usize, kind: StageKind },
    /// A stage could not run; the pipeline fails closed.
    StageFailed { stage: usize, error: IdentityError },
}

/// Outcome of one pipeline evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult {
    Accepted(String),
    Rejected(Rejection),
}

impl PipelineResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PipelineResult::Accepted(_))
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_accepted()
    }

    /// The accepted identity, if any.
    pub fn identity(&self) -> Option<&str> {
        match self {
            PipelineResult::Accepted(identity) => Some(identity),
            PipelineResult::Rejected(_) => None,
        }
    }

    pub fn into_identity(self) -> Option<String> {
        match self {
            PipelineResult::Accepted(identity) => Some(identity),
            PipelineResult::Rejected(_) => None,
        }
    }
}

/// Append-only list of filter stages.
///
/// # Example
/// ```rust
/// use remoteuser_identity::{FilterPipeline, PipelineResult};
///
/// let mut pipeline = FilterPipeline::new();
/// pipeline
///     .register_rewrite([("/^DOMAIN\\\\/", "")])
///     .register_match_gate(["guest"], false);
///
/// assert_eq!(
///     pipeline.evaluate("DOMAIN\\jdoe"),
///     PipelineResult::Accepted("jdoe".to_string())
/// );
/// assert!(pipeline.evaluate("DOMAIN\\guest").is_rejected());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    stages: Vec<Stage>,
    config: IdentityConfig,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: IdentityConfig) -> Self {
        Self {
            stages: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Append a rewrite stage built from `(search, replacement)` pairs.
    pub fn register_rewrite<I, S, R>(&mut self, rules: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, R)>,
        S: AsRef<str>,
        R: Into<String>,
    {
        let stage = RewriteStage::new(rules, &self.config);
        self.push(stage.into())
    }

    /// Append a match gate; `allow` selects allow-list or deny-list polarity.
    pub fn register_match_gate<I, S>(&mut self, names: I, allow: bool) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let gate = MatchGate::new(names, allow, &self.config);
        self.push(gate.into())
    }

    /// Append an already built stage.
    pub fn push(&mut self, stage: Stage) -> &mut Self {
        tracing::debug!(
            "Registered {} stage at position {}",
            stage.kind(),
            self.stages.len()
        );
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage over `raw` in registration order.
    pub fn evaluate(&self, raw: &str) -> PipelineResult {
        let mut identity = raw.to_string();

        for (index, stage) in self.stages.iter().enumerate() {
            match stage {
                Stage::Rewrite(rewrite) => match rewrite.apply(&identity) {
                    Ok(rewritten) => identity = rewritten,
                    Err(error) => {
                        tracing::warn!("Rewrite stage {} failed for {:?}: {}", index, raw, error);
                        return PipelineResult::Rejected(Rejection::StageFailed {
                            stage: index,
                            error,
                        });
                    }
                },
                Stage::MatchGate(gate) => match gate.decide(&identity) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(
                            "{:?} rejected by {} stage {}",
                            identity,
                            stage.kind(),
                            index
                        );
                        return PipelineResult::Rejected(Rejection::Gate {
                            stage: index,
                            kind: stage.kind(),
                        });
                    }
                    Err(error) => {
                        tracing::warn!("Match stage {} failed for {:?}: {}", index, raw, error);
                        return PipelineResult::Rejected(Rejection::StageFailed {
                            stage: index,
                            error,
                        });
                    }
                },
            }
        }

        tracing::debug!("Accepted {:?} as {:?}", raw, identity);
        PipelineResult::Accepted(identity)
    }

    /// Evaluate many identities, preserving input order.
    ///
    /// Large batches are spread over the rayon pool; the pipeline is only read.
    pub fn evaluate_batch<S>(&self, raws: &[S]) -> Vec<PipelineResult>
    where
        S: AsRef<str> + Sync,
    {
        let batch = &self.config.batch;
        if batch.enable_parallelism && raws.len() >= batch.min_batch_size_for_parallelism {
            raws.par_iter()
                .map(|raw| self.evaluate(raw.as_ref()))
                .collect()
        } else {
            raws.iter().map(|raw| self.evaluate(raw.as_ref())).collect()
        }
    }
}
