use thiserror::Error;

use crate::supervisor::SupervisorState;

/// Why two stages could not be linked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkFailure {
    #[error("stage '{0}' is not in the graph")]
    MissingStage(String),
    #[error("a stage cannot be linked to itself")]
    SelfLink,
    #[error("upstream stage has no output port")]
    NoOutput,
    #[error("downstream stage has no input port")]
    NoInput,
    #[error("port '{0}' is already linked")]
    AlreadyLinked(String),
    #[error("capabilities do not intersect ({upstream} vs {downstream})")]
    Incompatible { upstream: String, downstream: String },
    /// The media framework turned the link down after the graph accepted it.
    #[error("refused by the media framework: {0}")]
    Refused(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage kind is unknown or unavailable, or its configuration was
    /// rejected.
    #[error("could not create stage '{name}' ({factory}): {reason}")]
    Creation {
        factory: String,
        name: String,
        reason: String,
    },

    #[error("could not link '{upstream}' to '{downstream}': {reason}")]
    Link {
        upstream: String,
        downstream: String,
        reason: LinkFailure,
    },

    /// A textual pipeline description could not be turned into a graph.
    #[error("could not parse pipeline description: {0}")]
    Parse(String),

    /// Raised by the engine while bringing the graph up or while it runs.
    #[error("runtime error from '{origin}': {message}")]
    Runtime { origin: String, message: String },

    #[error("no stage named '{0}'")]
    NoSuchStage(String),

    #[error("stage '{stage}' has no port named '{port}'")]
    NoSuchPort { stage: String, port: String },

    #[error("a stage named '{0}' already exists")]
    DuplicateStage(String),

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: SupervisorState,
    },
}

impl PipelineError {
    pub(crate) fn creation(factory: &str, name: &str, reason: impl Into<String>) -> Self {
        PipelineError::Creation {
            factory: factory.to_owned(),
            name: name.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn link(upstream: &str, downstream: &str, reason: LinkFailure) -> Self {
        PipelineError::Link {
            upstream: upstream.to_owned(),
            downstream: downstream.to_owned(),
            reason,
        }
    }

    /// True for errors raised while assembling a graph, before anything ran.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            PipelineError::Creation { .. }
                | PipelineError::Link { .. }
                | PipelineError::Parse(_)
                | PipelineError::DuplicateStage(_)
        )
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
