//! Unified error types surfaced by the runtime API.
//!
//! Engine-level failures (charges, formulas, scripts) are wrapped next to
//! host persistence failures so callers bubble everything up with
//! consistent context. Recoverable degradations never appear here; they
//! travel as warning lists on pass results.

use thiserror::Error;

use srd35_core::model::{ActorId, ItemId};

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("actor {0} is not managed by this service")]
    UnknownActor(ActorId),

    #[error("item {item} not found on actor {actor}")]
    UnknownItem { actor: ActorId, item: ItemId },

    #[error("no permission to modify actor {0}")]
    PermissionDenied(ActorId),

    #[error("psionic focus required to activate {0}")]
    PsionicFocusRequired(String),

    #[error(transparent)]
    Resource(#[from] srd35_core::ResourceError),

    #[error("document store: {0}")]
    Store(#[source] HostError),

    #[error("compendium entry `{0}` not found")]
    MissingCompendiumEntry(String),
}

/// Failure reported by a host adapter.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HostError {
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
