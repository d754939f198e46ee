use thiserror::Error;

use crate::format::Format;

/// The only expected failure mode of a renderer: a technique is missing a
/// field the target dialect requires. Collected per `(technique, format)`
/// pair by the engine; never aborts a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("technique {id} has no tactics; {format} requires at least one")]
    MissingTactics { id: String, format: Format },

    #[error("technique {id} has an empty name")]
    MissingName { id: String },
}

pub type Result<T> = std::result::Result<T, RenderError>;
