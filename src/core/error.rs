use crate::core::state::WizardStep;
use thiserror::Error;

/// Errors that block a wizard action before anything is mutated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("cannot {action} at step {step}")]
    IllegalTransition {
        action: &'static str,
        step: WizardStep,
    },

    #[error("reference image missing for: {}", .0.join(", "))]
    MissingReferenceImages(Vec<String>),

    #[error("unknown scene: {0}")]
    UnknownScene(String),

    #[error("unknown character: {0}")]
    UnknownCharacter(String),

    #[error("scene {scene} has no image in slot {slot}")]
    NoSuchImage { scene: String, slot: usize },

    #[error("script is empty")]
    EmptyScript,

    #[error("no scene has a selected image")]
    NothingSelected,

    #[error("API key is not set. Open Settings to add your Gemini API key.")]
    MissingCredential,
}

/// Rejections of a user-supplied reference image.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("image is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("{0} is not a supported image")]
    NotAnImage(String),

    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
