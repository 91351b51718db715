pub mod export;
pub mod generation;
pub mod llm;
pub mod pacing;
pub mod prompt;
pub mod script;
pub mod setup;
pub mod workflow;
