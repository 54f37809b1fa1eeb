use thiserror::Error;

/// Errors raised while setting up or launching a run.
///
/// Sampling itself cannot fail; everything here happens before the first batch.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to seed random source from OS entropy: {0}")]
    Entropy(#[from] rand::Error),

    #[error("Scripted point source needs at least one point")]
    EmptyScript,

    #[error("Scripted coordinate {0} lies outside [0, 1)")]
    ScriptOutOfRange(f64),

    #[error("Failed to spawn run thread: {0}")]
    Spawn(#[from] std::io::Error),
}
