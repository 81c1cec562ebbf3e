//! Deployment-specific error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading the generative model.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// The model artifact does not exist.
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The artifact exists but could not be loaded as a model.
    #[error("failed to load model {}: {reason}", .path.display())]
    Malformed {
        /// Path of the rejected artifact.
        path: PathBuf,
        /// Loader message.
        reason: String,
    },
}

/// Violations of the model's declared input/output contract.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InferenceContractError {
    /// The `sample` entry point raised or could not be called.
    #[error("model invocation failed: {0}")]
    Invocation(String),

    /// The model did not return a `(hits, velocities, offsets)` tuple.
    #[error("expected a 3-tuple of tensors from the model: {0}")]
    Arity(String),

    /// An output grid has an unsupported rank.
    #[error("{grid} has rank {rank}, expected [batch, steps, voices] or [steps, voices]")]
    Rank {
        /// Name of the offending grid.
        grid: &'static str,
        /// Rank that was returned.
        rank: usize,
    },

    /// An output grid has the wrong number of time steps.
    #[error("{grid} has {actual} steps, expected {expected}")]
    StepCount {
        grid: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An output grid has the wrong number of voices.
    #[error("{grid} has {actual} voices, expected {expected}")]
    VoiceCount {
        grid: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The three grids disagree on their step count.
    #[error("output grids disagree on step count (hits {hits}, velocities {velocities}, offsets {offsets})")]
    MismatchedSteps {
        hits: usize,
        velocities: usize,
        offsets: usize,
    },
}

/// Errors that abort a single regeneration attempt.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    Contract(#[from] InferenceContractError),

    /// Regeneration was requested before the model was loaded.
    #[error("model is not loaded")]
    ModelNotLoaded,

    /// Interpolation was requested before the latent anchors were initialized.
    #[error("latent anchors are not initialized")]
    Uninitialized,
}

/// Errors raised when handing artifacts to the playback side.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    /// The ring buffer has no free slot; the consumer is not keeping up.
    #[error("artifact queue is full")]
    Full,
}

/// Errors that can occur while exporting a sequence as a MIDI file.
#[derive(Debug, Error)]
pub enum MidiExportError {
    /// Failed to write the output file.
    #[error("failed to write MIDI file: {0}")]
    Io(#[from] std::io::Error),

    /// The sequence is too long to encode.
    #[error("sequence spans {0} ticks, which exceeds the MIDI delta-time range")]
    TooLong(u64),
}
