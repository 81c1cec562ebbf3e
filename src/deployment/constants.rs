//! Model contract constants and deployment defaults.

/// Number of time steps the model generates per pattern (two bars of 16th notes).
pub const NUM_STEPS: usize = 32;

/// Number of drum voices (model output channels).
pub const NUM_VOICES: usize = 9;

/// Dimensionality of the model's latent space.
pub const LATENT_DIM: usize = 128;

/// Default model artifact, resolved relative to the host's working directory.
pub const DEFAULT_MODEL_PATH: &str = "drumLoopVAE.pt";

/// Default per-voice hit threshold passed to the model.
pub const DEFAULT_VOICE_THRESHOLD: f32 = 0.5;

/// Default per-voice maximum number of hits passed to the model.
pub const DEFAULT_MAX_COUNT: f32 = 32.0;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Hits strictly above this score become note events.
pub const DEFAULT_ACTIVATION_THRESHOLD: f32 = 0.5;

/// Length of one step in quarter notes (16th-note grid).
pub const DEFAULT_STEP_DURATION: f32 = 0.25;

/// Fixed length of every emitted note in quarter notes.
pub const DEFAULT_NOTE_DURATION: f32 = 0.1;

/// Loop length of the playback policy.
pub const DEFAULT_LOOP_BARS: u32 = 8;

/// Longest accepted loop in bars.
pub const MAX_LOOP_BARS: u32 = 1024;

/// Quarter notes per bar, used when converting the loop length.
pub const BEATS_PER_BAR: u32 = 4;

/// Capacity of the artifact ring buffer between the deployment and playback threads.
pub const ARTIFACT_QUEUE_CAPACITY: usize = 16;

/// Minimum allowed sampling temperature.
pub const TEMPERATURE_MIN: f32 = 1e-3;
