//! Deployment configuration.

use std::path::PathBuf;

use crate::deployment::constants::{
    ARTIFACT_QUEUE_CAPACITY, DEFAULT_LOOP_BARS, DEFAULT_MAX_COUNT, DEFAULT_MODEL_PATH,
    DEFAULT_TEMPERATURE, DEFAULT_VOICE_THRESHOLD, LATENT_DIM, NUM_VOICES, TEMPERATURE_MIN,
};
use crate::deployment::model::SamplingMode;
use crate::deployment::pattern::{DecodeConfig, EmptyPatternPolicy};

/// Everything a deployment session needs besides the model and the host.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentConfig {
    pub model_path: PathBuf,
    pub latent_dim: usize,
    pub voice_thresholds: [f32; NUM_VOICES],
    pub voice_max_counts: [f32; NUM_VOICES],
    pub sampling_mode: SamplingMode,
    pub temperature: f32,
    pub decode: DecodeConfig,
    pub loop_bars: u32,
    pub empty_pattern_policy: EmptyPatternPolicy,
    /// Seed for anchor draws; `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub artifact_queue_capacity: usize,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            latent_dim: LATENT_DIM,
            voice_thresholds: [DEFAULT_VOICE_THRESHOLD; NUM_VOICES],
            voice_max_counts: [DEFAULT_MAX_COUNT; NUM_VOICES],
            sampling_mode: SamplingMode::Greedy,
            temperature: DEFAULT_TEMPERATURE,
            decode: DecodeConfig::default(),
            loop_bars: DEFAULT_LOOP_BARS,
            empty_pattern_policy: EmptyPatternPolicy::KeepPrevious,
            seed: None,
            artifact_queue_capacity: ARTIFACT_QUEUE_CAPACITY,
        }
    }
}

impl DeploymentConfig {
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Temperature as sent to the model; never below [`TEMPERATURE_MIN`].
    pub fn effective_temperature(&self) -> f32 {
        if self.temperature.is_finite() {
            self.temperature.max(TEMPERATURE_MIN)
        } else {
            DEFAULT_TEMPERATURE
        }
    }
}
