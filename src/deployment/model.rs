//! The generative model seam.
//!
//! The model is an opaque function with a fixed contract:
//!
//! ```text
//! sample(latent, voice_thresholds, voice_max_counts, sampling_mode, temperature)
//!     -> (hits, velocities, offsets)
//! ```
//!
//! Each output is a `NUM_STEPS x NUM_VOICES` grid. The voice dimension is part
//! of the type; the step count is checked when [`InferenceOutputs`] is built.

use std::path::{Path, PathBuf};

use crate::deployment::constants::{NUM_STEPS, NUM_VOICES};
use crate::deployment::errors::{DeployError, InferenceContractError, ModelLoadError};
use crate::deployment::latent::LatentVector;

/// How the model turns probabilities into hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// Deterministic thresholding; identical inputs give identical outputs.
    #[default]
    Greedy,
    /// Stochastic sampling; identical inputs may give different outputs.
    Stochastic,
}

impl SamplingMode {
    /// Integer code passed to the model's `sample` entry point.
    pub fn as_model_arg(self) -> i64 {
        match self {
            SamplingMode::Greedy => 0,
            SamplingMode::Stochastic => 1,
        }
    }
}

/// Arguments of one `sample` call.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceInputs {
    pub latent: LatentVector,
    pub voice_thresholds: [f32; NUM_VOICES],
    pub voice_max_counts: [f32; NUM_VOICES],
    pub sampling_mode: SamplingMode,
    pub temperature: f32,
}

/// One row per time step, one column per voice.
pub type StepGrid = Vec<[f32; NUM_VOICES]>;

/// The three grids returned by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutputs {
    hits: StepGrid,
    velocities: StepGrid,
    offsets: StepGrid,
}

impl InferenceOutputs {
    /// Validates the step count of all three grids.
    ///
    /// Grids must all have `NUM_STEPS` rows, or all be empty (a degenerate
    /// result that decodes to nothing).
    pub fn new(
        hits: StepGrid,
        velocities: StepGrid,
        offsets: StepGrid,
    ) -> Result<Self, InferenceContractError> {
        let (h, v, o) = (hits.len(), velocities.len(), offsets.len());
        if h != v || h != o {
            return Err(InferenceContractError::MismatchedSteps {
                hits: h,
                velocities: v,
                offsets: o,
            });
        }
        if h != 0 && h != NUM_STEPS {
            return Err(InferenceContractError::StepCount {
                grid: "hits",
                expected: NUM_STEPS,
                actual: h,
            });
        }

        Ok(Self {
            hits,
            velocities,
            offsets,
        })
    }

    #[cfg(test)]
    pub fn empty() -> Self {
        Self {
            hits: Vec::new(),
            velocities: Vec::new(),
            offsets: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn hits(&self) -> &[[f32; NUM_VOICES]] {
        &self.hits
    }

    pub fn velocities(&self) -> &[[f32; NUM_VOICES]] {
        &self.velocities
    }

    pub fn offsets(&self) -> &[[f32; NUM_VOICES]] {
        &self.offsets
    }
}

/// A loaded model that can generate patterns.
pub trait GenerativeModel: Send + Sync {
    fn infer(&self, inputs: &InferenceInputs) -> Result<InferenceOutputs, InferenceContractError>;
}

/// Source of loaded models.
pub trait ModelStore: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn GenerativeModel>, ModelLoadError>;
}

/// Holds the model once it has been loaded and retries loading lazily until then.
pub struct ModelSlot {
    store: Box<dyn ModelStore>,
    path: PathBuf,
    model: Option<Box<dyn GenerativeModel>>,
}

impl ModelSlot {
    pub fn new(store: Box<dyn ModelStore>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
            model: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Loads the model if it is not loaded yet. A no-op afterwards.
    pub fn load(&mut self) -> Result<(), ModelLoadError> {
        if self.model.is_some() {
            return Ok(());
        }

        let model = self.store.load(&self.path)?;
        log::info!("Loaded model {}", self.path.display());
        self.model = Some(model);
        Ok(())
    }

    pub fn infer(&self, inputs: &InferenceInputs) -> Result<InferenceOutputs, DeployError> {
        let model = self.model.as_ref().ok_or(DeployError::ModelNotLoaded)?;
        Ok(model.infer(inputs)?)
    }
}
