//! Deployment Module
//!
//! This module turns host events into generated drum patterns and publishes
//! them to the playback side. It is organized into sub-modules, each with a
//! specific responsibility:
//!
//! - [`constants`]: Grid dimensions and default settings
//! - [`errors`]: Deployment-specific error types
//! - [`config`]: Session configuration
//! - [`params`]: Host parameter identifiers and per-event snapshots
//! - [`latent`]: Latent anchors, mix and the dirty flag
//! - [`voice_map`]: Drum voice to MIDI note assignment
//! - [`model`]: Inference contract and lazy model loading
//! - [`torch_model`]: TorchScript backend for the inference contract
//! - [`pattern`]: Decoding inference grids into note events
//! - [`policy`]: Playback scheduling metadata
//! - [`presets`]: Preset tensor storage for the latent anchors
//! - [`controller`]: Per-event deploy logic over an explicit session
//! - [`publish`]: Ring buffer hand-off to the playback thread
//! - [`midi`]: Standard MIDI File export
//!
//! The main [`DeploymentEngine`] struct wires these together behind a
//! high-level interface for Python.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use env_logger::{Builder, Env};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::deployment::config::DeploymentConfig;
use crate::deployment::constants::MAX_LOOP_BARS;
use crate::deployment::controller::{DeployEvent, DeployReport, DeploymentController, SessionState};
use crate::deployment::errors::PublishError;
use crate::deployment::latent::LatentVector;
use crate::deployment::model::{ModelStore, SamplingMode};
use crate::deployment::params::ParameterSnapshot;
use crate::deployment::pattern::EmptyPatternPolicy;
use crate::deployment::policy::{OverwriteMode, PlaybackPolicy, TimeAnchor, TimeUnit};
use crate::deployment::presets::{MemoryPresetStore, PresetKey, PresetStore};
use crate::deployment::publish::{ArtifactPublisher, ArtifactReceiver, artifact_channel};
use crate::deployment::torch_model::TorchScriptStore;
use crate::messages::ArtifactMessage;

pub mod config;
pub mod constants;
pub mod controller;
pub mod errors;
pub mod latent;
pub mod midi;
pub mod model;
pub mod params;
pub mod pattern;
pub mod policy;
pub mod presets;
pub mod publish;
pub mod torch_model;
pub mod voice_map;

/// Setup logging with env_logger
pub fn setup_logger() {
    // Users can raise verbosity via `RUST_LOG`, e.g. `RUST_LOG=debug`.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(()); // Ignore initialization errors
}

/// DeploymentEngine generates drum patterns from a latent model on host events
#[pyclass]
pub struct DeploymentEngine {
    controller: DeploymentController,
    session: SessionState,
    presets: MemoryPresetStore,
    publisher: Mutex<ArtifactPublisher>,
    receiver: Mutex<ArtifactReceiver>,
    /// Changes the session holds that have not reached the ring yet.
    unpublished: DeployReport,
}

impl DeploymentEngine {
    pub(crate) fn with_store(store: Box<dyn ModelStore>, config: &DeploymentConfig) -> Self {
        let (publisher, receiver) = artifact_channel(config.artifact_queue_capacity);
        Self {
            controller: DeploymentController::new(store, config),
            session: SessionState::from_config(config),
            presets: MemoryPresetStore::new(),
            publisher: Mutex::new(publisher),
            receiver: Mutex::new(receiver),
            unpublished: DeployReport::UNCHANGED,
        }
    }

    fn handle_event(
        &mut self,
        gui_params_changed: bool,
        preset_loaded: bool,
        params: &ParameterSnapshot,
    ) -> Result<(bool, bool), PublishError> {
        let report = self.controller.deploy(
            &mut self.session,
            &DeployEvent {
                preset_loaded,
                gui_params_changed,
                params,
            },
            &mut self.presets,
        );

        // Changes left over from a full ring go out with this event.
        let report = self.unpublished.merge(report);
        if report.any() {
            let publisher = self.publisher.get_mut().unwrap_or_else(|e| e.into_inner());
            if let Err(err) = publisher.publish(report, &self.session) {
                self.unpublished = report;
                return Err(err);
            }
        }
        self.unpublished = DeployReport::UNCHANGED;
        Ok(report.as_host_flags())
    }

    /// Retries publishing changes a full ring rejected earlier.
    fn flush_unpublished(&mut self) {
        if !self.unpublished.any() {
            return;
        }
        let publisher = self.publisher.get_mut().unwrap_or_else(|e| e.into_inner());
        if publisher.publish(self.unpublished, &self.session).is_ok() {
            log::debug!("Published deferred artifacts");
            self.unpublished = DeployReport::UNCHANGED;
        }
    }

    fn next_artifact(&mut self) -> Option<ArtifactMessage> {
        let message = self
            .receiver
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .pop();
        self.flush_unpublished();
        message.or_else(|| {
            self.receiver
                .get_mut()
                .unwrap_or_else(|e| e.into_inner())
                .pop()
        })
    }
}

#[pymethods]
impl DeploymentEngine {
    /// Create a new DeploymentEngine. The model is loaded on the first event.
    #[new]
    #[pyo3(signature = (
        model_path = None,
        seed = None,
        loop_bars = None,
        temperature = None,
        stochastic = false,
        clear_on_empty = false,
    ))]
    pub fn new(
        model_path: Option<String>,
        seed: Option<u64>,
        loop_bars: Option<u32>,
        temperature: Option<f32>,
        stochastic: bool,
        clear_on_empty: bool,
    ) -> PyResult<Self> {
        setup_logger();

        let mut config = DeploymentConfig::default();
        if let Some(path) = model_path {
            config = config.with_model_path(path);
        }
        if let Some(seed) = seed {
            config = config.with_seed(seed);
        }
        if let Some(bars) = loop_bars {
            if bars > MAX_LOOP_BARS {
                return Err(PyValueError::new_err(format!(
                    "loop_bars out of range (expected 0..={MAX_LOOP_BARS}, got {bars})"
                )));
            }
            config.loop_bars = bars;
        }
        if let Some(temperature) = temperature {
            if !temperature.is_finite() || temperature <= 0.0 {
                return Err(PyValueError::new_err(format!(
                    "temperature must be positive (got {temperature})"
                )));
            }
            config.temperature = temperature;
        }
        if stochastic {
            config.sampling_mode = SamplingMode::Stochastic;
        }
        if clear_on_empty {
            config.empty_pattern_policy = EmptyPatternPolicy::Clear;
        }

        log::info!(
            "Deployment engine created (model: {}, loop bars: {})",
            config.model_path.display(),
            config.loop_bars
        );
        Ok(Self::with_store(Box::new(TorchScriptStore), &config))
    }

    /// Handle one host event and publish any regenerated artifacts.
    ///
    /// Returns `(policy_changed, sequence_changed)`.
    #[pyo3(signature = (gui_params_changed, preset_loaded, clicked = Vec::new(), updated = HashMap::new()))]
    pub fn deploy(
        &mut self,
        gui_params_changed: bool,
        preset_loaded: bool,
        clicked: Vec<String>,
        updated: HashMap<String, f32>,
    ) -> PyResult<(bool, bool)> {
        let params = ParameterSnapshot::from_host(
            clicked.iter().map(String::as_str),
            updated.iter().map(|(name, value)| (name.as_str(), *value)),
        );

        self.handle_event(gui_params_changed, preset_loaded, &params)
            .map_err(|e| {
                PyRuntimeError::new_err(format!(
                    "Failed to publish artifacts (buffer may be full): {e}"
                ))
            })
    }

    /// Take the next published artifact, or `None` when nothing is pending.
    ///
    /// Changes a full ring rejected earlier are queued as soon as there is room.
    pub fn poll_artifact(&mut self, py: Python<'_>) -> PyResult<Option<Py<PyAny>>> {
        let Some(message) = self.next_artifact() else {
            return Ok(None);
        };

        let dict = PyDict::new(py);
        match message {
            ArtifactMessage::Policy(policy) => {
                dict.set_item("type", "policy")?;
                dict.set_item("anchor", anchor_name(&policy))?;
                dict.set_item("time_unit", time_unit_name(&policy))?;
                dict.set_item("overwrite", overwrite_name(&policy))?;
                dict.set_item("loop_bars", policy.loop_bars)?;
                dict.set_item("loop_quarter_notes", policy.loop_quarter_notes())?;
            }
            ArtifactMessage::Sequence(sequence) => {
                let events: Vec<(u8, u8, f32, f32, f32)> = sequence
                    .events()
                    .iter()
                    .map(|e| (e.channel, e.note, e.velocity, e.start, e.duration))
                    .collect();
                dict.set_item("type", "sequence")?;
                dict.set_item("events", events)?;
            }
        }
        Ok(Some(dict.into_any().unbind()))
    }

    /// Read a latent anchor from the session preset (`"latent_A"` or `"latent_B"`).
    pub fn preset_tensor(&self, key: &str) -> PyResult<Option<Vec<f32>>> {
        let key = parse_preset_key(key)?;
        Ok(self.presets.tensor(key).map(|v| v.as_slice().to_vec()))
    }

    /// Store a latent anchor in the session preset. Applied on the next
    /// event with `preset_loaded` set.
    pub fn set_preset_tensor(&mut self, key: &str, values: Vec<f32>) -> PyResult<()> {
        let key = parse_preset_key(key)?;
        self.presets.set_tensor(key, LatentVector::from(values));
        Ok(())
    }

    /// Write the current sequence as a Standard MIDI File.
    pub fn export_midi(&self, path: String) -> PyResult<()> {
        midi::write_midi(
            self.session.sequence(),
            self.controller.pattern_length(),
            Path::new(&path),
        )
        .map_err(|e| PyRuntimeError::new_err(format!("Failed to export MIDI: {e}")))
    }

    /// Current interpolation position between the two anchors.
    pub fn mix(&self) -> f32 {
        self.session.latent.mix()
    }

    /// MIDI notes currently assigned to each drum voice.
    pub fn voice_notes(&self) -> Vec<u8> {
        self.session.voice_map.notes().to_vec()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.controller.is_model_loaded()
    }
}

fn parse_preset_key(key: &str) -> PyResult<PresetKey> {
    PresetKey::parse(key).ok_or_else(|| {
        PyValueError::new_err(format!(
            "unknown preset key {key:?} (expected \"latent_A\" or \"latent_B\")"
        ))
    })
}

fn anchor_name(policy: &PlaybackPolicy) -> &'static str {
    match policy.anchor {
        TimeAnchor::RelativeToPlaybackStart => "relative_to_playback_start",
        TimeAnchor::Absolute => "absolute",
    }
}

fn time_unit_name(policy: &PlaybackPolicy) -> &'static str {
    match policy.time_unit {
        TimeUnit::Ppq => "ppq",
        TimeUnit::Seconds => "seconds",
    }
}

fn overwrite_name(policy: &PlaybackPolicy) -> &'static str {
    match policy.overwrite {
        OverwriteMode::ReplaceAll => "replace_all",
        OverwriteMode::Merge => "merge",
    }
}
