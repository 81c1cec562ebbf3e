//! Per-event deployment logic.
//!
//! The host calls [`DeploymentController::deploy`] once per inbound event on a
//! single non-real-time thread. The controller decides whether anything that
//! affects the pattern changed, regenerates if so, and reports which artifacts
//! are new. All mutable session data lives in [`SessionState`], which the host
//! passes in explicitly.

use crate::deployment::config::DeploymentConfig;
use crate::deployment::constants::NUM_VOICES;
use crate::deployment::errors::DeployError;
use crate::deployment::latent::{Anchor, LatentState};
use crate::deployment::model::{InferenceInputs, ModelSlot, ModelStore, SamplingMode};
use crate::deployment::params::{ParamId, ParameterSource};
use crate::deployment::pattern::{EmptyPatternPolicy, PatternExtractor, PlaybackSequence};
use crate::deployment::policy::{PlaybackPolicy, PlaybackPolicyBuilder};
use crate::deployment::presets::{PresetKey, PresetStore};
use crate::deployment::voice_map::VoiceMap;

/// State that persists across events for one deployment session.
#[derive(Debug)]
pub struct SessionState {
    pub latent: LatentState,
    pub voice_map: VoiceMap,
    sequence: PlaybackSequence,
    policy: Option<PlaybackPolicy>,
}

impl SessionState {
    pub fn new(latent_dim: usize, seed: Option<u64>) -> Self {
        Self {
            latent: LatentState::new(latent_dim, seed),
            voice_map: VoiceMap::default(),
            sequence: PlaybackSequence::new(),
            policy: None,
        }
    }

    pub fn from_config(config: &DeploymentConfig) -> Self {
        Self::new(config.latent_dim, config.seed)
    }

    /// The most recently generated sequence.
    pub fn sequence(&self) -> &PlaybackSequence {
        &self.sequence
    }

    /// The most recently built policy, if any pattern was generated yet.
    pub fn policy(&self) -> Option<&PlaybackPolicy> {
        self.policy.as_ref()
    }
}

/// Change signals the host delivers with each event.
#[derive(Debug, Clone, Copy)]
pub struct DeployEvent<'a, P: ParameterSource> {
    /// A preset was recalled since the previous event.
    pub preset_loaded: bool,
    /// Any GUI parameter changed since the previous event.
    pub gui_params_changed: bool,
    pub params: &'a P,
}

/// Which artifacts a deploy call replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub policy_changed: bool,
    pub sequence_changed: bool,
}

impl DeployReport {
    pub const UNCHANGED: DeployReport = DeployReport {
        policy_changed: false,
        sequence_changed: false,
    };

    pub const REGENERATED: DeployReport = DeployReport {
        policy_changed: true,
        sequence_changed: true,
    };

    pub fn any(&self) -> bool {
        self.policy_changed || self.sequence_changed
    }

    /// Artifacts changed by either report.
    pub fn merge(self, other: DeployReport) -> DeployReport {
        DeployReport {
            policy_changed: self.policy_changed || other.policy_changed,
            sequence_changed: self.sequence_changed || other.sequence_changed,
        }
    }

    /// `(new_policy_available, new_sequence_available)`, the order the host expects.
    pub fn as_host_flags(&self) -> (bool, bool) {
        (self.policy_changed, self.sequence_changed)
    }
}

/// Turns host events into regenerated patterns.
pub struct DeploymentController {
    model: ModelSlot,
    extractor: PatternExtractor,
    policy_builder: PlaybackPolicyBuilder,
    voice_thresholds: [f32; NUM_VOICES],
    voice_max_counts: [f32; NUM_VOICES],
    sampling_mode: SamplingMode,
    temperature: f32,
    empty_pattern_policy: EmptyPatternPolicy,
}

impl DeploymentController {
    pub fn new(store: Box<dyn ModelStore>, config: &DeploymentConfig) -> Self {
        Self {
            model: ModelSlot::new(store, config.model_path.clone()),
            extractor: PatternExtractor::new(config.decode),
            policy_builder: PlaybackPolicyBuilder::new(config.loop_bars),
            voice_thresholds: config.voice_thresholds,
            voice_max_counts: config.voice_max_counts,
            sampling_mode: config.sampling_mode,
            temperature: config.effective_temperature(),
            empty_pattern_policy: config.empty_pattern_policy,
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.is_loaded()
    }

    pub fn empty_pattern_policy(&self) -> EmptyPatternPolicy {
        self.empty_pattern_policy
    }

    /// Length of one generated pattern in quarter notes.
    pub fn pattern_length(&self) -> f32 {
        self.extractor.pattern_length()
    }

    /// Handles one host event.
    ///
    /// Nothing in `session` is touched while the model is unavailable; the
    /// load is retried on the next event. A failed regeneration leaves the
    /// previous sequence and policy in place.
    pub fn deploy<P: ParameterSource>(
        &mut self,
        session: &mut SessionState,
        event: &DeployEvent<'_, P>,
        presets: &mut dyn PresetStore,
    ) -> DeployReport {
        if let Err(err) = self.model.load() {
            log::warn!("Model unavailable, skipping event: {err}");
            return DeployReport::UNCHANGED;
        }

        let newly_initialized = session.latent.ensure_initialized();
        let params = event.params;

        if event.preset_loaded {
            session.latent.load_from_preset(
                presets.tensor(PresetKey::LatentA),
                presets.tensor(PresetKey::LatentB),
            );
            log::info!("New preset loaded");
        }

        if newly_initialized {
            backup_anchors(&session.latent, presets);
        }

        if params.was_button_clicked(ParamId::RandomA) {
            session.latent.randomize_a();
            store_anchor(&session.latent, Anchor::A, presets);
            log::info!("Randomized latent A");
        }
        if params.was_button_clicked(ParamId::RandomB) {
            session.latent.randomize_b();
            store_anchor(&session.latent, Anchor::B, presets);
            log::info!("Randomized latent B");
        }

        if params.was_param_updated(ParamId::Interpolate) {
            if let Some(value) = params.value_for(ParamId::Interpolate) {
                session.latent.set_mix(value);
            }
        }

        let should_regenerate = session.latent.take_dirty();
        let voice_map_changed = event.gui_params_changed && session.voice_map.update(params);

        if !should_regenerate && !voice_map_changed {
            return DeployReport::UNCHANGED;
        }

        match self.regenerate(session) {
            Ok(report) => {
                backup_anchors(&session.latent, presets);
                report
            }
            Err(err) => {
                log::error!("Pattern regeneration failed: {err}");
                DeployReport::UNCHANGED
            }
        }
    }

    fn regenerate(&self, session: &mut SessionState) -> Result<DeployReport, DeployError> {
        let latent = session
            .latent
            .interpolate()
            .ok_or(DeployError::Uninitialized)?;

        let inputs = InferenceInputs {
            latent,
            voice_thresholds: self.voice_thresholds,
            voice_max_counts: self.voice_max_counts,
            sampling_mode: self.sampling_mode,
            temperature: self.temperature,
        };

        log::info!("Running inference (mix {:.3})", session.latent.mix());
        let outputs = self.model.infer(&inputs)?;
        if outputs.is_empty() {
            log::debug!("Model returned an empty grid");
        }
        let sequence = self.extractor.decode(&outputs, &session.voice_map);
        if sequence.is_empty() && self.empty_pattern_policy == EmptyPatternPolicy::KeepPrevious {
            log::info!("Model produced no hits, keeping the previous pattern");
            return Ok(DeployReport::UNCHANGED);
        }

        log::debug!("Generated {} note events", sequence.len());
        session.sequence = sequence;
        session.policy = Some(self.policy_builder.build());
        Ok(DeployReport::REGENERATED)
    }
}

fn store_anchor(latent: &LatentState, anchor: Anchor, presets: &mut dyn PresetStore) {
    if let Some(vector) = latent.anchor(anchor) {
        presets.set_tensor(PresetKey::for_anchor(anchor), vector.clone());
    }
}

fn backup_anchors(latent: &LatentState, presets: &mut dyn PresetStore) {
    store_anchor(latent, Anchor::A, presets);
    store_anchor(latent, Anchor::B, presets);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::deployment::constants::TEMPERATURE_MIN;
    use crate::deployment::errors::InferenceContractError;
    use crate::deployment::latent::LatentVector;
    use crate::deployment::model::InferenceOutputs;
    use crate::deployment::model::testing::{FixedModel, StubStore, filled};
    use crate::deployment::params::ParameterSnapshot;
    use crate::deployment::pattern::NoteEvent;
    use crate::deployment::presets::MemoryPresetStore;
    use crate::deployment::voice_map::DrumVoice;

    const DIM: usize = 16;

    fn single_kick() -> InferenceOutputs {
        let mut hits = filled(0.1);
        let mut velocities = filled(0.0);
        hits[0][0] = 0.9;
        velocities[0][0] = 0.7;
        InferenceOutputs::new(hits, velocities, filled(0.0)).unwrap()
    }

    fn silent() -> InferenceOutputs {
        InferenceOutputs::new(filled(0.0), filled(0.0), filled(0.0)).unwrap()
    }

    fn config() -> DeploymentConfig {
        let mut config = DeploymentConfig::default().with_seed(42);
        config.latent_dim = DIM;
        config
    }

    fn setup(model: FixedModel) -> (DeploymentController, SessionState, MemoryPresetStore) {
        let config = config();
        let controller = DeploymentController::new(Box::new(StubStore::new(model)), &config);
        (controller, SessionState::from_config(&config), MemoryPresetStore::new())
    }

    fn event(params: &ParameterSnapshot) -> DeployEvent<'_, ParameterSnapshot> {
        DeployEvent {
            preset_loaded: false,
            gui_params_changed: !params.is_empty(),
            params,
        }
    }

    #[test]
    fn test_idle_event_does_nothing() {
        let model = FixedModel::new(single_kick());
        let calls = model.calls.clone();
        let (mut controller, mut session, mut presets) = setup(model);

        let params = ParameterSnapshot::new();
        let report = controller.deploy(&mut session, &event(&params), &mut presets);

        assert_eq!(report, DeployReport::UNCHANGED);
        assert!(calls.lock().unwrap().is_empty());
        assert!(session.sequence().is_empty());
        assert!(session.policy().is_none());
        // The model loads and the anchors initialize on the first event.
        assert!(controller.is_model_loaded());
        assert!(session.latent.interpolate().is_some());
        assert!(presets.tensor(PresetKey::LatentA).is_some());
    }

    #[test]
    fn test_zero_anchors_single_kick_end_to_end() {
        let model = FixedModel::new(single_kick());
        let calls = model.calls.clone();
        let (mut controller, mut session, mut presets) = setup(model);

        presets.set_tensor(PresetKey::LatentA, LatentVector::zeros(DIM));
        presets.set_tensor(PresetKey::LatentB, LatentVector::zeros(DIM));
        let params = ParameterSnapshot::new().with_update(ParamId::Interpolate, 0.5);
        let report = controller.deploy(
            &mut session,
            &DeployEvent {
                preset_loaded: true,
                gui_params_changed: true,
                params: &params,
            },
            &mut presets,
        );

        assert_eq!(report, DeployReport::REGENERATED);
        assert_eq!(report.as_host_flags(), (true, true));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].latent, LatentVector::zeros(DIM));
        assert_eq!(calls[0].sampling_mode, SamplingMode::Greedy);
        assert_eq!(calls[0].voice_max_counts, [32.0; NUM_VOICES]);

        assert_eq!(
            session.sequence().events(),
            &[NoteEvent {
                channel: 0,
                note: 36,
                velocity: 0.7,
                start: 0.0,
                duration: 0.1,
            }]
        );
        assert_eq!(session.policy().and_then(|p| p.loop_bars), Some(8));
    }

    #[test]
    fn test_report_merge() {
        let policy_only = DeployReport {
            policy_changed: true,
            sequence_changed: false,
        };
        assert_eq!(DeployReport::UNCHANGED.merge(DeployReport::UNCHANGED), DeployReport::UNCHANGED);
        assert_eq!(DeployReport::UNCHANGED.merge(policy_only), policy_only);
        assert_eq!(policy_only.merge(DeployReport::REGENERATED), DeployReport::REGENERATED);
    }

    #[test]
    fn test_configured_sampling_inputs_reach_the_model() {
        let model = FixedModel::new(single_kick());
        let calls = model.calls.clone();

        let mut config = config();
        config.voice_thresholds = [0.3; NUM_VOICES];
        config.voice_thresholds[8] = 0.9;
        config.voice_max_counts = [4.0; NUM_VOICES];
        config.sampling_mode = SamplingMode::Stochastic;
        config.temperature = 0.8;
        let mut controller = DeploymentController::new(Box::new(StubStore::new(model)), &config);
        let mut session = SessionState::from_config(&config);

        let params = ParameterSnapshot::new().with_click(ParamId::RandomB);
        controller.deploy(&mut session, &event(&params), &mut MemoryPresetStore::new());

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].sampling_mode, SamplingMode::Stochastic);
        assert_eq!(calls[0].sampling_mode.as_model_arg(), 1);
        assert_eq!(calls[0].temperature, 0.8);
        assert_eq!(calls[0].voice_thresholds[0], 0.3);
        assert_eq!(calls[0].voice_thresholds[8], 0.9);
        assert_eq!(calls[0].voice_max_counts, [4.0; NUM_VOICES]);
    }

    #[test]
    fn test_non_positive_temperature_is_floored_before_inference() {
        let model = FixedModel::new(single_kick());
        let calls = model.calls.clone();

        let mut config = config();
        config.temperature = 0.0;
        let mut controller = DeploymentController::new(Box::new(StubStore::new(model)), &config);
        let mut session = SessionState::from_config(&config);

        let params = ParameterSnapshot::new().with_click(ParamId::RandomA);
        controller.deploy(&mut session, &event(&params), &mut MemoryPresetStore::new());

        assert_eq!(calls.lock().unwrap()[0].temperature, TEMPERATURE_MIN);
    }

    #[test]
    fn test_preset_load_with_identical_anchors_regenerates() {
        let model = FixedModel::new(single_kick());
        let calls = model.calls.clone();
        let (mut controller, mut session, mut presets) = setup(model);

        let idle = ParameterSnapshot::new();
        controller.deploy(&mut session, &event(&idle), &mut presets);
        let a = session.latent.anchor(Anchor::A).cloned();

        // The store already holds the current anchors.
        let report = controller.deploy(
            &mut session,
            &DeployEvent {
                preset_loaded: true,
                gui_params_changed: false,
                params: &idle,
            },
            &mut presets,
        );

        assert_eq!(report, DeployReport::REGENERATED);
        assert_eq!(session.latent.anchor(Anchor::A).cloned(), a);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_model_load_leaves_session_untouched() {
        let store = StubStore::failing_first(FixedModel::new(single_kick()), 1);
        let attempts = store.attempts.clone();
        let config = config();
        let mut controller = DeploymentController::new(Box::new(store), &config);
        let mut session = SessionState::from_config(&config);
        let mut presets = MemoryPresetStore::new();

        let params = ParameterSnapshot::new()
            .with_click(ParamId::RandomA)
            .with_update(ParamId::Interpolate, 0.7)
            .with_update(ParamId::Kick, 35.0);
        let report = controller.deploy(&mut session, &event(&params), &mut presets);

        assert_eq!(report, DeployReport::UNCHANGED);
        assert!(!controller.is_model_loaded());
        assert!(session.latent.interpolate().is_none());
        assert_eq!(session.latent.mix(), 0.0);
        assert_eq!(session.voice_map, VoiceMap::default());
        assert!(session.sequence().is_empty());
        assert!(session.policy().is_none());
        assert!(presets.tensor(PresetKey::LatentA).is_none());

        // Retried lazily on the next event.
        let report = controller.deploy(&mut session, &event(&params), &mut presets);
        assert_eq!(report, DeployReport::REGENERATED);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(session.voice_map.note_for(DrumVoice::Kick), 35);
    }

    #[test]
    fn test_randomize_updates_preset_and_regenerates() {
        let (mut controller, mut session, mut presets) = setup(FixedModel::new(single_kick()));
        controller.deploy(&mut session, &event(&ParameterSnapshot::new()), &mut presets);
        let before_b = presets.tensor(PresetKey::LatentB);

        let params = ParameterSnapshot::new().with_click(ParamId::RandomB);
        let report = controller.deploy(&mut session, &event(&params), &mut presets);

        assert_eq!(report, DeployReport::REGENERATED);
        let after_b = presets.tensor(PresetKey::LatentB);
        assert_ne!(after_b, before_b);
        assert_eq!(after_b.as_ref(), session.latent.anchor(Anchor::B));
    }

    #[test]
    fn test_unchanged_mix_does_not_regenerate() {
        let model = FixedModel::new(single_kick());
        let calls = model.calls.clone();
        let (mut controller, mut session, mut presets) = setup(model);

        let params = ParameterSnapshot::new().with_update(ParamId::Interpolate, 0.25);
        assert!(controller.deploy(&mut session, &event(&params), &mut presets).any());
        assert!(!controller.deploy(&mut session, &event(&params), &mut presets).any());
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_voice_map_change_requires_gui_flag() {
        let model = FixedModel::new(single_kick());
        let calls = model.calls.clone();
        let (mut controller, mut session, mut presets) = setup(model);

        let params = ParameterSnapshot::new().with_update(ParamId::Kick, 35.0);
        let report = controller.deploy(
            &mut session,
            &DeployEvent {
                preset_loaded: false,
                gui_params_changed: false,
                params: &params,
            },
            &mut presets,
        );
        assert_eq!(report, DeployReport::UNCHANGED);
        assert_eq!(session.voice_map.note_for(DrumVoice::Kick), 36);

        let report = controller.deploy(&mut session, &event(&params), &mut presets);
        assert_eq!(report, DeployReport::REGENERATED);
        assert_eq!(session.sequence().events()[0].note, 35);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_contract_error_keeps_previous_artifacts() {
        let (mut controller, mut session, mut presets) = setup(FixedModel::new(single_kick()));
        let params = ParameterSnapshot::new().with_update(ParamId::Interpolate, 0.5);
        controller.deploy(&mut session, &event(&params), &mut presets);
        let sequence = session.sequence().clone();
        let policy = session.policy().copied();

        let broken = FixedModel::failing(InferenceContractError::VoiceCount {
            grid: "hits",
            expected: NUM_VOICES,
            actual: 8,
        });
        let mut failing = DeploymentController::new(Box::new(StubStore::new(broken)), &config());
        let params = ParameterSnapshot::new().with_update(ParamId::Interpolate, 0.6);
        let report = failing.deploy(&mut session, &event(&params), &mut presets);

        assert_eq!(report, DeployReport::UNCHANGED);
        assert_eq!(session.sequence(), &sequence);
        assert_eq!(session.policy().copied(), policy);
    }

    #[test]
    fn test_empty_pattern_keeps_previous_sequence() {
        let (mut controller, mut session, mut presets) = setup(FixedModel::new(single_kick()));
        let params = ParameterSnapshot::new().with_update(ParamId::Interpolate, 0.5);
        controller.deploy(&mut session, &event(&params), &mut presets);
        assert_eq!(session.sequence().len(), 1);

        let mut quiet = DeploymentController::new(
            Box::new(StubStore::new(FixedModel::new(silent()))),
            &config(),
        );
        let params = ParameterSnapshot::new().with_update(ParamId::Interpolate, 0.6);
        let report = quiet.deploy(&mut session, &event(&params), &mut presets);

        assert_eq!(quiet.empty_pattern_policy(), EmptyPatternPolicy::KeepPrevious);
        assert_eq!(report, DeployReport::UNCHANGED);
        assert_eq!(session.sequence().len(), 1);
        assert!(session.policy().is_some());
    }

    #[test]
    fn test_empty_pattern_clears_when_configured() {
        let (mut controller, mut session, mut presets) = setup(FixedModel::new(single_kick()));
        let params = ParameterSnapshot::new().with_update(ParamId::Interpolate, 0.5);
        controller.deploy(&mut session, &event(&params), &mut presets);

        let mut config = config();
        config.empty_pattern_policy = EmptyPatternPolicy::Clear;
        let mut quiet = DeploymentController::new(
            Box::new(StubStore::new(FixedModel::new(InferenceOutputs::empty()))),
            &config,
        );
        let params = ParameterSnapshot::new().with_update(ParamId::Interpolate, 0.6);
        let report = quiet.deploy(&mut session, &event(&params), &mut presets);

        assert_eq!(report, DeployReport::REGENERATED);
        assert!(session.sequence().is_empty());
    }
}
