//! Decoding model output grids into timed note events.

use crate::deployment::constants::{
    DEFAULT_ACTIVATION_THRESHOLD, DEFAULT_NOTE_DURATION, DEFAULT_STEP_DURATION, NUM_STEPS,
};
use crate::deployment::model::InferenceOutputs;
use crate::deployment::voice_map::{DrumVoice, VoiceMap};

/// A single note in a playback sequence. Times are in quarter notes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub channel: u8,
    pub note: u8,
    /// Velocity as returned by the model (0.0 to 1.0).
    pub velocity: f32,
    pub start: f32,
    pub duration: f32,
}

impl NoteEvent {
    pub fn end(&self) -> f32 {
        self.start + self.duration
    }
}

/// Note events in insertion order (step-major, voice-minor).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSequence {
    events: Vec<NoteEvent>,
}

impl PlaybackSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: NoteEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }
}

/// What a regeneration does when the decoded pattern has no notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyPatternPolicy {
    /// Keep the previously published sequence and report it unchanged.
    #[default]
    KeepPrevious,
    /// Publish the empty sequence, silencing the previous pattern.
    Clear,
}

/// Parameters of grid decoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeConfig {
    /// Hits strictly above this score become notes.
    pub activation_threshold: f32,
    /// Length of one grid step in quarter notes.
    pub step_duration: f32,
    /// Length of every emitted note in quarter notes.
    pub note_duration: f32,
    /// Output channel of every emitted note.
    pub channel: u8,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            activation_threshold: DEFAULT_ACTIVATION_THRESHOLD,
            step_duration: DEFAULT_STEP_DURATION,
            note_duration: DEFAULT_NOTE_DURATION,
            channel: 0,
        }
    }
}

/// Turns hit/velocity/offset grids into a [`PlaybackSequence`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PatternExtractor {
    config: DecodeConfig,
}

impl PatternExtractor {
    pub fn new(config: DecodeConfig) -> Self {
        Self { config }
    }

    /// Length of one decoded pattern in quarter notes.
    pub fn pattern_length(&self) -> f32 {
        NUM_STEPS as f32 * self.config.step_duration
    }

    /// Decodes the first (only) pattern of a model result.
    ///
    /// Steps are visited in order and voices within each step, so events for
    /// the same step always appear in voice order.
    pub fn decode(&self, outputs: &InferenceOutputs, voice_map: &VoiceMap) -> PlaybackSequence {
        let config = &self.config;
        let mut sequence = PlaybackSequence::new();

        let rows = outputs
            .hits()
            .iter()
            .zip(outputs.velocities())
            .zip(outputs.offsets());
        for (step, ((hits, velocities), offsets)) in rows.enumerate() {
            for voice in DrumVoice::ALL {
                let v = voice.index();
                if hits[v] <= config.activation_threshold {
                    continue;
                }
                sequence.push(NoteEvent {
                    channel: config.channel,
                    note: voice_map.note_for(voice),
                    velocity: velocities[v],
                    start: (step as f32 + offsets[v]) * config.step_duration,
                    duration: config.note_duration,
                });
            }
        }

        sequence
    }
}
