//! Mapping from model voice channels to MIDI note numbers.

use crate::deployment::constants::NUM_VOICES;
use crate::deployment::params::{ParamId, ParameterSource};

/// Drum voices in the model's output channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrumVoice {
    Kick = 0,
    Snare = 1,
    ClosedHat = 2,
    OpenHat = 3,
    LowTom = 4,
    MidTom = 5,
    HighTom = 6,
    Crash = 7,
    Ride = 8,
}

impl DrumVoice {
    pub const ALL: [DrumVoice; NUM_VOICES] = [
        DrumVoice::Kick,
        DrumVoice::Snare,
        DrumVoice::ClosedHat,
        DrumVoice::OpenHat,
        DrumVoice::LowTom,
        DrumVoice::MidTom,
        DrumVoice::HighTom,
        DrumVoice::Crash,
        DrumVoice::Ride,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The host parameter that selects this voice's note.
    pub fn param(self) -> ParamId {
        match self {
            DrumVoice::Kick => ParamId::Kick,
            DrumVoice::Snare => ParamId::Snare,
            DrumVoice::ClosedHat => ParamId::ClosedHat,
            DrumVoice::OpenHat => ParamId::OpenHat,
            DrumVoice::LowTom => ParamId::LowTom,
            DrumVoice::MidTom => ParamId::MidTom,
            DrumVoice::HighTom => ParamId::HighTom,
            DrumVoice::Crash => ParamId::Crash,
            DrumVoice::Ride => ParamId::Ride,
        }
    }

    /// General MIDI percussion note for this voice.
    pub fn gm_note(self) -> u8 {
        match self {
            DrumVoice::Kick => 36,
            DrumVoice::Snare => 38,
            DrumVoice::ClosedHat => 42,
            DrumVoice::OpenHat => 46,
            DrumVoice::LowTom => 43,
            DrumVoice::MidTom => 47,
            DrumVoice::HighTom => 50,
            DrumVoice::Crash => 49,
            DrumVoice::Ride => 51,
        }
    }
}

/// Note number assigned to each voice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceMap {
    notes: [u8; NUM_VOICES],
}

impl Default for VoiceMap {
    fn default() -> Self {
        Self {
            notes: DrumVoice::ALL.map(DrumVoice::gm_note),
        }
    }
}

impl VoiceMap {
    pub fn new(notes: [u8; NUM_VOICES]) -> Self {
        Self { notes }
    }

    /// Note for a voice channel index.
    ///
    /// # Panics
    ///
    /// Panics if `voice >= NUM_VOICES`. Callers iterate model channels, so an
    /// out-of-range index means the model and the voice list disagree.
    pub fn note(&self, voice: usize) -> u8 {
        self.notes[voice]
    }

    pub fn note_for(&self, voice: DrumVoice) -> u8 {
        self.note(voice.index())
    }

    pub fn notes(&self) -> &[u8; NUM_VOICES] {
        &self.notes
    }

    pub fn set(&mut self, voice: DrumVoice, note: u8) -> bool {
        let slot = &mut self.notes[voice.index()];
        if *slot == note {
            return false;
        }
        *slot = note;
        true
    }

    /// Applies every voice selector the host reported as updated.
    ///
    /// Returns `true` if any voice now maps to a different note.
    pub fn update(&mut self, params: &impl ParameterSource) -> bool {
        let mut changed = false;
        for voice in DrumVoice::ALL {
            let param = voice.param();
            if !params.was_param_updated(param) {
                continue;
            }
            let Some(value) = params.value_for(param) else {
                continue;
            };
            if !value.is_finite() {
                log::warn!("ignoring non-finite note for {}: {value}", param.name());
                continue;
            }
            changed |= self.set(voice, value.clamp(0.0, 127.0) as u8);
        }
        changed
    }
}
