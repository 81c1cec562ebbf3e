//! Preset tensor storage.
//!
//! The host owns preset persistence; the deployment only reads and writes the
//! two latent anchors through this narrow keyed interface.

use std::collections::HashMap;

use crate::deployment::latent::{Anchor, LatentVector};

/// Keys of the tensors stored in a preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresetKey {
    LatentA,
    LatentB,
}

impl PresetKey {
    pub fn as_str(self) -> &'static str {
        match self {
            PresetKey::LatentA => "latent_A",
            PresetKey::LatentB => "latent_B",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "latent_A" => Some(PresetKey::LatentA),
            "latent_B" => Some(PresetKey::LatentB),
            _ => None,
        }
    }

    pub fn for_anchor(anchor: Anchor) -> Self {
        match anchor {
            Anchor::A => PresetKey::LatentA,
            Anchor::B => PresetKey::LatentB,
        }
    }
}

/// Keyed tensor access into the host's current preset.
pub trait PresetStore: Send + Sync {
    fn tensor(&self, key: PresetKey) -> Option<LatentVector>;

    fn set_tensor(&mut self, key: PresetKey, value: LatentVector);
}

/// Preset store kept in memory, used when the host syncs tensors explicitly.
#[derive(Debug, Clone, Default)]
pub struct MemoryPresetStore {
    tensors: HashMap<PresetKey, LatentVector>,
}

impl MemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresetStore for MemoryPresetStore {
    fn tensor(&self, key: PresetKey) -> Option<LatentVector> {
        self.tensors.get(&key).cloned()
    }

    fn set_tensor(&mut self, key: PresetKey, value: LatentVector) {
        self.tensors.insert(key, value);
    }
}
