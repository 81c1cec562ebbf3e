//! Latent anchors and A/B interpolation.
//!
//! The user steers generation with two anchor points in the model's latent
//! space and a mix coefficient between them. Anchors are immutable
//! [`LatentVector`]s that are replaced wholesale, never patched in place.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// A fixed-length point in the model's latent space.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentVector(Arc<[f32]>);

impl LatentVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(Arc::from(values.into_boxed_slice()))
    }

    #[cfg(test)]
    pub fn zeros(dim: usize) -> Self {
        Self::new(vec![0.0; dim])
    }

    /// Draws every component independently from the standard normal distribution.
    pub fn random<R: Rng>(rng: &mut R, dim: usize) -> Self {
        Self::new((0..dim).map(|_| rng.sample::<f32, _>(StandardNormal)).collect())
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Elementwise `(1 - mix) * a + mix * b`.
    ///
    /// The endpoints are returned unchanged so that `mix` of exactly 0 or 1
    /// reproduces the anchor bit for bit.
    pub fn lerp(a: &LatentVector, b: &LatentVector, mix: f32) -> LatentVector {
        debug_assert_eq!(a.dim(), b.dim());
        if mix <= 0.0 {
            return a.clone();
        }
        if mix >= 1.0 {
            return b.clone();
        }

        let values = a
            .0
            .iter()
            .zip(b.0.iter())
            .map(|(&x, &y)| (1.0 - mix) * x + mix * y)
            .collect();
        LatentVector::new(values)
    }
}

impl From<Vec<f32>> for LatentVector {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Which of the two anchors an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    A,
    B,
}

/// Two latent anchors, the mix between them, and the dirty flag that tells the
/// controller a new pattern is needed.
#[derive(Debug)]
pub struct LatentState {
    dim: usize,
    anchor_a: Option<LatentVector>,
    anchor_b: Option<LatentVector>,
    mix: f32,
    dirty: bool,
    rng: StdRng,
}

impl LatentState {
    /// Creates an uninitialized state. With a seed, the anchor draws are reproducible.
    pub fn new(dim: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            dim,
            anchor_a: None,
            anchor_b: None,
            mix: 0.0,
            dirty: false,
            rng,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    pub fn anchor(&self, anchor: Anchor) -> Option<&LatentVector> {
        match anchor {
            Anchor::A => self.anchor_a.as_ref(),
            Anchor::B => self.anchor_b.as_ref(),
        }
    }

    /// Assigns a fresh random draw to every unset anchor.
    ///
    /// Returns `true` if any anchor was assigned.
    pub fn ensure_initialized(&mut self) -> bool {
        let mut assigned = false;
        if self.anchor_a.is_none() {
            self.anchor_a = Some(LatentVector::random(&mut self.rng, self.dim));
            assigned = true;
        }
        if self.anchor_b.is_none() {
            self.anchor_b = Some(LatentVector::random(&mut self.rng, self.dim));
            assigned = true;
        }
        assigned
    }

    pub fn randomize_a(&mut self) {
        self.randomize(Anchor::A);
    }

    pub fn randomize_b(&mut self) {
        self.randomize(Anchor::B);
    }

    /// Replaces one anchor with a new random draw and marks the state dirty.
    fn randomize(&mut self, anchor: Anchor) {
        let draw = LatentVector::random(&mut self.rng, self.dim);
        match anchor {
            Anchor::A => self.anchor_a = Some(draw),
            Anchor::B => self.anchor_b = Some(draw),
        }
        self.dirty = true;
    }

    /// Sets the mix coefficient, clamped to `[0, 1]`.
    ///
    /// Returns `true` (and marks the state dirty) only if the stored value changed.
    /// Non-finite values are ignored.
    pub fn set_mix(&mut self, value: f32) -> bool {
        if !value.is_finite() {
            log::warn!("ignoring non-finite mix value {value}");
            return false;
        }

        let clamped = value.clamp(0.0, 1.0);
        if clamped == self.mix {
            return false;
        }
        self.mix = clamped;
        self.dirty = true;
        true
    }

    /// Replaces whichever anchors the preset provides.
    ///
    /// Always marks the state dirty, even when the recalled values equal the
    /// current ones. Anchors whose length does not match the state's
    /// dimension are skipped.
    pub fn load_from_preset(&mut self, anchor_a: Option<LatentVector>, anchor_b: Option<LatentVector>) {
        if let Some(a) = anchor_a {
            if a.dim() == self.dim {
                self.anchor_a = Some(a);
            } else {
                log::warn!(
                    "preset anchor A has {} dimensions, expected {}; keeping current",
                    a.dim(),
                    self.dim
                );
            }
        }
        if let Some(b) = anchor_b {
            if b.dim() == self.dim {
                self.anchor_b = Some(b);
            } else {
                log::warn!(
                    "preset anchor B has {} dimensions, expected {}; keeping current",
                    b.dim(),
                    self.dim
                );
            }
        }
        self.dirty = true;
    }

    /// The latent vector between the two anchors at the current mix.
    ///
    /// Returns `None` until both anchors are initialized.
    pub fn interpolate(&self) -> Option<LatentVector> {
        let a = self.anchor_a.as_ref()?;
        let b = self.anchor_b.as_ref()?;
        Some(LatentVector::lerp(a, b, self.mix))
    }

    /// Returns the accumulated dirty flag and clears it.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized(seed: u64) -> LatentState {
        let mut state = LatentState::new(8, Some(seed));
        state.ensure_initialized();
        state
    }

    #[test]
    fn test_anchors_are_lazily_initialized() {
        let mut state = LatentState::new(8, Some(1));
        assert!(state.anchor(Anchor::A).is_none());
        assert!(state.interpolate().is_none());

        assert!(state.ensure_initialized());
        assert!(state.anchor(Anchor::B).is_some());
        assert_eq!(state.anchor(Anchor::A).unwrap().dim(), 8);
        assert_ne!(state.anchor(Anchor::A), state.anchor(Anchor::B));
    }

    #[test]
    fn test_ensure_initialized_is_idempotent() {
        let mut state = initialized(2);
        let a = state.anchor(Anchor::A).cloned();
        let b = state.anchor(Anchor::B).cloned();

        assert!(!state.ensure_initialized());
        assert_eq!(state.anchor(Anchor::A).cloned(), a);
        assert_eq!(state.anchor(Anchor::B).cloned(), b);
        assert!(!state.take_dirty());
    }

    #[test]
    fn test_seeded_states_draw_identical_anchors() {
        let first = initialized(7);
        let second = initialized(7);
        assert_eq!(first.anchor(Anchor::A), second.anchor(Anchor::A));
        assert_eq!(first.anchor(Anchor::B), second.anchor(Anchor::B));
    }

    #[test]
    fn test_interpolate_endpoints_return_anchors() {
        let mut state = initialized(3);

        state.set_mix(0.0);
        assert_eq!(state.interpolate().as_ref(), state.anchor(Anchor::A));

        state.set_mix(1.0);
        assert_eq!(state.interpolate().as_ref(), state.anchor(Anchor::B));
    }

    #[test]
    fn test_interpolate_midpoint() {
        let mut state = LatentState::new(3, None);
        state.load_from_preset(
            Some(LatentVector::new(vec![0.0, 2.0, -4.0])),
            Some(LatentVector::new(vec![1.0, 4.0, 4.0])),
        );
        state.set_mix(0.5);

        let latent = state.interpolate().unwrap();
        assert_eq!(latent.as_slice(), &[0.5, 3.0, 0.0]);
    }

    #[test]
    fn test_set_mix_clamps() {
        let mut state = initialized(4);

        state.set_mix(-1.0);
        assert_eq!(state.mix(), 0.0);

        state.set_mix(2.0);
        assert_eq!(state.mix(), 1.0);
    }

    #[test]
    fn test_set_mix_marks_dirty_only_on_change() {
        let mut state = initialized(5);

        // Already at 0.0 after clamping.
        assert!(!state.set_mix(-3.0));
        assert!(!state.take_dirty());

        assert!(state.set_mix(0.25));
        assert!(state.take_dirty());
        assert!(!state.set_mix(0.25));
        assert!(!state.take_dirty());

        assert!(!state.set_mix(f32::NAN));
        assert_eq!(state.mix(), 0.25);
    }

    #[test]
    fn test_randomize_replaces_one_anchor() {
        let mut state = initialized(6);
        let a = state.anchor(Anchor::A).cloned();
        let b = state.anchor(Anchor::B).cloned();

        state.randomize_b();
        assert_eq!(state.anchor(Anchor::A).cloned(), a);
        assert_ne!(state.anchor(Anchor::B).cloned(), b);
        assert!(state.take_dirty());

        state.randomize_a();
        assert_ne!(state.anchor(Anchor::A).cloned(), a);
        assert!(state.take_dirty());
    }

    #[test]
    fn test_preset_load_marks_dirty_even_with_equal_values() {
        let mut state = initialized(8);
        let a = state.anchor(Anchor::A).cloned();
        let b = state.anchor(Anchor::B).cloned();

        state.load_from_preset(a.clone(), b.clone());
        assert!(state.take_dirty());
        assert_eq!(state.anchor(Anchor::A).cloned(), a);
        assert_eq!(state.anchor(Anchor::B).cloned(), b);
    }

    #[test]
    fn test_preset_load_skips_missing_and_mismatched_anchors() {
        let mut state = initialized(9);
        let a = state.anchor(Anchor::A).cloned();
        let b = state.anchor(Anchor::B).cloned();

        state.load_from_preset(None, Some(LatentVector::zeros(3)));
        assert_eq!(state.anchor(Anchor::A).cloned(), a);
        assert_eq!(state.anchor(Anchor::B).cloned(), b);
        assert!(state.take_dirty());

        state.load_from_preset(None, Some(LatentVector::zeros(8)));
        assert_eq!(state.anchor(Anchor::B), Some(&LatentVector::zeros(8)));
    }
}
