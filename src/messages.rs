//! Message definitions for the hand-off from the deployment thread to playback.
//!
//! These are the values passed through the ring buffer between the
//! non-real-time deployment thread and the real-time playback thread.

use std::sync::Arc;

use crate::deployment::pattern::PlaybackSequence;
use crate::deployment::policy::PlaybackPolicy;

/// An artifact published by the deployment thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactMessage {
    /// A new scheduling policy. Always sent before the sequence it applies to.
    Policy(PlaybackPolicy),

    /// A complete replacement sequence.
    ///
    /// Shared so the playback side never clones the event list.
    Sequence(Arc<PlaybackSequence>),
}

impl ArtifactMessage {
    pub fn policy(&self) -> Option<&PlaybackPolicy> {
        match self {
            ArtifactMessage::Policy(policy) => Some(policy),
            _ => None,
        }
    }

    pub fn sequence(&self) -> Option<&PlaybackSequence> {
        match self {
            ArtifactMessage::Sequence(sequence) => Some(sequence),
            _ => None,
        }
    }
}
