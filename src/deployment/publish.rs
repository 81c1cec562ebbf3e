//! Lock-free hand-off of published artifacts to the playback thread.
//!
//! The deployment thread owns the [`ArtifactPublisher`] and the playback thread
//! owns the [`ArtifactReceiver`]; both ends wrap an `rtrb` single-producer,
//! single-consumer ring buffer.

use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::deployment::controller::{DeployReport, SessionState};
use crate::deployment::errors::PublishError;
use crate::messages::ArtifactMessage;

/// Creates a connected publisher/receiver pair.
pub fn artifact_channel(capacity: usize) -> (ArtifactPublisher, ArtifactReceiver) {
    // A regeneration publishes up to two messages; they must fit together.
    let (producer, consumer) = RingBuffer::new(capacity.max(2));
    (
        ArtifactPublisher { producer },
        ArtifactReceiver { consumer },
    )
}

/// Writing end, owned by the deployment thread.
pub struct ArtifactPublisher {
    producer: Producer<ArtifactMessage>,
}

impl ArtifactPublisher {
    /// Publishes the artifacts a deploy call reported as changed.
    ///
    /// Either every changed artifact is queued or none is. The policy is
    /// queued ahead of the sequence.
    pub fn publish(
        &mut self,
        report: DeployReport,
        session: &SessionState,
    ) -> Result<usize, PublishError> {
        let mut messages = Vec::with_capacity(2);
        if report.policy_changed {
            if let Some(policy) = session.policy() {
                messages.push(ArtifactMessage::Policy(*policy));
            }
        }
        if report.sequence_changed {
            messages.push(ArtifactMessage::Sequence(Arc::new(
                session.sequence().clone(),
            )));
        }

        if self.producer.slots() < messages.len() {
            return Err(PublishError::Full);
        }

        let count = messages.len();
        for message in messages {
            self.producer
                .push(message)
                .map_err(|_| PublishError::Full)?;
        }
        Ok(count)
    }
}

/// Reading end, owned by the playback thread. Never blocks or allocates.
pub struct ArtifactReceiver {
    consumer: Consumer<ArtifactMessage>,
}

impl ArtifactReceiver {
    pub fn pop(&mut self) -> Option<ArtifactMessage> {
        self.consumer.pop().ok()
    }

    pub fn pending(&self) -> usize {
        self.consumer.slots()
    }
}
