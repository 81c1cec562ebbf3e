//! MIDI export of a playback sequence.
//!
//! Writes the current pattern as a single-track Standard MIDI File so the host
//! can offer it for drag-and-drop into a DAW. Event times are quarter notes, so
//! they map directly onto metrical ticks. The track is padded to the length of
//! one decoded pattern, so a DAW looping the clip repeats the groove without a
//! gap.

use std::path::Path;

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u28},
};

use crate::deployment::errors::MidiExportError;
use crate::deployment::pattern::PlaybackSequence;

/// Ticks per quarter note in MIDI output.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Largest delta time a MIDI track event can carry.
const MAX_DELTA: u64 = (1 << 28) - 1;

/// Convert a sequence to MIDI and write it to a file.
///
/// `pattern_length` is the clip length in quarter notes.
pub fn write_midi(
    sequence: &PlaybackSequence,
    pattern_length: f32,
    path: &Path,
) -> Result<(), MidiExportError> {
    let smf = sequence_to_smf(sequence, pattern_length)?;
    smf.save(path)?;
    Ok(())
}

fn quarter_notes_to_ticks(time: f32) -> u64 {
    if !time.is_finite() || time <= 0.0 {
        return 0;
    }
    (time as f64 * TICKS_PER_QUARTER as f64).round() as u64
}

fn velocity_to_u7(velocity: f32) -> u7 {
    let scaled = if velocity.is_finite() {
        (velocity * 127.0).round().clamp(1.0, 127.0)
    } else {
        1.0
    };
    u7::new(scaled as u8)
}

/// Convert a sequence to an in-memory SMF.
pub(crate) fn sequence_to_smf(
    sequence: &PlaybackSequence,
    pattern_length: f32,
) -> Result<Smf<'static>, MidiExportError> {
    // (tick, note-offs before note-ons at the same tick, event)
    let mut timed: Vec<(u64, u8, TrackEventKind<'static>)> = Vec::new();

    for event in sequence.events() {
        let channel = u4::new(event.channel & 0x0f);
        let key = u7::new(event.note & 0x7f);
        let on_tick = quarter_notes_to_ticks(event.start);
        let off_tick = quarter_notes_to_ticks(event.end()).max(on_tick + 1);

        timed.push((
            on_tick,
            1,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key,
                    vel: velocity_to_u7(event.velocity),
                },
            },
        ));
        timed.push((
            off_tick,
            0,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key,
                    vel: u7::new(0),
                },
            },
        ));
    }

    // Stable sort keeps step-major order among simultaneous note-ons.
    timed.sort_by_key(|&(tick, order, _)| (tick, order));

    let last_tick = timed.last().map(|&(tick, _, _)| tick).unwrap_or(0);
    let end_tick = last_tick.max(quarter_notes_to_ticks(pattern_length));

    let mut track: Track<'static> = Vec::with_capacity(timed.len() + 2);
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Generated pattern")),
    });

    let mut current_tick = 0u64;
    for (tick, _, kind) in timed {
        track.push(TrackEvent {
            delta: delta(tick - current_tick)?,
            kind,
        });
        current_tick = tick;
    }
    track.push(TrackEvent {
        delta: delta(end_tick - current_tick)?,
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));
    smf.tracks.push(track);
    Ok(smf)
}

fn delta(ticks: u64) -> Result<u28, MidiExportError> {
    if ticks > MAX_DELTA {
        return Err(MidiExportError::TooLong(ticks));
    }
    Ok(u28::new(ticks as u32))
}
