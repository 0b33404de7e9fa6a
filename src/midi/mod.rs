//! Decoded MIDI input for the timeline compiler
//!
//! This module holds the tick-stamped event model the rest of the crate works on:
//! - [`MidiDocument`] with its resolution and per-track event lists
//! - [`MidiEvent`] and [`MidiEventKind`] for the channel-voice and meta events we care about
//! - [`decoder`] for turning Standard MIDI File bytes into a document via `midly`
//!
//! Everything else a MIDI file may contain (controllers, sysex, lyrics...) is
//! dropped at decode time.
pub mod decoder;

pub use decoder::{decode_bytes, decode_file, DecodeError};

/// MIDI channel reserved for percussion (channel 10 in 1-based numbering)
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Tempo assumed until the first tempo event, in microseconds per quarter note (120 BPM)
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    /// Note On message with note number and velocity
    NoteOn { channel: u8, key: u8, velocity: u8 },
    /// Note Off message with note number and release velocity
    NoteOff { channel: u8, key: u8, velocity: u8 },
    /// Tempo change in microseconds per quarter note
    Tempo(u32),
    /// Time signature, denominator given as the actual note value (4 = quarter)
    TimeSignature { numerator: u8, denominator: u8 },
}

/// A single event stamped with its absolute tick inside the track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    pub tick: u64,
    pub kind: MidiEventKind,
}

impl MidiEvent {
    pub fn new(tick: u64, kind: MidiEventKind) -> Self {
        Self { tick, kind }
    }

    pub fn note_on(tick: u64, channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(
            tick,
            MidiEventKind::NoteOn {
                channel,
                key,
                velocity,
            },
        )
    }

    pub fn note_off(tick: u64, channel: u8, key: u8) -> Self {
        Self::new(
            tick,
            MidiEventKind::NoteOff {
                channel,
                key,
                velocity: 0,
            },
        )
    }

    pub fn tempo(tick: u64, micros_per_quarter: u32) -> Self {
        Self::new(tick, MidiEventKind::Tempo(micros_per_quarter))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MidiTrack {
    pub events: Vec<MidiEvent>,
}

impl MidiTrack {
    pub fn new(events: Vec<MidiEvent>) -> Self {
        Self { events }
    }
}

/// A decoded MIDI file: metrical resolution plus its tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDocument {
    pub ticks_per_quarter: u16,
    pub tracks: Vec<MidiTrack>,
}

impl MidiDocument {
    pub fn new(ticks_per_quarter: u16, tracks: Vec<MidiTrack>) -> Self {
        Self {
            ticks_per_quarter,
            tracks,
        }
    }

    /// Total number of events across all tracks
    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(|t| t.events.len()).sum()
    }
}
