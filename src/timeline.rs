//! Tick-based MIDI to absolute-millisecond note timeline
//!
//! The compiler merges every track of a [`MidiDocument`] into one tick-ordered
//! stream, converts ticks to milliseconds through the running tempo and pairs
//! NoteOn/NoteOff messages per `(note, channel)` into [`NoteEvent`]s.

use crate::midi::{MidiDocument, MidiEventKind, DEFAULT_MICROS_PER_QUARTER, PERCUSSION_CHANNEL};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// Duration given to notes whose NoteOff never arrived
pub const DEFAULT_FALLBACK_DURATION_MS: u64 = 200;

/// One note of the compiled timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub midi_note: u8,
    pub channel: u8,
    pub start_ms: u64,
    pub duration_ms: u64,
    /// Normalized to 0.0..=1.0
    pub velocity: f32,
}

impl NoteEvent {
    pub fn new(midi_note: u8, start_ms: u64, duration_ms: u64, velocity: f32) -> Self {
        Self {
            midi_note,
            channel: 0,
            start_ms,
            duration_ms,
            velocity,
        }
    }

    pub fn end_ms(&self) -> u64 {
        self.start_ms + self.duration_ms
    }
}

/// Notes sorted by start time, ties kept in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledTimeline {
    notes: Vec<NoteEvent>,
    unterminated: usize,
    retriggered: usize,
}

impl CompiledTimeline {
    /// Builds a timeline from already-timed notes, sorting them by start.
    pub fn from_notes(mut notes: Vec<NoteEvent>) -> Self {
        notes.sort_by_key(|n| n.start_ms);
        Self {
            notes,
            unterminated: 0,
            retriggered: 0,
        }
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// End of the latest note, 0 for an empty timeline
    pub fn duration_ms(&self) -> u64 {
        self.notes.iter().map(NoteEvent::end_ms).max().unwrap_or(0)
    }

    /// Notes that were closed with the fallback duration
    pub fn unterminated_count(&self) -> usize {
        self.unterminated
    }

    /// Notes that were cut short by a repeated NoteOn on the same key
    pub fn retriggered_count(&self) -> usize {
        self.retriggered
    }
}

/// What to do with a NoteOn arriving while the same key is still sounding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetriggerPolicy {
    /// Close the sounding note at the new NoteOn and start a fresh one
    #[default]
    Restart,
    /// Keep the sounding note and drop the repeated NoteOn
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilePolicy {
    pub retrigger: RetriggerPolicy,
    /// `None` drops notes still open at end of stream
    pub fallback_duration_ms: Option<u64>,
}

impl Default for CompilePolicy {
    fn default() -> Self {
        Self {
            retrigger: RetriggerPolicy::Restart,
            fallback_duration_ms: Some(DEFAULT_FALLBACK_DURATION_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The document declares 0 ticks per quarter note
    ZeroResolution,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::ZeroResolution => write!(f, "MIDI resolution of 0 ticks per quarter"),
        }
    }
}

impl Error for CompileError {}

/// Converts ticks to milliseconds under a piecewise-constant tempo.
///
/// The elapsed time is kept as an exact sum of `delta_ticks * tempo` so that
/// long files never accumulate rounding drift.
#[derive(Debug)]
struct TempoTracker {
    ticks_per_quarter: u128,
    micros_per_quarter: u32,
    last_tick: u64,
    scaled_micros: u128,
}

impl TempoTracker {
    fn new(ticks_per_quarter: u16) -> Self {
        Self {
            ticks_per_quarter: u128::from(ticks_per_quarter),
            micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
            last_tick: 0,
            scaled_micros: 0,
        }
    }

    fn advance_to(&mut self, tick: u64) {
        if tick > self.last_tick {
            let delta = u128::from(tick - self.last_tick);
            self.scaled_micros += delta * u128::from(self.micros_per_quarter);
            self.last_tick = tick;
        }
    }

    fn set_tempo(&mut self, micros_per_quarter: u32) {
        self.micros_per_quarter = micros_per_quarter;
    }

    fn now_ms(&self) -> u64 {
        (self.scaled_micros / (self.ticks_per_quarter * 1000)) as u64
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingNote {
    start_ms: u64,
    velocity: f32,
    order: usize,
}

#[derive(Debug, Default, Clone)]
pub struct TimelineCompiler {
    policy: CompilePolicy,
}

impl TimelineCompiler {
    pub fn new(policy: CompilePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> CompilePolicy {
        self.policy
    }

    pub fn compile(&self, document: &MidiDocument) -> Result<CompiledTimeline, CompileError> {
        if document.ticks_per_quarter == 0 {
            return Err(CompileError::ZeroResolution);
        }

        // Stable sort keeps track order, then event order, for equal ticks
        let mut merged: Vec<_> = document
            .tracks
            .iter()
            .flat_map(|track| track.events.iter())
            .collect();
        merged.sort_by_key(|e| e.tick);

        let mut tempo = TempoTracker::new(document.ticks_per_quarter);
        let mut pending: HashMap<(u8, u8), PendingNote> = HashMap::new();
        let mut closed: Vec<(usize, NoteEvent)> = Vec::new();
        let mut next_order = 0usize;
        let mut retriggered = 0usize;

        for event in merged {
            tempo.advance_to(event.tick);
            let now = tempo.now_ms();

            match event.kind {
                MidiEventKind::Tempo(micros) => tempo.set_tempo(micros),
                MidiEventKind::TimeSignature { .. } => {}
                MidiEventKind::NoteOn { channel, .. } | MidiEventKind::NoteOff { channel, .. }
                    if channel == PERCUSSION_CHANNEL => {}
                MidiEventKind::NoteOn {
                    channel,
                    key,
                    velocity,
                } if velocity > 0 => {
                    let slot = (key, channel);
                    if let Some(open) = pending.get(&slot).copied() {
                        if self.policy.retrigger == RetriggerPolicy::Ignore {
                            continue;
                        }
                        closed.push(close(open, key, channel, now));
                        retriggered += 1;
                    }
                    pending.insert(
                        slot,
                        PendingNote {
                            start_ms: now,
                            velocity: f32::from(velocity) / 127.0,
                            order: next_order,
                        },
                    );
                    next_order += 1;
                }
                MidiEventKind::NoteOn { channel, key, .. }
                | MidiEventKind::NoteOff { channel, key, .. } => {
                    if let Some(open) = pending.remove(&(key, channel)) {
                        closed.push(close(open, key, channel, now));
                    }
                }
            }
        }

        let mut unterminated = 0usize;
        if let Some(fallback) = self.policy.fallback_duration_ms {
            for ((key, channel), open) in pending.drain() {
                closed.push(close(open, key, channel, open.start_ms + fallback));
                unterminated += 1;
            }
        } else if !pending.is_empty() {
            debug!("Dropping {} notes without NoteOff", pending.len());
        }

        closed.sort_by_key(|(order, note)| (note.start_ms, *order));
        let notes: Vec<NoteEvent> = closed.into_iter().map(|(_, note)| note).collect();

        if unterminated > 0 {
            warn!(
                "{} notes had no NoteOff, closed after {} ms",
                unterminated,
                self.policy.fallback_duration_ms.unwrap_or_default()
            );
        }
        if retriggered > 0 {
            warn!("{} notes were cut short by a repeated NoteOn", retriggered);
        }
        debug!(
            "Compiled {} notes from {} events",
            notes.len(),
            document.event_count()
        );

        Ok(CompiledTimeline {
            notes,
            unterminated,
            retriggered,
        })
    }
}

fn close(open: PendingNote, key: u8, channel: u8, end_ms: u64) -> (usize, NoteEvent) {
    (
        open.order,
        NoteEvent {
            midi_note: key,
            channel,
            start_ms: open.start_ms,
            duration_ms: end_ms.saturating_sub(open.start_ms),
            velocity: open.velocity,
        },
    )
}
