//! Playback time and the visual state derived from it
//!
//! [`PlaybackClock`] owns the current playback position over a compiled
//! timeline. Moving the position with [`PlaybackClock::advance`],
//! [`PlaybackClock::seek_to`] or [`PlaybackClock::reset`] recomputes:
//! - which notes are on screen (materialized `lookahead_ms` before they start)
//! - the attack/release envelope of each of the 128 keys
//!
//! The clock is passive. [`driver::ClockDriver`] is the thread that advances
//! it in real time while the transport is playing.
pub mod driver;

pub use driver::{ClockDriver, DriverSettings};

use crate::timeline::{CompiledTimeline, NoteEvent};
use log::{debug, trace};
use std::sync::Arc;

/// Number of MIDI pitches, one key per pitch
pub const KEY_COUNT: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSettings {
    /// How long before its start a note becomes visible
    pub lookahead_ms: u64,
    /// How long after its end a note stays visible
    pub trail_ms: u64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            lookahead_ms: 3000,
            trail_ms: 0,
        }
    }
}

/// Fade-in and fade-out lengths of a key highlight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub attack_ms: u64,
    pub release_ms: u64,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack_ms: 20,
            release_ms: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopePhase {
    Idle,
    Attack,
    Release,
}

/// Highlight state of one key
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KeyState {
    pub velocity: f32,
    /// `None` means never pressed since the last reset
    pub last_pressed_ms: Option<u64>,
    pub last_released_ms: Option<u64>,
}

impl KeyState {
    pub fn phase(&self) -> EnvelopePhase {
        if self.last_pressed_ms > self.last_released_ms {
            EnvelopePhase::Attack
        } else if self.last_released_ms > self.last_pressed_ms {
            EnvelopePhase::Release
        } else {
            EnvelopePhase::Idle
        }
    }

    pub fn is_attacking(&self) -> bool {
        self.phase() == EnvelopePhase::Attack
    }

    /// Highlight opacity in `0.0..=1.0` at playback time `now_ms`
    pub fn intensity(&self, now_ms: u64, envelope: Envelope) -> f32 {
        match (self.phase(), self.last_pressed_ms, self.last_released_ms) {
            (EnvelopePhase::Attack, Some(pressed), _) => {
                if envelope.attack_ms == 0 {
                    return 1.0;
                }
                let t = now_ms.saturating_sub(pressed) as f32;
                (t / envelope.attack_ms as f32).min(1.0)
            }
            (EnvelopePhase::Release, _, Some(released)) => {
                if envelope.release_ms == 0 {
                    return 0.0;
                }
                let t = now_ms.saturating_sub(released) as f32;
                (1.0 - t / envelope.release_ms as f32).max(0.0)
            }
            _ => 0.0,
        }
    }
}

/// A note currently on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveNote {
    /// Index into the timeline's notes
    pub index: usize,
    /// Transposed pitch, `None` when it falls outside 0..=127
    pub display_note: Option<u8>,
    attacked: bool,
    released: bool,
}

/// A key entering attack or release during an advance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyTransition {
    pub pitch: u8,
    /// Note start for attacks, note end for releases
    pub at_ms: u64,
    pub velocity: f32,
}

/// What changed during one [`PlaybackClock::advance`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClockFrame {
    pub time_ms: u64,
    pub attacks: Vec<KeyTransition>,
    pub releases: Vec<KeyTransition>,
}

/// Copy of an active note for renderers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveNoteView {
    pub note: NoteEvent,
    pub display_note: Option<u8>,
    /// Playback time minus note start, negative while the note is still falling
    pub elapsed_ms: i64,
}

/// Consistent copy of the whole clock state
#[derive(Debug, Clone, PartialEq)]
pub struct ClockSnapshot {
    pub time_ms: u64,
    pub transpose: i32,
    pub keys: Vec<KeyState>,
    pub active: Vec<ActiveNoteView>,
}

impl ClockSnapshot {
    pub fn key(&self, pitch: u8) -> Option<&KeyState> {
        self.keys.get(usize::from(pitch))
    }
}

#[derive(Debug)]
pub struct PlaybackClock {
    timeline: Arc<CompiledTimeline>,
    settings: ClockSettings,
    transpose: i32,
    time_ms: u64,
    /// Notes before this index have been materialized
    next_event: usize,
    active: Vec<ActiveNote>,
    keys: [KeyState; KEY_COUNT],
    /// Transitions at exactly the seek target, reported by the next advance
    pending: ClockFrame,
}

impl PlaybackClock {
    pub fn new(timeline: Arc<CompiledTimeline>, settings: ClockSettings) -> Self {
        let mut clock = Self {
            timeline,
            settings,
            transpose: 0,
            time_ms: 0,
            next_event: 0,
            active: Vec::new(),
            keys: [KeyState::default(); KEY_COUNT],
            pending: ClockFrame::default(),
        };
        clock.reset();
        clock
    }

    pub fn empty(settings: ClockSettings) -> Self {
        Self::new(Arc::new(CompiledTimeline::default()), settings)
    }

    /// Replaces the timeline and rewinds to 0
    pub fn load(&mut self, timeline: Arc<CompiledTimeline>) -> ClockSnapshot {
        debug!("Clock loaded {} notes", timeline.len());
        self.timeline = timeline;
        self.reset()
    }

    pub fn timeline(&self) -> &Arc<CompiledTimeline> {
        &self.timeline
    }

    pub fn settings(&self) -> ClockSettings {
        self.settings
    }

    pub fn time_ms(&self) -> u64 {
        self.time_ms
    }

    pub fn transpose(&self) -> i32 {
        self.transpose
    }

    /// Changes the display offset and rebuilds key state at the current time.
    ///
    /// Attacks at the current time are carried to the next `advance` only if
    /// they had not been reported yet, so a held note is never struck twice.
    pub fn set_transpose(&mut self, semitones: i32) -> ClockSnapshot {
        if semitones == self.transpose {
            return self.snapshot();
        }
        debug!("Clock transpose {} -> {}", self.transpose, semitones);
        let unreported = !self.pending.attacks.is_empty();
        self.transpose = semitones;
        let snapshot = self.seek_to(self.time_ms);
        if !unreported {
            self.pending = ClockFrame::default();
        }
        snapshot
    }

    /// Key state for a pitch, `None` outside 0..=127
    pub fn key(&self, pitch: i32) -> Option<&KeyState> {
        usize::try_from(pitch).ok().and_then(|p| self.keys.get(p))
    }

    pub fn keys(&self) -> &[KeyState] {
        &self.keys
    }

    pub fn active_notes(&self) -> &[ActiveNote] {
        &self.active
    }

    /// Whether every note has played out and left the screen
    pub fn is_finished(&self) -> bool {
        self.next_event >= self.timeline.len()
            && self.active.is_empty()
            && self.time_ms >= self.timeline.duration_ms()
    }

    pub fn advance(&mut self, elapsed_ms: u64) -> ClockFrame {
        self.time_ms = self.time_ms.saturating_add(elapsed_ms);
        let mut frame = std::mem::take(&mut self.pending);
        frame.time_ms = self.time_ms;
        self.update(&mut frame);
        if !frame.attacks.is_empty() || !frame.releases.is_empty() {
            trace!(
                "Clock at {} ms: {} attacks, {} releases",
                self.time_ms,
                frame.attacks.len(),
                frame.releases.len()
            );
        }
        frame
    }

    /// Jumps to `time_ms` and rebuilds the state continuous playback would
    /// have produced by then, including notes that are mid-sustain.
    ///
    /// Transitions of the rebuild are not reported, except for notes
    /// starting exactly at `time_ms`: those still have to sound, so the next
    /// [`advance`](Self::advance) reports them.
    pub fn seek_to(&mut self, time_ms: u64) -> ClockSnapshot {
        self.active.clear();
        self.next_event = 0;
        self.keys = [KeyState::default(); KEY_COUNT];
        self.time_ms = time_ms;

        let mut rebuild = ClockFrame::default();
        self.update(&mut rebuild);
        rebuild.attacks.retain(|a| a.at_ms == time_ms);
        let starting: Vec<u8> = rebuild.attacks.iter().map(|a| a.pitch).collect();
        rebuild
            .releases
            .retain(|r| r.at_ms == time_ms && starting.contains(&r.pitch));
        self.pending = rebuild;
        debug!(
            "Clock seek to {} ms, {} notes active",
            time_ms,
            self.active.len()
        );
        self.snapshot()
    }

    pub fn reset(&mut self) -> ClockSnapshot {
        self.seek_to(0)
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        let notes = self.timeline.notes();
        ClockSnapshot {
            time_ms: self.time_ms,
            transpose: self.transpose,
            keys: self.keys.to_vec(),
            active: self
                .active
                .iter()
                .map(|a| {
                    let note = notes[a.index];
                    ActiveNoteView {
                        note,
                        display_note: a.display_note,
                        elapsed_ms: self.time_ms as i64 - note.start_ms as i64,
                    }
                })
                .collect(),
        }
    }

    fn display_note(&self, note: &NoteEvent) -> Option<u8> {
        u8::try_from(i32::from(note.midi_note) + self.transpose)
            .ok()
            .filter(|p| usize::from(*p) < KEY_COUNT)
    }

    fn update(&mut self, frame: &mut ClockFrame) {
        let timeline = Arc::clone(&self.timeline);
        let notes = timeline.notes();
        let now = self.time_ms;

        let horizon = now.saturating_add(self.settings.lookahead_ms);
        while let Some(note) = notes.get(self.next_event) {
            if note.start_ms > horizon {
                break;
            }
            let display_note = self.display_note(note);
            self.active.push(ActiveNote {
                index: self.next_event,
                display_note,
                attacked: false,
                released: false,
            });
            self.next_event += 1;
        }

        for active in self.active.iter_mut() {
            let Some(pitch) = active.display_note else {
                continue;
            };
            let note = &notes[active.index];
            let key = &mut self.keys[usize::from(pitch)];

            if !active.attacked && now >= note.start_ms {
                active.attacked = true;
                key.velocity = note.velocity;
                key.last_pressed_ms = key.last_pressed_ms.max(Some(note.start_ms));
                frame.attacks.push(KeyTransition {
                    pitch,
                    at_ms: note.start_ms,
                    velocity: note.velocity,
                });
            }
            if active.attacked && !active.released && now >= note.end_ms() {
                active.released = true;
                key.last_released_ms = key.last_released_ms.max(Some(note.end_ms()));
                frame.releases.push(KeyTransition {
                    pitch,
                    at_ms: note.end_ms(),
                    velocity: note.velocity,
                });
            }
        }

        // A key stays down while any of its notes is sounding
        for active in &self.active {
            if let (Some(pitch), true, false) =
                (active.display_note, active.attacked, active.released)
            {
                let key = &mut self.keys[usize::from(pitch)];
                key.velocity = notes[active.index].velocity;
                key.last_released_ms = None;
            }
        }

        let trail = self.settings.trail_ms;
        self.active
            .retain(|a| now <= notes[a.index].end_ms().saturating_add(trail));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock_with(notes: Vec<NoteEvent>) -> PlaybackClock {
        PlaybackClock::new(
            Arc::new(CompiledTimeline::from_notes(notes)),
            ClockSettings {
                lookahead_ms: 1000,
                trail_ms: 0,
            },
        )
    }

    #[test]
    fn key_phase_follows_timestamps() {
        let mut key = KeyState::default();
        assert_eq!(key.phase(), EnvelopePhase::Idle);
        key.last_pressed_ms = Some(0);
        assert_eq!(key.phase(), EnvelopePhase::Attack);
        key.last_released_ms = Some(500);
        assert_eq!(key.phase(), EnvelopePhase::Release);
    }

    #[test]
    fn intensity_ramps_in_and_out() {
        let envelope = Envelope {
            attack_ms: 20,
            release_ms: 60,
        };
        let mut key = KeyState {
            velocity: 1.0,
            last_pressed_ms: Some(100),
            last_released_ms: None,
        };
        assert_eq!(key.intensity(100, envelope), 0.0);
        assert_eq!(key.intensity(110, envelope), 0.5);
        assert_eq!(key.intensity(500, envelope), 1.0);

        key.last_released_ms = Some(600);
        assert_eq!(key.intensity(600, envelope), 1.0);
        assert_eq!(key.intensity(630, envelope), 0.5);
        assert_eq!(key.intensity(700, envelope), 0.0);
    }

    #[test]
    fn note_appears_within_lookahead() {
        let mut clock = clock_with(vec![NoteEvent::new(60, 1500, 100, 1.0)]);
        clock.advance(400);
        assert!(clock.active_notes().is_empty());
        clock.advance(100);
        assert_eq!(clock.active_notes().len(), 1);
        assert!(!clock.key(60).unwrap().is_attacking());
    }

    #[test]
    fn transposed_out_of_range_note_is_skipped() {
        let mut clock = clock_with(vec![NoteEvent::new(120, 0, 100, 1.0)]);
        clock.set_transpose(10);
        let frame = clock.advance(10);
        assert!(frame.attacks.is_empty());
        assert_eq!(clock.active_notes()[0].display_note, None);
        assert!(clock.keys().iter().all(|k| k.phase() == EnvelopePhase::Idle));
    }

    #[test]
    fn key_lookup_checks_range() {
        let clock = clock_with(Vec::new());
        assert!(clock.key(-1).is_none());
        assert!(clock.key(128).is_none());
        assert!(clock.key(127).is_some());
    }
}
