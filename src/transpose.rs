//! Transposition advice from a timeline's pitch distribution

use crate::timeline::CompiledTimeline;
use log::{debug, info};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

pub const MIN_PITCH: i32 = 0;
pub const MAX_PITCH: i32 = 127;

const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Scientific pitch name of a MIDI note, `60` is `C4`
pub fn pitch_name(midi_note: u8) -> String {
    let octave = i32::from(midi_note) / 12 - 1;
    format!("{}{}", PITCH_NAMES[usize::from(midi_note % 12)], octave)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransposeError {
    /// The timeline holds no pitched notes
    NoMaterial,
    /// The target band is reversed or leaves 0..=127
    InvalidBand { low: i32, high: i32 },
}

impl fmt::Display for TransposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransposeError::NoMaterial => write!(f, "no notes to analyze for transposition"),
            TransposeError::InvalidBand { low, high } => {
                write!(f, "invalid target pitch band [{}, {}]", low, high)
            }
        }
    }
}

impl Error for TransposeError {}

/// Inclusive pitch range the material should be centered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchBand {
    pub low: i32,
    pub high: i32,
}

impl PitchBand {
    pub fn new(low: i32, high: i32) -> Result<Self, TransposeError> {
        if low > high || low < MIN_PITCH || high > MAX_PITCH {
            return Err(TransposeError::InvalidBand { low, high });
        }
        Ok(Self { low, high })
    }

    pub fn center(&self) -> i32 {
        self.low + (self.high - self.low) / 2
    }
}

/// Result of analyzing a timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransposeAnalysis {
    /// Occurrences per pitch
    pub histogram: BTreeMap<u8, usize>,
    pub lowest: u8,
    pub highest: u8,
    pub centroid: i32,
    pub suggested: i32,
}

impl TransposeAnalysis {
    /// Whether `pitch` shifted by `offset` still lands on a valid MIDI note
    pub fn in_range(pitch: u8, offset: i32) -> bool {
        (MIN_PITCH..=MAX_PITCH).contains(&(i32::from(pitch) + offset))
    }

    pub fn total_notes(&self) -> usize {
        self.histogram.values().sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransposeAdvisor {
    band: PitchBand,
}

impl TransposeAdvisor {
    pub fn new(band: PitchBand) -> Self {
        Self { band }
    }

    pub fn band(&self) -> PitchBand {
        self.band
    }

    pub fn analyze(&self, timeline: &CompiledTimeline) -> Result<TransposeAnalysis, TransposeError> {
        let mut histogram = BTreeMap::new();
        for note in timeline.notes() {
            *histogram.entry(note.midi_note).or_insert(0usize) += 1;
        }
        self.analyze_histogram(histogram)
    }

    pub fn analyze_histogram(
        &self,
        histogram: BTreeMap<u8, usize>,
    ) -> Result<TransposeAnalysis, TransposeError> {
        let (Some((&lowest, _)), Some((&highest, _))) =
            (histogram.first_key_value(), histogram.last_key_value())
        else {
            return Err(TransposeError::NoMaterial);
        };

        let (weighted, count) = histogram
            .iter()
            .fold((0i64, 0i64), |(sum, n), (&pitch, &times)| {
                (sum + i64::from(pitch) * times as i64, n + times as i64)
            });
        if count == 0 {
            return Err(TransposeError::NoMaterial);
        }
        let centroid = (weighted / count) as i32;

        let wanted = self.band.center() - centroid;
        let suggested = clamp_offset(wanted, i32::from(lowest), i32::from(highest));
        debug!(
            "Pitch range {}..{}, centroid {}, wanted {}, suggested {}",
            lowest, highest, centroid, wanted, suggested
        );
        info!("Suggested transpose: {} semitones", suggested);

        Ok(TransposeAnalysis {
            histogram,
            lowest,
            highest,
            centroid,
            suggested,
        })
    }
}

/// Pulls `wanted` back so the highest pitch never exceeds 127; the low end is
/// corrected only when the top has enough headroom to absorb it.
fn clamp_offset(wanted: i32, lowest: i32, highest: i32) -> i32 {
    let top = MAX_PITCH - (highest + wanted);
    let bottom = MIN_PITCH - (lowest + wanted);

    if top >= 0 && bottom <= 0 {
        wanted
    } else if top < 0 {
        wanted + top
    } else if top.abs() >= bottom.abs() {
        wanted + bottom
    } else {
        wanted + top
    }
}
