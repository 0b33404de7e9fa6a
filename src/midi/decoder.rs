use super::{MidiDocument, MidiEvent, MidiEventKind, MidiTrack};
use log::{debug, info};
use midly::{MetaMessage, Smf, Timing, TrackEventKind};
use std::error::Error;
use std::fmt;
use std::io;
use std::path::Path;

/// Errors raised while turning a Standard MIDI File into a [`MidiDocument`]
#[derive(Debug)]
pub enum DecodeError {
    /// The file could not be read
    Io(io::Error),
    /// The bytes are not a valid Standard MIDI File
    Parse(String),
    /// SMPTE timecode resolution, which has no quarter-note grid
    UnsupportedTiming,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Io(e) => write!(f, "MIDI read error: {}", e),
            DecodeError::Parse(msg) => write!(f, "MIDI parse error: {}", msg),
            DecodeError::UnsupportedTiming => {
                write!(f, "MIDI timecode (SMPTE) timing is not supported")
            }
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DecodeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        DecodeError::Io(e)
    }
}

pub fn decode_file(path: &Path) -> Result<MidiDocument, DecodeError> {
    info!("Decoding MIDI file: {}", path.display());
    let data = std::fs::read(path)?;
    decode_bytes(&data)
}

pub fn decode_bytes(data: &[u8]) -> Result<MidiDocument, DecodeError> {
    let smf = Smf::parse(data).map_err(|e| DecodeError::Parse(e.to_string()))?;
    document_from_smf(&smf)
}

pub(crate) fn document_from_smf(smf: &Smf) -> Result<MidiDocument, DecodeError> {
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(ticks) => ticks.as_int(),
        Timing::Timecode(..) => return Err(DecodeError::UnsupportedTiming),
    };

    let tracks: Vec<MidiTrack> = smf.tracks.iter().map(|t| convert_track(t)).collect();
    let document = MidiDocument::new(ticks_per_quarter, tracks);
    debug!(
        "Decoded {} tracks, {} events, {} ticks per quarter",
        document.tracks.len(),
        document.event_count(),
        ticks_per_quarter
    );
    Ok(document)
}

fn convert_track(track: &[midly::TrackEvent]) -> MidiTrack {
    let mut tick = 0u64;
    let mut events = Vec::new();
    for event in track {
        tick += u64::from(event.delta.as_int());
        if let Some(kind) = convert_kind(&event.kind) {
            events.push(MidiEvent { tick, kind });
        }
    }
    MidiTrack::new(events)
}

fn convert_kind(kind: &TrackEventKind) -> Option<MidiEventKind> {
    match *kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                midly::MidiMessage::NoteOn { key, vel } => Some(MidiEventKind::NoteOn {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                }),
                midly::MidiMessage::NoteOff { key, vel } => Some(MidiEventKind::NoteOff {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                }),
                _ => None,
            }
        }
        TrackEventKind::Meta(MetaMessage::Tempo(us)) => Some(MidiEventKind::Tempo(us.as_int())),
        TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denominator_pow, _, _)) => {
            Some(MidiEventKind::TimeSignature {
                numerator,
                denominator: 1u8.checked_shl(u32::from(denominator_pow)).unwrap_or(0),
            })
        }
        _ => None,
    }
}
