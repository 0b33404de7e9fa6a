use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};
use musicbox::midi::{decode_bytes, decode_file, DecodeError, MidiEvent};
use musicbox::timeline::TimelineCompiler;
use std::fs;

#[cfg(test)]
mod tests {
    use super::*;

    fn note(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: vel.into(),
                },
            },
        }
    }

    fn end_of_track() -> TrackEvent<'static> {
        TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }
    }

    fn song_bytes() -> Vec<u8> {
        let smf = Smf {
            header: Header::new(Format::Parallel, Timing::Metrical(96.into())),
            tracks: vec![
                vec![
                    TrackEvent {
                        delta: 0.into(),
                        kind: TrackEventKind::Meta(MetaMessage::Tempo(600_000.into())),
                    },
                    end_of_track(),
                ],
                vec![note(0, 60, 90), note(96, 60, 0), note(0, 67, 90), note(48, 67, 0), end_of_track()],
            ],
        };
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_decode_written_file() {
        let doc = decode_bytes(&song_bytes()).unwrap();
        assert_eq!(doc.ticks_per_quarter, 96);
        assert_eq!(doc.tracks.len(), 2);
        assert_eq!(doc.tracks[0].events, vec![MidiEvent::tempo(0, 600_000)]);
        assert_eq!(doc.tracks[1].events[2], MidiEvent::note_on(96, 0, 67, 90));
        assert_eq!(doc.event_count(), 5);
    }

    #[test]
    fn test_decoded_file_compiles_with_its_tempo() {
        let doc = decode_bytes(&song_bytes()).unwrap();
        let timeline = TimelineCompiler::default().compile(&doc).unwrap();
        let spans: Vec<(u8, u64, u64)> = timeline
            .notes()
            .iter()
            .map(|n| (n.midi_note, n.start_ms, n.duration_ms))
            .collect();
        assert_eq!(spans, vec![(60, 0, 600), (67, 600, 300)]);
    }

    #[test]
    fn test_decode_file_from_disk() {
        let path = std::env::temp_dir().join(format!("musicbox-midi-{}.mid", std::process::id()));
        fs::write(&path, song_bytes()).unwrap();
        let doc = decode_file(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(doc.tracks.len(), 2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = decode_file(std::path::Path::new("/nonexistent/song.mid")).unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }
}
