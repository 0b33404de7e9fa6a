use musicbox::clock::{DriverSettings, EnvelopePhase};
use musicbox::engine::{EngineCommand, MockEngine, VisualFrame};
use musicbox::events::{self, EventReceiver, PlayerEvent};
use musicbox::midi::{MidiDocument, MidiEvent, MidiTrack};
use musicbox::player::{MidiPlayer, PlayerSettings};
use musicbox::transport::TransportState;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_settings() -> PlayerSettings {
        PlayerSettings {
            driver: DriverSettings {
                tick_interval: Duration::from_millis(5),
                visual_interval: Duration::from_millis(10),
            },
            ..PlayerSettings::default()
        }
    }

    fn setup(engine: MockEngine) -> (MidiPlayer, EventReceiver) {
        let _ = env_logger::builder().is_test(true).try_init();
        let (tx, rx) = events::channel();
        let player = MidiPlayer::new(Box::new(engine), fast_settings(), tx);
        (player, rx)
    }

    /// Two 50 ms notes back to back at the default tempo
    fn short_song() -> MidiDocument {
        MidiDocument::new(
            480,
            vec![MidiTrack::new(vec![
                MidiEvent::note_on(0, 0, 60, 100),
                MidiEvent::note_off(48, 0, 60),
                MidiEvent::note_on(48, 0, 64, 100),
                MidiEvent::note_off(96, 0, 64),
            ])],
        )
    }

    /// One 10 s note
    fn long_song() -> MidiDocument {
        MidiDocument::new(
            480,
            vec![MidiTrack::new(vec![
                MidiEvent::note_on(0, 0, 60, 100),
                MidiEvent::note_off(9600, 0, 60),
            ])],
        )
    }

    /// Collects events until `target` is reported or the timeout expires
    fn wait_for_state(
        rx: &EventReceiver,
        target: TransportState,
        timeout: Duration,
    ) -> (bool, Vec<PlayerEvent>) {
        let deadline = Instant::now() + timeout;
        let mut seen = Vec::new();
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(event) => {
                    let reached = event == PlayerEvent::StateChanged(target);
                    seen.push(event);
                    if reached {
                        return (true, seen);
                    }
                }
                Err(_) => break,
            }
        }
        (false, seen)
    }

    #[test]
    fn test_open_reports_note_list_and_suggestion() {
        let (player, rx) = setup(MockEngine::new());
        let song = player.open(&short_song()).unwrap();
        player.wait_idle();

        assert_eq!(song.timeline.len(), 2);
        // centroid 62 in a band centered on 60
        assert_eq!(song.suggested_transpose, -2);

        let events: Vec<PlayerEvent> = rx.try_iter().collect();
        assert_eq!(events[0], PlayerEvent::SuggestedTranspose(-2));
        assert_eq!(events[1], PlayerEvent::NoteList(song.timeline.clone()));
        assert_eq!(player.state(), TransportState::Stopped);
    }

    #[test]
    fn test_open_without_notes_suggests_zero() {
        let (player, _rx) = setup(MockEngine::new());
        let empty = MidiDocument::new(480, vec![MidiTrack::new(Vec::new())]);
        let song = player.open(&empty).unwrap();

        assert!(song.analysis.is_none());
        assert_eq!(song.suggested_transpose, 0);
    }

    #[test]
    fn test_open_rejects_zero_resolution() {
        let (player, _rx) = setup(MockEngine::new());
        let broken = MidiDocument::new(0, Vec::new());
        assert!(player.open(&broken).is_err());
    }

    #[test]
    fn test_plays_to_the_end_and_stops() {
        let engine = MockEngine::new();
        let (player, rx) = setup(engine.clone());
        player.open(&short_song()).unwrap();
        player.play();

        let (stopped, seen) = wait_for_state(&rx, TransportState::Stopped, Duration::from_secs(5));
        assert!(stopped, "playback never finished");
        assert!(seen.contains(&PlayerEvent::StateChanged(TransportState::Playing)));
        assert!(seen
            .iter()
            .any(|e| matches!(e, PlayerEvent::NoteAttack { pitch: 64, .. })));

        assert_eq!(engine.notes_played(), vec![60, 64]);
        assert!(engine.commands().contains(&EngineCommand::NoteOff(64)));
        assert_eq!(engine.commands().last(), Some(&EngineCommand::Reset));
        assert_eq!(player.snapshot().time_ms, 0);
    }

    #[test]
    fn test_transpose_shifts_played_pitches() {
        let engine = MockEngine::new();
        let (player, rx) = setup(engine.clone());
        let song = player.open(&short_song()).unwrap();
        player.set_transpose(song.suggested_transpose);
        player.play();

        let (stopped, _) = wait_for_state(&rx, TransportState::Stopped, Duration::from_secs(5));
        assert!(stopped);
        assert_eq!(engine.notes_played(), vec![58, 62]);
    }

    #[test]
    fn test_transpose_while_playing_silences_old_pitch() {
        let engine = MockEngine::new();
        let (player, _rx) = setup(engine.clone());
        player.open(&long_song()).unwrap();
        player.play();
        thread::sleep(Duration::from_millis(80));
        assert_eq!(engine.notes_played(), vec![60]);

        engine.clear();
        player.set_transpose(2);
        player.wait_idle();
        thread::sleep(Duration::from_millis(30));

        // the held note moves to 62 on the keys but is not struck again
        assert_eq!(engine.commands(), vec![EngineCommand::Reset]);
        assert_eq!(player.state(), TransportState::Playing);
        assert_eq!(
            player.snapshot().key(62).unwrap().phase(),
            EnvelopePhase::Attack
        );

        player.stop();
        player.wait_idle();
        assert!(!engine.commands().contains(&EngineCommand::NoteOff(62)));
    }

    #[test]
    fn test_same_transpose_leaves_engine_alone() {
        let engine = MockEngine::new();
        let (player, _rx) = setup(engine.clone());
        player.open(&long_song()).unwrap();
        player.set_transpose(3);
        player.wait_idle();
        engine.clear();

        player.set_transpose(3);
        player.wait_idle();
        assert!(engine.commands().is_empty());
    }

    #[test]
    fn test_pause_freezes_time() {
        let engine = MockEngine::new();
        let (player, _rx) = setup(engine.clone());
        player.open(&long_song()).unwrap();
        player.play();
        thread::sleep(Duration::from_millis(60));
        player.pause();
        player.wait_idle();

        let frozen = player.snapshot().time_ms;
        assert!(frozen > 0);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(player.snapshot().time_ms, frozen);
        assert_eq!(player.state(), TransportState::Paused);
        assert!(engine.commands().contains(&EngineCommand::SetPaused(true)));

        player.play();
        player.wait_idle();
        assert_eq!(player.state(), TransportState::Resumed);
        thread::sleep(Duration::from_millis(40));
        assert!(player.snapshot().time_ms > frozen);
    }

    #[test]
    fn test_suspend_and_return() {
        let (player, _rx) = setup(MockEngine::new());
        player.open(&long_song()).unwrap();
        player.play();
        player.suspend();
        player.wait_idle();
        assert_eq!(player.state(), TransportState::PausedBySystem);

        player.resume_from_suspend();
        player.wait_idle();
        assert_eq!(player.state(), TransportState::Resumed);
        assert!(player.shared_state().is_playing());
    }

    #[test]
    fn test_seek_while_stopped_rebuilds_keys() {
        let (player, _rx) = setup(MockEngine::new());
        player.open(&long_song()).unwrap();
        player.seek(2500);
        player.wait_idle();

        let snapshot = player.snapshot();
        assert_eq!(snapshot.time_ms, 2500);
        assert_eq!(snapshot.key(60).unwrap().phase(), EnvelopePhase::Attack);
        assert_eq!(player.state(), TransportState::Stopped);
    }

    #[test]
    fn test_seek_while_playing_keeps_playing() {
        let (player, _rx) = setup(MockEngine::new());
        player.open(&long_song()).unwrap();
        player.play();
        player.seek(5000);
        player.wait_idle();

        thread::sleep(Duration::from_millis(30));
        let snapshot = player.snapshot();
        assert!(snapshot.time_ms > 5000);
        assert_eq!(player.state(), TransportState::Playing);
    }

    #[test]
    fn test_stop_rewinds_and_resets_engine() {
        let engine = MockEngine::new();
        let (player, _rx) = setup(engine.clone());
        player.open(&long_song()).unwrap();
        player.play();
        thread::sleep(Duration::from_millis(30));
        player.stop();
        player.wait_idle();

        assert_eq!(player.snapshot().time_ms, 0);
        let commands = engine.commands();
        let tail = &commands[commands.len() - 2..];
        assert_eq!(tail, &[EngineCommand::SetPaused(true), EngineCommand::Reset]);
    }

    #[test]
    fn test_engine_failure_does_not_block_transport() {
        let engine = MockEngine::new();
        engine.set_failing(true);
        let (player, _rx) = setup(engine.clone());
        player.open(&long_song()).unwrap();
        player.play();
        player.wait_idle();

        assert_eq!(player.state(), TransportState::Playing);
        player.stop();
        player.wait_idle();
        assert_eq!(player.state(), TransportState::Stopped);
    }

    #[test]
    fn test_visual_frames_are_relayed() {
        let frame = VisualFrame::new(vec![0.5, -0.5], vec![1.0, 0.0]);
        let (player, rx) = setup(MockEngine::with_frame(frame.clone()));
        player.open(&long_song()).unwrap();
        player.play();
        thread::sleep(Duration::from_millis(50));
        player.stop();
        player.wait_idle();

        assert!(rx.try_iter().any(|e| e == PlayerEvent::VisualFrame(frame.clone())));
    }

    #[test]
    fn test_shutdown_releases_engine() {
        let engine = MockEngine::new();
        let (mut player, _rx) = setup(engine.clone());
        player.open(&long_song()).unwrap();
        player.play();
        player.shutdown();

        assert_eq!(engine.commands().last(), Some(&EngineCommand::Release));
        player.play();
        assert_eq!(player.state(), TransportState::Stopped);
    }
}
