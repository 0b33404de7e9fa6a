use musicbox::engine::EngineError;
use musicbox::events::{self, EventReceiver, PlayerEvent};
use musicbox::transport::{
    PlaybackController, TransportActions, TransportMessage, TransportState,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct RecordingActions {
        calls: Arc<Mutex<Vec<&'static str>>>,
        failing: Arc<AtomicBool>,
    }

    impl RecordingActions {
        fn record(&self, name: &'static str) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push(name);
            if self.failing.load(Ordering::SeqCst) {
                Err(EngineError::Rejected(name.to_string()))
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TransportActions for RecordingActions {
        fn internal_play(&mut self) -> Result<(), EngineError> {
            self.record("play")
        }

        fn internal_pause(&mut self) -> Result<(), EngineError> {
            self.record("pause")
        }

        fn internal_resume(&mut self) -> Result<(), EngineError> {
            self.record("resume")
        }

        fn internal_stop(&mut self) -> Result<(), EngineError> {
            self.record("stop")
        }
    }

    fn setup() -> (
        PlaybackController<RecordingActions>,
        RecordingActions,
        EventReceiver,
    ) {
        let _ = env_logger::builder().is_test(true).try_init();
        let actions = RecordingActions::default();
        let (tx, rx) = events::channel();
        let controller = PlaybackController::spawn(actions.clone(), tx);
        (controller, actions, rx)
    }

    fn states(rx: &EventReceiver) -> Vec<TransportState> {
        rx.try_iter()
            .filter_map(|e| match e {
                PlayerEvent::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_play_pause_stop_notifies_in_order() {
        let (controller, actions, rx) = setup();
        controller.send(TransportMessage::Play);
        controller.send(TransportMessage::Pause);
        controller.send(TransportMessage::Stop);
        controller.wait_idle();

        assert_eq!(
            states(&rx),
            vec![
                TransportState::Playing,
                TransportState::Paused,
                TransportState::Stopped
            ]
        );
        assert_eq!(actions.calls(), vec!["play", "pause", "stop"]);
        assert_eq!(controller.state(), TransportState::Stopped);
    }

    #[test]
    fn test_stop_while_stopped_is_silent() {
        let (controller, actions, rx) = setup();
        controller.send(TransportMessage::Stop);
        controller.send(TransportMessage::Pause);
        controller.send(TransportMessage::ResumeFromSuspend);
        controller.wait_idle();

        assert!(states(&rx).is_empty());
        assert!(actions.calls().is_empty());
    }

    #[test]
    fn test_play_after_pause_resumes() {
        let (controller, actions, rx) = setup();
        controller.send(TransportMessage::Play);
        controller.send(TransportMessage::Pause);
        controller.send(TransportMessage::Play);
        controller.send(TransportMessage::Play);
        controller.wait_idle();

        assert_eq!(actions.calls(), vec!["play", "pause", "resume"]);
        assert_eq!(states(&rx).last(), Some(&TransportState::Resumed));
        assert!(controller.state().is_playing());
    }

    #[test]
    fn test_background_suspend_and_return() {
        let (controller, actions, rx) = setup();
        let handle = controller.handle();
        handle.play();
        handle.suspend();
        handle.suspend();
        handle.resume_from_suspend();
        handle.wait_idle();

        assert_eq!(
            states(&rx),
            vec![
                TransportState::Playing,
                TransportState::PausedBySystem,
                TransportState::Resumed
            ]
        );
        assert_eq!(actions.calls(), vec!["play", "pause", "resume"]);
    }

    #[test]
    fn test_user_pause_survives_return_from_background() {
        let (controller, actions, _rx) = setup();
        let handle = controller.handle();
        handle.play();
        handle.pause();
        handle.suspend();
        handle.resume_from_suspend();
        handle.wait_idle();

        assert_eq!(handle.state(), TransportState::Paused);
        assert_eq!(actions.calls(), vec!["play", "pause"]);
    }

    #[test]
    fn test_failed_action_still_commits() {
        let (controller, actions, rx) = setup();
        actions.failing.store(true, Ordering::SeqCst);
        controller.send(TransportMessage::Play);
        controller.wait_idle();

        assert_eq!(controller.state(), TransportState::Playing);
        assert_eq!(states(&rx), vec![TransportState::Playing]);
    }

    #[test]
    fn test_execute_is_ordered_with_messages() {
        let (controller, actions, _rx) = setup();
        controller.send(TransportMessage::Play);
        controller.execute(|a: &mut RecordingActions| {
            a.calls.lock().unwrap().push("job");
        });
        controller.send(TransportMessage::Stop);
        controller.wait_idle();

        assert_eq!(actions.calls(), vec!["play", "job", "stop"]);
    }

    #[test]
    fn test_concurrent_producers_yield_valid_history() {
        let (controller, actions, rx) = setup();
        let producers: Vec<_> = (0..4)
            .map(|i| {
                let handle = controller.handle();
                thread::spawn(move || {
                    for n in 0..50 {
                        match (i + n) % 3 {
                            0 => handle.play(),
                            1 => handle.pause(),
                            _ => handle.stop(),
                        };
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        controller.wait_idle();

        let history = states(&rx);
        assert_eq!(history.len(), actions.calls().len());
        let mut previous = TransportState::Stopped;
        for state in history {
            assert_ne!(state, previous);
            previous = state;
        }
        assert_eq!(controller.state(), previous);
    }

    #[test]
    fn test_shutdown_rejects_later_commands() {
        let (mut controller, actions, _rx) = setup();
        let handle = controller.handle();
        handle.play();
        controller.shutdown();

        assert_eq!(actions.calls(), vec!["play"]);
        assert!(!handle.stop());
        handle.wait_idle();
        assert_eq!(handle.state(), TransportState::Playing);
    }
}
