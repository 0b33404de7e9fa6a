//! User interface components
//!
//! Terminal progress display for the command-line player:
//! - playback position bar
//! - currently lit keys, faded with the attack/release envelope
//! - transport state and output level spinner
//!
//! The UI is built using the indicatif library for progress bars and spinners.

mod progress;

pub use progress::{
    create_keys_line, create_position_bar, create_transport_spinner, format_position,
};

use crate::clock::{ClockSnapshot, Envelope};
use crate::events::{EventReceiver, PlayerEvent};
use crate::player::MidiPlayer;
use crate::transport::TransportState;
use crate::transpose::pitch_name;
use crossbeam::channel::RecvTimeoutError;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};
use log::debug;
use std::time::Duration;

const REFRESH_INTERVAL: Duration = Duration::from_millis(100);
/// Keys dimmer than this are not listed
const LIT_THRESHOLD: f32 = 0.05;

/// Names of the keys visibly lit in `snapshot`, lowest first
pub fn lit_keys(snapshot: &ClockSnapshot, envelope: Envelope) -> Vec<String> {
    snapshot
        .keys
        .iter()
        .enumerate()
        .filter(|(_, key)| key.intensity(snapshot.time_ms, envelope) > LIT_THRESHOLD)
        .filter_map(|(pitch, _)| u8::try_from(pitch).ok())
        .map(pitch_name)
        .collect()
}

pub struct PlaybackUi {
    #[allow(dead_code)]
    multi_progress: MultiProgress,
    position_pb: ProgressBar,
    keys_pb: ProgressBar,
    transport_pb: ProgressBar,
    duration_ms: u64,
    envelope: Envelope,
}

impl PlaybackUi {
    pub fn new(duration_ms: u64, envelope: Envelope) -> Self {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let position_pb = create_position_bar(&multi_progress, duration_ms);
        let keys_pb = create_keys_line(&multi_progress);
        let transport_pb = create_transport_spinner(&multi_progress);

        PlaybackUi {
            multi_progress,
            position_pb,
            keys_pb,
            transport_pb,
            duration_ms,
            envelope,
        }
    }

    /// Renders player events until playback stops after having started
    pub fn run(&self, player: &MidiPlayer, events: &EventReceiver) {
        let mut started = false;
        let mut level = String::new();
        let mut transport = TransportState::Stopped;

        loop {
            match events.recv_timeout(REFRESH_INTERVAL) {
                Ok(PlayerEvent::StateChanged(state)) => {
                    transport = state;
                    if state == TransportState::Stopped && started {
                        break;
                    }
                    started |= state.is_playing();
                }
                Ok(PlayerEvent::Position(time_ms)) => self.show_position(time_ms),
                Ok(PlayerEvent::VisualFrame(frame)) => {
                    level = format!(
                        "{:.1} dB rms, {:.1} dB peak",
                        frame.level.rms_db, frame.level.peak_db
                    );
                }
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Player event channel closed");
                    break;
                }
            }

            let snapshot = player.snapshot();
            self.keys_pb
                .set_message(lit_keys(&snapshot, self.envelope).join(" "));
            self.transport_pb.set_message(format!(
                "{}, transpose {:+} {}",
                transport, snapshot.transpose, level
            ));
            self.transport_pb.tick();
        }

        self.show_position(self.duration_ms);
        self.transport_pb.finish_with_message("finished");
        self.keys_pb.finish_and_clear();
        self.position_pb.finish();
    }

    fn show_position(&self, time_ms: u64) {
        self.position_pb.set_position(time_ms.min(self.duration_ms));
        self.position_pb.set_message(format!(
            "{} / {}",
            format_position(time_ms),
            format_position(self.duration_ms)
        ));
    }
}
