//! Notifications published by the player to whoever renders it

use crate::engine::VisualFrame;
use crate::timeline::CompiledTimeline;
use crate::transport::TransportState;
use crossbeam::channel::{Receiver, Sender};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The transport committed a new state
    StateChanged(TransportState),
    /// Offset recommended for the file just opened
    SuggestedTranspose(i32),
    /// Full note list of the file just opened
    NoteList(Arc<CompiledTimeline>),
    VisualFrame(VisualFrame),
    /// Playback time after a driver tick, in ms
    Position(u64),
    /// A key started sounding at the given display pitch
    NoteAttack { pitch: u8, at_ms: u64 },
}

pub type EventSender = Sender<PlayerEvent>;
pub type EventReceiver = Receiver<PlayerEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    crossbeam::channel::unbounded()
}
