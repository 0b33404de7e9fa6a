//! Transport functionality
//!
//! Play, pause, stop and system suspension are modeled as messages fed to a
//! small state machine:
//! - [`transition`] is the pure transition table
//! - [`PlaybackController`] applies messages one at a time on its own thread
//!   and calls the matching [`TransportActions`] exactly once per transition
mod controller;

pub use controller::{ControllerHandle, PlaybackController, TransportActions};

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
    /// Playing again after a user pause
    Resumed,
    /// Paused because the host went to the background
    PausedBySystem,
}

impl TransportState {
    pub fn is_playing(self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Resumed)
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            TransportState::Stopped => 0,
            TransportState::Playing => 1,
            TransportState::Paused => 2,
            TransportState::Resumed => 3,
            TransportState::PausedBySystem => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => TransportState::Playing,
            2 => TransportState::Paused,
            3 => TransportState::Resumed,
            4 => TransportState::PausedBySystem,
            _ => TransportState::Stopped,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Stopped => "stopped",
            TransportState::Playing => "playing",
            TransportState::Paused => "paused",
            TransportState::Resumed => "resumed",
            TransportState::PausedBySystem => "paused by system",
        };
        f.write_str(name)
    }
}

/// Transport intent, consumed in the order it was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMessage {
    Play,
    Stop,
    Pause,
    /// The host is going to the background
    Suspend,
    /// The host is back in the foreground
    ResumeFromSuspend,
}

/// Side effect of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Play,
    Pause,
    Resume,
    Stop,
}

/// An accepted message: what to do and where it leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub action: Action,
    pub next: TransportState,
}

/// The transition table, `None` for messages the state ignores
pub fn transition(state: TransportState, message: TransportMessage) -> Option<Transition> {
    use TransportMessage as M;
    use TransportState as S;

    let (action, next) = match (state, message) {
        (S::Stopped, M::Play) => (Action::Play, S::Playing),
        (S::Playing | S::Resumed, M::Pause) => (Action::Pause, S::Paused),
        (S::Playing | S::Resumed, M::Stop) => (Action::Stop, S::Stopped),
        (S::Playing | S::Resumed, M::Suspend) => (Action::Pause, S::PausedBySystem),
        (S::Paused, M::Play) => (Action::Resume, S::Resumed),
        (S::Paused, M::Stop) => (Action::Stop, S::Stopped),
        (S::PausedBySystem, M::Play | M::ResumeFromSuspend) => (Action::Resume, S::Resumed),
        (S::PausedBySystem, M::Stop) => (Action::Stop, S::Stopped),
        _ => return None,
    };
    Some(Transition { action, next })
}
