//! A music-box style MIDI player
//!
//! Decodes a Standard MIDI File, compiles it into an absolute-time note
//! timeline, suggests a transposition and plays it back through a
//! pluggable synthesis engine while tracking which keys are lit.
pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod events;
pub mod logging;
pub mod midi;
pub mod player;
pub mod state;
pub mod timeline;
pub mod transport;
pub mod transpose;
pub mod ui;

pub use clock::{ClockSnapshot, KeyState, PlaybackClock};
pub use events::PlayerEvent;
pub use player::{MidiPlayer, PlayerSettings};
pub use state::SharedTransportState;
pub use timeline::{CompiledTimeline, NoteEvent, TimelineCompiler};
pub use transport::{TransportMessage, TransportState};
