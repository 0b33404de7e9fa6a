use super::{EngineError, Result, SynthEngine, VisualFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A command received by [`MockEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    NoteOn(u8),
    NoteOff(u8),
    SetPaused(bool),
    Reset,
    Release,
}

/// Records commands so tests can inspect them after the engine was moved
/// into a player. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    commands: Arc<Mutex<Vec<EngineCommand>>>,
    failing: Arc<AtomicBool>,
    frame: Option<VisualFrame>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that hands out `frame` whenever asked for visuals
    pub fn with_frame(frame: VisualFrame) -> Self {
        Self {
            frame: Some(frame),
            ..Self::default()
        }
    }

    /// Makes every later command fail with [`EngineError::NotReady`]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<EngineCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
    }

    /// Pitches of every note-on in order
    pub fn notes_played(&self) -> Vec<u8> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                EngineCommand::NoteOn(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn record(&self, command: EngineCommand) -> Result<()> {
        self.commands.lock().unwrap().push(command);
        if self.failing.load(Ordering::SeqCst) {
            Err(EngineError::NotReady)
        } else {
            Ok(())
        }
    }
}

impl SynthEngine for MockEngine {
    fn note_on(&mut self, pitch: u8) -> Result<()> {
        self.record(EngineCommand::NoteOn(pitch))
    }

    fn note_off(&mut self, pitch: u8) -> Result<()> {
        self.record(EngineCommand::NoteOff(pitch))
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        self.record(EngineCommand::SetPaused(paused))
    }

    fn reset(&mut self) -> Result<()> {
        self.record(EngineCommand::Reset)
    }

    fn release(&mut self) -> Result<()> {
        self.record(EngineCommand::Release)
    }

    fn visual_frame(&mut self) -> Option<VisualFrame> {
        self.frame.clone()
    }
}
