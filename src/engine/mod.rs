//! Synthesis engine seam
//!
//! The player never renders audio itself. It drives an engine through the
//! narrow [`SynthEngine`] command interface:
//! - [`SilentEngine`] only logs what it would play
//! - [`MockEngine`] records every command for tests
//! - `MidirEngine` (feature `midi-output`) forwards notes to a MIDI output port
mod mock_engine;
#[cfg(feature = "midi-output")]
pub mod midir_engine;

pub use mock_engine::{EngineCommand, MockEngine};
#[cfg(feature = "midi-output")]
pub use midir_engine::MidirEngine;

use log::{debug, trace};
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Custom error type for engine commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine has not been created or was already released
    NotReady,
    /// The engine refused the command
    Rejected(String),
    /// The output device failed
    Device(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotReady => write!(f, "Engine not ready"),
            EngineError::Rejected(msg) => write!(f, "Engine rejected command: {}", msg),
            EngineError::Device(msg) => write!(f, "Engine device error: {}", msg),
        }
    }
}

impl Error for EngineError {}

/// Result type for engine commands
pub type Result<T> = std::result::Result<T, EngineError>;

/// Commands the player sends to a synthesis engine
pub trait SynthEngine: Send {
    /// Starts a note at the given (already transposed) pitch
    fn note_on(&mut self, pitch: u8) -> Result<()>;

    /// Ends a note; engines with self-decaying voices can ignore it
    fn note_off(&mut self, _pitch: u8) -> Result<()> {
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) -> Result<()>;

    /// Silences every voice and returns the synthesizer to its initial state
    fn reset(&mut self) -> Result<()>;

    /// Frees the engine; later commands may fail with [`EngineError::NotReady`]
    fn release(&mut self) -> Result<()>;

    /// Latest waveform/spectrum snapshot, if the engine produces one
    fn visual_frame(&mut self) -> Option<VisualFrame> {
        None
    }
}

/// Engine handle shared by the transport thread and the clock driver
pub type SharedEngine = Arc<Mutex<Box<dyn SynthEngine>>>;

pub fn share(engine: Box<dyn SynthEngine>) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}

/// Level floor for silence, in dBFS
pub const DB_FLOOR: f32 = -50.0;

/// RMS and peak level of a block of samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VuLevel {
    pub rms_db: f32,
    pub peak_db: f32,
}

impl VuLevel {
    /// Measures samples in `[-1, 1]`
    pub fn from_pcm(pcm: &[f32]) -> Self {
        if pcm.is_empty() {
            return Self::silence();
        }
        let sum: f64 = pcm.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
        let rms = (sum / pcm.len() as f64).sqrt() as f32;
        let peak = pcm.iter().fold(0.0f32, |p, &x| p.max(x.abs()));
        Self {
            rms_db: lin_to_db(rms),
            peak_db: lin_to_db(peak),
        }
    }

    pub fn silence() -> Self {
        Self {
            rms_db: DB_FLOOR,
            peak_db: DB_FLOOR,
        }
    }
}

fn lin_to_db(v: f32) -> f32 {
    if v <= 0.0 {
        return DB_FLOOR;
    }
    (20.0 * v.log10()).max(DB_FLOOR)
}

/// Audio snapshot relayed to the UI
#[derive(Debug, Clone, PartialEq)]
pub struct VisualFrame {
    pub waveform: Vec<f32>,
    pub spectrum: Vec<f32>,
    pub level: VuLevel,
}

impl VisualFrame {
    pub fn new(waveform: Vec<f32>, spectrum: Vec<f32>) -> Self {
        let level = VuLevel::from_pcm(&waveform);
        Self {
            waveform,
            spectrum,
            level,
        }
    }
}

/// Engine that produces no sound and just logs the commands it gets
#[derive(Debug)]
pub struct SilentEngine {
    paused: bool,
}

impl Default for SilentEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SilentEngine {
    pub fn new() -> Self {
        Self { paused: true }
    }
}

impl SynthEngine for SilentEngine {
    fn note_on(&mut self, pitch: u8) -> Result<()> {
        trace!("Silent engine note on: {}", pitch);
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        if self.paused != paused {
            debug!("Silent engine paused: {}", paused);
        }
        self.paused = paused;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        debug!("Silent engine reset");
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        debug!("Silent engine released");
        Ok(())
    }
}
