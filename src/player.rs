//! The MIDI player
//!
//! [`MidiPlayer`] wires the pieces together:
//! - compiles an opened document and asks the advisor for a transposition
//! - owns the [`PlaybackController`] that serializes every transport change
//! - lets a [`ClockDriver`] advance the shared [`PlaybackClock`] while playing
//! - forwards sounding notes to the injected [`SynthEngine`]
//!
//! Everything the UI needs arrives as [`PlayerEvent`]s or through
//! copy-out [`MidiPlayer::snapshot`] calls.
use crate::clock::{ClockDriver, ClockSettings, ClockSnapshot, DriverSettings, PlaybackClock};
use crate::engine::{self, EngineError, SharedEngine, SynthEngine};
use crate::events::{EventSender, PlayerEvent};
use crate::midi::MidiDocument;
use crate::state::SharedTransportState;
use crate::timeline::{CompileError, CompilePolicy, CompiledTimeline, TimelineCompiler};
use crate::transpose::{PitchBand, TransposeAdvisor, TransposeAnalysis, TransposeError};
use crate::transport::{PlaybackController, TransportActions, TransportMessage, TransportState};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSettings {
    pub compile: CompilePolicy,
    pub band: PitchBand,
    pub clock: ClockSettings,
    pub driver: DriverSettings,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            compile: CompilePolicy::default(),
            band: PitchBand { low: 60, high: 60 },
            clock: ClockSettings::default(),
            driver: DriverSettings::default(),
        }
    }
}

/// What [`MidiPlayer::open`] found in a document
#[derive(Debug, Clone)]
pub struct LoadedSong {
    pub timeline: Arc<CompiledTimeline>,
    /// `None` when the document has no pitched notes
    pub analysis: Option<TransposeAnalysis>,
    pub suggested_transpose: i32,
}

/// Transport side effects, run only on the controller thread
pub struct PlayerCore {
    clock: Arc<Mutex<PlaybackClock>>,
    engine: SharedEngine,
    driver: ClockDriver,
}

impl PlayerCore {
    fn engine(&self) -> Result<MutexGuard<'_, Box<dyn SynthEngine>>, EngineError> {
        self.engine.lock().map_err(|_| EngineError::NotReady)
    }

    fn set_engine_paused(&self, paused: bool) -> Result<(), EngineError> {
        self.engine()?.set_paused(paused)
    }

    /// Runs `f` on the clock with the driver parked, restarting it after
    fn with_clock<R>(&mut self, f: impl FnOnce(&mut PlaybackClock) -> R) -> R {
        let was_running = self.driver.is_running();
        self.driver.stop();
        let result = f(&mut lock_clock(&self.clock));
        if was_running {
            self.driver.start();
        }
        result
    }

    fn load(&mut self, timeline: Arc<CompiledTimeline>) {
        self.with_clock(|clock| clock.load(timeline));
    }

    fn seek(&mut self, time_ms: u64) {
        if let Err(e) = self.engine().and_then(|mut e| e.reset()) {
            warn!("Engine reset before seek failed: {}", e);
        }
        self.with_clock(|clock| clock.seek_to(time_ms));
    }

    fn set_transpose(&mut self, semitones: i32) {
        if lock_clock(&self.clock).transpose() == semitones {
            return;
        }
        // sounding notes were sent at the old pitch
        if let Err(e) = self.engine().and_then(|mut e| e.reset()) {
            warn!("Engine reset before transpose failed: {}", e);
        }
        self.with_clock(|clock| clock.set_transpose(semitones));
    }

    fn release(&mut self) {
        self.driver.stop();
        if let Err(e) = self.engine().and_then(|mut e| e.release()) {
            warn!("Engine release failed: {}", e);
        }
    }
}

impl TransportActions for PlayerCore {
    fn internal_play(&mut self) -> Result<(), EngineError> {
        let result = self.set_engine_paused(false);
        self.driver.start();
        result
    }

    fn internal_pause(&mut self) -> Result<(), EngineError> {
        self.driver.stop();
        self.set_engine_paused(true)
    }

    fn internal_resume(&mut self) -> Result<(), EngineError> {
        let result = self.set_engine_paused(false);
        self.driver.start();
        result
    }

    fn internal_stop(&mut self) -> Result<(), EngineError> {
        self.driver.stop();
        let paused = self.set_engine_paused(true);
        let reset = self.engine().and_then(|mut e| e.reset());
        lock_clock(&self.clock).reset();
        paused.and(reset)
    }
}

fn lock_clock(clock: &Mutex<PlaybackClock>) -> MutexGuard<'_, PlaybackClock> {
    clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MidiPlayer {
    controller: PlaybackController<PlayerCore>,
    clock: Arc<Mutex<PlaybackClock>>,
    events: EventSender,
    compiler: TimelineCompiler,
    advisor: TransposeAdvisor,
    shut_down: bool,
}

impl MidiPlayer {
    pub fn new(engine: Box<dyn SynthEngine>, settings: PlayerSettings, events: EventSender) -> Self {
        let clock = Arc::new(Mutex::new(PlaybackClock::empty(settings.clock)));
        let engine = engine::share(engine);

        let controller = PlaybackController::spawn_with(events.clone(), |handle| {
            let on_finished = Arc::new(move || {
                handle.send(TransportMessage::Stop);
            });
            PlayerCore {
                clock: Arc::clone(&clock),
                engine: Arc::clone(&engine),
                driver: ClockDriver::new(
                    Arc::clone(&clock),
                    Arc::clone(&engine),
                    events.clone(),
                    settings.driver,
                    on_finished,
                ),
            }
        });
        info!("MIDI player ready");

        Self {
            controller,
            clock,
            events,
            compiler: TimelineCompiler::new(settings.compile),
            advisor: TransposeAdvisor::new(settings.band),
            shut_down: false,
        }
    }

    /// Compiles `document` and queues it for playback, stopping whatever
    /// was playing before.
    pub fn open(&self, document: &MidiDocument) -> Result<LoadedSong, CompileError> {
        let timeline = Arc::new(self.compiler.compile(document)?);

        let analysis = match self.advisor.analyze(&timeline) {
            Ok(analysis) => Some(analysis),
            Err(TransposeError::NoMaterial) => {
                warn!("No pitched notes to analyze, keeping transpose at 0");
                None
            }
            Err(e) => {
                warn!("Transpose analysis failed: {}", e);
                None
            }
        };
        let suggested_transpose = analysis.as_ref().map_or(0, |a| a.suggested);
        info!(
            "Opened {} notes ({} ms), suggested transpose {}",
            timeline.len(),
            timeline.duration_ms(),
            suggested_transpose
        );

        let _ = self
            .events
            .send(PlayerEvent::SuggestedTranspose(suggested_transpose));
        let _ = self.events.send(PlayerEvent::NoteList(Arc::clone(&timeline)));

        self.controller.send(TransportMessage::Stop);
        let loaded = Arc::clone(&timeline);
        self.controller.execute(move |core| core.load(loaded));

        Ok(LoadedSong {
            timeline,
            analysis,
            suggested_transpose,
        })
    }

    pub fn play(&self) {
        self.controller.send(TransportMessage::Play);
    }

    pub fn pause(&self) {
        self.controller.send(TransportMessage::Pause);
    }

    pub fn stop(&self) {
        self.controller.send(TransportMessage::Stop);
    }

    /// The host moved the player to the background
    pub fn suspend(&self) {
        self.controller.send(TransportMessage::Suspend);
    }

    pub fn resume_from_suspend(&self) {
        self.controller.send(TransportMessage::ResumeFromSuspend);
    }

    pub fn seek(&self, time_ms: u64) {
        debug!("Seek to {} ms requested", time_ms);
        self.controller.execute(move |core| core.seek(time_ms));
    }

    pub fn set_transpose(&self, semitones: i32) {
        debug!("Transpose {} requested", semitones);
        self.controller
            .execute(move |core| core.set_transpose(semitones));
    }

    /// Blocks until every request made so far has been applied
    pub fn wait_idle(&self) {
        self.controller.wait_idle();
    }

    pub fn state(&self) -> TransportState {
        self.controller.state()
    }

    pub fn shared_state(&self) -> SharedTransportState {
        self.controller.handle().shared_state()
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        lock_clock(&self.clock).snapshot()
    }

    pub fn is_finished(&self) -> bool {
        lock_clock(&self.clock).is_finished()
    }

    /// Stops playback, releases the engine and joins the controller thread
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.controller.send(TransportMessage::Stop);
        self.controller.execute(|core| core.release());
        self.controller.shutdown();
        info!("MIDI player shut down");
    }
}

impl Drop for MidiPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
