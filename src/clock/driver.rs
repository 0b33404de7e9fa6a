use super::{ClockFrame, PlaybackClock};
use crate::engine::SharedEngine;
use crate::events::{EventSender, PlayerEvent};
use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub tick_interval: Duration,
    pub visual_interval: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            visual_interval: Duration::from_millis(30),
        }
    }
}

/// Callback run once when the clock plays past the last note
pub type FinishedCallback = Arc<dyn Fn() + Send + Sync>;

/// Advances a [`PlaybackClock`] in real time and forwards key transitions to
/// the engine
pub struct ClockDriver {
    clock: Arc<Mutex<PlaybackClock>>,
    engine: SharedEngine,
    events: EventSender,
    settings: DriverSettings,
    on_finished: FinishedCallback,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ClockDriver {
    pub fn new(
        clock: Arc<Mutex<PlaybackClock>>,
        engine: SharedEngine,
        events: EventSender,
        settings: DriverSettings,
        on_finished: FinishedCallback,
    ) -> Self {
        Self {
            clock,
            engine,
            events,
            settings,
            on_finished,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the advance thread, a no-op while it is already running
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        // Reap a thread that ended on its own after the last note
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        let clock = Arc::clone(&self.clock);
        let engine = Arc::clone(&self.engine);
        let events = self.events.clone();
        let on_finished = Arc::clone(&self.on_finished);
        let running = Arc::clone(&self.running);
        let settings = self.settings;

        self.running.store(true, Ordering::SeqCst);
        info!("Clock driver started");

        self.thread_handle = Some(thread::spawn(move || {
            let mut last = Instant::now();
            let mut carry_us: u128 = 0;
            let mut last_visual: Option<Instant> = None;

            loop {
                let tick_start = Instant::now();

                let now = Instant::now();
                carry_us += now.duration_since(last).as_micros();
                last = now;
                let elapsed_ms = (carry_us / 1000) as u64;
                carry_us %= 1000;

                let (frame, finished) = match clock.lock() {
                    Ok(mut clock) => (clock.advance(elapsed_ms), clock.is_finished()),
                    Err(_) => {
                        error!("Playback clock lock poisoned, stopping driver");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                };

                forward_to_engine(&engine, &frame);
                let _ = events.send(PlayerEvent::Position(frame.time_ms));
                for attack in &frame.attacks {
                    let _ = events.send(PlayerEvent::NoteAttack {
                        pitch: attack.pitch,
                        at_ms: attack.at_ms,
                    });
                }

                if last_visual.map_or(true, |t| now.duration_since(t) >= settings.visual_interval) {
                    last_visual = Some(now);
                    let visual = engine.lock().ok().and_then(|mut e| e.visual_frame());
                    if let Some(visual) = visual {
                        let _ = events.send(PlayerEvent::VisualFrame(visual));
                    }
                }

                if finished {
                    info!("Playback reached the end at {} ms", frame.time_ms);
                    running.store(false, Ordering::SeqCst);
                    on_finished();
                    break;
                }

                let elapsed = tick_start.elapsed();
                if elapsed < settings.tick_interval {
                    thread::sleep(settings.tick_interval - elapsed);
                }
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
            debug!("Clock driver thread exited");
        }));
    }

    /// Stops the thread and waits for it, no advance happens after this returns
    pub fn stop(&mut self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        if was_running {
            info!("Clock driver stopped");
        }
    }
}

impl Drop for ClockDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn forward_to_engine(engine: &SharedEngine, frame: &ClockFrame) {
    if frame.attacks.is_empty() && frame.releases.is_empty() {
        return;
    }
    let Ok(mut engine) = engine.lock() else {
        warn!("Engine lock poisoned, dropping {} transitions", frame.attacks.len());
        return;
    };
    for release in &frame.releases {
        if let Err(e) = engine.note_off(release.pitch) {
            warn!("Engine note off {} failed: {}", release.pitch, e);
        }
    }
    for attack in &frame.attacks {
        if let Err(e) = engine.note_on(attack.pitch) {
            warn!("Engine note on {} failed: {}", attack.pitch, e);
        }
    }
}
