use super::{transition, Action, TransportMessage, TransportState};
use crate::engine::EngineError;
use crate::events::{EventSender, PlayerEvent};
use crate::state::SharedTransportState;
use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, info, warn};
use std::thread::{self, JoinHandle};

/// Side effects the controller performs on accepted transitions
pub trait TransportActions: Send + 'static {
    fn internal_play(&mut self) -> Result<(), EngineError>;
    fn internal_pause(&mut self) -> Result<(), EngineError>;
    fn internal_resume(&mut self) -> Result<(), EngineError>;
    fn internal_stop(&mut self) -> Result<(), EngineError>;
}

type Job<A> = Box<dyn FnOnce(&mut A) + Send>;

enum Command<A> {
    Transport(TransportMessage),
    Execute(Job<A>),
    Barrier(Sender<()>),
    Shutdown,
}

/// Cloneable producer side of a [`PlaybackController`]
pub struct ControllerHandle<A> {
    sender: Sender<Command<A>>,
    state: SharedTransportState,
}

impl<A> Clone for ControllerHandle<A> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            state: self.state.clone(),
        }
    }
}

impl<A: TransportActions> ControllerHandle<A> {
    /// Enqueues a transport message; false once the controller is gone
    pub fn send(&self, message: TransportMessage) -> bool {
        self.enqueue(Command::Transport(message))
    }

    pub fn play(&self) -> bool {
        self.send(TransportMessage::Play)
    }

    pub fn pause(&self) -> bool {
        self.send(TransportMessage::Pause)
    }

    pub fn stop(&self) -> bool {
        self.send(TransportMessage::Stop)
    }

    pub fn suspend(&self) -> bool {
        self.send(TransportMessage::Suspend)
    }

    pub fn resume_from_suspend(&self) -> bool {
        self.send(TransportMessage::ResumeFromSuspend)
    }

    /// Runs `job` on the controller thread, ordered with transport messages
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut A) + Send + 'static,
    {
        self.enqueue(Command::Execute(Box::new(job)))
    }

    /// Blocks until everything enqueued before this call has been processed
    pub fn wait_idle(&self) {
        let (done_tx, done_rx) = channel::bounded(1);
        if self.enqueue(Command::Barrier(done_tx)) {
            let _ = done_rx.recv();
        }
    }

    pub fn state(&self) -> TransportState {
        self.state.get()
    }

    pub fn shared_state(&self) -> SharedTransportState {
        self.state.clone()
    }

    fn enqueue(&self, command: Command<A>) -> bool {
        if self.sender.send(command).is_err() {
            debug!("Playback controller is shut down, command dropped");
            return false;
        }
        true
    }
}

/// Serializes transport intent from any number of threads onto one
/// processing thread that owns the actions object
pub struct PlaybackController<A> {
    handle: ControllerHandle<A>,
    thread_handle: Option<JoinHandle<()>>,
}

impl<A: TransportActions> PlaybackController<A> {
    pub fn spawn(actions: A, events: EventSender) -> Self {
        Self::spawn_with(events, |_| actions)
    }

    /// Like [`spawn`](Self::spawn), for actions that need a handle back to
    /// their own controller
    pub fn spawn_with<F>(events: EventSender, build: F) -> Self
    where
        F: FnOnce(ControllerHandle<A>) -> A,
    {
        let (sender, receiver) = channel::unbounded();
        let handle = ControllerHandle {
            sender,
            state: SharedTransportState::new(),
        };
        let actions = build(handle.clone());
        let state = handle.state.clone();

        let thread_handle = thread::spawn(move || {
            process_commands(actions, receiver, state, events);
        });
        info!("Playback controller started");

        Self {
            handle,
            thread_handle: Some(thread_handle),
        }
    }

    pub fn handle(&self) -> ControllerHandle<A> {
        self.handle.clone()
    }

    pub fn send(&self, message: TransportMessage) -> bool {
        self.handle.send(message)
    }

    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut A) + Send + 'static,
    {
        self.handle.execute(job)
    }

    pub fn wait_idle(&self) {
        self.handle.wait_idle()
    }

    pub fn state(&self) -> TransportState {
        self.handle.state()
    }

    /// Processes what is already queued, then stops the thread and joins it
    pub fn shutdown(&mut self) {
        let Some(thread_handle) = self.thread_handle.take() else {
            return;
        };
        let _ = self.handle.sender.send(Command::Shutdown);
        let _ = thread_handle.join();
        info!("Playback controller shut down");
    }
}

impl<A> Drop for PlaybackController<A> {
    fn drop(&mut self) {
        if let Some(thread_handle) = self.thread_handle.take() {
            let _ = self.handle.sender.send(Command::Shutdown);
            let _ = thread_handle.join();
        }
    }
}

fn process_commands<A: TransportActions>(
    mut actions: A,
    receiver: Receiver<Command<A>>,
    state: SharedTransportState,
    events: EventSender,
) {
    let mut current = state.get();

    for command in receiver.iter() {
        match command {
            Command::Transport(message) => {
                let Some(t) = transition(current, message) else {
                    debug!("Ignoring {:?} while {}", message, current);
                    continue;
                };
                let result = match t.action {
                    Action::Play => actions.internal_play(),
                    Action::Pause => actions.internal_pause(),
                    Action::Resume => actions.internal_resume(),
                    Action::Stop => actions.internal_stop(),
                };
                if let Err(e) = result {
                    warn!("Transport action {:?} failed: {}", t.action, e);
                }

                debug!("Transport {} -> {} on {:?}", current, t.next, message);
                current = t.next;
                state.set(current);
                let _ = events.send(PlayerEvent::StateChanged(current));
            }
            Command::Execute(job) => job(&mut actions),
            Command::Barrier(done) => {
                let _ = done.send(());
            }
            Command::Shutdown => break,
        }
    }
    debug!("Playback controller thread exited");
}
