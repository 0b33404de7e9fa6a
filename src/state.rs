use crate::transport::TransportState;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Read-only view of the transport state for threads other than the
/// controller. Clones observe the same value.
#[derive(Debug, Clone)]
pub struct SharedTransportState {
    state: Arc<AtomicU8>,
}

impl Default for SharedTransportState {
    fn default() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(TransportState::Stopped.to_u8())),
        }
    }
}

impl SharedTransportState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_playing(&self) -> bool {
        self.get().is_playing()
    }

    pub(crate) fn set(&self, state: TransportState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }
}
