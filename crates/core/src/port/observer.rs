// Progress Observer Port
// Decouples state-machine progress events from any particular output
// mechanism. The CLI installs a console observer; tests record transitions.

use crate::domain::pipeline::PipelineState;
use std::time::Duration;

/// Receives one event per pipeline state transition.
pub trait ProgressObserver: Send + Sync {
    fn on_transition(&self, state: &PipelineState, elapsed: Duration);
}

/// Observer that discards all events.
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_transition(&self, _state: &PipelineState, _elapsed: Duration) {}
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records every transition for later assertion.
    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<(PipelineState, Duration)>>,
    }

    impl RecordingObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn states(&self) -> Vec<PipelineState> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(state, _)| state.clone())
                .collect()
        }
    }

    impl ProgressObserver for RecordingObserver {
        fn on_transition(&self, state: &PipelineState, elapsed: Duration) {
            self.events.lock().unwrap().push((state.clone(), elapsed));
        }
    }
}
