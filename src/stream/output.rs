//! Output observers
//!
//! Observers receive every frame the stream accepts, raw or compressed,
//! published or played. The registry keeps them in registration order and
//! never holds the same observer twice.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::media::Frame;

use super::state::StreamContext;

/// Error an observer may report from its callback
pub type OutputError = Box<dyn std::error::Error + Send + Sync>;

/// Receives frames from a stream
pub trait StreamOutput: Send + Sync {
    /// Called once per accepted frame
    ///
    /// Must not call back into the stream's `append` entry points.
    fn on_frame(&self, stream: &StreamContext, frame: &Frame) -> Result<(), OutputError>;
}

/// Ordered, identity de-duplicated set of observers
#[derive(Default, Clone)]
pub struct OutputRegistry {
    outputs: Vec<Arc<dyn StreamOutput>>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Returns `false` if it was already present.
    pub fn add(&mut self, output: Arc<dyn StreamOutput>) -> bool {
        if self.contains(&output) {
            return false;
        }
        self.outputs.push(output);
        true
    }

    /// Remove an observer by identity. Returns `false` if it was absent.
    pub fn remove(&mut self, output: &Arc<dyn StreamOutput>) -> bool {
        match self.outputs.iter().position(|o| same(o, output)) {
            Some(index) => {
                self.outputs.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, output: &Arc<dyn StreamOutput>) -> bool {
        self.outputs.iter().any(|o| same(o, output))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Deliver `frame` to every observer in registration order
    ///
    /// A failing or panicking observer is logged and skipped; delivery to
    /// the remaining observers continues.
    pub fn fan_out(&self, stream: &StreamContext, frame: &Frame) {
        for (index, output) in self.outputs.iter().enumerate() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| output.on_frame(stream, frame)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        stream_id = stream.stream_id,
                        output = index,
                        error = %e,
                        "Output failed to handle frame"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        stream_id = stream.stream_id,
                        output = index,
                        "Output panicked while handling frame"
                    );
                }
            }
        }
    }
}

/// Identity comparison on the data pointer, ignoring vtables
fn same(a: &Arc<dyn StreamOutput>, b: &Arc<dyn StreamOutput>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
