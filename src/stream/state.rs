//! Stream lifecycle state
//!
//! A stream is either idle, publishing (sending media) or playing
//! (receiving media). Switching between publishing and playing always
//! passes through idle.

use std::time::{Duration, Instant};

/// Stream lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Not publishing or playing
    #[default]
    Idle,
    /// Sending locally produced media
    Publishing,
    /// Receiving and rendering remote media
    Playing,
}

impl StreamState {
    /// Whether the stream is publishing or playing
    pub fn is_active(&self) -> bool {
        !matches!(self, StreamState::Idle)
    }
}

/// Read-only view of a stream handed to observers and strategies
#[derive(Debug, Clone)]
pub struct StreamContext {
    /// Process-unique stream id
    pub stream_id: u64,

    /// Name passed to publish/play, if active
    pub name: Option<String>,

    /// Current state
    pub state: StreamState,

    /// Time the current session started
    pub started_at: Option<Instant>,
}

impl StreamContext {
    pub fn new(stream_id: u64) -> Self {
        Self {
            stream_id,
            name: None,
            state: StreamState::Idle,
            started_at: None,
        }
    }

    /// Enter an active state under `name`
    pub(crate) fn start(&mut self, state: StreamState, name: String) {
        self.state = state;
        self.name = Some(name);
        self.started_at = Some(Instant::now());
    }

    /// Return to idle
    pub(crate) fn stop(&mut self) {
        self.state = StreamState::Idle;
        self.name = None;
        self.started_at = None;
    }

    pub fn is_publishing(&self) -> bool {
        self.state == StreamState::Publishing
    }

    pub fn is_playing(&self) -> bool {
        self.state == StreamState::Playing
    }

    /// Time since the current session started
    pub fn duration(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_lifecycle() {
        let mut ctx = StreamContext::new(1);

        assert_eq!(ctx.state, StreamState::Idle);
        assert!(!ctx.is_publishing());
        assert!(ctx.duration().is_none());

        ctx.start(StreamState::Publishing, "test_key".into());
        assert!(ctx.is_publishing());
        assert!(ctx.state.is_active());
        assert_eq!(ctx.name.as_deref(), Some("test_key"));
        assert!(ctx.started_at.is_some());

        ctx.stop();
        assert_eq!(ctx.state, StreamState::Idle);
        assert!(ctx.name.is_none());
    }
}
