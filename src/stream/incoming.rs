//! Incoming media pipeline
//!
//! Demultiplexed frames are passed through the sound transform and handed
//! to the attached render sink. Each start returns a new session epoch so a
//! late teardown of an old session cannot stop a newer one.
//!
//! [`IncomingPipeline::append`] only prepares the frame; the sink runs when
//! the caller invokes [`PreparedFrame::render`], after releasing its locks.

use std::sync::Arc;

use bytes::Bytes;

use crate::media::{AudioFrame, Frame};

/// Consumes frames for playback
pub trait RenderSink: Send + Sync {
    fn render(&self, frame: &Frame);
}

/// Volume adjustment applied to raw audio before rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundTransform {
    /// Linear gain, 1.0 = unchanged
    pub volume: f32,
    pub muted: bool,
}

impl Default for SoundTransform {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
        }
    }
}

impl SoundTransform {
    /// Apply to a raw s16le PCM frame. Compressed frames pass unchanged.
    pub fn apply(&self, frame: AudioFrame) -> AudioFrame {
        if frame.compressed {
            return frame;
        }
        if self.muted {
            return frame.muted();
        }
        if (self.volume - 1.0).abs() < f32::EPSILON {
            return frame;
        }

        let mut scaled = Vec::with_capacity(frame.data.len());
        for chunk in frame.data.chunks(2) {
            match chunk {
                [lo, hi] => {
                    let sample = f32::from(i16::from_le_bytes([*lo, *hi])) * self.volume;
                    let sample = sample.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
                    scaled.extend_from_slice(&sample.to_le_bytes());
                }
                // Odd trailing byte is not a sample
                rest => scaled.extend_from_slice(rest),
            }
        }

        AudioFrame {
            data: Bytes::from(scaled),
            ..frame
        }
    }
}

/// Play-side pipeline
#[derive(Default)]
pub struct IncomingPipeline {
    sound_transform: SoundTransform,
    sink: Option<Arc<dyn RenderSink>>,
    running: bool,
    epoch: u64,
    rendered: u64,
}

impl IncomingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start a new session and return its epoch
    ///
    /// Every call opens a new epoch, even if the previous session's
    /// teardown has not run yet.
    pub fn start_running(&mut self) -> u64 {
        self.running = true;
        self.epoch += 1;
        self.rendered = 0;
        self.epoch
    }

    /// Stop the session identified by `epoch`
    ///
    /// No-op if that session already ended or a newer one started.
    pub fn stop_running(&mut self, epoch: u64) {
        if self.running && self.epoch == epoch {
            self.running = false;
            tracing::debug!(epoch, rendered = self.rendered, "Incoming pipeline stopped");
        }
    }

    /// Current session epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Transform a demultiplexed frame for rendering
    ///
    /// Returns `None` if the pipeline is stopped.
    pub fn append(&mut self, frame: Frame) -> Option<PreparedFrame> {
        if !self.running {
            return None;
        }

        let frame = match frame {
            Frame::Audio { frame, timestamp } => Frame::Audio {
                frame: self.sound_transform.apply(frame),
                timestamp,
            },
            video => video,
        };

        self.rendered += 1;
        Some(PreparedFrame {
            frame,
            sink: self.sink.clone(),
        })
    }

    pub fn sound_transform(&self) -> SoundTransform {
        self.sound_transform
    }

    pub fn set_sound_transform(&mut self, transform: SoundTransform) {
        self.sound_transform = transform;
    }

    /// Attach a render sink; `None` detaches the current one
    pub fn attach(&mut self, sink: Option<Arc<dyn RenderSink>>) {
        self.sink = sink;
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }
}

/// A transformed frame waiting for the sink attached when it was prepared
pub struct PreparedFrame {
    frame: Frame,
    sink: Option<Arc<dyn RenderSink>>,
}

impl PreparedFrame {
    /// The frame as it will be rendered
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Hand the frame to the sink, if any, and return it
    pub fn render(self) -> Frame {
        if let Some(sink) = &self.sink {
            sink.render(&self.frame);
        }
        self.frame
    }
}
