//! Outgoing media pipeline
//!
//! Raw frames from the source enter here. Video is buffered in a bounded
//! input queue and encoded by a forwarding task; audio is encoded inline.
//! Encoded frames leave through the output channels returned by
//! [`OutgoingPipeline::start_running`], which the stream drains back into
//! its compressed-frame path.
//!
//! ```text
//!  append_video ──► [video input queue] ──► encode_video ──► video out
//!  append_audio ─────────────────────────► encoder ────────► audio out
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::media::{
    AudioFrame, AudioInputFormat, AudioSettings, MediaKind, VideoFrame, VideoInputFormat,
    VideoSettings,
};

/// Encodes raw video frames
pub trait VideoEncoder: Send {
    /// Encode one raw frame. May return zero or more compressed frames.
    fn encode(&mut self, frame: VideoFrame, settings: &VideoSettings) -> Vec<VideoFrame>;
}

/// Encodes raw audio frames
pub trait AudioEncoder: Send {
    /// Encode one raw buffer. May return zero or more compressed frames.
    fn encode(
        &mut self,
        frame: AudioFrame,
        timestamp: Duration,
        settings: &AudioSettings,
    ) -> Vec<(AudioFrame, Duration)>;
}

/// Receiving ends of a running pipeline
///
/// Every channel closes when the pipeline stops.
#[derive(Debug)]
pub struct OutgoingOutputs {
    /// Buffered raw video waiting for the encoder
    pub video_input: mpsc::Receiver<VideoFrame>,
    /// Encoded video
    pub video: mpsc::Receiver<VideoFrame>,
    /// Encoded audio with timestamps
    pub audio: mpsc::Receiver<(AudioFrame, Duration)>,
}

struct Senders {
    video_input: mpsc::Sender<VideoFrame>,
    video: mpsc::Sender<VideoFrame>,
    audio: mpsc::Sender<(AudioFrame, Duration)>,
}

/// Publish-side pipeline
pub struct OutgoingPipeline {
    video_input_buffer_counts: usize,
    output_capacity: usize,
    audio_settings: AudioSettings,
    video_settings: VideoSettings,
    audio_input_format: Option<AudioInputFormat>,
    video_input_format: Option<VideoInputFormat>,
    audio_muted: bool,
    video_muted: bool,
    video_encoder: Option<Box<dyn VideoEncoder>>,
    audio_encoder: Option<Box<dyn AudioEncoder>>,
    senders: Option<Senders>,
    dropped: u64,
}

impl OutgoingPipeline {
    /// Create a pipeline with the given video input queue depth and
    /// encoded output channel capacity
    pub fn new(video_input_buffer_counts: usize, output_capacity: usize) -> Self {
        Self {
            video_input_buffer_counts: video_input_buffer_counts.max(1),
            output_capacity: output_capacity.max(1),
            audio_settings: AudioSettings::default(),
            video_settings: VideoSettings::default(),
            audio_input_format: None,
            video_input_format: None,
            audio_muted: false,
            video_muted: false,
            video_encoder: None,
            audio_encoder: None,
            senders: None,
            dropped: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.senders.is_some()
    }

    /// Start the pipeline
    ///
    /// Returns `None` if it is already running.
    pub fn start_running(&mut self) -> Option<OutgoingOutputs> {
        if self.is_running() {
            return None;
        }

        let (video_input_tx, video_input) = mpsc::channel(self.video_input_buffer_counts);
        let (video_tx, video) = mpsc::channel(self.output_capacity);
        let (audio_tx, audio) = mpsc::channel(self.output_capacity);

        self.senders = Some(Senders {
            video_input: video_input_tx,
            video: video_tx,
            audio: audio_tx,
        });

        Some(OutgoingOutputs {
            video_input,
            video,
            audio,
        })
    }

    /// Stop the pipeline, closing every output channel
    pub fn stop_running(&mut self) {
        self.senders = None;
    }

    /// Queue a raw video frame for encoding
    ///
    /// Returns `false` if the pipeline is stopped or the queue is full.
    pub fn append_video(&mut self, frame: VideoFrame) -> bool {
        let Some(senders) = &self.senders else {
            return false;
        };

        let frame = if self.video_muted { frame.muted() } else { frame };
        match senders.video_input.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::warn!(
                    capacity = self.video_input_buffer_counts,
                    dropped = self.dropped,
                    "Video input queue full, dropping frame"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Encode one buffered raw video frame
    pub fn encode_video(&mut self, frame: VideoFrame) {
        let Some(senders) = &self.senders else {
            return;
        };
        let Some(encoder) = self.video_encoder.as_mut() else {
            tracing::trace!("No video encoder attached");
            return;
        };

        for encoded in encoder.encode(frame, &self.video_settings) {
            if !encoded.compressed {
                tracing::warn!("Video encoder produced a raw frame, dropping");
                continue;
            }
            if senders.video.try_send(encoded).is_err() {
                self.dropped += 1;
                tracing::warn!(dropped = self.dropped, "Encoded video output full");
            }
        }
    }

    /// Encode a raw audio frame
    ///
    /// Returns `false` if the pipeline is stopped.
    pub fn append_audio(&mut self, frame: AudioFrame, timestamp: Duration) -> bool {
        let Some(senders) = &self.senders else {
            return false;
        };
        let Some(encoder) = self.audio_encoder.as_mut() else {
            tracing::trace!("No audio encoder attached");
            return true;
        };

        let frame = if self.audio_muted { frame.muted() } else { frame };
        for (encoded, ts) in encoder.encode(frame, timestamp, &self.audio_settings) {
            if !encoded.compressed {
                tracing::warn!("Audio encoder produced a raw frame, dropping");
                continue;
            }
            if senders.audio.try_send((encoded, ts)).is_err() {
                self.dropped += 1;
                tracing::warn!(dropped = self.dropped, "Encoded audio output full");
            }
        }
        true
    }

    pub fn audio_settings(&self) -> &AudioSettings {
        &self.audio_settings
    }

    pub fn set_audio_settings(&mut self, settings: AudioSettings) {
        self.audio_settings = settings;
    }

    pub fn video_settings(&self) -> &VideoSettings {
        &self.video_settings
    }

    pub fn set_video_settings(&mut self, settings: VideoSettings) {
        self.video_settings = settings;
    }

    pub fn audio_input_format(&self) -> Option<AudioInputFormat> {
        self.audio_input_format
    }

    pub fn set_audio_input_format(&mut self, format: Option<AudioInputFormat>) {
        self.audio_input_format = format;
    }

    pub fn video_input_format(&self) -> Option<VideoInputFormat> {
        self.video_input_format
    }

    pub fn set_video_input_format(&mut self, format: Option<VideoInputFormat>) {
        self.video_input_format = format;
    }

    pub fn set_video_encoder(&mut self, encoder: Option<Box<dyn VideoEncoder>>) {
        self.video_encoder = encoder;
    }

    pub fn set_audio_encoder(&mut self, encoder: Option<Box<dyn AudioEncoder>>) {
        self.audio_encoder = encoder;
    }

    pub fn is_muted(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.audio_muted,
            MediaKind::Video => self.video_muted,
        }
    }

    /// Zero-fill frames of `kind` before they reach the encoder
    pub fn set_muted(&mut self, kind: MediaKind, muted: bool) {
        match kind {
            MediaKind::Audio => self.audio_muted = muted,
            MediaKind::Video => self.video_muted = muted,
        }
    }

    /// Frames dropped due to full queues
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
