//! Media frame types
//!
//! A frame is one timestamped unit of media. Raw frames carry sample data
//! (pixels or interleaved PCM), compressed frames carry an encoded
//! bitstream. The stream controller routes on the `compressed` tag, never
//! on the payload shape.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use super::codec::{AudioFormatDescription, VideoFormatDescription};

/// Kind of media carried by a frame or track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Set of media kinds (e.g. the kinds a multiplexer should expect)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaSet {
    audio: bool,
    video: bool,
}

impl MediaSet {
    /// Empty set
    pub const fn empty() -> Self {
        Self {
            audio: false,
            video: false,
        }
    }

    /// Set containing both kinds
    pub const fn all() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }

    pub fn insert(&mut self, kind: MediaKind) {
        match kind {
            MediaKind::Audio => self.audio = true,
            MediaKind::Video => self.video = true,
        }
    }

    pub fn contains(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.audio,
            MediaKind::Video => self.video,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }
}

/// A video frame, raw or compressed
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Presentation timestamp
    pub timestamp: Duration,
    /// Payload (pixels when raw, bitstream when compressed)
    pub data: Bytes,
    /// Whether the payload is an encoded bitstream
    pub compressed: bool,
    /// Whether this frame is an independent decoding point
    pub sync: bool,
    /// Composition time offset in milliseconds (compressed only)
    pub composition_offset: i32,
    /// Format description carried by compressed frames
    pub format: Option<VideoFormatDescription>,
}

impl VideoFrame {
    /// Create a raw video frame
    pub fn raw(timestamp: Duration, data: Bytes) -> Self {
        Self {
            timestamp,
            data,
            compressed: false,
            sync: true,
            composition_offset: 0,
            format: None,
        }
    }

    /// Create a compressed video frame
    pub fn compressed(timestamp: Duration, data: Bytes, sync: bool) -> Self {
        Self {
            timestamp,
            data,
            compressed: true,
            sync,
            composition_offset: 0,
            format: None,
        }
    }

    /// Attach a format description
    pub fn with_format(mut self, format: VideoFormatDescription) -> Self {
        self.format = Some(format);
        self
    }

    /// Mark whether this frame is a sync (key) frame
    pub fn set_sync(&mut self, sync: bool) {
        self.sync = sync;
    }

    /// Return a copy with the payload zero-filled
    ///
    /// Timing and flags are preserved. Frames without payload, and frames
    /// that are already silent, are returned unchanged.
    pub fn muted(&self) -> Self {
        Self {
            data: zero_filled(&self.data),
            ..self.clone()
        }
    }
}

/// An audio frame, raw (s16le interleaved PCM) or compressed
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Payload
    pub data: Bytes,
    /// Whether the payload is an encoded bitstream
    pub compressed: bool,
    /// Format description carried by compressed frames
    pub format: Option<AudioFormatDescription>,
}

impl AudioFrame {
    /// Create a raw PCM audio frame
    pub fn raw(data: Bytes) -> Self {
        Self {
            data,
            compressed: false,
            format: None,
        }
    }

    /// Create a compressed audio frame
    pub fn compressed(data: Bytes) -> Self {
        Self {
            data,
            compressed: true,
            format: None,
        }
    }

    /// Attach a format description
    pub fn with_format(mut self, format: AudioFormatDescription) -> Self {
        self.format = Some(format);
        self
    }

    /// Return a copy with the payload zero-filled
    pub fn muted(&self) -> Self {
        Self {
            data: zero_filled(&self.data),
            ..self.clone()
        }
    }
}

/// A frame of either kind
///
/// Audio frames travel with their timestamp, which the source supplies
/// separately from the sample buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Video(VideoFrame),
    Audio {
        frame: AudioFrame,
        timestamp: Duration,
    },
}

impl Frame {
    /// Media kind of this frame
    pub fn kind(&self) -> MediaKind {
        match self {
            Frame::Video(_) => MediaKind::Video,
            Frame::Audio { .. } => MediaKind::Audio,
        }
    }

    /// Whether the payload is an encoded bitstream
    pub fn is_compressed(&self) -> bool {
        match self {
            Frame::Video(video) => video.compressed,
            Frame::Audio { frame, .. } => frame.compressed,
        }
    }

    /// Timestamp of this frame
    pub fn timestamp(&self) -> Duration {
        match self {
            Frame::Video(video) => video.timestamp,
            Frame::Audio { timestamp, .. } => *timestamp,
        }
    }

    /// Payload bytes
    pub fn data(&self) -> &Bytes {
        match self {
            Frame::Video(video) => &video.data,
            Frame::Audio { frame, .. } => &frame.data,
        }
    }

    /// Return a copy with the payload zero-filled
    pub fn muted(&self) -> Self {
        match self {
            Frame::Video(video) => Frame::Video(video.muted()),
            Frame::Audio { frame, timestamp } => Frame::Audio {
                frame: frame.muted(),
                timestamp: *timestamp,
            },
        }
    }
}

fn zero_filled(data: &Bytes) -> Bytes {
    if data.iter().all(|&b| b == 0) {
        // Empty or already silent: keep the original allocation
        return data.clone();
    }
    Bytes::from(vec![0u8; data.len()])
}
