//! Codec formats, settings and the supported-codec policy
//!
//! RTMP only carries a fixed set of codecs. Settings are checked against
//! that set before the stream accepts them; encoding parameters are the
//! encoder's concern and are not validated here.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Error, Result};

use super::frame::MediaKind;

/// Audio coding format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Aac,
    Opus,
    Pcm,
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFormat::Aac => write!(f, "aac"),
            AudioFormat::Opus => write!(f, "opus"),
            AudioFormat::Pcm => write!(f, "pcm"),
        }
    }
}

/// Video coding format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    /// AVC (H.264)
    H264,
    /// HEVC (H.265)
    Hevc,
    Vp9,
    Av1,
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoFormat::H264 => write!(f, "h264"),
            VideoFormat::Hevc => write!(f, "hevc"),
            VideoFormat::Vp9 => write!(f, "vp9"),
            VideoFormat::Av1 => write!(f, "av1"),
        }
    }
}

/// Decoder configuration for a compressed video track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFormatDescription {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    /// Codec configuration record (e.g. AVCDecoderConfigurationRecord)
    pub config: Bytes,
}

/// Decoder configuration for a compressed audio track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormatDescription {
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u8,
    /// Codec configuration (e.g. AudioSpecificConfig)
    pub config: Bytes,
}

/// Shape of raw audio delivered by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInputFormat {
    pub sample_rate: u32,
    pub channels: u8,
}

/// Shape of raw video delivered by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInputFormat {
    pub width: u32,
    pub height: u32,
}

/// Audio encoder settings
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub format: AudioFormat,
    /// Target bitrate in bits per second
    pub bit_rate: u32,
    /// Output sample rate (0 = follow the input)
    pub sample_rate: u32,
    /// Output channel count (0 = follow the input)
    pub channels: u8,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            format: AudioFormat::Aac,
            bit_rate: 64 * 1000,
            sample_rate: 0,
            channels: 0,
        }
    }
}

/// Video encoder settings
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second
    pub bit_rate: u32,
    /// Maximum distance between key frames
    pub key_frame_interval: Duration,
    pub frame_rate: f64,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            format: VideoFormat::H264,
            width: 854,
            height: 480,
            bit_rate: 640 * 1000,
            key_frame_interval: Duration::from_secs(2),
            frame_rate: 30.0,
        }
    }
}

/// Supported-codec policy for a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecPolicy {
    audio: &'static [AudioFormat],
    video: &'static [VideoFormat],
}

impl CodecPolicy {
    /// Codecs carried by RTMP/FLV
    pub const RTMP: CodecPolicy = CodecPolicy {
        audio: &[AudioFormat::Aac],
        video: &[VideoFormat::H264, VideoFormat::Hevc],
    };

    /// Supported audio formats
    pub fn audio_formats(&self) -> &'static [AudioFormat] {
        self.audio
    }

    /// Supported video formats
    pub fn video_formats(&self) -> &'static [VideoFormat] {
        self.video
    }

    /// Check audio settings against the supported set
    pub fn validate_audio(&self, settings: &AudioSettings) -> Result<()> {
        if self.audio.contains(&settings.format) {
            Ok(())
        } else {
            Err(Error::UnsupportedCodec {
                kind: MediaKind::Audio,
                format: settings.format.to_string(),
            })
        }
    }

    /// Check video settings against the supported set
    pub fn validate_video(&self, settings: &VideoSettings) -> Result<()> {
        if self.video.contains(&settings.format) {
            Ok(())
        } else {
            Err(Error::UnsupportedCodec {
                kind: MediaKind::Video,
                format: settings.format.to_string(),
            })
        }
    }
}

impl Default for CodecPolicy {
    fn default() -> Self {
        Self::RTMP
    }
}
