//! Media types
//!
//! This module provides:
//! - Frame types (raw and compressed audio/video) and muting
//! - Codec formats, encoder settings and the supported-codec policy
//! - The FLV tag model used by the bundled multiplexer

pub mod codec;
pub mod flv;
pub mod frame;

pub use codec::{
    AudioFormat, AudioFormatDescription, AudioInputFormat, AudioSettings, CodecPolicy,
    VideoFormat, VideoFormatDescription, VideoInputFormat, VideoSettings,
};
pub use flv::{FlvError, FlvTag, FlvTagType};
pub use frame::{AudioFrame, Frame, MediaKind, MediaSet, VideoFrame};
