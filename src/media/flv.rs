//! FLV tag model
//!
//! FLV is the container RTMP carries audio/video in. Each tag is framed as:
//! ```text
//! +--------+-------------+-----------+-------------+---------+----------------+
//! | Type(1)| DataSize(3) | TS(3+1)   | StreamID(3) | Data(N) | PrevTagSize(4) |
//! +--------+-------------+-----------+-------------+---------+----------------+
//! ```
//!
//! Video tag body:
//! ```text
//! +----------+----------+------------+-------------------+
//! | FrameType| CodecID  | PacketType | CompositionTime(3)| Data...
//! | (4 bits) | (4 bits) |    (1)     |                   |
//! +----------+----------+------------+-------------------+
//! ```
//!
//! Audio tag body (AAC):
//! ```text
//! +-----------+----------+----------+----------+------------+
//! |SoundFormat|SoundRate |SoundSize |SoundType | PacketType | Data...
//! | (4 bits)  | (2 bits) | (1 bit)  | (1 bit)  |    (1)     |
//! +-----------+----------+----------+----------+------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::codec::{AudioFormat, VideoFormat};

/// Size of the fixed tag header
pub const TAG_HEADER_SIZE: usize = 11;

/// Size of the trailing previous-tag-size field
pub const PREVIOUS_TAG_SIZE: usize = 4;

/// Largest body the 24-bit size field can describe
pub const MAX_TAG_DATA_SIZE: usize = 0x00FF_FFFF;

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
    Script,
}

impl FlvTagType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            8 => Some(FlvTagType::Audio),
            9 => Some(FlvTagType::Video),
            18 => Some(FlvTagType::Script),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            FlvTagType::Audio => 8,
            FlvTagType::Video => 9,
            FlvTagType::Script => 18,
        }
    }
}

/// Video frame type (upper 4 bits of first body byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    Keyframe = 1,
    InterFrame = 2,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            _ => None,
        }
    }
}

/// Video codec ID (lower 4 bits of first body byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecId {
    /// AVC (H.264)
    Avc = 7,
    /// HEVC (H.265), legacy extension id
    Hevc = 12,
}

impl VideoCodecId {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            7 => Some(VideoCodecId::Avc),
            12 => Some(VideoCodecId::Hevc),
            _ => None,
        }
    }

    /// Map a coding format onto its FLV codec id
    pub fn from_format(format: VideoFormat) -> Option<Self> {
        match format {
            VideoFormat::H264 => Some(VideoCodecId::Avc),
            VideoFormat::Hevc => Some(VideoCodecId::Hevc),
            VideoFormat::Vp9 | VideoFormat::Av1 => None,
        }
    }

    pub fn format(self) -> VideoFormat {
        match self {
            VideoCodecId::Avc => VideoFormat::H264,
            VideoCodecId::Hevc => VideoFormat::Hevc,
        }
    }
}

/// Sound format (upper 4 bits of first audio body byte)
pub const SOUND_FORMAT_AAC: u8 = 10;

/// AAC/AVC packet type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    SequenceHeader = 0,
    Coded = 1,
}

impl PacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(PacketType::SequenceHeader),
            1 => Some(PacketType::Coded),
            _ => None,
        }
    }
}

/// Error while decoding FLV tags
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlvError {
    #[error("unknown tag type {0:#04x}")]
    UnknownTagType(u8),
    #[error("previous tag size {actual} does not match {expected}")]
    PreviousTagSize { expected: u32, actual: u32 },
    #[error("tag data too large: {0} bytes")]
    TooLarge(usize),
}

/// A single FLV tag
#[derive(Debug, Clone, PartialEq)]
pub struct FlvTag {
    pub tag_type: FlvTagType,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Tag body (including codec headers)
    pub data: Bytes,
}

impl FlvTag {
    /// Create a new video tag
    pub fn video(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Video,
            timestamp,
            data,
        }
    }

    /// Create a new audio tag
    pub fn audio(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Audio,
            timestamp,
            data,
        }
    }

    pub fn is_video(&self) -> bool {
        self.tag_type == FlvTagType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.tag_type == FlvTagType::Audio
    }

    /// For video tags, whether this is a keyframe
    pub fn is_keyframe(&self) -> bool {
        self.is_video()
            && self
                .data
                .first()
                .and_then(|b| VideoFrameType::from_byte(*b))
                == Some(VideoFrameType::Keyframe)
    }

    /// Packet type byte of an AVC/HEVC/AAC body
    pub fn packet_type(&self) -> Option<PacketType> {
        self.data.get(1).and_then(|b| PacketType::from_byte(*b))
    }

    /// Whether this tag is a codec sequence header
    pub fn is_sequence_header(&self) -> bool {
        self.packet_type() == Some(PacketType::SequenceHeader)
    }

    /// Size of the tag body
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Write the framed tag (header, body, previous tag size)
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), FlvError> {
        let size = self.data.len();
        if size > MAX_TAG_DATA_SIZE {
            return Err(FlvError::TooLarge(size));
        }

        buf.reserve(TAG_HEADER_SIZE + size + PREVIOUS_TAG_SIZE);
        buf.put_u8(self.tag_type.to_byte());
        put_u24(buf, size as u32);
        put_u24(buf, self.timestamp & 0x00FF_FFFF);
        buf.put_u8((self.timestamp >> 24) as u8);
        put_u24(buf, 0);
        buf.put_slice(&self.data);
        buf.put_u32((TAG_HEADER_SIZE + size) as u32);
        Ok(())
    }

    /// Decode one framed tag from the front of `buf`
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched when the tag is not
    /// complete yet.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, FlvError> {
        if buf.len() < TAG_HEADER_SIZE {
            return Ok(None);
        }

        let type_byte = buf[0];
        let tag_type = FlvTagType::from_byte(type_byte).ok_or(FlvError::UnknownTagType(type_byte))?;
        let size = u24(&buf[1..4]) as usize;
        let total = TAG_HEADER_SIZE + size + PREVIOUS_TAG_SIZE;
        if buf.len() < total {
            return Ok(None);
        }

        let timestamp = u24(&buf[4..7]) | (u32::from(buf[7]) << 24);
        let mut tag = buf.split_to(total);
        tag.advance(TAG_HEADER_SIZE);
        let data = tag.split_to(size).freeze();
        let previous = tag.get_u32();
        let expected = (TAG_HEADER_SIZE + size) as u32;
        if previous != expected {
            return Err(FlvError::PreviousTagSize {
                expected,
                actual: previous,
            });
        }

        Ok(Some(Self {
            tag_type,
            timestamp,
            data,
        }))
    }
}

/// First byte of an AAC audio body: 44.1kHz, 16-bit, mono/stereo
pub fn aac_header_byte(channels: u8) -> u8 {
    let sound_type = if channels == 1 { 0 } else { 1 };
    (SOUND_FORMAT_AAC << 4) | (3 << 2) | (1 << 1) | sound_type
}

/// Whether the audio body carries AAC
pub fn is_aac(first_byte: u8) -> bool {
    (first_byte >> 4) == SOUND_FORMAT_AAC
}

/// Audio format for a sound format nibble, if RTMP can carry it here
pub fn audio_format(first_byte: u8) -> Option<AudioFormat> {
    is_aac(first_byte).then_some(AudioFormat::Aac)
}

fn put_u24(buf: &mut BytesMut, v: u32) {
    buf.put_u8((v >> 16) as u8);
    buf.put_u8((v >> 8) as u8);
    buf.put_u8(v as u8);
}

fn u24(b: &[u8]) -> u32 {
    (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2])
}
