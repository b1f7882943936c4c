//! FLV multiplexer and demultiplexer
//!
//! Default container implementations for RTMP. The muxer writes one framed
//! FLV tag per compressed frame, preceded by a sequence-header tag whenever
//! a new format description is bound. The demuxer reverses this and tags
//! every frame with the format description currently in effect.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::media::flv::{self, FlvTag, FlvTagType, PacketType, VideoCodecId, VideoFrameType};
use crate::media::{
    AudioFormatDescription, AudioFrame, Frame, MediaKind, MediaSet, VideoFormatDescription,
    VideoFrame,
};

use super::{Demultiplexer, Multiplexer};

/// Default output channel capacity
pub const DEFAULT_CAPACITY: usize = 256;

/// Sampling frequencies indexed by the AudioSpecificConfig frequency index
const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// FLV tag writer
#[derive(Debug)]
pub struct FlvMuxer {
    capacity: usize,
    tx: Option<mpsc::Sender<Bytes>>,
    expected: MediaSet,
    video_format: Option<VideoFormatDescription>,
    audio_format: Option<AudioFormatDescription>,
    video_header_sent: bool,
    audio_header_sent: bool,
    /// Set once the first sync frame has been written
    video_started: bool,
    /// Timestamp mapped to zero in the output
    base: Option<Duration>,
    dropped: u64,
}

impl FlvMuxer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a muxer whose output channel holds up to `capacity` tags
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tx: None,
            expected: MediaSet::empty(),
            video_format: None,
            audio_format: None,
            video_header_sent: false,
            audio_header_sent: false,
            video_started: false,
            base: None,
            dropped: 0,
        }
    }

    /// Media kinds the current session expects
    pub fn expected_medias(&self) -> MediaSet {
        self.expected
    }

    /// Tags dropped because the output channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Milliseconds since the session base
    ///
    /// FLV timestamps are 32 bits and wrap after about 49.7 days, as RTMP
    /// timestamps do.
    fn relative_ms(&mut self, timestamp: Duration) -> u32 {
        let base = *self.base.get_or_insert(timestamp);
        let ms = timestamp.saturating_sub(base).as_millis();
        (ms % (1u128 << 32)) as u32
    }

    fn append_video(&mut self, frame: &VideoFrame) {
        if !frame.compressed {
            tracing::trace!("Ignoring raw video frame");
            return;
        }
        let Some(format) = self.video_format.clone() else {
            tracing::debug!("Dropping video frame without format description");
            return;
        };
        let Some(codec) = VideoCodecId::from_format(format.format) else {
            tracing::warn!(format = %format.format, "Video format has no FLV codec id");
            return;
        };
        if !self.video_started {
            if !frame.sync {
                return;
            }
            self.video_started = true;
        }

        let timestamp = self.relative_ms(frame.timestamp);
        if !self.video_header_sent {
            let body = video_body(
                VideoFrameType::Keyframe,
                codec,
                PacketType::SequenceHeader,
                0,
                &format.config,
            );
            self.emit(FlvTag::video(timestamp, body));
            self.video_header_sent = true;
        }

        let frame_type = if frame.sync {
            VideoFrameType::Keyframe
        } else {
            VideoFrameType::InterFrame
        };
        let body = video_body(
            frame_type,
            codec,
            PacketType::Coded,
            frame.composition_offset,
            &frame.data,
        );
        self.emit(FlvTag::video(timestamp, body));
    }

    fn append_audio(&mut self, frame: &AudioFrame, timestamp: Duration) {
        if !frame.compressed {
            tracing::trace!("Ignoring raw audio frame");
            return;
        }
        // Audio waits for the first video sync frame so playback starts aligned
        if self.expected.contains(MediaKind::Video) && !self.video_started {
            return;
        }
        let Some(format) = self.audio_format.clone() else {
            tracing::debug!("Dropping audio frame without format description");
            return;
        };

        let timestamp = self.relative_ms(timestamp);
        let header = flv::aac_header_byte(format.channels);
        if !self.audio_header_sent {
            self.emit(FlvTag::audio(
                timestamp,
                audio_body(header, PacketType::SequenceHeader, &format.config),
            ));
            self.audio_header_sent = true;
        }
        self.emit(FlvTag::audio(
            timestamp,
            audio_body(header, PacketType::Coded, &frame.data),
        ));
    }

    fn emit(&mut self, tag: FlvTag) {
        let Some(tx) = &self.tx else {
            return;
        };

        let mut buf = BytesMut::new();
        if let Err(e) = tag.encode(&mut buf) {
            tracing::warn!(error = %e, "Failed to encode FLV tag");
            return;
        }

        match tx.try_send(buf.freeze()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::warn!(dropped = self.dropped, "Mux output full, dropping tag");
            }
            Err(TrySendError::Closed(_)) => {
                self.tx = None;
            }
        }
    }
}

impl Default for FlvMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplexer for FlvMuxer {
    fn set_expected_medias(&mut self, medias: MediaSet) {
        self.expected = medias;
    }

    fn set_video_format(&mut self, format: Option<VideoFormatDescription>) {
        if self.video_format != format {
            self.video_format = format;
            self.video_header_sent = false;
        }
    }

    fn set_audio_format(&mut self, format: Option<AudioFormatDescription>) {
        if self.audio_format != format {
            self.audio_format = format;
            self.audio_header_sent = false;
        }
    }

    fn append(&mut self, frame: &Frame) {
        match frame {
            Frame::Video(video) => self.append_video(video),
            Frame::Audio { frame, timestamp } => self.append_audio(frame, *timestamp),
        }
    }

    fn clear(&mut self) {
        self.tx = None;
        self.expected = MediaSet::empty();
        self.video_format = None;
        self.audio_format = None;
        self.video_header_sent = false;
        self.audio_header_sent = false;
        self.video_started = false;
        self.base = None;
    }

    fn subscribe(&mut self) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.tx = Some(tx);
        rx
    }
}

/// FLV tag reader
#[derive(Debug)]
pub struct FlvDemuxer {
    capacity: usize,
    tx: Option<mpsc::Sender<(u8, Frame)>>,
    buffer: BytesMut,
    video_format: Option<VideoFormatDescription>,
    audio_format: Option<AudioFormatDescription>,
    dropped: u64,
}

impl FlvDemuxer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a demuxer whose output channel holds up to `capacity` frames
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tx: None,
            buffer: BytesMut::new(),
            video_format: None,
            audio_format: None,
            dropped: 0,
        }
    }

    /// Video format announced by the last sequence header
    pub fn video_format(&self) -> Option<&VideoFormatDescription> {
        self.video_format.as_ref()
    }

    /// Audio format announced by the last sequence header
    pub fn audio_format(&self) -> Option<&AudioFormatDescription> {
        self.audio_format.as_ref()
    }

    /// Frames dropped because the output channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn on_tag(&mut self, tag: FlvTag) {
        let frame = match tag.tag_type {
            FlvTagType::Video => self.on_video(tag),
            FlvTagType::Audio => self.on_audio(tag),
            FlvTagType::Script => None,
        };

        if let Some(frame) = frame {
            self.emit(frame);
        }
    }

    fn on_video(&mut self, tag: FlvTag) -> Option<Frame> {
        if tag.data.len() < 5 {
            return None;
        }
        let codec = VideoCodecId::from_byte(tag.data[0])?;
        let timestamp = Duration::from_millis(u64::from(tag.timestamp));

        match tag.packet_type()? {
            PacketType::SequenceHeader => {
                self.video_format = Some(VideoFormatDescription {
                    format: codec.format(),
                    width: 0,
                    height: 0,
                    config: tag.data.slice(5..),
                });
                None
            }
            PacketType::Coded => {
                let mut frame =
                    VideoFrame::compressed(timestamp, tag.data.slice(5..), tag.is_keyframe());
                frame.composition_offset = composition_offset(&tag.data[2..5]);
                frame.format = self.video_format.clone();
                Some(Frame::Video(frame))
            }
        }
    }

    fn on_audio(&mut self, tag: FlvTag) -> Option<Frame> {
        if tag.data.len() < 2 {
            return None;
        }
        let format = flv::audio_format(tag.data[0])?;
        let timestamp = Duration::from_millis(u64::from(tag.timestamp));

        match tag.packet_type()? {
            PacketType::SequenceHeader => {
                let config = tag.data.slice(2..);
                let (sample_rate, channels) = parse_audio_specific_config(&config);
                self.audio_format = Some(AudioFormatDescription {
                    format,
                    sample_rate,
                    channels,
                    config,
                });
                None
            }
            PacketType::Coded => {
                let mut frame = AudioFrame::compressed(tag.data.slice(2..));
                frame.format = self.audio_format.clone();
                Some(Frame::Audio { frame, timestamp })
            }
        }
    }

    fn emit(&mut self, frame: Frame) {
        let Some(tx) = &self.tx else {
            return;
        };

        match tx.try_send((0, frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::warn!(dropped = self.dropped, "Demux output full, dropping frame");
            }
            Err(TrySendError::Closed(_)) => {
                self.tx = None;
            }
        }
    }
}

impl Default for FlvDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demultiplexer for FlvDemuxer {
    fn read(&mut self, data: Bytes) -> bool {
        self.buffer.extend_from_slice(&data);

        loop {
            match FlvTag::decode(&mut self.buffer) {
                Ok(Some(tag)) => self.on_tag(tag),
                Ok(None) => return true,
                Err(e) => {
                    tracing::warn!(error = %e, "Rejecting malformed FLV input");
                    self.buffer.clear();
                    return false;
                }
            }
        }
    }

    fn clear(&mut self) {
        self.tx = None;
        self.buffer.clear();
        self.video_format = None;
        self.audio_format = None;
    }

    fn subscribe(&mut self) -> mpsc::Receiver<(u8, Frame)> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.tx = Some(tx);
        rx
    }
}

fn video_body(
    frame_type: VideoFrameType,
    codec: VideoCodecId,
    packet_type: PacketType,
    composition_offset: i32,
    data: &[u8],
) -> Bytes {
    let mut body = BytesMut::with_capacity(5 + data.len());
    body.put_u8(((frame_type as u8) << 4) | codec as u8);
    body.put_u8(packet_type as u8);
    let cts = composition_offset as u32;
    body.put_u8((cts >> 16) as u8);
    body.put_u8((cts >> 8) as u8);
    body.put_u8(cts as u8);
    body.put_slice(data);
    body.freeze()
}

fn audio_body(header: u8, packet_type: PacketType, data: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(2 + data.len());
    body.put_u8(header);
    body.put_u8(packet_type as u8);
    body.put_slice(data);
    body.freeze()
}

/// Sign-extend the 24-bit composition time offset
fn composition_offset(b: &[u8]) -> i32 {
    let raw = (i32::from(b[0]) << 16) | (i32::from(b[1]) << 8) | i32::from(b[2]);
    (raw << 8) >> 8
}

/// Sample rate and channel count from an AudioSpecificConfig
///
/// Missing or truncated configs yield zeros.
fn parse_audio_specific_config(config: &[u8]) -> (u32, u8) {
    if config.len() < 2 {
        return (0, 0);
    }
    let freq_index = ((config[0] & 0x07) << 1) | (config[1] >> 7);
    let channels = (config[1] >> 3) & 0x0F;
    let sample_rate = AAC_SAMPLE_RATES
        .get(usize::from(freq_index))
        .copied()
        .unwrap_or(0);
    (sample_rate, channels)
}
