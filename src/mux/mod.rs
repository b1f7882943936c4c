//! Multiplexer and demultiplexer contracts
//!
//! The stream controller packages compressed frames into a single byte
//! stream on publish and unpacks incoming bytes into frames on play. The
//! container layout is owned by the implementations; the controller only
//! sees the narrow interface below.
//!
//! Output is exposed as an `mpsc` receiver handed out by `subscribe`.
//! Subscribing replaces (and thereby closes) any previous output channel,
//! and `clear` drops it, so a forwarding task draining the old receiver
//! finishes on its own.

pub mod flv;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::media::{AudioFormatDescription, Frame, MediaSet, VideoFormatDescription};

pub use flv::{FlvDemuxer, FlvMuxer};

/// Packs compressed frames into a container byte stream
pub trait Multiplexer: Send + 'static {
    /// Media kinds the next session will carry
    fn set_expected_medias(&mut self, medias: MediaSet);

    /// Bind the video format description (late-bound from the first
    /// compressed sample)
    fn set_video_format(&mut self, format: Option<VideoFormatDescription>);

    /// Bind the audio format description
    fn set_audio_format(&mut self, format: Option<AudioFormatDescription>);

    /// Append a compressed frame
    fn append(&mut self, frame: &Frame);

    /// Drop buffered state, format descriptions and the output channel
    fn clear(&mut self);

    /// Open a fresh output channel of container bytes
    fn subscribe(&mut self) -> mpsc::Receiver<Bytes>;
}

/// Unpacks a container byte stream into frames
pub trait Demultiplexer: Send + 'static {
    /// Feed received bytes. Returns `false` if the input was rejected.
    fn read(&mut self, data: Bytes) -> bool;

    /// Drop buffered input, format state and the output channel
    fn clear(&mut self);

    /// Open a fresh output channel of `(track index, frame)` pairs
    fn subscribe(&mut self) -> mpsc::Receiver<(u8, Frame)>;
}
