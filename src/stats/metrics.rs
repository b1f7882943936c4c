//! Per-stream statistics

use std::time::{Duration, Instant};

use crate::media::Frame;

/// Counters for one publish/play session
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Session start
    pub started_at: Instant,
    /// Video frames accepted
    pub video_frames: u64,
    /// Audio frames accepted
    pub audio_frames: u64,
    /// Compressed sync frames accepted
    pub keyframes: u64,
    /// Container bytes handed to the connection
    pub bytes_sent: u64,
    /// Bytes received from the connection
    pub bytes_received: u64,
    /// Frames dropped (unselected track, full queue, inactive stream)
    pub dropped_frames: u64,
    /// Last video timestamp seen
    pub last_video_ts: Duration,
    /// Last audio timestamp seen
    pub last_audio_ts: Duration,
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            video_frames: 0,
            audio_frames: 0,
            keyframes: 0,
            bytes_sent: 0,
            bytes_received: 0,
            dropped_frames: 0,
            last_video_ts: Duration::ZERO,
            last_audio_ts: Duration::ZERO,
        }
    }

    /// Count an accepted frame
    pub fn on_frame(&mut self, frame: &Frame) {
        match frame {
            Frame::Video(video) => {
                self.video_frames += 1;
                self.last_video_ts = video.timestamp;
                if video.compressed && video.sync {
                    self.keyframes += 1;
                }
            }
            Frame::Audio { timestamp, .. } => {
                self.audio_frames += 1;
                self.last_audio_ts = *timestamp;
            }
        }
    }

    /// Get duration since the session started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Outgoing bitrate in bits per second
    pub fn send_bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }

    /// Incoming bitrate in bits per second
    pub fn receive_bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }
}
