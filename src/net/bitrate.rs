//! Bitrate adaptation
//!
//! The connection reports network conditions as [`NetworkEvent`]s. The
//! stream forwards each event to the installed [`BitrateStrategy`], which
//! may change the outgoing video bitrate through the stream's settings.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::stream::RtmpStream;

/// Throughput snapshot from the connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkReport {
    pub total_bytes_in: u64,
    pub total_bytes_out: u64,
    /// Bytes queued for sending but not yet written
    pub current_queue_bytes_out: u64,
    pub current_bytes_in_per_second: u64,
    pub current_bytes_out_per_second: u64,
}

/// Network condition event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Periodic status, bandwidth is keeping up
    Status(NetworkReport),
    /// The publish queue is growing faster than it drains
    PublishInsufficientBandwidth(NetworkReport),
    /// Conditions reset (e.g. after reconnect)
    Reset,
}

/// Adjusts a stream's bitrate in response to network events
pub trait BitrateStrategy: Send + Sync {
    fn adjust_bitrate(&self, event: &NetworkEvent, stream: &RtmpStream);
}

/// Holds the active strategy, if any
#[derive(Default, Clone)]
pub struct BitrateAdapter {
    strategy: Option<Arc<dyn BitrateStrategy>>,
}

impl BitrateAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the strategy; `None` disables adaptation
    pub fn set_strategy(&mut self, strategy: Option<Arc<dyn BitrateStrategy>>) {
        self.strategy = strategy;
    }

    /// Strategy to run for the next event
    pub fn strategy(&self) -> Option<Arc<dyn BitrateStrategy>> {
        self.strategy.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.strategy.is_some()
    }
}

/// Lowers the video bitrate on insufficient bandwidth and climbs back in
/// steps once bandwidth has been sufficient for a while
#[derive(Debug)]
pub struct AdaptiveBitrateStrategy {
    max_video_bit_rate: u32,
    min_video_bit_rate: u32,
    step: u32,
    sufficient_threshold: u32,
    sufficient_count: AtomicU32,
}

impl AdaptiveBitrateStrategy {
    /// Create a strategy that never exceeds `max_video_bit_rate`
    pub fn new(max_video_bit_rate: u32) -> Self {
        Self {
            max_video_bit_rate,
            min_video_bit_rate: 64 * 1000,
            step: 64 * 1000,
            sufficient_threshold: 15,
            sufficient_count: AtomicU32::new(0),
        }
    }

    /// Set the lower bound
    pub fn min_video_bit_rate(mut self, bit_rate: u32) -> Self {
        self.min_video_bit_rate = bit_rate.min(self.max_video_bit_rate);
        self
    }

    /// Set the increase applied after sufficient bandwidth
    pub fn step(mut self, step: u32) -> Self {
        self.step = step;
        self
    }

    /// Set how many consecutive status reports trigger an increase
    pub fn sufficient_threshold(mut self, count: u32) -> Self {
        self.sufficient_threshold = count.max(1);
        self
    }

    /// Bitrate to use after `event`, given the current one
    fn next_bit_rate(&self, event: &NetworkEvent, current: u32) -> u32 {
        match event {
            NetworkEvent::Status(_) => {
                if current >= self.max_video_bit_rate {
                    self.sufficient_count.store(0, Ordering::Relaxed);
                    return current;
                }
                let count = self.sufficient_count.fetch_add(1, Ordering::Relaxed) + 1;
                if count < self.sufficient_threshold {
                    return current;
                }
                self.sufficient_count.store(0, Ordering::Relaxed);
                current.saturating_add(self.step).min(self.max_video_bit_rate)
            }
            NetworkEvent::PublishInsufficientBandwidth(report) => {
                self.sufficient_count.store(0, Ordering::Relaxed);
                // 80% of the measured throughput in bits per second
                let measured = report.current_bytes_out_per_second.saturating_mul(32) / 5;
                let ceiling = u64::from(current) * 4 / 5;
                measured
                    .min(ceiling)
                    .max(u64::from(self.min_video_bit_rate)) as u32
            }
            NetworkEvent::Reset => {
                self.sufficient_count.store(0, Ordering::Relaxed);
                self.max_video_bit_rate
            }
        }
    }
}

impl BitrateStrategy for AdaptiveBitrateStrategy {
    fn adjust_bitrate(&self, event: &NetworkEvent, stream: &RtmpStream) {
        let mut settings = stream.video_settings();
        let next = self.next_bit_rate(event, settings.bit_rate);
        if next == settings.bit_rate {
            return;
        }

        tracing::info!(
            stream_id = stream.id(),
            from = settings.bit_rate,
            to = next,
            "Adjusting video bitrate"
        );
        settings.bit_rate = next;
        if let Err(e) = stream.set_video_settings(settings) {
            tracing::warn!(error = %e, "Failed to apply adjusted bitrate");
        }
    }
}
