//! Stream configuration

use crate::media::CodecPolicy;

/// Stream configuration options
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Raw video frames buffered ahead of the encoder
    pub video_input_buffer_counts: usize,

    /// Capacity of the encoder output channels
    pub encoded_output_capacity: usize,

    /// Capacity of the multiplexer output channel
    pub mux_output_capacity: usize,

    /// Capacity of the demultiplexer output channel
    pub demux_output_capacity: usize,

    /// Codecs the stream accepts settings for
    pub codec_policy: CodecPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            video_input_buffer_counts: 5,
            encoded_output_capacity: 64,
            mux_output_capacity: 256,
            demux_output_capacity: 256,
            codec_policy: CodecPolicy::RTMP,
        }
    }
}

impl StreamConfig {
    /// Set the raw video input queue depth
    pub fn video_input_buffer_counts(mut self, count: usize) -> Self {
        self.video_input_buffer_counts = count.max(1);
        self
    }

    /// Set the encoder output channel capacity
    pub fn encoded_output_capacity(mut self, capacity: usize) -> Self {
        self.encoded_output_capacity = capacity.max(1);
        self
    }

    /// Set the multiplexer output channel capacity
    pub fn mux_output_capacity(mut self, capacity: usize) -> Self {
        self.mux_output_capacity = capacity.max(1);
        self
    }

    /// Set the demultiplexer output channel capacity
    pub fn demux_output_capacity(mut self, capacity: usize) -> Self {
        self.demux_output_capacity = capacity.max(1);
        self
    }

    /// Set the codec policy
    pub fn codec_policy(mut self, policy: CodecPolicy) -> Self {
        self.codec_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();

        assert_eq!(config.video_input_buffer_counts, 5);
        assert_eq!(config.encoded_output_capacity, 64);
        assert_eq!(config.mux_output_capacity, 256);
        assert_eq!(config.demux_output_capacity, 256);
        assert_eq!(config.codec_policy, CodecPolicy::RTMP);
    }

    #[test]
    fn test_builder_capacities_are_at_least_one() {
        let config = StreamConfig::default()
            .video_input_buffer_counts(0)
            .encoded_output_capacity(0)
            .mux_output_capacity(0)
            .demux_output_capacity(0);

        assert_eq!(config.video_input_buffer_counts, 1);
        assert_eq!(config.encoded_output_capacity, 1);
        assert_eq!(config.mux_output_capacity, 1);
        assert_eq!(config.demux_output_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = StreamConfig::default()
            .video_input_buffer_counts(10)
            .mux_output_capacity(1024);

        assert_eq!(config.video_input_buffer_counts, 10);
        assert_eq!(config.mux_output_capacity, 1024);
        assert_eq!(config.demux_output_capacity, 256);
    }
}
