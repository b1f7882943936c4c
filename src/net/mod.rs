//! Transport connection contract and network feedback
//!
//! The stream never owns its connection. It keeps a `Weak` reference and
//! checks liveness at every use; a released connection turns dependent
//! operations into errors or no-ops instead of panics.

pub mod bitrate;

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::Result;
use crate::stream::RtmpStream;

pub use bitrate::{
    AdaptiveBitrateStrategy, BitrateAdapter, BitrateStrategy, NetworkEvent, NetworkReport,
};

/// Reliable transport a stream publishes to or plays from
///
/// Incoming bytes are delivered by the connection calling
/// [`RtmpStream::receive`] on the streams registered with it.
pub trait Connection: Send + Sync + 'static {
    /// Whether the transport is currently connected
    fn connected(&self) -> BoxFuture<'_, bool>;

    /// Send container bytes to the peer
    fn send(&self, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Enter receive mode for the registered streams
    fn recv(&self) -> BoxFuture<'_, Result<()>>;

    /// Register a stream with this connection
    fn add_stream(&self, stream: &RtmpStream);
}
