//! One-way RTMP media stream controller
//!
//! An [`RtmpStream`] binds a media source or sink to a transport
//! [`Connection`] and runs a publish (send) or play (receive) session over
//! it:
//!
//! - Lifecycle state machine (`Idle`, `Publishing`, `Playing`)
//! - Outgoing pipeline: raw frame intake, encoder hooks, FLV multiplexing
//! - Incoming pipeline: FLV demultiplexing, sound transform, render sink
//! - Output observers with ordered, failure-isolated fan-out
//! - Codec policy and bitrate adaptation from network feedback
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use rtmp_stream::{Connection, RtmpStream};
//!
//! # async fn example<C: Connection>(connection: Arc<C>) -> rtmp_stream::Result<()> {
//! let stream = RtmpStream::new(&connection);
//! stream.publish(Some("stream_key")).await?;
//! // ... append frames from the source ...
//! stream.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod mux;
pub mod net;
pub mod stats;
pub mod stream;

pub use config::StreamConfig;
pub use error::{Error, Result};
pub use media::{AudioFrame, Frame, MediaKind, VideoFrame};
pub use net::{Connection, NetworkEvent};
pub use stream::{RtmpStream, StreamState};
