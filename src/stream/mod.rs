//! Stream lifecycle and media pipelines
//!
//! The [`RtmpStream`] controller owns one session at a time and wires the
//! outgoing and incoming pipelines, the container and the observers
//! together.

pub mod controller;
pub mod incoming;
pub mod outgoing;
pub mod output;
pub mod state;
pub mod track;

pub use controller::RtmpStream;
pub use incoming::{IncomingPipeline, PreparedFrame, RenderSink, SoundTransform};
pub use outgoing::{AudioEncoder, OutgoingOutputs, OutgoingPipeline, VideoEncoder};
pub use output::{OutputError, OutputRegistry, StreamOutput};
pub use state::{StreamContext, StreamState};
pub use track::{TrackId, TrackSelector};
