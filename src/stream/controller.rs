//! Stream controller
//!
//! [`RtmpStream`] binds a media source/sink to a [`Connection`] and runs
//! one publish or play session at a time.
//!
//! # Architecture
//!
//! ```text
//!  publish:
//!    append(raw) ──► OutgoingPipeline ──► [video input] ──► encoder
//!                                                            │
//!    append(compressed) ◄── [encoded video / audio] ◄────────┘
//!          │
//!          └──► Multiplexer ──► [container bytes] ──► connection.send
//!
//!  play:
//!    connection ──► receive ──► Demultiplexer ──► [frames] ──► IncomingPipeline ──► sink
//!
//!  every accepted frame ──► OutputRegistry::fan_out
//! ```
//!
//! All mutable state lives behind a single mutex, so state transitions,
//! track selection, settings and observer registration never interleave.
//! The lock is never held across an `.await`. Forwarding tasks hold only a
//! weak handle and the generation of the session that spawned them. They
//! re-enter through private entry points that drop anything from an older
//! generation, so frames still buffered when a session closes never reach
//! the next one. Each task ends when its channel closes or its session is
//! over.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::media::{
    AudioFrame, AudioInputFormat, AudioSettings, Frame, MediaKind, MediaSet, VideoFrame,
    VideoInputFormat, VideoSettings,
};
use crate::mux::{Demultiplexer, FlvDemuxer, FlvMuxer, Multiplexer};
use crate::net::{BitrateAdapter, BitrateStrategy, Connection, NetworkEvent};
use crate::stats::StreamStats;

use super::incoming::{IncomingPipeline, RenderSink, SoundTransform};
use super::outgoing::{AudioEncoder, OutgoingOutputs, OutgoingPipeline, VideoEncoder};
use super::output::{OutputRegistry, StreamOutput};
use super::state::{StreamContext, StreamState};
use super::track::{TrackId, TrackSelector};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// One-way media stream over a connection
///
/// Cheap to clone; clones share the same stream.
#[derive(Clone)]
pub struct RtmpStream {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    connection: Weak<dyn Connection>,
    config: StreamConfig,
    state: Mutex<Shared>,
    /// Orders routing and fan-out so observers see frames in acceptance order
    delivery: Mutex<()>,
}

struct Shared {
    context: StreamContext,
    outgoing: OutgoingPipeline,
    incoming: Arc<Mutex<IncomingPipeline>>,
    incoming_epoch: u64,
    /// Generation of the current publish/play session
    session: u64,
    muxer: Box<dyn Multiplexer>,
    demuxer: Box<dyn Demultiplexer>,
    tracks: TrackSelector,
    outputs: OutputRegistry,
    bitrate: BitrateAdapter,
    stats: StreamStats,
}

/// What a publish/play request resolved to under the lock
enum Transition<T> {
    Start(T),
    Close,
    Unchanged,
}

impl RtmpStream {
    /// Create a stream on `connection` with the default configuration and
    /// the FLV container
    pub fn new<C: Connection>(connection: &Arc<C>) -> Self {
        Self::with_config(connection, StreamConfig::default())
    }

    /// Create a stream with a custom configuration
    pub fn with_config<C: Connection>(connection: &Arc<C>, config: StreamConfig) -> Self {
        let muxer = Box::new(FlvMuxer::with_capacity(config.mux_output_capacity));
        let demuxer = Box::new(FlvDemuxer::with_capacity(config.demux_output_capacity));
        Self::with_container(connection, config, muxer, demuxer)
    }

    /// Create a stream with a custom multiplexer and demultiplexer
    pub fn with_container<C: Connection>(
        connection: &Arc<C>,
        config: StreamConfig,
        muxer: Box<dyn Multiplexer>,
        demuxer: Box<dyn Demultiplexer>,
    ) -> Self {
        let weak: Weak<C> = Arc::downgrade(connection);
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);

        let shared = Shared {
            context: StreamContext::new(id),
            outgoing: OutgoingPipeline::new(
                config.video_input_buffer_counts,
                config.encoded_output_capacity,
            ),
            incoming: Arc::new(Mutex::new(IncomingPipeline::new())),
            incoming_epoch: 0,
            session: 0,
            muxer,
            demuxer,
            tracks: TrackSelector::new(),
            outputs: OutputRegistry::new(),
            bitrate: BitrateAdapter::new(),
            stats: StreamStats::new(),
        };

        let stream = Self {
            inner: Arc::new(Inner {
                id,
                connection: weak,
                config,
                state: Mutex::new(shared),
                delivery: Mutex::new(()),
            }),
        };

        connection.add_stream(&stream);
        tracing::debug!(stream_id = id, "Stream created");
        stream
    }

    /// Process-unique stream id
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        self.inner.state.lock().context.state
    }

    /// Snapshot of the stream context
    pub fn context(&self) -> StreamContext {
        self.inner.state.lock().context.clone()
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> StreamStats {
        self.inner.state.lock().stats.clone()
    }

    /// Configuration the stream was created with
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.inner.connection.upgrade().ok_or(Error::ConnectionGone)
    }

    async fn ensure_connected(&self) -> Result<Arc<dyn Connection>> {
        let connection = self.connection()?;
        if !connection.connected().await {
            tracing::warn!(stream_id = self.id(), "Connection not connected");
            return Err(Error::NotConnected);
        }
        Ok(connection)
    }

    /// Start publishing under `name`
    ///
    /// `None` (or an empty name) while publishing stops the session. The
    /// connection must report connected; otherwise the state is left
    /// untouched and an error is returned.
    pub async fn publish(&self, name: Option<&str>) -> Result<()> {
        self.ensure_connected().await?;

        match self.begin_publish(name)? {
            Transition::Start((session, outputs, mux_rx)) => {
                self.spawn_publish_tasks(session, outputs, mux_rx);
                Ok(())
            }
            Transition::Close => {
                self.close();
                Ok(())
            }
            Transition::Unchanged => Ok(()),
        }
    }

    fn begin_publish(
        &self,
        name: Option<&str>,
    ) -> Result<Transition<(u64, Option<OutgoingOutputs>, mpsc::Receiver<Bytes>)>> {
        let name = name.filter(|n| !n.is_empty());
        let mut shared = self.inner.state.lock();

        let name = match (shared.context.state, name) {
            (StreamState::Publishing, None) => return Ok(Transition::Close),
            (_, None) => return Ok(Transition::Unchanged),
            (StreamState::Publishing, Some(name)) => {
                tracing::debug!(stream_id = self.id(), name, "Already publishing");
                return Ok(Transition::Unchanged);
            }
            (StreamState::Playing, Some(_)) => {
                return Err(Error::InvalidState {
                    state: StreamState::Playing,
                })
            }
            (StreamState::Idle, Some(name)) => name.to_string(),
        };

        tracing::info!(stream_id = self.id(), name = %name, "Publishing");
        shared.context.start(StreamState::Publishing, name);
        shared.stats = StreamStats::new();
        shared.session += 1;

        let outputs = shared.outgoing.start_running();
        let mux_rx = shared.muxer.subscribe();

        let mut expected = MediaSet::empty();
        if shared.outgoing.audio_input_format().is_some() {
            expected.insert(MediaKind::Audio);
        }
        if shared.outgoing.video_input_format().is_some() {
            expected.insert(MediaKind::Video);
        }
        shared.muxer.set_expected_medias(expected);

        Ok(Transition::Start((shared.session, outputs, mux_rx)))
    }

    fn spawn_publish_tasks(
        &self,
        session: u64,
        outputs: Option<OutgoingOutputs>,
        mut mux_rx: mpsc::Receiver<Bytes>,
    ) {
        let id = self.id();

        if let Some(outputs) = outputs {
            let OutgoingOutputs {
                mut video_input,
                mut video,
                mut audio,
            } = outputs;

            let weak = self.downgrade();
            tokio::spawn(async move {
                while let Some(frame) = video.recv().await {
                    let Some(stream) = weak.upgrade() else { break };
                    if !stream.accept(Frame::Video(frame), None, Some(session)) {
                        break;
                    }
                }
                tracing::debug!(stream_id = id, "Encoded video task finished");
            });

            let weak = self.downgrade();
            tokio::spawn(async move {
                while let Some((frame, timestamp)) = audio.recv().await {
                    let Some(stream) = weak.upgrade() else { break };
                    if !stream.accept(Frame::Audio { frame, timestamp }, None, Some(session)) {
                        break;
                    }
                }
                tracing::debug!(stream_id = id, "Encoded audio task finished");
            });

            let weak = self.downgrade();
            tokio::spawn(async move {
                while let Some(frame) = video_input.recv().await {
                    let Some(stream) = weak.upgrade() else { break };
                    if !stream.encode_video(session, frame) {
                        break;
                    }
                }
                tracing::debug!(stream_id = id, "Video input task finished");
            });
        }

        let weak = self.downgrade();
        tokio::spawn(async move {
            while let Some(data) = mux_rx.recv().await {
                let Some(stream) = weak.upgrade() else { break };
                if !stream.send(session, data).await {
                    break;
                }
            }
            tracing::debug!(stream_id = id, "Mux output task finished");
        });
    }

    /// Start playing `name`
    ///
    /// `None` while playing stops the session.
    pub async fn play(&self, name: Option<&str>) -> Result<()> {
        let connection = self.ensure_connected().await?;

        match self.begin_play(name)? {
            Transition::Start((session, demux_rx)) => {
                if let Err(e) = connection.recv().await {
                    tracing::warn!(stream_id = self.id(), error = %e, "Connection refused receive");
                    self.close();
                    return Err(e);
                }
                self.spawn_play_task(session, demux_rx);
                Ok(())
            }
            Transition::Close => {
                self.close();
                Ok(())
            }
            Transition::Unchanged => Ok(()),
        }
    }

    fn begin_play(
        &self,
        name: Option<&str>,
    ) -> Result<Transition<(u64, mpsc::Receiver<(u8, Frame)>)>> {
        let name = name.filter(|n| !n.is_empty());
        let mut shared = self.inner.state.lock();

        let name = match (shared.context.state, name) {
            (StreamState::Playing, None) => return Ok(Transition::Close),
            (_, None) => return Ok(Transition::Unchanged),
            (StreamState::Playing, Some(name)) => {
                tracing::debug!(stream_id = self.id(), name, "Already playing");
                return Ok(Transition::Unchanged);
            }
            (StreamState::Publishing, Some(_)) => {
                return Err(Error::InvalidState {
                    state: StreamState::Publishing,
                })
            }
            (StreamState::Idle, Some(name)) => name.to_string(),
        };

        tracing::info!(stream_id = self.id(), name = %name, "Playing");
        shared.context.start(StreamState::Playing, name);
        shared.stats = StreamStats::new();
        shared.session += 1;

        let demux_rx = shared.demuxer.subscribe();
        let epoch = shared.incoming.lock().start_running();
        shared.incoming_epoch = epoch;

        Ok(Transition::Start((shared.session, demux_rx)))
    }

    fn spawn_play_task(&self, session: u64, mut demux_rx: mpsc::Receiver<(u8, Frame)>) {
        let id = self.id();
        let weak = self.downgrade();
        tokio::spawn(async move {
            while let Some((track, frame)) = demux_rx.recv().await {
                let Some(stream) = weak.upgrade() else { break };
                if !stream.deliver_incoming(session, TrackId::new(track), frame) {
                    break;
                }
            }
            tracing::debug!(stream_id = id, "Demux output task finished");
        });
    }

    /// Stop the current session
    ///
    /// Returns `None` if the stream was already idle. Otherwise the
    /// outgoing pipeline and container state are torn down before this
    /// returns, and the incoming pipeline is stopped by a detached task
    /// whose handle is returned. Frames appended after `close` returns are
    /// not accepted.
    pub fn close(&self) -> Option<JoinHandle<()>> {
        let (incoming, epoch) = {
            let mut shared = self.inner.state.lock();
            if shared.context.state == StreamState::Idle {
                return None;
            }

            let previous = shared.context.state;
            shared.muxer.clear();
            shared.demuxer.clear();
            shared.outgoing.stop_running();
            shared.context.stop();

            tracing::info!(
                stream_id = self.id(),
                state = ?previous,
                video_frames = shared.stats.video_frames,
                audio_frames = shared.stats.audio_frames,
                bytes_sent = shared.stats.bytes_sent,
                "Stream closed"
            );

            (Arc::clone(&shared.incoming), shared.incoming_epoch)
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(async move {
                incoming.lock().stop_running(epoch);
            })),
            Err(_) => {
                incoming.lock().stop_running(epoch);
                None
            }
        }
    }

    /// Append a video frame from the source or encoder
    ///
    /// Raw frames go to the outgoing pipeline, compressed frames to the
    /// multiplexer. Returns `false` if the stream is not publishing.
    pub fn append(&self, frame: VideoFrame) -> bool {
        self.accept(Frame::Video(frame), None, None)
    }

    /// Append an audio frame with its timestamp
    pub fn append_audio(&self, frame: AudioFrame, timestamp: Duration) -> bool {
        self.accept(Frame::Audio { frame, timestamp }, None, None)
    }

    /// Source entry point for multi-track input
    ///
    /// Frames on a track other than the selected one for their kind are
    /// dropped; with no selection every track is accepted.
    pub fn append_from_source(&self, track: TrackId, frame: Frame) -> bool {
        self.accept(frame, Some(track), None)
    }

    /// Accept `frame` into the publish session
    ///
    /// Frames forwarded by a task carry their session generation and are
    /// rejected once that session is over.
    fn accept(&self, frame: Frame, track: Option<TrackId>, session: Option<u64>) -> bool {
        let _delivery = self.inner.delivery.lock();

        let (context, outputs) = {
            let mut shared = self.inner.state.lock();
            if !shared.context.is_publishing() {
                return false;
            }
            if session.is_some_and(|s| s != shared.session) {
                tracing::trace!(stream_id = self.id(), "Dropping frame from a closed session");
                return false;
            }
            if let Some(track) = track {
                if !shared.tracks.accepts(frame.kind(), track) {
                    shared.stats.dropped_frames += 1;
                    return false;
                }
            }

            shared.route(&frame);
            shared.stats.on_frame(&frame);

            if shared.outputs.is_empty() {
                return true;
            }
            (shared.context.clone(), shared.outputs.clone())
        };

        outputs.fan_out(&context, &frame);
        true
    }

    /// Whether `session` is the publish session in progress
    fn is_publishing_session(&self, session: u64) -> bool {
        let shared = self.inner.state.lock();
        shared.context.is_publishing() && shared.session == session
    }

    /// Returns `false` once `session` is over
    fn encode_video(&self, session: u64, frame: VideoFrame) -> bool {
        let mut shared = self.inner.state.lock();
        if !shared.context.is_publishing() || shared.session != session {
            return false;
        }
        shared.outgoing.encode_video(frame);
        true
    }

    /// Returns `false` once `session` is over or the connection is gone
    async fn send(&self, session: u64, data: Bytes) -> bool {
        if !self.is_publishing_session(session) {
            return false;
        }
        let Ok(connection) = self.connection() else {
            tracing::trace!(stream_id = self.id(), "Connection released, dropping output");
            return false;
        };

        let len = data.len() as u64;
        match connection.send(data).await {
            Ok(()) => self.inner.state.lock().stats.bytes_sent += len,
            Err(e) => {
                tracing::warn!(stream_id = self.id(), error = %e, "Failed to send stream data");
            }
        }
        true
    }

    /// Feed bytes received by the connection into the demultiplexer
    ///
    /// Returns `false` if the stream is not playing or the input was
    /// rejected.
    pub fn receive(&self, data: Bytes) -> bool {
        let mut shared = self.inner.state.lock();
        if !shared.context.is_playing() {
            return false;
        }
        shared.stats.bytes_received += data.len() as u64;
        shared.demuxer.read(data)
    }

    /// Render and fan out a demultiplexed frame
    ///
    /// Returns `false` once `session` is over. The sink and the observers
    /// run after the stream lock is released.
    fn deliver_incoming(&self, session: u64, track: TrackId, frame: Frame) -> bool {
        let _delivery = self.inner.delivery.lock();

        let (context, outputs, prepared) = {
            let mut shared = self.inner.state.lock();
            if !shared.context.is_playing() || shared.session != session {
                return false;
            }
            if !shared.tracks.accepts(frame.kind(), track) {
                shared.stats.dropped_frames += 1;
                return true;
            }

            let Some(prepared) = shared.incoming.lock().append(frame) else {
                return true;
            };
            shared.stats.on_frame(prepared.frame());
            (shared.context.clone(), shared.outputs.clone(), prepared)
        };

        let rendered = prepared.render();
        outputs.fan_out(&context, &rendered);
        true
    }

    /// Select the active track for `kind`; `None` clears the selection
    pub fn select_track(&self, id: Option<u8>, kind: MediaKind) {
        self.inner.state.lock().tracks.select(id, kind);
    }

    /// Active track for `kind`
    pub fn selected_track(&self, kind: MediaKind) -> TrackId {
        self.inner.state.lock().tracks.selected(kind)
    }

    pub fn audio_settings(&self) -> AudioSettings {
        self.inner.state.lock().outgoing.audio_settings().clone()
    }

    /// Replace the audio settings
    ///
    /// Unsupported formats are rejected and the previous settings kept.
    pub fn set_audio_settings(&self, settings: AudioSettings) -> Result<()> {
        self.inner.config.codec_policy.validate_audio(&settings)?;
        self.inner.state.lock().outgoing.set_audio_settings(settings);
        Ok(())
    }

    pub fn video_settings(&self) -> VideoSettings {
        self.inner.state.lock().outgoing.video_settings().clone()
    }

    /// Replace the video settings
    ///
    /// Unsupported formats are rejected and the previous settings kept.
    pub fn set_video_settings(&self, settings: VideoSettings) -> Result<()> {
        self.inner.config.codec_policy.validate_video(&settings)?;
        self.inner.state.lock().outgoing.set_video_settings(settings);
        Ok(())
    }

    /// Declare the raw audio format the source delivers
    pub fn set_audio_input_format(&self, format: Option<AudioInputFormat>) {
        self.inner.state.lock().outgoing.set_audio_input_format(format);
    }

    /// Declare the raw video format the source delivers
    pub fn set_video_input_format(&self, format: Option<VideoInputFormat>) {
        self.inner.state.lock().outgoing.set_video_input_format(format);
    }

    pub fn set_video_encoder(&self, encoder: Option<Box<dyn VideoEncoder>>) {
        self.inner.state.lock().outgoing.set_video_encoder(encoder);
    }

    pub fn set_audio_encoder(&self, encoder: Option<Box<dyn AudioEncoder>>) {
        self.inner.state.lock().outgoing.set_audio_encoder(encoder);
    }

    /// Mute or unmute outgoing media of `kind`
    pub fn set_muted(&self, kind: MediaKind, muted: bool) {
        self.inner.state.lock().outgoing.set_muted(kind, muted);
    }

    pub fn is_muted(&self, kind: MediaKind) -> bool {
        self.inner.state.lock().outgoing.is_muted(kind)
    }

    pub fn sound_transform(&self) -> SoundTransform {
        self.inner.state.lock().incoming.lock().sound_transform()
    }

    pub fn set_sound_transform(&self, transform: SoundTransform) {
        self.inner
            .state
            .lock()
            .incoming
            .lock()
            .set_sound_transform(transform);
    }

    /// Attach a render sink for played media; `None` detaches
    ///
    /// The sink is called outside the stream lock, in delivery order. Like
    /// an observer it must not call the `append` entry points.
    pub fn attach_sink(&self, sink: Option<Arc<dyn RenderSink>>) {
        self.inner.state.lock().incoming.lock().attach(sink);
    }

    /// Install the bitrate strategy; takes effect on the next event
    pub fn set_bitrate_strategy(&self, strategy: Option<Arc<dyn BitrateStrategy>>) {
        self.inner.state.lock().bitrate.set_strategy(strategy);
    }

    /// Forward a network event to the active strategy, if any
    pub fn dispatch(&self, event: NetworkEvent) {
        let strategy = self.inner.state.lock().bitrate.strategy();
        if let Some(strategy) = strategy {
            strategy.adjust_bitrate(&event, self);
        }
    }

    /// Register an observer. Returns `false` if it was already registered.
    pub fn add_output(&self, output: Arc<dyn StreamOutput>) -> bool {
        self.inner.state.lock().outputs.add(output)
    }

    /// Unregister an observer. Returns `false` if it was not registered.
    pub fn remove_output(&self, output: &Arc<dyn StreamOutput>) -> bool {
        self.inner.state.lock().outputs.remove(output)
    }

    pub fn output_count(&self) -> usize {
        self.inner.state.lock().outputs.len()
    }

    fn downgrade(&self) -> WeakStream {
        WeakStream {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl std::fmt::Debug for RtmpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtmpStream")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Send `frame` down exactly one path
    fn route(&mut self, frame: &Frame) {
        match frame {
            Frame::Video(video) if video.compressed => {
                if let Some(format) = &video.format {
                    self.muxer.set_video_format(Some(format.clone()));
                }
                self.muxer.append(frame);
            }
            Frame::Video(video) => {
                if !self.outgoing.append_video(video.clone()) {
                    self.stats.dropped_frames += 1;
                }
            }
            Frame::Audio { frame: audio, .. } if audio.compressed => {
                if let Some(format) = &audio.format {
                    self.muxer.set_audio_format(Some(format.clone()));
                }
                self.muxer.append(frame);
            }
            Frame::Audio {
                frame: audio,
                timestamp,
            } => {
                if !self.outgoing.append_audio(audio.clone(), *timestamp) {
                    self.stats.dropped_frames += 1;
                }
            }
        }
    }
}

/// Non-owning handle held by forwarding tasks
struct WeakStream {
    inner: Weak<Inner>,
}

impl WeakStream {
    fn upgrade(&self) -> Option<RtmpStream> {
        self.inner.upgrade().map(|inner| RtmpStream { inner })
    }
}
