//! End-to-end tests for the stream controller against a stub connection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use rtmp_stream::media::{
    AudioFormat, AudioFormatDescription, AudioInputFormat, AudioSettings, MediaSet,
    VideoFormat, VideoFormatDescription, VideoInputFormat, VideoSettings,
};
use rtmp_stream::mux::{FlvDemuxer, FlvMuxer, Multiplexer};
use rtmp_stream::net::{AdaptiveBitrateStrategy, BitrateStrategy, NetworkReport};
use rtmp_stream::stream::{
    AudioEncoder, OutputError, RenderSink, SoundTransform, StreamContext, StreamOutput, TrackId,
    VideoEncoder,
};
use rtmp_stream::{
    AudioFrame, Connection, Error, Frame, MediaKind, NetworkEvent, RtmpStream, StreamConfig,
    StreamState, VideoFrame,
};

#[derive(Default)]
struct StubConnection {
    connected: AtomicBool,
    receiving: AtomicBool,
    sent: Mutex<Vec<Bytes>>,
    streams: Mutex<Vec<RtmpStream>>,
}

impl StubConnection {
    fn online() -> Arc<Self> {
        let connection = Arc::new(Self::default());
        connection.connected.store(true, Ordering::SeqCst);
        connection
    }

    fn sent_bytes(&self) -> Vec<u8> {
        self.sent.lock().iter().flat_map(|b| b.to_vec()).collect()
    }
}

impl Connection for StubConnection {
    fn connected(&self) -> BoxFuture<'_, bool> {
        let connected = self.connected.load(Ordering::SeqCst);
        async move { connected }.boxed()
    }

    fn send(&self, data: Bytes) -> BoxFuture<'_, rtmp_stream::Result<()>> {
        async move {
            self.sent.lock().push(data);
            Ok(())
        }
        .boxed()
    }

    fn recv(&self) -> BoxFuture<'_, rtmp_stream::Result<()>> {
        async move {
            self.receiving.store(true, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn add_stream(&self, stream: &RtmpStream) {
        self.streams.lock().push(stream.clone());
    }
}

#[derive(Default)]
struct Recorder {
    frames: Mutex<Vec<Frame>>,
}

impl Recorder {
    fn frames(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }
}

impl StreamOutput for Recorder {
    fn on_frame(&self, _: &StreamContext, frame: &Frame) -> Result<(), OutputError> {
        self.frames.lock().push(frame.clone());
        Ok(())
    }
}

impl RenderSink for Recorder {
    fn render(&self, frame: &Frame) {
        self.frames.lock().push(frame.clone());
    }
}

/// Multiplexer that records what it was asked to pack
#[derive(Clone, Default)]
struct RecordingMuxer {
    appended: Arc<Mutex<Vec<Frame>>>,
    expected: Arc<Mutex<Option<MediaSet>>>,
    video_format: Arc<Mutex<Option<VideoFormatDescription>>>,
    clears: Arc<Mutex<usize>>,
}

impl Multiplexer for RecordingMuxer {
    fn set_expected_medias(&mut self, medias: MediaSet) {
        *self.expected.lock() = Some(medias);
    }

    fn set_video_format(&mut self, format: Option<VideoFormatDescription>) {
        *self.video_format.lock() = format;
    }

    fn set_audio_format(&mut self, _: Option<AudioFormatDescription>) {}

    fn append(&mut self, frame: &Frame) {
        self.appended.lock().push(frame.clone());
    }

    fn clear(&mut self) {
        *self.clears.lock() += 1;
    }

    fn subscribe(&mut self) -> mpsc::Receiver<Bytes> {
        mpsc::channel(1).1
    }
}

/// Turns every raw frame into a compressed key frame
struct FakeH264;

impl VideoEncoder for FakeH264 {
    fn encode(&mut self, frame: VideoFrame, settings: &VideoSettings) -> Vec<VideoFrame> {
        let format = VideoFormatDescription {
            format: settings.format,
            width: settings.width,
            height: settings.height,
            config: Bytes::from_static(&[0x01, 0x42, 0x00, 0x1E]),
        };
        vec![VideoFrame::compressed(frame.timestamp, frame.data, true).with_format(format)]
    }
}

/// Turns every raw buffer into a compressed AAC frame
struct FakeAac;

impl AudioEncoder for FakeAac {
    fn encode(
        &mut self,
        frame: AudioFrame,
        timestamp: Duration,
        _: &AudioSettings,
    ) -> Vec<(AudioFrame, Duration)> {
        vec![(
            AudioFrame::compressed(frame.data).with_format(aac_format()),
            timestamp,
        )]
    }
}

fn raw_video(ms: u64, byte: u8) -> VideoFrame {
    VideoFrame::raw(Duration::from_millis(ms), Bytes::from(vec![byte; 4]))
}

fn raw_audio(byte: u8) -> AudioFrame {
    AudioFrame::raw(Bytes::from(vec![byte; 4]))
}

fn avc_format() -> VideoFormatDescription {
    VideoFormatDescription {
        format: VideoFormat::H264,
        width: 640,
        height: 360,
        config: Bytes::from_static(&[0x01, 0x64, 0x00, 0x1F]),
    }
}

fn aac_format() -> AudioFormatDescription {
    AudioFormatDescription {
        format: AudioFormat::Aac,
        sample_rate: 44100,
        channels: 2,
        config: Bytes::from_static(&[0x12, 0x10]),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtmp_stream=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_publish_append_close_scenario() {
    init_tracing();
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);
    let observer = Arc::new(Recorder::default());
    stream.add_output(observer.clone());

    assert_ok!(stream.publish(Some("x")).await);
    assert_eq!(stream.state(), StreamState::Publishing);
    assert_eq!(stream.context().name.as_deref(), Some("x"));

    let t = Duration::from_millis(20);
    assert!(stream.append(raw_video(0, 1)));
    assert!(stream.append_audio(raw_audio(2), t));
    assert!(stream.append(raw_video(33, 3)));

    let frames = observer.frames();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], Frame::Video(raw_video(0, 1)));
    assert_eq!(
        frames[1],
        Frame::Audio {
            frame: raw_audio(2),
            timestamp: t
        }
    );
    assert_eq!(frames[2], Frame::Video(raw_video(33, 3)));

    assert!(stream.close().is_some());
    assert_eq!(stream.state(), StreamState::Idle);

    assert!(!stream.append(raw_video(66, 4)));
    assert!(!stream.append_audio(raw_audio(5), t));
    assert_eq!(observer.frames().len(), 3);
}

#[tokio::test]
async fn test_publish_requires_connection() {
    let connection = Arc::new(StubConnection::default());
    let stream = RtmpStream::new(&connection);

    assert_eq!(stream.publish(Some("x")).await, Err(Error::NotConnected));
    assert_eq!(stream.play(Some("x")).await, Err(Error::NotConnected));
    assert_eq!(stream.state(), StreamState::Idle);

    drop(connection);
    assert_eq!(stream.publish(Some("x")).await, Err(Error::ConnectionGone));
    assert_eq!(stream.state(), StreamState::Idle);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);

    assert!(stream.close().is_none());

    for _ in 0..3 {
        assert_ok!(stream.publish(Some("x")).await);
        assert_eq!(stream.state(), StreamState::Publishing);
        // Second start is a no-op
        assert_ok!(stream.publish(Some("x")).await);
        assert_eq!(stream.state(), StreamState::Publishing);

        assert!(stream.close().is_some());
        assert!(stream.close().is_none());
        assert_eq!(stream.state(), StreamState::Idle);
    }
}

#[tokio::test]
async fn test_publish_none_stops_publishing() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);

    // Nothing to stop
    assert_ok!(stream.publish(None).await);
    assert_eq!(stream.state(), StreamState::Idle);

    assert_ok!(stream.publish(Some("x")).await);
    assert_ok!(stream.publish(Some("")).await);
    assert_eq!(stream.state(), StreamState::Idle);
}

#[tokio::test]
async fn test_no_direct_switch_between_modes() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);

    assert_ok!(stream.publish(Some("x")).await);
    assert_eq!(
        stream.play(Some("y")).await,
        Err(Error::InvalidState {
            state: StreamState::Publishing
        })
    );
    // play(None) does not stop a publish session
    assert_ok!(stream.play(None).await);
    assert_eq!(stream.state(), StreamState::Publishing);

    stream.close();
    assert_ok!(stream.play(Some("y")).await);
    assert_eq!(stream.state(), StreamState::Playing);
    assert_err!(stream.publish(Some("x")).await);
}

#[tokio::test]
async fn test_routing_partition() {
    let connection = StubConnection::online();
    let muxer = RecordingMuxer::default();
    let stream = RtmpStream::with_container(
        &connection,
        StreamConfig::default(),
        Box::new(muxer.clone()),
        Box::new(FlvDemuxer::new()),
    );
    let observer = Arc::new(Recorder::default());
    stream.add_output(observer.clone());
    assert_ok!(stream.publish(Some("x")).await);

    let compressed = VideoFrame::compressed(Duration::ZERO, Bytes::from_static(&[9]), true)
        .with_format(avc_format());
    stream.append(raw_video(0, 1));
    stream.append(compressed.clone());
    stream.append_audio(raw_audio(2), Duration::ZERO);
    stream.append_audio(
        AudioFrame::compressed(Bytes::from_static(&[7])),
        Duration::ZERO,
    );

    let appended = muxer.appended.lock().clone();
    assert_eq!(appended.len(), 2);
    assert!(appended.iter().all(Frame::is_compressed));
    assert_eq!(appended[0], Frame::Video(compressed));
    // Format description is bound before the frame is appended
    assert_eq!(*muxer.video_format.lock(), Some(avc_format()));

    // Observers see every frame exactly once
    assert_eq!(observer.frames().len(), 4);

    stream.close();
    assert_eq!(*muxer.clears.lock(), 1);
}

#[tokio::test]
async fn test_expected_medias_follow_input_formats() {
    let connection = StubConnection::online();
    let muxer = RecordingMuxer::default();
    let stream = RtmpStream::with_container(
        &connection,
        StreamConfig::default(),
        Box::new(muxer.clone()),
        Box::new(FlvDemuxer::new()),
    );

    stream.set_audio_input_format(Some(AudioInputFormat {
        sample_rate: 48000,
        channels: 2,
    }));
    assert_ok!(stream.publish(Some("x")).await);

    let expected = muxer.expected.lock().unwrap();
    assert!(expected.contains(MediaKind::Audio));
    assert!(!expected.contains(MediaKind::Video));
    stream.close();

    stream.set_video_input_format(Some(VideoInputFormat {
        width: 1280,
        height: 720,
    }));
    assert_ok!(stream.publish(Some("x")).await);
    assert_eq!(*muxer.expected.lock(), Some(MediaSet::all()));
}

#[tokio::test]
async fn test_encoded_video_reaches_connection() {
    init_tracing();
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);
    stream.set_video_encoder(Some(Box::new(FakeH264)));
    let observer = Arc::new(Recorder::default());
    stream.add_output(observer.clone());

    assert_ok!(stream.publish(Some("x")).await);
    stream.append(raw_video(0, 0xAB));

    // Sequence header + coded frame
    eventually(|| connection.sent.lock().len() >= 2).await;
    eventually(|| observer.frames().len() >= 2).await;

    let frames = observer.frames();
    assert!(!frames[0].is_compressed());
    assert!(frames[1].is_compressed());

    let bytes = connection.sent_bytes();
    // First tag is a video tag
    assert_eq!(bytes[0], 9);
    assert!(stream.stats().bytes_sent > 0);
    assert_eq!(stream.stats().keyframes, 1);
}

#[tokio::test]
async fn test_play_renders_and_fans_out() {
    init_tracing();
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);
    let sink = Arc::new(Recorder::default());
    let observer = Arc::new(Recorder::default());
    stream.attach_sink(Some(sink.clone()));
    stream.add_output(observer.clone());

    assert!(!stream.receive(Bytes::from_static(&[0])));
    assert_ok!(stream.play(Some("live")).await);
    assert_eq!(stream.state(), StreamState::Playing);
    assert!(connection.receiving.load(Ordering::SeqCst));

    let mut muxer = FlvMuxer::new();
    let mut rx = muxer.subscribe();
    muxer.set_expected_medias(MediaSet::all());
    muxer.set_video_format(Some(avc_format()));
    muxer.set_audio_format(Some(aac_format()));
    muxer.append(&Frame::Video(VideoFrame::compressed(
        Duration::ZERO,
        Bytes::from_static(&[0xAA]),
        true,
    )));
    muxer.append(&Frame::Audio {
        frame: AudioFrame::compressed(Bytes::from_static(&[0xBB])),
        timestamp: Duration::from_millis(23),
    });
    while let Ok(bytes) = rx.try_recv() {
        assert!(stream.receive(bytes));
    }

    eventually(|| sink.frames().len() == 2).await;
    eventually(|| observer.frames().len() == 2).await;
    let frames = sink.frames();
    assert_eq!(frames[0].kind(), MediaKind::Video);
    assert_eq!(frames[1].kind(), MediaKind::Audio);
    assert_eq!(frames[1].timestamp(), Duration::from_millis(23));

    let teardown = stream.close().unwrap();
    assert_ok!(teardown.await);
    assert!(!stream.receive(Bytes::from_static(&[0])));
}

#[tokio::test]
async fn test_teardown_overlaps_new_session() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);
    let sink = Arc::new(Recorder::default());
    stream.attach_sink(Some(sink.clone()));

    assert_ok!(stream.play(Some("a")).await);
    let teardown = stream.close().unwrap();
    assert_ok!(stream.play(Some("b")).await);
    assert_ok!(teardown.await);

    let mut muxer = FlvMuxer::new();
    let mut rx = muxer.subscribe();
    muxer.set_audio_format(Some(aac_format()));
    muxer.append(&Frame::Audio {
        frame: AudioFrame::compressed(Bytes::from_static(&[0x01])),
        timestamp: Duration::ZERO,
    });
    while let Ok(bytes) = rx.try_recv() {
        assert!(stream.receive(bytes));
    }

    // The new session still renders
    eventually(|| sink.frames().len() == 1).await;
}

fn flv_audio(payload: &'static [u8]) -> Vec<Bytes> {
    let mut muxer = FlvMuxer::new();
    let mut rx = muxer.subscribe();
    muxer.set_audio_format(Some(aac_format()));
    muxer.append(&Frame::Audio {
        frame: AudioFrame::compressed(Bytes::from_static(payload)),
        timestamp: Duration::ZERO,
    });
    let mut tags = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        tags.push(bytes);
    }
    tags
}

#[tokio::test]
async fn test_buffered_video_does_not_leak_into_next_publish() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);
    stream.set_video_encoder(Some(Box::new(FakeH264)));
    let observer = Arc::new(Recorder::default());
    stream.add_output(observer.clone());

    assert_ok!(stream.publish(Some("one")).await);
    // Queued for the encoder, not yet encoded
    assert!(stream.append(raw_video(0, 0xAA)));
    stream.close();
    assert_ok!(stream.publish(Some("two")).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(observer.frames(), vec![Frame::Video(raw_video(0, 0xAA))]);
    assert!(connection.sent.lock().is_empty());
    assert_eq!(stream.stats().bytes_sent, 0);

    // The new session encodes its own frames
    assert!(stream.append(raw_video(0, 0xBB)));
    eventually(|| observer.frames().len() == 3).await;
    let frames = observer.frames();
    assert!(frames[2].is_compressed());
    assert_eq!(frames[2].data().as_ref(), &[0xBB; 4]);
    eventually(|| !connection.sent.lock().is_empty()).await;
}

#[tokio::test]
async fn test_encoded_output_does_not_leak_into_next_publish() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);
    stream.set_audio_encoder(Some(Box::new(FakeAac)));
    let observer = Arc::new(Recorder::default());
    stream.add_output(observer.clone());

    assert_ok!(stream.publish(Some("one")).await);
    // Encoded inline; the compressed frame waits in the encoder output
    assert!(stream.append_audio(raw_audio(0x11), Duration::ZERO));
    // Muxed inline; the tags wait in the mux output
    let compressed = VideoFrame::compressed(Duration::ZERO, Bytes::from_static(&[0x22]), true)
        .with_format(avc_format());
    assert!(stream.append(compressed));
    stream.close();
    assert_ok!(stream.publish(Some("two")).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let frames = observer.frames();
    assert_eq!(frames.len(), 2);
    assert!(!frames[0].is_compressed());
    assert_eq!(frames[1].data().as_ref(), &[0x22]);
    assert!(connection.sent.lock().is_empty());
}

#[tokio::test]
async fn test_queued_demux_frames_do_not_leak_into_next_play() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);
    let sink = Arc::new(Recorder::default());
    let observer = Arc::new(Recorder::default());
    stream.attach_sink(Some(sink.clone()));
    stream.add_output(observer.clone());

    assert_ok!(stream.play(Some("a")).await);
    for bytes in flv_audio(&[0x0A]) {
        assert!(stream.receive(bytes));
    }
    let teardown = stream.close().unwrap();
    assert_ok!(stream.play(Some("b")).await);
    assert_ok!(teardown.await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.frames().is_empty());
    assert!(observer.frames().is_empty());

    for bytes in flv_audio(&[0x0B]) {
        assert!(stream.receive(bytes));
    }
    eventually(|| sink.frames().len() == 1).await;
    assert_eq!(sink.frames()[0].data().as_ref(), &[0x0B]);
    eventually(|| observer.frames().len() == 1).await;
}

/// Sink that reads stream state while rendering
#[derive(Default)]
struct StateReadingSink {
    stream: Mutex<Option<RtmpStream>>,
    seen: Mutex<Vec<StreamState>>,
}

impl RenderSink for StateReadingSink {
    fn render(&self, _: &Frame) {
        if let Some(stream) = self.stream.lock().as_ref() {
            self.seen.lock().push(stream.state());
            stream.output_count();
        }
    }
}

#[tokio::test]
async fn test_sink_runs_outside_stream_lock() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);
    let sink = Arc::new(StateReadingSink::default());
    *sink.stream.lock() = Some(stream.clone());
    stream.attach_sink(Some(sink.clone()));

    assert_ok!(stream.play(Some("live")).await);
    for bytes in flv_audio(&[0x01]) {
        assert!(stream.receive(bytes));
    }

    eventually(|| !sink.seen.lock().is_empty()).await;
    assert_eq!(*sink.seen.lock(), vec![StreamState::Playing]);

    stream.close();
    sink.stream.lock().take();
}

#[tokio::test]
async fn test_track_selection_filters_source_frames() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);
    let observer = Arc::new(Recorder::default());
    stream.add_output(observer.clone());
    assert_ok!(stream.publish(Some("x")).await);

    // Unassigned: every track is forwarded
    assert_eq!(stream.selected_track(MediaKind::Video), TrackId::UNASSIGNED);
    assert!(stream.append_from_source(TrackId::new(0), Frame::Video(raw_video(0, 1))));
    assert!(stream.append_from_source(TrackId::new(3), Frame::Video(raw_video(1, 2))));

    stream.select_track(Some(1), MediaKind::Video);
    assert!(!stream.append_from_source(TrackId::new(0), Frame::Video(raw_video(2, 3))));
    assert!(stream.append_from_source(TrackId::new(1), Frame::Video(raw_video(3, 4))));
    // Audio selection is independent
    assert!(stream.append_from_source(
        TrackId::new(0),
        Frame::Audio {
            frame: raw_audio(5),
            timestamp: Duration::ZERO
        }
    ));

    assert_eq!(observer.frames().len(), 4);
    assert_eq!(stream.stats().dropped_frames, 1);
}

#[tokio::test]
async fn test_codec_settings_policy() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);

    let previous = stream.audio_settings();
    let opus = AudioSettings {
        format: AudioFormat::Opus,
        bit_rate: 96_000,
        ..Default::default()
    };
    assert!(matches!(
        stream.set_audio_settings(opus),
        Err(Error::UnsupportedCodec {
            kind: MediaKind::Audio,
            ..
        })
    ));
    assert_eq!(stream.audio_settings(), previous);

    for format in [VideoFormat::H264, VideoFormat::Hevc] {
        let settings = VideoSettings {
            format,
            bit_rate: 1_500_000,
            ..Default::default()
        };
        assert_ok!(stream.set_video_settings(settings.clone()));
        assert_eq!(stream.video_settings(), settings);
    }

    let av1 = VideoSettings {
        format: VideoFormat::Av1,
        ..Default::default()
    };
    assert_err!(stream.set_video_settings(av1));
    assert_eq!(stream.video_settings().format, VideoFormat::Hevc);
}

#[derive(Default)]
struct CountingStrategy {
    events: Mutex<Vec<NetworkEvent>>,
}

impl BitrateStrategy for CountingStrategy {
    fn adjust_bitrate(&self, event: &NetworkEvent, _: &RtmpStream) {
        self.events.lock().push(*event);
    }
}

#[tokio::test]
async fn test_bitrate_dispatch() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);
    let before = stream.video_settings();

    // No strategy: no-op
    stream.dispatch(NetworkEvent::Reset);
    assert_eq!(stream.video_settings(), before);

    let counting = Arc::new(CountingStrategy::default());
    stream.set_bitrate_strategy(Some(counting.clone()));
    stream.dispatch(NetworkEvent::Reset);
    assert_eq!(counting.events.lock().len(), 1);

    // Replacement takes effect on the next event
    stream.set_bitrate_strategy(Some(Arc::new(AdaptiveBitrateStrategy::new(2_000_000))));
    stream.dispatch(NetworkEvent::PublishInsufficientBandwidth(NetworkReport {
        current_bytes_out_per_second: 50_000,
        ..Default::default()
    }));
    assert_eq!(counting.events.lock().len(), 1);
    assert_eq!(stream.video_settings().bit_rate, 320_000);

    stream.dispatch(NetworkEvent::Reset);
    assert_eq!(stream.video_settings().bit_rate, 2_000_000);

    stream.set_bitrate_strategy(None);
    stream.dispatch(NetworkEvent::PublishInsufficientBandwidth(NetworkReport::default()));
    assert_eq!(stream.video_settings().bit_rate, 2_000_000);
}

#[tokio::test]
async fn test_observer_registration_order() {
    struct Tagged {
        tag: u8,
        log: Arc<Mutex<Vec<u8>>>,
    }

    impl StreamOutput for Tagged {
        fn on_frame(&self, _: &StreamContext, _: &Frame) -> Result<(), OutputError> {
            self.log.lock().push(self.tag);
            Ok(())
        }
    }

    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);
    let log = Arc::new(Mutex::new(Vec::new()));
    let outputs: Vec<Arc<dyn StreamOutput>> = (0..3)
        .map(|tag| {
            Arc::new(Tagged {
                tag,
                log: Arc::clone(&log),
            }) as Arc<dyn StreamOutput>
        })
        .collect();

    for output in &outputs {
        assert!(stream.add_output(Arc::clone(output)));
    }
    assert!(!stream.add_output(Arc::clone(&outputs[1])));
    assert!(stream.remove_output(&outputs[0]));
    assert!(!stream.remove_output(&outputs[0]));
    assert!(stream.add_output(Arc::clone(&outputs[0])));
    assert_eq!(stream.output_count(), 3);

    assert_ok!(stream.publish(Some("x")).await);
    stream.append(raw_video(0, 1));
    assert_eq!(*log.lock(), vec![1, 2, 0]);
}

#[tokio::test]
async fn test_mute_and_sound_transform_settings() {
    let connection = StubConnection::online();
    let stream = RtmpStream::new(&connection);

    assert!(!stream.is_muted(MediaKind::Audio));
    stream.set_muted(MediaKind::Audio, true);
    assert!(stream.is_muted(MediaKind::Audio));
    assert!(!stream.is_muted(MediaKind::Video));

    let transform = SoundTransform {
        volume: 0.25,
        muted: false,
    };
    stream.set_sound_transform(transform);
    assert_eq!(stream.sound_transform(), transform);
}

#[tokio::test]
async fn test_streams_register_with_connection() {
    let connection = StubConnection::online();
    let a = RtmpStream::new(&connection);
    let b = RtmpStream::new(&connection);

    let streams = connection.streams.lock();
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0].id(), a.id());
    assert_eq!(streams[1].id(), b.id());
    assert_ne!(a.id(), b.id());
}
