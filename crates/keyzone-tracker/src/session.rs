//! The resolution loop.
//!
//! A [`Session`] pulls the latest frame from a [`FrameSource`], hands it to the
//! [`HandDetector`], converts the detected landmarks into camera pixels, resolves
//! every tracked fingertip to a key and publishes the results to a
//! [`ResolutionSink`].
//!
//! ```text
//!   FrameSource::read ─▶ HandDetector::detect ─▶ to_camera_space
//!        ─▶ rotate / mirror ─▶ FingertipResolver::resolve_hands ─▶ ResolutionSink
//! ```
//!
//! The loop ends when the frame source stops, whether by request or because
//! the camera failed.

use std::io::Write;
use std::thread;
use std::time::Duration;

use keyzone_camera::{Frame, FrameSource, SourceState};
use keyzone_core::{FingertipResolution, FingertipResolver, Hand, HandObservation};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;

/// Error returned by a [`HandDetector`]. The frame is skipped.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("hand detection failed: {0}")]
    Failed(String),
    #[error("frame format not supported by detector: {0}")]
    UnsupportedFrame(String),
}

/// Error returned by a [`ResolutionSink`].
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write resolutions: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode resolutions: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Produces hand landmarks for a frame.
///
/// Landmark coordinates are image-normalized (`0..1` across the frame).
#[cfg_attr(test, mockall::automock)]
pub trait HandDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<HandObservation>, DetectError>;
}

/// Receives the resolved fingertips of each processed frame.
#[cfg_attr(test, mockall::automock)]
pub trait ResolutionSink: Send {
    fn publish(&mut self, sequence: u64, resolutions: &[FingertipResolution]) -> Result<(), SinkError>;
}

/// Sink that reports resolutions through `tracing`.
///
/// Hits are logged at `info`, fingertips off the keyboard at `debug`.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl ResolutionSink for LoggingSink {
    fn publish(&mut self, sequence: u64, resolutions: &[FingertipResolution]) -> Result<(), SinkError> {
        for r in resolutions {
            match r.keycode() {
                Some(key) => info!(
                    sequence,
                    hand = %r.handedness,
                    finger = r.finger_name(),
                    key,
                    "fingertip on key"
                ),
                None => debug!(
                    sequence,
                    hand = %r.handedness,
                    finger = r.finger_name(),
                    "fingertip off keyboard"
                ),
            }
        }
        Ok(())
    }
}

/// Sink that writes one JSON object per frame to `writer`.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    sequence: u64,
    resolutions: &'a [FingertipResolution],
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ResolutionSink for JsonLinesSink<W> {
    fn publish(&mut self, sequence: u64, resolutions: &[FingertipResolution]) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, &FrameRecord { sequence, resolutions })?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Per-session options derived from [`SessionConfig`] and the camera.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub mirror_handedness: bool,
    pub rotate_180: bool,
    pub fingertips: Vec<u32>,
    pub idle_sleep: Duration,
}

impl From<&SessionConfig> for SessionOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            mirror_handedness: config.mirror_handedness,
            rotate_180: config.rotate_180,
            fingertips: config.fingertips.clone(),
            idle_sleep: config.idle_sleep(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames that went through detection and resolution.
    pub frames_processed: u64,
    /// Frames dropped because the detector failed.
    pub frames_skipped: u64,
    /// Fingertips that landed on a key.
    pub key_hits: u64,
    /// Fingertips that landed off every key.
    pub misses: u64,
}

impl SessionStats {
    fn record(&mut self, resolutions: &[FingertipResolution]) {
        self.frames_processed += 1;
        let hits = resolutions.iter().filter(|r| r.key.is_some()).count() as u64;
        self.key_hits += hits;
        self.misses += resolutions.len() as u64 - hits;
    }
}

/// Ties a resolver, a detector and a sink together.
pub struct Session<D: HandDetector, S: ResolutionSink> {
    resolver: FingertipResolver,
    detector: D,
    sink: S,
    options: SessionOptions,
}

impl<D: HandDetector, S: ResolutionSink> Session<D, S> {
    pub fn new(resolver: FingertipResolver, detector: D, sink: S, options: SessionOptions) -> Self {
        Self {
            resolver,
            detector,
            sink,
            options,
        }
    }

    /// Converts detector output for a `frame_width` × `frame_height` frame into
    /// camera-space hands, applying the rotation and mirroring options.
    pub fn to_hands(&self, observations: &[HandObservation], frame_width: u32, frame_height: u32) -> Vec<Hand> {
        observations
            .iter()
            .map(|obs| {
                let mut hand = obs.to_camera_space(frame_width, frame_height, &self.options.fingertips);
                if self.options.rotate_180 {
                    hand = hand.rotated_180(frame_width, frame_height);
                }
                if self.options.mirror_handedness {
                    hand = hand.mirrored();
                }
                hand
            })
            .collect()
    }

    /// Resolves detector output for one frame of the given size.
    pub fn process_observations(
        &self,
        observations: &[HandObservation],
        frame_width: u32,
        frame_height: u32,
    ) -> Vec<FingertipResolution> {
        let hands = self.to_hands(observations, frame_width, frame_height);
        self.resolver.resolve_hands(&hands)
    }

    /// Resolves pre-recorded detector output, one entry per frame, and publishes
    /// each frame to the sink. Frames are numbered from 1.
    pub fn replay<I>(&mut self, frames: I, frame_width: u32, frame_height: u32) -> SessionStats
    where
        I: IntoIterator<Item = Vec<HandObservation>>,
    {
        let mut stats = SessionStats::default();
        for (index, observations) in frames.into_iter().enumerate() {
            let sequence = index as u64 + 1;
            let resolutions = self.process_observations(&observations, frame_width, frame_height);
            self.emit(sequence, &resolutions);
            stats.record(&resolutions);
        }
        info!(?stats, "replay finished");
        stats
    }

    /// Runs until `source` stops.
    ///
    /// Frames are sized with the source's negotiated properties. A frame is
    /// processed at most once; when no newer frame is available the loop sleeps
    /// for the configured idle interval.
    pub fn run(&mut self, source: &FrameSource) -> SessionStats {
        let props = source.properties();
        let mut stats = SessionStats::default();
        let mut last_sequence = 0u64;
        info!(width = props.width, height = props.height, "session started");

        while source.state() == SourceState::Running {
            let frame = match source.read() {
                Some(frame) if frame.sequence > last_sequence => frame,
                _ => {
                    thread::sleep(self.options.idle_sleep);
                    continue;
                }
            };
            last_sequence = frame.sequence;

            match self.detector.detect(&frame) {
                Ok(observations) => {
                    let resolutions = self.process_observations(&observations, props.width, props.height);
                    self.emit(frame.sequence, &resolutions);
                    stats.record(&resolutions);
                }
                Err(e) => {
                    warn!(sequence = frame.sequence, "skipping frame: {e}");
                    stats.frames_skipped += 1;
                }
            }
        }

        if let Some(e) = source.last_error() {
            warn!("session ended by capture failure: {e}");
        }
        info!(?stats, "session finished");
        stats
    }

    /// Returns the resolver, e.g. to inspect the layout.
    pub fn resolver(&self) -> &FingertipResolver {
        &self.resolver
    }

    /// Consumes the session and returns its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn emit(&mut self, sequence: u64, resolutions: &[FingertipResolution]) {
        trace!(sequence, count = resolutions.len(), "publishing resolutions");
        if let Err(e) = self.sink.publish(sequence, resolutions) {
            warn!(sequence, "sink rejected resolutions: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyzone_camera::MockCamera;
    use keyzone_core::domain::hand::INDEX_TIP;
    use keyzone_core::{CameraQuad, Handedness, Key, KeyboardLayout, Landmark};
    use mockall::predicate::{always, eq};

    /// 200×100 layout seen 1:1 by a 200×100 camera; two keys side by side
    /// covering the top half.
    fn resolver() -> FingertipResolver {
        let layout = KeyboardLayout::new(
            200.0,
            100.0,
            vec![
                Key::new("A", 0.0, 0.0, 0.5, 0.25),
                Key::new("B", 0.5, 0.0, 0.5, 0.25),
            ],
        )
        .unwrap();
        let quad = CameraQuad::new([[0.0, 0.0], [200.0, 0.0], [200.0, 100.0], [0.0, 100.0]]);
        FingertipResolver::new(layout, quad).unwrap()
    }

    fn options(mirror: bool, rotate: bool) -> SessionOptions {
        SessionOptions {
            mirror_handedness: mirror,
            rotate_180: rotate,
            fingertips: vec![INDEX_TIP],
            idle_sleep: Duration::from_millis(1),
        }
    }

    /// A left hand whose index fingertip sits at image-normalized `(x, y)`.
    fn left_index_at(x: f64, y: f64) -> HandObservation {
        HandObservation {
            handedness: Handedness::Left,
            landmarks: vec![
                Landmark { id: 0, x: 0.5, y: 0.9 },
                Landmark { id: INDEX_TIP, x, y },
            ],
        }
    }

    fn session(mirror: bool, rotate: bool) -> Session<MockHandDetector, MockResolutionSink> {
        Session::new(
            resolver(),
            MockHandDetector::new(),
            MockResolutionSink::new(),
            options(mirror, rotate),
        )
    }

    #[test]
    fn test_process_observations_resolves_tracked_fingertip() {
        // Arrange
        let session = session(false, false);

        // Act: (0.25, 0.25) of a 200×100 frame is pixel (50, 25).
        let results = session.process_observations(&[left_index_at(0.25, 0.25)], 200, 100);

        // Assert
        assert_eq!(results.len(), 1, "only the tracked landmark is resolved");
        assert_eq!(results[0].camera, (50.0, 25.0));
        assert_eq!(results[0].keycode(), Some("A"));
        assert_eq!(results[0].handedness, Handedness::Left);
    }

    #[test]
    fn test_mirror_option_swaps_handedness() {
        let session = session(true, false);

        let results = session.process_observations(&[left_index_at(0.25, 0.25)], 200, 100);

        assert_eq!(results[0].handedness, Handedness::Right);
    }

    #[test]
    fn test_rotate_option_moves_fingertip_to_opposite_key() {
        // Arrange: pixel (50, 25) rotates to (149, 74), which is over B's column.
        let session = session(false, true);

        // Act
        let results = session.process_observations(&[left_index_at(0.25, 0.25)], 200, 100);

        // Assert
        assert_eq!(results[0].camera, (149.0, 74.0));
        assert_eq!(results[0].keycode(), None, "y = 74 is below the key row");

        let results = session.process_observations(&[left_index_at(0.25, 0.75)], 200, 100);
        assert_eq!(results[0].camera, (149.0, 24.0));
        assert_eq!(results[0].keycode(), Some("B"));
    }

    #[test]
    fn test_replay_publishes_every_frame_in_order() {
        // Arrange
        let mut sink = MockResolutionSink::new();
        let mut seq = mockall::Sequence::new();
        sink.expect_publish()
            .with(eq(1), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, r| {
                assert_eq!(r.len(), 1);
                Ok(())
            });
        sink.expect_publish()
            .with(eq(2), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, r| {
                assert!(r.is_empty());
                Ok(())
            });
        let mut session = Session::new(resolver(), MockHandDetector::new(), sink, options(false, false));

        // Act
        let stats = session.replay(vec![vec![left_index_at(0.75, 0.1)], vec![]], 200, 100);

        // Assert
        assert_eq!(stats.frames_processed, 2);
        assert_eq!(stats.key_hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_sink_error_does_not_stop_replay() {
        let mut sink = MockResolutionSink::new();
        sink.expect_publish()
            .times(2)
            .returning(|_, _| Err(SinkError::Io(std::io::Error::other("disk full"))));
        let mut session = Session::new(resolver(), MockHandDetector::new(), sink, options(false, false));

        let stats = session.replay(vec![vec![], vec![]], 200, 100);

        assert_eq!(stats.frames_processed, 2);
    }

    #[test]
    fn test_run_skips_frames_where_detector_fails_and_ends_with_source() {
        // Arrange: the camera delivers 6 frames and then fails, ending the session.
        let camera = MockCamera::new(200, 100).with_frame_interval(Duration::from_millis(5)).failing_after(6);
        let source = FrameSource::new(camera).unwrap();

        let mut detector = MockHandDetector::new();
        let mut calls = 0u32;
        detector.expect_detect().returning(move |_| {
            calls += 1;
            if calls % 2 == 0 {
                Err(DetectError::Failed("model busy".to_string()))
            } else {
                Ok(vec![left_index_at(0.75, 0.25)])
            }
        });

        let mut sink = MockResolutionSink::new();
        sink.expect_publish().returning(|_, resolutions| {
            assert_eq!(resolutions[0].keycode(), Some("B"));
            Ok(())
        });

        let mut session = Session::new(resolver(), detector, sink, options(false, false));
        source.start().unwrap();

        // Act
        let stats = session.run(&source);

        // Assert
        assert_eq!(source.state(), SourceState::Stopped);
        assert!(stats.frames_processed >= 1);
        assert!(stats.frames_processed + stats.frames_skipped <= 6);
        assert_eq!(stats.key_hits, stats.frames_processed);
    }

    #[test]
    fn test_run_returns_immediately_for_source_that_never_started() {
        let source = FrameSource::new(MockCamera::default()).unwrap();
        let mut session = session(false, false);

        let stats = session.run(&source);

        assert_eq!(stats, SessionStats::default());
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_frame() {
        // Arrange
        let session = session(false, false);
        let results = session.process_observations(&[left_index_at(0.75, 0.25)], 200, 100);
        let mut sink = JsonLinesSink::new(Vec::new());

        // Act
        sink.publish(7, &results).unwrap();
        sink.publish(8, &[]).unwrap();

        // Assert
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["sequence"], 7);
        assert_eq!(first["resolutions"][0]["key"]["keycode"], "B");
        assert_eq!(first["resolutions"][0]["handedness"], "Left");
    }

    #[test]
    fn test_logging_sink_accepts_hits_and_misses() {
        let session = session(false, false);
        let mut results = session.process_observations(&[left_index_at(0.75, 0.25)], 200, 100);
        results.extend(session.process_observations(&[left_index_at(0.75, 0.9)], 200, 100));

        assert!(LoggingSink.publish(1, &results).is_ok());
    }
}
