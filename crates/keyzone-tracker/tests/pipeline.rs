//! Integration tests for the full keyzone pipeline.
//!
//! Configuration is written to a temporary file, the layout comes from the
//! fixture diagram, and detector output comes from a recording, so the whole
//! chain from TOML to published resolutions runs without hardware.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keyzone_camera::{FrameSource, MockCamera, SourceState};
use keyzone_core::{FingertipResolution, Handedness};
use keyzone_tracker::config::{load_config, AppConfig};
use keyzone_tracker::replay::{load_recording, RecordedDetector};
use keyzone_tracker::session::{ResolutionSink, Session, SessionOptions, SinkError};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

/// Writes a config that looks straight down at the fixture keyboard with a
/// 640×192 camera, 640 px per layout unit.
fn write_config(dir: &tempfile::TempDir) -> AppConfig {
    let path = dir.path().join("keyzone.toml");
    let text = format!(
        r#"
[camera]
width = 640
height = 192

[keyboard]
layout_path = {layout:?}
corners = [[0, 0], [640, 0], [640, 192], [0, 192]]

[session]
rotate_180 = false
"#,
        layout = fixture("keymap.drawio").display().to_string()
    );
    std::fs::write(&path, text).unwrap();
    load_config(&path).expect("config loads")
}

/// Collects everything published, shared with the test body.
#[derive(Clone, Default)]
struct CollectingSink {
    frames: Arc<Mutex<Vec<(u64, Vec<FingertipResolution>)>>>,
}

impl ResolutionSink for CollectingSink {
    fn publish(&mut self, sequence: u64, resolutions: &[FingertipResolution]) -> Result<(), SinkError> {
        self.frames.lock().unwrap().push((sequence, resolutions.to_vec()));
        Ok(())
    }
}

fn summary(resolutions: &[FingertipResolution]) -> Vec<(Handedness, &str, Option<&str>)> {
    resolutions
        .iter()
        .map(|r| (r.handedness, r.finger_name(), r.keycode()))
        .collect()
}

#[test]
fn test_replay_of_recording_resolves_expected_keys() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_config(&dir);
    let resolver = cfg.keyboard.build_resolver().expect("resolver builds");
    let frames = load_recording(fixture("session.jsonl")).unwrap();
    let sink = CollectingSink::default();
    let mut session = Session::new(
        resolver,
        RecordedDetector::default(),
        sink.clone(),
        SessionOptions::from(&cfg.session),
    );

    // Act
    let stats = session.replay(frames, cfg.camera.width, cfg.camera.height);

    // Assert
    assert_eq!(stats.frames_processed, 3);
    assert_eq!((stats.key_hits, stats.misses), (2, 1));

    let published = sink.frames.lock().unwrap();
    let sequences: Vec<u64> = published.iter().map(|(s, _)| *s).collect();
    assert_eq!(sequences, [1, 2, 3]);

    // Tracked order is thumb first; the detector's Left is mirrored to Right.
    assert_eq!(
        summary(&published[0].1),
        [
            (Handedness::Right, "Thumb", Some("Space")),
            (Handedness::Right, "Index", Some("Q")),
        ]
    );
    assert!(published[1].1.is_empty());
    assert_eq!(summary(&published[2].1), [(Handedness::Left, "Index", None)]);
}

#[test]
fn test_live_session_resolves_recorded_detections_until_camera_fails() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_config(&dir);
    let resolver = cfg.keyboard.build_resolver().unwrap();
    let detector = RecordedDetector::new(load_recording(fixture("session.jsonl")).unwrap());
    let sink = CollectingSink::default();
    let mut session = Session::new(resolver, detector, sink.clone(), SessionOptions::from(&cfg.session));

    let camera = MockCamera::new(cfg.camera.width, cfg.camera.height)
        .with_frame_interval(Duration::from_millis(5))
        .failing_after(20);
    let handle = camera.handle();
    let source = FrameSource::new(camera).unwrap();
    source.start().unwrap();

    // Act
    let stats = session.run(&source);

    // Assert
    assert_eq!(source.state(), SourceState::Stopped);
    assert!(source.last_error().is_some());
    source.stop().expect("joining a failed source succeeds");
    assert_eq!(handle.releases(), 1);
    assert!(stats.frames_processed >= 1);

    let published = sink.frames.lock().unwrap();
    assert_eq!(
        summary(&published[0].1),
        [
            (Handedness::Right, "Thumb", Some("Space")),
            (Handedness::Right, "Index", Some("Q")),
        ]
    );
    let sequences: Vec<u64> = published.iter().map(|(s, _)| *s).collect();
    assert!(
        sequences.windows(2).all(|w| w[0] < w[1]),
        "each camera frame is processed at most once: {sequences:?}"
    );
}

#[test]
fn test_live_session_ends_when_source_is_stopped_externally() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_config(&dir);
    let resolver = cfg.keyboard.build_resolver().unwrap();
    let mut session = Session::new(
        resolver,
        RecordedDetector::default(),
        CollectingSink::default(),
        SessionOptions::from(&cfg.session),
    );
    let source = Arc::new(FrameSource::new(MockCamera::new(640, 192)).unwrap());
    source.start().unwrap();
    let stopper = {
        let source = Arc::clone(&source);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            source.stop()
        })
    };

    // Act
    let stats = session.run(&source);

    // Assert
    assert!(stopper.join().unwrap().is_ok());
    assert!(source.last_error().is_none());
    assert_eq!(stats.frames_skipped, 0);
    assert_eq!(stats.key_hits, 0, "an empty recording reports no hands");
}
