//! Recorded detector output.
//!
//! A recording is a JSON-lines file: each line holds the array of
//! [`HandObservation`]s the detector produced for one frame, e.g.
//!
//! ```text
//! [{"handedness":"Left","landmarks":[{"id":8,"x":0.41,"y":0.22}]}]
//! []
//! ```
//!
//! Blank lines are ignored. Recordings let the resolution pipeline run without a
//! camera or a detection model.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use keyzone_camera::Frame;
use keyzone_core::HandObservation;
use thiserror::Error;

use crate::session::{DetectError, HandDetector};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("cannot open recording {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read recording: {0}")]
    Read(#[from] std::io::Error),
    #[error("line {line}: invalid observation record: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Parses a recording, one frame per non-blank line.
pub fn parse_recording(reader: impl BufRead) -> Result<Vec<Vec<HandObservation>>, ReplayError> {
    let mut frames = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let observations = serde_json::from_str(&line).map_err(|source| ReplayError::Parse {
            line: index + 1,
            source,
        })?;
        frames.push(observations);
    }
    tracing::debug!(frames = frames.len(), "recording parsed");
    Ok(frames)
}

/// Opens and parses the recording at `path`.
pub fn load_recording(path: impl AsRef<Path>) -> Result<Vec<Vec<HandObservation>>, ReplayError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ReplayError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_recording(BufReader::new(file))
}

/// A [`HandDetector`] that plays back recorded observations, one entry per call.
///
/// Once the recording is exhausted every frame reports no hands.
#[derive(Debug, Default)]
pub struct RecordedDetector {
    frames: VecDeque<Vec<HandObservation>>,
}

impl RecordedDetector {
    pub fn new(frames: Vec<Vec<HandObservation>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// Returns how many recorded frames have not been played yet.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl HandDetector for RecordedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<HandObservation>, DetectError> {
        Ok(self.frames.pop_front().unwrap_or_default())
    }
}
