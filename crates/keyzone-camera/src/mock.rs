//! Mock camera for unit testing and offline runs.
//!
//! Produces synthetic frames at a fixed interval and can be scripted to fail
//! after a number of reads or to block inside a read, so the capture pipeline
//! can be exercised without camera hardware.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::device::{CameraDevice, CameraProperties, CaptureError, Image};

/// Poll interval while a read is held by [`MockCameraHandle::block_reads`].
const BLOCK_POLL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    releases: AtomicUsize,
    blocked: AtomicBool,
}

/// Observes and steers a [`MockCamera`] after it has been moved into a frame source.
#[derive(Debug, Clone)]
pub struct MockCameraHandle {
    counters: Arc<Counters>,
}

impl MockCameraHandle {
    /// Returns the number of successful reads so far.
    pub fn reads(&self) -> u64 {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Returns the number of times [`CameraDevice::release`] was called.
    pub fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    /// Makes subsequent reads block until [`unblock_reads`](Self::unblock_reads).
    pub fn block_reads(&self) {
        self.counters.blocked.store(true, Ordering::SeqCst);
    }

    /// Lets blocked reads return.
    pub fn unblock_reads(&self) {
        self.counters.blocked.store(false, Ordering::SeqCst);
    }
}

/// A [`CameraDevice`] producing solid grey frames whose value cycles with the read count.
#[derive(Debug)]
pub struct MockCamera {
    properties: CameraProperties,
    frame_interval: Duration,
    fail_after: Option<u64>,
    counters: Arc<Counters>,
}

impl MockCamera {
    /// Creates a mock delivering `width`×`height` frames roughly every millisecond.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            properties: CameraProperties {
                width,
                height,
                fps: 1000.0,
                focus: None,
            },
            frame_interval: Duration::from_millis(1),
            fail_after: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Sets the delay of each read, emulating the device frame rate.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        if !interval.is_zero() {
            self.properties.fps = 1.0 / interval.as_secs_f64();
        }
        self
    }

    /// Makes the read after `reads` successful reads fail.
    pub fn failing_after(mut self, reads: u64) -> Self {
        self.fail_after = Some(reads);
        self
    }

    /// Returns a handle that stays valid after the camera is moved away.
    pub fn handle(&self) -> MockCameraHandle {
        MockCameraHandle {
            counters: Arc::clone(&self.counters),
        }
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new(64, 48)
    }
}

impl CameraDevice for MockCamera {
    fn properties(&self) -> CameraProperties {
        self.properties
    }

    fn read_frame(&mut self) -> Result<Image, CaptureError> {
        while self.counters.blocked.load(Ordering::SeqCst) {
            thread::sleep(BLOCK_POLL);
        }
        if !self.frame_interval.is_zero() {
            thread::sleep(self.frame_interval);
        }

        let done = self.counters.reads.load(Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| done >= limit) {
            return Err(CaptureError::Read(format!("mock camera failed after {done} frames")));
        }

        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let len = self.properties.width as usize * self.properties.height as usize * 3;
        Ok(Image {
            width: self.properties.width,
            height: self.properties.height,
            data: vec![(done % 256) as u8; len],
        })
    }

    fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}
