//! Background camera capture with a single latest-frame slot.
//!
//! The capture thread (`keyzone-capture`) reads the device in a loop and swaps
//! each new frame into a one-element slot, discarding whatever the consumer had
//! not picked up yet. The consumer never waits on camera I/O: [`FrameSource::read`]
//! only clones an `Arc` under a short lock.
//!
//! ```text
//!   device.read_frame() ──▶ Arc<Frame> ──swap──▶ [slot] ◀──clone── read()
//!        capture thread                                      session thread
//! ```
//!
//! The capture thread owns the device for its whole life and releases it after
//! leaving the loop, so a release can never race with a read in flight.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::device::{CameraDevice, CameraProperties, CaptureError, Frame};

/// How long [`FrameSource::stop`] waits for the capture thread by default.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll interval while waiting for the capture thread to exit.
const JOIN_POLL: Duration = Duration::from_millis(2);

/// Lifecycle state reported by [`FrameSource::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Constructed, not started.
    Idle,
    /// The capture thread is delivering frames.
    Running,
    /// Stopped by request or by a capture failure. Terminal.
    Stopped,
}

/// Single-element handoff between the capture thread and the consumer.
#[derive(Debug, Default)]
struct FrameSlot {
    latest: Mutex<Option<Arc<Frame>>>,
}

impl FrameSlot {
    fn publish(&self, frame: Arc<Frame>) {
        *lock(&self.latest) = Some(frame);
    }

    fn latest(&self) -> Option<Arc<Frame>> {
        lock(&self.latest).clone()
    }

    fn clear(&self) {
        *lock(&self.latest) = None;
    }
}

/// State shared with the capture thread.
#[derive(Debug, Default)]
struct Shared {
    slot: FrameSlot,
    running: AtomicBool,
    frames_captured: AtomicU64,
    last_error: Mutex<Option<CaptureError>>,
}

enum Lifecycle {
    Idle(Box<dyn CameraDevice>),
    Running(JoinHandle<()>),
    Stopped,
}

/// Reads a [`CameraDevice`] on a background thread and exposes the latest frame.
///
/// All methods take `&self`, so one source can be shared between the consumer
/// and whoever decides to stop it.
pub struct FrameSource {
    shared: Arc<Shared>,
    properties: CameraProperties,
    stop_timeout: Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl FrameSource {
    /// Wraps an opened device. Capture does not begin until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::InvalidProperties`] if the device reports a zero
    /// frame size. The device is released in that case.
    pub fn new(device: impl CameraDevice) -> Result<Self, CaptureError> {
        let mut device: Box<dyn CameraDevice> = Box::new(device);
        let properties = device.properties();
        if let Err(e) = properties.validate() {
            device.release();
            return Err(e);
        }
        info!(
            width = properties.width,
            height = properties.height,
            fps = properties.fps,
            "frame source ready"
        );
        Ok(Self {
            shared: Arc::new(Shared::default()),
            properties,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            lifecycle: Mutex::new(Lifecycle::Idle(device)),
        })
    }

    /// Sets how long [`stop`](Self::stop) waits for the capture thread.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Spawns the capture thread.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::AlreadyStarted`] if capture is running.
    /// - [`CaptureError::AlreadyStopped`] if the source has stopped, for any reason.
    /// - [`CaptureError::ThreadSpawn`] if the OS refuses the thread; the
    ///   device is dropped and the source is stopped.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut lifecycle = lock(&self.lifecycle);
        let device = match mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle(device) => device,
            running @ Lifecycle::Running(_) => {
                let failed = !self.shared.running.load(Ordering::Acquire);
                *lifecycle = running;
                return Err(if failed {
                    CaptureError::AlreadyStopped
                } else {
                    CaptureError::AlreadyStarted
                });
            }
            Lifecycle::Stopped => return Err(CaptureError::AlreadyStopped),
        };

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("keyzone-capture".to_string())
            .spawn(move || capture_loop(device, &shared));

        match spawned {
            Ok(handle) => {
                *lifecycle = Lifecycle::Running(handle);
                info!("frame source started");
                Ok(())
            }
            Err(e) => {
                // The closure, and the device with it, was dropped by the failed spawn.
                self.shared.running.store(false, Ordering::Release);
                error!("failed to spawn capture thread: {e}");
                Err(CaptureError::ThreadSpawn(e.to_string()))
            }
        }
    }

    /// Stops capture and waits for the device to be released.
    ///
    /// A no-op when already stopped. A source that was never started releases
    /// its device immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::StopTimeout`] if the capture thread is still blocked
    /// in a read after the stop timeout. The source is stopped regardless and the
    /// thread releases the device once that read returns.
    pub fn stop(&self) -> Result<(), CaptureError> {
        // The lock is released before waiting so `state()` stays responsive.
        let previous = {
            let mut lifecycle = lock(&self.lifecycle);
            self.shared.running.store(false, Ordering::Release);
            mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };

        match previous {
            Lifecycle::Idle(mut device) => {
                device.release();
                info!("frame source stopped before start; camera released");
                Ok(())
            }
            Lifecycle::Running(handle) => {
                let deadline = Instant::now() + self.stop_timeout;
                while !handle.is_finished() {
                    if Instant::now() >= deadline {
                        warn!(
                            timeout_ms = self.stop_timeout.as_millis() as u64,
                            "capture thread did not stop in time; detaching"
                        );
                        return Err(CaptureError::StopTimeout(self.stop_timeout.as_millis() as u64));
                    }
                    thread::sleep(JOIN_POLL);
                }
                if handle.join().is_err() {
                    error!("capture thread panicked");
                }
                info!(frames = self.frames_captured(), "frame source stopped");
                Ok(())
            }
            Lifecycle::Stopped => Ok(()),
        }
    }

    /// Returns the most recent frame, or `None` if none is available yet or
    /// capture has failed.
    pub fn read(&self) -> Option<Arc<Frame>> {
        self.shared.slot.latest()
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SourceState {
        match *lock(&self.lifecycle) {
            Lifecycle::Idle(_) => SourceState::Idle,
            Lifecycle::Running(_) if self.shared.running.load(Ordering::Acquire) => {
                SourceState::Running
            }
            _ => SourceState::Stopped,
        }
    }

    /// Returns the negotiated properties of the wrapped device.
    pub fn properties(&self) -> CameraProperties {
        self.properties
    }

    /// Returns the error that ended capture, if it ended by failure.
    pub fn last_error(&self) -> Option<CaptureError> {
        lock(&self.shared.last_error).clone()
    }

    /// Returns the number of frames committed to the slot so far.
    pub fn frames_captured(&self) -> u64 {
        self.shared.frames_captured.load(Ordering::Acquire)
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("frame source dropped without a clean stop: {e}");
        }
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("properties", &self.properties)
            .field("state", &self.state())
            .field("frames_captured", &self.frames_captured())
            .finish()
    }
}

/// The loop executed on the capture thread.
fn capture_loop(mut device: Box<dyn CameraDevice>, shared: &Shared) {
    debug!("capture loop running");
    let mut sequence = 0u64;

    while shared.running.load(Ordering::Acquire) {
        match device.read_frame() {
            Ok(image) => {
                sequence += 1;
                shared.slot.publish(Arc::new(Frame::new(sequence, image)));
                shared.frames_captured.fetch_add(1, Ordering::AcqRel);
            }
            Err(e) => {
                error!("camera read failed after {sequence} frames; stopping capture: {e}");
                *lock(&shared.last_error) = Some(e);
                shared.slot.clear();
                shared.running.store(false, Ordering::Release);
                break;
            }
        }
    }

    device.release();
    info!(frames = sequence, "capture loop exited; camera released");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
