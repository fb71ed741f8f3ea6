//! Tracking session lifecycle and the per-frame tick loop.

use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;

use crate::actions::{
    CameraHandle, ControlMapper, ModelHandle, TrackingStatus, UiAffordances,
};
use crate::classifier;
use crate::config::Thresholds;
use crate::gestures::{GestureEvent, GestureStateMachine, TrackingState};
use crate::landmarks::{DetectorError, LandmarkSource};
use crate::scene::Scene;

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub seq: u64,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FramePoll {
    Ready(Frame),
    /// Nothing new since the last tick.
    Pending,
    /// The stream is gone (device unplugged, feed finished).
    Ended,
}

pub trait MediaStream {
    fn open(&mut self) -> Result<(), StreamFailure>;
    fn poll_frame(&mut self) -> FramePoll;
    fn release(&mut self);
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    #[error("camera access denied for {0}; grant read permission and try again")]
    PermissionDenied(String),
    #[error("no camera at {0}; start the landmark detector or check session.feed")]
    NoDevice(String),
    #[error("camera {0} is busy in another application; close it and try again")]
    DeviceBusy(String),
    #[error("failed to open {path}: {reason}")]
    Io { path: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackingError {
    #[error("stream unavailable: {0}")]
    StreamUnavailable(#[from] StreamFailure),
    #[error("landmark detector failed to load: {0}")]
    ModelLoadFailed(#[from] DetectorError),
}

/// Cancellation flag for one run of a session.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Inactive,
    /// The stream had no new frame; state untouched.
    NoFrame,
    Processed(Vec<GestureEvent>),
    /// The tick ended the session (stop requested or stream ended).
    Stopped,
}

pub trait FrameHost {
    /// Blocks until the next frame is due. Returns `false` when the host is going away.
    fn wait_for_frame(&mut self) -> bool;
    fn scene(&mut self) -> &mut Scene;
    fn on_tick(&mut self, _outcome: &TickOutcome) {}
}

struct Active<S> {
    stream: S,
    state: TrackingState,
}

pub struct TrackingSession<S: MediaStream, D: LandmarkSource, U: UiAffordances> {
    detector: D,
    detector_ready: bool,
    ui: U,
    machine: GestureStateMachine,
    mapper: ControlMapper,
    active: Option<Active<S>>,
    cancel: StopHandle,
}

impl<S: MediaStream, D: LandmarkSource, U: UiAffordances> TrackingSession<S, D, U> {
    pub fn new(detector: D, mut ui: U, th: &Thresholds) -> Self {
        let mut mapper = ControlMapper::new(th);
        mapper.set_status(TrackingStatus::CameraOff, &mut ui);
        Self {
            detector,
            detector_ready: false,
            ui,
            machine: GestureStateMachine::new(th),
            mapper,
            active: None,
            cancel: StopHandle::default(),
        }
    }

    /// Replaces any stream already running. On failure nothing is left running.
    pub fn start(&mut self, mut stream: S) -> Result<(), TrackingError> {
        if self.active.is_some() {
            info!("session: restarting on a new stream");
            self.stop();
        }

        if !self.detector_ready {
            if let Err(e) = self.detector.load() {
                warn!("session: landmark detector failed to load: {e}; pointer control only");
                return Err(e.into());
            }
            self.detector_ready = true;
        }

        if let Err(e) = stream.open() {
            warn!("session: {e}; pointer control only");
            self.mapper.reset(TrackingStatus::CameraOff, &mut self.ui);
            return Err(e.into());
        }

        // handles from an earlier run must not cancel this one
        self.cancel = StopHandle::default();
        self.active = Some(Active {
            stream,
            state: TrackingState::new(),
        });
        self.mapper.reset(TrackingStatus::HandOutOfView, &mut self.ui);
        info!("session: tracking started");
        Ok(())
    }

    /// Idempotent; releases the stream and discards tracking state.
    pub fn stop(&mut self) {
        self.cancel.stop();
        if let Some(mut active) = self.active.take() {
            active.stream.release();
            self.mapper.reset(TrackingStatus::CameraOff, &mut self.ui);
            info!("session: tracking stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some() && !self.cancel.is_stopped()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> Option<&TrackingState> {
        self.active.as_ref().map(|a| &a.state)
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    pub fn set_thresholds(&mut self, th: &Thresholds) {
        self.machine.set_thresholds(th);
        self.mapper.set_thresholds(th);
    }

    pub fn tick(
        &mut self,
        camera: &mut dyn CameraHandle,
        model: Option<&mut dyn ModelHandle>,
    ) -> TickOutcome {
        self.tick_at(camera, model, Instant::now())
    }

    pub fn tick_at(
        &mut self,
        camera: &mut dyn CameraHandle,
        model: Option<&mut dyn ModelHandle>,
        now: Instant,
    ) -> TickOutcome {
        if self.active.is_none() {
            return TickOutcome::Inactive;
        }
        if self.cancel.is_stopped() {
            self.stop();
            return TickOutcome::Stopped;
        }

        self.mapper.expire_pulses(now, &mut self.ui);

        let poll = match self.active.as_mut() {
            Some(active) => active.stream.poll_frame(),
            None => return TickOutcome::Inactive,
        };
        let frame = match poll {
            FramePoll::Ready(frame) => frame,
            FramePoll::Pending => return TickOutcome::NoFrame,
            FramePoll::Ended => {
                info!("session: stream ended");
                self.stop();
                return TickOutcome::Stopped;
            }
        };

        let landmarks = self.detector.estimate(&frame);
        if self.cancel.is_stopped() {
            debug!("session: discarding result for frame {} after stop", frame.seq);
            self.stop();
            return TickOutcome::Stopped;
        }

        let features = classifier::classify(landmarks.as_ref());
        let Some(active) = self.active.as_mut() else {
            return TickOutcome::Inactive;
        };
        let events = self.machine.update(features.as_ref(), &mut active.state);
        debug!("tick {}: {:?}", frame.seq, events);

        self.mapper.apply_at(&events, camera, model, &mut self.ui, now);
        TickOutcome::Processed(events)
    }

    /// The session is stopped on return.
    pub fn run<H: FrameHost>(&mut self, host: &mut H) {
        while self.is_running() {
            if !host.wait_for_frame() {
                break;
            }
            // checked before every dispatch
            if self.cancel.is_stopped() {
                break;
            }
            let outcome = {
                let (camera, model) = host.scene().handles();
                self.tick(camera, model.map(|m| m as &mut dyn ModelHandle))
            };
            host.on_tick(&outcome);
        }
        self.stop();
    }
}
