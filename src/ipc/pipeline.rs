use anyhow::Result;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::actions::{ModelHandle, SharedBoard, StatusBoard};
use crate::config::Profile;
use crate::feed::{FeedStream, JsonLandmarkDecoder};
use crate::gestures::is_idle;
use crate::input::PointerDevices;
use crate::pointer::apply_pointer;
use crate::scene::Scene;
use crate::session::{FrameHost, TickOutcome, TrackingSession};

type Session = TrackingSession<FeedStream, JsonLandmarkDecoder, SharedBoard>;

pub enum PipelineMsg {
    Camera(bool, Sender<Result<(), String>>),
    Model(String, Sender<Result<bool, String>>),
    Reset,
    Spin(Option<bool>, Sender<bool>),
    Profile(Profile),
    Shutdown,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub tracking: bool,
    pub feed: String,
    pub ui: StatusBoard,
    pub model: String,
    pub camera_z: f32,
    pub rotation: [f32; 3],
    pub auto_rotate: bool,
    pub pointer_devices: usize,
    pub last_error: Option<String>,
}

pub struct Pipeline {
    tx: Sender<PipelineMsg>,
    snapshot: Arc<Mutex<StatusSnapshot>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Pipeline {
    pub fn start(profile: Profile) -> Result<Self> {
        let scene = Scene::new(
            &profile.scene.initial_model,
            profile.thresholds.zoom_min,
            profile.thresholds.zoom_max,
        )?;
        let (tx, rx) = channel();
        let snapshot = Arc::new(Mutex::new(StatusSnapshot::default()));
        let shared = snapshot.clone();
        let handle = thread::Builder::new()
            .name("handctl-frames".to_string())
            .spawn(move || {
                let mut host = PipelineHost::new(profile, scene, rx, shared);
                host.run();
            })?;
        Ok(Self {
            tx,
            snapshot,
            thread: Some(handle),
        })
    }

    pub fn sender(&self) -> Sender<PipelineMsg> {
        self.tx.clone()
    }

    pub fn update_profile(&self, profile: Profile) {
        let _ = self.tx.send(PipelineMsg::Profile(profile));
    }

    pub fn status_handle(&self) -> Arc<Mutex<StatusSnapshot>> {
        self.snapshot.clone()
    }

    pub fn stop(&mut self) {
        let _ = self.tx.send(PipelineMsg::Shutdown);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("frame loop panicked");
            }
        }
    }
}

struct PipelineHost {
    profile: Profile,
    scene: Scene,
    board: SharedBoard,
    pointers: PointerDevices,
    rx: Receiver<PipelineMsg>,
    snapshot: Arc<Mutex<StatusSnapshot>>,
    camera_wanted: bool,
    camera_reply: Option<Sender<Result<(), String>>>,
    tracking: bool,
    last_error: Option<String>,
    pending_profile: Option<Profile>,
    shutdown: bool,
    next_frame: Instant,
}

impl PipelineHost {
    fn new(
        profile: Profile,
        mut scene: Scene,
        rx: Receiver<PipelineMsg>,
        snapshot: Arc<Mutex<StatusSnapshot>>,
    ) -> Self {
        scene.set_auto_rotate(profile.scene.auto_rotate);
        let pointers = if profile.pointer.enabled {
            PointerDevices::open_all()
        } else {
            PointerDevices::none()
        };
        Self {
            camera_wanted: profile.session.autostart,
            profile,
            scene,
            board: SharedBoard::default(),
            pointers,
            rx,
            snapshot,
            camera_reply: None,
            tracking: false,
            last_error: None,
            pending_profile: None,
            shutdown: false,
            next_frame: Instant::now(),
        }
    }

    fn new_session(&self) -> Session {
        TrackingSession::new(
            JsonLandmarkDecoder::new(self.profile.session.layout.clone()),
            self.board.clone(),
            &self.profile.thresholds,
        )
    }

    fn run(&mut self) {
        let mut session = self.new_session();
        info!("frame loop: started (model '{}')", self.scene.current_model().name);

        while !self.shutdown {
            if let Some(profile) = self.pending_profile.take() {
                self.apply_profile(profile);
                session = self.new_session();
            }

            if self.camera_wanted && !session.is_running() {
                self.start_tracking(&mut session);
            }

            if session.is_running() {
                self.tracking = true;
                session.run(self);
                self.tracking = false;
                self.publish();
            } else {
                self.frame();
            }
        }
        session.stop();
        info!("frame loop: stopped");
    }

    fn start_tracking(&mut self, session: &mut Session) {
        let feed = self.profile.session.feed_path();
        let result = session
            .start(FeedStream::follow(&feed))
            .map_err(|e| e.to_string());
        match &result {
            Ok(()) => {
                info!("camera on: following {}", feed.display());
                self.last_error = None;
            }
            Err(e) => {
                self.last_error = Some(e.clone());
                self.camera_wanted = false;
            }
        }
        if let Some(reply) = self.camera_reply.take() {
            let _ = reply.send(result);
        }
        self.publish();
    }

    fn apply_profile(&mut self, profile: Profile) {
        let th = &profile.thresholds;
        self.scene.set_zoom_range(th.zoom_min, th.zoom_max);
        self.scene.set_auto_rotate(profile.scene.auto_rotate);
        if profile.pointer.enabled != self.profile.pointer.enabled {
            self.pointers = if profile.pointer.enabled {
                PointerDevices::open_all()
            } else {
                PointerDevices::none()
            };
        }
        info!("frame loop: profile '{}' applied", profile.meta.name.as_deref().unwrap_or("?"));
        self.profile = profile;
    }

    /// One host frame: pace, animate, pointer input, control messages.
    fn frame(&mut self) {
        let now = Instant::now();
        if self.next_frame > now {
            thread::sleep(self.next_frame - now);
        }
        let interval = Duration::from_millis(self.profile.session.frame_interval_ms);
        self.next_frame = self.next_frame.max(now) + interval;

        self.scene.advance_frame();

        for input in self.pointers.poll() {
            let (camera, model) = self.scene.handles();
            apply_pointer(
                &input,
                &self.profile.pointer,
                &self.profile.thresholds,
                camera,
                model.map(|m| m as &mut dyn ModelHandle),
            );
        }

        self.drain_messages();
        self.publish();
    }

    fn drain_messages(&mut self) {
        loop {
            let msg = match self.rx.try_recv() {
                Ok(msg) => msg,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.shutdown = true;
                    break;
                }
            };
            match msg {
                PipelineMsg::Camera(true, reply) => {
                    if self.tracking {
                        let _ = reply.send(Ok(()));
                    } else {
                        self.camera_wanted = true;
                        self.camera_reply = Some(reply);
                    }
                }
                PipelineMsg::Camera(false, reply) => {
                    self.camera_wanted = false;
                    let _ = reply.send(Ok(()));
                }
                PipelineMsg::Model(name, reply) => {
                    let r = self.scene.switch_model(&name).map_err(|e| e.to_string());
                    if let Ok(true) = r {
                        info!("model: switched to '{name}'");
                    }
                    let _ = reply.send(r);
                }
                PipelineMsg::Reset => self.scene.reset_view(),
                PipelineMsg::Spin(state, reply) => {
                    let on = state.unwrap_or(!self.scene.auto_rotate());
                    self.scene.set_auto_rotate(on);
                    let _ = reply.send(on);
                }
                PipelineMsg::Profile(profile) => self.pending_profile = Some(profile),
                PipelineMsg::Shutdown => self.shutdown = true,
            }
        }
    }

    fn publish(&self) {
        let model = self.scene.current_model();
        let snap = StatusSnapshot {
            tracking: self.tracking,
            feed: self.profile.session.feed_path().display().to_string(),
            ui: self.board.snapshot(),
            model: model.name.to_string(),
            camera_z: self.scene.camera().position[2],
            rotation: model.rotation,
            auto_rotate: self.scene.auto_rotate(),
            pointer_devices: self.pointers.len(),
            last_error: self.last_error.clone(),
        };
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = snap;
    }
}

impl FrameHost for PipelineHost {
    fn wait_for_frame(&mut self) -> bool {
        self.frame();
        self.camera_wanted && !self.shutdown && self.pending_profile.is_none()
    }

    fn scene(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn on_tick(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Stopped => {
                warn!("camera feed ended; pointer control only");
                self.last_error = Some("landmark feed ended".to_string());
                self.camera_wanted = false;
            }
            TickOutcome::Processed(events) if !is_idle(events) => {
                debug!("frame loop: {} event(s)", events.len());
            }
            _ => {}
        }
    }
}
