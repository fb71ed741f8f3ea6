use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::Thresholds;
use crate::gestures::GestureEvent;

pub trait CameraHandle {
    fn position_z(&self) -> f32;
    fn set_position_z(&mut self, z: f32);
}

pub trait ModelHandle {
    /// `(x, y)` Euler rotation in radians.
    fn rotation(&self) -> (f32, f32);
    fn set_rotation(&mut self, x: f32, y: f32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Rotate,
    Zoom,
    Select,
}

impl Indicator {
    pub const ALL: [Indicator; 3] = [Indicator::Rotate, Indicator::Zoom, Indicator::Select];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rotate => "rotate",
            Self::Zoom => "zoom",
            Self::Select => "select",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    HandDetected,
    HandOutOfView,
    CameraOff,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HandDetected => "Hand detected",
            Self::HandOutOfView => "Move hand into view",
            Self::CameraOff => "Camera off",
        }
    }
}

pub trait UiAffordances {
    fn set_indicator_active(&mut self, indicator: Indicator, active: bool);
    fn set_status_text(&mut self, text: &str);
}

pub struct ControlMapper {
    th: Thresholds,
    // rotate/zoom clear deadlines
    pulses: HashMap<Indicator, Instant>,
    status: Option<TrackingStatus>,
}

impl ControlMapper {
    pub fn new(th: &Thresholds) -> Self {
        Self {
            th: th.clone(),
            pulses: HashMap::new(),
            status: None,
        }
    }

    pub fn set_thresholds(&mut self, th: &Thresholds) {
        self.th = th.clone();
    }

    pub fn apply(
        &mut self,
        events: &[GestureEvent],
        camera: &mut dyn CameraHandle,
        model: Option<&mut dyn ModelHandle>,
        ui: &mut dyn UiAffordances,
    ) {
        self.apply_at(events, camera, model, ui, Instant::now());
    }

    /// Applies one tick's events in emission order (rotate, zoom, select).
    pub fn apply_at(
        &mut self,
        events: &[GestureEvent],
        camera: &mut dyn CameraHandle,
        mut model: Option<&mut dyn ModelHandle>,
        ui: &mut dyn UiAffordances,
        now: Instant,
    ) {
        self.expire_pulses(now, ui);

        let mut hand_lost = false;
        for event in events {
            match *event {
                GestureEvent::HandLost => {
                    hand_lost = true;
                    self.clear_indicators(ui);
                }
                GestureEvent::Rotate { dx, dy } => {
                    if let Some(m) = model.as_deref_mut() {
                        let (rx, ry) = m.rotation();
                        m.set_rotation(rx + dy * self.th.rotate_gain, ry + dx * self.th.rotate_gain);
                    }
                    self.pulse(Indicator::Rotate, now, ui);
                }
                GestureEvent::ZoomPinchStart => self.pulse(Indicator::Zoom, now, ui),
                GestureEvent::ZoomDelta { amount } => {
                    let z = camera.position_z() + amount * self.th.zoom_gain;
                    camera.set_position_z(z.clamp(self.th.zoom_min, self.th.zoom_max));
                    self.pulse(Indicator::Zoom, now, ui);
                }
                GestureEvent::ZoomPinchEnd | GestureEvent::Idle => {}
                GestureEvent::PointSelectOn => ui.set_indicator_active(Indicator::Select, true),
                GestureEvent::PointSelectOff => ui.set_indicator_active(Indicator::Select, false),
            }
        }

        let status = if hand_lost {
            TrackingStatus::HandOutOfView
        } else {
            TrackingStatus::HandDetected
        };
        self.set_status(status, ui);
    }

    pub fn expire_pulses(&mut self, now: Instant, ui: &mut dyn UiAffordances) {
        let due: Vec<Indicator> = self
            .pulses
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(ind, _)| *ind)
            .collect();
        for ind in due {
            self.pulses.remove(&ind);
            ui.set_indicator_active(ind, false);
        }
    }

    /// Drops all indicator state and shows `status`; used when tracking stops.
    pub fn reset(&mut self, status: TrackingStatus, ui: &mut dyn UiAffordances) {
        self.clear_indicators(ui);
        self.set_status(status, ui);
    }

    pub fn set_status(&mut self, status: TrackingStatus, ui: &mut dyn UiAffordances) {
        if self.status != Some(status) {
            debug!("ui status: {}", status.as_str());
            self.status = Some(status);
            ui.set_status_text(status.as_str());
        }
    }

    // A pulse clears pulse_ms after it was armed; events while it is lit do not extend it.
    fn pulse(&mut self, ind: Indicator, now: Instant, ui: &mut dyn UiAffordances) {
        if !self.pulses.contains_key(&ind) {
            let deadline = now + Duration::from_millis(self.th.pulse_ms);
            self.pulses.insert(ind, deadline);
            ui.set_indicator_active(ind, true);
        }
    }

    fn clear_indicators(&mut self, ui: &mut dyn UiAffordances) {
        self.pulses.clear();
        for ind in Indicator::ALL {
            ui.set_indicator_active(ind, false);
        }
    }
}

// headless UI

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusBoard {
    pub rotate: bool,
    pub zoom: bool,
    pub select: bool,
    pub status_text: String,
}

impl StatusBoard {
    pub fn is_active(&self, indicator: Indicator) -> bool {
        match indicator {
            Indicator::Rotate => self.rotate,
            Indicator::Zoom => self.zoom,
            Indicator::Select => self.select,
        }
    }
}

impl UiAffordances for StatusBoard {
    fn set_indicator_active(&mut self, indicator: Indicator, active: bool) {
        match indicator {
            Indicator::Rotate => self.rotate = active,
            Indicator::Zoom => self.zoom = active,
            Indicator::Select => self.select = active,
        }
    }

    fn set_status_text(&mut self, text: &str) {
        self.status_text = text.to_string();
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedBoard(Arc<Mutex<StatusBoard>>);

impl SharedBoard {
    pub fn snapshot(&self) -> StatusBoard {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl UiAffordances for SharedBoard {
    fn set_indicator_active(&mut self, indicator: Indicator, active: bool) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .set_indicator_active(indicator, active);
    }

    fn set_status_text(&mut self, text: &str) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .set_status_text(text);
    }
}
