use serde::Serialize;
use thiserror::Error;

use crate::actions::{CameraHandle, ModelHandle};

pub struct ModelSpec {
    pub name: &'static str,
    pub title: &'static str,
    /// Axis-aligned bounding size of the model group.
    pub extent: [f32; 3],
}

pub const MODELS: [ModelSpec; 5] = [
    ModelSpec { name: "earth", title: "Earth", extent: [4.0, 2.1, 4.0] },
    ModelSpec { name: "blackhole", title: "Black Hole", extent: [6.0, 1.2, 6.0] },
    ModelSpec { name: "human-body", title: "Human Body", extent: [1.3, 2.3, 0.6] },
    ModelSpec { name: "supernova", title: "Supernova", extent: [7.0, 7.0, 7.0] },
    ModelSpec { name: "galaxy", title: "Milky Way Galaxy", extent: [6.0, 6.0, 0.5] },
];

/// Radians per rendered frame while auto-rotate is on.
pub const AUTO_ROTATE_STEP: f32 = 0.005;
pub const INITIAL_CAMERA_Z: f32 = 5.0;
const VIEW_DISTANCE_FACTOR: f32 = 1.5;

pub fn model_spec(name: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|m| m.name == name)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("unknown model '{0}' (known: earth, blackhole, human-body, supernova, galaxy)")]
    UnknownModel(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Camera {
    pub position: [f32; 3],
}

impl CameraHandle for Camera {
    fn position_z(&self) -> f32 {
        self.position[2]
    }

    fn set_position_z(&mut self, z: f32) {
        self.position[2] = z;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Model {
    pub name: &'static str,
    pub rotation: [f32; 3],
    pub visible: bool,
    #[serde(skip)]
    extent: [f32; 3],
}

impl Model {
    fn view_distance(&self) -> f32 {
        let [x, y, z] = self.extent;
        (x * x + y * y + z * z).sqrt() * VIEW_DISTANCE_FACTOR
    }
}

impl ModelHandle for Model {
    fn rotation(&self) -> (f32, f32) {
        (self.rotation[0], self.rotation[1])
    }

    fn set_rotation(&mut self, x: f32, y: f32) {
        self.rotation[0] = x;
        self.rotation[1] = y;
    }
}

#[derive(Debug, Clone)]
pub struct Scene {
    camera: Camera,
    models: Vec<Model>,
    current: usize,
    auto_rotate: bool,
    zoom_range: (f32, f32),
}

impl Scene {
    pub fn new(initial_model: &str, zoom_min: f32, zoom_max: f32) -> Result<Self, SceneError> {
        let current = MODELS
            .iter()
            .position(|m| m.name == initial_model)
            .ok_or_else(|| SceneError::UnknownModel(initial_model.to_string()))?;
        let models = MODELS
            .iter()
            .enumerate()
            .map(|(i, spec)| Model {
                name: spec.name,
                rotation: [0.0; 3],
                visible: i == current,
                extent: spec.extent,
            })
            .collect();
        Ok(Self {
            camera: Camera {
                position: [0.0, 0.0, INITIAL_CAMERA_Z.clamp(zoom_min, zoom_max)],
            },
            models,
            current,
            auto_rotate: false,
            zoom_range: (zoom_min, zoom_max),
        })
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn current_model(&self) -> &Model {
        &self.models[self.current]
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn handles(&mut self) -> (&mut Camera, Option<&mut Model>) {
        (&mut self.camera, self.models.get_mut(self.current))
    }

    /// Returns `false` when `name` is already the visible model.
    pub fn switch_model(&mut self, name: &str) -> Result<bool, SceneError> {
        let next = self
            .models
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| SceneError::UnknownModel(name.to_string()))?;
        if next == self.current {
            return Ok(false);
        }
        self.models[self.current].visible = false;
        self.models[next].visible = true;
        self.current = next;
        self.reset_view();
        Ok(true)
    }

    /// Backs the camera off to frame the visible model; rotations are untouched.
    pub fn reset_view(&mut self) {
        let (lo, hi) = self.zoom_range;
        let distance = self.models[self.current].view_distance();
        self.camera.position = [0.0, 0.0, distance.clamp(lo, hi)];
    }

    pub fn set_zoom_range(&mut self, zoom_min: f32, zoom_max: f32) {
        self.zoom_range = (zoom_min, zoom_max);
        let z = self.camera.position[2];
        self.camera.position[2] = z.clamp(zoom_min, zoom_max);
    }

    pub fn zoom_range(&self) -> (f32, f32) {
        self.zoom_range
    }

    pub fn auto_rotate(&self) -> bool {
        self.auto_rotate
    }

    pub fn set_auto_rotate(&mut self, on: bool) {
        self.auto_rotate = on;
    }

    pub fn advance_frame(&mut self) {
        if self.auto_rotate {
            self.models[self.current].rotation[1] += AUTO_ROTATE_STEP;
        }
    }
}
