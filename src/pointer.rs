use crate::actions::{CameraHandle, ModelHandle};
use crate::config::{PointerSettings, Thresholds};

/// Radians of rotation per pointer pixel at `rotate_speed = 1`.
pub const DRAG_GAIN: f32 = 0.005;
/// Camera distance factor per wheel step at `zoom_speed = 1`.
pub const DOLLY_SCALE: f32 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    Drag { dx: f32, dy: f32 },
    /// Positive steps scroll away from the user (move the camera closer).
    Wheel { steps: i32 },
}

#[derive(Debug, Default)]
pub struct PointerTracker {
    button_down: bool,
    acc_x: i32,
    acc_y: i32,
    wheel: i32,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_button(&mut self, pressed: bool) {
        self.button_down = pressed;
    }

    pub fn on_motion(&mut self, dx: i32, dy: i32) {
        // motion without the button held is hover, not a drag
        if self.button_down {
            self.acc_x += dx;
            self.acc_y += dy;
        }
    }

    pub fn on_wheel(&mut self, steps: i32) {
        self.wheel += steps;
    }

    pub fn on_syn_report(&mut self) -> Vec<PointerInput> {
        let mut out = Vec::new();
        if self.acc_x != 0 || self.acc_y != 0 {
            out.push(PointerInput::Drag {
                dx: self.acc_x as f32,
                dy: self.acc_y as f32,
            });
        }
        if self.wheel != 0 {
            out.push(PointerInput::Wheel { steps: self.wheel });
        }
        self.acc_x = 0;
        self.acc_y = 0;
        self.wheel = 0;
        out
    }
}

pub fn apply_pointer(
    input: &PointerInput,
    settings: &PointerSettings,
    th: &Thresholds,
    camera: &mut dyn CameraHandle,
    model: Option<&mut dyn ModelHandle>,
) {
    match *input {
        PointerInput::Drag { dx, dy } => {
            if let Some(m) = model {
                let gain = DRAG_GAIN * settings.rotate_speed;
                let (rx, ry) = m.rotation();
                m.set_rotation(rx + dy * gain, ry + dx * gain);
            }
        }
        PointerInput::Wheel { steps } => {
            let factor = DOLLY_SCALE.powf(steps as f32 * settings.zoom_speed);
            let z = camera.position_z() * factor;
            camera.set_position_z(z.clamp(th.zoom_min, th.zoom_max));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Scene;

    #[test]
    fn test_hover_is_not_a_drag() {
        let mut t = PointerTracker::new();
        t.on_motion(10, 4);
        assert!(t.on_syn_report().is_empty());
    }

    #[test]
    fn test_drag_and_wheel_coalesce_per_report() {
        let mut t = PointerTracker::new();
        t.on_button(true);
        t.on_motion(3, 0);
        t.on_motion(0, -2);
        t.on_motion(4, 0);
        t.on_wheel(1);
        t.on_wheel(1);
        assert_eq!(
            t.on_syn_report(),
            vec![
                PointerInput::Drag { dx: 7.0, dy: -2.0 },
                PointerInput::Wheel { steps: 2 }
            ]
        );
        assert!(t.on_syn_report().is_empty());
        t.on_button(false);
        t.on_motion(5, 5);
        assert!(t.on_syn_report().is_empty());
    }

    #[test]
    fn test_pointer_moves_scene_within_zoom_range() {
        let th = Thresholds::default();
        let settings = PointerSettings::default();
        let mut scene = Scene::new("earth", th.zoom_min, th.zoom_max).unwrap();

        let (cam, model) = scene.handles();
        apply_pointer(
            &PointerInput::Drag { dx: 100.0, dy: 0.0 },
            &settings,
            &th,
            cam,
            model.map(|m| m as &mut dyn ModelHandle),
        );
        assert!((scene.current_model().rotation[1] - 0.5).abs() < 1e-6);

        let (cam, _) = scene.handles();
        apply_pointer(&PointerInput::Wheel { steps: 1 }, &settings, &th, cam, None);
        assert!((scene.camera().position[2] - 4.75).abs() < 1e-5);

        for _ in 0..200 {
            let (cam, _) = scene.handles();
            apply_pointer(&PointerInput::Wheel { steps: 3 }, &settings, &th, cam, None);
        }
        assert_eq!(scene.camera().position[2], th.zoom_min);

        for _ in 0..200 {
            let (cam, _) = scene.handles();
            apply_pointer(&PointerInput::Wheel { steps: -3 }, &settings, &th, cam, None);
        }
        assert_eq!(scene.camera().position[2], th.zoom_max);
    }
}
