use std::collections::HashSet;

use glam::Vec2;
use winit::{
    event::{DeviceEvent, ElementState, MouseButton, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::camera::CameraMode;

/// Keyboard and mouse state for the current frame.
#[derive(Debug, Default)]
pub struct InputManager {
    held: HashSet<KeyCode>,
    pressed: HashSet<KeyCode>,
    looking: bool,
    mouse_delta: Vec2,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };

                match event.state {
                    ElementState::Pressed if !event.repeat => self.press(key),
                    ElementState::Pressed => (),
                    ElementState::Released => self.release(key),
                }
            },
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                self.looking = state.is_pressed();
            },
            WindowEvent::Focused(false) => {
                self.held.clear();
                self.looking = false;
            },
            _ => (),
        }
    }

    pub fn process_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.move_mouse(Vec2::new(delta.0 as f32, delta.1 as f32));
        }
    }

    pub fn press(&mut self, key: KeyCode) {
        if self.held.insert(key) {
            self.pressed.insert(key);
        }
    }

    pub fn release(&mut self, key: KeyCode) {
        self.held.remove(&key);
    }

    /// Mouse motion only steers the camera while the right button is down.
    pub fn move_mouse(&mut self, delta: Vec2) {
        if self.looking {
            self.mouse_delta += delta;
        }
    }

    pub fn set_looking(&mut self, looking: bool) {
        self.looking = looking;
    }

    /// Clears per-frame edges. Call once at the start of every frame.
    pub fn step(&mut self) {
        self.pressed.clear();
        self.mouse_delta = Vec2::ZERO;
    }

    pub fn key_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }
}

/// Viewer switches flipped from the keyboard: G grid, H debug text,
/// O orbit camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggles {
    pub grid: bool,
    pub debug_text: bool,
    pub orbit: bool,
}

impl Toggles {
    pub fn update(&mut self, input: &InputManager) {
        if input.key_pressed(KeyCode::KeyG) {
            self.grid = !self.grid;
        }
        if input.key_pressed(KeyCode::KeyH) {
            self.debug_text = !self.debug_text;
        }
        if input.key_pressed(KeyCode::KeyO) {
            self.orbit = !self.orbit;
        }
    }

    pub fn camera_mode(&self) -> CameraMode {
        if self.orbit {
            CameraMode::Orbit
        } else {
            CameraMode::FreeFly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_is_an_edge_hold_is_a_level() {
        let mut input = InputManager::new();
        input.press(KeyCode::KeyW);

        assert!(input.key_held(KeyCode::KeyW));
        assert!(input.key_pressed(KeyCode::KeyW));

        input.step();
        input.press(KeyCode::KeyW);
        assert!(input.key_held(KeyCode::KeyW));
        assert!(!input.key_pressed(KeyCode::KeyW));

        input.release(KeyCode::KeyW);
        assert!(!input.key_held(KeyCode::KeyW));
    }

    #[test]
    fn mouse_only_counts_while_looking() {
        let mut input = InputManager::new();
        input.move_mouse(Vec2::new(4.0, 2.0));
        assert_eq!(input.mouse_delta(), Vec2::ZERO);

        input.set_looking(true);
        input.move_mouse(Vec2::new(4.0, 2.0));
        input.move_mouse(Vec2::new(1.0, -1.0));
        assert_eq!(input.mouse_delta(), Vec2::new(5.0, 1.0));

        input.step();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }

    #[test]
    fn toggles_flip_once_per_press() {
        let mut toggles = Toggles {
            grid: false,
            debug_text: true,
            orbit: false,
        };
        let mut input = InputManager::new();

        input.press(KeyCode::KeyG);
        toggles.update(&input);
        assert!(toggles.grid);

        // held across frames: no second flip
        input.step();
        toggles.update(&input);
        assert!(toggles.grid);

        input.press(KeyCode::KeyH);
        toggles.update(&input);
        assert!(!toggles.debug_text);
    }

    #[test]
    fn orbit_toggle_picks_the_camera_mode() {
        let mut toggles = Toggles {
            grid: false,
            debug_text: false,
            orbit: false,
        };
        let mut input = InputManager::new();
        assert_eq!(toggles.camera_mode(), CameraMode::FreeFly);

        input.press(KeyCode::KeyO);
        toggles.update(&input);
        assert_eq!(toggles.camera_mode(), CameraMode::Orbit);

        input.step();
        input.release(KeyCode::KeyO);
        input.press(KeyCode::KeyO);
        toggles.update(&input);
        assert_eq!(toggles.camera_mode(), CameraMode::FreeFly);
    }
}
