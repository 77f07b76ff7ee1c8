use glam::{Mat4, Vec2, Vec3};
use winit::keyboard::KeyCode;

use crate::{input::InputManager, types::CameraBlock};

const START: Vec3 = Vec3::new(0.0, 0.0, 30.0);
const RESET: Vec3 = Vec3::new(0.0, 0.0, 40.0);
const PITCH_LIMIT: f32 = 89.0;

/// Degrees per second for the arrow keys in orbit mode.
const ORBIT_TURN_RATE: f32 = 68.75;
const ORBIT_ZOOM_RATE: f32 = 5.0;
const MIN_ORBIT_DISTANCE: f32 = 1.0;

/// View matrix from `eye` toward `target`. Falls back to +Z as the up vector
/// when looking straight along Y, and returns `None` when the two points
/// coincide.
pub fn look_at(eye: Vec3, target: Vec3) -> Option<Mat4> {
    let forward = (target - eye).try_normalize()?;
    let up = if forward.cross(Vec3::Y).length_squared() < 1e-8 {
        Vec3::Z
    } else {
        Vec3::Y
    };

    Some(Mat4::look_at_rh(eye, target, up))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraMode {
    #[default]
    FreeFly,
    Orbit,
}

/// Spherical placement around a target, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orbit {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl Orbit {
    /// Orbit around `target` that puts the eye at `eye`.
    pub fn through(eye: Vec3, target: Vec3) -> Self {
        let offset = eye - target;
        let distance = offset.length();
        let direction = offset.try_normalize().unwrap_or(Vec3::Z);

        Self {
            target,
            distance: distance.max(MIN_ORBIT_DISTANCE),
            yaw: direction.z.atan2(direction.x).to_degrees(),
            pitch: direction
                .y
                .clamp(-1.0, 1.0)
                .asin()
                .to_degrees()
                .clamp(-PITCH_LIMIT, PITCH_LIMIT),
        }
    }

    pub fn eye(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        let offset = Vec3::new(pitch.cos() * yaw.cos(), pitch.sin(), pitch.cos() * yaw.sin());
        self.target + self.distance * offset
    }

    fn turn(&mut self, yaw: f32, pitch: f32) {
        self.yaw += yaw;
        self.pitch = (self.pitch + pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    fn zoom(&mut self, amount: f32) {
        self.distance = (self.distance + amount).max(MIN_ORBIT_DISTANCE);
    }
}

/// Free-fly camera steered by yaw and pitch in degrees. In orbit mode the
/// pose is derived from [`Orbit`] every update, so switching back to
/// free-fly continues from where the orbit left the eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub speed: f32,
    pub sensitivity: f32,
    mode: CameraMode,
    orbit: Orbit,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: START,
            yaw: -90.0,
            pitch: 0.0,
            fov: 60.0,
            near: 0.1,
            far: 10000.0,
            speed: 2.5,
            sensitivity: 0.1,
            mode: CameraMode::FreeFly,
            orbit: Orbit::through(START, Vec3::ZERO),
        }
    }
}

impl Camera {
    pub fn front(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.front().cross(Vec3::Y).normalize()
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front(), Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
    }

    pub fn block(&self, width: u32, height: u32) -> CameraBlock {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        CameraBlock::new(self.view(), self.projection(aspect), self.position)
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn orbit(&self) -> &Orbit {
        &self.orbit
    }

    /// Entering orbit mode keeps the eye where it is and turns it toward the
    /// orbit target.
    pub fn set_mode(&mut self, mode: CameraMode) {
        if mode == self.mode {
            return;
        }

        self.mode = mode;
        if mode == CameraMode::Orbit {
            self.orbit = Orbit::through(self.position, self.orbit.target);
            self.follow_orbit();
        }
    }

    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch = (self.pitch - dy * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn reset(&mut self) {
        self.position = RESET;
        self.yaw = -90.0;
        self.pitch = 0.0;
        self.orbit = Orbit::through(RESET, Vec3::ZERO);
    }

    pub fn update(&mut self, input: &InputManager, dt: f32) {
        if input.key_pressed(KeyCode::KeyF) {
            self.reset();
        }

        let mut speed = self.speed * dt;
        if input.key_held(KeyCode::ShiftLeft) || input.key_held(KeyCode::ShiftRight) {
            speed *= 4.0;
        }

        match self.mode {
            CameraMode::FreeFly => self.fly(input, speed),
            CameraMode::Orbit => self.circle(input, speed, dt),
        }
    }

    fn fly(&mut self, input: &InputManager, speed: f32) {
        let (front, right) = (self.front(), self.right());
        let bindings = [
            (KeyCode::KeyW, front),
            (KeyCode::KeyS, -front),
            (KeyCode::KeyD, right),
            (KeyCode::KeyA, -right),
            (KeyCode::KeyE, Vec3::Y),
            (KeyCode::KeyQ, -Vec3::Y),
        ];

        for (key, direction) in bindings {
            if input.key_held(key) {
                self.position += direction * speed;
            }
        }

        let delta = input.mouse_delta();
        if delta != Vec2::ZERO {
            self.rotate(delta.x, delta.y);
        }
    }

    /// WASD/QE pan the target, arrows and right-drag turn, Z/X zoom.
    fn circle(&mut self, input: &InputManager, speed: f32, dt: f32) {
        let right = self.right();
        let forward = Vec3::Y.cross(right).normalize_or_zero();
        let pan = [
            (KeyCode::KeyW, forward),
            (KeyCode::KeyS, -forward),
            (KeyCode::KeyD, right),
            (KeyCode::KeyA, -right),
            (KeyCode::KeyE, Vec3::Y),
            (KeyCode::KeyQ, -Vec3::Y),
        ];

        for (key, direction) in pan {
            if input.key_held(key) {
                self.orbit.target += direction * speed;
            }
        }

        let turn = ORBIT_TURN_RATE * dt;
        let arrows = [
            (KeyCode::ArrowLeft, -turn, 0.0),
            (KeyCode::ArrowRight, turn, 0.0),
            (KeyCode::ArrowUp, 0.0, turn),
            (KeyCode::ArrowDown, 0.0, -turn),
        ];
        for (key, yaw, pitch) in arrows {
            if input.key_held(key) {
                self.orbit.turn(yaw, pitch);
            }
        }

        if input.key_held(KeyCode::KeyZ) {
            self.orbit.zoom(-ORBIT_ZOOM_RATE * dt);
        }
        if input.key_held(KeyCode::KeyX) {
            self.orbit.zoom(ORBIT_ZOOM_RATE * dt);
        }

        let delta = input.mouse_delta();
        if delta != Vec2::ZERO {
            self.orbit
                .turn(delta.x * self.sensitivity, -delta.y * self.sensitivity);
        }

        self.follow_orbit();
    }

    fn follow_orbit(&mut self) {
        self.position = self.orbit.eye();
        self.yaw = self.orbit.yaw + 180.0;
        self.pitch = -self.orbit.pitch;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn assert_identity(m: Mat4) {
        for (a, b) in m.to_cols_array().iter().zip(Mat4::IDENTITY.to_cols_array()) {
            assert_abs_diff_eq!(*a, b, epsilon = 1e-4);
        }
    }

    fn assert_vec_eq(a: Vec3, b: Vec3, epsilon: f32) {
        for (a, b) in a.to_array().into_iter().zip(b.to_array()) {
            assert_abs_diff_eq!(a, b, epsilon = epsilon);
        }
    }

    #[test]
    fn uploaded_inverses_round_trip() {
        let poses = [
            (Vec3::new(0.0, 0.0, 30.0), -90.0, 0.0),
            (Vec3::new(12.0, -3.0, 7.5), 15.0, 40.0),
            (Vec3::new(-80.0, 20.0, -5.0), 200.0, -89.0),
            (Vec3::new(0.5, 100.0, 0.5), -45.0, 89.0),
        ];

        for (position, yaw, pitch) in poses {
            let camera = Camera {
                position,
                yaw,
                pitch,
                ..Default::default()
            };
            let block = camera.block(1360, 768);

            assert_identity(block.inverse_view() * block.view());
            assert_identity(block.inverse_projection() * block.projection());
            assert_eq!(block.position(), position);
        }
    }

    #[test]
    fn starts_looking_down_negative_z() {
        let front = Camera::default().front();
        assert_abs_diff_eq!(front.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(front.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.rotate(0.0, -10_000.0);
        assert_eq!(camera.pitch, PITCH_LIMIT);
        camera.rotate(0.0, 10_000.0);
        assert_eq!(camera.pitch, -PITCH_LIMIT);
    }

    #[test]
    fn moves_and_resets_from_input() {
        let mut camera = Camera::default();
        let mut input = InputManager::new();

        input.press(KeyCode::KeyW);
        camera.update(&input, 1.0);
        assert_abs_diff_eq!(camera.position.z, 30.0 - 2.5, epsilon = 1e-5);

        input.press(KeyCode::ShiftLeft);
        camera.update(&input, 1.0);
        assert_abs_diff_eq!(camera.position.z, 30.0 - 2.5 - 10.0, epsilon = 1e-5);

        input.step();
        input.release(KeyCode::KeyW);
        input.press(KeyCode::KeyF);
        camera.update(&input, 1.0);
        assert_eq!(camera.position, RESET);
    }

    #[test]
    fn orbit_eye_keeps_its_distance() {
        let mut camera = Camera::default();
        camera.set_mode(CameraMode::Orbit);
        assert_vec_eq(camera.position, START, 1e-4);
        assert_abs_diff_eq!(camera.orbit().distance, 30.0, epsilon = 1e-5);

        let mut input = InputManager::new();
        input.set_looking(true);
        input.press(KeyCode::ArrowLeft);
        input.press(KeyCode::ArrowUp);

        for frame in 0..50 {
            input.move_mouse(Vec2::new(13.0, -7.0));
            camera.update(&input, 1.0 / 30.0);
            input.step();

            let distance = (camera.position - camera.orbit().target).length();
            assert_abs_diff_eq!(distance, 30.0, epsilon = 1e-3);
            assert!(camera.orbit().pitch.abs() <= PITCH_LIMIT, "frame {frame}");

            // the view keeps pointing at the target
            let toward = (camera.orbit().target - camera.position).normalize();
            assert_vec_eq(camera.front(), toward, 1e-4);
        }
    }

    #[test]
    fn orbit_zooms_and_pans_the_target() {
        let mut camera = Camera::default();
        camera.set_mode(CameraMode::Orbit);
        let mut input = InputManager::new();

        input.press(KeyCode::KeyZ);
        camera.update(&input, 1.0);
        assert_abs_diff_eq!(camera.orbit().distance, 25.0, epsilon = 1e-4);

        // zooming never passes through the target
        camera.update(&input, 100.0);
        assert_eq!(camera.orbit().distance, MIN_ORBIT_DISTANCE);

        input.release(KeyCode::KeyZ);
        input.press(KeyCode::KeyW);
        camera.update(&input, 1.0);
        assert_vec_eq(camera.orbit().target, Vec3::new(0.0, 0.0, -2.5), 1e-4);
        assert_abs_diff_eq!((camera.position - camera.orbit().target).length(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn leaving_orbit_keeps_the_pose() {
        let mut camera = Camera {
            position: Vec3::new(10.0, 5.0, 10.0),
            ..Default::default()
        };
        camera.set_mode(CameraMode::Orbit);
        let orbit_view = camera.view();

        camera.set_mode(CameraMode::FreeFly);
        assert_eq!(camera.view(), orbit_view);
        assert_eq!(camera.mode(), CameraMode::FreeFly);
    }

    #[test]
    fn look_at_handles_the_pole() {
        let eye = Vec3::new(0.0, 40.0, 0.0);
        let view = look_at(eye, Vec3::ZERO).unwrap();

        assert!(view.to_cols_array().iter().all(|v| v.is_finite()));
        assert_identity(view.inverse() * view);
        assert_vec_eq(view.transform_point3(Vec3::ZERO), Vec3::new(0.0, 0.0, -40.0), 1e-4);

        assert!(look_at(Vec3::ONE, Vec3::ONE).is_none());
        assert_eq!(look_at(START, Vec3::ZERO), Some(Mat4::look_at_rh(START, Vec3::ZERO, Vec3::Y)));
    }
}
