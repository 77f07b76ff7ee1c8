//! Light paths around a Schwarzschild black hole.
//!
//! Two integrators share the [`Geodesic`] trait: the relativistic one
//! integrates the planar null-geodesic equations in `(r, φ, p_r)` with a
//! conserved angular momentum `L`, the Newtonian one treats the photon as a
//! test particle under inverse-square attraction. Both step with RK4 at a
//! fixed affine step, and [`march`] applies the same termination tests to
//! either. Rays that start beyond the escape radius first travel in a
//! straight line onto the escape sphere. `geodesic.wgsl` runs the same
//! integrators on the GPU.

use std::ops::ControlFlow;

use glam::{Mat4, Vec2, Vec3, Vec3Swizzles, Vec4Swizzles};
use serde::{Deserialize, Serialize};

use crate::{
    scene::SceneStore,
    types::{PlanetBlock, TracerBlock, MODEL_NEWTONIAN, MODEL_RELATIVISTIC},
};

/// Radius below which a ray is captured regardless of the horizon size.
pub const MIN_RADIUS: f32 = 1e-6;

pub trait Geodesic {
    /// Advance by `h` units of affine parameter.
    fn step(&mut self, h: f32);

    fn position(&self) -> Vec3;

    /// Unit tangent of the path.
    fn direction(&self) -> Vec3;

    /// Distance from the black hole center.
    fn radius(&self) -> f32;

    /// Moving away from the center.
    fn outbound(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegratorKind {
    #[default]
    Relativistic,
    Newtonian,
}

impl IntegratorKind {
    pub fn model(self) -> u32 {
        match self {
            IntegratorKind::Relativistic => MODEL_RELATIVISTIC,
            IntegratorKind::Newtonian => MODEL_NEWTONIAN,
        }
    }

    pub fn from_model(model: u32) -> Self {
        if model == MODEL_NEWTONIAN {
            IntegratorKind::Newtonian
        } else {
            IntegratorKind::Relativistic
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

/// NDC of the center of pixel `(x, y)`, y growing downward on screen.
pub fn pixel_ndc(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32 * 2.0 - 1.0,
        1.0 - (y as f32 + 0.5) / height as f32 * 2.0,
    )
}

/// World-space camera ray through `ndc`, unprojected on the near plane.
pub fn primary_ray(inverse_view: Mat4, inverse_projection: Mat4, position: Vec3, ndc: Vec2) -> Ray {
    let near = inverse_projection * ndc.extend(0.0).extend(1.0);
    let eye = near.xyz() / near.w;
    let world = (inverse_view * eye.extend(1.0)).xyz();

    Ray {
        origin: position,
        direction: (world - position).normalize(),
    }
}

/// Null geodesic in the plane spanned by the start offset and direction.
#[derive(Debug, Clone, Copy)]
pub struct RelativisticRay {
    center: Vec3,
    e1: Vec3,
    e2: Vec3,
    r: f32,
    phi: f32,
    p_r: f32,
    l: f32,
    /// Geometric mass, half the horizon radius.
    m: f32,
}

impl RelativisticRay {
    pub fn new(ray: Ray, center: Vec3, horizon: f32) -> Self {
        let offset = ray.origin - center;
        let r = offset.length().max(MIN_RADIUS);
        let e1 = offset / r;
        let d = ray.direction.normalize();

        let along = d.dot(e1);
        let e2 = (d - along * e1).try_normalize().unwrap_or_else(|| e1.any_orthonormal_vector());

        let l = offset.cross(d).length();
        let m = horizon * 0.5;
        let potential = (1.0 - 2.0 * m / r) * l * l / (r * r);
        let p_r = (1.0 - potential).max(0.0).sqrt().copysign(along);

        Self {
            center,
            e1,
            e2,
            r,
            phi: 0.0,
            p_r,
            l,
            m,
        }
    }

    /// Impact parameter, conserved along the path.
    pub fn angular_momentum(&self) -> f32 {
        self.l
    }

    fn derivatives(&self, r: f32, p_r: f32) -> (f32, f32, f32) {
        let r = r.max(MIN_RADIUS);
        let (r2, l2) = (r * r, self.l * self.l);

        (p_r, l2 * (1.0 / (r2 * r) - 3.0 * self.m / (r2 * r2)), self.l / r2)
    }
}

impl Geodesic for RelativisticRay {
    fn step(&mut self, h: f32) {
        let (r, p_r) = (self.r, self.p_r);

        let k1 = self.derivatives(r, p_r);
        let k2 = self.derivatives(r + 0.5 * h * k1.0, p_r + 0.5 * h * k1.1);
        let k3 = self.derivatives(r + 0.5 * h * k2.0, p_r + 0.5 * h * k2.1);
        let k4 = self.derivatives(r + h * k3.0, p_r + h * k3.1);

        self.r += h / 6.0 * (k1.0 + 2.0 * k2.0 + 2.0 * k3.0 + k4.0);
        self.p_r += h / 6.0 * (k1.1 + 2.0 * k2.1 + 2.0 * k3.1 + k4.1);
        self.phi += h / 6.0 * (k1.2 + 2.0 * k2.2 + 2.0 * k3.2 + k4.2);
    }

    fn position(&self) -> Vec3 {
        let (sin, cos) = self.phi.sin_cos();
        self.center + self.r * (cos * self.e1 + sin * self.e2)
    }

    fn direction(&self) -> Vec3 {
        let (sin, cos) = self.phi.sin_cos();
        let radial = cos * self.e1 + sin * self.e2;
        let tangential = -sin * self.e1 + cos * self.e2;

        (self.p_r * radial + self.l / self.r.max(MIN_RADIUS) * tangential).normalize_or_zero()
    }

    fn radius(&self) -> f32 {
        self.r
    }

    fn outbound(&self) -> bool {
        self.p_r > 0.0
    }
}

/// Photon as a massive test particle: `a = -k·M·d / (|d|³ + ε)`.
#[derive(Debug, Clone, Copy)]
pub struct NewtonianRay {
    center: Vec3,
    position: Vec3,
    velocity: Vec3,
    pull: f32,
    epsilon: f32,
}

impl NewtonianRay {
    pub fn new(ray: Ray, center: Vec3, horizon: f32, strength: f32, epsilon: f32) -> Self {
        Self {
            center,
            position: ray.origin,
            velocity: ray.direction.normalize(),
            pull: strength * horizon * 0.5,
            epsilon,
        }
    }

    fn acceleration(&self, position: Vec3) -> Vec3 {
        let d = position - self.center;
        let r = d.length();
        -self.pull * d / (r * r * r + self.epsilon)
    }
}

impl Geodesic for NewtonianRay {
    fn step(&mut self, h: f32) {
        let (p, v) = (self.position, self.velocity);

        let (k1p, k1v) = (v, self.acceleration(p));
        let (k2p, k2v) = (v + 0.5 * h * k1v, self.acceleration(p + 0.5 * h * k1p));
        let (k3p, k3v) = (v + 0.5 * h * k2v, self.acceleration(p + 0.5 * h * k2p));
        let (k4p, k4v) = (v + h * k3v, self.acceleration(p + h * k3p));

        self.position += h / 6.0 * (k1p + 2.0 * k2p + 2.0 * k3p + k4p);
        self.velocity += h / 6.0 * (k1v + 2.0 * k2v + 2.0 * k3v + k4v);
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn direction(&self) -> Vec3 {
        self.velocity.normalize_or_zero()
    }

    fn radius(&self) -> f32 {
        (self.position - self.center).length()
    }

    fn outbound(&self) -> bool {
        (self.position - self.center).dot(self.velocity) > 0.0
    }
}

/// Read-only view of everything a ray can hit.
#[derive(Debug, Clone, Copy)]
pub struct TraceScene<'a> {
    pub kind: IntegratorKind,
    pub center: Vec3,
    pub horizon: f32,
    pub strength: f32,
    pub disk_inner: f32,
    pub disk_outer: f32,
    pub planets: &'a [PlanetBlock],
    pub limits: TracerBlock,
}

impl<'a> TraceScene<'a> {
    pub fn from_store(store: &'a SceneStore) -> Self {
        let hole = store.black_hole();
        let disk = store.disk();

        Self {
            kind: IntegratorKind::from_model(hole.model),
            center: Vec3::from_array(hole.position),
            horizon: hole.radius,
            strength: hole.strength,
            disk_inner: disk.inner_radius,
            disk_outer: disk.outer_radius,
            planets: store.planets(),
            limits: *store.tracer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hit {
    Captured,
    /// `direction` is the photon heading where it crossed the disk.
    Disk { point: Vec3, radius: f32, direction: Vec3 },
    Planet { index: usize, point: Vec3 },
    Escaped { direction: Vec3 },
    /// Step budget ran out; shaded like an escape along the last heading.
    Exhausted { direction: Vec3 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trace {
    pub hit: Hit,
    pub steps: u32,
}

/// Integrates `ray` with the scene's integrator.
pub fn trace(ray: Ray, scene: &TraceScene) -> Trace {
    let ray = match approach(ray, scene) {
        ControlFlow::Continue(ray) => ray,
        ControlFlow::Break(hit) => return Trace { hit, steps: 0 },
    };

    match scene.kind {
        IntegratorKind::Relativistic => march(RelativisticRay::new(ray, scene.center, scene.horizon), scene),
        IntegratorKind::Newtonian => march(
            NewtonianRay::new(ray, scene.center, scene.horizon, scene.strength, scene.limits.epsilon),
            scene,
        ),
    }
}

/// Moves a ray that starts outside the escape sphere straight onto it. Only
/// planets and the disk can stop it on the way; a ray that misses the sphere
/// escapes unbent.
pub fn approach(ray: Ray, scene: &TraceScene) -> ControlFlow<Hit, Ray> {
    let offset = ray.origin - scene.center;
    let radius = scene.limits.escape_radius;
    let outside = offset.length_squared() - radius * radius;
    if outside <= 0.0 {
        return ControlFlow::Continue(ray);
    }

    let direction = ray.direction.normalize();
    let b = offset.dot(direction);
    let discriminant = b * b - outside;

    if b >= 0.0 || discriminant < 0.0 {
        return ControlFlow::Break(match ray_hit(ray.origin, direction, f32::INFINITY, scene.planets) {
            Some((index, point)) => Hit::Planet { index, point },
            None => Hit::Escaped { direction },
        });
    }

    let distance = -b - discriminant.sqrt();
    if let Some((index, point)) = ray_hit(ray.origin, direction, distance, scene.planets) {
        return ControlFlow::Break(Hit::Planet { index, point });
    }

    let entry = ray.origin + distance * direction;
    if let Some((point, radius)) = cross_disk(ray.origin, entry, scene) {
        return ControlFlow::Break(Hit::Disk {
            point,
            radius,
            direction,
        });
    }

    ControlFlow::Continue(Ray {
        origin: entry,
        direction,
    })
}

/// Steps `path` until it is captured, crosses the disk, hits a planet or
/// escapes. The step budget is a hard cap.
pub fn march<G: Geodesic>(mut path: G, scene: &TraceScene) -> Trace {
    let limits = &scene.limits;

    if path.radius() <= scene.horizon.max(MIN_RADIUS) {
        return Trace {
            hit: Hit::Captured,
            steps: 0,
        };
    }

    for step in 1..=limits.max_steps {
        let previous = path.position();
        path.step(limits.step_size);
        let current = path.position();

        let r = path.radius();
        if !r.is_finite() || r <= scene.horizon || r <= MIN_RADIUS {
            return Trace {
                hit: Hit::Captured,
                steps: step,
            };
        }

        if let Some((point, radius)) = cross_disk(previous, current, scene) {
            return Trace {
                hit: Hit::Disk {
                    point,
                    radius,
                    direction: path.direction(),
                },
                steps: step,
            };
        }

        if let Some((index, point)) = segment_hit(previous, current, scene.planets) {
            return Trace {
                hit: Hit::Planet { index, point },
                steps: step,
            };
        }

        if r > limits.escape_radius && path.outbound() {
            let direction = path.direction();
            let hit = match ray_hit(current, direction, f32::INFINITY, scene.planets) {
                Some((index, point)) => Hit::Planet { index, point },
                None => Hit::Escaped { direction },
            };

            return Trace { hit, steps: step };
        }
    }

    Trace {
        hit: Hit::Exhausted {
            direction: path.direction(),
        },
        steps: limits.max_steps,
    }
}

/// Crossing of the equatorial plane between two samples, interpolated, if it
/// lands on the annulus.
fn cross_disk(previous: Vec3, current: Vec3, scene: &TraceScene) -> Option<(Vec3, f32)> {
    let y0 = previous.y - scene.center.y;
    let y1 = current.y - scene.center.y;

    if y0 * y1 >= 0.0 {
        return None;
    }

    let t = y0 / (y0 - y1);
    let point = previous.lerp(current, t);
    let radius = (point - scene.center).xz().length();

    (radius >= scene.disk_inner && radius <= scene.disk_outer).then_some((point, radius))
}

fn segment_hit(start: Vec3, end: Vec3, planets: &[PlanetBlock]) -> Option<(usize, Vec3)> {
    let delta = end - start;
    let length = delta.length();
    if length <= 0.0 {
        return None;
    }

    ray_hit(start, delta / length, length, planets)
}

/// Nearest sphere hit along `origin + t·direction` with `0 ≤ t ≤ max_t`.
fn ray_hit(origin: Vec3, direction: Vec3, max_t: f32, planets: &[PlanetBlock]) -> Option<(usize, Vec3)> {
    let mut nearest: Option<(f32, usize)> = None;

    for (index, planet) in planets.iter().enumerate() {
        let to_origin = origin - Vec3::from_array(planet.position);
        let b = to_origin.dot(direction);
        let c = to_origin.length_squared() - planet.radius * planet.radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            continue;
        }

        let root = discriminant.sqrt();
        let t = if -b - root >= 0.0 { -b - root } else { -b + root };
        if t < 0.0 || t > max_t {
            continue;
        }

        if nearest.map_or(true, |(best, _)| t < best) {
            nearest = Some((t, index));
        }
    }

    nearest.map(|(t, index)| (index, origin + t * direction))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::types::NO_TEXTURE;

    fn scene(horizon: f32, kind: IntegratorKind) -> TraceScene<'static> {
        TraceScene {
            kind,
            center: Vec3::ZERO,
            horizon,
            strength: 1.0,
            disk_inner: 3.0 * horizon,
            disk_outer: 10.0 * horizon,
            planets: &[],
            limits: TracerBlock {
                step_size: 0.1,
                max_steps: 4096,
                escape_radius: 120.0,
                epsilon: 1e-6,
            },
        }
    }

    fn fly_past<G: Geodesic>(mut path: G, until_x: f32) -> G {
        while path.position().x < until_x {
            path.step(0.5);
        }
        path
    }

    #[test]
    fn weak_field_ray_barely_bends() {
        let ray = Ray {
            origin: Vec3::new(-1000.0, 50.0, 0.0),
            direction: Vec3::X,
        };
        let path = RelativisticRay::new(ray, Vec3::ZERO, 1.0);
        assert_abs_diff_eq!(path.angular_momentum(), 50.0, epsilon = 1e-3);

        let path = fly_past(path, 1000.0);
        let deflection = path.direction().angle_between(Vec3::X);

        // 4M/b = 0.04 for a full pass
        assert!(deflection > 0.03 && deflection < 0.05, "{deflection}");
        assert!(path.direction().y < 0.0);
        assert!(path.direction().z.abs() < 1e-4);
    }

    #[test]
    fn newtonian_bends_half_as_much() {
        let ray = Ray {
            origin: Vec3::new(-1000.0, 50.0, 0.0),
            direction: Vec3::X,
        };
        let path = fly_past(NewtonianRay::new(ray, Vec3::ZERO, 1.0, 1.0, 1e-6), 1000.0);
        let deflection = path.direction().angle_between(Vec3::X);

        assert!(deflection > 0.015 && deflection < 0.025, "{deflection}");
        assert!(path.direction().y < 0.0);
    }

    #[test]
    fn head_on_ray_is_captured_in_bounded_steps() {
        let scene = scene(1.5, IntegratorKind::Relativistic);
        let ray = Ray {
            origin: Vec3::new(0.0, 0.0, 30.0),
            direction: Vec3::NEG_Z,
        };

        let trace = trace(ray, &scene);
        let bound = ((30.0 - 1.5) / 0.1f32).ceil() as u32 + 1;

        assert_eq!(trace.hit, Hit::Captured);
        assert!(trace.steps <= bound, "{} > {bound}", trace.steps);
    }

    #[test]
    fn screen_center_looking_at_the_hole_is_captured() {
        let position = Vec3::new(0.0, 0.0, 30.0);
        let view = Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 10000.0);

        let ray = primary_ray(view.inverse(), projection.inverse(), position, Vec2::ZERO);
        assert_abs_diff_eq!(ray.direction.z, -1.0, epsilon = 1e-6);

        for kind in [IntegratorKind::Relativistic, IntegratorKind::Newtonian] {
            assert_eq!(trace(ray, &scene(1.5, kind)).hit, Hit::Captured, "{kind:?}");
        }
    }

    #[test]
    fn distant_camera_still_sees_the_shadow() {
        let scene = scene(1.5, IntegratorKind::Relativistic);
        let projection = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 10000.0);
        let bound = ((120.0 - 1.5) / 0.1f32).ceil() as u32 + 2;

        for distance in [500.0, 1000.0] {
            let position = Vec3::new(0.0, 0.0, distance);
            let view = Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y);
            let ray = primary_ray(view.inverse(), projection.inverse(), position, Vec2::ZERO);

            let trace = trace(ray, &scene);
            assert_eq!(trace.hit, Hit::Captured, "{distance}");
            assert!(trace.steps <= bound, "{} > {bound}", trace.steps);
        }
    }

    #[test]
    fn distant_ray_enters_on_the_escape_sphere() {
        let scene = scene(1.5, IntegratorKind::Relativistic);
        let ray = Ray {
            origin: Vec3::new(0.0, 5.0, 800.0),
            direction: Vec3::NEG_Z,
        };

        match approach(ray, &scene) {
            ControlFlow::Continue(entry) => {
                assert_abs_diff_eq!(entry.origin.length(), 120.0, epsilon = 1e-3);
                assert_eq!(entry.direction, Vec3::NEG_Z);
            },
            ControlFlow::Break(hit) => panic!("stopped before the sphere: {hit:?}"),
        }

        let near = Ray {
            origin: Vec3::new(0.0, 5.0, 30.0),
            ..ray
        };
        assert_eq!(approach(near, &scene), ControlFlow::Continue(near));

        let away = Ray {
            direction: Vec3::Z,
            ..ray
        };
        assert_eq!(trace(away, &scene), Trace {
            hit: Hit::Escaped { direction: Vec3::Z },
            steps: 0,
        });
    }

    #[test]
    fn far_planet_blocks_the_approach() {
        let blocker = [PlanetBlock {
            position: [0.0, 0.0, 400.0],
            radius: 10.0,
            color: [1.0; 3],
            texture: NO_TEXTURE,
        }];
        let mut scene = scene(1.5, IntegratorKind::Newtonian);
        scene.planets = &blocker;

        let ray = Ray {
            origin: Vec3::new(0.0, 0.0, 1000.0),
            direction: Vec3::NEG_Z,
        };
        match trace(ray, &scene).hit {
            Hit::Planet { index: 0, point } => assert_abs_diff_eq!(point.z, 410.0, epsilon = 1e-3),
            other => panic!("expected planet hit, got {other:?}"),
        }
    }

    #[test]
    fn ray_from_above_lands_on_the_disk() {
        let scene = scene(1.5, IntegratorKind::Relativistic);
        let ray = Ray {
            origin: Vec3::new(8.0, 20.0, 0.0),
            direction: Vec3::NEG_Y,
        };

        match trace(ray, &scene).hit {
            Hit::Disk { point, radius, .. } => {
                assert_abs_diff_eq!(point.y, 0.0, epsilon = 1e-3);
                assert!(radius >= scene.disk_inner && radius <= scene.disk_outer);
            },
            other => panic!("expected disk hit, got {other:?}"),
        }
    }

    #[test]
    fn outward_ray_escapes_and_tiny_budget_exhausts() {
        let mut scene = scene(1.5, IntegratorKind::Relativistic);
        let ray = Ray {
            origin: Vec3::new(0.0, 5.0, 30.0),
            direction: Vec3::Z,
        };

        assert!(matches!(trace(ray, &scene).hit, Hit::Escaped { .. }));

        scene.limits.max_steps = 3;
        let trace = trace(ray, &scene);
        assert_eq!(trace.steps, 3);
        assert!(matches!(trace.hit, Hit::Exhausted { .. }));
    }

    #[test]
    fn planets_block_the_path_and_the_asymptote() {
        let near = [PlanetBlock {
            position: [0.0, 5.0, 10.0],
            radius: 1.0,
            color: [1.0; 3],
            texture: NO_TEXTURE,
        }];
        let far = [PlanetBlock {
            position: [0.0, 5.0, 500.0],
            radius: 20.0,
            color: [1.0; 3],
            texture: NO_TEXTURE,
        }];
        let ray = Ray {
            origin: Vec3::new(0.0, 5.0, 30.0),
            direction: Vec3::NEG_Z,
        };
        let away = Ray {
            direction: Vec3::Z,
            ..ray
        };

        let mut scene = scene(1.5, IntegratorKind::Relativistic);
        scene.planets = &near;
        assert!(matches!(trace(ray, &scene).hit, Hit::Planet { index: 0, .. }));

        scene.planets = &far;
        assert!(matches!(trace(away, &scene).hit, Hit::Planet { index: 0, .. }));
    }

    #[test]
    fn pixel_centers_map_into_ndc() {
        assert_eq!(pixel_ndc(0, 0, 2, 2), Vec2::new(-0.5, 0.5));
        assert_eq!(pixel_ndc(1, 1, 2, 2), Vec2::new(0.5, -0.5));
    }
}
