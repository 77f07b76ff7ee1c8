//! Black hole parameters and closed-form orbits for the bodies around it.

use glam::Vec3;

pub const G: f64 = 6.6743e-11;
pub const C: f64 = 2.99792458e8;
pub const SOLAR_MASS: f64 = 1.98847e30;

/// One astronomical unit in meters.
pub const AU: f64 = 1.496e11;

/// Simulated seconds per wall-clock second: one year of orbit per minute.
pub const YEAR_PER_MINUTE: f64 = 31_557_600.0 / 60.0;

/// Non-rotating black hole. The radius is derived from the mass once, at
/// construction, and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlackHole {
    pub position: Vec3,
    mass: f64,
    scale: f64,
    radius: f32,
    pub strength: f32,
}

impl BlackHole {
    /// `mass` is in kilograms, `scale` converts meters into simulation units.
    pub fn new(mass: f64, scale: f64) -> Self {
        let radius = (schwarzschild_radius_m(mass) * scale) as f32;

        Self {
            position: Vec3::ZERO,
            mass,
            scale,
            radius,
            strength: 1.0,
        }
    }

    pub fn with_solar_masses(solar_masses: f64, scale: f64) -> Self {
        Self::new(solar_masses * SOLAR_MASS, scale)
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Event horizon radius in simulation units.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Mass in geometric units (G = c = 1) expressed in simulation lengths.
    pub fn geometric_mass(&self) -> f32 {
        self.radius * 0.5
    }
}

/// `r_s = 2GM/c²` in meters.
pub fn schwarzschild_radius_m(mass: f64) -> f64 {
    2.0 * G * mass / (C * C)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccretionDisk {
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub color: Vec3,
}

impl AccretionDisk {
    /// Inner edge at the ISCO (3 r_s), outer edge at 10 r_s.
    pub fn around(hole: &BlackHole, color: Vec3) -> Self {
        Self {
            inner_radius: 3.0 * hole.radius(),
            outer_radius: 10.0 * hole.radius(),
            color,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitingBody {
    pub name: String,
    /// Zero means the body keeps its manually assigned `position`.
    pub orbit_radius: f64,
    /// Radians per simulated second.
    pub orbit_speed: f64,
    pub orbit_phase: f64,
    pub orbit_inclination: f64,
    pub radius: f32,
    pub color: Vec3,
    pub texture: Option<usize>,
    pub position: Vec3,
}

impl OrbitingBody {
    /// Body on a circular orbit at `distance` meters with `v = sqrt(GM/r)`.
    pub fn circular(name: impl Into<String>, hole: &BlackHole, distance: f64, radius: f32, color: Vec3) -> Self {
        let velocity = (G * hole.mass() / distance).sqrt();

        Self {
            name: name.into(),
            orbit_radius: distance * hole.scale(),
            orbit_speed: velocity / distance,
            orbit_phase: 0.0,
            orbit_inclination: 0.0,
            radius,
            color,
            texture: None,
            position: Vec3::ZERO,
        }
    }

    /// Body fixed at `position` with no orbit.
    pub fn fixed(name: impl Into<String>, position: Vec3, radius: f32, color: Vec3) -> Self {
        Self {
            name: name.into(),
            orbit_radius: 0.0,
            orbit_speed: 0.0,
            orbit_phase: 0.0,
            orbit_inclination: 0.0,
            radius,
            color,
            texture: None,
            position,
        }
    }

    /// Orbital period in simulated seconds, `None` for fixed bodies.
    pub fn period(&self) -> Option<f64> {
        (self.orbit_radius > 0.0 && self.orbit_speed > 0.0).then(|| std::f64::consts::TAU / self.orbit_speed)
    }

    pub fn position_at(&self, sim_time: f64) -> Vec3 {
        if self.orbit_radius <= 0.0 {
            return self.position;
        }

        let angle = self.orbit_phase + self.orbit_speed * sim_time;
        let x = self.orbit_radius * angle.cos();
        let mut y = 0.0;
        let mut z = self.orbit_radius * angle.sin();

        if self.orbit_inclination != 0.0 {
            let (sin, cos) = self.orbit_inclination.sin_cos();
            y = z * sin;
            z *= cos;
        }

        Vec3::new(x as f32, y as f32, z as f32)
    }
}

/// Positions of every body at `sim_time`. Pure: the inputs are not touched.
pub fn advance(bodies: &[OrbitingBody], sim_time: f64) -> Vec<OrbitingBody> {
    bodies
        .iter()
        .map(|body| OrbitingBody {
            position: body.position_at(sim_time),
            ..body.clone()
        })
        .collect()
}

/// Maps wall-clock seconds onto simulated orbital seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimClock {
    pub time_scale: f64,
}

impl Default for SimClock {
    fn default() -> Self {
        Self {
            time_scale: YEAR_PER_MINUTE,
        }
    }
}

impl SimClock {
    pub fn sim_time(&self, wall_seconds: f64) -> f64 {
        wall_seconds * self.time_scale
    }

    /// How many full orbits `body` completes per wall-clock minute.
    pub fn orbits_per_minute(&self, body: &OrbitingBody) -> Option<f64> {
        body.period().map(|period| self.time_scale * 60.0 / period)
    }
}

/// Earth on its orbit plus a decorative Mars placed by coordinate.
pub fn default_bodies(hole: &BlackHole) -> Vec<OrbitingBody> {
    let scale = hole.scale() as f32;

    vec![
        OrbitingBody::circular("earth", hole, AU, 6378.0 * scale, Vec3::ONE),
        OrbitingBody::fixed(
            "mars",
            Vec3::new(-15.0, 0.0, -90.0),
            3389.5 * scale,
            Vec3::new(1.0, 0.5, 0.3),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use super::*;

    #[test]
    fn five_solar_mass_radius() {
        let hole = BlackHole::with_solar_masses(5.0, 0.0001016);
        let expected = 2.0 * 6.6743e-11 * 5.0 * 1.98847e30 / (2.99792458e8f64 * 2.99792458e8) * 0.0001016;

        assert_relative_eq!(schwarzschild_radius_m(hole.mass()) * hole.scale(), expected, max_relative = 1e-12);
        assert_relative_eq!(hole.radius(), expected as f32, max_relative = 1e-6);
        assert_relative_eq!(hole.radius(), 1.5003, max_relative = 1e-3);
        assert_relative_eq!(hole.geometric_mass(), hole.radius() / 2.0);
    }

    #[test]
    fn radius_grows_with_mass() {
        let mut last = 0.0;
        for solar_masses in [0.5, 1.0, 5.0, 10.0, 25.0, 1e6] {
            let radius = BlackHole::with_solar_masses(solar_masses, 0.0001016).radius();
            assert!(radius > last);
            last = radius;
        }
    }

    #[test]
    fn disk_radii_are_fixed_multiples() {
        for solar_masses in [1.0, 5.0, 10.0, 25.0] {
            let hole = BlackHole::with_solar_masses(solar_masses, 0.0001016);
            let disk = AccretionDisk::around(&hole, Vec3::ONE);

            assert_eq!(disk.inner_radius, 3.0 * hole.radius());
            assert_eq!(disk.outer_radius, 10.0 * hole.radius());
        }
    }

    #[test]
    fn advance_is_idempotent() {
        let hole = BlackHole::with_solar_masses(5.0, 0.0001016);
        let bodies = default_bodies(&hole);
        let t = SimClock::default().sim_time(12.5);

        let first = advance(&bodies, t);
        let second = advance(&bodies, t);
        assert_eq!(first, second);

        let again = advance(&first, t);
        assert_eq!(first, again);
    }

    #[test]
    fn fixed_bodies_keep_their_position() {
        let hole = BlackHole::with_solar_masses(5.0, 0.0001016);
        let bodies = default_bodies(&hole);

        for t in [0.0, 1e3, 1e9] {
            let moved = advance(&bodies, t);
            assert_eq!(moved[1].position, Vec3::new(-15.0, 0.0, -90.0));
        }
    }

    #[test]
    fn orbit_stays_on_its_circle() {
        let hole = BlackHole::with_solar_masses(5.0, 0.0001016);
        let mut body = OrbitingBody::circular("satellite", &hole, 1e6, 1.0, Vec3::ONE);
        body.orbit_inclination = 0.4;

        for t in [0.0, 0.3, 7.0, 100.0] {
            let p = body.position_at(t);
            assert_relative_eq!(p.length(), body.orbit_radius as f32, max_relative = 1e-5);
        }

        let start = body.position_at(0.0);
        assert_abs_diff_eq!(start.x, body.orbit_radius as f32, epsilon = 1e-3);
        assert_abs_diff_eq!(start.y, 0.0);
    }

    #[test]
    fn inclination_tilts_out_of_plane() {
        let hole = BlackHole::with_solar_masses(5.0, 0.0001016);
        let mut body = OrbitingBody::circular("satellite", &hole, 1e6, 1.0, Vec3::ONE);
        let quarter = body.period().unwrap() / 4.0;

        assert_abs_diff_eq!(body.position_at(quarter).y, 0.0);

        body.orbit_inclination = std::f64::consts::FRAC_PI_2;
        let p = body.position_at(quarter);
        assert_relative_eq!(p.y, body.orbit_radius as f32, max_relative = 1e-4);
    }

    #[test]
    fn earth_orbits_a_few_times_per_minute() {
        let hole = BlackHole::with_solar_masses(5.0, 0.0001016);
        let earth = &default_bodies(&hole)[0];
        let orbits = SimClock::default().orbits_per_minute(earth).unwrap();

        assert!(orbits > 1.0 && orbits < 5.0, "{orbits}");
    }
}
