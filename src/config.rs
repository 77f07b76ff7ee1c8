use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    bloom::BloomSettings,
    error::{Error, Result},
    geodesic::IntegratorKind,
    physics::{AccretionDisk, BlackHole, SimClock, YEAR_PER_MINUTE},
    types::{TracerBlock, DISK_BEAMING, DISK_SMOKE},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub width: u32,
    pub height: u32,

    pub solar_masses: f64,
    /// Simulation units per meter.
    pub scale: f64,
    pub time_scale: f64,

    pub integrator: IntegratorKind,
    pub lensing_strength: f32,
    pub step_size: f32,
    pub max_steps: u32,
    pub escape_radius: f32,

    pub disk_color: [f32; 3],
    pub doppler_beaming: bool,
    pub smoke: bool,

    pub bloom_threshold: f32,
    pub bloom_strength: f32,
    pub blur_passes: u32,

    pub skybox_dir: Option<PathBuf>,
    pub smoke_texture: Option<PathBuf>,
    pub planet_textures: Vec<PathBuf>,

    pub show_grid: bool,
    pub show_debug_text: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 1360,
            height: 768,
            solar_masses: 5.0,
            scale: 0.0001016,
            time_scale: YEAR_PER_MINUTE,
            integrator: IntegratorKind::Relativistic,
            lensing_strength: 1.0,
            step_size: 0.1,
            max_steps: 4096,
            escape_radius: 120.0,
            disk_color: [1.0, 0.7, 0.2],
            doppler_beaming: false,
            smoke: false,
            bloom_threshold: 0.7,
            bloom_strength: 0.3,
            blur_passes: 8,
            skybox_dir: None,
            smoke_texture: None,
            planet_textures: Vec::new(),
            show_grid: false,
            show_debug_text: true,
        }
    }
}

impl Config {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config =
            serde_json::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), "loaded config");
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| Err(Error::Config(reason.to_owned()));

        if self.width == 0 || self.height == 0 {
            return fail("window size must be non-zero");
        }
        if !(self.solar_masses > 0.0) {
            return fail("black hole mass must be positive");
        }
        if !(self.scale > 0.0) {
            return fail("length scale must be positive");
        }
        if !(self.time_scale >= 0.0) {
            return fail("time scale must not be negative");
        }
        if !(self.step_size > 0.0) {
            return fail("step size must be positive");
        }
        if self.max_steps == 0 {
            return fail("step budget must be at least 1");
        }
        if !(self.escape_radius > 0.0) {
            return fail("escape radius must be positive");
        }
        if self.blur_passes == 0 {
            return fail("at least one blur pass is required");
        }
        if !(self.bloom_strength >= 0.0) {
            return fail("bloom strength must not be negative");
        }

        Ok(())
    }

    pub fn black_hole(&self) -> BlackHole {
        let hole = BlackHole::with_solar_masses(self.solar_masses, self.scale).with_strength(self.lensing_strength);

        info!(
            mass_kg = hole.mass(),
            radius = hole.radius(),
            scale = hole.scale(),
            "black hole"
        );

        hole
    }

    pub fn disk(&self, hole: &BlackHole) -> AccretionDisk {
        AccretionDisk::around(hole, Vec3::from_array(self.disk_color))
    }

    pub fn disk_flags(&self) -> u32 {
        let mut flags = 0;
        if self.doppler_beaming {
            flags |= DISK_BEAMING;
        }
        if self.smoke {
            flags |= DISK_SMOKE;
        }
        flags
    }

    pub fn clock(&self) -> SimClock {
        SimClock {
            time_scale: self.time_scale,
        }
    }

    pub fn tracer(&self) -> TracerBlock {
        TracerBlock {
            step_size: self.step_size,
            max_steps: self.max_steps,
            escape_radius: self.escape_radius,
            epsilon: 1e-6,
        }
    }

    pub fn bloom(&self) -> BloomSettings {
        BloomSettings {
            threshold: self.bloom_threshold,
            strength: self.bloom_strength,
            passes: self.blur_passes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();

        assert_eq!(config.integrator, IntegratorKind::Relativistic);
        assert_eq!(config.bloom().passes, 8);
        assert_eq!(config.disk_flags(), 0);
        assert_eq!(config.disk_color, [1.0, 0.7, 0.2]);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{ "solar_masses": 10.0, "integrator": "newtonian" }"#).unwrap();

        assert_eq!(config.solar_masses, 10.0);
        assert_eq!(config.integrator, IntegratorKind::Newtonian);
        assert_eq!(config.max_steps, 4096);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_degenerate_values() {
        let cases = [
            Config {
                width: 0,
                ..Default::default()
            },
            Config {
                solar_masses: 0.0,
                ..Default::default()
            },
            Config {
                scale: -1.0,
                ..Default::default()
            },
            Config {
                step_size: 0.0,
                ..Default::default()
            },
            Config {
                max_steps: 0,
                ..Default::default()
            },
            Config {
                blur_passes: 0,
                ..Default::default()
            },
            Config {
                solar_masses: f64::NAN,
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{config:?}");
        }
    }

    #[test]
    fn flags_follow_toggles() {
        let config = Config {
            doppler_beaming: true,
            smoke: true,
            ..Default::default()
        };
        assert_eq!(config.disk_flags(), DISK_BEAMING | DISK_SMOKE);
    }
}
