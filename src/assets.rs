use std::path::Path;

use glam::{UVec2, Vec2, Vec3, Vec4};
use once_cell::sync::Lazy;
use tracing::{debug, info};

use crate::{
    config::Config,
    error::{Error, Result},
    image::HdrImage,
};

/// Face file names in cube layer order: +X, -X, +Y, -Y, +Z, -Z.
pub const FACE_NAMES: [&str; 6] = ["right", "left", "top", "bottom", "front", "back"];

/// Planet textures are resampled to one shared size so they fit a texture array.
pub const PLANET_TEXTURE_SIZE: UVec2 = UVec2::new(512, 256);

const STAR_FACE_SIZE: u32 = 256;

static STAR_FIELD: Lazy<CubeMap> = Lazy::new(|| CubeMap::star_field(STAR_FACE_SIZE, 0x5eed_b1ac));

#[derive(Debug, Clone)]
pub struct CubeMap {
    size: u32,
    faces: [HdrImage; 6],
}

impl CubeMap {
    pub fn from_faces(faces: [HdrImage; 6]) -> Result<Self> {
        let size = faces[0].width();

        for (face, name) in faces.iter().zip(FACE_NAMES) {
            if face.width() != size || face.height() != size {
                return Err(Error::InvalidAsset {
                    path: name.into(),
                    reason: format!("cube face is {}x{}, expected {size}x{size}", face.width(), face.height()),
                });
            }
        }

        Ok(Self { size, faces })
    }

    /// Loads `right.png`, `left.png`, ... from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut faces = Vec::with_capacity(6);
        for name in FACE_NAMES {
            let path = dir.join(format!("{name}.png"));
            debug!(path = %path.display(), "loading skybox face");
            faces.push(HdrImage::load(&path)?);
        }

        let faces: [HdrImage; 6] = faces.try_into().map_err(|_| Error::InvalidAsset {
            path: dir.to_path_buf(),
            reason: "expected six cube faces".into(),
        })?;

        Self::from_faces(faces)
    }

    /// Sparse random stars on a near-black sky.
    pub fn star_field(size: u32, seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let background = [0.002, 0.002, 0.006, 1.0];

        let faces = std::array::from_fn(|_| {
            let mut face = HdrImage::new_fill(UVec2::splat(size), background);
            let stars = size * size / 90;

            for _ in 0..stars {
                let (x, y) = (rng.u32(0..size), rng.u32(0..size));
                let brightness = rng.f32().powi(6) * 0.95 + 0.05;
                let tint = 0.8 + 0.2 * rng.f32();
                face.set(x, y, [brightness * tint, brightness * tint, brightness, 1.0]);
            }

            face
        });

        Self { size, faces }
    }

    /// Process-wide procedural sky, built on first use.
    pub fn default_sky() -> &'static CubeMap {
        &STAR_FIELD
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn faces(&self) -> &[HdrImage; 6] {
        &self.faces
    }

    pub fn sample(&self, direction: Vec3) -> Vec4 {
        let (face, uv) = face_uv(direction);
        self.faces[face].sample_clamped(uv)
    }
}

/// Cube face and texture coordinate a direction lands on, using the usual
/// major-axis convention shared by Vulkan, Metal and D3D.
pub fn face_uv(d: Vec3) -> (usize, Vec2) {
    let a = d.abs();

    let (face, sc, tc, ma) = if a.x >= a.y && a.x >= a.z {
        if d.x >= 0.0 {
            (0, -d.z, -d.y, a.x)
        } else {
            (1, d.z, -d.y, a.x)
        }
    } else if a.y >= a.z {
        if d.y >= 0.0 {
            (2, d.x, d.z, a.y)
        } else {
            (3, d.x, -d.z, a.y)
        }
    } else if d.z >= 0.0 {
        (4, d.x, -d.y, a.z)
    } else {
        (5, -d.x, -d.y, a.z)
    };

    let ma = ma.max(f32::MIN_POSITIVE);
    (face, Vec2::new(sc / ma + 1.0, tc / ma + 1.0) * 0.5)
}

/// Everything the tracer samples besides the scene blocks.
#[derive(Debug, Clone)]
pub struct SceneTextures {
    pub skybox: CubeMap,
    pub planets: Vec<HdrImage>,
    pub smoke: HdrImage,
}

impl SceneTextures {
    pub fn load(config: &Config) -> Result<Self> {
        let skybox = match &config.skybox_dir {
            Some(dir) => {
                let sky = CubeMap::load(dir)?;
                info!(dir = %dir.display(), size = sky.size(), "loaded skybox");
                sky
            },
            None => CubeMap::default_sky().clone(),
        };

        let planets = config
            .planet_textures
            .iter()
            .map(|path| {
                debug!(path = %path.display(), "loading planet texture");
                HdrImage::load(path).map(|image| image.resized(PLANET_TEXTURE_SIZE))
            })
            .collect::<Result<Vec<_>>>()?;

        let smoke = match &config.smoke_texture {
            Some(path) => HdrImage::load(path)?,
            None => HdrImage::new_fill(UVec2::ONE, [1.0; 4]),
        };

        Ok(Self { skybox, planets, smoke })
    }

    /// Procedural sky, no planet textures, neutral smoke.
    pub fn procedural() -> Self {
        Self {
            skybox: CubeMap::default_sky().clone(),
            planets: Vec::new(),
            smoke: HdrImage::new_fill(UVec2::ONE, [1.0; 4]),
        }
    }
}
