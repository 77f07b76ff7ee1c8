use std::path::Path;

use glam::{UVec2, Vec2, Vec4};
use image::imageops::{self, FilterType};

use crate::error::{Error, Result};

/// Row-major pixel grid, `N` channels of `T` per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<const N: usize, T: Copy> {
    pixels: Vec<[T; N]>,
    resolution: UVec2,
}

/// Linear float RGBA, the format every render target uses.
pub type HdrImage = Image<4, f32>;

impl<const N: usize, T: Copy> Image<N, T> {
    pub fn new_fill(resolution: UVec2, pixel: [T; N]) -> Image<N, T> {
        Image::<N, T> {
            pixels: vec![pixel; (resolution.x * resolution.y) as usize],
            resolution,
        }
    }

    pub fn from_pixels(resolution: UVec2, pixels: Vec<[T; N]>) -> Option<Image<N, T>> {
        (pixels.len() == (resolution.x * resolution.y) as usize).then_some(Image { pixels, resolution })
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, pixel: [T; N]) {
        self.pixels[(y * self.resolution.x + x) as usize] = pixel;
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [T; N] {
        self.pixels[(y * self.resolution.x + x) as usize]
    }

    /// Pixel at `(x, y)` with coordinates clamped to the edges.
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> [T; N] {
        let x = x.clamp(0, self.resolution.x as i64 - 1) as u32;
        let y = y.clamp(0, self.resolution.y as i64 - 1) as u32;
        self.get(x, y)
    }

    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.x
    }

    pub fn height(&self) -> u32 {
        self.resolution.y
    }

    pub fn pixels(&self) -> &[[T; N]] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [[T; N]] {
        &mut self.pixels
    }
}

impl HdrImage {
    pub fn black(resolution: UVec2) -> Self {
        Self::new_fill(resolution, [0.0, 0.0, 0.0, 1.0])
    }

    pub fn load(path: &Path) -> Result<Self> {
        let decoded = image::open(path).map_err(|source| Error::Asset {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::from_rgba8(&decoded.to_rgba8()))
    }

    pub fn from_rgba8(rgba: &image::RgbaImage) -> Self {
        let pixels = rgba
            .pixels()
            .map(|p| p.0.map(|c| c as f32 / 255.0))
            .collect();

        Self {
            pixels,
            resolution: UVec2::new(rgba.width(), rgba.height()),
        }
    }

    /// Clamps to `[0, 1]` and quantizes. Alpha is forced opaque.
    pub fn to_rgba8(&self) -> image::RgbaImage {
        let mut out = image::RgbaImage::new(self.width(), self.height());

        for (dst, src) in out.pixels_mut().zip(&self.pixels) {
            let [r, g, b, _] = src.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
            *dst = image::Rgba([r, g, b, 255]);
        }

        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_rgba8().save(path).map_err(|source| Error::Output {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Bilinear sample at `uv` in `[0, 1]²`. `u` wraps around, `v` clamps.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        self.bilinear(Vec2::new(uv.x.rem_euclid(1.0), uv.y), true)
    }

    /// Bilinear sample with both axes clamped to the edge texels, as cube
    /// faces are sampled.
    pub fn sample_clamped(&self, uv: Vec2) -> Vec4 {
        self.bilinear(uv, false)
    }

    fn bilinear(&self, uv: Vec2, wrap_u: bool) -> Vec4 {
        let size = self.resolution.as_vec2();
        let p = uv.clamp(Vec2::ZERO, Vec2::ONE) * size - 0.5;
        let base = p.floor();
        let f = p - base;
        let (x0, y0) = (base.x as i64, base.y as i64);
        let width = self.resolution.x as i64;

        let texel = |x: i64, y: i64| {
            let x = if wrap_u { x.rem_euclid(width) } else { x };
            Vec4::from_array(self.get_clamped(x, y))
        };

        let top = texel(x0, y0).lerp(texel(x0 + 1, y0), f.x);
        let bottom = texel(x0, y0 + 1).lerp(texel(x0 + 1, y0 + 1), f.x);
        top.lerp(bottom, f.y)
    }

    /// Nearest-texel resample to `resolution`.
    pub fn resized(&self, resolution: UVec2) -> Self {
        if resolution == self.resolution {
            return self.clone();
        }

        let source = image::Rgba32FImage::from_fn(self.width(), self.height(), |x, y| image::Rgba(self.get(x, y)));
        let scaled = imageops::resize(&source, resolution.x, resolution.y, FilterType::Nearest);

        Self {
            pixels: scaled.pixels().map(|p| p.0).collect(),
            resolution,
        }
    }
}
