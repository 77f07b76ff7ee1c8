//! Fixed-layout blocks shared with `geodesic.wgsl`. Every vector is padded
//! out to 16 bytes to match WGSL uniform alignment.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::physics::{AccretionDisk, BlackHole, OrbitingBody};

/// Most planets the tracer's storage buffer holds.
pub const MAX_PLANETS: usize = 16;

/// Binding slots of the tracer's scene bind group (group 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneBinding {
    Camera,
    BlackHole,
    Disk,
    Planets,
    Time,
    Tracer,
}

impl SceneBinding {
    pub const ALL: [SceneBinding; 6] = [
        SceneBinding::Camera,
        SceneBinding::BlackHole,
        SceneBinding::Disk,
        SceneBinding::Planets,
        SceneBinding::Time,
        SceneBinding::Tracer,
    ];

    pub const fn slot(self) -> u32 {
        match self {
            SceneBinding::Camera => 0,
            SceneBinding::BlackHole => 1,
            SceneBinding::Disk => 2,
            SceneBinding::Planets => 3,
            SceneBinding::Time => 4,
            SceneBinding::Tracer => 5,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            SceneBinding::Camera => "camera_block",
            SceneBinding::BlackHole => "black_hole_block",
            SceneBinding::Disk => "disk_block",
            SceneBinding::Planets => "planet_buffer",
            SceneBinding::Time => "time_block",
            SceneBinding::Tracer => "tracer_block",
        }
    }

    /// Byte size of the GPU buffer backing this slot.
    pub const fn size(self) -> usize {
        match self {
            SceneBinding::Camera => std::mem::size_of::<CameraBlock>(),
            SceneBinding::BlackHole => std::mem::size_of::<BlackHoleBlock>(),
            SceneBinding::Disk => std::mem::size_of::<DiskBlock>(),
            SceneBinding::Planets => std::mem::size_of::<PlanetBlock>() * MAX_PLANETS,
            SceneBinding::Time => std::mem::size_of::<TimeBlock>(),
            SceneBinding::Tracer => std::mem::size_of::<TracerBlock>(),
        }
    }

    pub const fn is_storage(self) -> bool {
        matches!(self, SceneBinding::Planets)
    }
}

#[repr(C)]
#[derive(Pod, Zeroable, Copy, Clone, Debug, PartialEq)]
pub struct CameraBlock {
    view: [f32; 16],
    projection: [f32; 16],
    inverse_view: [f32; 16],
    inverse_projection: [f32; 16],
    position: [f32; 4],
}

impl CameraBlock {
    /// Inverses are always derived here, never set independently.
    pub fn new(view: Mat4, projection: Mat4, position: Vec3) -> Self {
        Self {
            view: view.to_cols_array(),
            projection: projection.to_cols_array(),
            inverse_view: view.inverse().to_cols_array(),
            inverse_projection: projection.inverse().to_cols_array(),
            position: position.extend(1.0).to_array(),
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::from_cols_array(&self.view)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::from_cols_array(&self.projection)
    }

    pub fn inverse_view(&self) -> Mat4 {
        Mat4::from_cols_array(&self.inverse_view)
    }

    pub fn inverse_projection(&self) -> Mat4 {
        Mat4::from_cols_array(&self.inverse_projection)
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.position[0], self.position[1], self.position[2])
    }
}

/// Integrator selector stored in [`BlackHoleBlock::model`].
pub const MODEL_RELATIVISTIC: u32 = 0;
pub const MODEL_NEWTONIAN: u32 = 1;

#[repr(C)]
#[derive(Pod, Zeroable, Copy, Clone, Debug, PartialEq)]
pub struct BlackHoleBlock {
    pub position: [f32; 3],
    pub radius: f32,
    pub strength: f32,
    pub model: u32,
    pub _pad: [f32; 2],
}

impl BlackHoleBlock {
    pub fn new(hole: &BlackHole, model: u32) -> Self {
        Self {
            position: hole.position.to_array(),
            radius: hole.radius(),
            strength: hole.strength,
            model,
            _pad: [0.0; 2],
        }
    }
}

/// Bits of [`DiskBlock::flags`].
pub const DISK_BEAMING: u32 = 1;
pub const DISK_SMOKE: u32 = 1 << 1;

#[repr(C)]
#[derive(Pod, Zeroable, Copy, Clone, Debug, PartialEq)]
pub struct DiskBlock {
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub _pad: [f32; 2],
    pub color: [f32; 3],
    pub flags: u32,
}

impl DiskBlock {
    pub fn new(disk: &AccretionDisk, flags: u32) -> Self {
        Self {
            inner_radius: disk.inner_radius,
            outer_radius: disk.outer_radius,
            _pad: [0.0; 2],
            color: disk.color.to_array(),
            flags,
        }
    }
}

/// Texture layer value for a planet without a texture.
pub const NO_TEXTURE: i32 = -1;

#[repr(C)]
#[derive(Pod, Zeroable, Copy, Clone, Debug, PartialEq)]
pub struct PlanetBlock {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    pub texture: i32,
}

impl From<&OrbitingBody> for PlanetBlock {
    fn from(body: &OrbitingBody) -> Self {
        Self {
            position: body.position.to_array(),
            radius: body.radius,
            color: body.color.to_array(),
            texture: body.texture.map_or(NO_TEXTURE, |layer| layer as i32),
        }
    }
}

#[repr(C)]
#[derive(Pod, Zeroable, Copy, Clone, Debug, PartialEq)]
pub struct TimeBlock {
    pub time: f32,
    pub planet_count: u32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Pod, Zeroable, Copy, Clone, Debug, PartialEq)]
pub struct TracerBlock {
    pub step_size: f32,
    pub max_steps: u32,
    pub escape_radius: f32,
    pub epsilon: f32,
}

#[repr(C)]
#[derive(Pod, Zeroable, Copy, Clone, Debug, PartialEq)]
pub struct BloomParams {
    pub direction: [f32; 2],
    pub threshold: f32,
    pub strength: f32,
}

#[cfg(test)]
mod tests {
    use std::mem::{offset_of, size_of};

    use super::*;

    #[test]
    fn blocks_are_16_byte_multiples() {
        for binding in SceneBinding::ALL {
            assert_eq!(binding.size() % 16, 0, "{binding:?}");
        }
        assert_eq!(size_of::<BloomParams>(), 16);
    }

    #[test]
    fn camera_block_layout() {
        assert_eq!(size_of::<CameraBlock>(), 272);
        assert_eq!(offset_of!(CameraBlock, projection), 64);
        assert_eq!(offset_of!(CameraBlock, inverse_view), 128);
        assert_eq!(offset_of!(CameraBlock, inverse_projection), 192);
        assert_eq!(offset_of!(CameraBlock, position), 256);
    }

    #[test]
    fn camera_inverses_follow_the_matrices() {
        let eye = Vec3::new(3.0, 4.0, 25.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0);
        let block = CameraBlock::new(view, projection, eye);

        assert_eq!(block.view(), view);
        assert_eq!(block.inverse_view(), view.inverse());
        assert_eq!(block.inverse_projection(), projection.inverse());
        assert_eq!(block.position(), eye);
    }

    #[test]
    fn disk_color_starts_on_vec4_boundary() {
        assert_eq!(size_of::<DiskBlock>(), 32);
        assert_eq!(offset_of!(DiskBlock, color), 16);
        assert_eq!(offset_of!(DiskBlock, flags), 28);
    }

    #[test]
    fn planet_block_layout() {
        assert_eq!(size_of::<PlanetBlock>(), 32);
        assert_eq!(offset_of!(PlanetBlock, radius), 12);
        assert_eq!(offset_of!(PlanetBlock, color), 16);
        assert_eq!(offset_of!(PlanetBlock, texture), 28);
    }

    #[test]
    fn slots_are_unique() {
        let mut slots: Vec<u32> = SceneBinding::ALL.iter().map(|b| b.slot()).collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), SceneBinding::ALL.len());
        assert_eq!(SceneBinding::Camera.slot(), 0);
        assert_eq!(SceneBinding::Time.slot(), 4);
    }
}
