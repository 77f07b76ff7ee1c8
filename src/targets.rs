use glam::UVec2;
use tracing::debug;

use crate::image::HdrImage;

pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Creates one render target image of a given size.
pub trait TargetAllocator {
    type Target;

    fn allocate(&self, label: &'static str, size: UVec2) -> Self::Target;
}

/// The traced image plus the three bloom images, always the same size.
#[derive(Debug)]
pub struct RenderTargets<T> {
    size: UVec2,
    pub primary: T,
    pub bright: T,
    pub ping: [T; 2],
}

impl<T> RenderTargets<T> {
    pub fn allocate<A: TargetAllocator<Target = T>>(allocator: &A, width: u32, height: u32) -> Self {
        let size = UVec2::new(width.max(1), height.max(1));

        Self {
            size,
            primary: allocator.allocate("primary_target", size),
            bright: allocator.allocate("bright_target", size),
            ping: [
                allocator.allocate("ping_target_0", size),
                allocator.allocate("ping_target_1", size),
            ],
        }
    }

    /// Replaces all four images with a fresh set. A zero or unchanged size is
    /// ignored. Returns whether anything was reallocated.
    pub fn resize<A: TargetAllocator<Target = T>>(&mut self, allocator: &A, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || UVec2::new(width, height) == self.size {
            return false;
        }

        debug!(width, height, "reallocating render targets");
        *self = Self::allocate(allocator, width, height);
        true
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.x
    }

    pub fn height(&self) -> u32 {
        self.size.y
    }
}

/// Images in host memory for the CPU backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostAllocator;

impl TargetAllocator for HostAllocator {
    type Target = HdrImage;

    fn allocate(&self, _label: &'static str, size: UVec2) -> HdrImage {
        HdrImage::black(size)
    }
}

#[derive(Debug)]
pub struct GpuTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl TargetAllocator for wgpu::Device {
    type Target = GpuTarget;

    fn allocate(&self, label: &'static str, size: UVec2) -> GpuTarget {
        let texture = self.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        GpuTarget { texture, view }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(targets: &RenderTargets<HdrImage>) -> Vec<UVec2> {
        [&targets.primary, &targets.bright, &targets.ping[0], &targets.ping[1]]
            .iter()
            .map(|image| image.resolution())
            .collect()
    }

    #[test]
    fn all_targets_share_one_size() {
        let mut targets = RenderTargets::allocate(&HostAllocator, 64, 32);
        assert!(sizes(&targets).iter().all(|s| *s == UVec2::new(64, 32)));

        assert!(targets.resize(&HostAllocator, 17, 9));
        assert_eq!(targets.size(), UVec2::new(17, 9));
        assert!(sizes(&targets).iter().all(|s| *s == targets.size()));
    }

    #[test]
    fn zero_and_same_size_are_ignored() {
        let mut targets = RenderTargets::allocate(&HostAllocator, 8, 8);
        targets.primary.set(0, 0, [1.0; 4]);

        assert!(!targets.resize(&HostAllocator, 0, 600));
        assert!(!targets.resize(&HostAllocator, 8, 8));
        assert_eq!(targets.primary.get(0, 0), [1.0; 4]);
    }
}
