use std::f32::consts::{PI, TAU};

use glam::{UVec2, Vec2, Vec3, Vec3Swizzles, Vec4, Vec4Swizzles};
use rayon::prelude::*;

use crate::{
    assets::{SceneTextures, PLANET_TEXTURE_SIZE},
    geodesic::{pixel_ndc, primary_ray, trace, Hit, TraceScene},
    image::HdrImage,
    scene::{SceneBufferSet, SceneStore},
    targets::{GpuTarget, TARGET_FORMAT},
    types::{SceneBinding, DISK_BEAMING, DISK_SMOKE, NO_TEXTURE},
};

pub const WORKGROUP_SIZE: u32 = 8;

/// Traces every pixel of `target` on the rayon pool. Each pixel depends only
/// on its own ray and the read-only scene, so the result does not depend on
/// the thread count.
pub fn trace_image(store: &SceneStore, textures: &SceneTextures, target: &mut HdrImage) {
    let (width, height) = (target.width(), target.height());
    let camera = store.camera();
    let (inverse_view, inverse_projection, position) =
        (camera.inverse_view(), camera.inverse_projection(), camera.position());
    let scene = TraceScene::from_store(store);

    target
        .pixels_mut()
        .par_chunks_mut(width.max(1) as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, pixel) in row.iter_mut().enumerate() {
                let ndc = pixel_ndc(x as u32, y as u32, width, height);
                let ray = primary_ray(inverse_view, inverse_projection, position, ndc);
                *pixel = shade(trace(ray, &scene).hit, store, textures).to_array();
            }
        });
}

pub fn shade(hit: Hit, store: &SceneStore, textures: &SceneTextures) -> Vec4 {
    match hit {
        Hit::Captured => Vec4::new(0.0, 0.0, 0.0, 1.0),
        Hit::Disk {
            point,
            radius,
            direction,
        } => disk_color(point, radius, direction, store, textures).extend(1.0),
        Hit::Planet { index, point } => {
            let planet = &store.planets()[index];
            let mut color = Vec3::from_array(planet.color);

            if planet.texture != NO_TEXTURE {
                if let Some(texture) = textures.planets.get(planet.texture as usize) {
                    let normal = (point - Vec3::from_array(planet.position)).normalize_or_zero();
                    color *= texture.sample(sphere_uv(normal)).xyz();
                }
            }

            color.extend(1.0)
        },
        Hit::Escaped { direction } | Hit::Exhausted { direction } => {
            textures.skybox.sample(direction).xyz().extend(1.0)
        },
    }
}

/// Equirectangular coordinates of a unit normal.
pub fn sphere_uv(normal: Vec3) -> Vec2 {
    Vec2::new(
        0.5 + normal.z.atan2(normal.x) / TAU,
        0.5 - normal.y.clamp(-1.0, 1.0).asin() / PI,
    )
}

fn disk_color(point: Vec3, radius: f32, direction: Vec3, store: &SceneStore, textures: &SceneTextures) -> Vec3 {
    let disk = store.disk();
    let hole = store.black_hole();
    let offset = point - Vec3::from_array(hole.position);
    let mut color = Vec3::from_array(disk.color);

    if disk.flags & DISK_BEAMING != 0 {
        color *= doppler_boost(offset, direction, hole.radius * 0.5);
    }

    if disk.flags & DISK_SMOKE != 0 {
        let width = (disk.outer_radius - disk.inner_radius).max(f32::EPSILON);
        let uv = Vec2::new(
            offset.z.atan2(offset.x) / TAU + store.time().time * 0.05,
            (radius - disk.inner_radius) / width,
        );
        color *= textures.smoke.sample(uv).xyz();
    }

    color
}

/// `δ³` for gas on a circular Keplerian orbit seen along `direction`.
pub fn doppler_boost(offset: Vec3, direction: Vec3, mass: f32) -> f32 {
    let radius = offset.xz().length().max(f32::EPSILON);
    let speed = (mass / radius).sqrt().min(0.99);
    let tangent = Vec3::Y.cross(offset).normalize_or_zero();
    let gamma = 1.0 / (1.0 - speed * speed).sqrt();

    // the emitter moves toward the viewer when its velocity opposes the photon
    let cos = tangent.dot(-direction.normalize_or_zero());
    let delta = 1.0 / (gamma * (1.0 - speed * cos));
    delta * delta * delta
}

/// Compute pipeline running `geodesic.wgsl` over the primary target.
pub struct TracerPipeline {
    pipeline: wgpu::ComputePipeline,
    scene_group: wgpu::BindGroup,
    texture_group: wgpu::BindGroup,
    output_layout: wgpu::BindGroupLayout,
    output_group: Option<wgpu::BindGroup>,
}

impl TracerPipeline {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        shader: &wgpu::ShaderModule,
        buffers: &SceneBufferSet,
        textures: &SceneTextures,
    ) -> Self {
        let scene_entries: Vec<_> = SceneBinding::ALL
            .into_iter()
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding: binding.slot(),
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: if binding.is_storage() {
                        wgpu::BufferBindingType::Storage { read_only: true }
                    } else {
                        wgpu::BufferBindingType::Uniform
                    },
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZero::new(binding.size() as u64),
                },
                count: None,
            })
            .collect();

        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene_layout"),
            entries: &scene_entries,
        });

        let scene_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene_bind_group"),
            layout: &scene_layout,
            entries: &buffers.entries().collect::<Vec<_>>(),
        });

        let output_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tracer_output_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: TARGET_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            }],
        });

        let (texture_layout, texture_group) = upload_textures(device, queue, textures);

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tracer_pipeline_layout"),
            bind_group_layouts: &[&scene_layout, &output_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("tracer_pipeline"),
            layout: Some(&layout),
            module: shader,
            entry_point: Some("trace"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            pipeline,
            scene_group,
            texture_group,
            output_layout,
            output_group: None,
        }
    }

    /// Points the storage binding at the current primary target.
    pub fn bind(&mut self, device: &wgpu::Device, primary: &GpuTarget) {
        self.output_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tracer_output"),
            layout: &self.output_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&primary.view),
            }],
        }));
    }

    /// Records the dispatch into `pass`. One invocation per pixel.
    pub fn dispatch(&self, pass: &mut wgpu::ComputePass<'_>, size: UVec2) {
        let Some(output_group) = &self.output_group else {
            return;
        };

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.scene_group, &[]);
        pass.set_bind_group(1, output_group, &[]);
        pass.set_bind_group(2, &self.texture_group, &[]);
        pass.dispatch_workgroups(size.x.div_ceil(WORKGROUP_SIZE), size.y.div_ceil(WORKGROUP_SIZE), 1);
    }
}

fn rgba8(image: &HdrImage) -> Vec<u8> {
    image.to_rgba8().into_raw()
}

fn upload_textures(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    textures: &SceneTextures,
) -> (wgpu::BindGroupLayout, wgpu::BindGroup) {
    let create = |label, size: UVec2, layers: u32| {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        })
    };

    let write = |texture: &wgpu::Texture, layer: u32, image: &HdrImage| {
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            &rgba8(image),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(image.width() * 4),
                rows_per_image: Some(image.height()),
            },
            wgpu::Extent3d {
                width: image.width(),
                height: image.height(),
                depth_or_array_layers: 1,
            },
        );
    };

    let sky_size = UVec2::splat(textures.skybox.size());
    let skybox = create("skybox", sky_size, 6);
    for (layer, face) in textures.skybox.faces().iter().enumerate() {
        write(&skybox, layer as u32, face);
    }

    // an empty array still needs one layer to bind
    let planets = create("planet_textures", PLANET_TEXTURE_SIZE, textures.planets.len().max(1) as u32);
    for (layer, image) in textures.planets.iter().enumerate() {
        write(&planets, layer as u32, image);
    }

    let smoke = create("smoke", textures.smoke.resolution(), 1);
    write(&smoke, 0, &textures.smoke);

    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("tracer_sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    let texture_entry = |binding, view_dimension| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension,
            multisampled: false,
        },
        count: None,
    };

    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("tracer_texture_layout"),
        entries: &[
            texture_entry(0, wgpu::TextureViewDimension::Cube),
            texture_entry(1, wgpu::TextureViewDimension::D2Array),
            texture_entry(2, wgpu::TextureViewDimension::D2),
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let view = |texture: &wgpu::Texture, dimension| {
        texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(dimension),
            ..Default::default()
        })
    };

    let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("tracer_textures"),
        layout: &layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view(&skybox, wgpu::TextureViewDimension::Cube)),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&view(&planets, wgpu::TextureViewDimension::D2Array)),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&view(&smoke, wgpu::TextureViewDimension::D2)),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
    });

    (layout, group)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use glam::Mat4;

    use super::*;
    use crate::{
        physics::{default_bodies, AccretionDisk, BlackHole},
        types::{BlackHoleBlock, CameraBlock, DiskBlock, TracerBlock},
    };

    fn textures() -> SceneTextures {
        SceneTextures::procedural()
    }

    fn store(position: Vec3, flags: u32) -> SceneStore {
        let hole = BlackHole::with_solar_masses(5.0, 0.0001016);
        let mut store = SceneStore::new();

        store.set_camera(CameraBlock::new(
            Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y),
            Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 10000.0),
            position,
        ));
        store.set_black_hole(BlackHoleBlock::new(&hole, 0));
        store.set_disk(DiskBlock::new(&AccretionDisk::around(&hole, Vec3::new(1.0, 0.5, 0.1)), flags));
        store.set_orbiting_bodies(&default_bodies(&hole));
        store.set_time(0.0);
        store.set_tracer(TracerBlock {
            step_size: 0.1,
            max_steps: 4096,
            escape_radius: 120.0,
            epsilon: 1e-6,
        });
        store
    }

    #[test]
    fn image_center_is_the_shadow() {
        let store = store(Vec3::new(0.0, 0.0, 30.0), 0);
        let mut image = HdrImage::black(UVec2::new(9, 9));
        trace_image(&store, &textures(), &mut image);

        assert_eq!(image.get(4, 4), [0.0, 0.0, 0.0, 1.0]);
        // corners see the sky, never pure black
        assert!(image.get(0, 0)[2] > 0.0);
    }

    #[test]
    fn elevated_view_sees_the_flat_disk() {
        let store = store(Vec3::new(0.0, 12.0, 20.0), 0);
        let mut image = HdrImage::black(UVec2::new(48, 48));
        trace_image(&store, &textures(), &mut image);

        let disk = [1.0, 0.5, 0.1, 1.0];
        assert!(image.pixels().iter().any(|p| *p == disk));
    }

    #[test]
    fn tracing_is_deterministic() {
        let store = store(Vec3::new(3.0, 4.0, 25.0), DISK_BEAMING);
        let mut a = HdrImage::black(UVec2::new(24, 16));
        let mut b = HdrImage::black(UVec2::new(24, 16));

        trace_image(&store, &textures(), &mut a);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        pool.install(|| trace_image(&store, &textures(), &mut b));

        assert_eq!(a, b);
    }

    #[test]
    fn approaching_side_is_brighter() {
        let offset = Vec3::new(6.0, 0.0, 0.0);
        let tangent = Vec3::Y.cross(offset).normalize();

        let toward = doppler_boost(offset, -tangent, 0.75);
        let away = doppler_boost(offset, tangent, 0.75);
        assert!(toward > 1.0 && away < 1.0);
        assert_abs_diff_eq!(doppler_boost(offset, Vec3::Y, 0.0), 1.0);
    }

    #[test]
    fn sphere_uv_covers_the_texture() {
        let side = sphere_uv(Vec3::X);
        assert_abs_diff_eq!(side.x, 0.5);
        assert_abs_diff_eq!(side.y, 0.5);
        assert_abs_diff_eq!(sphere_uv(Vec3::Y).y, 0.0);
        assert_abs_diff_eq!(sphere_uv(Vec3::NEG_Y).y, 1.0);
    }
}
