//! Bright-pass, separable Gaussian ping-pong blur and additive composite.
//!
//! The pass order is the same on both backends: [`schedule`] yields the blur
//! passes, the CPU functions below run them on host images and
//! [`BloomPipeline`] records them as full-screen draws.

use glam::IVec2;
use rayon::prelude::*;

use crate::{
    image::HdrImage,
    targets::{GpuTarget, RenderTargets, TARGET_FORMAT},
    types::BloomParams,
};

/// Center tap first, then one side. Mirrored, the nine taps sum to 1.
pub const WEIGHTS: [f32; 5] = [0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomSettings {
    pub threshold: f32,
    pub strength: f32,
    pub passes: u32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            strength: 0.3,
            passes: 8,
        }
    }
}

impl BloomSettings {
    fn params(&self, direction: [f32; 2]) -> BloomParams {
        BloomParams {
            direction,
            threshold: self.threshold,
            strength: self.strength,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurSource {
    Bright,
    Ping(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurPass {
    pub source: BlurSource,
    pub target: usize,
    pub horizontal: bool,
}

impl BlurPass {
    pub fn direction(&self) -> IVec2 {
        if self.horizontal {
            IVec2::X
        } else {
            IVec2::Y
        }
    }
}

/// Ping-pong position: which way the next pass blurs, and whether it is the
/// first one (which reads the bright-pass image instead of a ping buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurState {
    pub horizontal: bool,
    pub first: bool,
}

impl Default for BlurState {
    fn default() -> Self {
        Self {
            horizontal: true,
            first: true,
        }
    }
}

impl BlurState {
    pub fn pass(self) -> BlurPass {
        let target = self.horizontal as usize;

        BlurPass {
            source: if self.first {
                BlurSource::Bright
            } else {
                BlurSource::Ping(1 - target)
            },
            target,
            horizontal: self.horizontal,
        }
    }

    pub fn next(self) -> Self {
        Self {
            horizontal: !self.horizontal,
            first: false,
        }
    }
}

pub fn schedule(passes: u32) -> impl Iterator<Item = BlurPass> {
    std::iter::successors(Some(BlurState::default()), |state| Some(state.next()))
        .take(passes as usize)
        .map(BlurState::pass)
}

/// Ping buffer holding the finished blur after `passes` passes.
pub fn blurred_index(passes: u32) -> usize {
    schedule(passes).last().map_or(0, |pass| pass.target)
}

fn max_channel(pixel: [f32; 4]) -> f32 {
    pixel[0].max(pixel[1]).max(pixel[2])
}

/// Keeps pixels whose brightest channel exceeds `threshold`, zeroes the rest.
pub fn extract(source: &HdrImage, threshold: f32, target: &mut HdrImage) {
    target
        .pixels_mut()
        .par_iter_mut()
        .zip(source.pixels().par_iter())
        .for_each(|(dst, src)| {
            *dst = if max_channel(*src) > threshold {
                [src[0], src[1], src[2], 1.0]
            } else {
                [0.0; 4]
            };
        });
}

/// One 9-tap Gaussian pass along `direction`, edges clamped.
pub fn blur(source: &HdrImage, direction: IVec2, target: &mut HdrImage) {
    let width = source.width().max(1) as usize;

    target
        .pixels_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, dst) in row.iter_mut().enumerate() {
                let (x, y) = (x as i64, y as i64);
                let mut sum = [0.0f32; 4];

                for (i, weight) in WEIGHTS.iter().enumerate() {
                    let offsets: &[i64] = if i == 0 { &[0] } else { &[i as i64, -(i as i64)] };

                    for offset in offsets {
                        let texel = source.get_clamped(
                            x + offset * direction.x as i64,
                            y + offset * direction.y as i64,
                        );
                        for c in 0..4 {
                            sum[c] += texel[c] * weight;
                        }
                    }
                }

                *dst = sum;
            }
        });
}

/// `primary + strength · bloom`, primary alpha kept.
pub fn composite(primary: &HdrImage, bloom: &HdrImage, strength: f32, target: &mut HdrImage) {
    target
        .pixels_mut()
        .par_iter_mut()
        .zip(primary.pixels().par_iter().zip(bloom.pixels().par_iter()))
        .for_each(|(dst, (p, b))| {
            *dst = [
                p[0] + strength * b[0],
                p[1] + strength * b[1],
                p[2] + strength * b[2],
                p[3],
            ];
        });
}

/// Render pipelines and bind groups for the three bloom stages.
pub struct BloomPipeline {
    layout: wgpu::BindGroupLayout,
    extract: wgpu::RenderPipeline,
    blur: wgpu::RenderPipeline,
    composite: wgpu::RenderPipeline,
    horizontal_params: wgpu::Buffer,
    vertical_params: wgpu::Buffer,
    bindings: Option<BloomBindings>,
}

struct BloomBindings {
    extract: wgpu::BindGroup,
    /// Indexed by source (bright, ping 0, ping 1) then direction (h, v).
    blur: [[wgpu::BindGroup; 2]; 3],
    /// Indexed by the ping buffer holding the blur result.
    composite: [wgpu::BindGroup; 2],
}

impl BloomPipeline {
    pub fn new(device: &wgpu::Device, shader: &wgpu::ShaderModule, output_format: wgpu::TextureFormat) -> Self {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bloom_layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZero::new(std::mem::size_of::<BloomParams>() as u64),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("bloom_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = |label, entry_point, format| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vertex"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some(entry_point),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let target_format = TARGET_FORMAT;
        let params_buffer = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: std::mem::size_of::<BloomParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        Self {
            extract: pipeline("bloom_extract", "extract", target_format),
            blur: pipeline("bloom_blur", "blur", target_format),
            composite: pipeline("bloom_composite", "composite", output_format),
            horizontal_params: params_buffer("bloom_params_h"),
            vertical_params: params_buffer("bloom_params_v"),
            layout,
            bindings: None,
        }
    }

    pub fn write_settings(&self, queue: &wgpu::Queue, settings: &BloomSettings) {
        queue.write_buffer(
            &self.horizontal_params,
            0,
            bytemuck::bytes_of(&settings.params([1.0, 0.0])),
        );
        queue.write_buffer(&self.vertical_params, 0, bytemuck::bytes_of(&settings.params([0.0, 1.0])));
    }

    /// Rebuilds every bind group against `targets`. Call after each resize.
    pub fn bind(&mut self, device: &wgpu::Device, targets: &RenderTargets<GpuTarget>) {
        let group = |label, a: &wgpu::TextureView, b: &wgpu::TextureView, params: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(a),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(b),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };

        let sources = [&targets.bright.view, &targets.ping[0].view, &targets.ping[1].view];
        let blur = sources.map(|view| {
            [
                group("bloom_blur_h", view, view, &self.horizontal_params),
                group("bloom_blur_v", view, view, &self.vertical_params),
            ]
        });

        let primary = &targets.primary.view;
        self.bindings = Some(BloomBindings {
            extract: group("bloom_extract", primary, primary, &self.horizontal_params),
            blur,
            composite: [
                group("bloom_composite_0", primary, &targets.ping[0].view, &self.horizontal_params),
                group("bloom_composite_1", primary, &targets.ping[1].view, &self.horizontal_params),
            ],
        });
    }

    fn draw(
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        target: &wgpu::TextureView,
        pipeline: &wgpu::RenderPipeline,
        group: &wgpu::BindGroup,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, group, &[]);
        pass.draw(0..3, 0..1);
    }

    pub fn record_extract(&self, encoder: &mut wgpu::CommandEncoder, targets: &RenderTargets<GpuTarget>) {
        if let Some(bindings) = &self.bindings {
            Self::draw(encoder, "bloom_extract", &targets.bright.view, &self.extract, &bindings.extract);
        }
    }

    pub fn record_blur(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RenderTargets<GpuTarget>,
        pass: BlurPass,
    ) {
        if let Some(bindings) = &self.bindings {
            let source = match pass.source {
                BlurSource::Bright => 0,
                BlurSource::Ping(index) => 1 + index,
            };
            let group = &bindings.blur[source][!pass.horizontal as usize];

            Self::draw(encoder, "bloom_blur", &targets.ping[pass.target].view, &self.blur, group);
        }
    }

    pub fn record_composite(&self, encoder: &mut wgpu::CommandEncoder, output: &wgpu::TextureView, blurred: usize) {
        if let Some(bindings) = &self.bindings {
            Self::draw(encoder, "bloom_composite", output, &self.composite, &bindings.composite[blurred]);
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use glam::UVec2;

    use super::*;

    fn noisy(size: UVec2, seed: u64) -> HdrImage {
        let mut rng = fastrand::Rng::with_seed(seed);
        let pixels = (0..size.x * size.y)
            .map(|_| [rng.f32() * 3.0, rng.f32(), rng.f32() * 0.99, 1.0])
            .collect();
        HdrImage::from_pixels(size, pixels).unwrap()
    }

    fn run(primary: &HdrImage, settings: BloomSettings) -> HdrImage {
        let size = primary.resolution();
        let mut bright = HdrImage::black(size);
        let mut ping = [HdrImage::black(size), HdrImage::black(size)];
        let mut out = HdrImage::black(size);

        extract(primary, settings.threshold, &mut bright);
        for pass in schedule(settings.passes) {
            let source = match pass.source {
                BlurSource::Bright => bright.clone(),
                BlurSource::Ping(i) => ping[i].clone(),
            };
            blur(&source, pass.direction(), &mut ping[pass.target]);
        }
        composite(primary, &ping[blurred_index(settings.passes)], settings.strength, &mut out);
        out
    }

    #[test]
    fn zero_strength_is_exact_passthrough() {
        let primary = noisy(UVec2::new(13, 7), 1);
        let out = run(
            &primary,
            BloomSettings {
                strength: 0.0,
                ..Default::default()
            },
        );

        assert_eq!(out, primary);
    }

    #[test]
    fn max_threshold_extracts_nothing_below_one() {
        let mut rng = fastrand::Rng::with_seed(2);
        let size = UVec2::new(9, 9);
        let pixels = (0..81).map(|_| [rng.f32() * 0.999, rng.f32() * 0.999, rng.f32() * 0.999, 1.0]).collect();
        let source = HdrImage::from_pixels(size, pixels).unwrap();

        let mut bright = noisy(size, 3);
        extract(&source, 1.0, &mut bright);
        assert!(bright.pixels().iter().all(|p| *p == [0.0; 4]));
    }

    #[test]
    fn blur_preserves_flat_images() {
        let flat = HdrImage::new_fill(UVec2::new(6, 5), [0.5, 0.25, 1.0, 1.0]);
        let mut out = HdrImage::black(flat.resolution());

        for direction in [IVec2::X, IVec2::Y] {
            blur(&flat, direction, &mut out);
            for pixel in out.pixels() {
                assert_abs_diff_eq!(pixel[0], 0.5, epsilon = 1e-5);
                assert_abs_diff_eq!(pixel[2], 1.0, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn ping_pong_schedule() {
        let passes: Vec<_> = schedule(8).collect();
        assert_eq!(passes.len(), 8);

        assert_eq!(passes[0].source, BlurSource::Bright);
        assert_eq!(passes[0].direction(), IVec2::X);

        for pair in passes.windows(2) {
            assert_ne!(pair[0].horizontal, pair[1].horizontal);
            assert_eq!(pair[1].source, BlurSource::Ping(pair[0].target));
            assert_ne!(pair[1].target, pair[0].target);
        }

        assert_eq!(blurred_index(8), passes[7].target);
        assert_eq!(blurred_index(8), 0);
        assert_eq!(blurred_index(1), 1);
    }

    #[test]
    fn blur_spreads_a_point() {
        let mut point = HdrImage::new_fill(UVec2::new(9, 1), [0.0; 4]);
        point.set(4, 0, [1.0; 4]);
        let mut out = HdrImage::black(point.resolution());

        blur(&point, IVec2::X, &mut out);
        assert_abs_diff_eq!(out.get(4, 0)[0], WEIGHTS[0]);
        assert_abs_diff_eq!(out.get(0, 0)[0], WEIGHTS[4]);
        assert_abs_diff_eq!(out.get(8, 0)[0], WEIGHTS[4]);
    }
}
