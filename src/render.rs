use glam::UVec2;
use tracing::info;

use crate::{
    assets::SceneTextures,
    bloom::{BloomPipeline, BloomSettings, BlurPass},
    error::{Error, Result},
    frame::{FrameBackend, FrameInput, Orchestrator},
    grid::GridPipeline,
    scene::{Blocks, SceneBufferSet, SceneBuffers, SceneStore},
    state::State,
    targets::{GpuTarget, RenderTargets},
    tracer::TracerPipeline,
};

/// Format of the offscreen image written by headless renders.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Every GPU resource the frame touches, built once and rebound on resize.
pub struct Renderer {
    state: State,
    buffers: SceneBufferSet,
    targets: RenderTargets<GpuTarget>,
    tracer: TracerPipeline,
    bloom: BloomPipeline,
    grid: GridPipeline,
}

impl Renderer {
    pub fn new(
        state: State,
        textures: &SceneTextures,
        bloom: &BloomSettings,
        horizon: f32,
        output_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let geodesic = state.create_shader("geodesic", wgpu::include_wgsl!("geodesic.wgsl"))?;
        let bloom_shader = state.create_shader("bloom", wgpu::include_wgsl!("bloom.wgsl"))?;
        let grid_shader = state.create_shader("grid", wgpu::include_wgsl!("grid.wgsl"))?;

        let buffers = SceneBufferSet::new(&state.device);
        let mut tracer = state.validated("tracer_pipeline", |device| {
            TracerPipeline::new(device, &state.queue, &geodesic, &buffers, textures)
        })?;
        let mut bloom_pipeline = state.validated("bloom_pipeline", |device| {
            BloomPipeline::new(device, &bloom_shader, output_format)
        })?;
        let grid = state.validated("grid_pipeline", |device| {
            GridPipeline::new(device, &grid_shader, output_format, horizon)
        })?;

        let targets = RenderTargets::allocate(&state.device, width, height);
        tracer.bind(&state.device, &targets.primary);
        bloom_pipeline.bind(&state.device, &targets);
        bloom_pipeline.write_settings(&state.queue, bloom);

        Ok(Self {
            state,
            buffers,
            targets,
            tracer,
            bloom: bloom_pipeline,
            grid,
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn size(&self) -> UVec2 {
        self.targets.size()
    }

    /// Reallocates all render targets together and rebinds them.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if !self.targets.resize(&self.state.device, width, height) {
            return false;
        }

        self.tracer.bind(&self.state.device, &self.targets.primary);
        self.bloom.bind(&self.state.device, &self.targets);
        info!(width, height, "resized render targets");
        true
    }

    /// Renders one frame offscreen and reads it back.
    pub fn render_image(&self, orchestrator: &mut Orchestrator, input: FrameInput) -> Result<image::RgbaImage> {
        let readback = Readback::new(&self.state.device, self.size());
        let mut frame = GpuFrame::new(self, FrameTarget::Offscreen(&readback), false);

        orchestrator.run_frame(&mut frame, input)?;
        readback.read(&self.state)
    }
}

/// Offscreen color target plus the staging buffer it is copied into.
pub struct Readback {
    texture: wgpu::Texture,
    buffer: wgpu::Buffer,
    size: UVec2,
    padded_row: u32,
}

impl Readback {
    pub fn new(device: &wgpu::Device, size: UVec2) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("output_target"),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let padded_row = padded_bytes_per_row(size.x);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output_staging_buffer"),
            size: (padded_row * size.y) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            texture,
            buffer,
            size,
            padded_row,
        }
    }

    fn record_copy(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_row),
                    rows_per_image: Some(self.size.y),
                },
            },
            wgpu::Extent3d {
                width: self.size.x,
                height: self.size.y,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Blocks until the copied frame is mapped and returns it without row padding.
    pub fn read(&self, state: &State) -> Result<image::RgbaImage> {
        let slice = self.buffer.slice(..);
        let (sender, receiver) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = state.device.poll(wgpu::Maintain::Wait);

        pollster::block_on(receiver.recv_async())
            .map_err(|err| Error::Readback(err.to_string()))?
            .map_err(|err| Error::Readback(err.to_string()))?;

        let pixels = {
            let mapped = slice.get_mapped_range();
            unpad_rows(&mapped, self.size.x, self.padded_row)
        };
        self.buffer.unmap();

        image::RgbaImage::from_raw(self.size.x, self.size.y, pixels)
            .ok_or_else(|| Error::Readback("mapped buffer smaller than the image".into()))
    }
}

/// `width · 4` rounded up to the copy row alignment.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    (width * 4).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

pub fn unpad_rows(data: &[u8], width: u32, padded_row: u32) -> Vec<u8> {
    let row = (width * 4) as usize;
    data.chunks(padded_row as usize)
        .flat_map(|chunk| &chunk[..row.min(chunk.len())])
        .copied()
        .collect()
}

pub enum FrameTarget<'a> {
    Surface(wgpu::SurfaceTexture),
    Offscreen(&'a Readback),
}

/// Extra draws recorded onto the output after the grid.
pub type OverlayHook<'a> = Box<dyn FnOnce(&State, &mut wgpu::CommandEncoder, &wgpu::TextureView) + 'a>;

/// One frame recorded into a single command encoder and submitted at
/// [`FrameBackend::present`].
pub struct GpuFrame<'a> {
    renderer: &'a Renderer,
    target: Option<FrameTarget<'a>>,
    output: wgpu::TextureView,
    encoder: Option<wgpu::CommandEncoder>,
    compute: Option<wgpu::ComputePass<'static>>,
    show_grid: bool,
    overlay: Option<OverlayHook<'a>>,
}

impl<'a> GpuFrame<'a> {
    pub fn new(renderer: &'a Renderer, target: FrameTarget<'a>, show_grid: bool) -> Self {
        let output = match &target {
            FrameTarget::Surface(surface) => surface.texture.create_view(&wgpu::TextureViewDescriptor::default()),
            FrameTarget::Offscreen(readback) => readback.texture.create_view(&wgpu::TextureViewDescriptor::default()),
        };

        let encoder = renderer
            .state
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame") });

        Self {
            renderer,
            target: Some(target),
            output,
            encoder: Some(encoder),
            compute: None,
            show_grid,
            overlay: None,
        }
    }

    pub fn with_overlay(mut self, hook: OverlayHook<'a>) -> Self {
        self.overlay = Some(hook);
        self
    }
}

impl FrameBackend for GpuFrame<'_> {
    fn upload(&mut self, store: &mut SceneStore) -> Blocks {
        store.flush(&mut SceneBuffers {
            queue: &self.renderer.state.queue,
            buffers: &self.renderer.buffers,
        })
    }

    fn dispatch_tracer(&mut self, _store: &SceneStore) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };

        let mut pass = encoder
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("tracer"),
                timestamp_writes: None,
            })
            .forget_lifetime();

        self.renderer.tracer.dispatch(&mut pass, self.renderer.size());
        self.compute = Some(pass);
    }

    /// Ends the tracer's compute pass. wgpu orders the storage writes made in
    /// it before every pass recorded after this point.
    fn barrier(&mut self) {
        drop(self.compute.take());
    }

    fn bloom_extract(&mut self, _settings: &BloomSettings) {
        if let Some(encoder) = self.encoder.as_mut() {
            self.renderer.bloom.record_extract(encoder, &self.renderer.targets);
        }
    }

    fn bloom_blur(&mut self, pass: BlurPass) {
        if let Some(encoder) = self.encoder.as_mut() {
            self.renderer.bloom.record_blur(encoder, &self.renderer.targets, pass);
        }
    }

    fn composite(&mut self, blurred: usize, _settings: &BloomSettings) {
        if let Some(encoder) = self.encoder.as_mut() {
            self.renderer.bloom.record_composite(encoder, &self.output, blurred);
        }
    }

    fn overlay(&mut self, store: &SceneStore) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };

        if self.show_grid {
            let camera = store.camera();
            self.renderer
                .grid
                .write_camera(&self.renderer.state.queue, camera.view(), camera.projection());

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("grid"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.output,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.renderer.grid.draw(&mut pass);
        }

        if let Some(hook) = self.overlay.take() {
            hook(&self.renderer.state, encoder, &self.output);
        }
    }

    fn present(&mut self) -> Result<()> {
        self.compute = None;
        let Some(mut encoder) = self.encoder.take() else {
            return Ok(());
        };

        if let Some(FrameTarget::Offscreen(readback)) = &self.target {
            readback.record_copy(&mut encoder);
        }

        self.renderer.state.queue.submit(std::iter::once(encoder.finish()));

        if let Some(FrameTarget::Surface(surface)) = self.target.take() {
            surface.present();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(1360) % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT, 0);
        assert!(padded_bytes_per_row(1360) >= 1360 * 4);
    }

    #[test]
    fn unpadding_drops_row_tails() {
        let (width, padded) = (3, 16);
        let data: Vec<u8> = (0..2 * padded as u8).collect();
        let pixels = unpad_rows(&data, width, padded);

        assert_eq!(pixels.len(), 2 * 12);
        assert_eq!(&pixels[..12], &data[..12]);
        assert_eq!(&pixels[12..], &data[16..28]);
    }
}
