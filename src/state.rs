use tracing::{debug, info};

use crate::error::{Error, Result};

/// Device and queue shared by every pipeline.
pub struct State {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl State {
    pub async fn new(instance: &wgpu::Instance, compatible_surface: Option<&wgpu::Surface<'_>>) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface,
            })
            .await
            .ok_or(Error::Adapter)?;

        let info = adapter.get_info();
        info!(name = %info.name, backend = ?info.backend, "selected adapter");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("lensing_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        Ok(Self { adapter, device, queue })
    }

    /// Runs `build` inside a validation error scope so a bad shader or
    /// pipeline surfaces as [`Error::Shader`] instead of a panic later on.
    pub fn validated<T>(&self, name: &'static str, build: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let built = build(&self.device);

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(Error::Shader {
                name,
                message: error.to_string(),
            }),
            None => {
                debug!(name, "built");
                Ok(built)
            },
        }
    }

    pub fn create_shader(&self, name: &'static str, source: wgpu::ShaderModuleDescriptor) -> Result<wgpu::ShaderModule> {
        self.validated(name, |device| device.create_shader_module(source))
    }
}

/// Window swapchain.
pub struct SurfaceState {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

impl SurfaceState {
    pub fn new(state: &State, surface: wgpu::Surface<'static>, width: u32, height: u32) -> Result<Self> {
        let capabilities = surface.get_capabilities(&state.adapter);

        // the composite writes linear values, so prefer a non-sRGB format
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| Error::Surface("surface reports no texture formats".into()))?;

        let alpha_mode = capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };

        surface.configure(&state.device, &config);
        info!(?format, width = config.width, height = config.height, "configured surface");

        Ok(Self { surface, config })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.config.width = width;
        self.config.height = height;
        self.surface.configure(device, &self.config);
    }

    pub fn reconfigure(&self, device: &wgpu::Device) {
        self.surface.configure(device, &self.config);
    }
}
