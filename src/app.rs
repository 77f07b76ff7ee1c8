use std::{sync::Arc, time::Instant};

use egui_wgpu::ScreenDescriptor;
use tracing::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::KeyCode,
    window::{Window, WindowId},
};

use crate::{
    assets::SceneTextures,
    camera::Camera,
    config::Config,
    error::{Error, Result},
    frame::{FrameInput, Orchestrator},
    gui::{debug_lines, draw_debug_text, FpsCounter, GuiRenderer},
    input::{InputManager, Toggles},
    physics::BlackHole,
    render::{FrameTarget, GpuFrame, Renderer},
    state::{State, SurfaceState},
};

/// Window-bound resources, created once the event loop resumes.
struct Viewer {
    window: Arc<Window>,
    surface: SurfaceState,
    renderer: Renderer,
    gui: GuiRenderer,
}

pub struct App {
    config: Config,
    textures: SceneTextures,
    hole: BlackHole,
    instance: wgpu::Instance,
    viewer: Option<Viewer>,
    input: InputManager,
    toggles: Toggles,
    camera: Camera,
    orchestrator: Orchestrator,
    fps: FpsCounter,
    started: Instant,
    last_frame: Instant,
    failure: Option<Error>,
}

impl App {
    pub fn new(config: Config, textures: SceneTextures) -> Self {
        let orchestrator = Orchestrator::new(&config, textures.planets.len());

        Self {
            hole: config.black_hole(),
            toggles: Toggles {
                grid: config.show_grid,
                debug_text: config.show_debug_text,
                orbit: false,
            },
            instance: wgpu::Instance::new(wgpu::InstanceDescriptor::default()),
            viewer: None,
            input: InputManager::new(),
            camera: Camera::default(),
            orchestrator,
            fps: FpsCounter::new(60),
            started: Instant::now(),
            last_frame: Instant::now(),
            failure: None,
            config,
            textures,
        }
    }

    /// Startup error that stopped the event loop, if any.
    pub fn take_failure(&mut self) -> Option<Error> {
        self.failure.take()
    }

    async fn set_window(&mut self, window: Window) -> Result<()> {
        let window = Arc::new(window);
        let _ = window.request_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let surface = self
            .instance
            .create_surface(window.clone())
            .map_err(|err| Error::Surface(err.to_string()))?;

        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));

        let state = State::new(&self.instance, Some(&surface)).await?;
        let surface = SurfaceState::new(&state, surface, width, height)?;
        let gui = GuiRenderer::new(&state.device, surface.format(), &window);
        let renderer = Renderer::new(
            state,
            &self.textures,
            self.orchestrator.bloom(),
            self.hole.radius(),
            surface.format(),
            width,
            height,
        )?;

        self.viewer = Some(Viewer {
            window,
            surface,
            renderer,
            gui,
        });

        Ok(())
    }

    fn handle_resized(&mut self, width: u32, height: u32) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };

        if width > 0 && height > 0 {
            viewer.surface.resize(&viewer.renderer.state().device, width, height);
            viewer.renderer.resize(width, height);
        }
    }

    fn handle_redraw(&mut self) -> std::result::Result<(), wgpu::SurfaceError> {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.fps.record(dt);

        self.toggles.update(&self.input);
        self.camera.set_mode(self.toggles.camera_mode());
        self.camera.update(&self.input, dt);
        self.input.step();

        let Some(Viewer {
            window,
            surface,
            renderer,
            gui,
        }) = self.viewer.as_mut()
        else {
            return Ok(());
        };

        if window.is_minimized().unwrap_or(false) {
            return Ok(());
        }

        let surface_texture = surface.surface.get_current_texture()?;

        let size = renderer.size();
        let input = FrameInput {
            camera: self.camera.block(size.x, size.y),
            wall_seconds: self.started.elapsed().as_secs_f64(),
        };

        let screen = ScreenDescriptor {
            size_in_pixels: [surface.config.width, surface.config.height],
            pixels_per_point: window.scale_factor() as f32,
        };
        let lines = self
            .toggles
            .debug_text
            .then(|| debug_lines(self.camera.position, &self.hole, self.fps.fps(), self.toggles.grid));
        let window: &Window = window;

        let overlay = Box::new(move |state: &State, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView| {
            let primitives = gui.prepare(&state.device, &state.queue, window, encoder, &screen, |ctx| {
                if let Some(lines) = &lines {
                    draw_debug_text(ctx, lines);
                }
            });
            gui.render(encoder, view, &primitives, &screen);
        });

        let mut frame =
            GpuFrame::new(renderer, FrameTarget::Surface(surface_texture), self.toggles.grid).with_overlay(overlay);

        if let Err(err) = self.orchestrator.run_frame(&mut frame, input) {
            error!(%err, "frame failed");
        }

        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("lensing")
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let result = match event_loop.create_window(attributes) {
            Ok(window) => pollster::block_on(self.set_window(window)),
            Err(err) => Err(Error::Surface(err.to_string())),
        };

        match result {
            Ok(()) => {
                info!("viewer ready");
                self.started = Instant::now();
                self.last_frame = self.started;
                if let Some(viewer) = &self.viewer {
                    viewer.window.request_redraw();
                }
            },
            Err(err) => {
                self.failure = Some(err);
                event_loop.exit();
            },
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        self.input.process_device_event(&event);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let consumed = match self.viewer.as_mut() {
            Some(viewer) => viewer.gui.handle_input(&viewer.window, &event),
            None => false,
        };
        if !consumed {
            self.input.process_window_event(&event);
        }

        if self.input.key_held(KeyCode::Escape) {
            event_loop.exit();
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            },
            WindowEvent::RedrawRequested => {
                match self.handle_redraw() {
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        if let Some(viewer) = &self.viewer {
                            viewer.surface.reconfigure(&viewer.renderer.state().device);
                        }
                    },
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        error!("surface out of memory");
                        event_loop.exit();
                    },
                    Err(err) => warn!(%err, "dropped frame"),
                    Ok(()) => (),
                }

                if let Some(viewer) = &self.viewer {
                    viewer.window.request_redraw();
                }
            },
            WindowEvent::Resized(size) => {
                self.handle_resized(size.width, size.height);
            },
            _ => (),
        }
    }
}
