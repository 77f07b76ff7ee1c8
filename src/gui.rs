use egui::{Color32, Context, FontId, RichText};
use egui_wgpu::{Renderer, ScreenDescriptor};
use egui_winit::State;
use glam::Vec3;
use winit::{event::WindowEvent, window::Window};

use crate::physics::BlackHole;

/// egui context and the wgpu renderer that draws it.
pub struct GuiRenderer {
    state: State,
    pub renderer: Renderer,
}

impl GuiRenderer {
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat, window: &Window) -> Self {
        let context = Context::default();
        let max_texture_side = device.limits().max_texture_dimension_2d as usize;

        let state = State::new(
            context,
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(max_texture_side),
        );
        let renderer = Renderer::new(device, output_format, None, 1, false);

        Self { state, renderer }
    }

    /// Returns whether egui consumed the event.
    pub fn handle_input(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    /// Runs `run_ui`, uploads its textures and buffers, and returns the
    /// primitives to pass to [`GuiRenderer::render`].
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        window: &Window,
        encoder: &mut wgpu::CommandEncoder,
        screen: &ScreenDescriptor,
        run_ui: impl FnMut(&Context),
    ) -> Vec<egui::ClippedPrimitive> {
        let input = self.state.take_egui_input(window);
        let output = self.state.egui_ctx().run(input, run_ui);
        self.state.handle_platform_output(window, output.platform_output);

        let primitives = self
            .state
            .egui_ctx()
            .tessellate(output.shapes, output.pixels_per_point);

        for (id, delta) in &output.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        self.renderer
            .update_buffers(device, queue, encoder, &primitives, screen);
        for id in &output.textures_delta.free {
            self.renderer.free_texture(id);
        }

        primitives
    }

    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        primitives: &[egui::ClippedPrimitive],
        screen: &ScreenDescriptor,
    ) {
        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("gui"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
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

        self.renderer
            .render(&mut pass.forget_lifetime(), primitives, screen);
    }
}

/// Lines shown in the debug overlay.
pub fn debug_lines(camera: Vec3, hole: &BlackHole, fps: f32, show_grid: bool) -> Vec<String> {
    vec![
        format!("Camera: ({:.2}, {:.2}, {:.2})", camera.x, camera.y, camera.z),
        format!("Black hole radius: {:.4}", hole.radius()),
        format!("Mass: {:.3e} kg", hole.mass()),
        format!("FPS: {fps:.0}"),
        format!("Scale: {}", hole.scale()),
        format!("Grid: {}", if show_grid { "on" } else { "off" }),
    ]
}

pub fn draw_debug_text(ctx: &Context, lines: &[String]) {
    egui::Area::new(egui::Id::new("debug_text"))
        .fixed_pos(egui::pos2(10.0, 10.0))
        .show(ctx, |ui| {
            for line in lines {
                ui.label(
                    RichText::new(line)
                        .font(FontId::monospace(14.0))
                        .color(Color32::WHITE),
                );
            }
        });
}

/// Frames per second averaged over a sliding window of frame times.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    samples: std::collections::VecDeque<f32>,
    capacity: usize,
}

impl FpsCounter {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: std::collections::VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, dt: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(dt);
    }

    pub fn fps(&self) -> f32 {
        let total: f32 = self.samples.iter().sum();
        if total <= 0.0 {
            0.0
        } else {
            self.samples.len() as f32 / total
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn debug_lines_name_every_quantity() {
        let hole = BlackHole::with_solar_masses(5.0, 0.0001016);
        let lines = debug_lines(Vec3::new(0.0, 0.0, 30.0), &hole, 59.6, false);

        assert_eq!(lines[0], "Camera: (0.00, 0.00, 30.00)");
        assert!(lines[1].starts_with("Black hole radius: 1.500"));
        assert!(lines[2].starts_with("Mass: 9.942e30"));
        assert_eq!(lines[3], "FPS: 60");
        assert_eq!(lines[4], "Scale: 0.0001016");
    }

    #[test]
    fn fps_averages_the_window() {
        let mut counter = FpsCounter::new(4);
        assert_eq!(counter.fps(), 0.0);

        for dt in [0.5, 0.5, 0.02, 0.02, 0.02, 0.02] {
            counter.record(dt);
        }
        assert_relative_eq!(counter.fps(), 50.0, epsilon = 1e-3);
    }
}
