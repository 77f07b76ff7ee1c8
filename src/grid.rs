use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;

pub const GRID_COLOR: [f32; 4] = [0.643, 0.643, 0.643, 0.5];

/// Gravity well height at `(x, z)`: a Gaussian dip `1.2 r_s` deep, `2.5 r_s` wide.
pub fn well_height(x: f32, z: f32, horizon: f32) -> f32 {
    let depth = horizon * 1.2;
    let sigma = horizon * 2.5;
    -depth * (-(x * x + z * z) / (2.0 * sigma * sigma)).exp()
}

/// Line-list vertices for a square grid over `[min, max]²` bent by the well.
pub fn well_vertices(min: f32, max: f32, spacing: f32, horizon: f32) -> Vec<[f32; 3]> {
    let cells = ((max - min) / spacing).round().max(0.0) as u32;
    let at = |i: u32| min + i as f32 * spacing;
    let point = |x: f32, z: f32| [x, well_height(x, z, horizon), z];

    let mut vertices = Vec::with_capacity((4 * (cells + 1) * cells) as usize);
    for line in 0..=cells {
        for cell in 0..cells {
            let (a, b) = (at(cell), at(cell + 1));
            let fixed = at(line);

            vertices.push(point(fixed, a));
            vertices.push(point(fixed, b));
            vertices.push(point(a, fixed));
            vertices.push(point(b, fixed));
        }
    }

    vertices
}

#[repr(C)]
#[derive(Pod, Zeroable, Copy, Clone, Debug)]
struct GridUniform {
    view_projection: [f32; 16],
    color: [f32; 4],
}

pub struct GridPipeline {
    pipeline: wgpu::RenderPipeline,
    vertices: wgpu::Buffer,
    vertex_count: u32,
    uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl GridPipeline {
    pub fn new(
        device: &wgpu::Device,
        shader: &wgpu::ShaderModule,
        format: wgpu::TextureFormat,
        horizon: f32,
    ) -> Self {
        let mesh = well_vertices(-50.0, 50.0, 1.0, horizon);

        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("grid_vertices"),
            contents: bytemuck::cast_slice(&mesh),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("grid_uniform"),
            size: std::mem::size_of::<GridUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("grid_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZero::new(std::mem::size_of::<GridUniform>() as u64),
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("grid_bind_group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("grid_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("grid_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vertex"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x3],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fragment"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            vertices,
            vertex_count: mesh.len() as u32,
            uniform,
            bind_group,
        }
    }

    pub fn write_camera(&self, queue: &wgpu::Queue, view: Mat4, projection: Mat4) {
        let uniform = GridUniform {
            view_projection: (projection * view).to_cols_array(),
            color: GRID_COLOR,
        };
        queue.write_buffer(&self.uniform, 0, bytemuck::bytes_of(&uniform));
    }

    /// Draws over whatever `pass` already holds.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertices.slice(..));
        pass.draw(0..self.vertex_count, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn depth_scales_with_horizon() {
        for horizon in [0.5, 1.5003, 4.0] {
            assert_abs_diff_eq!(well_height(0.0, 0.0, horizon), -1.2 * horizon, epsilon = 1e-6);

            let sigma = 2.5 * horizon;
            let at_sigma = well_height(sigma, 0.0, horizon);
            assert_abs_diff_eq!(at_sigma, -1.2 * horizon * (-0.5f32).exp(), epsilon = 1e-5);
        }
    }

    #[test]
    fn grid_covers_the_square() {
        let vertices = well_vertices(-50.0, 50.0, 1.0, 1.5);
        assert_eq!(vertices.len(), 4 * 101 * 100);

        let (min_x, max_x) = vertices
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v[0]), hi.max(v[0])));
        assert_eq!((min_x, max_x), (-50.0, 50.0));

        // edges are flat, the center dips
        assert!(vertices.iter().all(|v| v[1] <= 0.0 && v[1] >= -1.2 * 1.5 - 1e-6));
        assert_abs_diff_eq!(well_height(50.0, 50.0, 1.5), 0.0, epsilon = 1e-6);
    }
}
