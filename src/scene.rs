//! CPU copies of every block the tracer reads, plus the bookkeeping that
//! decides which of them must be uploaded before the next dispatch.

use bitflags::bitflags;

use crate::{
    physics::OrbitingBody,
    types::{
        BlackHoleBlock, CameraBlock, DiskBlock, PlanetBlock, SceneBinding, TimeBlock, TracerBlock, MAX_PLANETS,
    },
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Blocks: u32 {
        const CAMERA = 1;
        const BLACK_HOLE = 1 << 1;
        const DISK = 1 << 2;
        const PLANETS = 1 << 3;
        const TIME = 1 << 4;
        const TRACER = 1 << 5;
    }
}

impl Blocks {
    const SLOTS: [(Blocks, SceneBinding); 6] = [
        (Blocks::CAMERA, SceneBinding::Camera),
        (Blocks::BLACK_HOLE, SceneBinding::BlackHole),
        (Blocks::DISK, SceneBinding::Disk),
        (Blocks::PLANETS, SceneBinding::Planets),
        (Blocks::TIME, SceneBinding::Time),
        (Blocks::TRACER, SceneBinding::Tracer),
    ];

    /// Binding slot of a single-flag value.
    pub fn binding(self) -> Option<SceneBinding> {
        Self::SLOTS
            .iter()
            .find(|(block, _)| *block == self)
            .map(|(_, binding)| *binding)
    }
}

/// Destination for flushed blocks, keyed by binding slot.
pub trait BlockSink {
    fn write_block(&mut self, binding: SceneBinding, bytes: &[u8]);
}

#[derive(Debug, Clone)]
pub struct SceneStore {
    camera: CameraBlock,
    black_hole: BlackHoleBlock,
    disk: DiskBlock,
    planets: [PlanetBlock; MAX_PLANETS],
    time: TimeBlock,
    tracer: TracerBlock,
    dirty: Blocks,
    written: Blocks,
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneStore {
    pub fn new() -> Self {
        Self {
            camera: bytemuck::Zeroable::zeroed(),
            black_hole: bytemuck::Zeroable::zeroed(),
            disk: bytemuck::Zeroable::zeroed(),
            planets: bytemuck::Zeroable::zeroed(),
            time: bytemuck::Zeroable::zeroed(),
            tracer: bytemuck::Zeroable::zeroed(),
            dirty: Blocks::empty(),
            written: Blocks::empty(),
        }
    }

    pub fn set_camera(&mut self, camera: CameraBlock) {
        self.camera = camera;
        self.dirty |= Blocks::CAMERA;
    }

    pub fn set_black_hole(&mut self, black_hole: BlackHoleBlock) {
        self.black_hole = black_hole;
        self.dirty |= Blocks::BLACK_HOLE;
    }

    pub fn set_disk(&mut self, disk: DiskBlock) {
        self.disk = disk;
        self.dirty |= Blocks::DISK;
    }

    /// Bodies past the buffer capacity are dropped.
    pub fn set_orbiting_bodies(&mut self, bodies: &[OrbitingBody]) {
        let count = bodies.len().min(MAX_PLANETS);
        if bodies.len() > MAX_PLANETS {
            tracing::warn!(count = bodies.len(), capacity = MAX_PLANETS, "too many planets, extra dropped");
        }

        self.planets = bytemuck::Zeroable::zeroed();
        for (slot, body) in self.planets.iter_mut().zip(&bodies[..count]) {
            *slot = PlanetBlock::from(body);
        }

        self.time.planet_count = count as u32;
        self.dirty |= Blocks::PLANETS | Blocks::TIME;
    }

    pub fn set_time(&mut self, time: f32) {
        self.time.time = time;
        self.dirty |= Blocks::TIME;
    }

    pub fn set_tracer(&mut self, tracer: TracerBlock) {
        self.tracer = tracer;
        self.dirty |= Blocks::TRACER;
    }

    pub fn camera(&self) -> &CameraBlock {
        &self.camera
    }

    pub fn black_hole(&self) -> &BlackHoleBlock {
        &self.black_hole
    }

    pub fn disk(&self) -> &DiskBlock {
        &self.disk
    }

    pub fn planets(&self) -> &[PlanetBlock] {
        &self.planets[..self.time.planet_count as usize]
    }

    pub fn time(&self) -> &TimeBlock {
        &self.time
    }

    pub fn tracer(&self) -> &TracerBlock {
        &self.tracer
    }

    pub fn dirty(&self) -> Blocks {
        self.dirty
    }

    fn bytes(&self, binding: SceneBinding) -> &[u8] {
        match binding {
            SceneBinding::Camera => bytemuck::bytes_of(&self.camera),
            SceneBinding::BlackHole => bytemuck::bytes_of(&self.black_hole),
            SceneBinding::Disk => bytemuck::bytes_of(&self.disk),
            SceneBinding::Planets => bytemuck::cast_slice(&self.planets),
            SceneBinding::Time => bytemuck::bytes_of(&self.time),
            SceneBinding::Tracer => bytemuck::bytes_of(&self.tracer),
        }
    }

    /// Writes every dirty block to `sink` and clears the dirty set. Returns
    /// the blocks that were written.
    pub fn flush(&mut self, sink: &mut impl BlockSink) -> Blocks {
        let flushed = self.dirty;

        for block in flushed.iter() {
            if let Some(binding) = block.binding() {
                sink.write_block(binding, self.bytes(binding));
            }
        }

        self.written |= flushed;
        self.dirty = Blocks::empty();
        flushed
    }

    /// Every block has reached the GPU at least once and nothing is pending.
    pub fn ready_for_dispatch(&self) -> bool {
        self.written.is_all() && self.dirty.is_empty()
    }
}

/// GPU buffers for the scene bind group, one per binding slot.
pub struct SceneBuffers<'a> {
    pub queue: &'a wgpu::Queue,
    pub buffers: &'a SceneBufferSet,
}

impl BlockSink for SceneBuffers<'_> {
    fn write_block(&mut self, binding: SceneBinding, bytes: &[u8]) {
        self.queue.write_buffer(self.buffers.get(binding), 0, bytes);
    }
}

/// Resolved-once table from binding slot to buffer.
pub struct SceneBufferSet {
    buffers: Vec<(SceneBinding, wgpu::Buffer)>,
}

impl SceneBufferSet {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffers = SceneBinding::ALL
            .into_iter()
            .map(|binding| {
                let usage = if binding.is_storage() {
                    wgpu::BufferUsages::STORAGE
                } else {
                    wgpu::BufferUsages::UNIFORM
                };

                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(binding.label()),
                    size: binding.size() as u64,
                    usage: usage | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });

                (binding, buffer)
            })
            .collect();

        Self { buffers }
    }

    pub fn get(&self, binding: SceneBinding) -> &wgpu::Buffer {
        // ALL lists every variant in slot order
        &self.buffers[binding.slot() as usize].1
    }

    pub fn entries(&self) -> impl Iterator<Item = wgpu::BindGroupEntry<'_>> {
        self.buffers.iter().map(|(binding, buffer)| wgpu::BindGroupEntry {
            binding: binding.slot(),
            resource: buffer.as_entire_binding(),
        })
    }
}
