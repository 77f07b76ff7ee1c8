//! Per-frame stage order and the backends that carry it out.
//!
//! Every frame runs the same fixed sequence:
//!
//! ```text
//! UpdateOrbits → UploadSceneState → DispatchTracer → Barrier
//!     → BloomExtract → BloomBlur × N → Composite → Overlay → Present
//! ```
//!
//! [`Orchestrator`] owns the scene and walks the sequence; a [`FrameBackend`]
//! does the work of each stage, either on the GPU (`render::GpuFrame`) or on
//! the host ([`HostFrame`]).

use tracing::{debug, trace};

use crate::{
    assets::SceneTextures,
    bloom::{self, BloomSettings, BlurPass, BlurSource},
    config::Config,
    error::Result,
    image::HdrImage,
    physics::{self, default_bodies, OrbitingBody, SimClock},
    scene::{Blocks, BlockSink, SceneStore},
    targets::{HostAllocator, RenderTargets},
    tracer,
    types::{BlackHoleBlock, CameraBlock, DiskBlock, SceneBinding},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    UpdateOrbits,
    UploadSceneState,
    DispatchTracer,
    /// Tracer writes to the primary image are complete and visible.
    Barrier,
    BloomExtract,
    BloomBlur(BlurPass),
    /// Reads the ping buffer at this index.
    Composite(usize),
    Overlay,
    Present,
}

/// The stage sequence of one frame with `passes` blur passes.
pub fn schedule(passes: u32) -> impl Iterator<Item = FrameStage> {
    [
        FrameStage::UpdateOrbits,
        FrameStage::UploadSceneState,
        FrameStage::DispatchTracer,
        FrameStage::Barrier,
        FrameStage::BloomExtract,
    ]
    .into_iter()
    .chain(bloom::schedule(passes).map(FrameStage::BloomBlur))
    .chain([
        FrameStage::Composite(bloom::blurred_index(passes)),
        FrameStage::Overlay,
        FrameStage::Present,
    ])
}

/// One implementation of the GPU-facing frame stages.
pub trait FrameBackend {
    /// Copies every dirty block out of `store`.
    fn upload(&mut self, store: &mut SceneStore) -> Blocks;

    fn dispatch_tracer(&mut self, store: &SceneStore);

    fn barrier(&mut self);

    fn bloom_extract(&mut self, settings: &BloomSettings);

    fn bloom_blur(&mut self, pass: BlurPass);

    fn composite(&mut self, blurred: usize, settings: &BloomSettings);

    fn overlay(&mut self, store: &SceneStore);

    fn present(&mut self) -> Result<()>;
}

/// Everything that changes between frames: where the camera is and how long
/// the program has been running.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput {
    pub camera: CameraBlock,
    pub wall_seconds: f64,
}

/// Owns the scene and drives one [`FrameBackend`] through each frame.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    store: SceneStore,
    bodies: Vec<OrbitingBody>,
    clock: SimClock,
    bloom: BloomSettings,
    frames: u64,
}

impl Orchestrator {
    pub fn new(config: &Config, planet_textures: usize) -> Self {
        let hole = config.black_hole();
        let disk = config.disk(&hole);

        let mut bodies = default_bodies(&hole);
        for (layer, body) in bodies.iter_mut().take(planet_textures).enumerate() {
            body.texture = Some(layer);
        }

        let clock = config.clock();
        for body in &bodies {
            if let (Some(period), Some(orbits)) = (body.period(), clock.orbits_per_minute(body)) {
                tracing::info!(name = %body.name, period_s = period, orbits_per_minute = orbits, "orbit");
            }
        }
        debug!(inner = disk.inner_radius, outer = disk.outer_radius, "accretion disk");

        let mut store = SceneStore::new();
        store.set_black_hole(BlackHoleBlock::new(&hole, config.integrator.model()));
        store.set_disk(DiskBlock::new(&disk, config.disk_flags()));
        store.set_tracer(config.tracer());

        Self {
            store,
            bodies,
            clock,
            bloom: config.bloom(),
            frames: 0,
        }
    }

    pub fn store(&self) -> &SceneStore {
        &self.store
    }

    pub fn bodies(&self) -> &[OrbitingBody] {
        &self.bodies
    }

    pub fn bloom(&self) -> &BloomSettings {
        &self.bloom
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs every stage of one frame on `backend`, strictly in order.
    pub fn run_frame(&mut self, backend: &mut impl FrameBackend, input: FrameInput) -> Result<()> {
        let mut positioned = Vec::new();

        for stage in schedule(self.bloom.passes) {
            trace!(?stage, frame = self.frames);

            match stage {
                FrameStage::UpdateOrbits => {
                    positioned = physics::advance(&self.bodies, self.clock.sim_time(input.wall_seconds));
                },
                FrameStage::UploadSceneState => {
                    self.store.set_camera(input.camera);
                    self.store.set_orbiting_bodies(&positioned);
                    self.store.set_time(input.wall_seconds as f32);
                    backend.upload(&mut self.store);
                },
                FrameStage::DispatchTracer => {
                    debug_assert!(self.store.ready_for_dispatch(), "tracer dispatched before every block was uploaded");
                    backend.dispatch_tracer(&self.store);
                },
                FrameStage::Barrier => backend.barrier(),
                FrameStage::BloomExtract => backend.bloom_extract(&self.bloom),
                FrameStage::BloomBlur(pass) => backend.bloom_blur(pass),
                FrameStage::Composite(blurred) => backend.composite(blurred, &self.bloom),
                FrameStage::Overlay => backend.overlay(&self.store),
                FrameStage::Present => backend.present()?,
            }
        }

        self.frames += 1;
        Ok(())
    }
}

/// Host memory needs no upload; the tracer reads the store directly.
struct HostUpload;

impl BlockSink for HostUpload {
    fn write_block(&mut self, binding: SceneBinding, bytes: &[u8]) {
        trace!(binding = binding.label(), bytes = bytes.len(), "host upload");
    }
}

/// Runs the frame on the CPU with rayon. The composited frame is left in
/// [`HostFrame::output`].
pub struct HostFrame<'a> {
    textures: &'a SceneTextures,
    targets: RenderTargets<HdrImage>,
    output: HdrImage,
}

impl<'a> HostFrame<'a> {
    pub fn new(textures: &'a SceneTextures, width: u32, height: u32) -> Self {
        let targets = RenderTargets::allocate(&HostAllocator, width, height);
        let output = HdrImage::black(targets.size());

        Self {
            textures,
            targets,
            output,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.targets.resize(&HostAllocator, width, height) {
            self.output = HdrImage::black(self.targets.size());
        }
    }

    pub fn targets(&self) -> &RenderTargets<HdrImage> {
        &self.targets
    }

    pub fn output(&self) -> &HdrImage {
        &self.output
    }
}

impl FrameBackend for HostFrame<'_> {
    fn upload(&mut self, store: &mut SceneStore) -> Blocks {
        store.flush(&mut HostUpload)
    }

    fn dispatch_tracer(&mut self, store: &SceneStore) {
        tracer::trace_image(store, self.textures, &mut self.targets.primary);
    }

    // trace_image joins every row before returning
    fn barrier(&mut self) {}

    fn bloom_extract(&mut self, settings: &BloomSettings) {
        bloom::extract(&self.targets.primary, settings.threshold, &mut self.targets.bright);
    }

    fn bloom_blur(&mut self, pass: BlurPass) {
        // a ping source is always the buffer not being written
        let [ping_0, ping_1] = &mut self.targets.ping;
        let (source, target) = match (pass.source, pass.target) {
            (BlurSource::Bright, 0) => (&self.targets.bright, ping_0),
            (BlurSource::Bright, _) => (&self.targets.bright, ping_1),
            (BlurSource::Ping(_), 0) => (&*ping_1, ping_0),
            (BlurSource::Ping(_), _) => (&*ping_0, ping_1),
        };

        bloom::blur(source, pass.direction(), target);
    }

    fn composite(&mut self, blurred: usize, settings: &BloomSettings) {
        bloom::composite(
            &self.targets.primary,
            &self.targets.ping[blurred],
            settings.strength,
            &mut self.output,
        );
    }

    fn overlay(&mut self, _store: &SceneStore) {}

    fn present(&mut self) -> Result<()> {
        Ok(())
    }
}
