use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use glam::Vec3;
use lensing::{
    app::App,
    assets::SceneTextures,
    camera::{look_at, Camera},
    config::Config,
    frame::{FrameInput, HostFrame, Orchestrator},
    geodesic::IntegratorKind,
    render::{Renderer, OUTPUT_FORMAT},
    state::State,
    types::CameraBlock,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use winit::event_loop::EventLoop;

#[derive(Parser, Debug)]
#[command(name = "lensing", about = "Real-time gravitational lensing around a Schwarzschild black hole")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the interactive viewer (default).
    View,
    /// Render one frame to a PNG and exit.
    Render {
        #[arg(short, long, default_value = "black-hole.png")]
        output: PathBuf,

        /// Trace on the CPU instead of the GPU.
        #[arg(long)]
        cpu: bool,

        /// Camera position; the camera looks at the black hole.
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
        eye: Option<Vec<f32>>,

        /// Wall-clock seconds since start, for orbit positions.
        #[arg(long, default_value_t = 0.0)]
        time: f64,
    },
}

#[derive(Args, Debug)]
struct Overrides {
    /// JSON config file; flags below override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    width: Option<u32>,

    #[arg(long, global = true)]
    height: Option<u32>,

    #[arg(long, global = true)]
    integrator: Option<Integrator>,

    #[arg(long, global = true)]
    solar_masses: Option<f64>,

    #[arg(long, global = true)]
    grid: bool,

    #[arg(long, global = true)]
    beaming: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Integrator {
    Relativistic,
    Newtonian,
}

impl Overrides {
    fn resolve(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path).with_context(|| format!("failed to read config {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(integrator) = self.integrator {
            config.integrator = match integrator {
                Integrator::Relativistic => IntegratorKind::Relativistic,
                Integrator::Newtonian => IntegratorKind::Newtonian,
            };
        }
        if let Some(solar_masses) = self.solar_masses {
            config.solar_masses = solar_masses;
        }
        config.show_grid |= self.grid;
        config.doppler_beaming |= self.beaming;

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.overrides.resolve()?;
    let textures = SceneTextures::load(&config).context("failed to load textures")?;

    match cli.command.unwrap_or(Command::View) {
        Command::View => view(config, textures),
        Command::Render {
            output,
            cpu,
            eye,
            time,
        } => {
            let eye = eye.map_or(Camera::default().position, |eye| Vec3::from_slice(&eye));
            render(&config, &textures, &output, cpu, eye, time)
        },
    }
}

fn view(config: Config, textures: SceneTextures) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    let mut app = App::new(config, textures);

    event_loop.run_app(&mut app).context("event loop failed")?;

    match app.take_failure() {
        Some(err) => Err(err).context("viewer failed to start"),
        None => Ok(()),
    }
}

fn render(config: &Config, textures: &SceneTextures, output: &Path, cpu: bool, eye: Vec3, time: f64) -> Result<()> {
    let camera = Camera::default();
    let aspect = config.width as f32 / config.height as f32;
    let view = look_at(eye, Vec3::ZERO).context("--eye must not sit at the black hole")?;
    let input = FrameInput {
        camera: CameraBlock::new(view, camera.projection(aspect), eye),
        wall_seconds: time,
    };

    let mut orchestrator = Orchestrator::new(config, textures.planets.len());
    let started = Instant::now();

    if cpu {
        let mut frame = HostFrame::new(textures, config.width, config.height);
        orchestrator.run_frame(&mut frame, input)?;
        frame.output().save(output)?;
    } else {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let state = pollster::block_on(State::new(&instance, None)).context("failed to initialize GPU")?;
        let renderer = Renderer::new(
            state,
            textures,
            orchestrator.bloom(),
            config.black_hole().radius(),
            OUTPUT_FORMAT,
            config.width,
            config.height,
        )?;

        let image = renderer.render_image(&mut orchestrator, input)?;
        image
            .save(output)
            .with_context(|| format!("failed to write {}", output.display()))?;
    }

    info!(
        path = %output.display(),
        backend = if cpu { "cpu" } else { "gpu" },
        elapsed_ms = started.elapsed().as_millis() as u64,
        "rendered frame"
    );

    Ok(())
}
