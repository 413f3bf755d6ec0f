mod demo;

use anyhow::Context;
use clap::{Parser, Subcommand};
use demo::DemoOptions;
use lumen_render::{FrameRenderer, HeadlessDevice, RendererConfig};
use lumen_render_wgpu::WgpuDevice;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumen-cli", about = "Inspect and exercise the lumen renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Renderer configuration (JSON); missing fields use defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions, built-in materials and the effective config
    Info,
    /// Render the demo scene on the in-memory device and report cache activity
    DryRun {
        #[arg(short, long, default_value = "8")]
        frames: u64,
        #[arg(long, default_value = "6")]
        lights: usize,
        #[arg(long)]
        no_skybox: bool,
        #[arg(long)]
        wireframe: bool,
    },
    /// Render one frame of the demo scene on the GPU and write it as PPM
    Render {
        #[arg(short, long, default_value = "lumen.ppm")]
        output: PathBuf,
        #[arg(long, default_value = "640")]
        width: u32,
        #[arg(long, default_value = "480")]
        height: u32,
        #[arg(long, default_value = "4")]
        lights: usize,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RendererConfig> {
    let Some(path) = path else {
        return Ok(RendererConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: RendererConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => {
            println!("lumen-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("render: {}", lumen_render::crate_info());
            println!("materials: basic, normal, standard, skybox");
            println!("max lights per lit material: {}", lumen_render::StandardMaterial::MAX_LIGHTS);
            println!("config: {}", serde_json::to_string_pretty(&config)?);
        }
        Commands::DryRun {
            frames,
            lights,
            no_skybox,
            wireframe,
        } => {
            let options = DemoOptions {
                lights,
                skybox: !no_skybox,
                wireframe_floor: wireframe,
            };
            dry_run(config, &options, frames)?;
        }
        Commands::Render {
            output,
            width,
            height,
            lights,
        } => {
            let options = DemoOptions {
                lights,
                skybox: true,
                wireframe_floor: false,
            };
            render_to_file(config, &options, width, height, &output)?;
        }
    }

    Ok(())
}

fn dry_run(config: RendererConfig, options: &DemoOptions, frames: u64) -> anyhow::Result<()> {
    let mut renderer = FrameRenderer::new(HeadlessDevice::new(1280, 720), config)?;
    let mut demo = demo::build(&mut renderer, options)?;

    println!("frame  edit                       drawn  draws  full  rebind  reuse");
    for frame in 0..frames {
        let edit = demo.step(frame)?;
        let stats = renderer.render(&mut demo.scene, &demo.camera)?;
        println!(
            "{:>5}  {:<25}  {:>5}  {:>5}  {:>4}  {:>6}  {:>5}",
            stats.frame,
            edit,
            stats.meshes_drawn,
            stats.draw_calls,
            stats.mesh_cache.full_rebuilds,
            stats.mesh_cache.bind_group_rebuilds,
            stats.mesh_cache.reuses,
        );
    }

    let counters = renderer.device().counters();
    println!(
        "pipelines={} mesh entries={} buffers created={} destroyed={}",
        renderer.pipeline_count(),
        renderer.mesh_resource_count(),
        counters.buffers_created,
        counters.buffers_destroyed,
    );

    renderer.dispose();
    let device = renderer.device();
    let leaked = device.live_buffers() + device.live_pipelines() + device.live_bind_groups();
    if leaked > 0 {
        anyhow::bail!("{leaked} renderer resources still live after dispose");
    }
    println!("dispose: all renderer resources released");
    Ok(())
}

fn render_to_file(
    config: RendererConfig,
    options: &DemoOptions,
    width: u32,
    height: u32,
    output: &Path,
) -> anyhow::Result<()> {
    let device = pollster::block_on(WgpuDevice::offscreen(width, height)).context("creating GPU device")?;
    let mut renderer = FrameRenderer::new(device, config)?;
    let mut demo = demo::build(&mut renderer, options)?;
    let stats = renderer.render(&mut demo.scene, &demo.camera)?;
    tracing::info!(draws = stats.draw_calls, lights = stats.lights, "frame rendered");

    let pixels = renderer.device().read_back()?;
    write_ppm(output, width.max(1), height.max(1), &pixels)?;
    renderer.dispose();
    println!("wrote {} ({width}x{height})", output.display());
    Ok(())
}

/// Binary PPM from tightly packed RGBA8 rows; alpha is dropped.
fn write_ppm(path: &Path, width: u32, height: u32, rgba: &[u8]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    write!(out, "P6\n{width} {height}\n255\n")?;
    for pixel in rgba.chunks_exact(4) {
        out.write_all(&pixel[..3])?;
    }
    out.flush()?;
    Ok(())
}
