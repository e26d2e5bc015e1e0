mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tilewire::engine::{
    EngineConfig, RenderEngine, RenderKind, RenderSettings, TileRenderEngine, DEFAULT_SCENE_ARG,
    DEFAULT_SEGMENT_NAME,
};
use tilewire::geometry::DEFAULT_TILE_SIZE;
use tilewire::logging::{init_logging, LoggingConfig};
use tilewire::sink::FramebufferSink;
use tilewire::supervisor::ExitStatusPolicy;

/// Runs an external tile renderer and saves what it streams back.
#[derive(Debug, Parser)]
#[command(name = "tilewire-host", version)]
struct Args {
    /// Renderer executable.
    #[arg(long, env = "TILEWIRE_RENDERER")]
    renderer: Option<PathBuf>,

    /// Working directory for the renderer (defaults to its own directory).
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Scene file argument, relative to the working directory.
    #[arg(long, default_value = DEFAULT_SCENE_ARG)]
    scene: PathBuf,

    #[arg(long, default_value_t = 1920)]
    width: u32,

    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Resolution scale in percent.
    #[arg(long, default_value_t = 100)]
    percentage: u32,

    #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
    tile_size: u32,

    /// Shared memory segment name agreed with the renderer.
    #[arg(long, default_value = DEFAULT_SEGMENT_NAME)]
    segment: String,

    /// Poll period in milliseconds.
    #[arg(long, default_value_t = 1000)]
    poll_ms: u64,

    /// Fail without a final drain when the renderer exits unsuccessfully.
    #[arg(long)]
    strict: bool,

    /// Preview render (nothing is launched).
    #[arg(long)]
    preview: bool,

    /// Output PNG.
    #[arg(short, long, default_value = "render.png")]
    output: PathBuf,

    /// Log filter, e.g. "debug" or "tilewire=trace".
    #[arg(long)]
    log: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(LoggingConfig { env_filter: args.log.clone(), ..Default::default() });

    let config = EngineConfig {
        binary_path: args.renderer.clone(),
        working_dir: args.working_dir.clone(),
        scene_arg: args.scene.clone(),
        segment_name: args.segment.clone(),
        poll_period: Duration::from_millis(args.poll_ms.max(1)),
        exit_policy: if args.strict { ExitStatusPolicy::Strict } else { ExitStatusPolicy::BestEffort },
    };
    let settings = RenderSettings {
        resolution_x: args.width,
        resolution_y: args.height,
        resolution_percentage: args.percentage,
        tile_size: args.tile_size,
        kind: if args.preview { RenderKind::Preview } else { RenderKind::Final },
    };

    let geometry = settings.geometry().context("invalid output resolution")?;
    let mut engine = TileRenderEngine::new(config);
    engine.on_scene_ready(&args.scene).context("renderer unavailable")?;

    let outcome = engine
        .on_render_requested(&settings, FramebufferSink::for_geometry(&geometry))
        .context("render failed")?;

    if let Some(status) = outcome.exit_status {
        if !status.success() {
            log::warn!("renderer reported {status}; image may be incomplete");
        }
    }

    output::write_png(&outcome.sink, &args.output)?;
    Ok(())
}
