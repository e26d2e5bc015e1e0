//! Host-facing render engine.
//!
//! The host owns the display loop and calls into a [`RenderEngine`] when the
//! scene has been exported and when a frame is wanted. The engine owns only
//! the transport: it launches the renderer and streams tiles into the sink.

mod config;
mod session;

pub use config::{EngineConfig, RenderKind, RenderSettings, DEFAULT_SCENE_ARG, DEFAULT_SEGMENT_NAME};
pub use session::{RenderOutcome, RenderSession};

use std::marker::PhantomData;
use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::poller::PollStats;
use crate::sink::ResultSink;
use crate::supervisor::LaunchSpec;

/// Contract between a host application and a render engine.
pub trait RenderEngine {
    type Sink: ResultSink;

    /// Called once the scene description has been exported to `scene`
    /// (relative to the renderer's working directory). Fails if the renderer
    /// cannot be located.
    fn on_scene_ready(&mut self, scene: &Path) -> Result<()>;

    /// Renders one frame into `sink`.
    fn on_render_requested(
        &mut self,
        settings: &RenderSettings,
        sink: Self::Sink,
    ) -> Result<RenderOutcome<Self::Sink>>;
}

/// [`RenderEngine`] backed by an external tile renderer.
pub struct TileRenderEngine<S> {
    config: EngineConfig,
    launch: Option<LaunchSpec>,
    _sink: PhantomData<fn() -> S>,
}

impl<S: ResultSink> TileRenderEngine<S> {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, launch: None, _sink: PhantomData }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True once [`RenderEngine::on_scene_ready`] has succeeded.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.launch.is_some()
    }
}

impl<S: ResultSink> RenderEngine for TileRenderEngine<S> {
    type Sink = S;

    fn on_scene_ready(&mut self, scene: &Path) -> Result<()> {
        self.launch = None;
        self.config.scene_arg = scene.to_path_buf();
        let spec = self.config.launch_spec()?;
        debug!("renderer ready: {}", spec.binary_path.display());
        self.launch = Some(spec);
        Ok(())
    }

    fn on_render_requested(&mut self, settings: &RenderSettings, sink: S) -> Result<RenderOutcome<S>> {
        let launch = self
            .launch
            .clone()
            .ok_or(Error::InvalidState("render requested before the scene was ready"))?;
        let geometry = settings.geometry()?;

        if settings.kind == RenderKind::Preview {
            info!("preview render skipped");
            return Ok(RenderOutcome { geometry, exit_status: None, sink, stats: PollStats::default() });
        }

        RenderSession::new(geometry, launch, &self.config).run(sink)
    }
}
