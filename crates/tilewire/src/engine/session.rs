use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::channel::SharedChannel;
use crate::error::Result;
use crate::geometry::ImageGeometry;
use crate::poller::{PollStats, TileScanner};
use crate::sink::ResultSink;
use crate::supervisor::{ExitStatusPolicy, LaunchSpec, ProcessSupervisor};

use super::config::EngineConfig;

/// What a render produced.
#[derive(Debug)]
pub struct RenderOutcome<S> {
    pub geometry: ImageGeometry,
    /// `None` when no process was launched (previews).
    pub exit_status: Option<ExitStatus>,
    pub sink: S,
    pub stats: PollStats,
}

/// State of a single render: the fixed layout plus how to reach the renderer.
#[derive(Debug, Clone)]
pub struct RenderSession {
    geometry: ImageGeometry,
    launch: LaunchSpec,
    segment_name: String,
    poll_period: Duration,
    exit_policy: ExitStatusPolicy,
}

impl RenderSession {
    pub fn new(geometry: ImageGeometry, launch: LaunchSpec, config: &EngineConfig) -> Self {
        Self {
            geometry,
            launch,
            segment_name: config.segment_name.clone(),
            poll_period: config.poll_period,
            exit_policy: config.exit_policy,
        }
    }

    #[inline]
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    #[inline]
    pub fn launch_spec(&self) -> &LaunchSpec {
        &self.launch
    }

    /// Allocates the segment, runs the renderer to completion and returns
    /// the sink with everything delivered into it.
    pub fn run<S: ResultSink>(self, sink: S) -> Result<RenderOutcome<S>> {
        let g = self.geometry;
        info!(
            "render {}x{}: {}x{} tiles of {}px, segment {} ({} bytes)",
            g.width(),
            g.height(),
            g.tile_count_x(),
            g.tile_count_y(),
            g.tile_size(),
            self.segment_name,
            g.total_bytes()
        );

        let channel = Arc::new(SharedChannel::open(&self.segment_name, &g)?);
        let scanner = TileScanner::new(channel, sink);

        let mut supervisor = ProcessSupervisor::new(self.exit_policy, self.poll_period);
        supervisor.launch(&self.launch, scanner)?;
        let done = supervisor.await_completion()?;

        info!(
            "render finished: {} tile(s) delivered, {} failed, {} poll tick(s)",
            done.stats.delivered, done.stats.failed, done.stats.ticks
        );

        Ok(RenderOutcome {
            geometry: g,
            exit_status: Some(done.exit_status),
            sink: done.sink,
            stats: done.stats,
        })
    }
}
