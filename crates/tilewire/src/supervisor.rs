//! External renderer process lifecycle.
//!
//! `NotStarted -> Running -> Exited`. The supervisor spawns the renderer and the
//! tile poller together, blocks until the renderer exits, then stops the
//! poller, drains it once more and releases the shared segment.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::poller::{PollStats, TilePoller, TileScanner, DEFAULT_POLL_PERIOD};
use crate::sink::ResultSink;

/// What to do with undelivered tiles when the renderer exits unsuccessfully.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum ExitStatusPolicy {
    /// Drain and deliver whatever was written; report the status only.
    #[default]
    BestEffort,
    /// Skip the final drain and fail with [`Error::RendererFailed`].
    Strict,
}

/// How to invoke the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub binary_path: PathBuf,
    pub working_dir: PathBuf,
    pub args: Vec<OsString>,
}

impl LaunchSpec {
    /// Runs `binary_path` from its own directory with `input` as the only
    /// argument.
    pub fn new(binary_path: impl Into<PathBuf>, input: impl Into<OsString>) -> Self {
        let binary_path = binary_path.into();
        let working_dir = binary_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { binary_path, working_dir, args: vec![input.into()] }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SupervisorPhase {
    NotStarted,
    Running,
    Exited,
}

/// Result of a supervised render.
#[derive(Debug)]
pub struct Completion<S> {
    pub exit_status: ExitStatus,
    pub sink: S,
    pub stats: PollStats,
}

enum State<S: ResultSink> {
    NotStarted,
    Running {
        child: Child,
        binary_path: PathBuf,
        poller: TilePoller<S>,
    },
    Exited,
}

pub struct ProcessSupervisor<S: ResultSink> {
    policy: ExitStatusPolicy,
    period: Duration,
    state: State<S>,
}

impl<S: ResultSink> ProcessSupervisor<S> {
    pub fn new(policy: ExitStatusPolicy, period: Duration) -> Self {
        Self { policy, period, state: State::NotStarted }
    }

    pub fn phase(&self) -> SupervisorPhase {
        match self.state {
            State::NotStarted => SupervisorPhase::NotStarted,
            State::Running { .. } => SupervisorPhase::Running,
            State::Exited => SupervisorPhase::Exited,
        }
    }

    /// Spawns the renderer and starts polling `scanner`'s channel.
    pub fn launch(&mut self, spec: &LaunchSpec, scanner: TileScanner<S>) -> Result<()> {
        if !matches!(self.state, State::NotStarted) {
            return Err(Error::InvalidState("renderer already launched"));
        }
        if !spec.binary_path.exists() {
            return Err(Error::BinaryNotFound(spec.binary_path.clone()));
        }

        let mut child = Command::new(&spec.binary_path)
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .spawn()
            .map_err(|source| Error::LaunchFailed { path: spec.binary_path.clone(), source })?;

        info!(
            "renderer {} spawned with PID {} in {}",
            spec.binary_path.display(),
            child.id(),
            spec.working_dir.display()
        );

        let mut poller = TilePoller::new(scanner);
        if let Err(e) = poller.start(self.period) {
            // No consumer means no render; do not leave the process orphaned.
            let _ = child.kill();
            let _ = child.wait();
            self.state = State::Exited;
            return Err(e);
        }

        self.state = State::Running { child, binary_path: spec.binary_path.clone(), poller };
        Ok(())
    }

    /// Blocks until the renderer exits, then stops, drains and tears down.
    ///
    /// There is no timeout: a hung renderer blocks the caller.
    pub fn await_completion(&mut self) -> Result<Completion<S>> {
        let (mut child, binary_path, mut poller) = match std::mem::replace(&mut self.state, State::Exited) {
            State::Running { child, binary_path, poller } => (child, binary_path, poller),
            other => {
                self.state = other;
                return Err(Error::InvalidState("renderer is not running"));
            }
        };

        let exit_status = child
            .wait()
            .map_err(|source| Error::WaitFailed { path: binary_path, source })?;

        if exit_status.success() {
            info!("renderer exited with {exit_status}");
        } else {
            warn!("renderer exited with {exit_status}");
        }

        poller.stop()?;

        if !exit_status.success() && self.policy == ExitStatusPolicy::Strict {
            // Dropping the poller releases the segment.
            drop(poller);
            return Err(Error::RendererFailed(exit_status));
        }

        poller.force_drain()?;

        let (sink, stats, channel) = poller.into_scanner()?.into_inner();
        match Arc::into_inner(channel) {
            Some(channel) => channel.close(),
            None => debug!("shared segment still referenced; released by its last owner"),
        }

        Ok(Completion { exit_status, sink, stats })
    }
}

impl<S: ResultSink> Default for ProcessSupervisor<S> {
    fn default() -> Self {
        Self::new(ExitStatusPolicy::default(), DEFAULT_POLL_PERIOD)
    }
}
