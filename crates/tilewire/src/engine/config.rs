use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::geometry::{ImageGeometry, DEFAULT_TILE_SIZE};
use crate::poller::DEFAULT_POLL_PERIOD;
use crate::supervisor::{ExitStatusPolicy, LaunchSpec};

/// Scene file location the exporter writes to, relative to the renderer's
/// working directory.
pub const DEFAULT_SCENE_ARG: &str = "./blender_intermediate/blender_exported.xml";

/// Segment name the renderer maps.
pub const DEFAULT_SEGMENT_NAME: &str = "/SORTBLEND_SHAREMEM";

/// Engine-wide settings, fixed across renders.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Renderer executable. Resolved by the host.
    pub binary_path: Option<PathBuf>,

    /// Working directory for the renderer; defaults to the binary's directory.
    pub working_dir: Option<PathBuf>,

    /// The renderer's single positional argument.
    pub scene_arg: PathBuf,

    /// Shared memory segment name agreed with the renderer.
    pub segment_name: String,

    /// Interval between scheduled poll ticks.
    pub poll_period: Duration,

    pub exit_policy: ExitStatusPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            working_dir: None,
            scene_arg: PathBuf::from(DEFAULT_SCENE_ARG),
            segment_name: DEFAULT_SEGMENT_NAME.to_string(),
            poll_period: DEFAULT_POLL_PERIOD,
            exit_policy: ExitStatusPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Checks the binary path and builds the renderer invocation.
    pub fn launch_spec(&self) -> Result<LaunchSpec> {
        let binary = self.binary_path.as_ref().ok_or(Error::BinaryPathUnset)?;
        if !binary.exists() {
            return Err(Error::BinaryNotFound(binary.clone()));
        }

        let spec = LaunchSpec::new(binary, self.scene_arg.as_os_str());
        Ok(match &self.working_dir {
            Some(dir) => spec.with_working_dir(dir),
            None => spec,
        })
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum RenderKind {
    #[default]
    Final,
    /// Material preview thumbnails; not rendered by the external process.
    Preview,
}

/// Per-render output settings supplied by the host.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RenderSettings {
    pub resolution_x: u32,
    pub resolution_y: u32,
    /// Scale applied to the resolution, in percent.
    pub resolution_percentage: u32,
    pub tile_size: u32,
    pub kind: RenderKind,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution_x: 1920,
            resolution_y: 1080,
            resolution_percentage: 100,
            tile_size: DEFAULT_TILE_SIZE,
            kind: RenderKind::Final,
        }
    }
}

impl RenderSettings {
    pub fn geometry(&self) -> Result<ImageGeometry> {
        ImageGeometry::from_resolution(
            self.resolution_x,
            self.resolution_y,
            self.resolution_percentage,
            self.tile_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_binary_is_reported() {
        let cfg = EngineConfig::default();
        assert!(matches!(cfg.launch_spec(), Err(Error::BinaryPathUnset)));
    }

    #[test]
    fn missing_binary_is_reported() {
        let cfg = EngineConfig {
            binary_path: Some(PathBuf::from("/nonexistent/sort")),
            ..Default::default()
        };
        assert!(matches!(cfg.launch_spec(), Err(Error::BinaryNotFound(_))));
    }

    #[test]
    fn launch_spec_uses_scene_arg_and_override() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("sort");
        std::fs::write(&bin, b"").unwrap();

        let mut cfg = EngineConfig { binary_path: Some(bin.clone()), ..Default::default() };
        let spec = cfg.launch_spec().unwrap();
        assert_eq!(spec.working_dir, dir.path());
        assert_eq!(spec.args, vec![std::ffi::OsString::from(DEFAULT_SCENE_ARG)]);

        cfg.working_dir = Some(PathBuf::from("/tmp"));
        assert_eq!(cfg.launch_spec().unwrap().working_dir, PathBuf::from("/tmp"));
    }

    #[test]
    fn settings_apply_percentage() {
        let s = RenderSettings { resolution_percentage: 50, ..Default::default() };
        let g = s.geometry().unwrap();
        assert_eq!((g.width(), g.height()), (960, 540));
        assert_eq!(g.tile_size(), DEFAULT_TILE_SIZE);
    }
}
