use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the tile transport.
///
/// Geometry and launch errors are reported before any process starts. Once a
/// render is running nothing here is retried; tile-level decode failures are
/// logged by the poller instead of being propagated.
#[derive(Debug)]
pub enum Error {
    /// Width, height or tile size is zero, or the layout overflows `usize`.
    InvalidGeometry {
        width: u32,
        height: u32,
        tile_size: u32,
    },
    /// No renderer binary was configured.
    BinaryPathUnset,
    /// The configured renderer binary does not exist.
    BinaryNotFound(PathBuf),
    /// Spawning the renderer failed.
    LaunchFailed { path: PathBuf, source: io::Error },
    /// Waiting on a running renderer failed; its exit status is unknown.
    WaitFailed { path: PathBuf, source: io::Error },
    /// The shared memory segment could not be created or mapped.
    ChannelUnavailable { name: String, source: io::Error },
    /// A channel access fell outside the mapped segment.
    OutOfBounds { offset: usize, len: usize, size: usize },
    /// The renderer exited unsuccessfully and the strict exit policy is active.
    RendererFailed(ExitStatus),
    /// A state-machine operation was called in the wrong state.
    InvalidState(&'static str),
    /// The poller thread could not be spawned.
    PollerSpawn(io::Error),
    /// The poller thread panicked; its sink is lost.
    PollerPanicked,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidGeometry { width, height, tile_size } => write!(
                f,
                "invalid image geometry {width}x{height} with tile size {tile_size}"
            ),
            Error::BinaryPathUnset => {
                write!(f, "renderer binary path is not set")
            }
            Error::BinaryNotFound(path) => {
                write!(f, "renderer binary not found: {}", path.display())
            }
            Error::LaunchFailed { path, source } => {
                write!(f, "failed to launch {}: {source}", path.display())
            }
            Error::WaitFailed { path, source } => {
                write!(f, "failed to wait for {} to exit: {source}", path.display())
            }
            Error::ChannelUnavailable { name, source } => {
                write!(f, "shared memory segment {name} unavailable: {source}")
            }
            Error::OutOfBounds { offset, len, size } => write!(
                f,
                "channel access [{offset}, {}) outside segment of {size} bytes",
                offset + len
            ),
            Error::RendererFailed(status) => write!(f, "renderer exited with {status}"),
            Error::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Error::PollerSpawn(e) => write!(f, "failed to spawn tile poller: {e}"),
            Error::PollerPanicked => write!(f, "tile poller thread panicked"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::LaunchFailed { source, .. }
            | Error::WaitFailed { source, .. }
            | Error::ChannelUnavailable { source, .. } => {
                Some(source)
            }
            Error::PollerSpawn(e) => Some(e),
            _ => None,
        }
    }
}
