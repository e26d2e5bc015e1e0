//! Tilewire.
//!
//! Streams a progressively rendered image out of an external renderer process
//! through one fixed-size shared memory segment. The renderer fills per-tile
//! body slots and flips a one-byte completion flag per tile; this crate polls
//! those flags, decodes finished tiles and hands them to a display sink.

pub mod channel;
pub mod decode;
pub mod engine;
pub mod geometry;
pub mod logging;
pub mod poller;
pub mod sink;
pub mod supervisor;

mod error;

pub use error::{Error, Result};
