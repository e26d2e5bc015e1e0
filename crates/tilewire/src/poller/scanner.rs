use std::sync::Arc;

use log::{error, trace};

use crate::channel::{SharedChannel, TileStatus, TILE_CONSUMED};
use crate::decode::decode_tile;
use crate::error::Result;
use crate::sink::ResultSink;

/// Counters accumulated over a render.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Scans performed, scheduled or forced.
    pub ticks: u64,
    /// Tiles handed to the sink.
    pub delivered: u64,
    /// Tiles acknowledged without delivery because decoding failed.
    pub failed: u64,
}

/// One scan-and-deliver pass over the header region.
///
/// Owns the sink; the poller thread and the final drain drive the same
/// scanner in turn, never concurrently.
pub struct TileScanner<S: ResultSink> {
    channel: Arc<SharedChannel>,
    sink: S,
    stats: PollStats,
}

impl<S: ResultSink> TileScanner<S> {
    pub fn new(channel: Arc<SharedChannel>, sink: S) -> Self {
        Self { channel, sink, stats: PollStats::default() }
    }

    /// Indices whose header byte reads [`TileStatus::Ready`] (exactly `1`),
    /// ascending.
    pub fn pending(&self) -> Result<Vec<usize>> {
        let mut ready = Vec::new();
        for i in 0..self.channel.geometry().tile_count() {
            if TileStatus::from_byte(self.channel.read_header_byte(i)?) == TileStatus::Ready {
                ready.push(i);
            }
        }
        Ok(ready)
    }

    /// Delivers every pending tile and marks it consumed.
    ///
    /// Returns the indices that reached the sink.
    pub fn scan(&mut self) -> Result<Vec<usize>> {
        self.stats.ticks += 1;

        let mut delivered = Vec::new();
        for index in self.pending()? {
            match decode_tile(&self.channel, index) {
                Ok(tile) => {
                    let mut handle = self.sink.begin_result(tile.rect);
                    self.sink.set_pixels(&mut handle, &tile.pixels);
                    self.sink.end_result(handle);

                    trace!("delivered tile {index} at {:?}", tile.rect);
                    self.stats.delivered += 1;
                    delivered.push(index);
                }
                Err(e) => {
                    error!("dropping tile {index}: {e}");
                    self.stats.failed += 1;
                }
            }
            // Acknowledge failures too so a bad slot is not retried every tick.
            self.channel.write_header_byte(index, TILE_CONSUMED)?;
        }

        Ok(delivered)
    }

    #[inline]
    pub fn stats(&self) -> PollStats {
        self.stats
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn channel(&self) -> &Arc<SharedChannel> {
        &self.channel
    }

    /// Releases the channel reference and returns the sink.
    pub fn into_parts(self) -> (S, PollStats) {
        let (sink, stats, _channel) = self.into_inner();
        (sink, stats)
    }

    pub fn into_inner(self) -> (S, PollStats, Arc<SharedChannel>) {
        (self.sink, self.stats, self.channel)
    }
}
