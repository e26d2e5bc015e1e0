//! Periodic tile poller.
//!
//! `Idle -> Running -> Stopped`. While running, a background thread sleeps for
//! one period and then runs a [`TileScanner`] pass, until stopped. Stopping is
//! cooperative: a pass already in progress finishes before the thread exits.
//! After stopping, [`TilePoller::force_drain`] runs one more pass on the
//! caller's thread to pick up tiles finished after the last scheduled tick.

mod scanner;

pub use scanner::{PollStats, TileScanner};

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Receiver, Sender};
use log::{debug, error, info};

use crate::error::{Error, Result};
use crate::sink::ResultSink;

/// Default interval between scheduled scans.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(1);

/// Externally visible poller state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PollerPhase {
    Idle,
    Running,
    Stopped,
}

enum State<S: ResultSink> {
    Idle(TileScanner<S>),
    Running {
        stop_tx: Sender<()>,
        handle: JoinHandle<TileScanner<S>>,
    },
    Stopped(TileScanner<S>),
    /// The scanner was lost to a panicked or unspawnable thread.
    Failed,
}

/// Drives a [`TileScanner`] on a fixed period.
pub struct TilePoller<S: ResultSink> {
    state: State<S>,
}

impl<S: ResultSink> TilePoller<S> {
    pub fn new(scanner: TileScanner<S>) -> Self {
        Self { state: State::Idle(scanner) }
    }

    /// Current phase. A failed poller reports `Stopped`.
    pub fn phase(&self) -> PollerPhase {
        match self.state {
            State::Idle(_) => PollerPhase::Idle,
            State::Running { .. } => PollerPhase::Running,
            State::Stopped(_) | State::Failed => PollerPhase::Stopped,
        }
    }

    /// Starts scanning every `period` on a background thread.
    pub fn start(&mut self, period: Duration) -> Result<()> {
        let scanner = match std::mem::replace(&mut self.state, State::Failed) {
            State::Idle(scanner) => scanner,
            other => {
                self.state = other;
                return Err(Error::InvalidState("poller can only be started once"));
            }
        };

        let (stop_tx, stop_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("tilewire-poller".into())
            .spawn(move || run(scanner, stop_rx, period))
            .map_err(Error::PollerSpawn)?;

        debug!("poller started, period {period:?}");
        self.state = State::Running { stop_tx, handle };
        Ok(())
    }

    /// Signals the thread and waits for its in-flight pass to finish.
    ///
    /// Stopping an idle poller moves it straight to `Stopped`; stopping twice
    /// is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Failed) {
            State::Running { stop_tx, handle } => {
                // Either the message or the disconnect wakes the thread.
                let _ = stop_tx.try_send(());
                drop(stop_tx);

                match handle.join() {
                    Ok(scanner) => {
                        debug!("poller stopped after {} ticks", scanner.stats().ticks);
                        self.state = State::Stopped(scanner);
                        Ok(())
                    }
                    Err(_) => Err(Error::PollerPanicked),
                }
            }
            State::Idle(scanner) | State::Stopped(scanner) => {
                self.state = State::Stopped(scanner);
                Ok(())
            }
            State::Failed => Err(Error::PollerPanicked),
        }
    }

    /// Runs one unscheduled pass, stopping the thread first if needed.
    ///
    /// Returns the indices delivered by this pass.
    pub fn force_drain(&mut self) -> Result<Vec<usize>> {
        self.stop()?;
        let State::Stopped(scanner) = &mut self.state else {
            return Err(Error::PollerPanicked);
        };

        let delivered = scanner.scan()?;
        info!("final drain delivered {} tile(s)", delivered.len());
        Ok(delivered)
    }

    /// Stats so far; `None` while the thread owns the scanner.
    pub fn stats(&self) -> Option<PollStats> {
        match &self.state {
            State::Idle(s) | State::Stopped(s) => Some(s.stats()),
            _ => None,
        }
    }

    /// Stops the poller if needed and hands back the scanner.
    pub fn into_scanner(mut self) -> Result<TileScanner<S>> {
        self.stop()?;
        match std::mem::replace(&mut self.state, State::Failed) {
            State::Stopped(scanner) => Ok(scanner),
            _ => Err(Error::PollerPanicked),
        }
    }
}

impl<S: ResultSink> Drop for TilePoller<S> {
    fn drop(&mut self) {
        if matches!(self.state, State::Running { .. }) {
            if let Err(e) = self.stop() {
                error!("poller shutdown on drop failed: {e}");
            }
        }
    }
}

fn run<S: ResultSink>(mut scanner: TileScanner<S>, stop_rx: Receiver<()>, period: Duration) -> TileScanner<S> {
    loop {
        match stop_rx.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => match scanner.scan() {
                Ok(delivered) if !delivered.is_empty() => {
                    debug!("tick delivered {} tile(s)", delivered.len());
                }
                Ok(_) => {}
                Err(e) => error!("poll tick failed: {e}"),
            },
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    scanner
}

#[cfg(test)]
mod tests {
    use super::scanner::tests::{channel, RecordingSink};
    use super::*;
    use crate::channel::{TILE_CONSUMED, TILE_READY};
    use std::time::Instant;

    fn poller(tag: &str, w: u32, h: u32) -> (std::sync::Arc<crate::channel::SharedChannel>, TilePoller<RecordingSink>) {
        let ch = channel(tag, w, h);
        let p = TilePoller::new(TileScanner::new(ch.clone(), RecordingSink::default()));
        (ch, p)
    }

    #[test]
    fn lifecycle_phases() {
        let (_ch, mut p) = poller("poll_phase", 64, 64);
        assert_eq!(p.phase(), PollerPhase::Idle);
        p.start(Duration::from_millis(5)).unwrap();
        assert_eq!(p.phase(), PollerPhase::Running);
        assert!(p.stats().is_none());
        p.stop().unwrap();
        assert_eq!(p.phase(), PollerPhase::Stopped);
        p.stop().unwrap();
        assert_eq!(p.phase(), PollerPhase::Stopped);
    }

    #[test]
    fn cannot_start_twice() {
        let (_ch, mut p) = poller("poll_twice", 64, 64);
        p.start(Duration::from_millis(5)).unwrap();
        assert!(matches!(p.start(Duration::from_millis(5)), Err(Error::InvalidState(_))));
        assert_eq!(p.phase(), PollerPhase::Running);
        p.stop().unwrap();
        assert!(p.start(Duration::from_millis(5)).is_err());
    }

    #[test]
    fn running_poller_delivers_on_schedule() {
        let (ch, mut p) = poller("poll_sched", 128, 128);
        p.start(Duration::from_millis(5)).unwrap();
        ch.write_header_byte(3, TILE_READY).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while ch.read_header_byte(3).unwrap() != TILE_CONSUMED && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }

        let scanner = p.into_scanner().unwrap();
        assert_eq!(scanner.stats().delivered, 1);
        assert_eq!(scanner.sink().results.len(), 1);
    }

    #[test]
    fn stop_interrupts_sleep() {
        let (_ch, mut p) = poller("poll_wake", 64, 64);
        p.start(Duration::from_secs(3600)).unwrap();
        let t = Instant::now();
        p.stop().unwrap();
        assert!(t.elapsed() < Duration::from_secs(60));
        assert_eq!(p.stats().unwrap().ticks, 0);
    }

    #[test]
    fn drain_catches_tiles_after_last_tick() {
        let (ch, mut p) = poller("poll_drain", 128, 128);
        p.start(Duration::from_secs(3600)).unwrap();

        // Completed after start; the hour-long period guarantees no scheduled
        // tick observes it.
        ch.write_header_byte(0, TILE_READY).unwrap();
        ch.write_header_byte(2, TILE_READY).unwrap();

        assert_eq!(p.force_drain().unwrap(), vec![0, 2]);
        assert_eq!(ch.read_header_byte(0).unwrap(), TILE_CONSUMED);
        assert_eq!(ch.read_header_byte(2).unwrap(), TILE_CONSUMED);

        // A second drain finds nothing new.
        assert!(p.force_drain().unwrap().is_empty());

        let (sink, stats) = p.into_scanner().unwrap().into_parts();
        assert_eq!(sink.results.len(), 2);
        assert_eq!(stats.delivered, 2);
    }

    #[test]
    fn drain_on_idle_poller() {
        let (ch, mut p) = poller("poll_idle", 64, 64);
        ch.write_header_byte(0, TILE_READY).unwrap();
        assert_eq!(p.force_drain().unwrap(), vec![0]);
        assert_eq!(p.phase(), PollerPhase::Stopped);
    }
}
