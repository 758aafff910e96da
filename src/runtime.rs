use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::error::Result;
use crate::geometry::{BoundingBox, Detection};
use crate::session::Session;

/// Unified event type consumed by the feed driver
#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    Detection(Detection),
    Tick,
    Closed,
}

/// Source of detections (a log file, stdin, a detector thread, ...)
pub trait DetectionSource: Send + 'static {
    /// Block for up to `timeout` waiting for a detection.
    /// Returns Err(Timeout) if it expires and Err(Disconnected) once the source is exhausted.
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<Detection, RecvTimeoutError>;
}

/// One line of a detection log: `timestamp_ms,left,top,right,bottom`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub timestamp_ms: u64,
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl From<DetectionRecord> for Detection {
    fn from(r: DetectionRecord) -> Self {
        Detection::new(BoundingBox::new(r.left, r.top, r.right, r.bottom), r.timestamp_ms)
    }
}

impl From<&Detection> for DetectionRecord {
    fn from(d: &Detection) -> Self {
        Self {
            timestamp_ms: d.timestamp_ms,
            left: d.bbox.left,
            top: d.bbox.top,
            right: d.bbox.right,
            bottom: d.bbox.bottom,
        }
    }
}

/// Writes detections in the log format read by [`ReaderDetectionSource`].
pub fn write_detections<W: Write>(writer: W, detections: &[Detection]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for d in detections {
        wtr.serialize(DetectionRecord::from(d))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Parses a CSV detection log on a background thread. Malformed rows are
/// logged and skipped.
pub struct ReaderDetectionSource {
    rx: Receiver<Detection>,
}

impl ReaderDetectionSource {
    pub fn new<R: Read + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let mut rdr = csv::Reader::from_reader(reader);
            for (line, record) in rdr.deserialize::<DetectionRecord>().enumerate() {
                match record {
                    Ok(record) => {
                        if tx.send(Detection::from(record)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(row = line + 1, error = %e, "Skipping malformed detection"),
                }
            }
            debug!("Detection log exhausted");
        });

        Self { rx }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(file))
    }
}

impl DetectionSource for ReaderDetectionSource {
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<Detection, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Test detection source fed through a channel
pub struct TestDetectionSource {
    rx: Receiver<Detection>,
}

impl TestDetectionSource {
    pub fn new(rx: Receiver<Detection>) -> Self {
        Self { rx }
    }
}

impl DetectionSource for TestDetectionSource {
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<Detection, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Time source for ingestion. Times are milliseconds on the same timeline as
/// detection timestamps.
pub trait Clock {
    fn now_ms(&self) -> u64;

    /// Called with each detection's timestamp before it is ingested.
    fn observe(&self, _timestamp_ms: u64) {}
}

/// Wall-clock milliseconds since the Unix epoch, for live feeds
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Clock that only moves when told to, or when it observes a later detection.
/// Used for replaying logs and in tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn observe(&self, timestamp_ms: u64) {
        self.now.fetch_max(timestamp_ms, Ordering::SeqCst);
    }
}

/// Runner that advances the feed one event/tick at a time
pub struct Runner<S: DetectionSource, T: Ticker> {
    source: S,
    ticker: T,
}

impl<S: DetectionSource, T: Ticker> Runner<S, T> {
    pub fn new(source: S, ticker: T) -> Self {
        Self { source, ticker }
    }

    /// Blocks up to tick interval and returns the next detection, Tick on
    /// timeout, or Closed once the source is exhausted
    pub fn step(&self) -> FeedEvent {
        match self.source.recv_timeout(self.ticker.interval()) {
            Ok(detection) => FeedEvent::Detection(detection),
            Err(RecvTimeoutError::Timeout) => FeedEvent::Tick,
            Err(RecvTimeoutError::Disconnected) => FeedEvent::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub detections: usize,
    pub reps_completed: usize,
    pub ended_at_ms: u64,
}

/// Pumps the runner into `session` until the source closes, then flushes the
/// session so a final rep still gets evaluated. The session is (re)started at
/// the time of the first detection.
pub fn drive<S, T, C>(session: &mut Session, runner: &Runner<S, T>, clock: &C) -> FeedSummary
where
    S: DetectionSource,
    T: Ticker,
    C: Clock + ?Sized,
{
    let mut summary = FeedSummary::default();
    loop {
        match runner.step() {
            FeedEvent::Detection(detection) => {
                clock.observe(detection.timestamp_ms);
                if summary.detections == 0 {
                    session.start_session(clock.now_ms());
                }
                let before = session.completed_reps().len();
                session.add_detection(&detection, clock.now_ms());
                summary.detections += 1;
                summary.reps_completed += session.completed_reps().len() - before;
            }
            FeedEvent::Tick => {
                summary.reps_completed += session.tick(clock.now_ms());
            }
            FeedEvent::Closed => {
                let (completed, ended_at_ms) = session.finish(clock.now_ms());
                summary.reps_completed += completed;
                summary.ended_at_ms = ended_at_ms;
                return summary;
            }
        }
    }
}
