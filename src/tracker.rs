use crate::bounds::{Axis, Direction, SampleClass};
use crate::config::TrackerConfig;
use crate::engine::{SharedEngine, TrackingEngine};
use crate::source::PoseSource;
use crate::types::PoseSample;
use crate::{Result, TrackcalError};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// What happened to one poll of the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackingEvent {
    /// Stored in bounds.
    Sample(PoseSample),
    /// Stored, but outside the tracking bounds.
    OutOfBounds {
        sample: PoseSample,
        axis: Axis,
        direction: Direction,
    },
    /// Source reported lost tracking.
    TrackingLost { timestamp: f64 },
    /// Refused by the engine (non-finite values).
    Rejected { timestamp: f64 },
    /// Source went away; the loop exits after this.
    Disconnected,
}

/// Poll loop counters, readable while the tracker runs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackerStats {
    pub polls: u64,
    pub samples: u64,
    /// Polls where the source had nothing ready.
    pub misses: u64,
    /// Events dropped because the channel was full.
    pub dropped_events: u64,
    /// Polls per second since start.
    pub poll_rate: f64,
}

#[derive(Default)]
struct Counters {
    polls: AtomicU64,
    samples: AtomicU64,
    misses: AtomicU64,
    dropped_events: AtomicU64,
}

/// Handle to a running poll loop.
///
/// A background thread pulls from the source at the configured rate, feeds
/// every sample through the shared engine and publishes a [`TrackingEvent`].
pub struct Tracker {
    engine: SharedEngine,
    events: Receiver<TrackingEvent>,
    source: Arc<Mutex<Box<dyn PoseSource>>>,
    stop_flag: Arc<AtomicBool>,
    counters: Arc<Counters>,
    started: Instant,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Tracker {
    /// Start polling `source` into `engine`.
    pub fn start(
        source: Box<dyn PoseSource>,
        engine: SharedEngine,
        config: TrackerConfig,
    ) -> Result<Tracker> {
        config.validate()?;
        let (sender, events) = crossbeam_channel::bounded(config.event_capacity);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());
        let source = Arc::new(Mutex::new(source));

        let worker = PollWorker {
            source: source.clone(),
            engine: engine.clone(),
            sender,
            stop_flag: stop_flag.clone(),
            counters: counters.clone(),
            interval: config.poll_interval()?,
        };
        let thread = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| TrackcalError::Worker(format!("Failed to spawn poll thread: {}", e)))?;

        Ok(Tracker {
            engine,
            events,
            source,
            stop_flag,
            counters,
            started: Instant::now(),
            thread: Some(thread),
        })
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// Receiver for poll events. Cloneable; events are dropped when nobody
    /// drains it fast enough.
    pub fn events(&self) -> &Receiver<TrackingEvent> {
        &self.events
    }

    /// Receive the next event with a timeout.
    pub fn recv_event_timeout(&self, timeout: Duration) -> Result<TrackingEvent> {
        self.events.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => TrackcalError::NoSampleAvailable,
            crossbeam_channel::RecvTimeoutError::Disconnected => TrackcalError::ChannelDisconnected,
        })
    }

    pub fn is_running(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stats(&self) -> TrackerStats {
        let polls = self.counters.polls.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64();
        TrackerStats {
            polls,
            samples: self.counters.samples.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            dropped_events: self.counters.dropped_events.load(Ordering::Relaxed),
            poll_rate: if elapsed > 0.0 {
                polls as f64 / elapsed
            } else {
                0.0
            },
        }
    }

    /// Recenter the source and clear the engine's history.
    pub fn reset_center(&self) -> Result<()> {
        lock(&self.source).recenter()?;
        lock(&self.engine).reset_history();
        log::info!("Tracking recentered");
        Ok(())
    }

    /// Stop the loop and hand the source back so tracking can resume later.
    /// Calibration progress lives in the engine and is unaffected.
    pub fn stop(mut self) -> Box<dyn PoseSource> {
        self.shutdown();
        let placeholder: Box<dyn PoseSource> = Box::new(Stopped);
        let source = std::mem::replace(&mut *lock(&self.source), placeholder);
        source
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Poll thread panicked");
            }
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Stand-in left behind once `stop` has taken the real source.
struct Stopped;

impl PoseSource for Stopped {
    fn try_get_sample(&mut self) -> Result<PoseSample> {
        Err(TrackcalError::SourceDisconnected)
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// Lock ignoring poisoning: a panic on another thread leaves the data intact
/// for our purposes.
fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PollWorker {
    source: Arc<Mutex<Box<dyn PoseSource>>>,
    engine: SharedEngine,
    sender: Sender<TrackingEvent>,
    stop_flag: Arc<AtomicBool>,
    counters: Arc<Counters>,
    interval: Duration,
}

impl PollWorker {
    fn run(self) {
        log::info!(
            "Poll loop started ({:.1} Hz, source '{}')",
            1.0 / self.interval.as_secs_f64(),
            lock(&self.source).name()
        );
        let mut next_tick = Instant::now();

        loop {
            if self.stop_flag.load(Ordering::Relaxed) {
                log::info!("Poll loop stopping (stop flag set)");
                break;
            }

            if !self.poll_once() {
                break;
            }

            // Fixed cadence; if a poll overran, restart the schedule from now.
            next_tick += self.interval;
            let now = Instant::now();
            if next_tick > now {
                std::thread::sleep(next_tick - now);
            } else {
                next_tick = now;
            }
        }
    }

    /// One poll. Returns false when the loop should exit.
    fn poll_once(&self) -> bool {
        self.counters.polls.fetch_add(1, Ordering::Relaxed);
        let result = lock(&self.source).try_get_sample();
        let sample = match result {
            Ok(sample) => sample,
            Err(TrackcalError::NoSampleAvailable) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            Err(TrackcalError::SourceDisconnected) => {
                log::warn!("Pose source disconnected, stopping poll loop");
                let _ = self.sender.try_send(TrackingEvent::Disconnected);
                return false;
            }
            Err(e) => {
                log::warn!("Pose source error: {}", e);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        };
        self.counters.samples.fetch_add(1, Ordering::Relaxed);

        let outcome = ingest(&self.engine, sample);
        let event = match outcome {
            Ok(SampleClass::InBounds) => TrackingEvent::Sample(sample),
            Ok(SampleClass::OutOfBounds(axis, direction)) => TrackingEvent::OutOfBounds {
                sample,
                axis,
                direction,
            },
            Ok(SampleClass::Invalid) => TrackingEvent::TrackingLost {
                timestamp: sample.timestamp,
            },
            Err(_) => TrackingEvent::Rejected {
                timestamp: sample.timestamp,
            },
        };

        if let Err(e) = self.sender.try_send(event) {
            match e {
                TrySendError::Full(_) => {
                    self.counters.dropped_events.fetch_add(1, Ordering::Relaxed);
                    log::trace!("Event channel full, dropping event");
                }
                // Nobody listening; tracking still feeds the engine.
                TrySendError::Disconnected(_) => {}
            }
        }
        true
    }
}

fn ingest(engine: &Mutex<TrackingEngine>, sample: PoseSample) -> Result<SampleClass> {
    lock(engine).ingest(sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::source::ChannelSource;

    fn fast() -> TrackerConfig {
        TrackerConfig {
            poll_hz: 1000.0,
            ..TrackerConfig::default()
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_feeds_engine_and_publishes_events() {
        let engine = TrackingEngine::new(EngineConfig::default())
            .unwrap()
            .into_shared();
        let (tx, source) = ChannelSource::bounded(16);
        let tracker = Tracker::start(Box::new(source), engine.clone(), fast()).unwrap();

        tx.send(PoseSample::new([0.0, 0.0, 1.5], [0.0; 3], 0.0)).unwrap();
        tx.send(PoseSample::new([5.0, 0.0, 1.5], [0.0; 3], 0.01)).unwrap();
        tx.send(PoseSample::lost(0.02)).unwrap();

        let first = tracker.recv_event_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first, TrackingEvent::Sample(_)));
        let second = tracker.recv_event_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            second,
            TrackingEvent::OutOfBounds {
                axis: Axis::X,
                direction: Direction::Above,
                ..
            }
        ));
        let third = tracker.recv_event_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(third, TrackingEvent::TrackingLost { timestamp: 0.02 });

        assert_eq!(lock(&engine).history_len(), 2);
        assert!(tracker.stats().samples >= 3);
        tracker.stop();
    }

    #[test]
    fn test_disconnect_ends_loop() {
        let engine = TrackingEngine::new(EngineConfig::default())
            .unwrap()
            .into_shared();
        let (tx, source) = ChannelSource::bounded(4);
        let tracker = Tracker::start(Box::new(source), engine, fast()).unwrap();
        drop(tx);

        let event = tracker.recv_event_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, TrackingEvent::Disconnected);
        assert!(wait_for(|| !tracker.is_running()));
    }

    #[test]
    fn test_stop_returns_source() {
        let engine = TrackingEngine::new(EngineConfig::default())
            .unwrap()
            .into_shared();
        let (tx, source) = ChannelSource::bounded(4);
        let tracker = Tracker::start(Box::new(source), engine.clone(), fast()).unwrap();
        assert!(wait_for(|| tracker.stats().misses > 0));
        let source = tracker.stop();
        assert_eq!(source.name(), "channel");

        // restart on the same source and engine
        let tracker = Tracker::start(source, engine.clone(), fast()).unwrap();
        tx.send(PoseSample::new([0.0, 0.0, 1.5], [0.0; 3], 1.0)).unwrap();
        assert!(wait_for(|| lock(&engine).history_len() == 1));
        tracker.stop();
    }

    #[test]
    fn test_invalid_config() {
        let engine = TrackingEngine::new(EngineConfig::default())
            .unwrap()
            .into_shared();
        // 1e-300 Hz is positive but its interval overflows a Duration.
        for poll_hz in [0.0, 1e-300] {
            let (_tx, source) = ChannelSource::bounded(1);
            let config = TrackerConfig {
                poll_hz,
                ..TrackerConfig::default()
            };
            assert!(matches!(
                Tracker::start(Box::new(source), engine.clone(), config),
                Err(TrackcalError::InvalidConfig(_))
            ));
        }
    }
}
