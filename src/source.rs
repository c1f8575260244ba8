use crate::types::PoseSample;
use crate::{Result, TrackcalError};
use crossbeam_channel::{Receiver, TryRecvError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic time in seconds, shared by sources and the engine so sample
/// timestamps and query times are comparable.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Seconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Externally driven clock for tests and offline replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    pub fn set(&self, t: f64) {
        self.bits.store(t.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, dt: f64) {
        let _ = self
            .bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| {
                Some((f64::from_bits(b) + dt).to_bits())
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Anything that produces pose samples: a hardware binding or the simulator.
///
/// `try_get_sample` never blocks for long. When nothing is ready it returns
/// [`TrackcalError::NoSampleAvailable`], which callers retry on the next poll.
pub trait PoseSource: Send {
    fn try_get_sample(&mut self) -> Result<PoseSample>;

    fn is_connected(&self) -> bool;

    /// Re-zero the tracking origin at the current pose, if supported.
    fn recenter(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "pose-source"
    }
}

impl<S: PoseSource + ?Sized> PoseSource for Box<S> {
    fn try_get_sample(&mut self) -> Result<PoseSample> {
        (**self).try_get_sample()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn recenter(&mut self) -> Result<()> {
        (**self).recenter()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Source fed by another thread through a crossbeam channel, e.g. a device
/// reader loop pushing decoded poses.
pub struct ChannelSource {
    receiver: Receiver<PoseSample>,
    disconnected: bool,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<PoseSample>) -> Self {
        Self {
            receiver,
            disconnected: false,
        }
    }

    /// A bounded channel pair: push into the sender, poll the source.
    pub fn bounded(capacity: usize) -> (crossbeam_channel::Sender<PoseSample>, Self) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (sender, Self::new(receiver))
    }
}

impl PoseSource for ChannelSource {
    fn try_get_sample(&mut self) -> Result<PoseSample> {
        match self.receiver.try_recv() {
            Ok(sample) => Ok(sample),
            Err(TryRecvError::Empty) => Err(TrackcalError::NoSampleAvailable),
            Err(TryRecvError::Disconnected) => {
                if !self.disconnected {
                    log::info!("Channel source disconnected");
                    self.disconnected = true;
                }
                Err(TrackcalError::SourceDisconnected)
            }
        }
    }

    fn is_connected(&self) -> bool {
        !self.disconnected
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;
