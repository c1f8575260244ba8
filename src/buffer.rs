use crate::types::PoseSample;
use crate::Result;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 1000;

/// Fixed-capacity FIFO history of recent pose samples.
///
/// Appending at capacity evicts the oldest sample. Readers get owned copies
/// through [`SampleHistory::snapshot`] so they never observe a half-applied
/// mutation.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    samples: VecDeque<PoseSample>,
    capacity: usize,
}

impl SampleHistory {
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full.
    ///
    /// Samples carrying NaN or infinite values are rejected.
    pub fn append(&mut self, sample: PoseSample) -> Result<()> {
        sample.check_finite()?;
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        Ok(())
    }

    /// Owned copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<PoseSample> {
        self.samples.iter().copied().collect()
    }

    /// Owned copy of the newest `n` samples, oldest first.
    pub fn recent(&self, n: usize) -> Vec<PoseSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn latest(&self) -> Option<&PoseSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoseSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackcalError;

    fn sample(i: usize) -> PoseSample {
        PoseSample::new([i as f64, 0.0, 1.0], [0.0; 3], i as f64 * 0.01)
    }

    #[test]
    fn test_evicts_oldest_first() {
        let capacity = 10;
        let extra = 7;
        let mut history = SampleHistory::with_capacity(capacity);

        for i in 0..capacity + extra {
            history.append(sample(i)).unwrap();
            assert!(history.len() <= capacity);
        }

        let snap = history.snapshot();
        assert_eq!(snap.len(), capacity);
        for (k, s) in snap.iter().enumerate() {
            assert_eq!(*s, sample(extra + k));
        }
    }

    #[test]
    fn test_rejects_non_finite() {
        let mut history = SampleHistory::with_capacity(4);
        history.append(sample(0)).unwrap();

        let bad = PoseSample::new([f64::NAN, 0.0, 0.0], [0.0; 3], 1.0);
        assert!(matches!(
            history.append(bad),
            Err(TrackcalError::InvalidSample(_))
        ));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut history = SampleHistory::with_capacity(4);
        history.append(sample(1)).unwrap();
        let snap = history.snapshot();
        history.append(sample(2)).unwrap();
        history.clear();
        assert_eq!(snap, vec![sample(1)]);
        assert!(history.is_empty());
    }

    #[test]
    fn test_recent() {
        let mut history = SampleHistory::with_capacity(8);
        for i in 0..5 {
            history.append(sample(i)).unwrap();
        }
        assert_eq!(history.recent(2), vec![sample(3), sample(4)]);
        assert_eq!(history.recent(50).len(), 5);
        assert_eq!(history.latest(), Some(&sample(4)));
    }

    #[test]
    fn test_zero_capacity_raised() {
        let mut history = SampleHistory::with_capacity(0);
        history.append(sample(1)).unwrap();
        history.append(sample(2)).unwrap();
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.snapshot(), vec![sample(2)]);
    }
}
