// src/barrier.rs
//! Fan-in accounting for batches of independent units of work.

/// Aggregate result once every unit has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Counts arrivals down from the number of units fanned out. The summary is
/// produced exactly once, by the arrival that brings the count to zero.
#[derive(Debug)]
pub struct CountingBarrier {
    total: usize,
    remaining: usize,
    failed: usize,
}

impl CountingBarrier {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            remaining: total,
            failed: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// Records one unit; returns the summary when it was the last one.
    pub fn arrive(&mut self, succeeded: bool) -> Option<BatchSummary> {
        if self.remaining == 0 {
            tracing::warn!(
                component = "CountingBarrier",
                total = self.total,
                "arrival after the batch completed"
            );
            return None;
        }
        self.remaining -= 1;
        if !succeeded {
            self.failed += 1;
        }
        if self.remaining == 0 {
            Some(self.summary_unchecked())
        } else {
            None
        }
    }

    /// The summary, if every unit has arrived. An empty batch is complete
    /// from the start.
    pub fn summary(&self) -> Option<BatchSummary> {
        self.is_complete().then(|| self.summary_unchecked())
    }

    fn summary_unchecked(&self) -> BatchSummary {
        BatchSummary {
            total: self.total,
            succeeded: self.total - self.failed,
            failed: self.failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_emitted_on_last_arrival() {
        let mut barrier = CountingBarrier::new(3);
        assert_eq!(barrier.arrive(true), None);
        assert_eq!(barrier.arrive(false), None);
        let summary = barrier.arrive(true).unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn extra_arrivals_are_ignored() {
        let mut barrier = CountingBarrier::new(1);
        assert!(barrier.arrive(true).is_some());
        assert!(barrier.arrive(false).is_none());
        assert!(barrier.summary().unwrap().is_success());
    }

    #[test]
    fn empty_batch_is_complete() {
        let barrier = CountingBarrier::new(0);
        assert!(barrier.is_complete());
        assert_eq!(barrier.summary().unwrap().total, 0);
    }
}
