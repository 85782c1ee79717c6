// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fixed-capacity moving window of samples.
//!
//! Appends are O(1) and overwrite the oldest sample once the window is full.
//! The window itself is not synchronised; shared owners wrap it in a lock
//! (see [`crate::sensor::Sensor`] and [`crate::curve::FanCurveData`]).

/// A circular buffer holding at most `capacity` samples.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: Vec<f64>,
    capacity: usize,
    /// Slot the next append writes to once the buffer is full.
    next: usize,
}

impl RollingWindow {
    /// Create an empty window. A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    /// Append a sample, discarding the oldest one when full.
    pub fn append(&mut self, value: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push(value);
        } else {
            self.samples[self.next] = value;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Apply an aggregation over the samples currently held.
    ///
    /// Samples are passed in storage order, not insertion order.
    pub fn reduce<F>(&self, f: F) -> f64
    where
        F: FnOnce(&[f64]) -> f64,
    {
        f(&self.samples)
    }

    /// Arithmetic mean of the held samples (0 when empty).
    pub fn mean(&self) -> f64 {
        self.reduce(mean)
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

/// Unweighted arithmetic mean; an empty slice averages to 0.
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}
