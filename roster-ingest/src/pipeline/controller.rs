//! Adaptive flush threshold
//!
//! Conservative AIMD: grow slowly after sustained success, shrink immediately on
//! any retry. The threshold never leaves `[floor, ceiling]`.

use crate::config::ImportConfig;

#[derive(Debug, Clone)]
pub struct AdaptiveBatchController {
    threshold: usize,
    floor: usize,
    ceiling: usize,
    growth_factor: f64,
    shrink_factor: f64,
    grow_every: u32,
    commits_since_growth: u32,
}

impl AdaptiveBatchController {
    pub fn new(config: &ImportConfig) -> Self {
        let floor = config.min_batch_size.max(1);
        let ceiling = config.max_batch_size.max(floor);
        Self {
            threshold: config.initial_batch_size.clamp(floor, ceiling),
            floor,
            ceiling,
            growth_factor: config.growth_factor,
            shrink_factor: config.shrink_factor,
            grow_every: config.grow_every.max(1),
            commits_since_growth: 0,
        }
    }

    /// Current flush threshold
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn bounds(&self) -> (usize, usize) {
        (self.floor, self.ceiling)
    }

    /// Account for one committed batch; returns true when the threshold grew
    pub fn on_commit(&mut self) -> bool {
        self.commits_since_growth += 1;
        if self.commits_since_growth < self.grow_every {
            return false;
        }
        self.commits_since_growth = 0;

        let previous = self.threshold;
        let scaled = (previous as f64 * self.growth_factor).floor() as usize;
        self.threshold = scaled.max(previous + 1).min(self.ceiling);

        if self.threshold != previous {
            tracing::debug!(
                from = previous,
                to = self.threshold,
                "Batch threshold increased after sustained success"
            );
        }
        self.threshold != previous
    }

    /// Account for one retry; returns the new threshold
    pub fn on_retry(&mut self) -> usize {
        let previous = self.threshold;
        let scaled = (previous as f64 * self.shrink_factor).floor() as usize;
        self.threshold = scaled.clamp(self.floor, self.ceiling);
        self.commits_since_growth = 0;

        tracing::debug!(
            from = previous,
            to = self.threshold,
            "Batch threshold decreased after retry"
        );
        self.threshold
    }
}
