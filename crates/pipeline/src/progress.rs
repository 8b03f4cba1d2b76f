use std::time::Instant;

/// Block counter that decides when a pass should log progress
#[derive(Debug)]
pub struct PassProgress {
    interval: u64,
    total: Option<u64>,
    blocks: u64,
    started: Instant,
}

impl PassProgress {
    pub fn new(interval: u64, total: Option<u64>) -> Self {
        Self {
            interval: interval.max(1),
            total,
            blocks: 0,
            started: Instant::now(),
        }
    }

    /// Count one block; returns true when a progress line is due
    pub fn block_done(&mut self) -> bool {
        self.blocks += 1;
        self.blocks % self.interval == 0
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Blocks per second since the pass started
    pub fn rate(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.blocks as f64 / secs
        } else {
            0.0
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}
