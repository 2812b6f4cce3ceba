// ============================================================
// Layer 5 — Training Callbacks
// ============================================================
// Learning-rate schedule and stopping rules evaluated by the
// training loop:
//
//   CyclicLr           per batch  — triangular cycle between base and max LR
//   ReduceLrOnPlateau  per epoch  — cuts the held LR when val_loss stalls
//   EarlyStopping      per epoch  — ends training when val_loss stalls for long
//   BestCheckpoint     per epoch  — decides when weights are worth saving
//
// Both LR rules write into one slot, LrSchedule. The cycle rewrites
// it after every batch, so a plateau cut applies to exactly one batch
// before the triangle takes over again.

// ─── Monitor ──────────────────────────────────────────────────────────────────
/// Tracks the best (lowest) value seen of a monitored quantity.
#[derive(Debug, Clone)]
struct Monitor {
    best:      f64,
    min_delta: f64,
}

impl Monitor {
    fn new(min_delta: f64) -> Self {
        Self { best: f64::INFINITY, min_delta }
    }

    /// True (and records the value) when `value` beats the best by more than min_delta.
    fn improved(&mut self, value: f64) -> bool {
        if value < self.best - self.min_delta {
            self.best = value;
            true
        } else {
            false
        }
    }
}

// ─── CyclicLr ─────────────────────────────────────────────────────────────────
/// Triangular cyclical learning rate (Smith, 2017).
///
/// ```text
/// cycle = floor(1 + it / (2 * step_size))
/// x     = |it / step_size - 2 * cycle + 1|
/// lr    = base_lr + (max_lr - base_lr) * max(0, 1 - x)
/// ```
#[derive(Debug, Clone)]
pub struct CyclicLr {
    pub base_lr:   f64,
    pub max_lr:    f64,
    pub step_size: f64,
    iteration:     u64,
}

impl CyclicLr {
    pub fn new(base_lr: f64, max_lr: f64, step_size: f64) -> Self {
        Self { base_lr, max_lr, step_size, iteration: 0 }
    }

    /// Learning rate at a given batch iteration.
    pub fn lr_at(&self, iteration: u64) -> f64 {
        let it    = iteration as f64;
        let cycle = (1.0 + it / (2.0 * self.step_size)).floor();
        let x     = (it / self.step_size - 2.0 * cycle + 1.0).abs();
        self.base_lr + (self.max_lr - self.base_lr) * (1.0 - x).max(0.0)
    }

    /// Rate at the current iteration.
    pub fn current(&self) -> f64 {
        self.lr_at(self.iteration)
    }

    /// Move to the next batch iteration.
    pub fn step(&mut self) {
        self.iteration += 1;
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}

// ─── LrSchedule ───────────────────────────────────────────────────────────────
/// The learning rate the optimiser holds between batches.
///
/// Starts at the cycle's first value. After each batch the cycle
/// overwrites it with the next triangular value; `reduce` multiplies
/// whatever is held at that moment.
#[derive(Debug, Clone)]
pub struct LrSchedule {
    cycle: CyclicLr,
    held:  f64,
}

impl LrSchedule {
    pub fn new(cycle: CyclicLr) -> Self {
        let held = cycle.current();
        Self { cycle, held }
    }

    /// Rate for the coming batch. The cycle then rewrites the held value.
    pub fn next_batch(&mut self) -> f64 {
        let lr = self.held;
        self.cycle.step();
        self.held = self.cycle.current();
        lr
    }

    /// Rate currently held, i.e. the one the next batch would use.
    pub fn current(&self) -> f64 {
        self.held
    }

    pub fn reduce(&mut self, factor: f64) {
        self.held *= factor;
    }

    pub fn iteration(&self) -> u64 {
        self.cycle.iteration()
    }
}

// ─── ReduceLrOnPlateau ────────────────────────────────────────────────────────
/// Signals a learning-rate cut by `factor` once the monitored loss
/// has not improved for `patience` epochs.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor:   f64,
    patience: usize,
    monitor:  Monitor,
    wait:     usize,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f64, patience: usize, min_delta: f64) -> Self {
        Self { factor, patience, monitor: Monitor::new(min_delta), wait: 0 }
    }

    /// Feed the epoch's monitored loss. Returns the factor to apply
    /// to the held learning rate when a cut is due.
    pub fn on_epoch_end(&mut self, value: f64) -> Option<f64> {
        if self.monitor.improved(value) {
            self.wait = 0;
            return None;
        }
        self.wait += 1;
        if self.wait >= self.patience {
            self.wait = 0;
            return Some(self.factor);
        }
        None
    }
}

// ─── EarlyStopping ────────────────────────────────────────────────────────────
/// Requests a stop after `patience` consecutive epochs without improvement.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    monitor:  Monitor,
    wait:     usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self { patience, monitor: Monitor::new(min_delta), wait: 0 }
    }

    /// Feed the epoch's monitored loss. Returns true when training should stop.
    pub fn on_epoch_end(&mut self, value: f64) -> bool {
        if self.monitor.improved(value) {
            self.wait = 0;
            return false;
        }
        self.wait += 1;
        self.wait >= self.patience
    }
}

// ─── BestCheckpoint ───────────────────────────────────────────────────────────
/// Save-best-only policy: any strict improvement is worth saving.
#[derive(Debug, Clone)]
pub struct BestCheckpoint {
    monitor: Monitor,
}

impl BestCheckpoint {
    pub fn new() -> Self {
        Self { monitor: Monitor::new(0.0) }
    }

    pub fn should_save(&mut self, value: f64) -> bool {
        self.monitor.improved(value)
    }

    pub fn best(&self) -> f64 {
        self.monitor.best
    }
}

impl Default for BestCheckpoint {
    fn default() -> Self {
        Self::new()
    }
}
