use tracing::info;

/// Scales the learning rate down when a monitored loss stops improving.
///
/// A value improves on the best seen so far when it is lower by more than the
/// relative `threshold`. After more than `patience` epochs without improvement
/// the rate is multiplied by `factor`, never going below `min_lr`.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor: f64,
    patience: usize,
    min_lr: f64,
    threshold: f64,
    eps: f64,
    best: f64,
    num_bad_epochs: usize,
}

impl Default for ReduceLrOnPlateau {
    fn default() -> Self {
        Self::new(0.7, 3, 1e-5)
    }
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            factor,
            patience,
            min_lr,
            threshold: 1e-4,
            eps: 1e-8,
            best: f64::INFINITY,
            num_bad_epochs: 0,
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn num_bad_epochs(&self) -> usize {
        self.num_bad_epochs
    }

    /// Records `metric` and returns the learning rate to use from now on.
    pub fn step(&mut self, metric: f64, lr: f64) -> f64 {
        if metric < self.best * (1.0 - self.threshold) {
            self.best = metric;
            self.num_bad_epochs = 0;
        } else {
            self.num_bad_epochs += 1;
        }

        if self.num_bad_epochs > self.patience {
            self.num_bad_epochs = 0;
            let reduced = (lr * self.factor).max(self.min_lr);
            if lr - reduced > self.eps {
                info!("reducing learning rate from {lr:.4e} to {reduced:.4e}");
                return reduced;
            }
        }
        lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduces_after_patience() {
        let mut scheduler = ReduceLrOnPlateau::default();
        let mut lr = 1e-3;
        lr = scheduler.step(1.0, lr);
        for _ in 0..3 {
            lr = scheduler.step(1.0, lr);
            assert_eq!(lr, 1e-3);
        }
        lr = scheduler.step(1.0, lr);
        assert!((lr - 7e-4).abs() < 1e-12);
        assert_eq!(scheduler.num_bad_epochs(), 0);
    }

    #[test]
    fn test_improvement_resets() {
        let mut scheduler = ReduceLrOnPlateau::default();
        let mut lr = 1e-3;
        for metric in [1.0, 1.0, 1.0, 0.5, 0.5, 0.5, 0.5] {
            lr = scheduler.step(metric, lr);
        }
        assert_eq!(lr, 1e-3);
        assert_eq!(scheduler.best(), 0.5);
        // within the relative threshold counts as no improvement
        scheduler.step(0.49999, lr);
        assert_eq!(scheduler.best(), 0.5);
    }

    #[test]
    fn test_min_lr_floor() {
        let mut scheduler = ReduceLrOnPlateau::new(0.1, 0, 1e-5);
        let mut lr = 2e-5;
        lr = scheduler.step(1.0, lr);
        assert_eq!(lr, 2e-5);
        lr = scheduler.step(1.0, lr);
        assert_eq!(lr, 1e-5);
        lr = scheduler.step(1.0, lr);
        assert_eq!(lr, 1e-5);
    }
}
