//! Scoped acquisition of the shared compute device.
//!
//! Separation and conversion borrow the accelerator for the length of one
//! call. The scope releases it on drop so cached memory is returned on every
//! exit path, including errors and panics unwinding through the stage.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for the device whose cached memory must be released after use.
pub trait Accelerator: Send + Sync {
    fn acquire(&self, purpose: &'static str);

    fn release(&self, purpose: &'static str);
}

/// Held while one stage uses the accelerator.
#[must_use = "the accelerator is released as soon as the scope is dropped"]
pub struct AcceleratorScope {
    device: Arc<dyn Accelerator>,
    purpose: &'static str,
}

impl AcceleratorScope {
    pub fn enter(device: Arc<dyn Accelerator>, purpose: &'static str) -> Self {
        device.acquire(purpose);
        Self { device, purpose }
    }
}

impl Drop for AcceleratorScope {
    fn drop(&mut self) {
        self.device.release(self.purpose);
    }
}

/// For engines that run out of process and manage their own memory.
#[derive(Debug, Default)]
pub struct NoopAccelerator;

impl Accelerator for NoopAccelerator {
    fn acquire(&self, _purpose: &'static str) {}

    fn release(&self, purpose: &'static str) {
        tracing::trace!(purpose, "accelerator released");
    }
}

/// Counts acquisitions and releases.
#[derive(Debug, Default)]
pub struct TrackingAccelerator {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl TrackingAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Scopes currently open.
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

impl Accelerator for TrackingAccelerator {
    fn acquire(&self, purpose: &'static str) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(purpose, "accelerator acquired");
    }

    fn release(&self, purpose: &'static str) {
        self.released.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(purpose, "accelerator released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_releases_on_drop() {
        let device = Arc::new(TrackingAccelerator::new());
        {
            let _scope = AcceleratorScope::enter(device.clone(), "separate");
            assert_eq!(device.outstanding(), 1);
        }
        assert_eq!(device.acquired(), 1);
        assert_eq!(device.released(), 1);
    }

    #[test]
    fn scope_releases_on_early_error_return() {
        fn failing_stage(device: Arc<dyn Accelerator>) -> Result<(), String> {
            let _scope = AcceleratorScope::enter(device, "convert");
            Err("engine crashed".to_string())
        }

        let device = Arc::new(TrackingAccelerator::new());
        assert!(failing_stage(device.clone()).is_err());
        assert_eq!(device.outstanding(), 0);
    }

    #[test]
    fn scope_releases_on_panic() {
        let device = Arc::new(TrackingAccelerator::new());
        let inner = device.clone();
        let result = std::panic::catch_unwind(move || {
            let _scope = AcceleratorScope::enter(inner, "convert");
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(device.released(), 1);
    }
}
