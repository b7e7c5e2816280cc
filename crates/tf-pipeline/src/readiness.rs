//! Readiness and fault-injection flags.

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide health flags shared by the status routes and the branch workers.
///
/// Written by one task each (the engine warm-up, the fault toggle) and read
/// from every request, so plain atomics are enough.
#[derive(Debug, Default)]
pub struct Readiness {
    engine_ready: AtomicBool,
    fault_mode: AtomicBool,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the transform engine finished initializing.
    pub fn mark_engine_ready(&self) {
        self.engine_ready.store(true, Ordering::Release);
    }

    pub fn engine_ready(&self) -> bool {
        self.engine_ready.load(Ordering::Acquire)
    }

    /// Force branch workers into simulated failure (or back).
    pub fn set_fault_mode(&self, on: bool) {
        self.fault_mode.store(on, Ordering::Release);
    }

    pub fn fault_mode(&self) -> bool {
        self.fault_mode.load(Ordering::Acquire)
    }

    /// Whether `/ready` should report 200.
    pub fn is_ready(&self) -> bool {
        self.engine_ready() && !self.fault_mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_ready() {
        let r = Readiness::new();
        assert!(!r.is_ready());
        assert!(!r.fault_mode());
    }

    #[test]
    fn ready_after_engine() {
        let r = Readiness::new();
        r.mark_engine_ready();
        assert!(r.is_ready());
    }

    #[test]
    fn fault_mode_overrides_ready() {
        let r = Readiness::new();
        r.mark_engine_ready();
        r.set_fault_mode(true);
        assert!(!r.is_ready());
        r.set_fault_mode(false);
        assert!(r.is_ready());
    }
}
