//! Boundary to the host's experiment/performance-timer subsystem.
//!
//! The engine only signals experiment boundaries; frame timing, histograms, and reporting are
//! the collaborator's business.

/// A trait for the experiment-timing collaborator.
pub trait ExperimentTimer {
    /// Records the application build version. Called once at engine init.
    fn set_build_version(&self, build_version: &str);
    /// Signals the start of a named measurement window.
    fn begin_experiment(&self, name: &str);
    /// Signals the end of the current measurement window.
    fn end_experiment(&self);
}

/// A timer that ignores all signals.
pub struct NoopExperimentTimer;
impl ExperimentTimer for NoopExperimentTimer {
    fn set_build_version(&self, _build_version: &str) {}
    fn begin_experiment(&self, _name: &str) {}
    fn end_experiment(&self) {}
}
