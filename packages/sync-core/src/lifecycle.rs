//! Process lifecycle abstraction.
//!
//! Provides a [`Lifecycle`] trait for controlling process-level operations
//! like restart and shutdown, so that `Orchestrator`/`PlaybackStateMachine`
//! code can request them without calling `std::process::exit` directly.

/// Trait for process lifecycle operations.
pub trait Lifecycle: Send + Sync {
    /// Requests a restart of the embedding process.
    fn request_restart(&self);

    /// Requests a graceful shutdown of the embedding process.
    fn request_shutdown(&self);
}

/// Lifecycle implementation for the standalone server/client binaries.
///
/// Restart is not directly supported; the binary logs and expects an
/// external supervisor (systemd, a container orchestrator) to restart it.
/// Shutdown triggers a clean process exit.
pub struct ProcessLifecycle;

impl Lifecycle for ProcessLifecycle {
    fn request_restart(&self) {
        tracing::info!("restart requested - process requires external supervision to restart");
    }

    fn request_shutdown(&self) {
        tracing::info!("shutdown requested");
        std::process::exit(0);
    }
}

/// No-op lifecycle for tests or embedded use.
pub struct NoopLifecycle;

impl Lifecycle for NoopLifecycle {
    fn request_restart(&self) {
        tracing::debug!("restart requested (no-op)");
    }

    fn request_shutdown(&self) {
        tracing::debug!("shutdown requested (no-op)");
    }
}
