use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Process-wide shutdown signal.
///
/// Every stage execution runs under a child of [`ShutdownCoordinator::token`],
/// so Ctrl-C interrupts in-flight waits and external commands.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            info!("Shutdown requested");
        }
        self.token.cancel();
    }

    /// Cancel the token on Ctrl-C. Runs until the signal or until cancelled elsewhere.
    pub fn listen_for_ctrl_c(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => info!("Received Ctrl-C, interrupting running stages"),
                        Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
                    }
                    coordinator.trigger();
                }
                _ = coordinator.token.cancelled() => {}
            }
        })
    }
}
