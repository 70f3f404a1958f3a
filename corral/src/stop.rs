//! Cooperative stop signal.
//!
//! A [`StopSignal`] is a clonable flag that runners poll between steps. It can
//! be raised directly with [`StopSignal::request_stop`] or fed from process
//! interrupts (Ctrl-C / SIGINT) with [`StopSignal::listen_for_interrupt`].

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
pub use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. one shared with a service's shutdown path.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            listener: Arc::default(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn request_stop(&self) {
        self.token.cancel();
    }

    /// Non-blocking check.
    pub fn is_stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until a stop is requested.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }

    /// Raise this signal when the process receives an interrupt.
    ///
    /// Must be called from within a tokio runtime. Calling it again while a
    /// listener is registered is a no-op.
    pub fn listen_for_interrupt(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if listener.is_some() {
            return;
        }

        let token = self.token.clone();
        *listener = Some(tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Interrupt received, requesting stop");
                    token.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "Failed to listen for interrupt"),
            }
        }));
        tracing::trace!("Interrupt listener registered");
    }

    /// Stop feeding interrupts into this signal. A stop already requested stays requested.
    ///
    /// tokio keeps its process-wide handler installed, so later interrupts
    /// no longer terminate the process.
    pub fn stop_listening(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = listener {
            handle.abort();
            tracing::trace!("Interrupt listener removed");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
