// ABOUTME: Operator interrupt flag shared between the signal listener and the orchestrator.
// ABOUTME: Once set it stays set; phases poll it or race against it.

use std::sync::Arc;
use tokio::sync::watch;

/// Tells the orchestrator the operator asked to stop.
#[derive(Debug, Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    /// A flag nothing sets except [`Interrupt::trigger`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the flag on ctrl-c or SIGTERM. Installing the listeners also
    /// keeps the default handlers from killing the process mid-deploy.
    pub fn listen_for_signals() -> Self {
        let interrupt = Self::new();
        let tx = interrupt.tx.clone();
        let mut terminate = Terminate::install();
        tokio::spawn(async move {
            loop {
                let signal = tokio::select! {
                    received = tokio::signal::ctrl_c() => {
                        if let Err(e) = received {
                            tracing::warn!("could not listen for ctrl-c: {}", e);
                            return;
                        }
                        "ctrl-c"
                    }
                    () = terminate.recv() => "SIGTERM",
                };
                if tx.send_replace(true) {
                    tracing::warn!("{} received, interrupt already pending", signal);
                } else {
                    tracing::warn!("{} received, interrupting deployment", signal);
                }
            }
        });
        interrupt
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is set.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so this only returns once set.
        let _ = rx.wait_for(|set| *set).await;
    }
}

/// SIGTERM stream; never fires where unavailable.
struct Terminate {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl Terminate {
    fn install() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let signal = match signal(SignalKind::terminate()) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    tracing::warn!("could not listen for SIGTERM: {}", e);
                    None
                }
            };
            Self { signal }
        }
        #[cfg(not(unix))]
        Self {}
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(signal) = &mut self.signal
            && signal.recv().await.is_some()
        {
            return;
        }
        std::future::pending::<()>().await
    }
}
