//! Bridge from process signals to the run's cancellation token.
//!
//! The first interrupt or termination notification marks the run as
//! interrupted and cancels the token. Later notifications are counted and
//! otherwise ignored. The bridge is a guard: dropping it stops the listener
//! tasks and releases the signal streams.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct BridgeState {
    interrupted: AtomicBool,
    deliveries: AtomicU32,
}

impl BridgeState {
    /// Returns true only for the delivery that cancelled the token.
    fn deliver(&self, token: &CancellationToken) -> bool {
        let delivery = self.deliveries.fetch_add(1, Ordering::SeqCst) + 1;
        if self.interrupted.swap(true, Ordering::SeqCst) {
            debug!(delivery, "Repeated interrupt ignored");
            return false;
        }
        warn!("Interrupt received, cancelling installation");
        token.cancel();
        true
    }
}

#[derive(Debug)]
pub struct CancellationBridge {
    token: CancellationToken,
    state: Arc<BridgeState>,
    tasks: Vec<JoinHandle<()>>,
}

impl CancellationBridge {
    /// Listen for SIGINT and SIGTERM (Ctrl-C only on non-unix targets).
    ///
    /// Must be called from within a tokio runtime.
    pub fn install(token: CancellationToken) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel(4);
        let forwarder = spawn_signal_forwarder(tx)?;
        let mut bridge = Self::from_notifications(token, rx);
        bridge.tasks.push(forwarder);
        Ok(bridge)
    }

    /// Drive the bridge from an in-process notification channel.
    pub fn from_notifications(token: CancellationToken, mut rx: mpsc::Receiver<()>) -> Self {
        let state = Arc::new(BridgeState::default());
        let listener = tokio::spawn({
            let token = token.clone();
            let state = Arc::clone(&state);
            async move {
                while rx.recv().await.is_some() {
                    state.deliver(&token);
                }
            }
        });

        Self {
            token,
            state,
            tasks: vec![listener],
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once a notification has been delivered.
    pub fn interrupted(&self) -> bool {
        self.state.interrupted.load(Ordering::SeqCst)
    }

    /// Number of notifications received, including ignored repeats.
    pub fn deliveries(&self) -> u32 {
        self.state.deliveries.load(Ordering::SeqCst)
    }
}

impl Drop for CancellationBridge {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        debug!(
            interrupted = self.interrupted(),
            "Cancellation bridge released"
        );
    }
}

#[cfg(unix)]
fn spawn_signal_forwarder(tx: mpsc::Sender<()>) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                s = interrupt.recv() => s,
                s = terminate.recv() => s,
            };
            if received.is_none() {
                break;
            }
            // A full channel already holds an undelivered interrupt.
            if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(()) {
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_signal_forwarder(tx: mpsc::Sender<()>) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(()) {
                break;
            }
        }
    }))
}
