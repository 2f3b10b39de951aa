//! Completion counting and shutdown signalling.

use tokio::sync::watch;

/// Counts finished background activities and wakes a waiter at a target
///
/// The router waits for `2 * N` completions: one per process exit and one
/// per drained outbound channel.
#[derive(Debug)]
pub struct CompletionCounter {
    tx: watch::Sender<usize>,
}

impl Default for CompletionCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionCounter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn complete(&self) {
        self.tx.send_modify(|count| *count += 1);
    }

    pub fn count(&self) -> usize {
        *self.tx.borrow()
    }

    /// Resolve once at least `target` completions were recorded
    pub async fn wait_for(&self, target: usize) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|count| *count >= target).await;
    }
}

/// One-shot, level-triggered stop request
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of a [`ShutdownSignal`]
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once shutdown was triggered (or the signal was dropped)
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
