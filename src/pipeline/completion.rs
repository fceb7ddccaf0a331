//! One-shot completion signal shared by a producer and the wait phase
//!
//! The HTTP probe (or the external signal listener) owns the [`Completion`];
//! the wait phase owns the matching [`CompletionSignal`]. Firing consumes the
//! producer so it cannot fire twice. Dropping the producer without firing also
//! releases the waiter, the same way closing a channel would. Making sure the
//! producer eventually fires or drops is the producer's job.

use tokio::sync::oneshot;

/// Producer half
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<()>,
}

/// Consumer half
#[derive(Debug)]
pub struct CompletionSignal {
    rx: oneshot::Receiver<()>,
}

/// Creates a connected producer/consumer pair
pub fn completion() -> (Completion, CompletionSignal) {
    let (tx, rx) = oneshot::channel();
    (Completion { tx }, CompletionSignal { rx })
}

impl Completion {
    pub fn fire(self) {
        // The waiter may already be gone when the run failed early.
        let _ = self.tx.send(());
    }
}

impl CompletionSignal {
    /// Waits until the producer fires or is dropped.
    ///
    /// Returns `true` when it fired, `false` when it was dropped.
    pub async fn wait(self) -> bool {
        self.rx.await.is_ok()
    }
}
