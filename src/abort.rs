use std::{future::Future, io, io::BufRead};
use tokio::task::JoinHandle;

use crate::signals::Latch;

/// Input the operator can press Enter on to cancel the pending login.
pub type AbortInput = Box<dyn BufRead + Send>;

/// Watches for a cancellation request while the login is pending.
///
/// The reader thread blocks on input and is simply left behind if the run
/// finishes first; the Ctrl+C watcher is cancelled on drop.
pub struct AbortListener {
    ctrl_c: JoinHandle<()>,
}

impl AbortListener {
    /// Raises `latch` on the first line read from `input` (an empty line
    /// counts) or on Ctrl+C. End of input does not count as an abort.
    pub fn spawn(input: AbortInput, latch: Latch) -> Self {
        Self::spawn_with_interrupt(input, latch, tokio::signal::ctrl_c())
    }

    /// Same as [`AbortListener::spawn`], with `interrupt` standing in for Ctrl+C.
    fn spawn_with_interrupt<F>(mut input: AbortInput, latch: Latch, interrupt: F) -> Self
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        let from_input = latch.clone();
        let spawned = std::thread::Builder::new()
            .name("abort-listener".to_string())
            .spawn(move || {
                let mut line = String::new();
                match input.read_line(&mut line) {
                    Ok(0) => log::debug!("abort input closed"),
                    Ok(_) => {
                        from_input.raise();
                    }
                    Err(err) => log::debug!("abort input unreadable: {err}"),
                }
            });
        if let Err(err) = spawned {
            log::warn!("failed to start abort listener: {err}");
        }

        let ctrl_c = tokio::spawn(async move {
            match interrupt.await {
                Ok(()) => {
                    latch.raise();
                }
                Err(err) => log::debug!("cannot listen for Ctrl+C: {err}"),
            }
        });

        Self { ctrl_c }
    }
}

impl Drop for AbortListener {
    fn drop(&mut self) {
        self.ctrl_c.abort();
    }
}
