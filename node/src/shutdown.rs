// Copyright (c) 2024 Botho Foundation

//! Park the process until Ctrl-C.

use anyhow::{Context, Result};
use tokio::sync::watch;

/// Shutdown signal shared by everything that has to stop on Ctrl-C.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Install the process-wide Ctrl-C handler. Call once.
    pub fn install() -> Result<Self> {
        let (tx, shutdown) = Self::channel();
        ctrlc::set_handler(move || {
            let _ = tx.send(true);
        })
        .context("Failed to install Ctrl-C handler")?;
        Ok(shutdown)
    }

    /// A signal triggered by sending `true` on the returned sender.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// Whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested.
    ///
    /// Also returns if the sender is dropped, since nothing can trigger the
    /// signal after that.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|requested| *requested).await;
    }
}
