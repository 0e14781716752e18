use tokio::sync::watch;

/// Broadcast side of the shutdown flag. Held by the task that decides when
/// the process stops (normally the OS-signal listener in `app::run`).
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Receive side, cloned into every long-running task. Cheap to clone and to
/// poll; once triggered it stays triggered.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Creates a connected handle/signal pair.
pub fn channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

impl ShutdownHandle {
    /// Flips the flag. Every live [`ShutdownSignal`] observes it.
    pub fn trigger(&self) {
        // Send only fails with no receivers left, which means everyone
        // already stopped.
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when shutdown is triggered. Resolves immediately if it
    /// already was.
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // A closed channel counts as shutdown: the handle is gone.
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

/// Blocks until the process receives SIGINT or SIGTERM.
pub async fn wait_for_os_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => tracing::info!("🛑 SIGINT received"),
            _ = sigterm.recv() => tracing::info!("🛑 SIGTERM received"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("🛑 Ctrl-C received");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_all_clones() {
        let (handle, signal) = channel();
        let mut a = signal.clone();
        let mut b = signal;

        assert!(!a.is_triggered());
        handle.trigger();

        a.wait().await;
        b.wait().await;
        assert!(a.is_triggered());
        assert!(b.is_triggered());
    }

    #[tokio::test]
    async fn wait_resolves_when_handle_drops() {
        let (handle, mut signal) = channel();
        drop(handle);
        // Must not hang.
        signal.wait().await;
    }
}
