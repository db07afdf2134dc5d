//! Background sync task: start, run loop, shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{CacheOrchestrator, Inner, Payload};

pub(super) struct BackgroundTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl<T: Payload> CacheOrchestrator<T> {
    /// Start the periodic drain and expiry sweep.
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// the task is running does nothing. Returns whether a task is running.
    pub fn initialize(&self) -> bool {
        let mut task = self.task.lock();
        if task.is_some() {
            return true;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "No tokio runtime, background sync not started");
                return false;
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(run(inner, shutdown_rx));

        *task = Some(BackgroundTask {
            shutdown: shutdown_tx,
            handle,
        });
        info!(
            sync_interval_ms = self.inner.config.sync_interval_ms,
            "Cache background sync started"
        );
        true
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }

    /// Signal the background task to stop. Safe to call repeatedly or before `initialize`.
    pub fn destroy(&self) {
        if let Some(task) = self.task.lock().take() {
            let _ = task.shutdown.send(true);
            debug!("Cache background sync signalled to stop");
        }
    }

    /// Stop the background task and wait for an in-flight drain to finish.
    pub async fn shutdown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Cache background task ended abnormally");
            }
            info!("Cache background sync stopped");
        }
    }
}

impl<T> Drop for CacheOrchestrator<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            let _ = task.shutdown.send(true);
        }
    }
}

/// Timer-driven drains, an immediate drain on reconnect, and periodic expiry sweeps.
async fn run<T: Payload>(inner: Arc<Inner<T>>, mut shutdown: watch::Receiver<bool>) {
    let mut online_rx = inner.network.subscribe();
    let mut was_online = *online_rx.borrow_and_update();

    let sync_period = inner.config.sync_interval();
    let mut sync_interval = interval_at(Instant::now() + sync_period, sync_period);
    sync_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let sweep_period = inner.config.expiry_sweep_interval();
    let mut sweep_interval = interval_at(Instant::now() + sweep_period, sweep_period);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            changed = online_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = *online_rx.borrow_and_update();
                if online && !was_online {
                    info!(pending = inner.queue.len(), "Reconnected, draining sync queue");
                    inner.queue.drain(&*inner).await;
                    sync_interval.reset();
                }
                was_online = online;
            }

            _ = sync_interval.tick() => {
                if inner.network.is_online() && inner.queue.try_drain(&*inner).await.is_none() {
                    debug!("Drain already in flight, skipping tick");
                }
            }

            _ = sweep_interval.tick() => {
                inner.purge_expired().await;
            }
        }
    }

    debug!("Cache background loop exited");
}
