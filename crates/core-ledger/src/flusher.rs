//! Periodic background flushing
//!
//! A `FlushTask` persists the ledger on a fixed interval, independently of
//! the size-triggered flush inside `log_event`. Both paths go through
//! `EventLedger::flush`, so they serialize on the same locks. The task must
//! be stopped explicitly with [`FlushTask::shutdown`], which performs one
//! last flush; dropping the handle stops the timer without flushing.

use crate::ledger::EventLedger;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Handle to a running periodic flush
#[derive(Debug)]
pub struct FlushTask {
    ledger: EventLedger,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl FlushTask {
    /// Start flushing on the ledger's configured interval
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(ledger: EventLedger) -> Self {
        let interval = ledger.config().flush_interval();
        Self::spawn_with_interval(ledger, interval)
    }

    pub fn spawn_with_interval(ledger: EventLedger, every: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let task_ledger = ledger.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        if task_ledger.unflushed() == 0 {
                            continue;
                        }
                        flush_blocking(&task_ledger).await;
                    }
                }
            }

            debug!("Periodic ledger flush stopped");
        });

        info!(interval_secs = every.as_secs_f64(), "Periodic ledger flush started");
        Self {
            ledger,
            stop: Some(stop),
            handle,
        }
    }

    /// Stop the timer and flush whatever is still pending
    pub async fn shutdown(mut self) -> bool {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!(error = %e, "Periodic flush task ended abnormally");
        }

        flush_blocking(&self.ledger).await
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Flush on the blocking pool so file I/O never stalls an async worker
pub async fn flush_blocking(ledger: &EventLedger) -> bool {
    let ledger = ledger.clone();
    match tokio::task::spawn_blocking(move || ledger.flush()).await {
        Ok(flushed) => flushed,
        Err(e) => {
            error!(error = %e, "Ledger flush task panicked");
            false
        }
    }
}
