use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{info, warn};

use permsync_events::{EventBus, InstanceEvent, ServiceScoped, Subscription};

use crate::sync::SyncEngine;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// Runs already handed to the runtime keep going.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Registry feed consumer.
///
/// - Subscribes to an event bus of instance announcements
/// - Starts one synchronization run per announcement on the given runtime
/// - Optional service filtering (bootstrap a single service's catalog)
#[derive(Debug)]
pub struct SyncWorker;

impl SyncWorker {
    /// Spawn the worker thread.
    ///
    /// Runs are fire-and-forget: a failed run is logged and the next
    /// announcement for the same service repairs the catalog.
    pub fn spawn<B>(
        name: &'static str,
        bus: B,
        engine: Arc<SyncEngine>,
        runtime: Handle,
        service: Option<String>,
    ) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<InstanceEvent> + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<InstanceEvent> = bus.subscribe();

        let join = thread::Builder::new().name(name.to_string()).spawn(move || {
            worker_loop(name, sub, shutdown_rx, service, |event| {
                let engine = engine.clone();
                runtime.spawn(async move {
                    if let Err(err) = engine.sync(&event).await {
                        warn!(
                            worker = name,
                            service = %event.service_name,
                            error = %err,
                            "sync run failed"
                        );
                    }
                });
            })
        })?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    service: Option<String>,
    mut handler: H,
) where
    M: ServiceScoped,
    H: FnMut(M),
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Some(only) = service.as_deref() {
                    if msg.service_name() != only {
                        continue;
                    }
                }
                handler(msg);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(worker = name, "sync worker stopped");
}
