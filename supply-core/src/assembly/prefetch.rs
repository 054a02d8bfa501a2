//! Background pre-construction of eager team members.
//!
//! Prefetching only warms the single-flight cells. Whatever a member's
//! construction produces, value or error, stays cached in its supply and is
//! reported to whoever reads it; here it is only traced.
//!
//! Inside a tokio runtime batches go to its blocking pool. Elsewhere they
//! are queued to one long-lived worker thread shared by every assembly.

use std::sync::mpsc;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::supply::AnySupply;
use crate::config::Prefetch;

type Batch = Vec<AnySupply>;

pub(crate) fn schedule(supplies: Vec<AnySupply>, mode: Prefetch) {
    if supplies.is_empty() {
        return;
    }
    match mode {
        Prefetch::Off => {}
        Prefetch::Inline => warm(&supplies),
        Prefetch::Background => spawn(supplies),
    }
}

fn spawn(supplies: Batch) {
    if let Ok(handle) = Handle::try_current() {
        // Construction is synchronous user code; keep it off the async workers.
        handle.spawn_blocking(move || warm(&supplies));
        return;
    }

    let Some(worker) = worker() else {
        return;
    };
    if let Err(mpsc::SendError(batch)) = worker.lock().send(supplies) {
        tracing::warn!(members = batch.len(), "prefetch worker is gone; building on demand");
    }
}

/// Sender of the process-wide prefetch thread, started on first use.
///
/// `None` when the thread could not be started; members are then built on
/// first read.
fn worker() -> Option<&'static Mutex<mpsc::Sender<Batch>>> {
    static WORKER: OnceLock<Option<Mutex<mpsc::Sender<Batch>>>> = OnceLock::new();

    WORKER
        .get_or_init(|| {
            let (tx, rx) = mpsc::channel::<Batch>();
            let spawned = std::thread::Builder::new()
                .name("supply-prefetch".into())
                .spawn(move || {
                    for batch in rx {
                        warm(&batch);
                    }
                });
            match spawned {
                Ok(_) => Some(Mutex::new(tx)),
                Err(err) => {
                    tracing::warn!(error = %err, "prefetch thread failed to start; building on demand");
                    None
                }
            }
        })
        .as_ref()
}

fn warm(supplies: &[AnySupply]) {
    for supply in supplies {
        if let Err(err) = supply.resolve() {
            tracing::trace!(node = %supply.name(), error = %err, "prefetch failed; deferred to first read");
        }
    }
}
