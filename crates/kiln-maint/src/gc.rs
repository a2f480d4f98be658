use std::sync::Arc;

use kiln_gc::{Collector, GcEvent, Sweep};
use kiln_store::CancelToken;

use crate::error::{MaintError, MaintResult};
use crate::observer::{Notice, Observer};
use crate::stream::{Emitter, OpStream};

/// How per-block GC failures reach the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GcPolicy {
    /// Forward only removals; abort on the first failure with its cause.
    #[default]
    Collect,
    /// Forward every event and never abort; any failure makes the terminal
    /// status [`MaintError::GcErrors`].
    StreamErrors,
}

/// Start a GC run driven by `collector`.
pub fn run_gc(
    collector: Arc<dyn Collector>,
    policy: GcPolicy,
    cancel: CancelToken,
    capacity: usize,
    observer: Arc<dyn Observer>,
) -> OpStream<GcEvent> {
    OpStream::spawn(capacity, cancel.clone(), move |mut emitter| async move {
        observer.notice(Notice::GcStarted {
            streaming: policy == GcPolicy::StreamErrors,
        });
        let sweep = collector.sweep(cancel)?;
        forward_sweep(sweep, policy, &mut emitter, observer.as_ref()).await
    })
}

#[derive(Default)]
struct Tally {
    removed: u64,
    failed: u64,
}

/// Single forwarding routine shared by both policies.
async fn forward_sweep(
    mut sweep: Sweep,
    policy: GcPolicy,
    emitter: &mut Emitter<GcEvent>,
    observer: &dyn Observer,
) -> MaintResult<()> {
    let cancel = emitter.cancel_token().clone();
    let mut tally = Tally::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return interrupted(sweep, &tally, emitter, observer).await,
            next = sweep.events.recv() => next,
        };
        let Some(event) = next else { break };

        match event {
            GcEvent::Removed { key } => {
                observer.notice(Notice::GcRemoved { key });
                if emitter.emit(GcEvent::Removed { key }).await.is_err() {
                    return interrupted(sweep, &tally, emitter, observer).await;
                }
                tally.removed += 1;
            }
            GcEvent::Failed { key, cause } => {
                observer.notice(Notice::GcFailed {
                    key,
                    cause: cause.to_string(),
                });
                match policy {
                    GcPolicy::StreamErrors => {
                        if emitter.emit(GcEvent::Failed { key, cause }).await.is_err() {
                            return interrupted(sweep, &tally, emitter, observer).await;
                        }
                        tally.failed += 1;
                    }
                    GcPolicy::Collect => {
                        // Stops the collector; deletions so far stand.
                        let _ = sweep.finish().await;
                        return Err(MaintError::Store(cause));
                    }
                }
            }
        }
    }

    sweep.finish().await?;
    if cancel.is_cancelled() {
        return interrupted_status(&tally, emitter, observer);
    }
    observer.notice(Notice::GcFinished {
        removed: tally.removed,
        failed: tally.failed,
    });
    if tally.failed > 0 {
        return Err(MaintError::GcErrors {
            failed: tally.failed,
        });
    }
    Ok(())
}

/// Stop the collector and report on what was delivered before cancellation.
async fn interrupted(
    sweep: Sweep,
    tally: &Tally,
    emitter: &Emitter<GcEvent>,
    observer: &dyn Observer,
) -> MaintResult<()> {
    let _ = sweep.finish().await;
    interrupted_status(tally, emitter, observer)
}

fn interrupted_status(
    tally: &Tally,
    emitter: &Emitter<GcEvent>,
    observer: &dyn Observer,
) -> MaintResult<()> {
    observer.notice(Notice::Interrupted {
        operation: "gc",
        delivered: emitter.delivered(),
    });
    if tally.failed > 0 {
        Err(MaintError::GcErrors {
            failed: tally.failed,
        })
    } else {
        Ok(())
    }
}
