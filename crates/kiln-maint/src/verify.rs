use std::sync::Arc;

use kiln_store::{BlockStore, BlockingFeed, CancelToken, FeedSender, StoreError, StoreResult};
use kiln_types::BlockKey;

use crate::error::{MaintError, MaintResult};
use crate::event::{VerifyEvent, VERIFY_CORRUPT_MESSAGE, VERIFY_OK_MESSAGE};
use crate::observer::{Notice, Observer};
use crate::stream::{Emitter, OpStream};

/// Scan every block in `store` and report those that fail retrieval.
///
/// `store` must have hash-on-read enabled, otherwise only missing or
/// unreadable blocks are detected. For each key a [`VerifyEvent::Corrupt`]
/// is emitted first if the block is bad, then a [`VerifyEvent::Progress`]
/// with the running count. A [`VerifyEvent::Summary`] follows once the key
/// sequence is exhausted.
pub fn verify_blocks(
    store: Arc<dyn BlockStore>,
    cancel: CancelToken,
    capacity: usize,
    observer: Arc<dyn Observer>,
) -> OpStream<VerifyEvent> {
    OpStream::spawn(capacity, cancel.clone(), move |mut emitter| async move {
        observer.notice(Notice::VerifyStarted);
        let mut feed = BlockingFeed::spawn(capacity, cancel.clone(), move |sender| {
            check_blocks(store.as_ref(), &sender)
        });

        let mut scanned = 0u64;
        let mut corrupt = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = feed.recv() => next,
            };
            let Some((key, outcome)) = next else { break };
            if let Err(cause) = outcome {
                observer.notice(Notice::BlockCorrupt {
                    key,
                    cause: cause.to_string(),
                });
                if emitter.emit(VerifyEvent::Corrupt { key, cause }).await.is_err() {
                    return interrupted(feed, corrupt, &emitter, observer.as_ref()).await;
                }
                corrupt += 1;
            }
            scanned += 1;
            if emitter
                .emit(VerifyEvent::Progress { count: scanned })
                .await
                .is_err()
            {
                return interrupted(feed, corrupt, &emitter, observer.as_ref()).await;
            }
        }

        // A cancelled key sequence ends early without an error.
        if emitter.is_cancelled() {
            return interrupted(feed, corrupt, &emitter, observer.as_ref()).await;
        }
        if let Err(e) = feed.finish().await {
            observer.notice(Notice::EnumerationFailed {
                cause: e.to_string(),
            });
            return Err(e.into());
        }

        observer.notice(Notice::VerifyFinished { scanned, corrupt });
        let message = if corrupt == 0 {
            VERIFY_OK_MESSAGE
        } else {
            VERIFY_CORRUPT_MESSAGE
        };
        let summary = VerifyEvent::Summary {
            message: message.to_string(),
        };
        if emitter.emit(summary).await.is_err() {
            return interrupted_status(corrupt, &emitter, observer.as_ref());
        }
        if corrupt > 0 {
            return Err(MaintError::VerifyCorrupt { corrupt });
        }
        Ok(())
    })
}

type BlockCheck = (BlockKey, Result<(), StoreError>);

/// Blocking half of a scan: read every block back, in enumeration order.
fn check_blocks(store: &dyn BlockStore, sender: &FeedSender<BlockCheck>) -> StoreResult<()> {
    for key in store.all_keys(sender.cancel_token())? {
        let key = key?;
        let outcome = store.get(&key).map(drop);
        if !sender.send((key, outcome)) {
            break;
        }
    }
    Ok(())
}

/// Stop the scan and report on what was delivered before the interruption.
async fn interrupted(
    feed: BlockingFeed<BlockCheck, ()>,
    corrupt: u64,
    emitter: &Emitter<VerifyEvent>,
    observer: &dyn Observer,
) -> MaintResult<()> {
    let _ = feed.finish().await;
    interrupted_status(corrupt, emitter, observer)
}

fn interrupted_status(
    corrupt: u64,
    emitter: &Emitter<VerifyEvent>,
    observer: &dyn Observer,
) -> MaintResult<()> {
    observer.notice(Notice::Interrupted {
        operation: "verify",
        delivered: emitter.delivered(),
    });
    if corrupt > 0 {
        Err(MaintError::VerifyCorrupt { corrupt })
    } else {
        Ok(())
    }
}
