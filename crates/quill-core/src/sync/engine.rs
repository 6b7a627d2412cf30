//! Delta pull loop: fetch pages from a source and apply them to the index.

use crate::error::{Error, Result};
use crate::index::LocalIndex;
use crate::models::{NoteChange, Usn};

use super::retry::{with_retries, RetryPolicy};

/// One page of deltas from the remote service, ascending USN order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeltaPage {
    pub changes: Vec<NoteChange>,
    /// Whether the server holds further changes beyond this page
    pub has_more: bool,
}

/// Source of sync deltas. Implemented by the HTTP client; tests substitute
/// in-memory fakes.
pub trait DeltaSource {
    /// Fetch the next page of changes with USN strictly greater than `since`.
    fn fetch_page(&self, since: Usn) -> impl std::future::Future<Output = Result<DeltaPage>> + Send;
}

/// Result of a completed pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Changes actually applied (stale redeliveries excluded)
    pub applied: usize,
    /// Changes received from the server
    pub fetched: usize,
    /// Checkpoint after the pull
    pub checkpoint: Usn,
}

/// Pull all pending deltas and apply them to the local index.
///
/// Each page is applied (with its checkpoint advance) in one transaction, so
/// a failure mid-pull leaves the checkpoint at the last durable page and the
/// next pull resumes from there.
pub async fn pull<S: DeltaSource>(
    source: &S,
    index: &mut LocalIndex,
    policy: RetryPolicy,
) -> Result<SyncOutcome> {
    let mut applied = 0;
    let mut fetched = 0;

    loop {
        let since = index.checkpoint()?;
        let page = with_retries(policy, || source.fetch_page(since)).await?;

        fetched += page.changes.len();
        applied += index.apply_batch(&page.changes)?;

        if !page.has_more {
            break;
        }
        if index.checkpoint()? <= since {
            // A page that advances nothing but promises more would loop forever
            return Err(Error::SyncFailed(
                "server reported more pages without advancing the checkpoint".to_string(),
            ));
        }
    }

    let checkpoint = index.checkpoint()?;
    tracing::info!(applied, fetched, checkpoint, "Sync pull complete");
    Ok(SyncOutcome {
        applied,
        fetched,
        checkpoint,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::models::Note;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    fn upsert(id: &str, usn: i64) -> NoteChange {
        NoteChange::Upsert {
            note: Note {
                id: id.into(),
                title: format!("note {id}"),
                body: "body".to_string(),
                tags: vec![],
                created_at: usn * 1_000,
                updated_at: usn * 1_000,
                usn,
            },
        }
    }

    /// Serves scripted pages keyed by successive calls; errors where scripted.
    struct ScriptedSource {
        pages: Mutex<Vec<Result<DeltaPage>>>,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<DeltaPage>>) -> Self {
            let mut pages = pages;
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DeltaSource for ScriptedSource {
        async fn fetch_page(&self, _since: Usn) -> Result<DeltaPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(DeltaPage::default()))
        }
    }

    #[tokio::test]
    async fn pull_applies_pages_in_order() {
        let source = ScriptedSource::new(vec![
            Ok(DeltaPage {
                changes: vec![upsert("a", 1), upsert("b", 2)],
                has_more: true,
            }),
            Ok(DeltaPage {
                changes: vec![upsert("c", 3)],
                has_more: false,
            }),
        ]);
        let mut index = LocalIndex::open_in_memory().unwrap();

        let outcome = pull(&source, &mut index, fast_policy(3)).await.unwrap();
        assert_eq!(outcome.applied, 3);
        assert_eq!(outcome.fetched, 3);
        assert_eq!(outcome.checkpoint, 3);
        assert_eq!(index.all_notes().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn redelivered_changes_are_fetched_but_not_applied() {
        let source = ScriptedSource::new(vec![Ok(DeltaPage {
            changes: vec![upsert("a", 1), upsert("a", 1)],
            has_more: false,
        })]);
        let mut index = LocalIndex::open_in_memory().unwrap();

        let outcome = pull(&source, &mut index, fast_policy(3)).await.unwrap();
        assert_eq!(outcome.fetched, 2);
        assert_eq!(outcome.applied, 1);
    }

    #[tokio::test]
    async fn transient_failures_retry_then_surface_sync_failed() {
        let source = ScriptedSource::new(vec![
            Err(Error::NetworkTransient("timeout".to_string())),
            Err(Error::NetworkTransient("timeout".to_string())),
            Err(Error::NetworkTransient("timeout".to_string())),
        ]);
        let mut index = LocalIndex::open_in_memory().unwrap();

        let error = pull(&source, &mut index, fast_policy(3)).await.unwrap_err();
        assert!(matches!(error, Error::SyncFailed(_)));
        // Exactly the configured number of attempts, no more
        assert_eq!(source.call_count(), 3);
        // Checkpoint untouched by the failed sync
        assert_eq!(index.checkpoint().unwrap(), 0);
    }

    #[tokio::test]
    async fn failure_after_first_page_keeps_durable_checkpoint() {
        let source = ScriptedSource::new(vec![
            Ok(DeltaPage {
                changes: vec![upsert("a", 5)],
                has_more: true,
            }),
            Err(Error::AuthExpired),
        ]);
        let mut index = LocalIndex::open_in_memory().unwrap();

        let error = pull(&source, &mut index, fast_policy(1)).await.unwrap_err();
        assert!(matches!(error, Error::AuthExpired));

        // The first page committed atomically; resume point is durable
        assert_eq!(index.checkpoint().unwrap(), 5);
        assert!(index.get_note(&"a".into()).is_ok());
    }

    #[tokio::test]
    async fn stalled_pagination_is_an_error() {
        let source = ScriptedSource::new(vec![Ok(DeltaPage {
            changes: vec![],
            has_more: true,
        })]);
        let mut index = LocalIndex::open_in_memory().unwrap();

        let error = pull(&source, &mut index, fast_policy(1)).await.unwrap_err();
        assert!(matches!(error, Error::SyncFailed(_)));
    }

    #[tokio::test]
    async fn empty_final_page_completes_cleanly() {
        let source = ScriptedSource::new(vec![Ok(DeltaPage::default())]);
        let mut index = LocalIndex::open_in_memory().unwrap();

        let outcome = pull(&source, &mut index, fast_policy(1)).await.unwrap();
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.checkpoint, 0);
    }
}
