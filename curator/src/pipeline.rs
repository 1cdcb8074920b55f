use crate::errors::{Error, Result};
use crate::tally::{ReactionSource, Tally, VoteTally};

use db::structs::{ApprovalUpdate, Link};
use db::LinkStore;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::{watch, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    FetchingRecent,
    Tallying,
    Persisting,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run was still in progress.
    Skipped,
    /// Shutdown was requested before anything was written.
    Cancelled,
    /// The links newly approved by this run, possibly none.
    Completed { approved: Vec<Link> },
}

/// Promotes recently shared links that collected enough votes.
///
/// One run reads the links shared in the last day, tallies every one of them
/// concurrently and marks the approved ones in a single batch. A failure while
/// tallying any link discards the whole run: nothing is written and the links
/// are tallied again on the next run while they are still recent.
pub struct ApprovalPipeline<S, R> {
    store: Arc<S>,
    tally: VoteTally<R>,
    max_concurrent: usize,
    running: Semaphore,
    state: RwLock<PipelineState>,
}

impl<S, R> ApprovalPipeline<S, R>
where
    S: LinkStore + 'static,
    R: ReactionSource,
{
    pub fn new(store: Arc<S>, tally: VoteTally<R>, max_concurrent: usize) -> ApprovalPipeline<S, R> {
        ApprovalPipeline {
            store,
            tally,
            max_concurrent: max_concurrent.max(1),
            running: Semaphore::new(1),
            state: RwLock::new(PipelineState::Idle),
        }
    }

    pub fn state(&self) -> PipelineState {
        match self.state.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn transition(&self, next: PipelineState) {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!("approval pipeline {:?} -> {next:?}", *state);
        *state = next;
    }

    /// Scheduler entry point. Never fails, the outcome is only logged.
    pub async fn tick(&self, shutdown: watch::Receiver<bool>) {
        match self.run(shutdown).await {
            Ok(RunOutcome::Skipped) => warn!("previous approval run still in progress, skipping"),
            Ok(RunOutcome::Cancelled) => warn!("approval run cancelled by shutdown"),
            Ok(RunOutcome::Completed { approved }) => {
                info!("approval run finished, {} link(s) approved", approved.len())
            }
            Err(Error::Storage(why)) if why.is_timeout() => {
                error!("approval run gave up waiting on a locked store: {why}")
            }
            Err(why) => error!("approval run failed: {why}"),
        }
    }

    /// Runs the pipeline once unless a run is already in progress.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<RunOutcome> {
        let _permit = match self.running.try_acquire() {
            Ok(permit) => permit,
            Err(_) => return Ok(RunOutcome::Skipped),
        };

        let res = self.run_stages(shutdown).await;
        if res.is_err() {
            self.transition(PipelineState::Failed);
        }
        self.transition(PipelineState::Idle);
        res
    }

    async fn run_stages(&self, mut shutdown: watch::Receiver<bool>) -> Result<RunOutcome> {
        self.transition(PipelineState::FetchingRecent);
        let store = self.store.clone();
        let recent = tokio::task::spawn_blocking(move || store.find_recent()).await??;
        if recent.is_empty() {
            info!("no links shared in the last day");
            return Ok(RunOutcome::Completed {
                approved: Vec::new(),
            });
        }

        self.transition(PipelineState::Tallying);
        debug!("tallying {} recent link(s)", recent.len());
        let fan_out = stream::iter(recent)
            .map(|link| self.tally.tally(link))
            .buffer_unordered(self.max_concurrent)
            .try_collect::<Vec<Tally>>();
        let tallies = tokio::select! {
            tallies = fan_out => tallies?,
            _ = shutdown_requested(&mut shutdown) => return Ok(RunOutcome::Cancelled),
        };

        // links approved on an earlier run are neither rewritten nor reported
        let approved: Vec<Link> = tallies
            .into_iter()
            .filter(|tally| tally.is_approved && !tally.link.is_approved)
            .map(|tally| tally.link)
            .collect();
        if approved.is_empty() {
            return Ok(RunOutcome::Completed { approved });
        }

        self.transition(PipelineState::Persisting);
        let updates: Vec<ApprovalUpdate> = approved
            .iter()
            .map(|link| ApprovalUpdate::approve(link.id))
            .collect();
        let store = self.store.clone();
        let applied = tokio::task::spawn_blocking(move || store.update_approval(&updates)).await??;

        let applied: HashSet<i64> = applied.into_iter().map(|update| update.id).collect();
        let approved: Vec<Link> = approved
            .into_iter()
            .filter(|link| applied.contains(&link.id))
            .map(|mut link| {
                link.is_approved = true;
                link
            })
            .collect();
        for link in &approved {
            info!("{} has been approved", link.url);
        }

        Ok(RunOutcome::Completed { approved })
    }
}

/// Resolves once shutdown is signalled. If the sender goes away without
/// signalling, no shutdown can come any more and this never resolves.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExternalServiceError;
    use crate::tally::tests::FakeReactions;
    use crate::tally::{Reaction, DOWNVOTE, UPVOTE};
    use db::structs::NewLink;
    use db::SqliteStore;
    use std::time::Duration;
    use tempfile::TempDir;

    fn shared(url: &str, message: &str) -> NewLink {
        NewLink {
            url: url.to_string(),
            message_timestamp: message.to_string(),
            channel_id: String::from("42"),
            channel_name: String::from("links"),
            user_id: String::from("7"),
            user_name: String::from("someone"),
        }
    }

    fn migrated_store() -> (TempDir, Arc<SqliteStore>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.db3");
        let store = Arc::new(SqliteStore::new(path.to_str().unwrap(), Duration::from_secs(1)));
        store.migrate().unwrap();
        (dir, store)
    }

    fn pipeline(
        store: &Arc<SqliteStore>,
        source: FakeReactions,
    ) -> ApprovalPipeline<SqliteStore, FakeReactions> {
        ApprovalPipeline::new(
            store.clone(),
            VoteTally::new(source, 1, Duration::from_secs(5)),
            4,
        )
    }

    fn approved_urls(outcome: &RunOutcome) -> HashSet<String> {
        match outcome {
            RunOutcome::Completed { approved } => {
                approved.iter().map(|link| link.url.clone()).collect()
            }
            other => panic!("expected a completed run, got {other:?}"),
        }
    }

    fn is_approved(store: &SqliteStore, url: &str) -> bool {
        store.find_by_url(url).unwrap().unwrap().is_approved
    }

    /// A(score 2), B(score 0), C(score -1)
    fn seed_abc(store: &SqliteStore) {
        store
            .insert(&[
                shared("https://example.com/a", "a"),
                shared("https://example.com/b", "b"),
                shared("https://example.com/c", "c"),
            ])
            .unwrap();
    }

    fn abc_reactions(delays: [u64; 3]) -> FakeReactions {
        FakeReactions::default()
            .with_delay(
                "a",
                Duration::from_millis(delays[0]),
                vec![Reaction::new(UPVOTE, 2)],
            )
            .with_delay(
                "b",
                Duration::from_millis(delays[1]),
                vec![Reaction::new(UPVOTE, 1), Reaction::new(DOWNVOTE, 1)],
            )
            .with_delay(
                "c",
                Duration::from_millis(delays[2]),
                vec![Reaction::new(DOWNVOTE, 1)],
            )
    }

    #[tokio::test]
    async fn test_no_recent_links() -> Result<()> {
        let (_dir, store) = migrated_store();
        let (_tx, rx) = watch::channel(false);

        let outcome = pipeline(&store, FakeReactions::default()).run(rx).await?;

        assert_eq!(outcome, RunOutcome::Completed { approved: Vec::new() });
        Ok(())
    }

    #[tokio::test]
    async fn test_only_links_over_threshold_are_approved() -> Result<()> {
        let (_dir, store) = migrated_store();
        seed_abc(&store);
        let (_tx, rx) = watch::channel(false);
        let pipeline = pipeline(&store, abc_reactions([0, 0, 0]));

        let outcome = pipeline.run(rx).await?;

        assert_eq!(
            approved_urls(&outcome),
            HashSet::from([String::from("https://example.com/a")])
        );
        assert!(is_approved(&store, "https://example.com/a"));
        assert!(!is_approved(&store, "https://example.com/b"));
        assert!(!is_approved(&store, "https://example.com/c"));
        assert_eq!(pipeline.state(), PipelineState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_links_without_reactions_stay_unapproved() -> Result<()> {
        let (_dir, store) = migrated_store();
        store.insert(&[shared("https://example.com/quiet", "quiet")])?;
        let (_tx, rx) = watch::channel(false);

        let outcome = pipeline(&store, FakeReactions::default()).run(rx).await?;

        assert!(approved_urls(&outcome).is_empty());
        assert!(!is_approved(&store, "https://example.com/quiet"));
        Ok(())
    }

    #[tokio::test]
    async fn test_completion_order_does_not_matter() -> Result<()> {
        for delays in [[60, 0, 30], [0, 30, 60], [30, 60, 0]] {
            let (_dir, store) = migrated_store();
            seed_abc(&store);
            let (_tx, rx) = watch::channel(false);

            let outcome = pipeline(&store, abc_reactions(delays)).run(rx).await?;

            assert_eq!(
                approved_urls(&outcome),
                HashSet::from([String::from("https://example.com/a")]),
                "delays {delays:?}"
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_one_failed_fetch_discards_the_run() {
        let (_dir, store) = migrated_store();
        seed_abc(&store);
        store.insert(&[shared("https://example.com/d", "d")]).unwrap();
        // a and c finish before d fails
        let source = abc_reactions([0, 0, 0]).failing("d", Duration::from_millis(50));
        let (_tx, rx) = watch::channel(false);
        let pipeline = pipeline(&store, source);

        let res = pipeline.run(rx).await;

        assert!(matches!(
            res,
            Err(Error::ExternalService(ExternalServiceError::Malformed(_)))
        ));
        for url in ["a", "b", "c", "d"] {
            assert!(!is_approved(&store, &format!("https://example.com/{url}")));
        }
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_approval_is_never_reverted() -> Result<()> {
        let (_dir, store) = migrated_store();
        let id = store.insert(&[shared("https://example.com/a", "a")])?[0].id;
        store.update_approval(&[ApprovalUpdate::approve(id)])?;
        let source = FakeReactions::default().with("a", vec![Reaction::new(DOWNVOTE, 3)]);
        let (_tx, rx) = watch::channel(false);

        let outcome = pipeline(&store, source).run(rx).await?;

        assert!(approved_urls(&outcome).is_empty());
        assert!(is_approved(&store, "https://example.com/a"));
        Ok(())
    }

    #[tokio::test]
    async fn test_already_approved_link_is_not_reported() -> Result<()> {
        let (_dir, store) = migrated_store();
        let inserted = store.insert(&[
            shared("https://example.com/a", "a"),
            shared("https://example.com/b", "b"),
        ])?;
        store.update_approval(&[ApprovalUpdate::approve(inserted[0].id)])?;
        // b has no reactions and keeps its stored flag
        let source = FakeReactions::default().with("a", vec![Reaction::new(UPVOTE, 2)]);
        let (_tx, rx) = watch::channel(false);

        let outcome = pipeline(&store, source).run(rx).await?;

        assert!(approved_urls(&outcome).is_empty());
        assert!(is_approved(&store, "https://example.com/a"));
        assert!(!is_approved(&store, "https://example.com/b"));
        Ok(())
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() -> Result<()> {
        let (_dir, store) = migrated_store();
        store.insert(&[shared("https://example.com/slow", "slow")])?;
        let source = FakeReactions::default().with_delay(
            "slow",
            Duration::from_millis(200),
            vec![Reaction::new(UPVOTE, 1)],
        );
        let pipeline = Arc::new(pipeline(&store, source));
        let (_tx, rx) = watch::channel(false);

        let first = {
            let pipeline = pipeline.clone();
            let rx = rx.clone();
            tokio::spawn(async move { pipeline.run(rx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(pipeline.run(rx).await?, RunOutcome::Skipped);
        assert_eq!(
            approved_urls(&first.await??),
            HashSet::from([String::from("https://example.com/slow")])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_cancels_without_writing() -> Result<()> {
        let (_dir, store) = migrated_store();
        store.insert(&[
            shared("https://example.com/fast", "fast"),
            shared("https://example.com/stuck", "stuck"),
        ])?;
        let source = FakeReactions::default()
            .with("fast", vec![Reaction::new(UPVOTE, 1)])
            .with_delay(
                "stuck",
                Duration::from_secs(3),
                vec![Reaction::new(UPVOTE, 1)],
            );
        let pipeline = Arc::new(pipeline(&store, source));
        let (tx, rx) = watch::channel(false);

        let run = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run(rx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        assert_eq!(run.await??, RunOutcome::Cancelled);
        assert!(!is_approved(&store, "https://example.com/fast"));
        assert_eq!(pipeline.state(), PipelineState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_storage_failure_fails_the_run() {
        let dir = TempDir::new().unwrap();
        // never migrated
        let path = dir.path().join("missing.db3");
        let store = Arc::new(SqliteStore::new(path.to_str().unwrap(), Duration::from_secs(1)));
        let pipeline = pipeline(&store, FakeReactions::default());
        let (_tx, rx) = watch::channel(false);

        assert!(matches!(pipeline.run(rx.clone()).await, Err(Error::Storage(_))));
        assert_eq!(pipeline.state(), PipelineState::Idle);

        // the scheduler entry point only logs
        pipeline.tick(rx).await;
    }
}
