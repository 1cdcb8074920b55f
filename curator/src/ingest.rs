use crate::errors::Result;

use db::structs::{Link, NewLink};
use db::LinkStore;
use log::{debug, error, info};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// First time this url was seen, it is now stored.
    Inserted(Link),
    /// The url was already stored.
    Duplicate,
}

/// Stores links seen in chat, once per normalized url.
pub struct Ingestor<S> {
    store: Arc<S>,
}

impl<S: LinkStore + 'static> Ingestor<S> {
    pub const fn new(store: Arc<S>) -> Ingestor<S> {
        Ingestor { store }
    }

    /// Looks the url up and stores it when absent. The lookup and the insert
    /// are separate calls; a second observation landing between them is
    /// caught by the store's insert-if-absent and reported as a duplicate.
    pub fn observe(&self, link: NewLink) -> Result<Observation> {
        if let Some(existing) = self.store.find_by_url(&link.url)? {
            debug!(
                "{} was already shared by {} in #{}",
                link.url, existing.user_name, existing.channel_name
            );
            return Ok(Observation::Duplicate);
        }

        let url = link.url.clone();
        match self.store.insert(&[link])?.pop() {
            Some(inserted) => {
                info!(
                    "new link {} from {} in #{}",
                    inserted.url, inserted.user_name, inserted.channel_name
                );
                Ok(Observation::Inserted(inserted))
            }
            None => {
                debug!("{url} was stored concurrently, skipping");
                Ok(Observation::Duplicate)
            }
        }
    }

    /// Runs [`Ingestor::observe`] off the async runtime. Failures are logged
    /// and dropped, an observation that fails is simply not stored.
    pub async fn handle(&self, link: NewLink) -> Option<Observation> {
        let store = self.store.clone();
        let url = link.url.clone();
        let res = tokio::task::spawn_blocking(move || Ingestor::new(store).observe(link)).await;

        match res {
            Ok(Ok(observation)) => Some(observation),
            Ok(Err(why)) => {
                error!("Failed to store link {url}: {why}");
                None
            }
            Err(why) => {
                error!("Storing link {url} panicked or was cancelled: {why}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::SqliteStore;
    use std::time::Duration;
    use tempfile::TempDir;

    fn observed(url: &str, message: &str) -> NewLink {
        NewLink {
            url: url.to_string(),
            message_timestamp: message.to_string(),
            channel_id: String::from("42"),
            channel_name: String::from("links"),
            user_id: String::from("7"),
            user_name: String::from("someone"),
        }
    }

    fn ingestor() -> (TempDir, Arc<SqliteStore>, Ingestor<SqliteStore>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ingest.db3");
        let store = Arc::new(SqliteStore::new(path.to_str().unwrap(), Duration::from_secs(1)));
        store.migrate().unwrap();
        let ingestor = Ingestor::new(store.clone());
        (dir, store, ingestor)
    }

    #[test]
    fn test_new_link_is_stored() -> Result<()> {
        let (_dir, store, ingestor) = ingestor();

        let observation = ingestor.observe(observed("https://example.com/a", "1"))?;

        let stored = store.find_by_url("https://example.com/a")?.unwrap();
        assert_eq!(observation, Observation::Inserted(stored.clone()));
        assert_eq!(stored.message_timestamp, "1");
        assert!(!stored.is_approved);
        Ok(())
    }

    #[test]
    fn test_same_url_twice_is_stored_once() -> Result<()> {
        let (_dir, store, ingestor) = ingestor();

        ingestor.observe(observed("https://example.com/a", "1"))?;
        let second = ingestor.observe(observed("https://example.com/a", "2"))?;

        assert_eq!(second, Observation::Duplicate);
        let stored = store.find_by_url("https://example.com/a")?.unwrap();
        assert_eq!(stored.message_timestamp, "1");
        assert_eq!(store.find_recent()?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_observations_store_once() -> Result<()> {
        let (_dir, store, ingestor) = ingestor();
        let ingestor = Arc::new(ingestor);

        let mut handles = Vec::new();
        for message in 0..8 {
            let ingestor = ingestor.clone();
            handles.push(tokio::spawn(async move {
                ingestor
                    .handle(observed("https://example.com/a", &message.to_string()))
                    .await
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if let Some(Observation::Inserted(_)) = handle.await? {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(store.find_recent()?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_storage_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        // never migrated, every read fails
        let path = dir.path().join("missing.db3");
        let store = Arc::new(SqliteStore::new(path.to_str().unwrap(), Duration::from_secs(1)));

        let res = Ingestor::new(store)
            .handle(observed("https://example.com/a", "1"))
            .await;

        assert!(res.is_none());
    }
}
