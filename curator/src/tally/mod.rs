mod discord;

pub use discord::DiscordReactions;

use crate::errors::{ExternalServiceError, Result};

use async_trait::async_trait;
use db::structs::Link;
use log::{debug, trace};
use std::time::Duration;

/// Reaction name that counts as a vote for a link.
pub const UPVOTE: &str = "+1";
/// Reaction name that counts as a vote against a link.
pub const DOWNVOTE: &str = "-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub name: String,
    pub count: u64,
}

impl Reaction {
    pub fn new(name: &str, count: u64) -> Reaction {
        Reaction {
            name: name.to_string(),
            count,
        }
    }
}

/// Where reactions on the message a link was posted in come from.
#[async_trait]
pub trait ReactionSource: Send + Sync {
    async fn get_reactions(
        &self,
        channel_id: &str,
        message_timestamp: &str,
    ) -> std::result::Result<Vec<Reaction>, ExternalServiceError>;
}

/// Upvotes minus downvotes. Any other reaction is ignored.
pub fn score(reactions: &[Reaction]) -> i64 {
    reactions.iter().fold(0i64, |sum, reaction| {
        let count = i64::try_from(reaction.count).unwrap_or(i64::MAX);
        match reaction.name.as_str() {
            UPVOTE => sum.saturating_add(count),
            DOWNVOTE => sum.saturating_sub(count),
            _ => sum,
        }
    })
}

/// Result of tallying a single link.
#[derive(Debug, Clone)]
pub struct Tally {
    pub link: Link,
    pub score: i64,
    pub is_approved: bool,
}

pub struct VoteTally<R> {
    source: R,
    threshold: i64,
    timeout: Duration,
}

impl<R: ReactionSource> VoteTally<R> {
    pub const fn new(source: R, threshold: i64, timeout: Duration) -> VoteTally<R> {
        VoteTally {
            source,
            threshold,
            timeout,
        }
    }

    /// Fetches the reactions for `link` and decides whether it is approved.
    ///
    /// A message without any reactions keeps the stored approval flag, so it
    /// is never approved by default. Otherwise the link is approved when its
    /// score reaches the threshold. The outcome only depends on `link`'s own
    /// reactions.
    pub async fn tally(&self, link: Link) -> Result<Tally> {
        let fetch = self
            .source
            .get_reactions(&link.channel_id, &link.message_timestamp);
        let reactions = match tokio::time::timeout(self.timeout, fetch).await {
            Ok(reactions) => reactions?,
            Err(_) => return Err(ExternalServiceError::Timeout(self.timeout).into()),
        };
        trace!("reactions for {}: {reactions:?}", link.url);

        if reactions.is_empty() {
            debug!("no reactions on {}, leaving it as is", link.url);
            let is_approved = link.is_approved;
            return Ok(Tally {
                link,
                score: 0,
                is_approved,
            });
        }

        let score = score(&reactions);
        let is_approved = score >= self.threshold;
        debug!(
            "{} scored {score} against threshold {}, approved: {is_approved}",
            link.url, self.threshold
        );
        Ok(Tally {
            link,
            score,
            is_approved,
        })
    }
}
