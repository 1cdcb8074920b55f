//! Reactions read through the Discord HTTP api.
//!
//! A message deleted since its link was stored answers 404. That counts as a
//! message with no reactions rather than a failed fetch, so the link keeps its
//! stored approval and the rest of the run goes ahead.

use super::{Reaction, ReactionSource, DOWNVOTE, UPVOTE};
use crate::errors::ExternalServiceError;

use async_trait::async_trait;
use log::warn;
use serenity::http::{Http, HttpError};
use serenity::model::channel::ReactionType;
use serenity::model::id::{ChannelId, MessageId};
use std::sync::Arc;

/// Reads reactions straight off the Discord message a link was posted in.
pub struct DiscordReactions {
    http: Arc<Http>,
}

impl DiscordReactions {
    pub const fn new(http: Arc<Http>) -> DiscordReactions {
        DiscordReactions { http }
    }
}

fn parse_snowflake(kind: &str, value: &str) -> Result<u64, ExternalServiceError> {
    value
        .parse::<u64>()
        .map_err(|_| ExternalServiceError::Malformed(format!("{kind} {value:?} is not a snowflake")))
}

/// Maps a discord reaction onto the vote names the tally counts. Every skin
/// tone of the thumbs are votes, anything else keeps its own name.
fn reaction_name(reaction: &ReactionType) -> String {
    match reaction {
        ReactionType::Unicode(emoji) if emoji.starts_with('👍') => UPVOTE.to_string(),
        ReactionType::Unicode(emoji) if emoji.starts_with('👎') => DOWNVOTE.to_string(),
        ReactionType::Unicode(emoji) => emoji.clone(),
        ReactionType::Custom {
            name: Some(name), ..
        } => name.clone(),
        other => other.to_string(),
    }
}

/// Status of an unsuccessful request, `None` for any other failure.
fn http_status(err: &serenity::Error) -> Option<u16> {
    match err {
        serenity::Error::Http(http_err) => match &**http_err {
            HttpError::UnsuccessfulRequest(response) => Some(response.status_code.as_u16()),
            _ => None,
        },
        _ => None,
    }
}

/// Discord answers 404 for a message that has since been deleted.
const fn is_unknown_message(status: Option<u16>) -> bool {
    matches!(status, Some(404))
}

#[async_trait]
impl ReactionSource for DiscordReactions {
    async fn get_reactions(
        &self,
        channel_id: &str,
        message_timestamp: &str,
    ) -> Result<Vec<Reaction>, ExternalServiceError> {
        let channel = ChannelId(parse_snowflake("channel id", channel_id)?);
        let message_id = MessageId(parse_snowflake("message id", message_timestamp)?);

        let message = match channel.message(&self.http, message_id).await {
            Ok(message) => message,
            Err(why) if is_unknown_message(http_status(&why)) => {
                // a deleted message has no reactions left to count
                warn!("message {message_id} in {channel} no longer exists");
                return Ok(Vec::new());
            }
            Err(why) => return Err(why.into()),
        };

        Ok(message
            .reactions
            .iter()
            .map(|r| Reaction::new(&reaction_name(&r.reaction_type), r.count))
            .collect())
    }
}
