mod links;

use crate::ingest::Ingestor;

use db::structs::NewLink;
use db::LinkStore;
use log::info;
use serenity::{
    async_trait,
    model::{channel::Message, channel::MessageType, gateway::Ready, id::ChannelId},
    prelude::*,
};
use std::sync::Arc;

/// Gateway event handler that feeds links posted in guild channels to the
/// ingestor.
pub struct Handler<S> {
    ingestor: Arc<Ingestor<S>>,
}

impl<S> Handler<S> {
    pub const fn new(ingestor: Arc<Ingestor<S>>) -> Handler<S> {
        Handler { ingestor }
    }
}

/// One `NewLink` per curatable url in `msg`, carrying where and by whom it was
/// posted. The message id is what the reactions are later looked up by.
fn observed_links(msg: &Message, channel_name: &str) -> Vec<NewLink> {
    links::normalized_links(&msg.content)
        .into_iter()
        .map(|url| NewLink {
            url,
            message_timestamp: msg.id.as_u64().to_string(),
            channel_id: msg.channel_id.as_u64().to_string(),
            channel_name: channel_name.to_string(),
            user_id: msg.author.id.as_u64().to_string(),
            user_name: msg.author.name.clone(),
        })
        .collect()
}

/// Only plain messages and replies posted by people in a guild channel are
/// curated. Bots and direct messages are ignored.
fn is_curatable(from_bot: bool, in_guild: bool, kind: MessageType, content: &str) -> bool {
    if from_bot || !in_guild {
        return false;
    }
    if !matches!(kind, MessageType::Regular | MessageType::InlineReply) {
        return false;
    }
    // cheap check before touching the cache
    content.contains("://")
}

fn channel_label(name: Option<String>, channel_id: ChannelId) -> String {
    name.unwrap_or_else(|| channel_id.as_u64().to_string())
}

#[async_trait]
impl<S: LinkStore + 'static> EventHandler for Handler<S> {
    async fn message(&self, ctx: Context, msg: Message) {
        if !is_curatable(msg.author.bot, msg.guild_id.is_some(), msg.kind, &msg.content) {
            return;
        }

        let channel_name = channel_label(msg.channel_id.name(&ctx.cache).await, msg.channel_id);

        for link in observed_links(&msg, &channel_name) {
            self.ingestor.handle(link).await;
        }
    }

    async fn ready(&self, _: Context, ready: Ready) {
        info!(
            "{} is connected to {} guild(s)",
            ready.user.name,
            ready.guilds.len()
        );
    }
}
