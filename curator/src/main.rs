#![warn(
    clippy::cognitive_complexity,
    clippy::missing_const_for_fn,
    clippy::option_if_let_else
)]

mod config;
mod errors;
mod handler;
mod ingest;
mod pipeline;
mod scheduler;
mod tally;

use log::LevelFilter;
use log::{error, info};
use serenity::model::gateway::GatewayIntents;
use serenity::prelude::*;
use simple_logger::SimpleLogger;
use tokio::sync::watch;

use std::process;
use std::sync::Arc;

use config::Config;
use db::SqliteStore;
use handler::Handler;
use ingest::Ingestor;
use pipeline::ApprovalPipeline;
use tally::{DiscordReactions, VoteTally};

fn migrate_db(store: &SqliteStore) {
    match store.migrate() {
        Ok(_) => info!("sucessfully loaded and migrated db at {}", store.location()),
        Err(why) => {
            error!("Failed to migrate, exiting {why}");
            process::exit(1);
        }
    };
}

#[tokio::main]
async fn main() {
    if let Err(why) = SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .with_module_level("curator", LevelFilter::Debug)
        .with_module_level("db", LevelFilter::Debug)
        .with_utc_timestamps()
        .env()
        .init()
    {
        eprintln!("Failed to set up logging: {why}");
        process::exit(1);
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(why) => {
            error!("{why}, exiting");
            process::exit(1);
        }
    };
    let schedule = match config.schedule() {
        Ok(schedule) => schedule,
        Err(why) => {
            error!("{why}, exiting");
            process::exit(1);
        }
    };

    let store = Arc::new(SqliteStore::new(&config.store_url, config.store_timeout.0));
    migrate_db(&store);

    let intents = GatewayIntents::GUILDS
        .union(GatewayIntents::GUILD_MESSAGES)
        .union(GatewayIntents::MESSAGE_CONTENT);

    let ingestor = Arc::new(Ingestor::new(store.clone()));
    let mut client = match Client::builder(&config.api_token, intents)
        .event_handler(Handler::new(ingestor))
        .await
    {
        Ok(client) => client,
        Err(why) => {
            error!("Failed to create client, exiting {why:?}");
            process::exit(1);
        }
    };

    let reactions = DiscordReactions::new(client.cache_and_http.http.clone());
    let pipeline = Arc::new(ApprovalPipeline::new(
        store,
        VoteTally::new(
            reactions,
            config.min_positive_votes,
            config.reaction_timeout.0,
        ),
        config.max_concurrent_tallies,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let scheduler = tokio::spawn(scheduler::run_daily(pipeline, schedule, shutdown_rx));

    {
        let shutdown_tx = shutdown_tx.clone();
        let shard_manager = client.shard_manager.clone();
        tokio::spawn(async move {
            if let Err(why) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {why}");
                return;
            }
            info!("shutting down");
            shutdown_tx.send_replace(true);
            shard_manager.lock().await.shutdown_all().await;
        });
    }

    // Shards will automatically attempt to reconnect, and will perform
    // exponential backoff until it reconnects.
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    shutdown_tx.send_replace(true);
    if let Err(why) = scheduler.await {
        error!("scheduler task failed: {why}");
    }
}
