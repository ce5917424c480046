mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use seekbot::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = BotConfig::load(cli.config.as_deref())?;

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let bot = SeekBot::connect(cfg).await?;
    match cli.command {
        Commands::Ask { text } => {
            let sink = ConsoleSink::new();
            dispatch(&bot, &text.join(" "), &sink).await;
        }
        Commands::Listen => listen(Arc::new(bot)).await?,
        Commands::ClearCache { prefix, expired } => {
            let removed = if expired {
                bot.purge_expired_cache().await?
            } else {
                bot.clear_cache_prefix(prefix.as_deref()).await?
            };
            println!("removed {removed} cache entries");
        }
        Commands::Vacuum => {
            bot.vacuum_db().await?;
            println!("vacuum complete");
        }
        Commands::Stats => {
            let s = bot.stats().await?;
            println!("av records       : {}", s.av_records);
            println!("preview urls     : {}", s.preview_urls);
            println!("cache entries    : {}", s.cache_entries);
            println!("expired entries  : {}", s.expired_cache_entries);
        }
        Commands::Config => {}
    }
    Ok(())
}

/// Handle one message and wait for its write-back so nothing is cut off at exit.
async fn dispatch(bot: &SeekBot, text: &str, sink: &dyn MessageSink) {
    match bot.handle(text, sink).await {
        Ok(Some(outcome)) => {
            if let Some(persist) = outcome.into_answered().and_then(|a| a.persist) {
                match persist.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "write-back failed"),
                    Err(e) => warn!(error = %e, "write-back task aborted"),
                }
            }
        }
        Ok(None) => info!("ignored: not a /av or /game command"),
        Err(e) => error!(error = %e, "message handling failed"),
    }
}

async fn listen(bot: Arc<SeekBot>) -> Result<()> {
    let sink = Arc::new(ConsoleSink::new());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    info!("listening on stdin");
    while let Some(line) = lines.next_line().await? {
        let (bot, sink) = (bot.clone(), sink.clone());
        tasks.spawn(async move { dispatch(&bot, &line, sink.as_ref()).await });
    }
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "message task panicked");
        }
    }
    Ok(())
}
