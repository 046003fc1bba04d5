use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use voudp::prelude::*;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Channel ids as of the last refresh. Commands run synchronously, so
/// they read this instead of asking the server.
type ChannelSnapshot = Arc<Mutex<Vec<ChannelId>>>;

fn entry(name: &str, description: &str, usage: &str, aliases: &[&str]) -> CommandEntry {
    CommandEntry {
        name: name.into(),
        description: description.into(),
        usage: usage.into(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
        ..Default::default()
    }
}

fn commands(channels: ChannelSnapshot) -> CommandRegistry {
    let mut commands = CommandRegistry::new();

    commands.register(
        entry("help", "Describe this server", "help", &["h"]),
        |_, _| CommandOutcome::Reply("you are connected to a voudp relay".into()),
    );
    commands.register(
        entry("ping", "Check the server is alive", "ping", &[]),
        |_, _| CommandOutcome::Reply("pong".into()),
    );
    commands.register(
        entry("whoami", "Show your mask and channel", "whoami", &[]),
        |invoker, _| match invoker {
            Invoker::Console { addr } => CommandOutcome::Reply(format!("console at {addr}")),
            Invoker::Client {
                session,
                mask,
                channel,
                ..
            } => {
                let place = channel.map_or_else(|| "no channel".to_string(), |c| c.to_string());
                CommandOutcome::Reply(format!("{mask} ({session}) in {place}"))
            }
        },
    );
    commands.register_console_only(
        entry("chans", "List channels with members", "chans", &[]),
        move |_, _| {
            let ids = channels.lock().unwrap_or_else(PoisonError::into_inner);
            if ids.is_empty() {
                return CommandOutcome::Reply("no active channels".into());
            }
            let list: Vec<String> = ids.iter().map(ToString::to_string).collect();
            CommandOutcome::Reply(list.join(", "))
        },
    );

    commands
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

fn load_config() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            let config = serde_json::from_str(&text)?;
            tracing::info!(%path, "loaded configuration");
            Ok(config)
        }
        None => Ok(ServerConfig::default()),
    }
}

fn word_filter() -> WordFilter {
    let words: Vec<String> = std::env::var("VOUDP_BANNED_WORDS")
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    WordFilter::new(WordFilterConfig {
        words,
        ..Default::default()
    })
}

async fn serve<A: ConsoleAuthenticator>(
    builder: VoudpServerBuilder<A>,
    channels: ChannelSnapshot,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = builder.build().await?;
    let handle = server.handle();

    tokio::spawn(async move {
        let mut refresh = tokio::time::interval(Duration::from_secs(1));
        loop {
            refresh.tick().await;
            let ids = handle.channel_ids().await;
            *channels.lock().unwrap_or_else(PoisonError::into_inner) = ids;
        }
    });

    server.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let bind = std::env::var("VOUDP_BIND").unwrap_or_else(|_| "0.0.0.0:37549".into());
    let passphrase = std::env::var("VOUDP_PASSPHRASE")
        .map_err(|_| "set VOUDP_PASSPHRASE to the deployment passphrase")?;

    let channels = ChannelSnapshot::default();
    let builder = VoudpServer::builder()
        .bind(&bind)
        .passphrase(&passphrase)
        .config(config)
        .hook(Arc::new(word_filter()))
        .hook(Arc::new(Greeter::default()))
        .commands(commands(Arc::clone(&channels)));

    tracing::info!(%bind, "starting relay");
    match std::env::var("VOUDP_CONSOLE_SECRET") {
        Ok(secret) => serve(builder.console_secret(&secret), channels).await,
        Err(_) => serve(builder, channels).await,
    }
}
