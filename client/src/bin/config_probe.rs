//! Fetches a game config from a running portal and prints it as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use flamydash_client::{Client, RetryPolicy};
use flamydash_types::{codec, PageContext, DEFAULT_GAME_ID};
use serde::Serialize;
use serde_json::Map;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Query a Flamy Dash portal the way an embedding page does")]
struct Args {
    /// Portal base URL (http(s)://host:port)
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Game to request
    #[arg(long, default_value = DEFAULT_GAME_ID)]
    game: String,

    /// Domain reported as `d`
    #[arg(long, default_value = "flamydash.com")]
    domain: String,

    /// Hostname reported as `hn`
    #[arg(long, default_value = "localhost")]
    hostname: String,

    /// Answer from the static fallback when the API fails
    #[arg(long)]
    fallback: bool,

    /// Also print the health report
    #[arg(long)]
    health: bool,

    /// Also print the game list
    #[arg(long)]
    games: bool,

    /// Record an analytics event of this type after fetching
    #[arg(long)]
    record: Option<String>,

    /// Decode a parameter token and exit
    #[arg(long)]
    decode: Option<String>,

    /// Attempts per request
    #[arg(long, default_value_t = 3)]
    attempts: usize,
}

fn print<T: Serialize>(label: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("# {label}\n{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    if let Some(token) = &args.decode {
        let params = codec::decode(token).context("decode token")?;
        return print("params", params.as_map());
    }

    let page = PageContext {
        domain: args.domain.clone(),
        hostname: args.hostname.clone(),
        ..Default::default()
    };
    let client = Client::new(&args.url)
        .context("create client")?
        .with_page(page)
        .with_retry_policy(RetryPolicy {
            max_attempts: args.attempts.max(1),
            ..Default::default()
        });
    info!(url = %client.base_url, game = %args.game, "requesting game config");

    let config = if args.fallback {
        client.get_game_config_or_fallback(&args.game).await
    } else {
        client
            .get_game_config(&args.game)
            .await
            .context("fetch game config")?
    };
    print("config", &config)?;

    if args.health {
        print("health", &client.health().await.context("fetch health")?)?;
    }
    if args.games {
        print("games", &client.games().await.context("fetch games")?)?;
    }
    if let Some(event_type) = &args.record {
        let ack = client
            .record_game_event(event_type, &args.game, Map::new())
            .await
            .context("record event")?;
        print("event", &ack)?;
    }
    Ok(())
}
