use clap::Parser;
use std::collections::HashMap;
use tgrelay_core::{Config, RelayConfig};

// Use mimalloc as the global allocator; chunk buffers churn through the heap.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Command-line overrides. Anything not given here comes from the
/// environment (or `.env`).
#[derive(Parser, Debug)]
#[command(name = "tgrelay", version, about = "Chunked file relay backed by a Telegram chat")]
struct Cli {
    /// Listen port (PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Telegram bot token (BOT_TOKEN)
    #[arg(long)]
    bot_token: Option<String>,

    /// Shared access password (ACCESS_PWD)
    #[arg(long)]
    access_pwd: Option<String>,

    /// HTTP proxy for Bot API traffic (PROXY)
    #[arg(long)]
    proxy: Option<String>,

    /// Target chat id (CHAT_ID)
    #[arg(long)]
    chat_id: Option<String>,

    /// Public base URL for download links (BASE_URL)
    #[arg(long)]
    base_url: Option<String>,
}

impl Cli {
    fn overrides(self) -> HashMap<&'static str, String> {
        [
            ("PORT", self.port.map(|p| p.to_string())),
            ("BOT_TOKEN", self.bot_token),
            ("ACCESS_PWD", self.access_pwd),
            ("PROXY", self.proxy),
            ("CHAT_ID", self.chat_id),
            ("BASE_URL", self.base_url),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
    }
}

fn load_config(cli: Cli) -> Result<Config, anyhow::Error> {
    dotenvy::dotenv().ok();
    let overrides = cli.overrides();
    let relay = RelayConfig::from_vars(|key: &str| {
        overrides
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    })?;
    Ok(Config::new(relay))
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = load_config(Cli::parse())?;

    let (_state, router) = tgrelay_api::setup::initialize_app(config.clone()).await?;

    tgrelay_api::setup::server::start_server(&config, router).await?;

    Ok(())
}
