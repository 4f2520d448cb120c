//! Binary entrypoint: wire the components and run the terminal channel.

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use siren_console::api::ApiClient;
use siren_console::channels::repl::ReplChannel;
use siren_console::config::{self, Config};
use siren_console::metrics::MetricsEngine;
use siren_console::prompt::PromptComposer;
use siren_console::session::SessionStore;
use siren_console::session::guard::RouteGuard;
use siren_console::settings::{Settings, default_settings_path};
use siren_console::{Error, bootstrap};

#[derive(Debug, Parser)]
#[command(
    name = "siren-console",
    version,
    about = "Terminal administrative console for the siren-net backend"
)]
struct Cli {
    /// Backend base URL (overrides settings and `~/.siren-console/.env`).
    #[arg(long, env = "SIREN_BASE_URL")]
    base_url: Option<String>,

    /// Log filter applied when RUST_LOG is unset (e.g. "siren_console=debug").
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: explicit env vars > ./.env > ~/.siren-console/.env.
    let _ = dotenvy::dotenv();
    bootstrap::load_siren_env();

    let cli = Cli::parse();
    bootstrap::init_tracing(cli.log.as_deref());

    let settings = Settings::load(&default_settings_path()).context("loading settings")?;
    let mut config = Config::resolve(&settings).context("resolving configuration")?;
    if let Some(raw) = cli.base_url.as_deref() {
        config.api.base_url = config::validate_base_url(raw, "--base-url")?;
    }

    let store = Arc::new(SessionStore::open(&config.api, &config.session).await);
    let api = Arc::new(ApiClient::new(&config.api, Arc::clone(&store)));
    let guard = RouteGuard::new(Arc::clone(&store), Arc::clone(&api));
    let metrics = MetricsEngine::new(Arc::clone(&api), config.metrics);
    let composer = PromptComposer::new(Arc::clone(&api));

    let mut repl = ReplChannel::new(config, settings, store, api, guard, metrics, composer);
    repl.run().await.map_err(Error::from)?;
    Ok(())
}
