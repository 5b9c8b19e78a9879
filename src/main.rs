mod app;
mod cli;
mod config;
mod conversation;
mod message;
mod paths;
mod provider;
mod router;
mod stream;
mod turn;

#[cfg(feature = "tui")]
mod tui;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = cli::Args::parse();

    let config_path = paths::config_file()?;
    let cfg = config::Config::load_optional(&config_path)?;
    tracing::debug!(?config_path, ?cfg, "resolved config");

    let overrides = config::Overrides {
        model: args.model.clone(),
        provider: args.provider.clone(),
        gateway_url: args.gateway.clone(),
    };
    let settings = config::Settings::resolve(&overrides, cfg.as_ref(), |k| std::env::var(k).ok())?;

    app::run(args, &settings).await
}
