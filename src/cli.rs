use clap::{Parser, Subcommand};

/// Chat with local and cloud language models
#[derive(Debug, Parser)]
#[command(name = "chathub")]
#[command(version)]
#[command(about = "Chat with local and cloud language models", long_about = None)]
pub struct Args {
    /// Model name (e.g. llama2, gemma2-9b-it)
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Chat gateway base URL (default: config, CHATHUB_GATEWAY_URL or http://localhost:5000)
    #[arg(long = "gateway", value_name = "URL")]
    pub gateway: Option<String>,

    /// Provider: "gateway" or "stub"
    #[arg(long = "provider")]
    pub provider: Option<String>,

    /// Print the conversation as JSON instead of streaming text
    #[arg(long = "json")]
    pub json: bool,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Multi-turn chat on stdin (/model <name>, /history, /quit)
    Repl,

    /// List known models and where they are routed
    Models,

    /// Run an interactive terminal chat UI
    #[cfg(feature = "tui")]
    Tui,
}
