use crate::cli::{Args, Command};
use crate::config::{ProviderChoice, Settings};
use crate::conversation::{ConversationStore, Snapshot};
use crate::message::{Message, MessageId, Sender};
use crate::provider::cloud::CloudProvider;
use crate::provider::gateway::{GatewayMode, GatewayProvider};
use crate::provider::stub::StubProvider;
use crate::provider::base_url;
use crate::router::{ModelRouter, CATALOG};
use crate::turn::{ChatSession, SharedProvider, TurnError, TurnOutcome};
use anyhow::Context;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::{mpsc, oneshot};

pub fn build_http(settings: &Settings) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(settings.connect_timeout)
        .build()
        .context("failed to build HTTP client")
}

pub fn build_session(http: &reqwest::Client, settings: &Settings) -> anyhow::Result<ChatSession> {
    let (local, cloud): (SharedProvider, SharedProvider) = match settings.provider {
        ProviderChoice::Stub => {
            let stub: SharedProvider = Arc::new(StubProvider::new());
            (Arc::clone(&stub), stub)
        }
        ProviderChoice::Gateway => {
            let gateway = base_url(&settings.gateway_url)?;
            let local = GatewayProvider::new(http.clone(), gateway.clone(), GatewayMode::Streaming);

            let cloud: SharedProvider = match &settings.cloud_api_key {
                Some(key) => {
                    let base = base_url(&settings.cloud_base_url)?;
                    Arc::new(CloudProvider::new(http.clone(), base, key.clone()).with_timeout(settings.request_timeout))
                }
                None => {
                    tracing::debug!("no cloud API key; cloud models go through the gateway");
                    Arc::new(
                        GatewayProvider::new(http.clone(), gateway, GatewayMode::Buffered)
                            .with_timeout(settings.request_timeout),
                    )
                }
            };
            (Arc::new(local), cloud)
        }
    };

    let router = ModelRouter::new(settings.cloud_fragments.clone());
    Ok(ChatSession::new(
        Arc::new(ConversationStore::new()),
        router.into_classifier(),
        local,
        cloud,
    ))
}

/// Dispatch the parsed command line.
pub async fn run(args: Args, settings: &Settings) -> anyhow::Result<()> {
    if let Some(Command::Models) = args.cmd {
        return cmd_models(settings, &mut std::io::stdout());
    }

    let http = build_http(settings)?;
    let session = build_session(&http, settings)?;

    match args.cmd {
        Some(Command::Repl) => return cmd_repl(&session, settings.model.clone(), args.json).await,
        #[cfg(feature = "tui")]
        Some(Command::Tui) => return crate::tui::run_tui(session, settings.model.clone()).await,
        Some(Command::Models) | None => {}
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: chathub \"Hello\" or `chathub repl`");
    }

    cmd_once(&session, &prompt, &settings.model, args.json).await
}

pub fn cmd_models(settings: &Settings, out: &mut dyn Write) -> anyhow::Result<()> {
    let router = ModelRouter::new(settings.cloud_fragments.clone());
    for m in CATALOG {
        let marker = if m.id == settings.model { "*" } else { " " };
        writeln!(out, "{marker} {:<32}{:<8}{:<8}{}", m.id, router.classify(m.id), m.size, m.name)?;
    }
    Ok(())
}

/// Writes assistant output to a terminal as snapshots arrive.
///
/// Tracks the latest AI message and prints only what was appended since
/// the previous snapshot; a rewritten message is printed again in full.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    current: Option<MessageId>,
    shown: String,
    finished: bool,
    show_label: bool,
}

impl StreamPrinter {
    pub fn new(show_label: bool) -> Self {
        Self {
            show_label,
            ..Self::default()
        }
    }

    pub fn render(&mut self, snapshot: &[Message], out: &mut dyn Write) -> std::io::Result<()> {
        let Some(m) = snapshot.iter().rev().find(|m| m.sender == Sender::Ai) else {
            return Ok(());
        };

        if self.current != Some(m.id) {
            self.current = Some(m.id);
            self.shown.clear();
            self.finished = false;
        }
        if self.finished {
            return Ok(());
        }

        match m.text.strip_prefix(self.shown.as_str()) {
            Some(delta) => out.write_all(delta.as_bytes())?,
            None => {
                writeln!(out)?;
                out.write_all(m.text.as_bytes())?;
            }
        }
        self.shown.clone_from(&m.text);

        if m.is_complete() {
            self.finished = true;
            writeln!(out)?;
            if self.show_label {
                writeln!(out, "({})", m.model_label)?;
            }
        }
        out.flush()
    }
}

/// Run one turn while printing its snapshots.
async fn chat_turn(
    session: &ChatSession,
    rx: &mut mpsc::UnboundedReceiver<Snapshot>,
    printer: Option<&mut StreamPrinter>,
    prompt: &str,
    model: &str,
) -> Result<TurnOutcome, TurnError> {
    let (done_tx, mut done_rx) = oneshot::channel::<()>();

    let turn = async {
        let cancel = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let r = session.send_until(prompt, model, cancel).await;
        let _ = done_tx.send(());
        r
    };

    let render = async {
        let mut stdout = std::io::stdout();
        let mut printer = printer;
        loop {
            tokio::select! {
                Some(snap) = rx.recv() => {
                    if let Some(p) = printer.as_deref_mut() {
                        p.render(&snap, &mut stdout).ok();
                    }
                }
                _ = &mut done_rx => break,
            }
        }
        while let Ok(snap) = rx.try_recv() {
            if let Some(p) = printer.as_deref_mut() {
                p.render(&snap, &mut stdout).ok();
            }
        }
    };

    let (outcome, ()) = tokio::join!(turn, render);
    outcome
}

pub async fn cmd_once(session: &ChatSession, prompt: &str, model: &str, json: bool) -> anyhow::Result<()> {
    let mut rx = session.store().subscribe();
    let mut printer = StreamPrinter::new(false);
    let printer = (!json).then_some(&mut printer);

    let outcome = chat_turn(session, &mut rx, printer, prompt, model).await?;
    tracing::debug!(?outcome, "one-shot turn done");

    if json {
        print_transcript(session.store(), &mut std::io::stdout())?;
    }
    Ok(())
}

pub async fn cmd_repl(session: &ChatSession, mut model: String, json: bool) -> anyhow::Result<()> {
    let mut rx = session.store().subscribe();
    let mut printer = StreamPrinter::new(true);
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    eprintln!("model: {model} ({}). Commands: /model <name>, /history, /quit", session.route(&model));

    loop {
        eprint!("> ");
        std::io::stderr().flush().ok();

        let interrupt = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let Some(line) = next_prompt(&mut lines, interrupt).await? else {
            eprintln!();
            break;
        };
        let msg = line.trim();
        if msg.is_empty() {
            continue;
        }
        if msg == "/quit" {
            break;
        }
        if msg == "/history" {
            if session.store().is_empty() {
                eprintln!("(no messages yet)");
            } else {
                print_transcript(session.store(), &mut std::io::stdout())?;
            }
            continue;
        }
        if let Some(rest) = msg.strip_prefix("/model ") {
            model = rest.trim().to_string();
            eprintln!("model set to: {model} ({})", session.route(&model));
            continue;
        }

        match chat_turn(session, &mut rx, Some(&mut printer), &line, &model).await {
            Ok(TurnOutcome::Failed(e)) => tracing::debug!(error = %e, "turn failed"),
            Ok(_) => {}
            Err(TurnError::EmptyMessage) => {}
        }
    }

    if json {
        print_transcript(session.store(), &mut std::io::stdout())?;
    }
    Ok(())
}

/// Next input line, or `None` at end of input or once `interrupt` fires.
///
/// The turn's Ctrl-C handler stays installed after the first turn, so the
/// prompt has to listen for it as well.
async fn next_prompt<R>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>,
) -> anyhow::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => line.context("failed to read stdin"),
        _ = interrupt => Ok(None),
    }
}

pub fn print_transcript(store: &ConversationStore, out: &mut dyn Write) -> anyhow::Result<()> {
    let snap = store.snapshot();
    let s = serde_json::to_string_pretty(&*snap).context("failed to encode transcript")?;
    writeln!(out, "{s}")?;
    Ok(())
}
