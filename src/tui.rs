#![cfg(feature = "tui")]

use crate::conversation::Snapshot;
use crate::message::Sender;
use crate::turn::{ChatSession, TurnOutcome};
use anyhow::Context;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

struct UiState {
    model: String,
    input: String,
    notice: Option<String>,
    conversation: Snapshot,
    /// Cancels the turn in flight.
    active: Option<oneshot::Sender<()>>,
}

pub async fn run_tui(session: ChatSession, model: String) -> anyhow::Result<()> {
    let session = Arc::new(session);
    let mut updates = session.store().subscribe();

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<Event>();
    std::thread::spawn(move || {
        while let Ok(ev) = crossterm::event::read() {
            if ev_tx.send(ev).is_err() {
                break;
            }
        }
    });

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<TurnOutcome>();

    let mut ui = UiState {
        model,
        input: String::new(),
        notice: Some("Enter sends. Esc cancels a reply or quits. Commands: /quit, /model <name>".to_string()),
        conversation: session.store().snapshot(),
        active: None,
    };

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(33));

    let res = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = draw(&mut terminal, &ui) {
                    break Err(e);
                }
            }
            Some(ev) = ev_rx.recv() => {
                if let Event::Key(key) = ev {
                    if handle_key(key, &mut ui, &session, &done_tx) {
                        break Ok(());
                    }
                }
            }
            Some(snap) = updates.recv() => {
                ui.conversation = snap;
            }
            Some(outcome) = done_rx.recv() => {
                ui.active = None;
                ui.notice = match outcome {
                    TurnOutcome::Failed(e) => Some(format!("connection failed: {e}")),
                    TurnOutcome::Cancelled => Some("reply cancelled".to_string()),
                    _ => None,
                };
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

/// Returns true when the UI should exit.
fn handle_key(
    key: KeyEvent,
    ui: &mut UiState,
    session: &Arc<ChatSession>,
    done_tx: &mpsc::UnboundedSender<TurnOutcome>,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    match key.code {
        KeyCode::Esc => match ui.active.take() {
            Some(cancel) => {
                let _ = cancel.send(());
            }
            None => return true,
        },
        KeyCode::Char(c) => ui.input.push(c),
        KeyCode::Backspace => {
            ui.input.pop();
        }
        KeyCode::Enter => {
            let msg = ui.input.trim().to_string();
            ui.input.clear();
            if msg.is_empty() {
                return false;
            }

            if msg == "/quit" {
                return true;
            }
            if let Some(rest) = msg.strip_prefix("/model ") {
                ui.model = rest.trim().to_string();
                ui.notice = Some(format!("model set to: {} ({})", ui.model, session.route(&ui.model)));
                return false;
            }

            if ui.active.is_some() {
                ui.notice = Some("(reply in progress; wait or press Esc)".to_string());
                return false;
            }

            let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
            ui.active = Some(cancel_tx);
            ui.notice = None;

            let session = Arc::clone(session);
            let model = ui.model.clone();
            let done_tx = done_tx.clone();
            tokio::spawn(async move {
                let cancel = async move {
                    let _ = cancel_rx.await;
                };
                if let Ok(outcome) = session.send_until(&msg, &model, cancel).await {
                    let _ = done_tx.send(outcome);
                }
            });
        }
        _ => {}
    }

    false
}

fn draw(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, ui: &UiState) -> anyhow::Result<()> {
    terminal.draw(|f| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(f.area());

        let mut text = Text::default();
        for m in ui.conversation.iter() {
            let header = if m.streaming {
                format!("{} · {} (typing...)", m.sender.as_str(), m.model_label)
            } else {
                format!("{} · {}", m.sender.as_str(), m.model_label)
            };
            let style = match m.sender {
                Sender::User => Style::default().add_modifier(Modifier::BOLD),
                Sender::Ai => Style::default().add_modifier(Modifier::ITALIC),
            };
            text.lines.push(Line::styled(header, style));
            text.lines.extend(Text::from(m.text.clone()).lines);
            text.lines.push(Line::from(""));
        }
        if let Some(n) = &ui.notice {
            text.lines.push(Line::styled(n.clone(), Style::default().add_modifier(Modifier::DIM)));
        }

        // Keep the newest lines in view.
        let height = chunks[0].height.saturating_sub(2) as usize;
        let scroll = text.lines.len().saturating_sub(height) as u16;

        let chat = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title(format!("chathub: {}", ui.model)))
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0));

        let input_w = Paragraph::new(ui.input.clone())
            .block(Block::default().borders(Borders::ALL).title("input"));

        f.render_widget(chat, chunks[0]);
        f.render_widget(input_w, chunks[1]);

        let x = chunks[1].x + 1 + ui.input.chars().count() as u16;
        let y = chunks[1].y + 1;
        f.set_cursor_position((x.min(chunks[1].x + chunks[1].width.saturating_sub(2)), y));
    })?;
    Ok(())
}
