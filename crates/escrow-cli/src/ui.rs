use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Tabs, Wrap};
use ratatui::Terminal;
use tokio::runtime::Runtime;
use tokio::sync::mpsc as async_mpsc;

use escrow_core::{
    reduce, Address, Config, ConsoleAction, ConsoleEffect, ConsoleState, ConsoleTab, FormField, LogLevel,
    RuntimeAction, StatusLevel, UserAction,
};

use crate::services::{phase_action, Services, DEMO_ACCOUNT};

const SECOND_ACCOUNT: u64 = 0x456;

struct TuiGuard;

impl Drop for TuiGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            io::stdout(),
            LeaveAlternateScreen,
            DisableBracketedPaste,
            crossterm::cursor::Show
        );
    }
}

pub fn run(runtime: &Runtime, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let (phase_tx, mut phase_rx) = async_mpsc::unbounded_channel();
    let services = Arc::new(Services::simulated(config, phase_tx));
    let (tx, rx) = mpsc::channel::<RuntimeAction>();

    let _enter = runtime.enter();
    let forward = tx.clone();
    runtime.spawn(async move {
        while let Some(update) = phase_rx.recv().await {
            if forward.send(phase_action(update)).is_err() {
                break;
            }
        }
    });
    let forward = tx.clone();
    let mut sessions = services.session.subscribe();
    runtime.spawn(async move {
        while sessions.changed().await.is_ok() {
            let session = sessions.borrow_and_update().session.clone();
            if forward.send(RuntimeAction::SessionChanged(session)).is_err() {
                break;
            }
        }
    });
    let _watcher = services.session.watch_account_changes();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableBracketedPaste,
        crossterm::cursor::Hide
    )?;
    let _guard = TuiGuard;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut state = ConsoleState::new();

    run_app(&mut terminal, &mut state, config, runtime, &services, &tx, &rx).map_err(|e| e.into())
}

enum KeyHandlerResult {
    Continue(Vec<ConsoleEffect>),
    Exit,
}

fn user(state: &mut ConsoleState, action: UserAction) -> Vec<ConsoleEffect> {
    reduce(state, ConsoleAction::User(action))
}

fn handle_key_event(key: KeyEvent, state: &mut ConsoleState) -> KeyHandlerResult {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        let effects = match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') => return KeyHandlerResult::Exit,
            KeyCode::Char('w') => user(state, UserAction::ConnectWallet),
            KeyCode::Char('d') => user(state, UserAction::DisconnectWallet),
            KeyCode::Char('x') => {
                let latest = state.in_flight.keys().next_back().copied();
                match latest {
                    Some(request_id) => user(state, UserAction::AbandonTracking(request_id)),
                    None => Vec::new(),
                }
            }
            KeyCode::Char('l') => reduce(state, ConsoleAction::Runtime(RuntimeAction::ClearLogs)),
            _ => Vec::new(),
        };
        return KeyHandlerResult::Continue(effects);
    }

    let effects = match key.code {
        KeyCode::Esc => user(state, UserAction::ClearStatus),
        KeyCode::Left => user(state, UserAction::PrevTab),
        KeyCode::Right => user(state, UserAction::NextTab),
        KeyCode::Tab | KeyCode::Down => user(state, UserAction::NextField),
        KeyCode::BackTab | KeyCode::Up => user(state, UserAction::PrevField),
        KeyCode::Enter => user(state, UserAction::Submit),
        KeyCode::Backspace => user(state, UserAction::Backspace),
        KeyCode::F(n) => match ConsoleTab::all().get(usize::from(n).saturating_sub(1)) {
            Some(tab) => user(state, UserAction::SelectTab(*tab)),
            None => Vec::new(),
        },
        KeyCode::Char(ch) => user(state, UserAction::Input(ch)),
        _ => Vec::new(),
    };
    KeyHandlerResult::Continue(effects)
}

fn spawn_effect(
    runtime: &Runtime,
    services: &Arc<Services>,
    tx: &mpsc::Sender<RuntimeAction>,
    effect: ConsoleEffect,
) {
    if effect == ConsoleEffect::RequestFrame {
        return;
    }
    let services = Arc::clone(services);
    let tx = tx.clone();
    runtime.spawn(async move {
        if let Some(action) = services.execute(effect).await {
            let _ = tx.send(action);
        }
    });
}

/// Emulates the user picking another account in the wallet extension.
fn switch_wallet_account(services: &Services, state: &ConsoleState) {
    let next = match state.session.account() {
        Some(account) if account == Address::from_low_u64(DEMO_ACCOUNT) => {
            Address::from_low_u64(SECOND_ACCOUNT)
        }
        _ => Address::from_low_u64(DEMO_ACCOUNT),
    };
    services.wallet.switch_account(next);
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    state: &mut ConsoleState,
    config: &Config,
    runtime: &Runtime,
    services: &Arc<Services>,
    tx: &mpsc::Sender<RuntimeAction>,
    rx: &mpsc::Receiver<RuntimeAction>,
) -> io::Result<()> {
    loop {
        while let Ok(action) = rx.try_recv() {
            reduce(state, ConsoleAction::Runtime(action));
        }

        terminal.draw(|f| ui(f, state, config))?;

        if event::poll(Duration::from_millis(50))? {
            let effects = match event::read()? {
                Event::Key(key)
                    if key.kind == KeyEventKind::Press
                        && key.modifiers.contains(KeyModifiers::CONTROL)
                        && key.code == KeyCode::Char('s') =>
                {
                    switch_wallet_account(services, state);
                    Vec::new()
                }
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    match handle_key_event(key, state) {
                        KeyHandlerResult::Continue(effects) => effects,
                        KeyHandlerResult::Exit => return Ok(()),
                    }
                }
                Event::Paste(text) => user(state, UserAction::Paste(text)),
                _ => Vec::new(),
            };
            for effect in effects {
                spawn_effect(runtime, services, tx, effect);
            }
        }
    }
}

#[derive(Clone, Copy)]
struct UiPalette {
    accent: Color,
    success: Color,
    warning: Color,
    danger: Color,
    muted: Color,
    border: Color,
}

const PALETTE: UiPalette = UiPalette {
    accent: Color::Cyan,
    success: Color::Green,
    warning: Color::Yellow,
    danger: Color::Red,
    muted: Color::DarkGray,
    border: Color::Gray,
};

fn bordered(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(PALETTE.border))
        .title(title)
}

fn field_label(tab: ConsoleTab, field: FormField) -> &'static str {
    match field {
        FormField::Address => tab.address_label(),
        FormField::Amount => "Amount (ETH)",
        FormField::TaskId => "Task ID",
        FormField::Secret => "Secret",
    }
}

fn form_lines(state: &ConsoleState) -> Vec<Line<'static>> {
    let focused = state.focused_field();
    let mut lines = Vec::new();
    for field in state.tab.fields() {
        let value = state.form.value(*field);
        let is_focused = *field == focused;
        let marker = if is_focused { "▸ " } else { "  " };
        let label_style = if is_focused {
            Style::default()
                .fg(PALETTE.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let value_span = if value.is_empty() {
            Span::styled(field.placeholder(), Style::default().fg(PALETTE.muted))
        } else if *field == FormField::Secret {
            Span::raw("*".repeat(value.chars().count()))
        } else {
            Span::raw(value.to_string())
        };
        lines.push(Line::from(vec![
            Span::styled(marker, label_style),
            Span::styled(format!("{}: ", field_label(state.tab, *field)), label_style),
            value_span,
        ]));
    }
    lines.push(Line::from(""));

    if let Some(status) = &state.status {
        let color = match status.level {
            StatusLevel::Info => PALETTE.accent,
            StatusLevel::Success => PALETTE.success,
            StatusLevel::Error => PALETTE.danger,
        };
        let mut spans = Vec::new();
        if let Some(kind) = status.error_kind {
            spans.push(Span::styled(
                format!("[{}] ", kind.label()),
                Style::default().fg(PALETTE.muted),
            ));
        }
        spans.push(Span::styled(status.message.clone(), Style::default().fg(color)));
        lines.push(Line::from(spans));
    }
    lines
}

fn result_lines(state: &ConsoleState) -> Vec<Line<'static>> {
    let results = &state.results;
    let mut lines = Vec::new();
    match state.tab {
        ConsoleTab::TasksByParent | ConsoleTab::TasksByChild => match &results.tasks {
            Some(ids) if ids.is_empty() => lines.push(Line::from("No tasks found")),
            Some(ids) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                lines.push(Line::from(format!("Task IDs: {}", ids.join(", "))));
            }
            None => {}
        },
        ConsoleTab::TaskDetails => {
            if let Some(task) = &results.task_details {
                lines.push(Line::from(format!("ID: {}", task.id)));
                lines.push(Line::from(format!("Parent: {}", task.parent)));
                lines.push(Line::from(format!("Child: {}", task.child)));
                lines.push(Line::from(format!("Amount: {} ETH", task.amount.format_ether())));
                lines.push(Line::from(format!(
                    "Released: {}",
                    if task.released { "Yes" } else { "No" }
                )));
            }
        }
        ConsoleTab::CheckBalance => {
            if let Some(balance) = results.balance {
                lines.push(Line::from(format!("Has enough balance: {}", balance.label())));
            }
        }
        ConsoleTab::Children => match &results.children {
            Some(children) if children.is_empty() => {
                lines.push(Line::from("No children found for this address"));
            }
            Some(children) => {
                lines.push(Line::from(format!("Children of {}:", children[0].parent)));
                for entry in children {
                    lines.push(Line::from(format!("  {}", entry.child)));
                }
            }
            None => {}
        },
        ConsoleTab::CreateTask | ConsoleTab::ReleaseTask | ConsoleTab::AddChild => {}
    }

    if !state.in_flight.is_empty() {
        if !lines.is_empty() {
            lines.push(Line::from(""));
        }
        lines.push(Line::from(Span::styled(
            "In flight",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for pending in state.in_flight.values() {
            let hash = pending
                .submitted_hash
                .map(|hash| hash.to_string())
                .unwrap_or_else(|| "-".to_string());
            lines.push(Line::from(vec![
                Span::styled(
                    format!("{} ", pending.request_id),
                    Style::default().fg(PALETTE.muted),
                ),
                Span::raw(format!("{} ", pending.operation.as_str())),
                Span::styled(
                    format!("{} ", pending.phase.label()),
                    Style::default().fg(PALETTE.warning),
                ),
                Span::styled(hash, Style::default().fg(PALETTE.muted)),
            ]));
        }
    }
    lines
}

fn log_lines(state: &ConsoleState, height: usize) -> Vec<Line<'static>> {
    let skip = state.logs.len().saturating_sub(height);
    state
        .logs
        .iter()
        .skip(skip)
        .map(|entry| {
            let color = match entry.level {
                LogLevel::Debug => PALETTE.muted,
                LogLevel::Info => PALETTE.accent,
                LogLevel::Warn => PALETTE.warning,
                LogLevel::Error => PALETTE.danger,
            };
            let request = entry
                .request_id
                .map(|id| format!("{id} "))
                .unwrap_or_default();
            Line::from(vec![
                Span::styled(format!("{:>4} ", entry.seq), Style::default().fg(PALETTE.muted)),
                Span::styled(format!("{:<5} ", entry.level.label()), Style::default().fg(color)),
                Span::raw(format!("{request}{}", entry.message)),
            ])
        })
        .collect()
}

fn ui(f: &mut ratatui::Frame, state: &ConsoleState, config: &Config) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Tabs
            Constraint::Min(8),    // Form and results
            Constraint::Length(8), // Logs
            Constraint::Length(1), // Footer
        ])
        .split(f.area());

    let wallet = match state.session.account() {
        Some(account) if state.session.can_sign() => format!("{account} (write)"),
        Some(account) => format!("{account} (read only)"),
        None if state.connecting => "connecting...".to_string(),
        None => "not connected".to_string(),
    };
    let header = Paragraph::new(format!(
        "Escrow Console | Network: {} | Wallet: {}",
        config.network.rpc_url, wallet
    ))
    .style(Style::default().fg(PALETTE.accent))
    .block(bordered(""));
    f.render_widget(header, chunks[0]);

    let titles: Vec<Line> = ConsoleTab::all()
        .iter()
        .map(|tab| Line::from(tab.label()))
        .collect();
    let selected = ConsoleTab::all()
        .iter()
        .position(|tab| *tab == state.tab)
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .block(bordered("Operations"))
        .select(selected)
        .highlight_style(
            Style::default()
                .fg(PALETTE.accent)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, chunks[1]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[2]);
    let form = Paragraph::new(form_lines(state))
        .block(bordered(state.tab.label()))
        .wrap(Wrap { trim: false });
    f.render_widget(form, body[0]);
    let results = Paragraph::new(result_lines(state))
        .block(bordered("Results"))
        .wrap(Wrap { trim: false });
    f.render_widget(results, body[1]);

    let log_height = usize::from(chunks[3].height.saturating_sub(2));
    let logs = Paragraph::new(log_lines(state, log_height)).block(bordered("Activity"));
    f.render_widget(logs, chunks[3]);

    render_footer(f, chunks[4]);
}

fn render_footer(f: &mut ratatui::Frame, area: Rect) {
    let footer = Paragraph::new(
        "←/→ tab  F1-F8 jump  Tab field  Enter submit  ^W connect  ^D disconnect  ^S switch account  ^X abandon  ^L clear log  ^Q quit",
    )
    .style(Style::default().fg(PALETTE.muted));
    f.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use escrow_core::{ContextKind, Session};
    use pretty_assertions::assert_eq;
    use ratatui::backend::TestBackend;

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    fn effects(result: KeyHandlerResult) -> Vec<ConsoleEffect> {
        match result {
            KeyHandlerResult::Continue(effects) => effects,
            KeyHandlerResult::Exit => panic!("unexpected exit"),
        }
    }

    #[test]
    fn function_keys_jump_to_tabs() {
        let mut state = ConsoleState::new();
        effects(handle_key_event(key(KeyCode::F(5)), &mut state));
        assert_eq!(state.tab, ConsoleTab::TaskDetails);
        effects(handle_key_event(key(KeyCode::F(12)), &mut state));
        assert_eq!(state.tab, ConsoleTab::TaskDetails);
    }

    #[test]
    fn control_keys_drive_the_session() {
        let mut state = ConsoleState::new();
        let connect = effects(handle_key_event(ctrl('w'), &mut state));
        assert_eq!(connect[0], ConsoleEffect::Connect);
        assert!(matches!(
            handle_key_event(ctrl('q'), &mut state),
            KeyHandlerResult::Exit
        ));
    }

    #[test]
    fn plain_characters_are_typed_into_the_focused_field() {
        let mut state = ConsoleState::new();
        for ch in "0xab".chars() {
            effects(handle_key_event(key(KeyCode::Char(ch)), &mut state));
        }
        assert_eq!(state.form.address, "0xab");
    }

    #[test]
    fn console_renders_wallet_and_results() {
        let mut state = ConsoleState::new();
        reduce(
            &mut state,
            ConsoleAction::Runtime(RuntimeAction::SessionChanged(Session::connected(
                Address::from_low_u64(0x123),
                ContextKind::Write,
            ))),
        );
        let backend = TestBackend::new(140, 30);
        let mut terminal = Terminal::new(backend).expect("terminal");
        terminal
            .draw(|f| ui(f, &state, &Config::default()))
            .expect("draw");

        let rendered: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(rendered.contains("Wallet connected successfully!"));
        assert!(rendered.contains("(write)"));
    }
}
