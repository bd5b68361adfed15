use crate::clipboard::Clipboard;
use crate::controller::{FormController, Settled, is_submit_shortcut};
use crate::form::{Focus, FormView, Severity};
use crate::http::CleanService;
use crate::store::KeyValueStore;

use anyhow::Result;
use crossterm::{
    event::{
        DisableBracketedPaste, EnableBracketedPaste, Event, EventStream, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
        PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::io::{self, Stdout};
use tokio::sync::mpsc;

const HELP: &str = "Tab/Shift+Tab focus · Ctrl+Enter clean · Enter on a button activates · Esc quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Puts the terminal into raw/alternate-screen mode and undoes it on drop.
struct TerminalGuard {
    enhanced_keys: bool,
}

impl TerminalGuard {
    fn enter(stdout: &mut Stdout) -> Result<Self> {
        enable_raw_mode()?;
        execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
        // Lets modified Enter be told apart; unsupported terminals ignore it.
        let enhanced_keys = execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .is_ok();
        install_panic_hook();
        Ok(TerminalGuard { enhanced_keys })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        if self.enhanced_keys {
            let _ = execute!(stdout, PopKeyboardEnhancementFlags);
        }
        let _ = execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableBracketedPaste, LeaveAlternateScreen);
        original_hook(panic_info);
    }));
}

/// Runs the interactive form until the user quits. Submissions run on their
/// own task; their outcome comes back over a channel so the form keeps
/// taking input meanwhile.
pub async fn run<S, K, C>(mut controller: FormController<S, K, C>) -> Result<()>
where
    S: CleanService + ?Sized + 'static,
    K: KeyValueStore,
    C: Clipboard,
{
    let mut stdout = io::stdout();
    let _guard = TerminalGuard::enter(&mut stdout)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Settled>();
    let mut events = EventStream::new();

    loop {
        terminal.draw(|f| render(f, controller.view()))?;

        tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(event)) => {
                    if handle_event(&mut controller, event, &tx) == Flow::Quit {
                        break;
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            Some(settled) = rx.recv() => controller.finish_submit(settled),
        }
    }

    terminal.show_cursor()?;
    Ok(())
}

fn spawn_submit<S, K, C>(controller: &mut FormController<S, K, C>, tx: &mpsc::UnboundedSender<Settled>)
where
    S: CleanService + ?Sized + 'static,
    K: KeyValueStore,
    C: Clipboard,
{
    if let Some(submission) = controller.begin_submit() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let settled = submission.send().await;
            // A closed channel means the form is gone; dropping the outcome
            // releases the busy flag all the same.
            let _ = tx.send(settled);
        });
    }
}

fn is_ctrl_j(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('j') && key.modifiers.contains(KeyModifiers::CONTROL)
}

fn handle_event<S, K, C>(
    controller: &mut FormController<S, K, C>,
    event: Event,
    tx: &mpsc::UnboundedSender<Settled>,
) -> Flow
where
    S: CleanService + ?Sized + 'static,
    K: KeyValueStore,
    C: Clipboard,
{
    match event {
        Event::Key(key) => handle_key(controller, key, tx),
        Event::Paste(text) => {
            edit_focused(controller, |s| s.push_str(&text));
            Flow::Continue
        }
        _ => Flow::Continue,
    }
}

fn handle_key<S, K, C>(
    controller: &mut FormController<S, K, C>,
    key: KeyEvent,
    tx: &mpsc::UnboundedSender<Settled>,
) -> Flow
where
    S: CleanService + ?Sized + 'static,
    K: KeyValueStore,
    C: Clipboard,
{
    if key.kind == KeyEventKind::Release {
        return Flow::Continue;
    }
    // Terminals without the enhancement protocol deliver Ctrl+Enter as Ctrl+J.
    if is_submit_shortcut(&key) || is_ctrl_j(&key) {
        spawn_submit(controller, tx);
        return Flow::Continue;
    }

    let focus = controller.view().focus();
    match key.code {
        KeyCode::Esc => return Flow::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Flow::Quit,
        KeyCode::Tab => controller.set_focus(focus.next()),
        KeyCode::BackTab => controller.set_focus(focus.prev()),
        KeyCode::Enter => match focus {
            Focus::Submit => spawn_submit(controller, tx),
            Focus::Clear => controller.clear(),
            Focus::Copy => controller.copy(),
            Focus::Input => edit_focused(controller, |s| s.push('\n')),
            Focus::Credential => controller.set_focus(Focus::Input),
            Focus::Output => {}
        },
        KeyCode::Backspace => edit_focused(controller, |s| {
            s.pop();
        }),
        KeyCode::Char(c)
            if !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            edit_focused(controller, |s| s.push(c))
        }
        _ => {}
    }
    Flow::Continue
}

/// Applies an edit to whichever editable field has focus. The output is
/// read-only and buttons take no text.
fn edit_focused<S, K, C>(controller: &mut FormController<S, K, C>, edit: impl FnOnce(&mut String))
where
    S: CleanService + ?Sized,
    K: KeyValueStore,
    C: Clipboard,
{
    match controller.view().focus() {
        Focus::Credential => {
            let mut value = controller.view().credential().to_string();
            edit(&mut value);
            if value != controller.view().credential() {
                controller.set_credential(value);
            }
        }
        Focus::Input => {
            let mut value = controller.view().input().to_string();
            edit(&mut value);
            controller.set_input(value);
        }
        _ => {}
    }
}

fn field_block(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title)
}

/// Scroll offset that keeps the last line of `text` visible in `area`.
fn tail_scroll(text: &str, area: Rect) -> u16 {
    let inner_height = area.height.saturating_sub(2) as usize;
    let lines = text.split('\n').count();
    lines.saturating_sub(inner_height).min(u16::MAX as usize) as u16
}

fn status_style(severity: Severity) -> Style {
    match severity {
        Severity::Neutral => Style::default().fg(Color::DarkGray),
        Severity::Success => Style::default().fg(Color::Green),
        Severity::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

fn render_button(f: &mut Frame, area: Rect, label: &str, focused: bool, enabled: bool) {
    let mut style = Style::default();
    if !enabled {
        style = style.fg(Color::DarkGray);
    } else if focused {
        style = style.fg(Color::Black).bg(Color::Yellow);
    }
    let button = Paragraph::new(Line::from(Span::styled(format!(" {label} "), style)))
        .centered()
        .block(field_block("", focused));
    f.render_widget(button, area);
}

fn render(f: &mut Frame, view: &FormView) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Min(5),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(f.area());
    let focus = view.focus();

    let masked: String = "•".repeat(view.credential().chars().count());
    f.render_widget(
        Paragraph::new(masked).block(field_block("Token", focus == Focus::Credential)),
        rows[0],
    );

    f.render_widget(
        Paragraph::new(view.input())
            .wrap(Wrap { trim: false })
            .scroll((tail_scroll(view.input(), rows[1]), 0))
            .block(field_block("Input", focus == Focus::Input)),
        rows[1],
    );

    f.render_widget(
        Paragraph::new(view.output())
            .wrap(Wrap { trim: false })
            .block(field_block("Output", focus == Focus::Output)),
        rows[2],
    );

    let buttons = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(rows[3]);
    let busy = view.is_busy();
    let submit_label = if busy { "Cleaning…" } else { "Clean" };
    render_button(f, buttons[0], submit_label, focus == Focus::Submit, !busy);
    render_button(f, buttons[1], "Clear", focus == Focus::Clear, true);
    render_button(f, buttons[2], "Copy", focus == Focus::Copy, true);

    let status = view.status();
    f.render_widget(
        Paragraph::new(Span::styled(status.message(), status_style(status.severity()))),
        rows[4],
    );
    f.render_widget(
        Paragraph::new(Span::styled(HELP, Style::default().fg(Color::DarkGray))),
        rows[5],
    );
}
