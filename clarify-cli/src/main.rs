use anyhow::Result;
use clarify_cli::client::{ChatClient, ClientEvent};
use clarify_cli::reducer::Conversation;
use clarify_shared::MessageRole;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use tokio::sync::mpsc;
use tracing::{debug, info};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

struct App {
    conversation: Conversation,
    input: String,
    cursor_position: usize,
    scroll_offset: usize,
    turn_rx: Option<mpsc::UnboundedReceiver<ClientEvent>>,
}

impl App {
    fn new() -> Self {
        Self {
            conversation: Conversation::new(),
            input: String::new(),
            cursor_position: 0,
            scroll_offset: 0,
            turn_rx: None,
        }
    }

    fn submit(&mut self, client: &ChatClient) {
        if let Some(messages) = self.conversation.submit(&self.input) {
            self.input.clear();
            self.cursor_position = 0;
            self.scroll_to_bottom();
            self.turn_rx = Some(client.send(messages));
        }
    }

    fn handle_turn_event(&mut self, event: ClientEvent) {
        if event == ClientEvent::Closed {
            self.turn_rx = None;
        }
        self.conversation.apply(event);
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input.chars().count() {
            self.cursor_position += 1;
        }
    }

    fn insert_char(&mut self, c: char) {
        let idx = self.byte_index();
        self.input.insert(idx, c);
        self.cursor_position += 1;
    }

    fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let idx = self.byte_index();
            self.input.remove(idx);
        }
    }

    fn scroll_up(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(amount);
    }

    fn scroll_down(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging to file instead of terminal to avoid corrupting TUI
    let log_file = std::fs::File::create("clarify-cli.log").ok();
    if let Some(file) = log_file {
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .init();
    }

    let server_url =
        std::env::var("CLARIFY_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
    let client = ChatClient::new(&server_url);
    info!("Chatting via {}", client.chat_url());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        while let Ok(event) = event::read() {
            if ui_tx.send(event).is_err() {
                break;
            }
        }
    });

    let res = run_app(&mut terminal, &mut app, client, &mut ui_rx).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

/// Next event of the running turn; pends forever when no turn is running.
async fn next_turn_event(turn_rx: &mut Option<mpsc::UnboundedReceiver<ClientEvent>>) -> Option<ClientEvent> {
    match turn_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    client: ChatClient,
    ui_rx: &mut mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        tokio::select! {
            Some(event) = next_turn_event(&mut app.turn_rx) => {
                debug!("Turn event: {:?}", event);
                app.handle_turn_event(event);
            }
            Some(event) = ui_rx.recv() => {
                let Event::Key(key) = event else { continue };
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('c')
                        if key.modifiers.contains(event::KeyModifiers::CONTROL) =>
                    {
                        return Ok(())
                    }
                    KeyCode::Enter => app.submit(&client),
                    KeyCode::Up => app.scroll_up(1),
                    KeyCode::Down => app.scroll_down(1),
                    KeyCode::PageUp => app.scroll_up(10),
                    KeyCode::PageDown => app.scroll_down(10),
                    // Input is locked while a turn is running.
                    _ if app.conversation.in_flight() => {}
                    KeyCode::Char(c) => app.insert_char(c),
                    KeyCode::Backspace => app.delete_char(),
                    KeyCode::Left => app.move_cursor_left(),
                    KeyCode::Right => app.move_cursor_right(),
                    KeyCode::Home => app.cursor_position = 0,
                    KeyCode::End => app.cursor_position = app.input.chars().count(),
                    _ => {}
                }
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_status(f, app, chunks[0]);
    render_chat(f, app, chunks[1]);
    render_input(f, app, chunks[2]);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let (text, color) = match app.conversation.notice() {
        Some(notice) => (format!("● Error: {}", notice), Color::Red),
        None if app.conversation.in_flight() => ("● Generating...".to_string(), Color::Yellow),
        None => ("● Ready".to_string(), Color::Green),
    };
    f.render_widget(
        Paragraph::new(text).style(Style::default().fg(color)),
        area,
    );
}

fn render_chat(f: &mut Frame, app: &App, area: Rect) {
    let mut all_lines: Vec<Line> = Vec::new();

    for msg in app.conversation.visible_messages() {
        let (prefix, style) = match msg.role {
            MessageRole::User => ("You", Style::default().fg(Color::Cyan)),
            _ => ("Assistant", Style::default().fg(Color::Green)),
        };

        all_lines.push(Line::from(Span::styled(
            format!("{}:", prefix),
            style.add_modifier(Modifier::BOLD),
        )));

        if msg.content.is_empty() && app.conversation.in_flight() {
            all_lines.push(Line::from(Span::styled("●●●", style)));
        }
        for line in msg.content.lines() {
            all_lines.push(Line::from(Span::styled(line, style)));
        }

        all_lines.push(Line::from(""));
    }

    if let Some(rewrite) = app.conversation.rewrite() {
        all_lines.push(Line::from(vec![
            Span::styled("Suggested rewrite: ", Style::default().fg(Color::DarkGray)),
            Span::styled(rewrite, Style::default().fg(Color::Gray)),
        ]));
    }

    // Calculate visible lines based on scroll offset
    let total_lines = all_lines.len();
    let visible_height = area.height as usize;

    let start_line = if total_lines > visible_height {
        let max_scroll = total_lines - visible_height;
        max_scroll - app.scroll_offset.min(max_scroll)
    } else {
        0
    };

    let end_line = (start_line + visible_height).min(total_lines);
    let visible_lines: Vec<Line> = all_lines[start_line..end_line].to_vec();

    let chat = Paragraph::new(visible_lines)
        .block(Block::default().borders(Borders::NONE))
        .wrap(Wrap { trim: false });

    f.render_widget(chat, area);
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    let busy = app.conversation.in_flight();
    let (input_text, style) = if busy {
        ("Generating...", Style::default().fg(Color::DarkGray))
    } else if app.input.is_empty() {
        ("Type your question", Style::default().fg(Color::DarkGray))
    } else {
        (app.input.as_str(), Style::default())
    };

    let input = Paragraph::new(input_text)
        .style(style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Input (Ctrl-Q to quit, ↑↓ to scroll)")
                .border_style(Style::default().fg(Color::White)),
        )
        .wrap(Wrap { trim: true });

    f.render_widget(input, area);

    if !busy {
        let cursor_x = area.x + app.cursor_position as u16 + 1;
        let cursor_y = area.y + 1;
        f.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(2)), cursor_y));
    }
}
