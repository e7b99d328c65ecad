// src/tui/mod.rs
use crate::core::engine::{Command, TerminalSnapshot};
use crate::core::funds::{FundsOperation, FundsState};
use crate::core::order_form::{FormEvent, FormState};
use crate::types::{Instrument, Side, ToastLevel, TokenMetadata, UiEvent};
use crate::utils::conversion::nat_to_decimal;
use crate::utils::precision::format_fixed;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::{io, time::Duration};
use tokio::sync::mpsc;

const LANGUAGES: [&str; 4] = ["en", "es", "de", "ru"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Normal,
    Price,
    Volume,
    Funds(FundsOperation),
    Endpoint,
}

pub struct App {
    pub snapshot: TerminalSnapshot,
    pub toasts: Vec<(ToastLevel, String)>,
    pub logs: Vec<String>,
    mode: InputMode,
    buffer: String,
    selected_order: usize,
    funds_on_quote: bool,
    should_quit: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            snapshot: TerminalSnapshot::default(),
            toasts: Vec::new(),
            logs: Vec::new(),
            mode: InputMode::Normal,
            buffer: String::new(),
            selected_order: 0,
            funds_on_quote: false,
            should_quit: false,
        }
    }

    pub fn on_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Snapshot(snapshot) => {
                self.snapshot = *snapshot;
                let count = self.snapshot.state.pair_orders().len();
                self.selected_order = self.selected_order.min(count.saturating_sub(1));
            }
            UiEvent::Toast(level, msg) => {
                self.toasts.push((level, msg));
                if self.toasts.len() > 5 {
                    self.toasts.remove(0);
                }
            }
            UiEvent::Log(msg) => {
                self.logs.push(msg);
                if self.logs.len() > 20 {
                    self.logs.remove(0);
                }
            }
        }
    }

    /// Pairs of every listed token against the quote token.
    fn pairs(&self) -> Vec<Instrument> {
        let tokens = &self.snapshot.state.tokens;
        let Some(quote) = tokens.quote.as_ref() else {
            return Vec::new();
        };
        tokens
            .tokens
            .iter()
            .filter(|t| t.symbol() != quote.symbol())
            .map(|t| Instrument::new(t.symbol().to_string(), quote.symbol().to_string()))
            .collect()
    }

    fn funds_token(&self) -> Option<&TokenMetadata> {
        let (base, quote) = self.snapshot.state.pair_tokens()?;
        Some(if self.funds_on_quote { quote } else { base })
    }

    fn next_pair(&self) -> Option<Instrument> {
        let pairs = self.pairs();
        let current = self.snapshot.state.session.instrument.as_ref();
        let next = match pairs.iter().position(|p| Some(p) == current) {
            Some(i) => (i + 1) % pairs.len(),
            None => 0,
        };
        pairs.get(next).cloned()
    }

    fn start_input(&mut self, mode: InputMode, initial: String) -> Option<Command> {
        self.mode = mode;
        self.buffer = initial;
        None
    }

    fn edit_command(&self) -> Option<Command> {
        match self.mode {
            InputMode::Price => Some(Command::Form(FormEvent::EditPrice(self.buffer.clone()))),
            InputMode::Volume => Some(Command::Form(FormEvent::EditVolume(self.buffer.clone()))),
            _ => None,
        }
    }

    /// Maps a key press to a command for the engine.
    pub fn on_key(&mut self, code: KeyCode) -> Option<Command> {
        if self.mode != InputMode::Normal {
            return self.on_input_key(code);
        }
        match code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(Command::Shutdown)
            }
            KeyCode::Char('r') => Some(Command::Refresh),
            KeyCode::Char('b') => Some(Command::Form(FormEvent::SetSide(Side::Buy))),
            KeyCode::Char('s') => Some(Command::Form(FormEvent::SetSide(Side::Sell))),
            KeyCode::Char('p') => {
                let initial = self.snapshot.form.price_input.clone();
                self.start_input(InputMode::Price, initial)
            }
            KeyCode::Char('v') => {
                let initial = self.snapshot.form.volume_input.clone();
                self.start_input(InputMode::Volume, initial)
            }
            KeyCode::Enter => Some(Command::Form(FormEvent::Submit)),
            KeyCode::Char('a') => Some(Command::Form(FormEvent::Acknowledge)),
            KeyCode::Char('x') => Some(Command::AcknowledgeFunds),
            KeyCode::Up => {
                self.selected_order = self.selected_order.saturating_sub(1);
                None
            }
            KeyCode::Down => {
                let count = self.snapshot.state.pair_orders().len();
                if self.selected_order + 1 < count {
                    self.selected_order += 1;
                }
                None
            }
            KeyCode::Char('c') => {
                let orders = self.snapshot.state.pair_orders();
                orders.get(self.selected_order).map(|o| Command::CancelOrder {
                    side: o.side,
                    price: o.price,
                })
            }
            KeyCode::Tab => self.next_pair().map(Command::SelectPair),
            KeyCode::Char('t') => {
                self.funds_on_quote = !self.funds_on_quote;
                None
            }
            KeyCode::Char('d') => self.start_input(InputMode::Funds(FundsOperation::Deposit), String::new()),
            KeyCode::Char('w') => self.start_input(InputMode::Funds(FundsOperation::Withdraw), String::new()),
            KeyCode::Char('l') => self.funds_token().map(|t| Command::Funds {
                op: FundsOperation::Claim,
                token: t.symbol().to_string(),
                amount: None,
            }),
            KeyCode::Char('g') => {
                let current = self.snapshot.state.session.language.as_str();
                let next = LANGUAGES
                    .iter()
                    .position(|l| *l == current)
                    .map(|i| (i + 1) % LANGUAGES.len())
                    .unwrap_or(0);
                Some(Command::SetLanguage(LANGUAGES[next].to_string()))
            }
            KeyCode::Char('e') => {
                let initial = self.snapshot.state.session.endpoint.clone();
                self.start_input(InputMode::Endpoint, initial)
            }
            _ => None,
        }
    }

    fn on_input_key(&mut self, code: KeyCode) -> Option<Command> {
        match code {
            KeyCode::Esc => {
                self.mode = InputMode::Normal;
                self.buffer.clear();
                None
            }
            KeyCode::Char(c) => {
                self.buffer.push(c);
                self.edit_command()
            }
            KeyCode::Backspace => {
                self.buffer.pop();
                self.edit_command()
            }
            KeyCode::Enter => {
                let mode = std::mem::replace(&mut self.mode, InputMode::Normal);
                let text = std::mem::take(&mut self.buffer);
                match mode {
                    InputMode::Funds(op) => self.funds_token().map(|t| Command::Funds {
                        op,
                        token: t.symbol().to_string(),
                        amount: Some(text),
                    }),
                    InputMode::Endpoint => Some(Command::SetEndpoint(text)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn run(mut rx: mpsc::Receiver<UiEvent>, commands: mpsc::Sender<Command>) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(cmd) = app.on_key(key.code) {
                        if commands.send(cmd).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        if app.should_quit {
            break;
        }

        while let Ok(event) = rx.try_recv() {
            app.on_event(event);
        }
    }

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    Ok(())
}

fn amount(value: u128, token: Option<&TokenMetadata>) -> String {
    match token.map(|t| nat_to_decimal(value, t.decimals())) {
        Some(Ok(d)) => d.normalize().to_string(),
        _ => value.to_string(),
    }
}

fn block(title: &str) -> Block<'_> {
    Block::default().borders(Borders::ALL).title(title)
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(12),
            Constraint::Length(8),
        ])
        .split(f.size());

    render_header(f, app, chunks[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(40),
            Constraint::Percentage(30),
        ])
        .split(chunks[1]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[0]);
    render_balances(f, app, left[0]);
    render_orders(f, app, left[1]);

    let middle = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(columns[1]);
    render_prices(f, app, middle[0]);
    render_transactions(f, app, middle[1]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(columns[2]);
    render_form(f, app, right[0]);
    render_funds(f, app, right[1]);

    render_messages(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let session = &app.snapshot.state.session;
    let pair = session
        .instrument
        .as_ref()
        .map(|i| i.to_string())
        .unwrap_or_else(|| "no pair".to_string());
    let status = if app.snapshot.in_flight > 0 {
        format!("loading ({})", app.snapshot.in_flight)
    } else {
        "idle".to_string()
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!("Auction Terminal [{pair}]"),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" | {} | {} | ", session.endpoint, session.language)),
        Span::styled(status, Style::default().fg(Color::Yellow)),
    ]))
    .block(block("Status"));
    f.render_widget(header, area);
}

fn render_balances(f: &mut Frame, app: &App, area: Rect) {
    let state = &app.snapshot.state;
    let rows: Vec<Row> = state
        .balances
        .credits
        .iter()
        .map(|c| {
            let token = state.tokens.get(&c.token);
            Row::new(vec![
                c.token.clone(),
                amount(c.available, token),
                amount(c.locked, token),
                amount(state.balances.wallet(&c.token), token),
            ])
        })
        .collect();
    let title = if state.balances.stale { "Balances*" } else { "Balances" };
    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Min(8),
            Constraint::Min(8),
            Constraint::Min(8),
        ],
    )
    .header(
        Row::new(vec!["Token", "Free", "Locked", "Wallet"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(block(title));
    f.render_widget(table, area);
}

fn render_orders(f: &mut Frame, app: &App, area: Rect) {
    let state = &app.snapshot.state;
    let base = state.pair_tokens().map(|(b, _)| b);
    let items: Vec<ListItem> = state
        .pair_orders()
        .iter()
        .enumerate()
        .map(|(i, o)| {
            let color = match o.side {
                Side::Buy => Color::Green,
                Side::Sell => Color::Red,
            };
            let mut style = Style::default().fg(color);
            if i == app.selected_order {
                style = style.add_modifier(Modifier::REVERSED);
            }
            ListItem::new(Line::from(Span::styled(
                format!("{} {} @ {}", o.side, amount(o.volume, base), o.price.normalize()),
                style,
            )))
        })
        .collect();
    f.render_widget(List::new(items).block(block("Open Orders")), area);
}

fn render_prices(f: &mut Frame, app: &App, area: Rect) {
    let rows: Vec<Row> = app
        .snapshot
        .state
        .history
        .prices
        .iter()
        .map(|r| {
            Row::new(vec![
                r.datetime.format("%m-%d %H:%M").to_string(),
                format_fixed(r.price, r.price_decimals),
                format_fixed(r.volume_in_base, r.volume_in_base_decimals),
                format_fixed(r.volume_in_quote, r.volume_in_quote_decimals),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(11),
            Constraint::Min(10),
            Constraint::Min(10),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["Time", "Price", "Volume", "Quote"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(block("Price History"));
    f.render_widget(table, area);
}

fn render_transactions(f: &mut Frame, app: &App, area: Rect) {
    let rows: Vec<Row> = app
        .snapshot
        .state
        .history
        .transactions
        .iter()
        .map(|t| {
            let r = &t.item;
            Row::new(vec![
                r.datetime.format("%m-%d %H:%M").to_string(),
                t.side.to_string(),
                format_fixed(r.price, r.price_decimals),
                format_fixed(r.volume_in_base, r.volume_in_base_decimals),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(11),
            Constraint::Length(4),
            Constraint::Min(10),
            Constraint::Min(10),
        ],
    )
    .block(block("My Trades"));
    f.render_widget(table, area);
}

fn input_line<'a>(label: &'a str, value: &'a str, active: bool) -> Line<'a> {
    let style = if active {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::from(vec![Span::raw(label), Span::styled(value, style)])
}

fn render_form(f: &mut Frame, app: &App, area: Rect) {
    let form = &app.snapshot.form;
    let editing = |mode: InputMode| app.mode == mode;
    let price = if editing(InputMode::Price) { &app.buffer } else { &form.price_input };
    let volume = if editing(InputMode::Volume) { &app.buffer } else { &form.volume_input };
    let (status, color) = match &form.state {
        FormState::Idle => ("ready".to_string(), Color::Gray),
        FormState::Editing => ("editing".to_string(), Color::Gray),
        FormState::Validating => ("validating...".to_string(), Color::Yellow),
        FormState::Submitting => ("submitting...".to_string(), Color::Yellow),
        FormState::Success(msg) => (msg.clone(), Color::Green),
        FormState::Error(msg) => (msg.clone(), Color::Red),
    };
    let lines = vec![
        Line::from(format!("Side:   {}", form.side)),
        input_line("Price:  ", price, editing(InputMode::Price)),
        input_line("Volume: ", volume, editing(InputMode::Volume)),
        Line::from(Span::styled(status, Style::default().fg(color))),
        Line::from("[b/s] side [p/v] edit [Enter] place [a] ok"),
    ];
    f.render_widget(Paragraph::new(lines).block(block("New Order")), area);
}

fn render_funds(f: &mut Frame, app: &App, area: Rect) {
    let token = app
        .funds_token()
        .map(|t| t.symbol().to_string())
        .unwrap_or_else(|| "-".to_string());
    let status = match &app.snapshot.funds.state {
        FundsState::Idle => Span::raw("idle"),
        FundsState::Pending(op) => Span::styled(format!("{op} pending..."), Style::default().fg(Color::Yellow)),
        FundsState::Completed { op, amount: moved } => Span::styled(
            format!("{op} done: {}", amount(*moved, app.funds_token())),
            Style::default().fg(Color::Green),
        ),
        FundsState::Failed { op, message } => {
            Span::styled(format!("{op} failed: {message}"), Style::default().fg(Color::Red))
        }
    };
    let mut lines = vec![Line::from(format!("Token: {token}")), Line::from(status)];
    match app.mode {
        InputMode::Funds(op) => {
            lines.push(input_line("Amount: ", &app.buffer, true));
            lines.push(Line::from(format!("{op}: Enter to send, Esc to cancel")));
        }
        InputMode::Endpoint => lines.push(input_line("Endpoint: ", &app.buffer, true)),
        _ => {}
    }
    lines.push(Line::from("[t] token [d]eposit [w]ithdraw c[l]aim [x] ok"));
    f.render_widget(Paragraph::new(lines).block(block("Funds")), area);
}

fn render_messages(f: &mut Frame, app: &App, area: Rect) {
    let toasts = app.toasts.iter().rev().map(|(level, msg)| {
        let color = match level {
            ToastLevel::Info => Color::Cyan,
            ToastLevel::Error => Color::Red,
        };
        ListItem::new(Line::from(Span::styled(msg.as_str(), Style::default().fg(color))))
    });
    let logs = app
        .logs
        .iter()
        .rev()
        .map(|s| ListItem::new(Line::from(Span::raw(s.as_str()))));
    let items: Vec<ListItem> = toasts.chain(logs).collect();
    f.render_widget(List::new(items).block(block("Messages")), area);
}
