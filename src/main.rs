use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use streamscout_terminal::api_fetch::HttpBackend;
use streamscout_terminal::config::AppConfig;
use streamscout_terminal::countdown::format_countdown;
use streamscout_terminal::fake_feed::FakeBackend;
use streamscout_terminal::provider::spawn_provider;
use streamscout_terminal::refresh::{RefreshController, ViewModel};
use streamscout_terminal::state::{
    AppState, Delta, Opportunity, ProviderCommand, RefreshState, Snapshot, apply_delta,
    state_label,
};

struct App {
    state: AppState,
    should_quit: bool,
    cmd_tx: mpsc::Sender<ProviderCommand>,
    source: String,
}

impl App {
    fn new(state: AppState, cmd_tx: mpsc::Sender<ProviderCommand>, source: String) -> Self {
        Self {
            state,
            should_quit: false,
            cmd_tx,
            source,
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.state.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.state.select_prev(),
            KeyCode::Char('g') | KeyCode::Home => self.state.select_first(),
            KeyCode::Char('G') | KeyCode::End => self.state.select_last(),
            KeyCode::Char('r') | KeyCode::Char('R') => {
                let commands = self.state.retry();
                self.dispatch(commands);
            }
            KeyCode::Char('?') => self.state.help_overlay = !self.state.help_overlay,
            KeyCode::Esc => self.state.help_overlay = false,
            _ => {}
        }
    }

    fn dispatch(&mut self, commands: Vec<ProviderCommand>) {
        for cmd in commands {
            if self.cmd_tx.send(cmd).is_err() {
                self.state.push_log("[WARN] Provider thread is gone; request dropped");
            }
        }
    }
}

fn main() -> io::Result<()> {
    let mut config = AppConfig::load();
    for arg in config.apply_args(std::env::args().skip(1)) {
        eprintln!("ignoring unknown argument: {arg}");
    }

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let source = if config.demo {
        spawn_provider(FakeBackend::default(), tx, cmd_rx);
        "DEMO".to_string()
    } else {
        match HttpBackend::new(&config.api_url) {
            Ok(backend) => {
                let label = backend.base_url().to_string();
                spawn_provider(backend, tx, cmd_rx);
                label
            }
            Err(err) => {
                eprintln!("error: {err:#}");
                return Ok(());
            }
        }
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let controller = RefreshController::new(config.refresh_settings());
    let mut app = App::new(AppState::new(controller), cmd_tx, source);
    let res = run_app(&mut terminal, &mut app, rx);

    let shutdown = app.state.controller.teardown();
    app.dispatch(shutdown);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    let commands = app.state.start();
    app.dispatch(commands);

    loop {
        while let Ok(delta) = rx.try_recv() {
            let commands = apply_delta(&mut app.state, delta, Instant::now());
            app.dispatch(commands);
        }

        let commands = app.state.tick(Instant::now());
        app.dispatch(commands);

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let view = app.state.view();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(5),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(&view, &app.source))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    render_body(frame, chunks[1], &view, app.state.selected);

    let console = Paragraph::new(console_text(&app.state))
        .block(Block::default().title("Console").borders(Borders::ALL));
    frame.render_widget(console, chunks[2]);

    let footer = Paragraph::new(footer_text(view.state))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, chunks[3]);

    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(view: &ViewModel, source: &str) -> String {
    let refresh = match view.state {
        RefreshState::Ready if view.loading => "refreshing...".to_string(),
        RefreshState::Ready => format!("next refresh {}", format_countdown(view.countdown_seconds)),
        RefreshState::Initializing => "loading...".to_string(),
        RefreshState::WarmingUp => "waiting for server".to_string(),
        RefreshState::Error => "press r to retry".to_string(),
    };
    let line1 = format!(
        "  STREAM SCOUT | {} | {} | {}",
        state_label(view.state),
        refresh,
        source
    );
    let line2 = match view.snapshot.as_deref() {
        Some(snapshot) => format!(
            "  {} games analyzed | updated {}",
            snapshot.total_analyzed,
            generated_label(snapshot)
        ),
        None => "  no data yet".to_string(),
    };
    format!("{line1}\n{line2}")
}

fn generated_label(snapshot: &Snapshot) -> String {
    snapshot
        .generated_at
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn footer_text(state: RefreshState) -> &'static str {
    match state {
        RefreshState::Error => "r Retry | j/k/↑/↓ Move | g/G Top/Bottom | ? Help | q Quit",
        _ => "j/k/↑/↓ Move | g/G Top/Bottom | ? Help | q Quit",
    }
}

fn render_body(frame: &mut Frame, area: Rect, view: &ViewModel, selected: usize) {
    let banner = match view.state {
        RefreshState::WarmingUp => Some((
            "Warming up",
            view.warmup_message
                .clone()
                .unwrap_or_else(|| "Waiting for server...".to_string()),
            Color::Yellow,
        )),
        RefreshState::Error => Some((
            "Error",
            format!(
                "{}\nPress r to retry.",
                view.error_message.as_deref().unwrap_or("Unknown error")
            ),
            Color::Red,
        )),
        RefreshState::Initializing if view.snapshot.is_none() => Some((
            "Loading",
            "Loading stream opportunities...".to_string(),
            Color::Cyan,
        )),
        _ => None,
    };

    let Some(snapshot) = view.snapshot.as_deref() else {
        if let Some((title, text, color)) = banner {
            render_banner(frame, area, title, &text, color);
        }
        return;
    };

    let list_area = if let Some((title, text, color)) = banner {
        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(1)])
            .split(area);
        render_banner(frame, sections[0], title, &text, color);
        sections[1]
    } else {
        area
    };

    // Anything other than a live snapshot is shown dimmed.
    let stale = view.state != RefreshState::Ready;
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(40), Constraint::Length(38)])
        .split(list_area);
    render_opportunity_table(frame, columns[0], snapshot, selected, stale);

    let detail = Paragraph::new(detail_text(snapshot, selected))
        .wrap(Wrap { trim: true })
        .block(Block::default().title("Details").borders(Borders::ALL));
    frame.render_widget(detail, columns[1]);
}

fn render_banner(frame: &mut Frame, area: Rect, title: &str, text: &str, color: Color) {
    let banner = Paragraph::new(text.to_string())
        .style(Style::default().fg(color))
        .wrap(Wrap { trim: true })
        .block(Block::default().title(title.to_string()).borders(Borders::ALL));
    frame.render_widget(banner, area);
}

fn table_columns() -> [Constraint; 9] {
    [
        Constraint::Length(4),
        Constraint::Min(18),
        Constraint::Length(9),
        Constraint::Length(6),
        Constraint::Length(8),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(14),
    ]
}

fn render_opportunity_table(
    frame: &mut Frame,
    area: Rect,
    snapshot: &Snapshot,
    selected: usize,
    stale: bool,
) {
    let block = Block::default().title("Opportunities").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.height < 2 {
        return;
    }

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);
    let widths = table_columns();
    render_table_header(frame, sections[0], &widths);

    let list_area = sections[1];
    let rows = &snapshot.opportunities;
    if rows.is_empty() {
        let empty = Paragraph::new("No opportunities in this snapshot")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, list_area);
        return;
    }

    let visible = list_area.height as usize;
    let (start, end) = visible_range(selected, rows.len(), visible);
    for (i, idx) in (start..end).enumerate() {
        let row_area = Rect {
            x: list_area.x,
            y: list_area.y + i as u16,
            width: list_area.width,
            height: 1,
        };
        let is_selected = idx == selected;
        let mut row_style = if is_selected {
            Style::default().fg(Color::White).bg(Color::DarkGray)
        } else {
            Style::default()
        };
        if stale {
            row_style = row_style.add_modifier(Modifier::DIM);
        }
        if is_selected {
            frame.render_widget(Block::default().style(row_style), row_area);
        }

        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(widths)
            .split(row_area);

        let o = &rows[idx];
        render_cell_text(frame, cols[0], &o.rank.to_string(), row_style);
        render_cell_text(frame, cols[1], &o.name, row_style);
        render_cell_text(frame, cols[2], &format_count(o.total_viewers), row_style);
        render_cell_text(frame, cols[3], &o.channels.to_string(), row_style);
        render_cell_text(frame, cols[4], &format!("{:.1}", o.avg_viewers_per_channel), row_style);
        render_cell_text(frame, cols[5], &format_score(o.scores.discoverability), row_style);
        render_cell_text(frame, cols[6], &format_score(o.scores.viability), row_style);
        render_cell_text(frame, cols[7], &format_score(o.scores.engagement), row_style);
        let overall_style = row_style.fg(score_color(o.scores.overall));
        render_cell_text(frame, cols[8], &score_bar(o.scores.overall, 8), overall_style);
    }
}

fn render_table_header(frame: &mut Frame, area: Rect, widths: &[Constraint]) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(widths)
        .split(area);
    let style = Style::default().add_modifier(Modifier::BOLD);

    render_cell_text(frame, cols[0], "#", style);
    render_cell_text(frame, cols[1], "Game", style);
    render_cell_text(frame, cols[2], "Viewers", style);
    render_cell_text(frame, cols[3], "Ch", style);
    render_cell_text(frame, cols[4], "Avg/Ch", style);
    render_cell_text(frame, cols[5], "Disc", style);
    render_cell_text(frame, cols[6], "Via", style);
    render_cell_text(frame, cols[7], "Eng", style);
    render_cell_text(frame, cols[8], "Overall", style);
}

fn render_cell_text(frame: &mut Frame, area: Rect, text: &str, style: Style) {
    let paragraph = Paragraph::new(text.to_string()).style(style);
    frame.render_widget(paragraph, area);
}

fn detail_text(snapshot: &Snapshot, selected: usize) -> String {
    let Some(o) = snapshot.opportunities.get(selected) else {
        return "No opportunity selected".to_string();
    };
    let mut lines = vec![
        format!("#{} {}", o.rank, o.name),
        String::new(),
        format!("Viewers: {}", format_count(o.total_viewers)),
        format!("Channels: {}", o.channels),
        format!("Avg/channel: {:.1}", o.avg_viewers_per_channel),
        format!("Trend: {}", trend_label(&o.trend)),
        String::new(),
        format!("Discoverability: {}", format_score(o.scores.discoverability)),
        format!("Viability: {}", format_score(o.scores.viability)),
        format!("Engagement: {}", format_score(o.scores.engagement)),
        format!("Overall: {}", format_score(o.scores.overall)),
        String::new(),
        non_empty_or(&o.recommendation, "No recommendation"),
        String::new(),
    ];
    lines.extend(purchase_lines(o));
    if let Some(url) = &o.box_art_url {
        lines.push(format!("Box art: {url}"));
    }
    if let Some(next) = &snapshot.next_update {
        lines.push(String::new());
        lines.push(format!("Server update: {next}"));
    }
    lines.join("\n")
}

fn purchase_lines(o: &Opportunity) -> Vec<String> {
    let mut lines = Vec::new();
    if o.purchase_links.free {
        lines.push("Free to play".to_string());
    }
    if let Some(steam) = &o.purchase_links.steam {
        lines.push(format!("Steam: {steam}"));
    }
    if let Some(epic) = &o.purchase_links.epic {
        lines.push(format!("Epic: {epic}"));
    }
    lines
}

fn console_text(state: &AppState) -> String {
    if state.logs.is_empty() {
        return "No messages yet".to_string();
    }
    state
        .logs
        .iter()
        .rev()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n")
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 || visible == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn format_count(value: u64) -> String {
    if value >= 1_000_000 {
        format!("{:.1}M", value as f64 / 1_000_000.0)
    } else if value >= 10_000 {
        format!("{:.1}K", value as f64 / 1_000.0)
    } else {
        value.to_string()
    }
}

fn format_score(score: f64) -> String {
    format!("{:.0}%", score * 100.0)
}

fn score_bar(score: f64, width: usize) -> String {
    let filled = ((score * width as f64).round() as usize).min(width);
    format!(
        "{:>4} {}{}",
        format_score(score),
        "█".repeat(filled),
        "░".repeat(width - filled)
    )
}

fn score_color(score: f64) -> Color {
    if score >= 0.7 {
        Color::Green
    } else if score >= 0.4 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn trend_label(trend: &str) -> String {
    match trend.to_ascii_lowercase().as_str() {
        "up" | "rising" => "↑ rising".to_string(),
        "down" | "falling" => "↓ falling".to_string(),
        "stable" | "flat" => "→ stable".to_string(),
        "" => "-".to_string(),
        _ => trend.to_string(),
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "Stream Scout - Help",
        "",
        "  j/k or ↑/↓   Move selection",
        "  g / G        First / last entry",
        "  r            Retry after an error",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Data refreshes when the countdown reaches zero and",
        "every minute as a drift correction. While the server",
        "warms up the status endpoint is polled every few seconds.",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
