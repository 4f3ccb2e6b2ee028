use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{App, ProgressEvent, ProgressSink};
use crate::catalog::CatalogClient;
use crate::domain::{DatasetSource, ProgressState};
use crate::error::LabError;
use crate::grid::{self, GridPage, GridQuery, PAGE_SIZES, SortKey};

const EVENTS_MAX: usize = 8;
const CELL_WIDTH_MAX: usize = 24;

type Term = Terminal<CrosstermBackend<Stdout>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Fetch,
    Upload,
    Clear,
}

impl OperationKind {
    fn label(self) -> &'static str {
        match self {
            OperationKind::Fetch => "Fetch",
            OperationKind::Upload => "Upload",
            OperationKind::Clear => "Clear",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    Listing,
    Details,
    Done,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Starting => "Starting",
            Phase::Listing => "Listing",
            Phase::Details => "Details",
            Phase::Done => "Done",
        }
    }
}

#[derive(Debug)]
struct OperationState {
    status: String,
    phase: Phase,
    listing: Option<(usize, usize, usize, usize)>,
    progress: Option<ProgressState>,
    events: VecDeque<String>,
    started: Instant,
}

pub struct Tui {
    kind: OperationKind,
    state: Arc<Mutex<OperationState>>,
}

struct TuiProgress {
    state: Arc<Mutex<OperationState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let message = match event {
            ProgressEvent::Message(message) => {
                state.status = message.clone();
                message
            }
            ProgressEvent::Listing {
                page,
                pages,
                collected,
                total,
            } => {
                state.phase = Phase::Listing;
                state.listing = Some((page, pages, collected, total));
                format!("listing page {page}/{pages}: {collected} of {total} names")
            }
            ProgressEvent::Details(progress) => {
                state.phase = if progress.is_complete {
                    Phase::Done
                } else {
                    Phase::Details
                };
                state.progress = Some(progress);
                format!(
                    "batch {}/{}: {} of {} fetched",
                    progress.current_batch, progress.total_batches, progress.fetched, progress.total
                )
            }
        };
        push_event(&mut state.events, message);
    }
}

impl Tui {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(OperationState {
                status: "ready".to_string(),
                phase: Phase::Starting,
                listing: None,
                progress: None,
                events: VecDeque::new(),
                started: Instant::now(),
            })),
        }
    }

    /// Runs `f` on a worker thread while drawing its progress. `q` or Esc
    /// abandons the view; the worker is left to finish on its own.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, LabError> + Send + 'static,
        R: Send + 'static,
    {
        let mut terminal = enter_terminal()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_operation(frame, self.kind, &state, tick))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                leave_terminal()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if key.kind == KeyEventKind::Press
                        && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                    {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }

        leave_terminal()?;
        Err(miette::Report::msg("aborted"))
    }

    pub fn confirm_clear(&mut self, source: DatasetSource) -> miette::Result<bool> {
        let mut terminal = enter_terminal()?;

        let confirmed = loop {
            terminal
                .draw(|frame| {
                    let block = Block::default().borders(Borders::ALL).title("Confirm");
                    let text = Paragraph::new(vec![
                        Line::from(format!("Clear all {source} data?")),
                        Line::from("Press y to confirm, n to cancel."),
                    ])
                    .alignment(Alignment::Center)
                    .block(block);
                    frame.render_widget(text, frame.area());
                })
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(100)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    match key.code {
                        KeyCode::Char('y') | KeyCode::Char('Y') => break true,
                        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => break false,
                        _ => {}
                    }
                }
            }
        };

        leave_terminal()?;
        Ok(confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputMode {
    Browse,
    Search(String),
    Edit(String),
}

/// Interactive grid over one dataset: search, sort, paging and cell edits.
pub struct Browser {
    source: DatasetSource,
    query: GridQuery,
    table: TableState,
    column: usize,
    mode: InputMode,
    status: String,
}

impl Browser {
    pub fn new(source: DatasetSource, query: GridQuery) -> Self {
        let mut table = TableState::default();
        table.select(Some(0));
        Self {
            source,
            query,
            table,
            column: 0,
            mode: InputMode::Browse,
            status: "ready".to_string(),
        }
    }

    pub fn run<C: CatalogClient>(&mut self, app: &mut App<C>) -> miette::Result<()> {
        let mut terminal = enter_terminal()?;

        loop {
            let page = app.view(self.source, &self.query);
            self.query.page = page.page;
            self.clamp_selection(&page);
            terminal
                .draw(|frame| self.draw(frame, &page))
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(200)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key, app, &page) {
                        break;
                    }
                }
            }
        }

        leave_terminal()?;
        Ok(())
    }

    fn handle_key<C: CatalogClient>(
        &mut self,
        key: KeyEvent,
        app: &mut App<C>,
        page: &GridPage,
    ) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match &mut self.mode {
            InputMode::Search(buffer) => match key.code {
                KeyCode::Enter => {
                    let search = buffer.trim().to_string();
                    self.query.search = (!search.is_empty()).then_some(search);
                    self.query.page = 0;
                    self.mode = InputMode::Browse;
                }
                KeyCode::Esc => self.mode = InputMode::Browse,
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Char(ch) => buffer.push(ch),
                _ => {}
            },
            InputMode::Edit(buffer) => match key.code {
                KeyCode::Enter => {
                    let raw = buffer.clone();
                    self.mode = InputMode::Browse;
                    self.apply_edit(app, page, &raw);
                }
                KeyCode::Esc => self.mode = InputMode::Browse,
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Char(ch) => buffer.push(ch),
                _ => {}
            },
            InputMode::Browse => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return true,
                KeyCode::Up => self.move_row(page, -1),
                KeyCode::Down => self.move_row(page, 1),
                KeyCode::Left => self.column = self.column.saturating_sub(1),
                KeyCode::Right => {
                    self.column = (self.column + 1).min(page.columns.len().saturating_sub(1))
                }
                KeyCode::PageDown | KeyCode::Char('n') => {
                    if self.query.page + 1 < page.page_count {
                        self.query.page += 1;
                    }
                }
                KeyCode::PageUp | KeyCode::Char('p') => {
                    self.query.page = self.query.page.saturating_sub(1)
                }
                KeyCode::Char('s') => self.toggle_sort(page),
                KeyCode::Char('+') => self.cycle_page_size(1),
                KeyCode::Char('-') => self.cycle_page_size(-1),
                KeyCode::Char('/') => {
                    self.mode = InputMode::Search(self.query.search.clone().unwrap_or_default())
                }
                KeyCode::Char('e') | KeyCode::Enter => {
                    if page.rows.is_empty() {
                        self.status = "nothing to edit".to_string();
                    } else {
                        self.mode = InputMode::Edit(String::new());
                    }
                }
                _ => {}
            },
        }
        false
    }

    fn apply_edit<C: CatalogClient>(&mut self, app: &mut App<C>, page: &GridPage, raw: &str) {
        let Some(record) = self.table.selected().and_then(|row| page.rows.get(row)) else {
            return;
        };
        let Some(column) = page.columns.get(self.column) else {
            return;
        };
        self.status = match app.edit(self.source, &record.id, &column.key, raw) {
            Ok(_) => format!("updated {} of {}", column.label, record.id),
            Err(err) => err.to_string(),
        };
    }

    fn move_row(&mut self, page: &GridPage, delta: isize) {
        let len = page.rows.len();
        if len == 0 {
            return;
        }
        let current = self.table.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        self.table.select(Some(next as usize));
    }

    fn clamp_selection(&mut self, page: &GridPage) {
        let len = page.rows.len();
        match self.table.selected() {
            Some(row) if row >= len => self.table.select(len.checked_sub(1)),
            None if len > 0 => self.table.select(Some(0)),
            _ => {}
        }
        self.column = self.column.min(page.columns.len().saturating_sub(1));
    }

    fn toggle_sort(&mut self, page: &GridPage) {
        let Some(column) = page.columns.get(self.column) else {
            return;
        };
        self.query.sort = match self.query.sort.take() {
            Some(sort) if sort.column == column.key => Some(SortKey {
                column: sort.column,
                direction: sort.direction.toggled(),
            }),
            _ => Some(SortKey {
                column: column.key.clone(),
                direction: grid::SortDirection::Asc,
            }),
        };
        self.query.page = 0;
    }

    fn cycle_page_size(&mut self, step: isize) {
        let index = PAGE_SIZES
            .iter()
            .position(|size| *size == self.query.page_size)
            .unwrap_or(1) as isize;
        let next = (index + step).clamp(0, PAGE_SIZES.len() as isize - 1) as usize;
        self.query.page_size = PAGE_SIZES[next];
        self.query.page = 0;
    }

    fn draw(&mut self, frame: &mut ratatui::Frame, page: &GridPage) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(5),
                Constraint::Length(3),
            ])
            .split(frame.area());

        let sort = self
            .query
            .sort
            .as_ref()
            .map(|sort| sort.to_string())
            .unwrap_or_else(|| "none".to_string());
        let header = Paragraph::new(Line::from(vec![
            Span::styled(
                "POKELAB",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                "  {}  rows {}  page {}/{}  size {}  sort {}  search {}",
                self.source,
                page.total_rows,
                page.page + 1,
                page.page_count,
                page.page_size,
                sort,
                self.query.search.as_deref().unwrap_or("-"),
            )),
        ]))
        .block(Block::default().borders(Borders::BOTTOM));
        frame.render_widget(header, chunks[0]);

        let widths = page
            .columns
            .iter()
            .map(|column| {
                let widest = page
                    .rows
                    .iter()
                    .map(|record| grid::cell_text(record, &column.key).chars().count())
                    .max()
                    .unwrap_or(0)
                    .max(column.label.chars().count());
                Constraint::Length(widest.min(CELL_WIDTH_MAX) as u16)
            })
            .collect::<Vec<_>>();
        let header_row = Row::new(page.columns.iter().enumerate().map(|(index, column)| {
            let style = if index == self.column {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            };
            Cell::from(column.label.clone()).style(style)
        }));
        let rows = page.rows.iter().map(|record| {
            Row::new(
                page.columns
                    .iter()
                    .map(|column| Cell::from(grid::cell_text(record, &column.key))),
            )
        });
        let table = Table::new(rows, widths)
            .header(header_row)
            .block(Block::default().borders(Borders::ALL))
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        frame.render_stateful_widget(table, chunks[1], &mut self.table);

        let prompt = match &self.mode {
            InputMode::Browse => Line::from(vec![
                Span::styled(self.status.clone(), Style::default().fg(Color::Yellow)),
                Span::styled(
                    "   arrows move  s sort  n/p page  +/- size  / search  e edit  q quit",
                    Style::default().fg(Color::Gray),
                ),
            ]),
            InputMode::Search(buffer) => Line::from(format!("/{buffer}")),
            InputMode::Edit(buffer) => {
                let label = page
                    .columns
                    .get(self.column)
                    .map(|column| column.label.as_str())
                    .unwrap_or("");
                Line::from(format!("{label} = {buffer}"))
            }
        };
        let footer = Paragraph::new(prompt)
            .block(Block::default().borders(Borders::TOP))
            .wrap(Wrap { trim: true });
        frame.render_widget(footer, chunks[2]);
    }
}

fn draw_operation(
    frame: &mut ratatui::Frame,
    kind: OperationKind,
    state: &OperationState,
    tick: usize,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(4),
        ])
        .split(frame.area());

    let heartbeat = if tick % 2 == 0 { "*" } else { " " };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "POKELAB",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Op: "),
        Span::styled(kind.label(), Style::default().fg(Color::Cyan)),
        Span::raw("   Phase: "),
        Span::styled(state.phase.label(), Style::default().fg(Color::Yellow)),
        Span::raw(format!("   {}s ", state.started.elapsed().as_secs())),
        Span::styled(heartbeat, Style::default().fg(Color::Green)),
    ]))
    .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    let (listing_ratio, listing_label) = match state.listing {
        Some((page, pages, collected, total)) => (
            ratio(page, pages),
            format!("page {page}/{pages} · {collected}/{total} names"),
        ),
        None => (0.0, "waiting".to_string()),
    };
    let listing = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Listing"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(listing_ratio)
        .label(listing_label);
    frame.render_widget(listing, chunks[1]);

    let (detail_ratio, detail_label) = match state.progress {
        Some(progress) => (
            ratio(progress.current_batch, progress.total_batches),
            format!(
                "batch {}/{} · {}/{} fetched · {:.0}%",
                progress.current_batch,
                progress.total_batches,
                progress.fetched,
                progress.total,
                progress.percent()
            ),
        ),
        None => (0.0, "waiting".to_string()),
    };
    let color = if state.phase == Phase::Done {
        Color::Green
    } else {
        Color::Cyan
    };
    let details = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Details"))
        .gauge_style(Style::default().fg(color))
        .ratio(detail_ratio)
        .label(detail_label);
    frame.render_widget(details, chunks[2]);

    let mut lines = vec![Line::from(Span::styled(
        state.status.clone(),
        Style::default().fg(Color::Yellow),
    ))];
    lines.extend(state.events.iter().map(|event| Line::from(event.clone())));
    let events = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Events"))
        .wrap(Wrap { trim: true });
    frame.render_widget(events, chunks[3]);
}

fn ratio(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done as f64 / total as f64).clamp(0.0, 1.0)
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}

fn enter_terminal() -> miette::Result<Term> {
    let mut stdout = io::stdout();
    enable_raw_mode().into_diagnostic()?;
    stdout.execute(EnterAlternateScreen).into_diagnostic()?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).into_diagnostic()?;
    terminal.clear().into_diagnostic()?;
    Ok(terminal)
}

fn leave_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout()
        .execute(LeaveAlternateScreen)
        .into_diagnostic()?;
    Ok(())
}
