//! TUI application state and event loop.
//!
//! One topic is mounted at a time. Switching tabs stops the old subscription
//! and starts a fresh one; each topic keeps its own view settings. Deliveries
//! are drained on the UI thread between key polls, so rendering always sees a
//! consistent store.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use ratatui::widgets::TableState;

use monsoon_core::{
    DashboardConfig, MetricsProvider, Projection, SortKey, SubscriptionController, Topic,
    ViewMode, ViewState,
};

/// Where typed characters go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Filter,
}

/// Sort keys bound to `1`..`4`.
const SORT_KEYS: [SortKey; 4] = [SortKey::Cpu, SortKey::Memory, SortKey::Name, SortKey::Id];

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    provider: Arc<dyn MetricsProvider>,
    config: DashboardConfig,
    controller: SubscriptionController,
    views: BTreeMap<Topic, ViewState>,
    input_mode: InputMode,
    column_cursor: usize,
    table_state: TableState,
    running: bool,
    paused: bool,
    /// Last start attempt, for throttling retries against an unavailable
    /// provider.
    last_attempt: Option<Instant>,
    /// Why the provider refused the current topic, if it did.
    unavailable: Option<String>,
    /// One-line feedback: kill results, column errors, dropped snapshots.
    status: Option<String>,
}

impl App {
    pub fn new(provider: Arc<dyn MetricsProvider>, config: DashboardConfig) -> Self {
        let views = Topic::ALL
            .into_iter()
            .map(|t| (t, config.view_for(t)))
            .collect();
        let controller = mount(&provider, &config, config.topic);
        let mut app = Self {
            provider,
            config,
            controller,
            views,
            input_mode: InputMode::Normal,
            column_cursor: 0,
            table_state: TableState::default().with_selected(Some(0)),
            running: true,
            paused: false,
            last_attempt: None,
            unavailable: None,
            status: None,
        };
        app.start_current();
        app
    }

    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Restore the terminal before printing a panic.
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(info);
        }));

        let result = self.run_loop(&mut terminal);

        let _ = std::panic::take_hook();
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;

        self.controller.stop();
        result
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        while self.running {
            self.tick();
            terminal.draw(|f| super::ui::draw(f, self))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }
        }
        Ok(())
    }

    /// Drain deliveries, retrying the start when the provider refused it.
    fn tick(&mut self) {
        if !self.paused && !self.controller.is_live() {
            let due = self
                .last_attempt
                .is_none_or(|t| t.elapsed() >= self.config.interval);
            if due {
                self.start_current();
            }
        }

        let stats = self.controller.pump();
        if stats.malformed > 0 {
            self.status = Some(format!("dropped {} malformed snapshot(s)", stats.malformed));
        }
        self.clamp_selection();
    }

    fn start_current(&mut self) {
        self.last_attempt = Some(Instant::now());
        let result = self.controller.resume().map(|_| ());
        match result {
            Ok(()) => self.unavailable = None,
            Err(e) => self.unavailable = Some(e.to_string()),
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        if self.input_mode == InputMode::Filter {
            self.handle_filter_key(key);
            return;
        }

        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Tab | KeyCode::Right => self.switch_topic(self.neighbour(1)),
            KeyCode::BackTab | KeyCode::Left => self.switch_topic(self.neighbour(-1)),
            KeyCode::Up | KeyCode::Char('k') => {
                let i = self.selected().saturating_sub(1);
                self.table_state.select(Some(i));
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let last = self.row_count().saturating_sub(1);
                let i = (self.selected() + 1).min(last);
                self.table_state.select(Some(i));
            }
            KeyCode::Char('h') => {
                let mode = self.view_mut().toggle_mode();
                self.status = Some(format!("{} mode", mode.label()));
            }
            KeyCode::Char(c @ '1'..='4') => {
                let idx = (c as u8 - b'1') as usize;
                self.view_mut().sort_by(SORT_KEYS[idx]);
            }
            KeyCode::Char('0') => self.view_mut().sort_by(SortKey::Provider),
            KeyCode::Char('/') => self.input_mode = InputMode::Filter,
            KeyCode::Char('c') => {
                let n = self.topic().columns().len();
                self.column_cursor = (self.column_cursor + 1) % n;
            }
            KeyCode::Char(' ') => self.toggle_cursor_column(),
            KeyCode::Char('p') => self.toggle_pause(),
            KeyCode::Char('K') => self.kill_selected(),
            _ => {}
        }
    }

    fn handle_filter_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Enter => self.input_mode = InputMode::Normal,
            KeyCode::Esc => {
                self.view_mut().set_filter("");
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Backspace => {
                self.view_mut().filter_text.pop();
            }
            KeyCode::Char(c) => self.view_mut().filter_text.push(c),
            _ => {}
        }
        self.table_state.select(Some(0));
    }

    fn neighbour(&self, step: isize) -> Topic {
        let all = Topic::ALL;
        let here = all.iter().position(|t| *t == self.topic()).unwrap_or(0) as isize;
        let n = all.len() as isize;
        all[((here + step).rem_euclid(n)) as usize]
    }

    /// Unmount the current topic and mount `topic`.
    fn switch_topic(&mut self, topic: Topic) {
        if topic == self.topic() {
            return;
        }
        self.controller.stop();
        self.controller = mount(&self.provider, &self.config, topic);
        self.paused = false;
        self.column_cursor = 0;
        self.status = None;
        self.table_state.select(Some(0));
        self.start_current();
    }

    fn toggle_pause(&mut self) {
        if self.paused {
            self.paused = false;
            self.start_current();
            self.status = Some("resumed".into());
        } else {
            self.controller.pause();
            self.paused = true;
            self.status = Some("paused".into());
        }
    }

    fn toggle_cursor_column(&mut self) {
        let topic = self.topic();
        let Some(column) = topic.columns().get(self.column_cursor) else {
            return;
        };
        let name = column.name;
        let result = self.view_mut().toggle_column(topic, name);
        self.status = Some(match result {
            Ok(true) => format!("showing {name}"),
            Ok(false) => format!("hiding {name}"),
            Err(e) => e.to_string(),
        });
    }

    fn kill_selected(&mut self) {
        if self.topic() != Topic::Processes {
            return;
        }
        let Some(pid) = self.selected_pid() else {
            self.status = Some("no process selected".into());
            return;
        };
        self.status = Some(match self.provider.kill_entity(pid) {
            Ok(()) => format!("sent SIGTERM to {pid}"),
            Err(e) => e.to_string(),
        });
    }

    fn selected_pid(&self) -> Option<u32> {
        match self.projection() {
            Projection::Instantaneous { rows, .. } => rows
                .get(self.selected())
                .and_then(|r| r.key.as_u64())
                .and_then(|pid| u32::try_from(pid).ok()),
            Projection::History { series, .. } => series
                .get(self.selected())
                .and_then(|s| s.key.as_u64())
                .and_then(|pid| u32::try_from(pid).ok()),
        }
    }

    fn clamp_selection(&mut self) {
        let n = self.row_count();
        if self.selected() >= n {
            self.table_state.select(Some(n.saturating_sub(1)));
        }
    }

    fn view_mut(&mut self) -> &mut ViewState {
        let topic = self.topic();
        let config = &self.config;
        self.views
            .entry(topic)
            .or_insert_with(|| config.view_for(topic))
    }

    // -- accessors for the UI ------------------------------------------------

    pub fn topic(&self) -> Topic {
        self.controller.topic()
    }

    pub fn view(&self) -> ViewState {
        self.views
            .get(&self.topic())
            .cloned()
            .unwrap_or_else(|| self.config.view_for(self.topic()))
    }

    pub fn projection(&self) -> Projection {
        self.controller.project(&self.view())
    }

    pub fn row_count(&self) -> usize {
        self.projection().len()
    }

    pub fn selected(&self) -> usize {
        self.table_state.selected().unwrap_or(0)
    }

    pub fn table_state(&self) -> &TableState {
        &self.table_state
    }

    pub fn controller(&self) -> &SubscriptionController {
        &self.controller
    }

    pub fn cycle_count(&self) -> u64 {
        self.controller.reconciler().cycles()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn column_cursor(&self) -> usize {
        self.column_cursor
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn unavailable(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn mode(&self) -> ViewMode {
        self.view().mode
    }
}

fn mount(
    provider: &Arc<dyn MetricsProvider>,
    config: &DashboardConfig,
    topic: Topic,
) -> SubscriptionController {
    SubscriptionController::new(
        provider.clone(),
        topic,
        config.retention(),
        config.params(),
    )
}
