//! Terminal dashboard for the live monitor

mod state;
mod ui;

pub use state::DashboardState;

use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Snapshot;

const INPUT_POLL: Duration = Duration::from_millis(100);

/// Renders snapshots until the user quits or the monitor stops
pub struct Dashboard {
    state: DashboardState,
    snapshots: mpsc::Receiver<Snapshot>,
    cancel: CancellationToken,
}

impl Dashboard {
    pub fn new(snapshots: mpsc::Receiver<Snapshot>, cancel: CancellationToken) -> Self {
        Self {
            state: DashboardState::new(),
            snapshots,
            cancel,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_event_loop(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        // stop the monitor however the loop ended
        self.cancel.cancel();
        result
    }

    async fn run_event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        loop {
            terminal.draw(|f| ui::render(f, &self.state))?;

            loop {
                match self.snapshots.try_recv() {
                    Ok(snapshot) => self.state.apply(snapshot),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => return Ok(()),
                }
            }

            if self.cancel.is_cancelled() {
                return Ok(());
            }

            if event::poll(INPUT_POLL)?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
                && self.handle_key_event(key.code)
            {
                return Ok(());
            }

            tokio::task::yield_now().await;
        }
    }

    /// Returns `true` when the user asked to quit
    fn handle_key_event(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return true,
            KeyCode::Down | KeyCode::Char('j') => self.state.select_next(),
            KeyCode::Up | KeyCode::Char('k') => self.state.select_previous(),
            KeyCode::Char(' ') => self.state.toggle_pause(),
            _ => {}
        }
        false
    }
}
