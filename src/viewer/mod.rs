use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, instrument};

use crate::keys::{KeyError, Scope};
use crate::period::Timeframe;
use crate::reader::{LeaderboardReader, RankedEntry};
use crate::shared::LeaderboardError;

const RANK_WIDTH: usize = 6;
const USER_WIDTH: usize = 10;
const SCORE_WIDTH: usize = 8;

/// Configuration for the polling viewer
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// How often the current ranking is reloaded without user input
    pub refresh_interval: Duration,
    pub projects: Vec<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(2),
            projects: (1..=5).map(|n| format!("project{n}")).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerSignal {
    Refresh,
    Navigate(Navigation),
    Quit,
}

impl ViewerSignal {
    /// Maps one line of input to a signal; unknown input is ignored.
    pub fn parse_input(line: &str) -> Option<Self> {
        match line.trim() {
            "left" | "h" => Some(ViewerSignal::Navigate(Navigation::Left)),
            "right" | "l" => Some(ViewerSignal::Navigate(Navigation::Right)),
            "up" | "k" => Some(ViewerSignal::Navigate(Navigation::Up)),
            "down" | "j" => Some(ViewerSignal::Navigate(Navigation::Down)),
            "q" | "quit" | "ctrl+c" => Some(ViewerSignal::Quit),
            "" | "r" => Some(ViewerSignal::Refresh),
            _ => None,
        }
    }
}

/// Which leaderboard is on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerState {
    scopes: Vec<Scope>,
    timeframes: Vec<Timeframe>,
    scope_index: usize,
    timeframe_index: usize,
}

impl ViewerState {
    pub fn new(projects: &[String]) -> Result<Self, KeyError> {
        let mut scopes = vec![Scope::Global];
        for project in projects {
            scopes.push(Scope::project(project.clone())?);
        }

        Ok(Self {
            scopes,
            timeframes: vec![Timeframe::Week, Timeframe::Month, Timeframe::Year],
            scope_index: 0,
            timeframe_index: 0,
        })
    }

    pub fn scope(&self) -> &Scope {
        &self.scopes[self.scope_index]
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframes[self.timeframe_index]
    }

    /// Moves the selection, clamping at both ends.
    pub fn navigate(&mut self, navigation: Navigation) {
        match navigation {
            Navigation::Left => self.scope_index = self.scope_index.saturating_sub(1),
            Navigation::Right => {
                self.scope_index = (self.scope_index + 1).min(self.scopes.len() - 1)
            }
            Navigation::Up => self.timeframe_index = self.timeframe_index.saturating_sub(1),
            Navigation::Down => {
                self.timeframe_index = (self.timeframe_index + 1).min(self.timeframes.len() - 1)
            }
        }
    }

    pub fn header(&self) -> String {
        format!(
            "Leaderboard - {} / {} (left/right for project, up/down for timeframe, q to quit)",
            self.scope(),
            self.timeframe()
        )
    }
}

/// Renders one frame. A failed read shows a single placeholder row.
pub fn render(state: &ViewerState, ranking: &Result<Vec<RankedEntry>, LeaderboardError>) -> String {
    let mut frame = String::new();
    frame.push_str(&state.header());
    frame.push('\n');
    frame.push_str(&row("Rank", "User", "Score"));

    match ranking {
        Ok(entries) => {
            for entry in entries {
                frame.push_str(&row(
                    &entry.rank.to_string(),
                    &entry.member,
                    &entry.score.to_string(),
                ));
            }
        }
        Err(_) => frame.push_str(&row("Error", "-", "-")),
    }

    frame
}

fn row(rank: &str, user: &str, score: &str) -> String {
    let line = format!(
        "{:<rank_w$}{:<user_w$}{:<score_w$}",
        rank,
        fit(user, USER_WIDTH - 1),
        score,
        rank_w = RANK_WIDTH,
        user_w = USER_WIDTH,
        score_w = SCORE_WIDTH
    );
    format!("{}\n", line.trim_end())
}

/// Cuts `cell` to at most `width` characters, marking the cut with an ellipsis.
fn fit(cell: &str, width: usize) -> String {
    if cell.chars().count() <= width {
        return cell.to_string();
    }
    let mut cut: String = cell.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Runs the viewer until `q` or end of input. Timer ticks and input lines
/// are funneled through one channel, so only one read and render is ever in
/// flight.
#[instrument(skip_all, fields(refresh_ms = config.refresh_interval.as_millis() as u64))]
pub async fn run_viewer<R, W>(
    reader: Arc<LeaderboardReader>,
    config: ViewerConfig,
    input: R,
    output: &mut W,
) -> Result<(), ViewerError>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let mut state = ViewerState::new(&config.projects)?;
    let (tx, mut rx) = mpsc::channel::<ViewerSignal>(16);

    let ticker = tokio::spawn(tick_task(tx.clone(), config.refresh_interval));
    let keys = tokio::spawn(input_task(tx, input));

    info!("Viewer started");

    let result = async {
        while let Some(signal) = rx.recv().await {
            match signal {
                ViewerSignal::Quit => break,
                ViewerSignal::Navigate(navigation) => state.navigate(navigation),
                ViewerSignal::Refresh => {}
            }

            let ranking = reader
                .rank(state.scope(), state.timeframe(), &Utc::now())
                .await;
            output
                .write_all(render(&state, &ranking).as_bytes())
                .await?;
            output.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    }
    .await;

    ticker.abort();
    keys.abort();
    info!("Viewer stopped");

    result.map_err(ViewerError::from)
}

async fn tick_task(tx: mpsc::Sender<ViewerSignal>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        if tx.send(ViewerSignal::Refresh).await.is_err() {
            break;
        }
    }
}

async fn input_task<R>(tx: mpsc::Sender<ViewerSignal>, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let signal = match lines.next_line().await {
            Ok(Some(line)) => match ViewerSignal::parse_input(&line) {
                Some(signal) => signal,
                None => {
                    debug!(input = %line, "Ignoring unknown input");
                    continue;
                }
            },
            // End of input closes the viewer
            Ok(None) | Err(_) => ViewerSignal::Quit,
        };

        let quit = signal == ViewerSignal::Quit;
        if tx.send(signal).await.is_err() || quit {
            break;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("Invalid project list: {0}")]
    Projects(#[from] KeyError),

    #[error("Failed to write frame: {0}")]
    Output(#[from] std::io::Error),
}
