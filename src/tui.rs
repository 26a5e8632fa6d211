//! Terminal setup plus the background task turning key presses and redraw ticks into events.
use std::time::Duration;

use color_eyre::eyre::Result;
use crossterm::event::{EventStream, KeyEvent, KeyEventKind};
use futures::{FutureExt, StreamExt};
use ratatui::backend::CrosstermBackend as Backend;
use ratatui::Terminal;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub enum Event {
  Error,
  /// Redraw tick.
  Tick,
  Key(KeyEvent),
  /// One second of the substitution countdown, tagged with the run it belongs to.
  TimerTick(u64),
  Notification { title: String, body: String },
}

/// Owns the terminal and the one task reading it. Other producers (the
/// substitution timer, the notifier) send into the same channel, so `next`
/// sees every event in arrival order.
pub struct Tui {
  terminal: Terminal<Backend<std::io::Stderr>>,
  event_rx: UnboundedReceiver<Event>,
  event_tx: UnboundedSender<Event>,
  tick_interval: Duration,
  reader: Option<(CancellationToken, tokio::task::JoinHandle<()>)>,
}

impl Tui {
  pub fn new(event_tx: UnboundedSender<Event>, event_rx: UnboundedReceiver<Event>, tick_interval: Duration) -> Result<Tui> {
    let mut terminal = ratatui::Terminal::new(Backend::new(std::io::stderr()))?;
    terminal.clear()?;
    Ok(Self { terminal, event_rx, event_tx, tick_interval, reader: None })
  }

  pub async fn next(&mut self) -> Option<Event> {
    self.event_rx.recv().await
  }

  pub fn enter(&mut self) -> Result<()> {
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(std::io::stderr(), crossterm::terminal::EnterAlternateScreen, crossterm::cursor::Hide)?;
    self.stop_reader();
    let token = CancellationToken::new();
    let task = tokio::spawn(forward_terminal_events(token.clone(), self.event_tx.clone(), self.tick_interval));
    self.reader = Some((token, task));
    Ok(())
  }

  /// Restore the terminal. Does nothing the second time.
  pub fn exit(&mut self) -> Result<()> {
    self.stop_reader();
    if crossterm::terminal::is_raw_mode_enabled()? {
      crossterm::execute!(std::io::stderr(), crossterm::terminal::LeaveAlternateScreen, crossterm::cursor::Show)?;
      crossterm::terminal::disable_raw_mode()?;
    }
    Ok(())
  }

  fn stop_reader(&mut self) {
    if let Some((token, task)) = self.reader.take() {
      token.cancel();
      task.abort();
    }
  }
}

/// Forward key presses and a redraw tick until cancelled or the app stops listening.
async fn forward_terminal_events(token: CancellationToken, event_tx: UnboundedSender<Event>, tick_interval: Duration) {
  let mut reader = EventStream::new();
  let mut redraw = tokio::time::interval(tick_interval);
  loop {
    let event = tokio::select! {
      _ = token.cancelled() => break,
      maybe_event = reader.next().fuse() => match maybe_event {
        Some(Ok(crossterm::event::Event::Key(key))) if key.kind == KeyEventKind::Press => Event::Key(key),
        Some(Ok(_)) => continue,
        Some(Err(e)) => {
          warn!("Terminal event error: {}", e);
          Event::Error
        }
        None => break,
      },
      _ = redraw.tick() => Event::Tick,
    };
    if let Err(e) = event_tx.send(event) {
      log::error!("Failed to send terminal event: {}", e);
      break;
    }
  }
}

impl std::ops::Deref for Tui {
  type Target = ratatui::Terminal<Backend<std::io::Stderr>>;

  fn deref(&self) -> &Self::Target {
    &self.terminal
  }
}

impl std::ops::DerefMut for Tui {
  fn deref_mut(&mut self) -> &mut Self::Target {
    &mut self.terminal
  }
}

impl Drop for Tui {
  fn drop(&mut self) {
    if let Err(e) = self.exit() {
      eprintln!("Error during cleanup: {}", e);
    }
  }
}
