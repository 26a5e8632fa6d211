/////////////////////
/// SUBTIMER - substitution timer and roster for the sideline
///
/// Keeps a roster of players split into "on field" and "bench", and runs a
/// countdown that announces the end of each substitution window.
/// - 'space' starts the countdown, or stops it early
/// - 'r' resets the countdown
/// - 's' substitutes everyone (buddies swap so one of each pair plays)
/// - 'a' adds players: type names separated by commas, two names make buddies
/// - 't' subs the selected player in or out, along with their buddy
/// - 'd' / 'p' cycle the timer length / the position for new players
///
pub const APP_VERSION: &str = "SUBTIMER V0.1.0";
pub const TICK_INTERVAL_MS: u64 = 250;        // Redraw tick interval in millisecs
const CONF_FILE_NAME: &str = "subtimer.ini";
const LOG_FILE_NAME: &str = "subtimer.log";

// UI color thresholds
const COLOR_YELLOW_THRESHOLD: u32 = 30;       // Yellow warning threshold in seconds
const COLOR_RED_THRESHOLD: u32 = 10;          // Red warning threshold in seconds

use std::fs::File;
use std::time::Duration;
#[macro_use] extern crate log;
extern crate simplelog;
use simplelog::*;
#[macro_use]
extern crate ini;

mod config;
mod notify;
mod roster;
mod timer;
mod tui;

use color_eyre::eyre::{eyre, Result};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{prelude::*, widgets::*};
use strum::EnumIs;
use tokio::sync::mpsc::UnboundedSender;
use tui_big_text::BigText;
use build_time::build_time_local;

use crate::config::Settings;
use crate::notify::{Notifier, Permission, TerminalNotifier};
use crate::roster::{AddPlayersForm, Player, PlayerId, Roster};
use crate::timer::{StartOutcome, SubstitutionTimer};
use crate::tui::{Event, Tui};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumIs)]
enum AppMode {
  #[default]
  Normal,
  AddingPlayers,
  AwaitingPermission,
  Quitting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Message {
  StartOrStop,
  Reset,
  SubstituteAll,
  BeginAdd,
  Input(char),
  Backspace,
  SubmitAdd,
  CancelAdd,
  CyclePosition,
  CycleDuration,
  SelectNext,
  SelectPrev,
  ToggleSelected,
  DismissBanner,
  Answer(Permission),
  TimerTick(u64),
  Notified(String),
  Tick,
  Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  init_logging();
  info!("Logging for {} initialized (tick interval: {}ms)", APP_VERSION, TICK_INTERVAL_MS);

  let settings = Settings::load(CONF_FILE_NAME);
  let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
  let notifier = TerminalNotifier::new(settings.permission, settings.bell, settings.notify_command.clone(), event_tx.clone());
  let mut app = SubstitutionApp::new(&settings, notifier, event_tx.clone());

  let mut tui = Tui::new(event_tx, event_rx, Duration::from_millis(TICK_INTERVAL_MS))?;
  app.run(&mut tui).await?;
  drop(tui);
  println!("Thanks for using {} (built: {})\n", APP_VERSION, build_time_local!("%Y-%b-%d at %H:%M:%S"));
  Ok(())
}

fn init_logging() {
  let loggers: Vec<Box<dyn SharedLogger>> = match File::create(LOG_FILE_NAME) {
    Ok(log_file) => vec![
      TermLogger::new(LevelFilter::Warn, Config::default(), TerminalMode::Mixed, ColorChoice::Auto),
      WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ],
    Err(e) => {
      eprintln!("Warning: Could not create log file: {}", e);
      eprintln!("Continuing with terminal logging only.");
      vec![TermLogger::new(LevelFilter::Warn, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)]
    }
  };

  CombinedLogger::init(loggers).unwrap_or_else(|e| {
    eprintln!("Warning: Could not initialize logger: {}", e);
  });
}

#[derive(Debug)]
struct SubstitutionApp<N: Notifier> {
  mode: AppMode,
  roster: Roster,
  form: AddPlayersForm,
  timer: SubstitutionTimer<N>,
  // Index into on-field players followed by bench players.
  selected: usize,
  banner: Option<String>,
}

impl<N: Notifier> SubstitutionApp<N> {
  fn new(settings: &Settings, notifier: N, event_tx: UnboundedSender<Event>) -> Self {
    let mut roster = Roster::new();
    for batch in &settings.players {
      roster.add_players(batch, settings.position);
    }
    info!("Starting with {} players, timer {}, notifications {}",
          roster.len(), settings.duration, notifier.permission());
    Self {
      mode: AppMode::default(),
      roster,
      form: AddPlayersForm::new(settings.position),
      timer: SubstitutionTimer::new(settings.duration, notifier, event_tx),
      selected: 0,
      banner: None,
    }
  }

  async fn run(&mut self, tui: &mut Tui) -> Result<()> {
    tui.enter()?;
    while !self.mode.is_quitting() {
      tui.draw(|f| self.ui(f))?;
      let event = tui.next().await.ok_or(eyre!("Unable to get event"))?; // blocks until next event
      let message = self.handle_event(event)?;
      self.update(message)?;
    }
    tui.exit()?;
    Ok(())
  }

  // Event handler (keyboard, ticks, notifications)
  fn handle_event(&self, event: Event) -> Result<Message> {
    let msg = match event {
      Event::Key(key) => self.handle_key(key),
      Event::TimerTick(run) => Message::TimerTick(run),
      Event::Notification { title, body } => Message::Notified(format!("{}: {}", title, body)),
      Event::Error => {
        warn!("Terminal event stream reported an error");
        Message::Tick
      }
      Event::Tick => Message::Tick,
    };
    Ok(msg)
  }

  fn handle_key(&self, key: KeyEvent) -> Message {
    match self.mode {
      AppMode::AddingPlayers => match key.code {
        KeyCode::Enter => Message::SubmitAdd,
        KeyCode::Esc => Message::CancelAdd,
        KeyCode::Backspace => Message::Backspace,
        KeyCode::Tab => Message::CyclePosition,
        KeyCode::Char(c) => Message::Input(c),
        _ => Message::Tick,
      },
      AppMode::AwaitingPermission => match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => Message::Answer(Permission::Granted),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Message::Answer(Permission::Denied),
        _ => Message::Tick,
      },
      _ => match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Message::Quit,
        KeyCode::Char(' ') | KeyCode::Enter => Message::StartOrStop,
        KeyCode::Char('r') | KeyCode::Char('R') => Message::Reset,
        KeyCode::Char('s') | KeyCode::Char('S') => Message::SubstituteAll,
        KeyCode::Char('a') | KeyCode::Char('A') => Message::BeginAdd,
        KeyCode::Char('p') | KeyCode::Char('P') => Message::CyclePosition,
        KeyCode::Char('d') | KeyCode::Char('D') => Message::CycleDuration,
        KeyCode::Char('t') | KeyCode::Char('T') => Message::ToggleSelected,
        KeyCode::Char('x') | KeyCode::Char('X') => Message::DismissBanner,
        KeyCode::Down | KeyCode::Char('j') => Message::SelectNext,
        KeyCode::Up | KeyCode::Char('k') => Message::SelectPrev,
        _ => Message::Tick,
      },
    }
  }

  fn update(&mut self, message: Message) -> Result<()> {
    match message {
      Message::StartOrStop => self.start_or_stop(),
      Message::Reset => self.timer.reset(),
      Message::SubstituteAll => self.roster.substitute_all(),
      Message::BeginAdd => self.mode = AppMode::AddingPlayers,
      Message::Input(c) => self.form.names.push(c),
      Message::Backspace => { self.form.names.pop(); },
      Message::SubmitAdd => self.submit_add(),
      Message::CancelAdd => self.mode = AppMode::Normal,
      Message::CyclePosition => self.form.position = self.form.position.next(),
      Message::CycleDuration => { self.timer.set_duration(self.timer.duration().next()); },
      Message::SelectNext => self.select_next(),
      Message::SelectPrev => self.selected = self.selected.saturating_sub(1),
      Message::ToggleSelected => self.toggle_selected(),
      Message::DismissBanner => self.banner = None,
      Message::Answer(permission) => self.answer_permission(permission),
      Message::TimerTick(run) => self.timer.on_tick(run),
      Message::Notified(text) => self.banner = Some(text),
      Message::Tick => {},
      Message::Quit => self.quit(),
    }
    Ok(())
  }

  fn start_or_stop(&mut self) {
    if self.timer.is_running() {
      self.timer.stop();
      return;
    }
    if self.timer.request_start() == StartOutcome::NeedsPermission {
      info!("Asking for notification permission before starting");
      self.mode = AppMode::AwaitingPermission;
    }
  }

  fn answer_permission(&mut self, permission: Permission) {
    self.mode = AppMode::Normal;
    let outcome = self.timer.resolve_permission(permission);
    info!("Permission answer {} -> {:?}", permission, outcome);
  }

  fn submit_add(&mut self) {
    let added = self.form.submit(&mut self.roster);
    if added.is_empty() {
      info!("Nothing to add");
    }
    self.mode = AppMode::Normal;
  }

  fn display_order(&self) -> impl Iterator<Item = &Player> {
    self.roster.on_field().chain(self.roster.bench())
  }

  fn selected_player(&self) -> Option<PlayerId> {
    self.display_order().nth(self.selected).map(|p| p.id)
  }

  fn select_next(&mut self) {
    if self.selected + 1 < self.roster.len() {
      self.selected += 1;
    }
  }

  // Keep the cursor on the same player after it changes column.
  fn toggle_selected(&mut self) {
    let Some(id) = self.selected_player() else { return };
    self.roster.toggle_player(id);
    let moved_to = self.display_order().position(|p| p.id == id);
    if let Some(idx) = moved_to {
      self.selected = idx;
    }
  }

  fn quit(&mut self) {
    self.mode = AppMode::Quitting;
  }

  fn ui(&self, f: &mut Frame) {
    let layout = self.layout(f.size());
    f.render_widget(self.title_paragraph(), layout[0]);
    f.render_widget(self.timer_paragraph(), layout[1]);
    f.render_widget(self.status_paragraph(), layout[2]);
    self.render_roster(f, layout[3]);
    f.render_widget(self.input_paragraph(), layout[4]);
    f.render_widget(self.help_paragraph(), layout[5]);
  }

  fn layout(&self, area: Rect) -> Vec<Rect> {
    let layout = Layout::default()
      .direction(Direction::Vertical)
      .constraints(vec![
        Constraint::Length(2), // top bar
        Constraint::Length(9), // timer
        Constraint::Length(2), // duration, permission, banner
        Constraint::Min(5),    // on field / bench
        Constraint::Length(3), // add players
        Constraint::Length(2), // help
      ])
      .split(area);

    layout.to_vec()
  }

  fn title_paragraph(&self) -> Paragraph<'_> {
    let title_text =
      Line::from(vec![APP_VERSION.into(), " - S".into(), "ubstitution".dim(), " TIMER".into()]);
    Paragraph::new(title_text).gray()
  }

  fn timer_paragraph(&self) -> BigText<'_> {
    let mut style = Style::new().gray();
    if self.timer.is_running() {
      let left = self.timer.remaining_seconds();
      if left > COLOR_YELLOW_THRESHOLD {
        style = Style::new().green();
      } else if left > COLOR_RED_THRESHOLD {
        style = Style::new().yellow();
      } else {
        style = Style::new().red();
      }
    }
    let lines = vec![self.timer.format_remaining().into()];
    tui_big_text::BigTextBuilder::default()
      .lines(lines)
      .style(style)
      .build()
      .unwrap()
  }

  fn status_paragraph(&self) -> Paragraph<'_> {
    let mut lines = vec![Line::from(vec![
      "Timer ".into(), Span::styled(self.timer.duration().to_string(), Style::new().bold()),
      " : notifications ".into(), Span::styled(self.timer.permission().to_string(), Style::new().dim()),
    ])];
    if self.mode.is_awaiting_permission() {
      lines.push(Line::from("Allow notifications? (y/n)".yellow().bold()));
    } else if let Some(banner) = &self.banner {
      lines.push(Line::from(vec![banner.as_str().blue().bold(), "  (x to dismiss)".dim()]));
    }
    Paragraph::new(lines)
  }

  fn render_roster(&self, f: &mut Frame, area: Rect) {
    let columns = Layout::default()
      .direction(Direction::Horizontal)
      .constraints(vec![Constraint::Percentage(50), Constraint::Percentage(50)])
      .split(area);

    let field: Vec<ListItem> = self.roster.on_field().map(|p| ListItem::new(player_label(&self.roster, p))).collect();
    let bench: Vec<ListItem> = self.roster.bench().map(|p| ListItem::new(player_label(&self.roster, p))).collect();
    let field_count = field.len();

    let mut field_state = ListState::default();
    let mut bench_state = ListState::default();
    if !self.roster.is_empty() && !self.mode.is_adding_players() {
      if self.selected < field_count {
        field_state.select(Some(self.selected));
      } else {
        bench_state.select(Some(self.selected - field_count));
      }
    }

    let highlight = Style::new().reversed();
    let field_list = List::new(field)
      .block(Block::default().borders(Borders::ALL).title("On Field"))
      .highlight_style(highlight)
      .style(Style::new().green());
    let bench_list = List::new(bench)
      .block(Block::default().borders(Borders::ALL).title("Bench"))
      .highlight_style(highlight)
      .style(Style::new().gray());
    f.render_stateful_widget(field_list, columns[0], &mut field_state);
    f.render_stateful_widget(bench_list, columns[1], &mut bench_state);
  }

  fn input_paragraph(&self) -> Paragraph<'_> {
    let title = format!("Add Players ({})", self.form.position);
    let mut text = Line::from(self.form.names.as_str());
    if self.mode.is_adding_players() {
      text.spans.push("_".slow_blink());
    } else if self.form.names.is_empty() {
      text = Line::from("Enter player names (comma-separated)".dim());
    }
    Paragraph::new(text).block(Block::default().borders(Borders::ALL).title(title))
  }

  fn help_paragraph(&self) -> Paragraph<'_> {
    let help_text = match self.mode {
      AppMode::AddingPlayers => Line::from(vec![
        "enter ".into(), "add".dim(), " : tab ".into(), "position".dim(), " : esc ".into(), "cancel".dim()]),
      AppMode::AwaitingPermission => Line::from(vec![
        "y ".into(), "allow".dim(), " : n ".into(), "deny".dim()]),
      _ => {
        let space_action = if self.timer.is_running() { "stop" } else { "start" };
        let toggle_action = match self.selected_player().and_then(|id| self.roster.get(id)) {
          Some(p) if p.on_field => "sub out",
          _ => "sub in",
        };
        Line::from(vec!["space ".into(), space_action.dim(), " : r ".into(), "reset".dim(),
          " : s ".into(), "substitute all".dim(), " : a ".into(), "add".dim(),
          " : t ".into(), toggle_action.dim(), " : d ".into(), "duration".dim(),
          " : p ".into(), "position".dim(), " : q ".into(), "quit".dim()])
      }
    };
    Paragraph::new(help_text).gray()
  }
}

/// `"{name} - {position}"`, plus the buddy's name when there is one.
fn player_label(roster: &Roster, player: &Player) -> String {
  match roster.buddy_name(player) {
    Some(buddy) => format!("{} - {} (Buddy: {})", player.name, player.position, buddy),
    None => format!("{} - {}", player.name, player.position),
  }
}
