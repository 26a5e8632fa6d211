//! Substitution countdown: a whole-minute timer ticking once per second.
use std::fmt;
use std::time::Duration;

use strum::{EnumIs, EnumIter};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::notify::{Notifier, Permission, NOTIFICATION_BODY, NOTIFICATION_TITLE};
use crate::tui::Event;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum TimerDuration {
  #[default]
  Two,
  Three,
  Four,
  Five,
}

impl TimerDuration {
  pub fn minutes(self) -> u32 {
    match self {
      TimerDuration::Two => 2,
      TimerDuration::Three => 3,
      TimerDuration::Four => 4,
      TimerDuration::Five => 5,
    }
  }

  pub fn from_minutes(minutes: u32) -> Option<Self> {
    match minutes {
      2 => Some(TimerDuration::Two),
      3 => Some(TimerDuration::Three),
      4 => Some(TimerDuration::Four),
      5 => Some(TimerDuration::Five),
      _ => None,
    }
  }

  pub fn next(self) -> Self {
    match self {
      TimerDuration::Two => TimerDuration::Three,
      TimerDuration::Three => TimerDuration::Four,
      TimerDuration::Four => TimerDuration::Five,
      TimerDuration::Five => TimerDuration::Two,
    }
  }

  pub fn total_seconds(self) -> u32 {
    self.minutes() * 60
  }
}

impl fmt::Display for TimerDuration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} minutes", self.minutes())
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumIs)]
pub enum TimerPhase {
  #[default]
  Idle,
  Running,
  /// Ran down to zero on its own.
  Expired,
}

/// Render seconds as `m:ss`.
pub fn format_time(seconds: u32) -> String {
  format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// The countdown state machine, without any scheduling.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
  duration: TimerDuration,
  remaining_seconds: u32,
  phase: TimerPhase,
}

impl Countdown {
  pub fn new(duration: TimerDuration) -> Self {
    Self { duration, remaining_seconds: 0, phase: TimerPhase::Idle }
  }

  /// Returns `false` if already running.
  pub fn start(&mut self) -> bool {
    if self.phase.is_running() {
      return false;
    }
    self.remaining_seconds = self.duration.total_seconds();
    self.phase = TimerPhase::Running;
    true
  }

  /// One second passes. Returns `true` when this tick ends the countdown.
  pub fn tick(&mut self) -> bool {
    if !self.phase.is_running() {
      return false;
    }
    if self.remaining_seconds <= 1 {
      self.remaining_seconds = 0;
      self.phase = TimerPhase::Expired;
      return true;
    }
    self.remaining_seconds -= 1;
    false
  }

  pub fn stop(&mut self) {
    self.remaining_seconds = 0;
    self.phase = TimerPhase::Idle;
  }

  /// Returns `false` (and changes nothing) while running.
  pub fn set_duration(&mut self, duration: TimerDuration) -> bool {
    if self.phase.is_running() {
      return false;
    }
    self.duration = duration;
    true
  }

  pub fn duration(&self) -> TimerDuration {
    self.duration
  }

  pub fn remaining_seconds(&self) -> u32 {
    self.remaining_seconds
  }

  pub fn phase(&self) -> TimerPhase {
    self.phase
  }

  pub fn is_running(&self) -> bool {
    self.phase.is_running()
  }
}

/// Background task sending `Event::TimerTick` once per second.
#[derive(Debug)]
struct TickTask {
  cancellation_token: CancellationToken,
  task: tokio::task::JoinHandle<()>,
}

impl TickTask {
  fn spawn(generation: u64, event_tx: UnboundedSender<Event>) -> Self {
    let cancellation_token = CancellationToken::new();
    let _cancellation_token = cancellation_token.clone();
    let task = tokio::spawn(async move {
      let mut interval = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        tokio::select! {
          _ = _cancellation_token.cancelled() => {
            break;
          }
          _ = interval.tick() => {
            if let Err(e) = event_tx.send(Event::TimerTick(generation)) {
              log::error!("Failed to send timer tick: {}", e);
              break;
            }
          }
        }
      }
    });
    Self { cancellation_token, task }
  }

  fn cancel(self) {
    self.cancellation_token.cancel();
    self.task.abort();
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
  Started,
  AlreadyRunning,
  /// Permission is undecided; ask, then call `resolve_permission`.
  NeedsPermission,
  Denied,
}

/// Countdown plus the tick task driving it and the notifier it reports to.
///
/// Each start gets a new generation; ticks carrying any other generation are
/// dropped, so a tick queued before a stop can never touch the next state.
#[derive(Debug)]
pub struct SubstitutionTimer<N: Notifier> {
  countdown: Countdown,
  notifier: N,
  event_tx: UnboundedSender<Event>,
  generation: u64,
  tick_task: Option<TickTask>,
}

impl<N: Notifier> SubstitutionTimer<N> {
  pub fn new(duration: TimerDuration, notifier: N, event_tx: UnboundedSender<Event>) -> Self {
    Self {
      countdown: Countdown::new(duration),
      notifier,
      event_tx,
      generation: 0,
      tick_task: None,
    }
  }

  /// Start counting down if notifications are permitted.
  pub fn request_start(&mut self) -> StartOutcome {
    if self.countdown.is_running() {
      warn!("Start ignored, timer already running ({}s left)", self.countdown.remaining_seconds());
      return StartOutcome::AlreadyRunning;
    }
    match self.notifier.permission() {
      Permission::Granted => {
        self.begin();
        StartOutcome::Started
      }
      Permission::Denied => {
        info!("Start ignored, notification permission denied");
        StartOutcome::Denied
      }
      Permission::Default => StartOutcome::NeedsPermission,
    }
  }

  /// Store the answer to a permission request made at start time, and start if granted.
  pub fn resolve_permission(&mut self, permission: Permission) -> StartOutcome {
    self.notifier.set_permission(permission);
    match permission {
      Permission::Default => StartOutcome::NeedsPermission,
      _ => self.request_start(),
    }
  }

  fn begin(&mut self) {
    self.cancel_ticks();
    self.countdown.start();
    self.generation += 1;
    self.tick_task = Some(TickTask::spawn(self.generation, self.event_tx.clone()));
    info!("Timer started: {} (run {})", self.countdown.duration(), self.generation);
  }

  pub fn on_tick(&mut self, generation: u64) {
    if generation != self.generation || !self.countdown.is_running() {
      debug!("Dropping stale tick from run {}", generation);
      return;
    }
    if self.countdown.tick() {
      self.cancel_ticks();
      info!("Timer expired");
      self.complete();
    }
  }

  /// Stop early. This announces the end just like running out does.
  pub fn stop(&mut self) {
    self.cancel_ticks();
    self.countdown.stop();
    info!("Timer stopped");
    self.complete();
  }

  pub fn reset(&mut self) {
    self.stop();
  }

  /// Returns `false` while running; the duration is only changed when idle.
  pub fn set_duration(&mut self, duration: TimerDuration) -> bool {
    if !self.countdown.set_duration(duration) {
      warn!("Duration change to {} ignored while running", duration);
      return false;
    }
    info!("Timer duration set to {}", duration);
    true
  }

  fn cancel_ticks(&mut self) {
    if let Some(task) = self.tick_task.take() {
      task.cancel();
    }
  }

  fn complete(&mut self) {
    if let Err(e) = self.notifier.show_notification(NOTIFICATION_TITLE, NOTIFICATION_BODY) {
      warn!("Timer notification failed: {}", e);
    }
  }

  pub fn remaining_seconds(&self) -> u32 {
    self.countdown.remaining_seconds()
  }

  pub fn is_running(&self) -> bool {
    self.countdown.is_running()
  }

  pub fn phase(&self) -> TimerPhase {
    self.countdown.phase()
  }

  pub fn duration(&self) -> TimerDuration {
    self.countdown.duration()
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn permission(&self) -> Permission {
    self.notifier.permission()
  }

  pub fn notifier(&self) -> &N {
    &self.notifier
  }

  pub fn format_remaining(&self) -> String {
    format_time(self.countdown.remaining_seconds())
  }
}

impl<N: Notifier> Drop for SubstitutionTimer<N> {
  fn drop(&mut self) {
    self.cancel_ticks();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::notify::RecordingNotifier;
  use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

  fn timer(notifier: RecordingNotifier) -> (SubstitutionTimer<RecordingNotifier>, UnboundedReceiver<Event>) {
    let (tx, rx) = unbounded_channel();
    (SubstitutionTimer::new(TimerDuration::Two, notifier, tx), rx)
  }

  #[test]
  fn test_format_time() {
    assert_eq!(format_time(65), "1:05");
    assert_eq!(format_time(5), "0:05");
    assert_eq!(format_time(600), "10:00");
    assert_eq!(format_time(125), "2:05");
    assert_eq!(format_time(0), "0:00");
  }

  #[test]
  fn test_duration_minutes() {
    assert_eq!(TimerDuration::from_minutes(4), Some(TimerDuration::Four));
    assert_eq!(TimerDuration::from_minutes(1), None);
    assert_eq!(TimerDuration::from_minutes(6), None);
    assert_eq!(TimerDuration::Five.next(), TimerDuration::Two);
    assert_eq!(TimerDuration::Three.total_seconds(), 180);
    assert_eq!(TimerDuration::Two.to_string(), "2 minutes");
  }

  #[test]
  fn test_countdown_runs_out() {
    let mut countdown = Countdown::new(TimerDuration::Two);
    assert!(countdown.start());
    assert_eq!(countdown.remaining_seconds(), 120);
    for _ in 0..119 {
      assert!(!countdown.tick());
    }
    assert_eq!(countdown.remaining_seconds(), 1);
    assert!(countdown.tick());
    assert_eq!(countdown.remaining_seconds(), 0);
    assert_eq!(countdown.phase(), TimerPhase::Expired);
    assert!(!countdown.tick());
  }

  #[test]
  fn test_countdown_restarts_after_expiry() {
    let mut countdown = Countdown::new(TimerDuration::Two);
    countdown.start();
    while !countdown.tick() {}
    assert!(countdown.start());
    assert_eq!(countdown.remaining_seconds(), 120);
  }

  #[tokio::test(start_paused = true)]
  async fn test_start_with_permission() {
    let (mut timer, _rx) = timer(RecordingNotifier::granted());
    assert_eq!(timer.request_start(), StartOutcome::Started);
    assert_eq!(timer.remaining_seconds(), 120);
    assert!(timer.is_running());
  }

  #[tokio::test(start_paused = true)]
  async fn test_full_run_notifies_once() {
    let (mut timer, _rx) = timer(RecordingNotifier::granted());
    timer.request_start();
    let run = timer.generation();
    for _ in 0..120 {
      timer.on_tick(run);
    }
    assert!(!timer.is_running());
    assert_eq!(timer.remaining_seconds(), 0);
    assert_eq!(timer.phase(), TimerPhase::Expired);
    assert_eq!(timer.notifier().shown.len(), 1);
    assert_eq!(timer.notifier().shown[0].0, NOTIFICATION_TITLE);
    assert_eq!(timer.notifier().shown[0].1, NOTIFICATION_BODY);

    timer.on_tick(run);
    assert_eq!(timer.notifier().shown.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_manual_stop_notifies() {
    let (mut timer, _rx) = timer(RecordingNotifier::granted());
    timer.request_start();
    let run = timer.generation();
    for _ in 0..30 {
      timer.on_tick(run);
    }
    assert_eq!(timer.remaining_seconds(), 90);
    timer.stop();
    assert_eq!(timer.remaining_seconds(), 0);
    assert!(!timer.is_running());
    assert_eq!(timer.phase(), TimerPhase::Idle);
    assert_eq!(timer.notifier().shown.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reset_is_idempotent() {
    let (mut timer, _rx) = timer(RecordingNotifier::granted());
    timer.reset();
    timer.reset();
    assert_eq!(timer.remaining_seconds(), 0);
    assert_eq!(timer.phase(), TimerPhase::Idle);
    assert_eq!(timer.notifier().shown.len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_denied_permission_does_not_start() {
    let mut notifier = RecordingNotifier::default();
    notifier.permission = Permission::Denied;
    let (mut timer, _rx) = timer(notifier);
    assert_eq!(timer.request_start(), StartOutcome::Denied);
    assert!(!timer.is_running());
    assert_eq!(timer.remaining_seconds(), 0);
    assert_eq!(timer.generation(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_permission_requested_on_start() {
    let (mut timer, _rx) = timer(RecordingNotifier::default());
    assert_eq!(timer.request_start(), StartOutcome::NeedsPermission);
    assert!(!timer.is_running());

    assert_eq!(timer.resolve_permission(Permission::Granted), StartOutcome::Started);
    assert!(timer.is_running());
    assert_eq!(timer.permission(), Permission::Granted);
  }

  #[tokio::test(start_paused = true)]
  async fn test_permission_refused_on_start() {
    let (mut timer, _rx) = timer(RecordingNotifier::default());
    timer.request_start();
    assert_eq!(timer.resolve_permission(Permission::Denied), StartOutcome::Denied);
    assert!(!timer.is_running());
    assert_eq!(timer.remaining_seconds(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_start_while_running_rejected() {
    let (mut timer, _rx) = timer(RecordingNotifier::granted());
    timer.request_start();
    let run = timer.generation();
    timer.on_tick(run);
    assert_eq!(timer.request_start(), StartOutcome::AlreadyRunning);
    assert_eq!(timer.remaining_seconds(), 119);
    assert_eq!(timer.generation(), run);
  }

  #[tokio::test(start_paused = true)]
  async fn test_duration_locked_while_running() {
    let (mut timer, _rx) = timer(RecordingNotifier::granted());
    assert!(timer.set_duration(TimerDuration::Three));
    timer.request_start();
    assert_eq!(timer.remaining_seconds(), 180);
    assert!(!timer.set_duration(TimerDuration::Five));
    assert_eq!(timer.duration(), TimerDuration::Three);
    timer.stop();
    assert!(timer.set_duration(TimerDuration::Five));
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_tick_ignored() {
    let (mut timer, _rx) = timer(RecordingNotifier::granted());
    timer.request_start();
    let first_run = timer.generation();
    timer.stop();
    timer.request_start();
    timer.on_tick(first_run);
    assert_eq!(timer.remaining_seconds(), 120);
    timer.on_tick(timer.generation());
    assert_eq!(timer.remaining_seconds(), 119);
  }

  #[tokio::test(start_paused = true)]
  async fn test_tick_task_sends_every_second() {
    let (mut timer, mut rx) = timer(RecordingNotifier::granted());
    let started = Instant::now();
    timer.request_start();
    for expected in 1..=3u64 {
      match rx.recv().await {
        Some(Event::TimerTick(run)) => {
          assert_eq!(run, timer.generation());
          timer.on_tick(run);
        }
        other => panic!("unexpected event {:?}", other),
      }
      assert_eq!(started.elapsed().as_secs(), expected);
    }
    assert_eq!(timer.remaining_seconds(), 117);
  }

  #[tokio::test(start_paused = true)]
  async fn test_no_ticks_after_stop() {
    let (mut timer, mut rx) = timer(RecordingNotifier::granted());
    timer.request_start();
    assert!(matches!(rx.recv().await, Some(Event::TimerTick(_))));
    timer.stop();
    let next = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
    assert!(next.is_err(), "tick task should be cancelled");
  }
}
