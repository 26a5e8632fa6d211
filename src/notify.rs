//! Host notification capability: permission state plus a one-shot "timer ended" message.
use std::io::Write;

use color_eyre::eyre::{eyre, Result};
use strum::{Display, EnumIs, EnumString};
use tokio::sync::mpsc::UnboundedSender;

use crate::tui::Event;

pub const NOTIFICATION_TITLE: &str = "Substitution Timer";
pub const NOTIFICATION_BODY: &str = "The substitution timer has ended!";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIs)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Permission {
  Granted,
  Denied,
  /// Not decided yet; the user is asked on the first start.
  #[default]
  Default,
}

pub trait Notifier {
  fn permission(&self) -> Permission;

  /// Record the answer to a permission request.
  fn set_permission(&mut self, permission: Permission);

  /// Show a notification. Does nothing unless permission is granted.
  fn show_notification(&mut self, title: &str, body: &str) -> Result<()>;
}

/// Notifies inside the terminal: a banner event for the UI, an optional bell,
/// and an optional external command (e.g. `notify-send`) for the desktop.
#[derive(Debug)]
pub struct TerminalNotifier {
  permission: Permission,
  bell: bool,
  command: Option<String>,
  event_tx: UnboundedSender<Event>,
}

impl TerminalNotifier {
  pub fn new(permission: Permission, bell: bool, command: Option<String>, event_tx: UnboundedSender<Event>) -> Self {
    Self { permission, bell, command, event_tx }
  }

  fn ring_bell(&self) {
    let mut stderr = std::io::stderr();
    if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
      warn!("Could not ring terminal bell: {}", e);
    }
  }

  fn run_command(&self, program: &str, title: &str, body: &str) -> Result<()> {
    tokio::process::Command::new(program)
      .arg(title)
      .arg(body)
      .stdin(std::process::Stdio::null())
      .stdout(std::process::Stdio::null())
      .stderr(std::process::Stdio::null())
      .spawn()
      .map_err(|e| eyre!("Unable to run notify command '{}': {}", program, e))?;
    Ok(())
  }
}

impl Notifier for TerminalNotifier {
  fn permission(&self) -> Permission {
    self.permission
  }

  fn set_permission(&mut self, permission: Permission) {
    info!("Notification permission now {}", permission);
    self.permission = permission;
  }

  fn show_notification(&mut self, title: &str, body: &str) -> Result<()> {
    if !self.permission.is_granted() {
      info!("Notification '{}' not shown (permission {})", title, self.permission);
      return Ok(());
    }

    if self.bell {
      self.ring_bell();
    }
    self.event_tx
      .send(Event::Notification { title: title.to_string(), body: body.to_string() })
      .map_err(|e| eyre!("Failed to send notification event: {}", e))?;
    if let Some(program) = &self.command {
      self.run_command(program, title, body)?;
    }
    Ok(())
  }
}

/// Test double that remembers every notification it was asked to show.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
  pub permission: Permission,
  pub shown: Vec<(String, String)>,
}

#[cfg(test)]
impl RecordingNotifier {
  pub fn granted() -> Self {
    Self { permission: Permission::Granted, shown: Vec::new() }
  }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
  fn permission(&self) -> Permission {
    self.permission
  }

  fn set_permission(&mut self, permission: Permission) {
    self.permission = permission;
  }

  fn show_notification(&mut self, title: &str, body: &str) -> Result<()> {
    if self.permission.is_granted() {
      self.shown.push((title.to_string(), body.to_string()));
    }
    Ok(())
  }
}
