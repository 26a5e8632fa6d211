//! `subtimer.ini` loading. Anything missing or invalid falls back to its default.
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use strum::IntoEnumIterator;

use crate::notify::Permission;
use crate::roster::Position;
use crate::timer::TimerDuration;

pub const CONF_SECTION: &str = "subtimer";
pub const PLAYER_BATCH_SEPARATOR: char = '|';

pub type IniMap = HashMap<String, HashMap<String, Option<String>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  pub duration: TimerDuration,
  pub position: Position,
  pub permission: Permission,
  pub bell: bool,
  pub notify_command: Option<String>,
  /// Initial roster batches, each added like one line of input.
  pub players: Vec<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      duration: TimerDuration::default(),
      position: Position::default(),
      permission: Permission::default(),
      bell: true,
      notify_command: None,
      players: Vec::new(),
    }
  }
}

fn config_warning(config_name: &str, value: &str, expected: &str, default: impl Display) {
  warn!("Config value '{}' = '{}' is invalid (expected {}), using default {}",
        config_name, value, expected, default);
  eprintln!("Warning: Invalid {} value '{}', using default {}", config_name, value, default);
}

/// Parse the timer length in whole minutes.
pub fn parse_duration_config(value: &str, default: TimerDuration) -> TimerDuration {
  match value.trim().parse::<u32>().ok().and_then(TimerDuration::from_minutes) {
    Some(duration) => duration,
    None => {
      let expected: Vec<String> = TimerDuration::iter().map(|d| d.minutes().to_string()).collect();
      config_warning("duration", value, &format!("one of {}", expected.join(", ")), default);
      default
    }
  }
}

pub fn parse_position_config(value: &str, default: Position) -> Position {
  match Position::from_str(value.trim()) {
    Ok(position) => position,
    Err(_) => {
      let expected: Vec<String> = Position::iter().map(|p| p.to_string()).collect();
      config_warning("position", value, &format!("one of {}", expected.join(", ")), default);
      default
    }
  }
}

pub fn parse_permission_config(value: &str, default: Permission) -> Permission {
  match Permission::from_str(value.trim()) {
    Ok(permission) => permission,
    Err(_) => {
      config_warning("notifications", value, "granted, denied or default", default);
      default
    }
  }
}

pub fn parse_bool_config(value: &str, config_name: &str, default: bool) -> bool {
  match value.trim().to_ascii_lowercase().as_str() {
    "true" | "yes" | "on" | "1" => true,
    "false" | "no" | "off" | "0" => false,
    _ => {
      config_warning(config_name, value, "true or false", default);
      default
    }
  }
}

/// Split `players` into batches on `|`, dropping blank ones.
/// (`;` and `#` start comments in ini values, so they can't separate batches.)
pub fn parse_players_config(value: &str) -> Vec<String> {
  value.split(PLAYER_BATCH_SEPARATOR)
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .collect()
}

impl Settings {
  pub fn from_ini(inimap: &IniMap) -> Self {
    let mut settings = Settings::default();
    let Some(section) = inimap.get(CONF_SECTION) else {
      info!("No [{}] section, using default configuration", CONF_SECTION);
      return settings;
    };
    let get = |key: &str| section.get(key).and_then(|v| v.as_deref());

    if let Some(val) = get("duration") {
      info!("Found duration config: {}", val);
      settings.duration = parse_duration_config(val, settings.duration);
    }
    if let Some(val) = get("position") {
      info!("Found position config: {}", val);
      settings.position = parse_position_config(val, settings.position);
    }
    if let Some(val) = get("notifications") {
      info!("Found notifications config: {}", val);
      settings.permission = parse_permission_config(val, settings.permission);
    }
    if let Some(val) = get("bell") {
      settings.bell = parse_bool_config(val, "bell", settings.bell);
    }
    if let Some(val) = get("notify_command") {
      let val = val.trim();
      if !val.is_empty() {
        info!("Found notify_command config: {}", val);
        settings.notify_command = Some(val.to_string());
      }
    }
    if let Some(val) = get("players") {
      settings.players = parse_players_config(val);
      info!("Loaded {} player batches", settings.players.len());
    }
    settings
  }

  /// Read `path`, or use defaults when it can't be read.
  pub fn load(path: &str) -> Self {
    info!("Reading config from {}", path);
    let inimap: IniMap = match ini!(safe path) {
      Ok(map) => map,
      Err(error) => {
        eprintln!("Warning: Couldn't load config file '{}': {}", path, error);
        eprintln!("Continuing with default values.");
        info!("Using default configuration");
        HashMap::new()
      }
    };

    for (key, value) in &inimap {
      info!("{} / {:?}", key, value);
    }
    Settings::from_ini(&inimap)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ini_with(pairs: &[(&str, &str)]) -> IniMap {
    let section = pairs.iter()
      .map(|(k, v)| (k.to_string(), Some(v.to_string())))
      .collect();
    let mut map = HashMap::new();
    map.insert(CONF_SECTION.to_string(), section);
    map
  }

  #[test]
  fn test_defaults_without_section() {
    assert_eq!(Settings::from_ini(&HashMap::new()), Settings::default());
  }

  #[test]
  fn test_full_section() {
    let map = ini_with(&[
      ("duration", "4"),
      ("position", "middle"),
      ("notifications", "granted"),
      ("bell", "off"),
      ("notify_command", "notify-send"),
      ("players", "Ann, Bo | Cy |  |Di, Ed, Fi"),
    ]);
    let settings = Settings::from_ini(&map);
    assert_eq!(settings.duration, TimerDuration::Four);
    assert_eq!(settings.position, Position::Middle);
    assert_eq!(settings.permission, Permission::Granted);
    assert!(!settings.bell);
    assert_eq!(settings.notify_command.as_deref(), Some("notify-send"));
    assert_eq!(settings.players, vec!["Ann, Bo", "Cy", "Di, Ed, Fi"]);
  }

  #[test]
  fn test_invalid_values_use_defaults() {
    let map = ini_with(&[
      ("duration", "7"),
      ("position", "Goalie"),
      ("notifications", "sometimes"),
      ("bell", "loud"),
      ("notify_command", "   "),
    ]);
    assert_eq!(Settings::from_ini(&map), Settings::default());
  }

  #[test]
  fn test_parse_duration_config() {
    assert_eq!(parse_duration_config("2", TimerDuration::Five), TimerDuration::Two);
    assert_eq!(parse_duration_config(" 5 ", TimerDuration::Two), TimerDuration::Five);
    assert_eq!(parse_duration_config("1", TimerDuration::Three), TimerDuration::Three);
    assert_eq!(parse_duration_config("2.5", TimerDuration::Three), TimerDuration::Three);
    assert_eq!(parse_duration_config("-3", TimerDuration::Three), TimerDuration::Three);
  }

  #[test]
  fn test_parse_bool_config() {
    assert!(parse_bool_config("yes", "bell", false));
    assert!(!parse_bool_config("FALSE", "bell", true));
    assert!(parse_bool_config("", "bell", true));
  }

  #[test]
  fn test_load_players_from_file() {
    let path = std::env::temp_dir().join(format!("subtimer-test-{}.ini", std::process::id()));
    std::fs::write(&path, "[subtimer]\nduration = 3\nplayers = Ann, Bo | Cy ; trailing comment\n").unwrap();
    let settings = Settings::load(path.to_str().unwrap());
    std::fs::remove_file(&path).unwrap();
    assert_eq!(settings.duration, TimerDuration::Three);
    assert_eq!(settings.players, vec!["Ann, Bo", "Cy"]);
  }

  #[test]
  fn test_load_missing_file() {
    assert_eq!(Settings::load("/nonexistent/subtimer.ini"), Settings::default());
  }
}
