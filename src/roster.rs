//! Player roster with buddy pairing and substitution rules.
//!
//! Two players added in the same batch become buddies. Toggling either one
//! moves both; substituting everyone leaves exactly one of each pair on field.
use std::fmt;
use strum::{Display, EnumIter, EnumString};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Position {
  #[default]
  Wing,
  Rover,
  Middle,
  Link,
}

impl Position {
  /// Next position in selector order, wrapping around.
  pub fn next(self) -> Self {
    match self {
      Position::Wing => Position::Rover,
      Position::Rover => Position::Middle,
      Position::Middle => Position::Link,
      Position::Link => Position::Wing,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(u32);

impl fmt::Display for PlayerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
  pub id: PlayerId,
  pub name: String,
  pub position: Position,
  pub on_field: bool,
  pub buddy: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
  players: Vec<Player>,
  // Never reused, even if players are removed one day.
  next_id: u32,
}

impl Default for Roster {
  fn default() -> Self {
    Self::new()
  }
}

impl Roster {
  pub fn new() -> Self {
    Self { players: Vec::new(), next_id: 1 }
  }

  fn allocate_id(&mut self) -> PlayerId {
    let id = PlayerId(self.next_id);
    self.next_id += 1;
    id
  }

  /// Add the comma-separated names in `input`, all at `position`.
  ///
  /// Exactly two names make a buddy pair; any other count adds unpaired
  /// players. Blank names are skipped. Returns the new ids in roster order.
  pub fn add_players(&mut self, input: &str, position: Position) -> Vec<PlayerId> {
    if input.trim().is_empty() {
      return Vec::new();
    }

    let names: Vec<&str> = input.split(',')
      .map(|s| s.trim())
      .filter(|s| !s.is_empty())
      .collect();

    if let [first, second] = names.as_slice() {
      let first_id = self.allocate_id();
      let second_id = self.allocate_id();
      self.players.push(Player {
        id: first_id,
        name: first.to_string(),
        position,
        on_field: false,
        buddy: Some(second_id),
      });
      self.players.push(Player {
        id: second_id,
        name: second.to_string(),
        position,
        on_field: false,
        buddy: Some(first_id),
      });
      info!("Added buddy pair {} {} / {} {} at {}", first_id, first, second_id, second, position);
      return vec![first_id, second_id];
    }

    let mut added = Vec::with_capacity(names.len());
    for name in names {
      let id = self.allocate_id();
      self.players.push(Player {
        id,
        name: name.to_string(),
        position,
        on_field: false,
        buddy: None,
      });
      info!("Added player {} {} at {}", id, name, position);
      added.push(id);
    }
    added
  }

  fn index_of(&self, id: PlayerId) -> Option<usize> {
    self.players.iter().position(|p| p.id == id)
  }

  /// Flip a player between field and bench, dragging its buddy along.
  ///
  /// Returns `false` if no player has this id.
  pub fn toggle_player(&mut self, id: PlayerId) -> bool {
    let Some(idx) = self.index_of(id) else {
      info!("Toggle ignored, no player {}", id);
      return false;
    };

    self.players[idx].on_field = !self.players[idx].on_field;
    let buddy = self.players[idx].buddy;
    if let Some(buddy_idx) = buddy.and_then(|b| self.index_of(b)) {
      self.players[buddy_idx].on_field = !self.players[buddy_idx].on_field;
    }
    info!("Toggled {} (on field: {})", id, self.players[idx].on_field);
    true
  }

  /// Flip every player, then fix up buddy pairs so exactly one of each is on field.
  pub fn substitute_all(&mut self) {
    for player in self.players.iter_mut() {
      player.on_field = !player.on_field;
    }

    for idx in 0..self.players.len() {
      let on_field = self.players[idx].on_field;
      let buddy = self.players[idx].buddy;
      if let Some(buddy_idx) = buddy.and_then(|b| self.index_of(b)) {
        if self.players[buddy_idx].on_field == on_field {
          self.players[buddy_idx].on_field = !on_field;
        }
      }
    }
    info!("Substituted all {} players", self.players.len());
  }

  pub fn on_field(&self) -> impl Iterator<Item = &Player> {
    self.players.iter().filter(|p| p.on_field)
  }

  pub fn bench(&self) -> impl Iterator<Item = &Player> {
    self.players.iter().filter(|p| !p.on_field)
  }

  /// Current name of `player`'s buddy, if it has one that still exists.
  pub fn buddy_name(&self, player: &Player) -> Option<&str> {
    let buddy = player.buddy?;
    self.get(buddy).map(|b| b.name.as_str())
  }

  pub fn get(&self, id: PlayerId) -> Option<&Player> {
    self.players.iter().find(|p| p.id == id)
  }

  pub fn players(&self) -> &[Player] {
    &self.players
  }

  pub fn len(&self) -> usize {
    self.players.len()
  }

  pub fn is_empty(&self) -> bool {
    self.players.is_empty()
  }
}

/// The add-players input: text being typed plus the position selector.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddPlayersForm {
  pub names: String,
  pub position: Position,
}

impl AddPlayersForm {
  pub fn new(position: Position) -> Self {
    Self { names: String::new(), position }
  }

  /// Add the typed names to `roster`. The text is cleared only if something was added;
  /// the position stays selected for the next batch.
  pub fn submit(&mut self, roster: &mut Roster) -> Vec<PlayerId> {
    let added = roster.add_players(&self.names, self.position);
    if !added.is_empty() {
      self.names.clear();
    }
    added
  }
}
