//! Mapping from telegrams to bridge commands.
//!
//! The [`CommandMapper`] owns the mapping table loaded from the rule file
//! (see [`rules`] for the grammar) and the per-switch release state used to
//! toggle a value when a button is let go.

pub mod rules;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{Error, Result, RuleError};
use crate::types::{Destination, MAX_BUTTON, SensorId, Telegram};

pub use rules::{Rule, parse_line};

/// Button code of the release (switch) or open (contact) state.
pub const RELEASE_BUTTON: u8 = 0;

/// Button directive: map buttons 1-8 to `value + button`.
pub const EXPAND_BUTTONS: i32 = -1;

/// Button directive: like [`EXPAND_BUTTONS`], plus a release entry with `value`.
pub const EXPAND_BUTTONS_AND_RELEASE: i32 = -2;

/// Button directive: only a release entry with `value`.
pub const RELEASE_ONLY: i32 = -3;

/// Release value keeping the toggle behavior instead of an explicit entry.
pub const TOGGLE_VALUE: i32 = -1;

/// Table key: sensor and button code.
pub type MappingKey = (SensorId, u8);

/// A mapped command: the value to send and where to send it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEntry {
    /// Value posted to the bridge sensor.
    pub value: i32,
    /// Bridges receiving the value.
    pub destination: Destination,
}

/// Command mapping from telegrams to bridge sensor values.
#[derive(Debug, Default)]
pub struct CommandMapper {
    table: BTreeMap<MappingKey, MappingEntry>,
    /// Last press forwarded per switch, negated on release.
    release: HashMap<SensorId, MappingEntry>,
}

impl CommandMapper {
    /// Creates an empty mapper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mapper from rule text.
    pub fn from_rules(text: &str) -> Result<Self> {
        let mut mapper = Self::new();
        mapper.load(text)?;
        Ok(mapper)
    }

    /// Returns the number of table entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if no mapping is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the table entry for a sensor and button code.
    #[must_use]
    pub fn entry(&self, id: SensorId, button: u8) -> Option<&MappingEntry> {
        self.table.get(&(id, button))
    }

    /// Adds a mapping.
    ///
    /// `button` is 1-8 for a press, 0 for the release, or one of the
    /// expansion directives [`EXPAND_BUTTONS`], [`EXPAND_BUTTONS_AND_RELEASE`]
    /// and [`RELEASE_ONLY`].
    pub fn add_mapping(
        &mut self,
        id: SensorId,
        button: i32,
        value: i32,
        destination: Destination,
    ) -> std::result::Result<(), RuleError> {
        add_to_table(&mut self.table, id, button, value, destination)
    }

    /// Replaces the whole table with the rules in `text`.
    ///
    /// Nothing is changed if any line is invalid. Returns the number of
    /// table entries installed.
    pub fn load(&mut self, text: &str) -> Result<usize> {
        let mut table = BTreeMap::new();
        let mut destination = Destination::default();

        for (index, line) in text.lines().enumerate() {
            let at_line = |source| Error::Config {
                line: index + 1,
                source,
            };
            match parse_line(line).map_err(at_line)? {
                None => {}
                Some(Rule::Destination(d)) => destination = d,
                Some(Rule::Mapping { id, button, value }) => {
                    add_to_table(&mut table, id, button, value, destination).map_err(at_line)?;
                }
            }
        }

        self.table = table;
        self.release.clear();
        tracing::info!("loaded {} mappings", self.table.len());
        Ok(self.table.len())
    }

    /// Reads the rule file at `path` and loads it.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        tracing::debug!("reading mapping rules from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        self.load(&text)
    }

    /// Maps a telegram to a command.
    ///
    /// A switch press returns its entry and remembers it. A release returns
    /// the explicit release entry if one exists, otherwise the remembered
    /// press with a negated value. Contacts are looked up directly.
    pub fn lookup(&mut self, telegram: &Telegram) -> Option<MappingEntry> {
        match *telegram {
            Telegram::Contact { sender, .. } => {
                self.table.get(&(sender, telegram.button_code())).copied()
            }
            Telegram::Switch {
                sender,
                pressed: false,
                ..
            } => {
                let last_press = self.release.remove(&sender);
                if let Some(explicit) = self.table.get(&(sender, RELEASE_BUTTON)) {
                    return Some(*explicit);
                }
                last_press.map(|press| MappingEntry {
                    value: press.value.saturating_neg(),
                    destination: press.destination,
                })
            }
            Telegram::Switch { sender, button, .. } => {
                let entry = if button == RELEASE_BUTTON {
                    None
                } else {
                    self.table.get(&(sender, button)).copied()
                };
                match entry {
                    Some(entry) => self.release.insert(sender, entry),
                    None => self.release.remove(&sender),
                };
                entry
            }
        }
    }
}

fn add_to_table(
    table: &mut BTreeMap<MappingKey, MappingEntry>,
    id: SensorId,
    button: i32,
    value: i32,
    destination: Destination,
) -> std::result::Result<(), RuleError> {
    if value == 0 {
        return Err(RuleError::MissingValue);
    }

    match button {
        EXPAND_BUTTONS | EXPAND_BUTTONS_AND_RELEASE => {
            for b in 1..=i32::from(MAX_BUTTON) {
                let expanded = value
                    .checked_add(b)
                    .ok_or(RuleError::ValueOverflow { value, button: b })?;
                insert(table, id, b as u8, expanded, destination);
            }
            if button == EXPAND_BUTTONS_AND_RELEASE {
                insert(table, id, RELEASE_BUTTON, value, destination);
            }
        }
        RELEASE_ONLY => insert(table, id, RELEASE_BUTTON, value, destination),
        0 if value == TOGGLE_VALUE => {
            tracing::debug!("release of {} keeps toggle behavior", id);
        }
        0..=8 => insert(table, id, button as u8, value, destination),
        other => return Err(RuleError::ButtonOutOfRange(other)),
    }
    Ok(())
}

fn insert(
    table: &mut BTreeMap<MappingKey, MappingEntry>,
    id: SensorId,
    button: u8,
    value: i32,
    destination: Destination,
) {
    match table.entry((id, button)) {
        std::collections::btree_map::Entry::Occupied(existing) => {
            tracing::warn!(
                "duplicate mapping for {}: {} ignored, keeping {}",
                id,
                button,
                existing.get().value
            );
        }
        std::collections::btree_map::Entry::Vacant(slot) => {
            tracing::info!(
                "added mapping for {}: {} -> {} ({})",
                id,
                button,
                value,
                destination
            );
            slot.insert(MappingEntry { value, destination });
        }
    }
}
