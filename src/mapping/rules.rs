//! Mapping rule grammar.
//!
//! One directive per line. Blank lines and everything after `#` are ignored.
//!
//! ```text
//! # route the following mappings to bridges 1 and 3
//! bridge 1 3
//! fe:f5:de:bd 1 10      # top left button sends 10
//! fe:f5:de:bd -1 100    # every button sends 100 + button
//! group 2
//! 01:02:03:04 1 5
//! ```

use std::collections::HashSet;

use crate::error::RuleError;
use crate::types::{BridgeMask, Destination, MAX_BRIDGES, SensorId};

/// Lowest accepted button code (press expansion directives).
pub const MIN_BUTTON: i32 = -3;

/// Highest accepted button code.
pub const MAX_BUTTON: i32 = 8;

/// A parsed rule line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Sets the destination of the mappings that follow.
    Destination(Destination),
    /// Adds a mapping.
    Mapping {
        /// Sensor the mapping applies to.
        id: SensorId,
        /// Button code or expansion directive, [-3,8].
        button: i32,
        /// Command value, or base value for expansions.
        value: i32,
    },
}

/// Parses one line of the rule file.
///
/// Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<Rule>, RuleError> {
    let content = line.split('#').next().unwrap_or_default().trim();
    if content.is_empty() {
        return Ok(None);
    }

    let mut tokens = content.split_whitespace();
    let Some(first) = tokens.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = tokens.collect();

    match first {
        "bridge" => parse_bridges(content, &rest).map(Some),
        "group" => parse_group(content, &rest).map(Some),
        _ => parse_mapping(content, first, &rest).map(Some),
    }
}

fn parse_bridges(content: &str, numbers: &[&str]) -> Result<Rule, RuleError> {
    if numbers.is_empty() {
        return Err(RuleError::Syntax(content.to_string()));
    }

    let mut seen = HashSet::new();
    let mut mask = BridgeMask::NONE;
    for token in numbers {
        let number: i64 = token
            .parse()
            .map_err(|_| RuleError::Syntax(content.to_string()))?;
        let bridge = u8::try_from(number)
            .ok()
            .filter(|b| (1..=MAX_BRIDGES as u8).contains(b))
            .ok_or(RuleError::BridgeOutOfRange(number))?;
        if !seen.insert(bridge) {
            return Err(RuleError::DuplicateBridge(bridge));
        }
        mask = mask.with(bridge);
    }
    Ok(Rule::Destination(Destination::Bridges(mask)))
}

fn parse_group(content: &str, args: &[&str]) -> Result<Rule, RuleError> {
    match args {
        [group] => group
            .parse::<u8>()
            .map(|g| Rule::Destination(Destination::Group(g)))
            .map_err(|_| RuleError::InvalidGroup((*group).to_string())),
        _ => Err(RuleError::Syntax(content.to_string())),
    }
}

fn parse_mapping(content: &str, id: &str, args: &[&str]) -> Result<Rule, RuleError> {
    let [button, value] = args else {
        return Err(RuleError::Syntax(content.to_string()));
    };

    let id: SensorId = id.parse()?;
    let button: i32 = button
        .parse()
        .map_err(|_| RuleError::Syntax(content.to_string()))?;
    if !(MIN_BUTTON..=MAX_BUTTON).contains(&button) {
        return Err(RuleError::ButtonOutOfRange(button));
    }
    let value: i32 = value
        .parse()
        .map_err(|_| RuleError::Syntax(content.to_string()))?;

    Ok(Rule::Mapping { id, button, value })
}
