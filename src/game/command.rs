//! Player Commands
//!
//! Text messages players send to steer their tank, encoded as JSON objects
//! tagged by `action`.

use serde::{Deserialize, Serialize};

/// A command from a player client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlayerCommand {
    /// Start driving forward.
    Go,
    /// Stop driving.
    Stop,
    /// Face a new heading (radians from +x).
    Turn {
        /// New heading.
        heading: f64,
    },
    /// Fire a shell along a heading.
    Fire {
        /// Shell heading.
        heading: f64,
    },
}

impl PlayerCommand {
    /// Parse a command from its text form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize to the text form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(PlayerCommand::from_json(r#"{"action":"go"}"#).unwrap(), PlayerCommand::Go);
        assert_eq!(
            PlayerCommand::from_json(r#"{"action":"turn","heading":1.5}"#).unwrap(),
            PlayerCommand::Turn { heading: 1.5 }
        );
        assert_eq!(
            PlayerCommand::Fire { heading: 0.0 }.to_json().unwrap(),
            r#"{"action":"fire","heading":0.0}"#
        );
    }

    #[test]
    fn test_reject_malformed() {
        assert!(PlayerCommand::from_json("go").is_err());
        assert!(PlayerCommand::from_json(r#"{"action":"fly"}"#).is_err());
        assert!(PlayerCommand::from_json(r#"{"action":"turn"}"#).is_err());
    }
}
