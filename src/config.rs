//! Consistency checking configuration

use crate::error::{Error, Result};
use std::env;

/// Run-wide switches consumed by the state handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateConfig {
    /// Check every observed flag/keyword change against its statically
    /// assigned owner session.
    pub assign_flag_owners: bool,
    /// Escalate consistency violations to [`Error::Fatal`].
    pub fatal_on_consistency_error: bool,
}

impl StateConfig {
    /// Load configuration from environment variables
    ///
    /// Reads from `.env` file if present. Optional (default `false`):
    /// - `IMAP_STATE_ASSIGN_FLAG_OWNERS`
    /// - `IMAP_STATE_FATAL`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set to something that
    /// isn't a boolean.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            assign_flag_owners: env_bool("IMAP_STATE_ASSIGN_FLAG_OWNERS")?,
            fatal_on_consistency_error: env_bool("IMAP_STATE_FATAL")?,
        })
    }
}

fn env_bool(name: &str) -> Result<bool> {
    env::var(name).map_or(Ok(false), |value| parse_bool(&value).ok_or_else(|| {
        Error::Config(format!("Invalid {name}: {value}"))
    }))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool(" true "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool(""), Some(false));
    }

    #[test]
    fn parse_bool_rejects_garbage() {
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn default_is_lenient() {
        let config = StateConfig::default();
        assert!(!config.assign_flag_owners);
        assert!(!config.fatal_on_consistency_error);
    }
}
