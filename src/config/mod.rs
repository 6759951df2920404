//! Logging options and their resolution.
//!
//! Every choice resolves with the same precedence: an explicit option wins,
//! then the environment (`LOG_PRETTY`, `LOG_LEVEL`), then the default.
//! Options can be built in code or loaded from TOML:
//!
//! ```toml
//! pretty = "auto"
//! level = "debug"
//! time_format = "%H:%M:%S"
//! caller = false
//! parse_json_strings = true
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{level::Level, output::Destination};

/// Overrides automatic pretty detection when set to a boolean.
pub const ENV_PRETTY: &str = "LOG_PRETTY";
/// Minimum level used when no level is configured explicitly.
pub const ENV_LEVEL: &str = "LOG_LEVEL";

/// Structured output time layout (RFC 3339 with fractional seconds).
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";
/// Colorized output time layout. `%Z` renders the local UTC offset
/// (`+02:00`), not a zone abbreviation.
pub const DEFAULT_PRETTY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// Pretty (colorized) vs. structured output selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrettyMode {
    /// Use `LOG_PRETTY` if set, else pretty iff the destination is a terminal.
    #[default]
    Auto,
    On,
    Off,
}

impl PrettyMode {
    /// Interpret free-form text: empty means auto, a true value forces pretty
    /// output, anything else forces structured output.
    pub fn from_env_str(value: &str) -> Self {
        if value.is_empty() {
            PrettyMode::Auto
        } else if parse_bool(value) == Some(true) {
            PrettyMode::On
        } else {
            PrettyMode::Off
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogOptions {
    /// Output selection.
    #[serde(default)]
    pub pretty: PrettyMode,

    /// Minimum level. Falls back to `LOG_LEVEL`, then `INFO`.
    #[serde(default)]
    pub level: Option<Level>,

    /// chrono `strftime` layout for timestamps. Defaults depend on the mode.
    #[serde(default)]
    pub time_format: Option<String>,

    /// Include source location.
    #[serde(default = "default_true")]
    pub caller: bool,

    /// Treat string attributes starting with `{` or `[` as JSON text.
    #[serde(default = "default_true")]
    pub parse_json_strings: bool,

    /// Output stream.
    #[serde(skip)]
    pub destination: Destination,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            pretty: PrettyMode::default(),
            level: None,
            time_format: None,
            caller: true,
            parse_json_strings: true,
            destination: Destination::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid logging configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl LogOptions {
    /// Parse options from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn with_pretty(mut self, pretty: PrettyMode) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_time_format(mut self, time_format: impl Into<String>) -> Self {
        self.time_format = Some(time_format.into());
        self
    }

    pub fn with_caller(mut self, caller: bool) -> Self {
        self.caller = caller;
        self
    }

    pub fn with_parse_json_strings(mut self, parse: bool) -> Self {
        self.parse_json_strings = parse;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Whether the colorized renderer should be used.
    pub fn resolve_pretty(&self) -> bool {
        match self.pretty {
            PrettyMode::On => true,
            PrettyMode::Off => false,
            PrettyMode::Auto => match std::env::var(ENV_PRETTY) {
                Ok(value) => parse_bool(&value).unwrap_or(false),
                Err(_) => self.destination.is_terminal(),
            },
        }
    }

    /// Initial threshold. An unparseable `LOG_LEVEL` falls back to the default.
    pub fn resolve_level(&self) -> Level {
        if let Some(level) = self.level {
            return level;
        }

        std::env::var(ENV_LEVEL)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    /// Time layout for the given mode.
    pub fn resolve_time_format(&self, pretty: bool) -> &str {
        match (&self.time_format, pretty) {
            (Some(format), _) => format.as_str(),
            (None, true) => DEFAULT_PRETTY_TIME_FORMAT,
            (None, false) => DEFAULT_TIME_FORMAT,
        }
    }
}

/// Parse a boolean the way command-line tools usually spell one.
///
/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
