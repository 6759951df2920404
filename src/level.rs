//! Severity levels and the live-mutable threshold shared by output layers.
//!
//! The threshold is a single atomic byte. Every enabled-check performs one
//! `Acquire` load; [`LevelHandle::set_level`] parses first and then performs
//! one `Release` store, so readers never observe a partially applied update
//! and a rejected update leaves the previous level in place.

use std::{
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Filter};

/// Record severity, ordered `Debug < Info < Warn < Error`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Level {
    #[serde(alias = "DEBUG")]
    Debug = 0,
    #[default]
    #[serde(alias = "INFO")]
    Info = 1,
    #[serde(alias = "WARN")]
    Warn = 2,
    #[serde(alias = "ERROR")]
    Error = 3,
}

impl Level {
    /// Canonical upper-case name, as rendered in output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    /// Map a `tracing` level onto a severity.
    ///
    /// `TRACE` has no counterpart and ranks below every threshold.
    pub fn from_tracing(level: &tracing::Level) -> Option<Self> {
        match *level {
            tracing::Level::TRACE => None,
            tracing::Level::DEBUG => Some(Level::Debug),
            tracing::Level::INFO => Some(Level::Info),
            tracing::Level::WARN => Some(Level::Warn),
            tracing::Level::ERROR => Some(Level::Error),
        }
    }

    fn from_repr(value: u8) -> Self {
        match value {
            0 => Level::Debug,
            2 => Level::Warn,
            3 => Level::Error,
            _ => Level::Info,
        }
    }
}

impl From<Level> for tracing::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Debug => tracing::Level::DEBUG,
            Level::Info => tracing::Level::INFO,
            Level::Warn => tracing::Level::WARN,
            Level::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when text does not name a known level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level {input:?}, expected one of DEBUG, INFO, WARN, ERROR")]
pub struct ParseLevelError {
    input: String,
}

impl ParseLevelError {
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("debug") {
            Ok(Level::Debug)
        } else if s.eq_ignore_ascii_case("info") {
            Ok(Level::Info)
        } else if s.eq_ignore_ascii_case("warn") {
            Ok(Level::Warn)
        } else if s.eq_ignore_ascii_case("error") {
            Ok(Level::Error)
        } else {
            Err(ParseLevelError {
                input: s.to_string(),
            })
        }
    }
}

/// Shared, atomically updated severity threshold.
///
/// Clones share the same cell. Hand one clone to each output layer (it
/// implements [`Filter`]) and keep another for the operator path that calls
/// [`LevelHandle::set_level`].
#[derive(Clone)]
pub struct LevelHandle {
    threshold: Arc<AtomicU8>,
}

impl LevelHandle {
    pub fn new(level: Level) -> Self {
        Self {
            threshold: Arc::new(AtomicU8::new(level as u8)),
        }
    }

    /// Current threshold.
    pub fn get(&self) -> Level {
        Level::from_repr(self.threshold.load(Ordering::Acquire))
    }

    /// Replace the threshold.
    pub fn set(&self, level: Level) {
        self.threshold.store(level as u8, Ordering::Release);
    }

    /// Parse `text` and replace the threshold.
    ///
    /// On failure the current threshold is left untouched.
    pub fn set_level(&self, text: &str) -> Result<(), ParseLevelError> {
        let level = text.parse::<Level>()?;
        self.set(level);
        Ok(())
    }

    /// Whether a record at `level` passes the threshold.
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.get()
    }

    /// Whether a `tracing` record at `level` passes the threshold.
    pub fn enabled_tracing(&self, level: &tracing::Level) -> bool {
        Level::from_tracing(level).is_some_and(|level| self.enabled(level))
    }
}

impl Default for LevelHandle {
    fn default() -> Self {
        Self::new(Level::default())
    }
}

impl fmt::Debug for LevelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelHandle")
            .field("threshold", &self.get())
            .finish()
    }
}

/// Events on this target pass every threshold. See [`log!`](crate::log).
pub const ALWAYS_TARGET: &str = "logshape::always";

// The default `callsite_enabled` answers `Interest::sometimes()`, which keeps
// callsite caching from pinning a decision made under an older threshold.
impl<S: Subscriber> Filter<S> for LevelHandle {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        meta.target() == ALWAYS_TARGET || self.enabled_tracing(meta.level())
    }
}

/// Emit an INFO event that is rendered whatever the current threshold.
///
/// Takes the same arguments as [`tracing::info!`], minus `target:`.
///
/// ```
/// logshape::log!(version = "1.2.0", "service started");
/// ```
#[macro_export]
macro_rules! log {
    ($($arg:tt)+) => {
        ::tracing::info!(target: $crate::level::ALWAYS_TARGET, $($arg)+)
    };
}
