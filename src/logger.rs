//! Process logger with per-command-group level specs
//!
//! A level spec has the form `[<target>[,<target>...]=]<level>[:...]`, e.g.
//! `warning:peer::dispatch,peer::registry=debug`. The bare level is the default; a
//! target entry applies to log targets equal to it or nested below it (`target::*`).

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record, debug};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::config_file::ConfigStore;

/// Level spec applied when neither flags nor configuration provide one
pub const DEFAULT_SPEC: &str = "info";

/// Configuration key bound to the `--logging-level` flag
pub const LOGGING_LEVEL_KEY: &str = "logging_level";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LogSpecError {
    #[error("invalid log level `{0}`")]
    InvalidLevel(String),
    #[error("empty target in log spec `{0}`")]
    EmptyTarget(String),
}

/// Parsed level spec: a default level plus per-target overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSpec {
    default: LevelFilter,
    targets: Vec<(String, LevelFilter)>,
}

impl Default for LevelSpec {
    fn default() -> Self {
        LevelSpec {
            default: LevelFilter::Info,
            targets: Vec::new(),
        }
    }
}

fn parse_level(level: &str) -> Result<LevelFilter, LogSpecError> {
    match level.trim().to_lowercase().as_str() {
        "critical" | "error" => Ok(LevelFilter::Error),
        "warning" | "warn" => Ok(LevelFilter::Warn),
        "notice" | "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        "off" => Ok(LevelFilter::Off),
        _ => Err(LogSpecError::InvalidLevel(level.to_string())),
    }
}

/// Split a spec on single colons, leaving `::` path separators inside targets alone.
fn split_parts(spec: &str) -> Vec<&str> {
    let bytes = spec.as_bytes();
    let colon_at = |j: usize| bytes.get(j) == Some(&b':');
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b':' && !colon_at(i + 1) && (i == 0 || !colon_at(i - 1)) {
            parts.push(&spec[start..i]);
            start = i + 1;
        }
    }
    parts.push(&spec[start..]);
    parts
}

impl FromStr for LevelSpec {
    type Err = LogSpecError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut parsed = LevelSpec::default();
        for part in split_parts(spec).into_iter().filter(|p| !p.trim().is_empty()) {
            match part.split_once('=') {
                Some((targets, level)) => {
                    let level = parse_level(level)?;
                    for target in targets.split(',') {
                        let target = target.trim();
                        if target.is_empty() {
                            return Err(LogSpecError::EmptyTarget(spec.to_string()));
                        }
                        parsed.targets.push((target.to_string(), level));
                    }
                }
                None => parsed.default = parse_level(part)?,
            }
        }
        Ok(parsed)
    }
}

impl fmt::Display for LevelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.default.as_str().to_lowercase())?;
        for (target, level) in &self.targets {
            write!(f, ":{target}={}", level.as_str().to_lowercase())?;
        }
        Ok(())
    }
}

impl LevelSpec {
    /// Level filter for `target`, using the most specific matching entry.
    #[must_use]
    pub fn level_for(&self, target: &str) -> LevelFilter {
        self.targets
            .iter()
            .filter(|(t, _)| {
                target == t
                    || target
                        .strip_prefix(t.as_str())
                        .is_some_and(|rest| rest.starts_with("::"))
            })
            .max_by_key(|(t, _)| t.len())
            .map_or(self.default, |(_, level)| *level)
    }

    #[must_use]
    pub fn enabled(&self, target: &str, level: Level) -> bool {
        level <= self.level_for(target)
    }

    /// The most verbose level any target can reach.
    #[must_use]
    pub fn max_level(&self) -> LevelFilter {
        self.targets
            .iter()
            .map(|(_, level)| *level)
            .fold(self.default, Ord::max)
    }
}

static ACTIVE_SPEC: OnceLock<RwLock<LevelSpec>> = OnceLock::new();

fn active_spec() -> &'static RwLock<LevelSpec> {
    ACTIVE_SPEC.get_or_init(|| RwLock::new(LevelSpec::default()))
}

/// Replace the active level spec.
pub fn apply(spec: LevelSpec) {
    log::set_max_level(spec.max_level());
    *active_spec().write() = spec;
}

/// Resolve the level spec for a command group from configuration.
///
/// An explicit `logging_level` (flag or `CORE_LOGGING_LEVEL`) wins over the
/// group's `logging.<group>` entry.
#[must_use]
pub fn spec_for_group(group: &str, config: &ConfigStore) -> String {
    config
        .get_str(LOGGING_LEVEL_KEY)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| config.get_str(&format!("logging.{group}")))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SPEC.to_string())
}

/// Initialize logging for the command group `group`.
///
/// # Errors
///
/// Returns `LogSpecError` if the configured spec cannot be parsed; the previous
/// spec stays active in that case.
pub fn init_scope(group: &str, config: &ConfigStore) -> Result<LevelSpec, LogSpecError> {
    let raw = spec_for_group(group, config);
    let spec: LevelSpec = raw.parse()?;
    apply(spec.clone());
    debug!("Logging for '{group}' set to {spec}");
    Ok(spec)
}

struct PeerLogger {
    out: Mutex<Box<dyn Write + Send>>,
    start: Instant,
}

impl Log for PeerLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        active_spec().read().enabled(metadata.target(), metadata.level())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.start.elapsed().as_secs_f64();
        let _ = writeln!(
            self.out.lock(),
            "[{elapsed:.3}s] [{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = self.out.lock().flush();
    }
}

/// Install the process logger writing to stderr. Call once before any logging.
///
/// The initial spec comes from `RUST_LOG` when it parses, else [`DEFAULT_SPEC`].
///
/// # Errors
///
/// Returns `SetLoggerError` if a logger is already installed.
pub fn install() -> Result<(), log::SetLoggerError> {
    install_with(Box::new(std::io::stderr()))
}

/// Install the process logger writing to `out`.
///
/// # Errors
///
/// Returns `SetLoggerError` if a logger is already installed.
pub fn install_with(out: Box<dyn Write + Send>) -> Result<(), log::SetLoggerError> {
    let initial = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();

    log::set_boxed_logger(Box::new(PeerLogger {
        out: Mutex::new(out),
        start: Instant::now(),
    }))?;
    apply(initial);
    Ok(())
}
