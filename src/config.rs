use std::error::Error;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const CONFIG_PATH_ENV: &str = "PEONY_CONFIG";
pub const DEFAULT_SETTLE_DURATION: Duration = Duration::from_secs(18 * 60 * 60);
/// Longest accepted duration: 100 years of hours.
pub const MAX_DURATION: Duration = Duration::from_secs(876_000 * 60 * 60);

const APP_DIR: &str = "peony";
const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "peony.db";

/// User preferences persisted as TOML. Every field is optional; unset
/// fields fall back to built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_duration: Option<String>,
}

impl Config {
    pub fn editor(&self) -> Option<&str> {
        self.editor.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    pub fn settle_duration(&self) -> Result<Duration, ConfigError> {
        match self
            .settle_duration
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
        {
            Some(raw) => parse_duration(raw),
            None => Ok(DEFAULT_SETTLE_DURATION),
        }
    }

    /// Stores the canonical rendering of `duration`.
    pub fn set_settle_duration(&mut self, duration: Duration) {
        self.settle_duration = Some(format_duration(duration));
    }
}

/// `$PEONY_CONFIG` when set, otherwise `<config_dir>/peony/config.toml`.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    config_path_from(std::env::var_os(CONFIG_PATH_ENV), dirs::config_dir())
}

fn config_path_from(
    explicit: Option<OsString>,
    config_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    config_dir
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
        .ok_or(ConfigError::NoConfigDir)
}

/// `<data_dir>/peony/peony.db`, used when no `--db` is given.
pub fn default_db_path() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR).join(DB_FILE))
        .ok_or(ConfigError::NoDataDir)
}

/// Reads the config at `path`. A missing file yields the defaults.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    let io_error = |source: io::Error| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, rendered).map_err(io_error)
}

/// Parses durations such as `18h`, `2h30m`, `90s` or `250ms`.
///
/// Each component is a whole number followed by one of `h`, `m`, `s` or
/// `ms`; components may repeat and appear in any order. The total may not
/// exceed [`MAX_DURATION`].
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &'static str| ConfigError::InvalidDuration {
        value: raw.to_string(),
        reason,
    };

    let text = raw.trim();
    if text.is_empty() {
        return Err(invalid("duration is empty"));
    }

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(invalid("expected a number"));
        }
        let amount: u64 = rest[..digits_end]
            .parse()
            .map_err(|_| invalid("number is too large"))?;
        rest = &rest[digits_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let component = match &rest[..unit_end] {
            "h" => amount.checked_mul(3600).map(Duration::from_secs),
            "m" => amount.checked_mul(60).map(Duration::from_secs),
            "s" => Some(Duration::from_secs(amount)),
            "ms" => Some(Duration::from_millis(amount)),
            "" => return Err(invalid("missing unit (use h, m, s or ms)")),
            _ => return Err(invalid("unknown unit (use h, m, s or ms)")),
        };
        rest = &rest[unit_end..];

        total = component
            .and_then(|c| total.checked_add(c))
            .filter(|total| *total <= MAX_DURATION)
            .ok_or_else(|| invalid("duration is too large (max 876000h)"))?;
    }
    Ok(total)
}

/// Renders a duration in the form [`parse_duration`] accepts, omitting
/// zero components: `18h`, `2h30m`, `1m30s`, `0s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let parts = [
        (secs / 3600, "h"),
        ((secs % 3600) / 60, "m"),
        (secs % 60, "s"),
        (u64::from(duration.subsec_millis()), "ms"),
    ];
    let rendered: String = parts
        .iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| format!("{amount}{unit}"))
        .collect();
    if rendered.is_empty() {
        "0s".to_string()
    } else {
        rendered
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Serialize(toml::ser::Error),
    InvalidDuration {
        value: String,
        reason: &'static str,
    },
    NoConfigDir,
    NoDataDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "config I/O error at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config TOML at {}: {}", path.display(), source)
            }
            ConfigError::Serialize(err) => write!(f, "failed to render config: {}", err),
            ConfigError::InvalidDuration { value, reason } => {
                write!(f, "invalid settle duration '{}': {}", value, reason)
            }
            ConfigError::NoConfigDir => write!(
                f,
                "cannot determine the config directory; set {}",
                CONFIG_PATH_ENV
            ),
            ConfigError::NoDataDir => {
                write!(f, "cannot determine the data directory; pass --db")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Serialize(err) => Some(err),
            ConfigError::InvalidDuration { .. }
            | ConfigError::NoConfigDir
            | ConfigError::NoDataDir => None,
        }
    }
}
