use std::error::Error;
use std::fmt;
use std::str::FromStr;

use facet::Facet;

/// Environment variable read by [`LockerConfig::from_env`].
pub const RETENTION_ENV: &str = "ROWLOCK_RETENTION";

/// What happens to an entity's mutex once nobody holds or waits for it.
#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum Retention {
    /// Keep every mutex for the lifetime of the locker. Memory grows with the
    /// number of distinct keys ever locked.
    Retain,
    /// Drop a mutex as soon as it has no holder and no in-flight attempt.
    EvictIdle,
}

impl Retention {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retain => "retain",
            Self::EvictIdle => "evict-idle",
        }
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self::Retain
    }
}

impl FromStr for Retention {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "evict-idle" | "evict_idle" | "evict" => Ok(Self::EvictIdle),
            _ => Err(ConfigError::InvalidRetention {
                value: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for an [`EntityLocker`](crate::EntityLocker).
#[derive(Facet, Clone, Debug, Default, PartialEq, Eq)]
pub struct LockerConfig {
    pub retention: Retention,
}

impl LockerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    /// Reads `ROWLOCK_RETENTION`. Unset means defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(RETENTION_ENV) {
            config.retention = value.parse()?;
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidRetention { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRetention { value } => write!(
                f,
                "{RETENTION_ENV} must be `retain` or `evict-idle`, got {value:?}"
            ),
        }
    }
}

impl Error for ConfigError {}
