//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Milliseconds between timer ticks in `run`.
    pub tick_interval_ms: u64,
    /// Capacity of the event channel; slow readers lose the oldest events.
    pub event_buffer: usize,
    /// Default number of history records listed.
    pub history_limit: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("tick_interval_ms", &self.tick_interval_ms)
            .field("event_buffer", &self.event_buffer)
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("stagetimer.db"),
            tick_interval_ms: 1000,
            event_buffer: 100,
            history_limit: 50,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // STAGETIMER_DATABASE_PATH, STAGETIMER_TICK_INTERVAL_MS, ...
        figment = figment.merge(Env::prefixed("STAGETIMER_"));

        figment.extract()
    }

    /// Tick period, never shorter than 10ms.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(10))
    }
}

/// Returns the platform-specific config directory for stagetimer.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stagetimer"))
}

/// Returns the platform-specific data directory for stagetimer.
///
/// On Linux: `~/.local/share/stagetimer`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("stagetimer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_stagetimer() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "stagetimer");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("stagetimer.db"));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.history_limit, 50);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "database_path = \"/srv/stage/timer.db\"\ntick_interval_ms = 250\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/srv/stage/timer.db"));
        assert_eq!(config.tick_interval(), Duration::from_millis(250));
        assert_eq!(config.event_buffer, 100);
    }
}
