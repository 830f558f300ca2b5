use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest accepted mention window, in days.
pub const MAX_MENTION_WINDOW_DAYS: i64 = 3650;

/// Longest accepted staleness threshold, in hours.
pub const MAX_STALENESS_HOURS: i64 = 24 * 3650;

/// Top-level fedimap configuration, matching `fedimap.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FedimapConfig {
    #[serde(default)]
    pub crawl: CrawlSection,
    #[serde(default)]
    pub store: StoreSection,
}

impl FedimapConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject values that would make a crawl pass meaningless or hang.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let crawl = &self.crawl;
        if crawl.seed.trim().is_empty() {
            return Err(ConfigError::Invalid("crawl.seed must not be empty".into()));
        }
        if crawl.workers == 0 {
            return Err(ConfigError::Invalid("crawl.workers must be at least 1".into()));
        }
        if crawl.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "crawl.request_timeout_secs must be at least 1".into(),
            ));
        }
        if crawl.statuses_per_page == 0 {
            return Err(ConfigError::Invalid(
                "crawl.statuses_per_page must be at least 1".into(),
            ));
        }
        if crawl.status_scrape_limit == 0 {
            return Err(ConfigError::Invalid(
                "crawl.status_scrape_limit must be at least 1".into(),
            ));
        }
        if !(1..=MAX_MENTION_WINDOW_DAYS).contains(&crawl.mention_window_days) {
            return Err(ConfigError::Invalid(format!(
                "crawl.mention_window_days must be between 1 and {MAX_MENTION_WINDOW_DAYS}"
            )));
        }
        if !(1..=MAX_STALENESS_HOURS).contains(&crawl.staleness_hours) {
            return Err(ConfigError::Invalid(format!(
                "crawl.staleness_hours must be between 1 and {MAX_STALENESS_HOURS}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSection {
    /// Bootstrap instance used when the store is empty.
    pub seed: String,
    pub workers: usize,
    pub request_timeout_secs: u64,
    /// Instances reporting fewer users than this are not crawled.
    pub personal_instance_threshold: i64,
    pub statuses_per_page: u32,
    /// Hard cap on posts inspected per instance.
    pub status_scrape_limit: u64,
    pub mention_window_days: i64,
    pub page_delay_ms: u64,
    /// Cap on stale instances selected per pass. Newly discovered
    /// instances are always crawled regardless of this cap.
    pub instance_scrape_limit: usize,
    pub staleness_hours: i64,
    pub user_agent: String,
    pub allowlist_path: Option<PathBuf>,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            seed: "mastodon.social".to_string(),
            workers: 16,
            request_timeout_secs: 20,
            personal_instance_threshold: 10,
            statuses_per_page: 100,
            status_scrape_limit: 5000,
            mention_window_days: 31,
            page_delay_ms: 2000,
            instance_scrape_limit: 50,
            staleness_hours: 24,
            user_agent: format!("fedimap/{}", env!("CARGO_PKG_VERSION")),
            allowlist_path: None,
        }
    }
}

impl CrawlSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn mention_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.mention_window_days)
    }

    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::hours(self.staleness_hours)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("fedimap.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_crawler_constants() {
        let config = FedimapConfig::default();
        assert_eq!(config.crawl.seed, "mastodon.social");
        assert_eq!(config.crawl.workers, 16);
        assert_eq!(config.crawl.request_timeout(), Duration::from_secs(20));
        assert_eq!(config.crawl.personal_instance_threshold, 10);
        assert_eq!(config.crawl.status_scrape_limit, 5000);
        assert_eq!(config.crawl.instance_scrape_limit, 50);
        assert_eq!(config.crawl.staleness(), chrono::Duration::days(1));
        assert_eq!(config.store.path, PathBuf::from("fedimap.db"));
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = FedimapConfig::from_toml("[crawl]\nworkers = 4\n").unwrap();
        assert_eq!(config.crawl.workers, 4);
        assert_eq!(config.crawl.seed, "mastodon.social");
        assert_eq!(config.crawl.mention_window_days, 31);
    }

    #[test]
    fn empty_toml_is_default() {
        let config = FedimapConfig::from_toml("").unwrap();
        assert_eq!(config.crawl.statuses_per_page, 100);
    }

    #[test]
    fn zero_workers_rejected() {
        let err = FedimapConfig::from_toml("[crawl]\nworkers = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn empty_seed_rejected() {
        let err = FedimapConfig::from_toml("[crawl]\nseed = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn out_of_range_mention_window_rejected() {
        for value in ["0", "-7", "9223372036854775807"] {
            let text = format!("[crawl]\nmention_window_days = {value}\n");
            let err = FedimapConfig::from_toml(&text).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "accepted {value}");
        }
        let config = FedimapConfig::from_toml("[crawl]\nmention_window_days = 3650\n").unwrap();
        assert_eq!(config.crawl.mention_window(), chrono::Duration::days(3650));
    }

    #[test]
    fn out_of_range_staleness_rejected() {
        for value in ["0", "-48", "9223372036854775807"] {
            let text = format!("[crawl]\nstaleness_hours = {value}\n");
            let err = FedimapConfig::from_toml(&text).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "accepted {value}");
        }
        let config = FedimapConfig::from_toml("[crawl]\nstaleness_hours = 1\n").unwrap();
        assert_eq!(config.crawl.staleness(), chrono::Duration::hours(1));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = FedimapConfig::from_toml("[crawl\nworkers = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn toml_roundtrip_preserves_values() {
        let mut config = FedimapConfig::default();
        config.crawl.allowlist_path = Some(PathBuf::from("allow.txt"));
        config.store.path = PathBuf::from("/var/lib/fedimap/map.db");
        let text = config.to_toml().unwrap();
        let back = FedimapConfig::from_toml(&text).unwrap();
        assert_eq!(back.crawl.allowlist_path, Some(PathBuf::from("allow.txt")));
        assert_eq!(back.store.path, PathBuf::from("/var/lib/fedimap/map.db"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = FedimapConfig::load(Path::new("/nonexistent/fedimap.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let config = FedimapConfig::load_or_default(Path::new("/nonexistent/fedimap.toml")).unwrap();
        assert_eq!(config.crawl.workers, 16);
    }
}
