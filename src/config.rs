use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;
use tracing::warn;

use crate::error::{PlanetError, Result};
use crate::filter::FilterRule;
use crate::store::slugify;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_link")]
    pub link: String,
    #[serde(default = "default_description")]
    pub description: String,
    pub logo: Option<String>,
    /// Falls back to the logo when unset
    pub favicon: Option<String>,
    /// Directory holding the per-source stores and the last update stamp
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub pagination: bool,
    #[serde(default = "default_pagination_size")]
    pub pagination_size: usize,
    #[serde(default = "default_display_sources")]
    pub display_sources: bool,
    /// Syndication formats to publish: "RSS" and/or "ATOM"
    #[serde(default = "default_feeds")]
    pub feeds: Vec<String>,
    /// Retention horizon in days; entries are kept forever when unset
    pub delete_older: Option<f64>,
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_title() -> String {
    "Dwarf Planet".to_string()
}

fn default_link() -> String {
    "http://localhost:3000/".to_string()
}

fn default_description() -> String {
    "A feed aggregator".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("datas")
}

fn default_pagination_size() -> usize {
    10
}

fn default_display_sources() -> bool {
    true
}

fn default_feeds() -> Vec<String> {
    vec!["RSS".to_string(), "ATOM".to_string()]
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,
    /// Feed URL
    pub feed: String,
    #[serde(default)]
    pub filters: Vec<FilterRule>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlanetError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| PlanetError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the updater cannot run with and warns about
    /// filters that let everything through.
    fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(PlanetError::Config("no sources defined".to_string()));
        }
        if self.pagination_size == 0 {
            return Err(PlanetError::Config(
                "pagination_size must be positive".to_string(),
            ));
        }
        if self.refresh_interval == 0 {
            return Err(PlanetError::Config(
                "refresh_interval must be at least one minute".to_string(),
            ));
        }
        if let Some(days) = self.delete_older {
            if !days.is_finite() || days < 0.0 {
                return Err(PlanetError::Config(format!(
                    "delete_older must be a non-negative number of days, got {}",
                    days
                )));
            }
        }

        // Two sources sharing a slug would write the same store file
        let mut slugs: HashMap<String, &str> = HashMap::new();
        for source in &self.sources {
            let slug = slugify(&source.name);
            if let Some(other) = slugs.insert(slug.clone(), &source.name) {
                return Err(PlanetError::Config(format!(
                    "sources '{}' and '{}' share the storage key '{}'",
                    other, source.name, slug
                )));
            }

            for (idx, rule) in source.filters.iter().enumerate() {
                if rule.is_empty() {
                    warn!(
                        "Filter #{} of source '{}' has no predicates and accepts every entry",
                        idx + 1,
                        source.name
                    );
                }
            }
        }

        Ok(())
    }

    /// Retention horizon, `None` when unbounded. Horizons too large for a
    /// `Duration` are treated as unbounded.
    pub fn retention(&self) -> Option<Duration> {
        self.delete_older
            .and_then(|days| Duration::try_milliseconds((days * 86_400_000.0).round() as i64))
    }

    pub fn favicon(&self) -> Option<&str> {
        self.favicon.as_deref().or(self.logo.as_deref())
    }

    pub fn publishes(&self, format: &str) -> bool {
        self.feeds.iter().any(|f| f.eq_ignore_ascii_case(format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_refresh_interval() {
        assert_eq!(default_refresh_interval(), 15);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            title = "Rust Planet"
            refresh_interval = 30
            delete_older = 0.5
            pagination = true
            pagination_size = 5

            [[sources]]
            name = "Test Feed"
            feed = "https://example.com/feed.xml"

            [[sources.filters]]
            title = "rust"

            [[sources.filters]]
            link = "/tag/rust"
            content = "async"

            [[sources]]
            name = "Another Feed"
            feed = "https://example.org/rss"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.title, "Rust Planet");
        assert_eq!(config.refresh_interval, 30);
        assert!(config.pagination);
        assert_eq!(config.pagination_size, 5);
        assert_eq!(config.retention(), Some(Duration::hours(12)));
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].name, "Test Feed");
        assert_eq!(config.sources[0].feed, "https://example.com/feed.xml");
        assert_eq!(config.sources[0].filters.len(), 2);
        assert_eq!(config.sources[0].filters[0].title.as_deref(), Some("rust"));
        assert_eq!(config.sources[0].filters[1].link.as_deref(), Some("/tag/rust"));
        assert!(config.sources[1].filters.is_empty());
    }

    #[test]
    fn test_defaults() {
        let content = r#"
            [[sources]]
            name = "Test Feed"
            feed = "https://example.com/feed.xml"
        "#;

        let config = Config::from_str(content).unwrap();

        assert_eq!(config.refresh_interval, 15);
        assert_eq!(config.data_dir, PathBuf::from("datas"));
        assert_eq!(config.pagination_size, 10);
        assert!(!config.pagination);
        assert!(config.display_sources);
        assert!(config.publishes("rss"));
        assert!(config.publishes("ATOM"));
        assert_eq!(config.retention(), None);
    }

    #[test]
    fn test_favicon_falls_back_to_logo() {
        let content = r#"
            logo = "img/logo.png"

            [[sources]]
            name = "Test Feed"
            feed = "https://example.com/feed.xml"
        "#;

        let config = Config::from_str(content).unwrap();
        assert_eq!(config.favicon(), Some("img/logo.png"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(PlanetError::Config(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let content = "this is not valid toml {{{";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_missing_required_fields() {
        let content = r#"
            [[sources]]
            name = "Test Feed"
            # Missing feed field
        "#;

        let result = Config::from_str(content);
        assert!(result.is_err());
    }

    #[test]
    fn test_no_sources_is_fatal() {
        assert!(matches!(
            Config::from_str("sources = []"),
            Err(PlanetError::Config(_))
        ));
        assert!(Config::from_str("title = \"Empty\"").is_err());
    }

    #[test]
    fn test_colliding_slugs_rejected() {
        let content = r#"
            [[sources]]
            name = "My Blog"
            feed = "https://a.example.com/feed"

            [[sources]]
            name = "my-blog"
            feed = "https://b.example.com/feed"
        "#;

        assert!(matches!(
            Config::from_str(content),
            Err(PlanetError::Config(_))
        ));
    }

    #[test]
    fn test_non_latin_names_get_distinct_keys() {
        let content = r#"
            [[sources]]
            name = "Новости"
            feed = "https://a.example.com/feed"

            [[sources]]
            name = "日本ニュース"
            feed = "https://b.example.com/feed"
        "#;

        let config = Config::from_str(content).unwrap();
        assert_eq!(config.sources.len(), 2);
    }

    #[test]
    fn test_negative_retention_rejected() {
        let content = r#"
            delete_older = -1.0

            [[sources]]
            name = "Test Feed"
            feed = "https://example.com/feed.xml"
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_huge_retention_keeps_everything() {
        let content = r#"
            delete_older = 100000000.0

            [[sources]]
            name = "Test Feed"
            feed = "https://example.com/feed.xml"
        "#;

        let config = Config::from_str(content).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut store = crate::store::EntryStore::load(dir.path(), "Test Feed");
        store.merge(crate::entry::CanonicalEntry {
            title: "Old".to_string(),
            date: chrono::DateTime::UNIX_EPOCH,
            link: "https://example.com/old".to_string(),
            summary: String::new(),
            content: String::new(),
        });

        assert_eq!(store.retain(config.retention(), chrono::Utc::now()), 0);

        let config = Config::from_str(&content.replace("100000000.0", "1e300")).unwrap();
        assert_eq!(store.retain(config.retention(), chrono::Utc::now()), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let content = r#"
            refresh_interval = 0

            [[sources]]
            name = "Test Feed"
            feed = "https://example.com/feed.xml"
        "#;

        assert!(matches!(
            Config::from_str(content),
            Err(PlanetError::Config(_))
        ));
    }

    #[test]
    fn test_empty_filter_rule_is_accepted() {
        let content = r#"
            [[sources]]
            name = "Test Feed"
            feed = "https://example.com/feed.xml"

            [[sources.filters]]
        "#;

        let config = Config::from_str(content).unwrap();
        assert!(config.sources[0].filters[0].is_empty());
    }
}
