//! Aggregated view over every source store, as consumed by the templates.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::config::Config;
use crate::entry::{sort_entries, CanonicalEntry};
use crate::store::{EntryStore, LastUpdate};

static DOCUMENT_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(html|body)>").expect("static regex is valid"));

/// One entry ready for display, tagged with the source it came from.
#[derive(Debug, Clone)]
pub struct PlanetEntry {
    pub source_name: String,
    pub source_feed: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub content: String,
    pub date: DateTime<Utc>,
    pub date_iso: String,
    pub date_rfc2822: String,
    pub date_display: String,
    pub time_elapsed: String,
}

impl PlanetEntry {
    fn new(source_name: &str, source_feed: &str, entry: CanonicalEntry, now: DateTime<Utc>) -> Self {
        Self {
            source_name: source_name.to_string(),
            source_feed: source_feed.to_string(),
            content: DOCUMENT_TAGS.replace_all(&entry.content, "").into_owned(),
            time_elapsed: time_elapsed(entry.date, now),
            date_iso: entry.date.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            date_rfc2822: entry.date.to_rfc2822(),
            date_display: entry.date.format("%Y-%m-%d %H:%M").to_string(),
            date: entry.date,
            title: entry.title,
            link: entry.link,
            summary: entry.summary,
        }
    }

    fn matches_query(&self, query: &str) -> bool {
        [&self.source_name, &self.title, &self.content]
            .iter()
            .any(|field| field.to_lowercase().contains(query))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub count: usize,
    pub offset: usize,
}

impl Page {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.count
    }
}

#[derive(Debug, Clone)]
pub struct Planet {
    pub entries: Vec<PlanetEntry>,
    pub last_update: Option<DateTime<Utc>>,
}

impl Planet {
    /// Loads and merges every configured source's store, most recent first.
    pub fn load(config: &Config, now: DateTime<Utc>) -> Self {
        let mut entries = Vec::new();
        for source in &config.sources {
            let path = EntryStore::path_for(&config.data_dir, &source.name);
            match EntryStore::read_entries(&path) {
                Ok(Some(stored)) => entries.extend(
                    stored
                        .into_iter()
                        .map(|e| PlanetEntry::new(&source.name, &source.feed, e, now)),
                ),
                Ok(None) => {}
                Err(e) => warn!("Ignoring source '{}': {}", source.name, e),
            }
        }
        sort_entries(&mut entries, |e| e.date);

        let last_update = LastUpdate::load(&config.data_dir).unwrap_or_else(|e| {
            warn!("Could not read last update: {}", e);
            None
        });

        Self {
            entries,
            last_update,
        }
    }

    /// Keeps entries whose source name, title or content contain `query`,
    /// ignoring case.
    pub fn filter(&mut self, query: &str) {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return;
        }
        self.entries.retain(|e| e.matches_query(&query));
    }

    /// Restricts the entries to one page, clamping `requested` into range.
    pub fn paginate(&mut self, requested: usize, size: usize) -> Page {
        let size = size.max(1);
        let count = self.entries.len().div_ceil(size).max(1);
        let number = requested.clamp(1, count);
        let offset = size * (number - 1);

        let end = (offset + size).min(self.entries.len());
        self.entries = self.entries.drain(offset.min(end)..end).collect();

        Page {
            number,
            count,
            offset,
        }
    }

    pub fn page_count(&self, size: usize) -> usize {
        self.entries.len().div_ceil(size.max(1)).max(1)
    }
}

/// Human-readable age of `date` relative to `now`. Dates in the future
/// yield an empty string.
pub fn time_elapsed(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now - date;
    if diff < chrono::Duration::zero() {
        return String::new();
    }
    let days = diff.num_days();
    let seconds = diff.num_seconds() - days * 86_400;

    if days == 0 {
        return match seconds {
            0..=9 => "just now".to_string(),
            10..=60 => format!("{} seconds ago", seconds),
            61..=119 => "a minute ago".to_string(),
            120..=3600 => format!("{} minutes ago", seconds / 60),
            3601..=7199 => "an hour ago".to_string(),
            _ => format!("{} hours ago", seconds / 3600),
        };
    }

    match days {
        1 => "yesterday".to_string(),
        2..=29 => format!("{} days ago", days),
        30..=59 => "1 month ago".to_string(),
        60..=364 => format!("{} months ago", days / 30),
        365..=729 => "1 year ago".to_string(),
        _ => format!("{} years ago", days / 365),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn planet_entry(source: &str, title: &str, date: DateTime<Utc>) -> PlanetEntry {
        PlanetEntry::new(
            source,
            "https://example.com/feed",
            CanonicalEntry {
                title: title.to_string(),
                date,
                link: format!("https://example.com/{}", title),
                summary: String::new(),
                content: format!("<html><body><p>{}</p></body></html>", title),
            },
            now(),
        )
    }

    fn planet_with(count: usize) -> Planet {
        let mut entries: Vec<_> = (0..count)
            .map(|i| planet_entry("S", &format!("e{}", i), now() - Duration::hours(i as i64)))
            .collect();
        sort_entries(&mut entries, |e| e.date);
        Planet {
            entries,
            last_update: None,
        }
    }

    mod time_elapsed_tests {
        use super::*;

        fn ago(d: Duration) -> String {
            time_elapsed(now() - d, now())
        }

        #[test]
        fn test_recent() {
            assert_eq!(ago(Duration::seconds(3)), "just now");
            assert_eq!(ago(Duration::seconds(42)), "42 seconds ago");
            assert_eq!(ago(Duration::seconds(90)), "a minute ago");
            assert_eq!(ago(Duration::minutes(25)), "25 minutes ago");
            assert_eq!(ago(Duration::minutes(90)), "an hour ago");
            assert_eq!(ago(Duration::hours(5)), "5 hours ago");
        }

        #[test]
        fn test_days_and_beyond() {
            assert_eq!(ago(Duration::hours(30)), "yesterday");
            assert_eq!(ago(Duration::days(12)), "12 days ago");
            assert_eq!(ago(Duration::days(45)), "1 month ago");
            assert_eq!(ago(Duration::days(200)), "6 months ago");
            assert_eq!(ago(Duration::days(400)), "1 year ago");
            assert_eq!(ago(Duration::days(1100)), "3 years ago");
        }

        #[test]
        fn test_future_is_empty() {
            assert_eq!(time_elapsed(now() + Duration::hours(1), now()), "");
        }
    }

    mod entry_tests {
        use super::*;

        #[test]
        fn test_document_tags_stripped() {
            let entry = planet_entry("S", "hello", now());
            assert_eq!(entry.content, "<p>hello</p>");
        }

        #[test]
        fn test_dates_formatted() {
            let entry = planet_entry("S", "hello", now());
            assert_eq!(entry.date_iso, "2024-06-15T12:00:00Z");
            assert_eq!(entry.date_rfc2822, "Sat, 15 Jun 2024 12:00:00 +0000");
            assert_eq!(entry.time_elapsed, "just now");
        }
    }

    mod pagination_tests {
        use super::*;

        #[test]
        fn test_first_page() {
            let mut planet = planet_with(25);
            let page = planet.paginate(1, 10);

            assert_eq!(page, Page { number: 1, count: 3, offset: 0 });
            assert_eq!(planet.entries.len(), 10);
            assert_eq!(planet.entries[0].title, "e0");
            assert!(!page.has_previous());
            assert!(page.has_next());
        }

        #[test]
        fn test_last_page_is_partial() {
            let mut planet = planet_with(25);
            let page = planet.paginate(3, 10);

            assert_eq!(page.offset, 20);
            assert_eq!(planet.entries.len(), 5);
            assert!(!page.has_next());
        }

        #[test]
        fn test_page_clamped() {
            let mut planet = planet_with(25);
            assert_eq!(planet.paginate(99, 10).number, 3);

            let mut planet = planet_with(25);
            assert_eq!(planet.paginate(0, 10).number, 1);
        }

        #[test]
        fn test_empty_planet_has_one_page() {
            let mut planet = planet_with(0);
            let page = planet.paginate(4, 10);

            assert_eq!(page, Page { number: 1, count: 1, offset: 0 });
            assert!(planet.entries.is_empty());
        }
    }

    mod filter_tests {
        use super::*;

        #[test]
        fn test_filter_on_source_title_and_content() {
            let mut planet = Planet {
                entries: vec![
                    planet_entry("Rust Blog", "release", now()),
                    planet_entry("Other", "Rustacean days", now()),
                    planet_entry("Other", "gardening", now()),
                ],
                last_update: None,
            };

            planet.filter("RUST");
            assert_eq!(planet.entries.len(), 2);
        }

        #[test]
        fn test_blank_filter_keeps_everything() {
            let mut planet = planet_with(3);
            planet.filter("  ");
            assert_eq!(planet.entries.len(), 3);
        }
    }
}
