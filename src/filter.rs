use serde::Deserialize;

use crate::entry::CanonicalEntry;

/// Substring predicates over an entry's link, title and content. Every
/// predicate that is set must match for the rule to match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FilterRule {
    pub link: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
}

impl FilterRule {
    /// A rule without predicates matches every entry.
    pub fn is_empty(&self) -> bool {
        self.link.is_none() && self.title.is_none() && self.content.is_none()
    }

    pub fn matches(&self, entry: &CanonicalEntry) -> bool {
        [
            (&self.link, &entry.link),
            (&self.title, &entry.title),
            (&self.content, &entry.content),
        ]
        .into_iter()
        .all(|(needle, haystack)| match needle {
            Some(needle) => contains_ignore_case(haystack, needle),
            None => true,
        })
    }
}

/// Entries pass when no rules are configured or when any rule matches.
pub fn accepts(rules: &[FilterRule], entry: &CanonicalEntry) -> bool {
    rules.is_empty() || rules.iter().any(|rule| rule.matches(entry))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
