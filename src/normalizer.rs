use chrono::{DateTime, SubsecRound, Utc};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::entry::CanonicalEntry;
use crate::error::{PlanetError, Result};

static SCRIPT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("static selector is valid"));

/// A value with its declared media type, as carried by feed title, summary
/// and content elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub content_type: String,
    pub value: String,
}

impl TextBlock {
    pub fn new(content_type: &str, value: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            value: value.to_string(),
        }
    }
}

/// One feed entry as delivered by the parser. Every field is optional since
/// RSS and Atom carry different subsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title_detail: Option<TextBlock>,
    pub title: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub summary_detail: Option<TextBlock>,
    pub summary: Option<String>,
    pub content: Vec<TextBlock>,
    pub link: Option<String>,
}

impl From<feed_rs::model::Entry> for RawEntry {
    fn from(entry: feed_rs::model::Entry) -> Self {
        let text_block = |text: feed_rs::model::Text| TextBlock {
            content_type: text.content_type.essence().to_string(),
            value: text.content,
        };

        let content = entry
            .content
            .and_then(|c| {
                let content_type = c.content_type.essence().to_string();
                c.body.map(|value| TextBlock {
                    content_type,
                    value,
                })
            })
            .into_iter()
            .collect();

        Self {
            title_detail: entry.title.map(text_block),
            title: None,
            published: entry.published,
            updated: entry.updated,
            summary_detail: entry.summary.map(text_block),
            summary: None,
            content,
            link: entry.links.into_iter().next().map(|l| l.href),
        }
    }
}

/// Turns a raw entry into its stored shape. Fails with a missing-field error
/// when the entry has no title, date or link; callers skip such entries.
pub fn normalize(raw: &RawEntry) -> Result<CanonicalEntry> {
    let title = raw
        .title_detail
        .as_ref()
        .map(|t| t.value.clone())
        .or_else(|| raw.title.clone())
        .ok_or(PlanetError::MissingTitle)?;

    // Stored dates carry whole seconds only
    let date = raw
        .published
        .or(raw.updated)
        .ok_or(PlanetError::MissingDate)?
        .trunc_subsecs(0);

    let link = raw.link.clone().ok_or(PlanetError::MissingLink)?;

    let summary = match (&raw.summary_detail, &raw.summary) {
        (Some(detail), _) => render_block(detail),
        (None, Some(plain)) => plain.clone(),
        (None, None) => String::new(),
    };

    // Later blocks overwrite earlier ones.
    let mut content = raw
        .content
        .iter()
        .map(render_block)
        .last()
        .unwrap_or_default();
    if content.is_empty() && !summary.is_empty() {
        content = summary.clone();
    }

    Ok(CanonicalEntry {
        title,
        date,
        link,
        summary,
        content,
    })
}

fn render_block(block: &TextBlock) -> String {
    match block.content_type.as_str() {
        "text/plain" => block.value.replace('\n', "<br />"),
        "text/html" => strip_scripts(&block.value),
        _ => block.value.clone(),
    }
}

/// Parses `markup` as an HTML fragment and re-serializes it without any
/// `<script>` element.
pub fn strip_scripts(markup: &str) -> String {
    let mut fragment = Html::parse_fragment(markup);

    let scripts: Vec<_> = fragment.select(&SCRIPT).map(|el| el.id()).collect();
    for id in scripts {
        if let Some(mut node) = fragment.tree.get_mut(id) {
            node.detach();
        }
    }

    fragment.root_element().inner_html()
}
