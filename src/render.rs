use std::fs;
use std::path::{Path, PathBuf};

use askama::Template;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;

use crate::config::Config;
use crate::planet::{Page, Planet, PlanetEntry};

pub const RSS_FILE: &str = "rss20.xml";
pub const ATOM_FILE: &str = "atom.xml";

/// Site-wide values shared by every template.
pub struct SiteMeta {
    pub title: String,
    pub link: String,
    pub description: String,
    pub logo: Option<String>,
    pub favicon: Option<String>,
    pub last_update_iso: String,
    pub last_update_display: String,
    pub rss: bool,
    pub atom: bool,
    pub display_sources: bool,
    pub version: &'static str,
}

impl SiteMeta {
    pub fn new(config: &Config, last_update: Option<DateTime<Utc>>) -> Self {
        let (last_update_iso, last_update_display) = match last_update {
            Some(at) => (
                at.to_rfc3339_opts(SecondsFormat::Secs, true),
                at.format("%Y-%m-%d %H:%M").to_string(),
            ),
            None => (String::new(), "never".to_string()),
        };

        Self {
            title: config.title.clone(),
            link: config.link.clone(),
            description: config.description.clone(),
            logo: config.logo.clone(),
            favicon: config.favicon().map(str::to_string),
            last_update_iso,
            last_update_display,
            rss: config.publishes("RSS"),
            atom: config.publishes("ATOM"),
            display_sources: config.display_sources,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

pub struct SourceLink {
    pub name: String,
    pub feed: String,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub site: SiteMeta,
    pub sources: Vec<SourceLink>,
    pub entries: Vec<PlanetEntry>,
    pub page: Page,
    pub pagination: bool,
    pub filter: String,
}

#[derive(Template)]
#[template(path = "rss20.xml")]
pub struct RssTemplate {
    pub site: SiteMeta,
    pub entries: Vec<PlanetEntry>,
}

#[derive(Template)]
#[template(path = "atom.xml")]
pub struct AtomTemplate {
    pub site: SiteMeta,
    pub updated: String,
    pub entries: Vec<PlanetEntry>,
}

/// Builds the index for `page` (1-based), after applying the optional
/// free-text `filter`.
pub fn index(config: &Config, mut planet: Planet, page: usize, filter: Option<&str>) -> IndexTemplate {
    let filter = filter.unwrap_or_default().to_string();
    planet.filter(&filter);

    let page = if config.pagination {
        planet.paginate(page, config.pagination_size)
    } else {
        Page {
            number: 1,
            count: 1,
            offset: 0,
        }
    };

    IndexTemplate {
        site: SiteMeta::new(config, planet.last_update),
        sources: config
            .sources
            .iter()
            .map(|s| SourceLink {
                name: s.name.clone(),
                feed: s.feed.clone(),
            })
            .collect(),
        entries: planet.entries,
        page,
        pagination: config.pagination,
        filter,
    }
}

pub fn rss(config: &Config, planet: Planet) -> RssTemplate {
    RssTemplate {
        site: SiteMeta::new(config, planet.last_update),
        entries: planet.entries,
    }
}

pub fn atom(config: &Config, planet: Planet, now: DateTime<Utc>) -> AtomTemplate {
    let updated = planet
        .last_update
        .or_else(|| planet.entries.first().map(|e| e.date))
        .unwrap_or(now)
        .to_rfc3339_opts(SecondsFormat::Secs, true);

    AtomTemplate {
        site: SiteMeta::new(config, planet.last_update),
        updated,
        entries: planet.entries,
    }
}

/// Writes the whole site as static files into `dir`: `index.html`, one
/// `page_N.html` per page when pagination is on, and the enabled feeds.
pub fn freeze(config: &Config, dir: &Path, now: DateTime<Utc>) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let planet = Planet::load(config, now);
    let mut written = Vec::new();

    let mut write = |name: String, body: String| -> anyhow::Result<()> {
        let path = dir.join(name);
        fs::write(&path, body)?;
        written.push(path);
        Ok(())
    };

    write("index.html".to_string(), index(config, planet.clone(), 1, None).render()?)?;
    if config.pagination {
        for number in 1..=planet.page_count(config.pagination_size) {
            let page = index(config, planet.clone(), number, None).render()?;
            write(format!("page_{}.html", number), page)?;
        }
    }
    if config.publishes("RSS") {
        write(RSS_FILE.to_string(), rss(config, planet.clone()).render()?)?;
    }
    if config.publishes("ATOM") {
        write(ATOM_FILE.to_string(), atom(config, planet, now).render()?)?;
    }

    info!("Froze {} files into {}", written.len(), dir.display());
    Ok(written)
}
