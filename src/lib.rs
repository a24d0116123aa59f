//! Dwarf Planet - a feed aggregator
//!
//! This crate fetches a configured list of feeds, merges their entries into
//! one JSON store per source and renders the combined, date-sorted entries
//! as a web page plus RSS and Atom feeds.

pub mod config;
pub mod entry;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod normalizer;
pub mod planet;
pub mod render;
pub mod routes;
pub mod store;

pub use error::{PlanetError, Result};
