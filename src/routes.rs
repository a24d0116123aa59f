use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::error;

use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::planet::Planet;
use crate::render;

pub struct AppState {
    pub config: Arc<Config>,
    pub fetcher: Arc<Fetcher>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/rss20.xml", get(rss20))
        .route("/atom.xml", get(atom))
        .route("/refresh", post(refresh))
        .route("/refresh/status", get(refresh_status))
        .route("/health", get(health))
        .route("/:page", get(page))
        .with_state(state)
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => render_failure(err),
        }
    }
}

// Wrapper for syndication feeds
struct XmlTemplate<T>(T);

impl<T: Template> IntoResponse for XmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(xml) => ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], xml).into_response(),
            Err(err) => render_failure(err),
        }
    }
}

fn render_failure(err: askama::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Failed to render template: {}", err),
    )
        .into_response()
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

#[derive(Deserialize)]
pub struct IndexQuery {
    #[serde(default)]
    pub filter: Option<String>,
}

/// Extracts N from a `page_N.html` path segment.
pub fn parse_page_file(segment: &str) -> Option<usize> {
    segment
        .strip_prefix("page_")?
        .strip_suffix(".html")?
        .parse()
        .ok()
}

async fn load_planet(config: Arc<Config>) -> Result<Planet, AppError> {
    let planet = tokio::task::spawn_blocking(move || Planet::load(&config, Utc::now())).await?;
    Ok(planet)
}

// Route handlers
pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IndexQuery>,
) -> Result<impl IntoResponse, AppError> {
    let planet = load_planet(state.config.clone()).await?;
    Ok(HtmlTemplate(render::index(
        &state.config,
        planet,
        1,
        query.filter.as_deref(),
    )))
}

pub async fn page(
    State(state): State<Arc<AppState>>,
    Path(segment): Path<String>,
    Query(query): Query<IndexQuery>,
) -> Result<Response, AppError> {
    let Some(number) = parse_page_file(&segment) else {
        return Ok((StatusCode::NOT_FOUND, "Not found").into_response());
    };

    let planet = load_planet(state.config.clone()).await?;
    Ok(HtmlTemplate(render::index(
        &state.config,
        planet,
        number,
        query.filter.as_deref(),
    ))
    .into_response())
}

pub async fn rss20(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    if !state.config.publishes("RSS") {
        return Ok((StatusCode::NOT_FOUND, "Not found").into_response());
    }
    let planet = load_planet(state.config.clone()).await?;
    Ok(XmlTemplate(render::rss(&state.config, planet)).into_response())
}

pub async fn atom(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    if !state.config.publishes("ATOM") {
        return Ok((StatusCode::NOT_FOUND, "Not found").into_response());
    }
    let planet = load_planet(state.config.clone()).await?;
    Ok(XmlTemplate(render::atom(&state.config, planet, Utc::now())).into_response())
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Spawn the refresh task
    let fetcher = state.fetcher.clone();
    tokio::spawn(async move {
        if let Err(e) = fetcher.refresh_all_sources().await {
            error!("Requested feed refresh failed: {}", e);
        }
    });

    (StatusCode::ACCEPTED, Html("Refreshing"))
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.fetcher.is_refreshing().await {
        Html("Refreshing")
    } else {
        Html("Idle")
    }
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
