use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use rocket::http::{ContentType, Status};
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{get, routes, Build, Rocket, State};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use common::Config;

use crate::cache::FeedCache;
use crate::feed::{self, FeedOptions};
use crate::fetch;
use crate::pipeline::{self, PipelineOptions};
use crate::sources::{self, NewsSource};

/// Application state stored inside Rocket managed state.
///
/// The cache sits behind an async mutex held across regeneration, so
/// concurrent requests racing past a stale cache coalesce onto a single
/// upstream sweep instead of each re-fetching every source.
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub config: Arc<Config>,
    pub client: Client,
    pub sources: Vec<Box<dyn NewsSource>>,
    pub pipeline_opts: PipelineOptions,
    pub feed_opts: FeedOptions,
    pub cache: Mutex<FeedCache>,
}

/// Build the shared state from configuration: HTTP client, source list,
/// precomputed pipeline/feed options and the (cold) document cache.
pub fn build_state(config: Config) -> Result<AppState> {
    let base = Url::parse(&config.sources.base_url)
        .with_context(|| format!("invalid sources.base_url: {}", config.sources.base_url))?;

    let client = fetch::build_client(&config.user_agent(), config.fetch_timeout_seconds())?;
    let news_sources = sources::build_sources(&config, &base);
    let pipeline_opts = PipelineOptions::from_config(&config);
    let feed_opts = FeedOptions::from_config(&config, &base);
    let cache = Mutex::new(FeedCache::new(
        config.cache_ttl_seconds(),
        config.cache_disk_path().map(PathBuf::from),
    ));

    Ok(AppState {
        started_at: Utc::now(),
        config: Arc::new(config),
        client,
        sources: news_sources,
        pipeline_opts,
        feed_opts,
        cache,
    })
}

/// Run the full pipeline: fetch every source, normalize, merge, filter and
/// render the document.
///
/// Errors only on a total upstream outage (every source failed at the
/// transport level). Partial failures and empty payloads degrade inside the
/// sources; a build where anything responded renders normally, substituting
/// the sentinel entry when nothing qualifies.
pub async fn build_feed_document(state: &AppState, now: DateTime<Utc>) -> Result<String> {
    let outcome = sources::collect_all_sources(&state.sources, &state.client, now).await;
    if outcome.sources_ok == 0 && outcome.sources_failed > 0 {
        anyhow::bail!(
            "all {} configured sources are unavailable",
            outcome.sources_failed
        );
    }

    let selected = pipeline::select_feed_items(outcome.items, &state.pipeline_opts, now);
    info!(
        "feed build selected {} items ({} sources ok, {} failed)",
        selected.len(),
        outcome.sources_ok,
        outcome.sources_failed
    );

    Ok(feed::render_feed(&selected, &state.feed_opts, now))
}

fn rss_content_type() -> ContentType {
    ContentType::new("application", "rss+xml")
}

#[get("/")]
async fn index() -> &'static str {
    "Service running"
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

/// Response structure for `/api/v1/status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    cache_state: &'static str,
    cache_age_seconds: Option<i64>,
    cache_ttl_seconds: i64,
    sources: usize,
}

/// Status endpoint returning simple JSON with uptime and cache info.
#[get("/api/v1/status")]
async fn status_endpoint(state: &State<AppState>) -> Json<StatusResponse> {
    let now = Utc::now();
    let cache = state.cache.lock().await;
    let (cache_state, cache_age_seconds) = match cache.get() {
        Some(doc) => ("warm", Some((now - doc.rendered_at).num_seconds())),
        None => ("cold", None),
    };

    Json(StatusResponse {
        status: "ok",
        uptime_seconds: (now - state.started_at).num_seconds(),
        cache_state,
        cache_age_seconds,
        cache_ttl_seconds: state.config.cache_ttl_seconds(),
        sources: state.sources.len(),
    })
}

/// The feed endpoint. Serves the cached document while it is fresh;
/// otherwise regenerates, and on failure falls back to the stale document,
/// then the on-disk copy, and only then answers a plain-text error.
#[get("/feed.xml")]
async fn feed_xml(
    state: &State<AppState>,
) -> Result<(ContentType, String), status::Custom<String>> {
    let now = Utc::now();
    let mut cache = state.cache.lock().await;

    if !cache.is_stale(now) {
        if let Some(doc) = cache.get() {
            debug!(
                "serving cached feed ({}s old)",
                (now - doc.rendered_at).num_seconds()
            );
            return Ok((rss_content_type(), doc.xml.clone()));
        }
    }

    match build_feed_document(state.inner(), now).await {
        Ok(xml) => {
            cache.put(xml.clone(), now).await;
            Ok((rss_content_type(), xml))
        }
        Err(e) => {
            error!("feed regeneration failed: {:#}", e);

            if let Some(doc) = cache.get() {
                warn!("serving stale cached feed after regeneration failure");
                return Ok((rss_content_type(), doc.xml.clone()));
            }
            if let Some(xml) = cache.load_from_disk().await {
                warn!("serving last-known-good feed from disk");
                return Ok((rss_content_type(), xml));
            }

            Err(status::Custom(
                Status::ServiceUnavailable,
                "feed temporarily unavailable".to_string(),
            ))
        }
    }
}

/// Assemble the Rocket instance, applying `[server]` bind/port overrides
/// from the application config onto Rocket's default figment.
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    let mut fig = rocket::Config::figment();
    if let Some(server) = &state.config.server {
        if let Some(bind) = &server.bind {
            fig = fig.merge(("address", bind.clone()));
        }
        if let Some(port) = server.port {
            fig = fig.merge(("port", port));
        }
    }

    rocket::custom(fig)
        .manage(state)
        .mount("/", routes![index, health, status_endpoint, feed_xml])
}

/// Launch the HTTP server; blocks until Rocket shuts down.
pub async fn launch_rocket(state: AppState) -> Result<()> {
    info!("Starting Rocket HTTP server");
    build_rocket(state)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    info!("Rocket HTTP server has shut down");
    Ok(())
}
