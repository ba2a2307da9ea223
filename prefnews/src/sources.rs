/*!
Upstream news sources.

Two kinds of source feed the pipeline: HTML listing pages scraped with
selector heuristics, and the portal's headless-delivery JSON endpoints. Both
are driven through the `NewsSource` trait so selector strategies stay
pluggable and out of the pipeline core.
*/

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use common::Config;

use crate::fetch;
use crate::model::{
    normalize_api_item, normalize_image_url, normalize_url, ItemOrigin, NewsItem,
    StructuredContentPage,
};

/// A provider of news items. Implementations degrade payload-level problems
/// (bad status, malformed body) to an empty list; only transport failures
/// surface as errors, so the collector can tell an outage from a quiet day.
#[async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_items(&self, client: &Client, now: DateTime<Utc>) -> Result<Vec<NewsItem>>;
}

/// Scrapes one HTML listing page for (link, title, optional image) tuples.
pub struct ListingPageSource {
    name: String,
    page_url: String,
    base: Url,
    default_image: String,
    max_retries: u32,
    backoff_ms: u64,
}

#[async_trait]
impl NewsSource for ListingPageSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_items(&self, client: &Client, now: DateTime<Utc>) -> Result<Vec<NewsItem>> {
        let response =
            fetch::http_get(client, &self.page_url, self.max_retries, self.backoff_ms).await?;
        let status = response.status();
        if !status.is_success() {
            warn!("listing page {} answered {}", self.page_url, status);
            return Ok(Vec::new());
        }

        let body = response
            .text()
            .await
            .context("failed to read listing page body")?;
        if body.is_empty() {
            return Ok(Vec::new());
        }

        Ok(extract_listing(
            &body,
            &self.page_url,
            &self.base,
            &self.default_image,
            now,
        ))
    }
}

/// Fetches one headless-delivery endpoint and normalizes its `items` array.
pub struct StructuredContentSource {
    name: String,
    endpoint: String,
    base: Url,
    default_image: String,
    max_retries: u32,
    backoff_ms: u64,
}

#[async_trait]
impl NewsSource for StructuredContentSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_items(&self, client: &Client, now: DateTime<Utc>) -> Result<Vec<NewsItem>> {
        let response =
            fetch::http_get(client, &self.endpoint, self.max_retries, self.backoff_ms).await?;
        let status = response.status();
        if !status.is_success() {
            warn!("structured-contents endpoint {} answered {}", self.endpoint, status);
            return Ok(Vec::new());
        }

        let body = response
            .text()
            .await
            .context("failed to read structured-contents body")?;
        let page: StructuredContentPage = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    "malformed structured-contents payload from {}: {}",
                    self.endpoint, e
                );
                return Ok(Vec::new());
            }
        };

        Ok(page
            .items
            .iter()
            .map(|raw| normalize_api_item(raw, &self.base, &self.default_image, now))
            .collect())
    }
}

/// Heuristic extraction of news tuples from listing-page markup: candidate
/// blocks are `article`, `div.news-item` and `li` elements; the first anchor
/// with a non-empty text supplies link and title. Listing pages carry no
/// reliable timestamp, so scraped items are dated `now`.
pub fn extract_listing(
    html: &str,
    page_url: &str,
    base: &Url,
    default_image: &str,
    now: DateTime<Utc>,
) -> Vec<NewsItem> {
    let mut items = Vec::new();
    let document = Html::parse_document(html);

    let blocks = match Selector::parse("article, div.news-item, li") {
        Ok(s) => s,
        Err(_) => return items,
    };
    let anchors = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return items,
    };
    let images = match Selector::parse("img[src]") {
        Ok(s) => s,
        Err(_) => return items,
    };

    // Page-level og:image, used when a block carries no image of its own.
    let og_image = Selector::parse(r#"meta[property="og:image"]"#).ok().and_then(|sel| {
        document
            .select(&sel)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .map(str::to_string)
    });

    for block in document.select(&blocks) {
        let anchor = match block.select(&anchors).next() {
            Some(a) => a,
            None => continue,
        };
        let href = match anchor.value().attr("href") {
            Some(h) => h,
            None => continue,
        };
        let title: String = anchor.text().map(str::trim).collect();
        if title.is_empty() {
            continue;
        }

        // Canonical link, falling back to the page being scraped.
        let link = normalize_url(Some(href), base).or_else(|| Some(page_url.to_string()));

        let image_url = block
            .select(&images)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| normalize_image_url(Some(src), base, default_image))
            .or_else(|| {
                og_image
                    .as_deref()
                    .map(|u| normalize_image_url(Some(u), base, default_image))
            })
            .unwrap_or_else(|| default_image.to_string());

        items.push(NewsItem {
            title,
            link,
            published: now,
            content: String::new(),
            image_url,
            origin: ItemOrigin::Listing,
        });
    }

    items
}

/// Instantiate every configured source, in configuration order.
pub fn build_sources(config: &Config, base: &Url) -> Vec<Box<dyn NewsSource>> {
    let mut sources: Vec<Box<dyn NewsSource>> = Vec::new();
    let default_image = config.sources.default_image.clone();
    let max_retries = config.max_retries();
    let backoff_ms = config.retry_backoff_ms();

    for page in &config.sources.listing_pages {
        match base.join(page) {
            Ok(url) => sources.push(Box::new(ListingPageSource {
                name: format!("listing:{}", url),
                page_url: url.to_string(),
                base: base.clone(),
                default_image: default_image.clone(),
                max_retries,
                backoff_ms,
            })),
            Err(e) => warn!("skipping unparsable listing page {:?}: {}", page, e),
        }
    }

    let api_base = config.sources.base_url.trim_end_matches('/').to_string();
    for structure_id in &config.sources.structure_ids {
        let endpoint = format!(
            "{}/o/headless-delivery/v1.0/content-structures/{}/structured-contents?pageSize={}&sort=datePublished:desc&filter=siteId%20eq%20{}",
            api_base,
            structure_id,
            config.page_size(),
            config.sources.site_id
        );
        sources.push(Box::new(StructuredContentSource {
            name: format!("structure:{}", structure_id),
            endpoint,
            base: base.clone(),
            default_image: default_image.clone(),
            max_retries,
            backoff_ms,
        }));
    }

    for endpoint in &config.sources.generic_endpoints {
        sources.push(Box::new(StructuredContentSource {
            name: format!("api:{}", endpoint),
            endpoint: endpoint.clone(),
            base: base.clone(),
            default_image: default_image.clone(),
            max_retries,
            backoff_ms,
        }));
    }

    sources
}

/// Result of one sequential sweep over every source.
pub struct CollectOutcome {
    pub items: Vec<NewsItem>,
    pub sources_ok: usize,
    pub sources_failed: usize,
}

/// Fetch every source in order, concatenating the results. A failed source
/// contributes nothing; the counts let the caller distinguish a total
/// upstream outage from a legitimately empty sweep.
pub async fn collect_all_sources(
    sources: &[Box<dyn NewsSource>],
    client: &Client,
    now: DateTime<Utc>,
) -> CollectOutcome {
    let mut outcome = CollectOutcome {
        items: Vec::new(),
        sources_ok: 0,
        sources_failed: 0,
    };

    for source in sources {
        match source.fetch_items(client, now).await {
            Ok(items) => {
                info!("source {} yielded {} items", source.name(), items.len());
                outcome.sources_ok += 1;
                outcome.items.extend(items);
            }
            Err(e) => {
                warn!("source {} unavailable: {:#}", source.name(), e);
                outcome.sources_failed += 1;
            }
        }
    }

    outcome
}
