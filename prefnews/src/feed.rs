/*!
RSS 2.0 rendering of the selected items.

The channel is never structurally empty: when zero items survive the
pipeline a single sentinel entry is substituted so readers always see a
valid, non-empty document.
*/

use chrono::{DateTime, Utc};
use rss::{ChannelBuilder, EnclosureBuilder, GuidBuilder, ItemBuilder};
use url::Url;

use common::Config;

use crate::model::{sha256_hex, NewsItem};

/// Sentinel entry title used when no items survive filtering.
pub const SENTINEL_TITLE: &str = "Sem notícias no momento";

const SENTINEL_DESCRIPTION: &str = "Nenhum item foi encontrado com os filtros atuais.";

/// Channel-level metadata and fallbacks, precomputed once from configuration.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    /// Substituted for items that carry no canonical link, and used as the
    /// sentinel entry link.
    pub fallback_link: String,
    pub default_image: String,
}

impl FeedOptions {
    /// The channel links to the first configured listing page; linkless
    /// items and the sentinel point at the last one (the "all news" page on
    /// the real portal). With no resolvable listing pages both fall back to
    /// the base URL.
    pub fn from_config(config: &Config, base: &Url) -> Self {
        let resolved: Vec<String> = config
            .sources
            .listing_pages
            .iter()
            .filter_map(|page| base.join(page).ok().map(String::from))
            .collect();

        let link = resolved.first().cloned().unwrap_or_else(|| base.to_string());
        let fallback_link = resolved.last().cloned().unwrap_or_else(|| base.to_string());

        FeedOptions {
            title: config.feed_title(),
            link,
            description: config.feed_description(),
            language: config.feed_language(),
            fallback_link,
            default_image: config.sources.default_image.clone(),
        }
    }
}

/// Render the final ordered item list as an RSS 2.0 document.
pub fn render_feed(items: &[NewsItem], opts: &FeedOptions, now: DateTime<Utc>) -> String {
    let mut entries: Vec<rss::Item> = items
        .iter()
        .map(|item| {
            let link = item
                .link
                .clone()
                .unwrap_or_else(|| opts.fallback_link.clone());
            let description = if item.content.is_empty() {
                item.title.clone()
            } else {
                item.content.clone()
            };

            ItemBuilder::default()
                .title(Some(item.title.clone()))
                .link(Some(link.clone()))
                .description(Some(description))
                .guid(Some(
                    GuidBuilder::default()
                        .value(sha256_hex(&link))
                        .permalink(false)
                        .build(),
                ))
                .enclosure(Some(
                    EnclosureBuilder::default()
                        .url(item.image_url.clone())
                        .length("0".to_string())
                        .mime_type("image/jpeg".to_string())
                        .build(),
                ))
                .pub_date(Some(item.published.to_rfc2822()))
                .build()
        })
        .collect();

    if entries.is_empty() {
        entries.push(sentinel_entry(opts, now));
    }

    let channel = ChannelBuilder::default()
        .title(opts.title.clone())
        .link(opts.link.clone())
        .description(opts.description.clone())
        .language(Some(opts.language.clone()))
        .last_build_date(Some(now.to_rfc2822()))
        .items(entries)
        .build();

    channel.to_string()
}

fn sentinel_entry(opts: &FeedOptions, now: DateTime<Utc>) -> rss::Item {
    ItemBuilder::default()
        .title(Some(SENTINEL_TITLE.to_string()))
        .link(Some(opts.fallback_link.clone()))
        .description(Some(SENTINEL_DESCRIPTION.to_string()))
        .enclosure(Some(
            EnclosureBuilder::default()
                .url(opts.default_image.clone())
                .length("0".to_string())
                .mime_type("image/jpeg".to_string())
                .build(),
        ))
        .pub_date(Some(now.to_rfc2822()))
        .build()
}
