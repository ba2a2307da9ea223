/*!
The merge/filter core: dedupe items from every source, prefer recent ones,
apply the keyword lists and cap the result.
*/

use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use common::Config;

use crate::model::{ItemOrigin, NewsItem};

/// Selection knobs, precomputed once from configuration.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub recency_days: i64,
    pub min_items: usize,
    pub max_items: usize,
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        PipelineOptions {
            recency_days: config.recency_days(),
            min_items: config.min_items(),
            max_items: config.max_items(),
            include_keywords: config.include_keywords(),
            exclude_keywords: config.exclude_keywords(),
        }
    }
}

/// Collapse duplicates by dedup key, keeping the later-published candidate.
/// Equal dates break deterministically: API-sourced beats listing-scraped,
/// and within the same origin the first-seen item wins. The survivors are
/// returned sorted by publication date descending (title as a stable
/// tie-break so output order does not depend on map iteration).
pub fn merge_items(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut dedup: HashMap<String, NewsItem> = HashMap::new();

    for item in items {
        match dedup.entry(item.dedup_key()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let newer = item.published > current.published;
                let wins_tie = item.published == current.published
                    && item.origin == ItemOrigin::Api
                    && current.origin == ItemOrigin::Listing;
                if newer || wins_tie {
                    occupied.insert(item);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(item);
            }
        }
    }

    let mut merged: Vec<NewsItem> = dedup.into_values().collect();
    merged.sort_by(|a, b| {
        b.published
            .cmp(&a.published)
            .then_with(|| a.title.cmp(&b.title))
    });
    merged
}

/// Keep items published inside the trailing window. Recency is a soft
/// preference: when fewer than `min_items` survive, the unfiltered list is
/// returned instead.
pub fn apply_recency_window(
    items: Vec<NewsItem>,
    now: DateTime<Utc>,
    window_days: i64,
    min_items: usize,
) -> Vec<NewsItem> {
    let cutoff = now - Duration::days(window_days);
    let recent: Vec<NewsItem> = items
        .iter()
        .filter(|item| item.published >= cutoff)
        .cloned()
        .collect();

    if recent.len() < min_items {
        items
    } else {
        recent
    }
}

/// Case-insensitive substring matching over `title + " " + content`: the
/// item passes when at least one include term matches (or the include list
/// is empty) and no exclude term matches.
pub fn passes_keyword_filter(item: &NewsItem, include: &[String], exclude: &[String]) -> bool {
    let haystack = format!("{} {}", item.title, item.content).to_lowercase();

    let include_ok =
        include.is_empty() || include.iter().any(|k| haystack.contains(&k.to_lowercase()));
    let exclude_ok = exclude.iter().all(|k| !haystack.contains(&k.to_lowercase()));

    include_ok && exclude_ok
}

/// Full selection pass: merge, recency window, keyword lists, size cap.
pub fn select_feed_items(
    collected: Vec<NewsItem>,
    opts: &PipelineOptions,
    now: DateTime<Utc>,
) -> Vec<NewsItem> {
    let merged = merge_items(collected);
    let recent = apply_recency_window(merged, now, opts.recency_days, opts.min_items);

    let mut selected: Vec<NewsItem> = recent
        .into_iter()
        .filter(|item| passes_keyword_filter(item, &opts.include_keywords, &opts.exclude_keywords))
        .collect();
    selected.truncate(opts.max_items);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn item(title: &str, link: Option<&str>, published: DateTime<Utc>, origin: ItemOrigin) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            link: link.map(str::to_string),
            published,
            content: String::new(),
            image_url: "https://example.org/logo.png".to_string(),
            origin,
        }
    }

    #[test]
    fn merge_keeps_one_item_per_key_with_latest_date() {
        let link = Some("https://prefeitura.sp.gov.br/noticias/a");
        let older = now() - Duration::days(3);
        let items = vec![
            item("Versão antiga", link, older, ItemOrigin::Api),
            item("Versão nova", link, now(), ItemOrigin::Api),
            item("Outra matéria", Some("https://prefeitura.sp.gov.br/noticias/b"), older, ItemOrigin::Api),
        ];

        let merged = merge_items(items);
        assert_eq!(merged.len(), 2);

        let keys: HashSet<String> = merged.iter().map(|i| i.dedup_key()).collect();
        assert_eq!(keys.len(), 2, "dedup keys must be unique");

        // The survivor for the shared key carries the maximum date.
        assert_eq!(merged[0].title, "Versão nova");
        assert_eq!(merged[0].published, now());
    }

    #[test]
    fn merge_tie_break_prefers_api_over_listing() {
        let link = Some("https://prefeitura.sp.gov.br/noticias/a");
        let listing_first = vec![
            item("Raspada", link, now(), ItemOrigin::Listing),
            item("Da API", link, now(), ItemOrigin::Api),
        ];
        let merged = merge_items(listing_first);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "Da API");

        // Same origin and date: first seen wins.
        let same_origin = vec![
            item("Primeira", link, now(), ItemOrigin::Api),
            item("Segunda", link, now(), ItemOrigin::Api),
        ];
        let merged = merge_items(same_origin);
        assert_eq!(merged[0].title, "Primeira");
    }

    #[test]
    fn merge_keys_linkless_items_by_title() {
        let items = vec![
            item("Sem link A", None, now(), ItemOrigin::Api),
            item("Sem link B", None, now(), ItemOrigin::Api),
        ];
        let merged = merge_items(items);
        assert_eq!(merged.len(), 2, "distinct linkless items must not collapse");
    }

    #[test]
    fn merge_sorts_by_date_descending() {
        let items = vec![
            item("Meio", Some("https://x/2"), now() - Duration::days(2), ItemOrigin::Api),
            item("Novo", Some("https://x/1"), now(), ItemOrigin::Api),
            item("Velho", Some("https://x/3"), now() - Duration::days(9), ItemOrigin::Api),
        ];
        let merged = merge_items(items);
        let titles: Vec<&str> = merged.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Novo", "Meio", "Velho"]);
    }

    #[test]
    fn recency_window_falls_back_below_floor() {
        // 24 items spread evenly over two years: one per month, so only
        // about six fall inside the 180-day window.
        let items: Vec<NewsItem> = (0..24)
            .map(|i| {
                let link = format!("https://x/{}", i);
                item(
                    &format!("Item {}", i),
                    Some(link.as_str()),
                    now() - Duration::days(30 * i),
                    ItemOrigin::Api,
                )
            })
            .collect();

        let kept = apply_recency_window(items.clone(), now(), 180, 10);
        assert_eq!(kept.len(), 24, "below the floor the full list is used");

        // With a floor the window can satisfy, the cutoff applies.
        let kept = apply_recency_window(items, now(), 180, 5);
        assert!(kept.len() >= 5 && kept.len() < 24);
        for item in &kept {
            assert!(item.published >= now() - Duration::days(180));
        }
    }

    #[test]
    fn keyword_filter_include_and_exclude() {
        let include = vec!["saúde".to_string()];
        let exclude = vec!["esporte".to_string()];

        let both = item("Saúde e esporte", Some("https://x/1"), now(), ItemOrigin::Api);
        let health = item("Saúde na escola", Some("https://x/2"), now(), ItemOrigin::Api);
        let culture = item("Festival de cultura", Some("https://x/3"), now(), ItemOrigin::Api);

        assert!(!passes_keyword_filter(&both, &include, &exclude));
        assert!(passes_keyword_filter(&health, &include, &exclude));
        assert!(!passes_keyword_filter(&culture, &include, &exclude));
    }

    #[test]
    fn keyword_filter_matches_content_too() {
        let mut it = item("Agenda da semana", Some("https://x/1"), now(), ItemOrigin::Api);
        it.content = "Mutirão de saúde no bairro".to_string();
        assert!(passes_keyword_filter(&it, &["saúde".to_string()], &[]));
    }

    #[test]
    fn selection_respects_cap() {
        let items: Vec<NewsItem> = (0..30)
            .map(|i| {
                let link = format!("https://x/{}", i);
                item(
                    &format!("Item {}", i),
                    Some(link.as_str()),
                    now() - Duration::hours(i),
                    ItemOrigin::Api,
                )
            })
            .collect();

        let opts = PipelineOptions {
            recency_days: 180,
            min_items: 10,
            max_items: 10,
            include_keywords: Vec::new(),
            exclude_keywords: Vec::new(),
        };

        let selected = select_feed_items(items, &opts, now());
        assert_eq!(selected.len(), 10);
        // Newest first survives the cap.
        assert_eq!(selected[0].title, "Item 0");
    }
}
