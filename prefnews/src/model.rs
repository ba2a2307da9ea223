/*!
Normalized news items and the raw upstream payload shapes.

The headless-delivery API and the scraped listing pages produce records of
very different shapes; everything downstream of the sources works on
`NewsItem` only.
*/

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use url::Url;

/// Title used when a record carries no usable title.
pub const FALLBACK_TITLE: &str = "Sem título";

/// Locale consulted in locale-keyed title maps.
const TITLE_LOCALE: &str = "pt_BR";

/// Field names treated as the item body text.
const BODY_FIELD_NAMES: [&str; 3] = ["texto", "conteudo", "body"];

/// Field names treated as the item image.
const IMAGE_FIELD_NAMES: [&str; 2] = ["imagem", "image"];

/// Where an item was discovered; used as the deterministic dedup tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOrigin {
    /// Structured-content record from the JSON API.
    Api,
    /// Anchor/image tuple scraped from an HTML listing page.
    Listing,
}

/// One normalized news item, rebuilt on every feed build.
#[derive(Debug, Clone)]
pub struct NewsItem {
    pub title: String,
    /// Canonical absolute link, when the source provided one. Rendering
    /// substitutes the configured fallback page for `None`.
    pub link: Option<String>,
    pub published: DateTime<Utc>,
    pub content: String,
    pub image_url: String,
    pub origin: ItemOrigin,
}

impl NewsItem {
    /// Key used to collapse duplicates of the same underlying story: the
    /// canonical link when one exists, otherwise a hash of the title so
    /// linkless items do not all land in one bucket.
    pub fn dedup_key(&self) -> String {
        match &self.link {
            Some(link) => link.clone(),
            None => sha256_hex(&self.title),
        }
    }
}

/// Hex SHA-256, used for feed GUIDs and the title-based dedup key.
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

// ---------------------------------------------------------------------------
// Raw headless-delivery payload
// ---------------------------------------------------------------------------

/// Page envelope returned by the structured-contents endpoints.
#[derive(Debug, Deserialize)]
pub struct StructuredContentPage {
    #[serde(default)]
    pub items: Vec<StructuredContent>,
}

/// One raw structured-content record. Every field is optional; normalization
/// supplies the fallbacks.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredContent {
    #[serde(default)]
    pub title: Option<TitleField>,
    #[serde(default)]
    pub content_url: Option<String>,
    #[serde(default)]
    pub link_visited: Option<String>,
    #[serde(default)]
    pub date_published: Option<String>,
    #[serde(default)]
    pub content_fields: Vec<ContentField>,
}

/// Titles arrive either as a plain string or as a locale-keyed map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TitleField {
    Plain(String),
    Localized(HashMap<String, String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentField {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_field_value: Option<ContentFieldValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFieldValue {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub image: Option<ImageValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageValue {
    #[serde(default)]
    pub content_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalization helpers
// ---------------------------------------------------------------------------

/// Extract a displayable title, substituting the placeholder for missing or
/// blank values. Only the pt_BR locale is consulted in localized maps.
pub fn safe_title(title: Option<&TitleField>) -> String {
    match title {
        Some(TitleField::Plain(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                FALLBACK_TITLE.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Some(TitleField::Localized(map)) => match map.get(TITLE_LOCALE) {
            Some(s) if !s.is_empty() => s.clone(),
            _ => FALLBACK_TITLE.to_string(),
        },
        None => FALLBACK_TITLE.to_string(),
    }
}

/// Parse an ISO-8601 timestamp, defaulting to `now` when missing or
/// unparsable. Undated items therefore sort as most recent; do not "fix"
/// this without revisiting the merge rules that depend on it.
pub fn safe_date(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Resolve a possibly-relative URL against the portal base. Returns `None`
/// for missing, empty or unresolvable values.
pub fn normalize_url(raw: Option<&str>, base: &Url) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match Url::parse(raw) {
        Ok(u) if u.has_host() => Some(u.into()),
        _ => base.join(raw).ok().map(Into::into),
    }
}

/// Like [`normalize_url`] but falling back to the placeholder image.
pub fn normalize_image_url(raw: Option<&str>, base: &Url, default_image: &str) -> String {
    normalize_url(raw, base).unwrap_or_else(|| default_image.to_string())
}

/// Walk the ordered content fields, extracting at most one body text and one
/// image URL. Later non-empty body values overwrite earlier ones; the last
/// image field wins. Unrecognized field names are ignored.
pub fn extract_content_fields(
    fields: &[ContentField],
    base: &Url,
    default_image: &str,
) -> (String, Option<String>) {
    let mut content = String::new();
    let mut image_url = None;

    for field in fields {
        let name = match &field.name {
            Some(n) => n.to_lowercase(),
            None => continue,
        };
        let value = match &field.content_field_value {
            Some(v) => v,
            None => continue,
        };

        if BODY_FIELD_NAMES.contains(&name.as_str()) {
            if let Some(data) = &value.data {
                if !data.is_empty() {
                    content = data.clone();
                }
            }
        }
        if IMAGE_FIELD_NAMES.contains(&name.as_str()) {
            let raw = value.image.as_ref().and_then(|i| i.content_url.as_deref());
            image_url = Some(normalize_image_url(raw, base, default_image));
        }
    }

    (content, image_url)
}

/// Normalize one raw API record into a `NewsItem`.
pub fn normalize_api_item(
    raw: &StructuredContent,
    base: &Url,
    default_image: &str,
    now: DateTime<Utc>,
) -> NewsItem {
    let title = safe_title(raw.title.as_ref());
    let link = normalize_url(raw.content_url.as_deref(), base)
        .or_else(|| normalize_url(raw.link_visited.as_deref(), base));
    let published = safe_date(raw.date_published.as_deref(), now);
    let (content, image) = extract_content_fields(&raw.content_fields, base, default_image);
    let image_url = image.unwrap_or_else(|| default_image.to_string());

    NewsItem {
        title,
        link,
        published,
        content,
        image_url,
        origin: ItemOrigin::Api,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DEFAULT_IMAGE: &str = "https://www.noticiasdeitaquera.com.br/imagens/logoprefsp.png";

    fn base() -> Url {
        Url::parse("https://prefeitura.sp.gov.br").expect("base url")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn safe_title_handles_plain_localized_and_missing() {
        assert_eq!(
            safe_title(Some(&TitleField::Plain("  Obra nova  ".into()))),
            "Obra nova"
        );
        assert_eq!(safe_title(Some(&TitleField::Plain("   ".into()))), FALLBACK_TITLE);

        let mut map = HashMap::new();
        map.insert("pt_BR".to_string(), "Saúde na escola".to_string());
        map.insert("en_US".to_string(), "Health at school".to_string());
        assert_eq!(
            safe_title(Some(&TitleField::Localized(map))),
            "Saúde na escola"
        );

        let mut other = HashMap::new();
        other.insert("en_US".to_string(), "Health".to_string());
        assert_eq!(safe_title(Some(&TitleField::Localized(other))), FALLBACK_TITLE);

        assert_eq!(safe_title(None), FALLBACK_TITLE);
    }

    #[test]
    fn safe_date_parses_iso_and_defaults_to_now() {
        let parsed = safe_date(Some("2025-05-10T08:30:00Z"), now());
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 5, 10, 8, 30, 0).unwrap());

        let offset = safe_date(Some("2025-05-10T08:30:00-03:00"), now());
        assert_eq!(offset, Utc.with_ymd_and_hms(2025, 5, 10, 11, 30, 0).unwrap());

        assert_eq!(safe_date(Some("not-a-date"), now()), now());
        assert_eq!(safe_date(None, now()), now());
    }

    #[test]
    fn normalize_url_resolves_relative_against_base() {
        let b = base();
        assert_eq!(
            normalize_url(Some("/noticias/obra-nova"), &b).as_deref(),
            Some("https://prefeitura.sp.gov.br/noticias/obra-nova")
        );
        assert_eq!(
            normalize_url(Some("https://other.example/x"), &b).as_deref(),
            Some("https://other.example/x")
        );
        assert_eq!(normalize_url(Some(""), &b), None);
        assert_eq!(normalize_url(None, &b), None);
    }

    #[test]
    fn content_fields_extract_body_and_image_by_synonym() {
        let json = serde_json::json!([
            { "name": "chapeu", "contentFieldValue": { "data": "ignored" } },
            { "name": "Texto", "contentFieldValue": { "data": "corpo da notícia" } },
            { "name": "body", "contentFieldValue": { "data": "" } },
            { "name": "Imagem", "contentFieldValue": { "image": { "contentUrl": "/img/a.jpg" } } }
        ]);
        let fields: Vec<ContentField> = serde_json::from_value(json).expect("fields");

        let (content, image) = extract_content_fields(&fields, &base(), DEFAULT_IMAGE);
        // The empty later body value must not clobber the earlier one.
        assert_eq!(content, "corpo da notícia");
        assert_eq!(
            image.as_deref(),
            Some("https://prefeitura.sp.gov.br/img/a.jpg")
        );
    }

    #[test]
    fn image_field_without_url_falls_back_to_default() {
        let json = serde_json::json!([
            { "name": "imagem", "contentFieldValue": { "image": {} } }
        ]);
        let fields: Vec<ContentField> = serde_json::from_value(json).expect("fields");
        let (_, image) = extract_content_fields(&fields, &base(), DEFAULT_IMAGE);
        assert_eq!(image.as_deref(), Some(DEFAULT_IMAGE));
    }

    #[test]
    fn normalization_is_idempotent_for_dated_records() {
        let json = serde_json::json!({
            "title": { "pt_BR": "Nova UBS em Itaquera" },
            "contentUrl": "/noticias/nova-ubs",
            "datePublished": "2025-04-01T10:00:00Z",
            "contentFields": [
                { "name": "texto", "contentFieldValue": { "data": "Inauguração da unidade." } }
            ]
        });
        let raw: StructuredContent = serde_json::from_value(json).expect("record");

        let a = normalize_api_item(&raw, &base(), DEFAULT_IMAGE, now());
        let b = normalize_api_item(&raw, &base(), DEFAULT_IMAGE, now());

        assert_eq!(a.title, b.title);
        assert_eq!(a.link, b.link);
        assert_eq!(a.published, b.published);
        assert_eq!(a.content, b.content);
        assert_eq!(a.image_url, b.image_url);
        assert_eq!(a.link.as_deref(), Some("https://prefeitura.sp.gov.br/noticias/nova-ubs"));
    }

    #[test]
    fn dedup_key_prefers_link_then_title_hash() {
        let linked = NewsItem {
            title: "A".into(),
            link: Some("https://prefeitura.sp.gov.br/noticias/a".into()),
            published: now(),
            content: String::new(),
            image_url: DEFAULT_IMAGE.into(),
            origin: ItemOrigin::Api,
        };
        assert_eq!(linked.dedup_key(), "https://prefeitura.sp.gov.br/noticias/a");

        let linkless = NewsItem { link: None, ..linked.clone() };
        assert_eq!(linkless.dedup_key(), sha256_hex("A"));
        // Stable across calls.
        assert_eq!(linkless.dedup_key(), linkless.dedup_key());
    }
}
