//! SEO analyzer.
//!
//! Extracts the meta surface (title, description, canonical, Open Graph,
//! Twitter cards), takes heading/link/image censuses, pulls structured data
//! blocks, and composes a 0-100 score: meta 40 + content 40 + technical 20.

use crate::report::{to_dimension_map, AnalyzerMetadata};
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use url::Url;
use weblens_fetch::FetchedPage;
use weblens_types::DimensionMap;

const TITLE_MIN: usize = 30;
const TITLE_MAX: usize = 60;
const DESCRIPTION_MIN: usize = 120;
const DESCRIPTION_MAX: usize = 160;
const MIN_CONTENT_WORDS: usize = 300;

#[derive(Debug, Clone, Serialize)]
pub struct MetaTags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robots: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    pub open_graph: HashMap<String, String>,
    pub twitter_cards: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeadingCensus {
    pub h1: usize,
    pub h2: usize,
    pub h3: usize,
    pub h4: usize,
    pub h5: usize,
    pub h6: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkCensus {
    pub internal: usize,
    pub external: usize,
    pub nofollow: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageCensus {
    pub with_alt: usize,
    pub without_alt: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuredData {
    /// `@type` values from valid JSON-LD blocks
    pub json_ld_types: Vec<String>,
    pub json_ld_blocks: usize,
    pub invalid_json_ld_blocks: usize,
    pub microdata_itemtypes: Vec<String>,
    pub rdfa_typeof: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeoScore {
    pub total: f64,
    pub meta: f64,
    pub content: f64,
    pub technical: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeoReport {
    pub meta_tags: MetaTags,
    pub headings: HeadingCensus,
    pub links: LinkCensus,
    pub images: ImageCensus,
    pub structured_data: StructuredData,
    pub word_count: usize,
    pub warnings: Vec<String>,
    pub score: SeoScore,
    pub metadata: AnalyzerMetadata,
}

pub struct SeoAnalyzer;

impl SeoAnalyzer {
    pub fn analyze(page: &FetchedPage, user_agent: &str) -> SeoReport {
        let started = Instant::now();
        let document = Html::parse_document(&page.body);
        let mut warnings = Vec::new();

        let meta_tags = Self::extract_meta(&document);
        if let Some(title) = &meta_tags.title {
            let len = title.chars().count();
            if !(TITLE_MIN..=TITLE_MAX).contains(&len) {
                warnings.push(format!(
                    "title length {len} outside the recommended {TITLE_MIN}-{TITLE_MAX} range"
                ));
            }
        } else {
            warnings.push("missing <title>".to_string());
        }
        if let Some(description) = &meta_tags.description {
            let len = description.chars().count();
            if !(DESCRIPTION_MIN..=DESCRIPTION_MAX).contains(&len) {
                warnings.push(format!(
                    "meta description length {len} outside the recommended {DESCRIPTION_MIN}-{DESCRIPTION_MAX} range"
                ));
            }
        } else {
            warnings.push("missing meta description".to_string());
        }

        let headings = HeadingCensus {
            h1: count(&document, "h1"),
            h2: count(&document, "h2"),
            h3: count(&document, "h3"),
            h4: count(&document, "h4"),
            h5: count(&document, "h5"),
            h6: count(&document, "h6"),
        };
        if headings.h1 == 0 {
            warnings.push("page has no H1".to_string());
        } else if headings.h1 > 1 {
            warnings.push(format!("page has {} H1 elements", headings.h1));
        }

        let links = Self::census_links(&document, &page.url);
        let images = ImageCensus {
            with_alt: count(&document, "img[alt]"),
            without_alt: count(&document, "img:not([alt])"),
        };
        let structured_data = Self::extract_structured_data(&document);
        let word_count = Self::word_count(&document);

        let score = Self::score(&meta_tags, &headings, &links, &images, &structured_data, word_count);

        SeoReport {
            meta_tags,
            headings,
            links,
            images,
            structured_data,
            word_count,
            warnings,
            score,
            metadata: AnalyzerMetadata::since(started, &page.url, user_agent),
        }
    }

    pub fn dimension_map(page: &FetchedPage, user_agent: &str) -> Result<DimensionMap, serde_json::Error> {
        to_dimension_map(&Self::analyze(page, user_agent))
    }

    fn extract_meta(document: &Html) -> MetaTags {
        let title = select_first(document, "title")
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        let meta_content = |name: &str| -> Option<String> {
            let selector = Selector::parse(&format!("meta[name=\"{name}\"]")).ok()?;
            document
                .select(&selector)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
        };

        let keywords = meta_content("keywords")
            .map(|k| {
                k.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let canonical = Selector::parse("link[rel=\"canonical\"]")
            .ok()
            .and_then(|s| document.select(&s).next())
            .and_then(|el| el.value().attr("href"))
            .map(|href| href.to_string());

        let mut open_graph = HashMap::new();
        if let Ok(selector) = Selector::parse("meta[property^=\"og:\"]") {
            for el in document.select(&selector) {
                if let (Some(property), Some(content)) =
                    (el.value().attr("property"), el.value().attr("content"))
                {
                    if !content.is_empty() {
                        let key = property.strip_prefix("og:").unwrap_or(property);
                        open_graph.insert(key.to_string(), content.to_string());
                    }
                }
            }
        }

        let mut twitter_cards = HashMap::new();
        if let Ok(selector) = Selector::parse("meta[name^=\"twitter:\"]") {
            for el in document.select(&selector) {
                if let (Some(name), Some(content)) =
                    (el.value().attr("name"), el.value().attr("content"))
                {
                    if !content.is_empty() {
                        let key = name.strip_prefix("twitter:").unwrap_or(name);
                        twitter_cards.insert(key.to_string(), content.to_string());
                    }
                }
            }
        }

        MetaTags {
            title,
            description: meta_content("description"),
            keywords,
            viewport: meta_content("viewport"),
            robots: meta_content("robots"),
            canonical,
            open_graph,
            twitter_cards,
        }
    }

    fn census_links(document: &Html, page_url: &str) -> LinkCensus {
        let page_host = Url::parse(page_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()));

        let mut census = LinkCensus {
            internal: 0,
            external: 0,
            nofollow: 0,
        };
        let Ok(selector) = Selector::parse("a[href]") else {
            return census;
        };

        for el in document.select(&selector) {
            let href = el.value().attr("href").unwrap_or_default();
            if href.starts_with('#') || href.starts_with("javascript:") {
                continue;
            }
            let external = match Url::parse(href) {
                Ok(linked) => match (&page_host, linked.host_str()) {
                    (Some(page), Some(link)) => page != link,
                    _ => false,
                },
                // Relative links stay on the page's host.
                Err(_) => false,
            };
            if external {
                census.external += 1;
            } else {
                census.internal += 1;
            }
            if el
                .value()
                .attr("rel")
                .map_or(false, |rel| rel.split_whitespace().any(|r| r == "nofollow"))
            {
                census.nofollow += 1;
            }
        }
        census
    }

    fn extract_structured_data(document: &Html) -> StructuredData {
        let mut json_ld_types = Vec::new();
        let mut json_ld_blocks = 0;
        let mut invalid_json_ld_blocks = 0;

        if let Ok(selector) = Selector::parse("script[type=\"application/ld+json\"]") {
            for el in document.select(&selector) {
                let raw = el.text().collect::<String>();
                match serde_json::from_str::<serde_json::Value>(&raw) {
                    Ok(value) => {
                        json_ld_blocks += 1;
                        collect_ld_types(&value, &mut json_ld_types);
                    }
                    Err(_) => invalid_json_ld_blocks += 1,
                }
            }
        }

        let microdata_itemtypes = attr_values(document, "[itemtype]", "itemtype");
        let rdfa_typeof = attr_values(document, "[typeof]", "typeof");

        StructuredData {
            json_ld_types,
            json_ld_blocks,
            invalid_json_ld_blocks,
            microdata_itemtypes,
            rdfa_typeof,
        }
    }

    fn word_count(document: &Html) -> usize {
        let Ok(selector) = Selector::parse("body") else {
            return 0;
        };
        document
            .select(&selector)
            .next()
            .map(|body| body.text().collect::<String>().split_whitespace().count())
            .unwrap_or(0)
    }

    /// Fixed line items: meta 40 (title 10, title length 5, description 10,
    /// description length 5, canonical 5, viewport 5), content 40 (single H1
    /// 10, H2 present 5, alt coverage 10, internal links 5, word count 10),
    /// technical 20 (structured data 10, not noindex 5, Open Graph 5).
    fn score(
        meta: &MetaTags,
        headings: &HeadingCensus,
        links: &LinkCensus,
        images: &ImageCensus,
        structured: &StructuredData,
        word_count: usize,
    ) -> SeoScore {
        let mut meta_score = 0.0;
        if let Some(title) = &meta.title {
            meta_score += 10.0;
            if (TITLE_MIN..=TITLE_MAX).contains(&title.chars().count()) {
                meta_score += 5.0;
            }
        }
        if let Some(description) = &meta.description {
            meta_score += 10.0;
            if (DESCRIPTION_MIN..=DESCRIPTION_MAX).contains(&description.chars().count()) {
                meta_score += 5.0;
            }
        }
        if meta.canonical.is_some() {
            meta_score += 5.0;
        }
        if meta.viewport.is_some() {
            meta_score += 5.0;
        }

        let mut content_score = 0.0;
        if headings.h1 == 1 {
            content_score += 10.0;
        }
        if headings.h2 > 0 {
            content_score += 5.0;
        }
        let total_images = images.with_alt + images.without_alt;
        if total_images == 0 || images.with_alt as f64 / total_images as f64 >= 0.8 {
            content_score += 10.0;
        }
        if links.internal > 0 {
            content_score += 5.0;
        }
        if word_count >= MIN_CONTENT_WORDS {
            content_score += 10.0;
        }

        let mut technical_score = 0.0;
        if structured.json_ld_blocks > 0
            || !structured.microdata_itemtypes.is_empty()
            || !structured.rdfa_typeof.is_empty()
        {
            technical_score += 10.0;
        }
        let noindex = meta
            .robots
            .as_deref()
            .map_or(false, |r| r.to_lowercase().contains("noindex"));
        if !noindex {
            technical_score += 5.0;
        }
        if !meta.open_graph.is_empty() {
            technical_score += 5.0;
        }

        SeoScore {
            total: meta_score + content_score + technical_score,
            meta: meta_score,
            content: content_score,
            technical: technical_score,
        }
    }
}

fn collect_ld_types(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(t)) = map.get("@type") {
                out.push(t.clone());
            }
            for nested in map.values() {
                collect_ld_types(nested, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_ld_types(item, out);
            }
        }
        _ => {}
    }
}

fn count(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|s| document.select(&s).count())
        .unwrap_or(0)
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<scraper::ElementRef<'a>> {
    let parsed = Selector::parse(selector).ok()?;
    document.select(&parsed).next()
}

fn attr_values(document: &Html, selector: &str, attr: &str) -> Vec<String> {
    let Ok(parsed) = Selector::parse(selector) else {
        return Vec::new();
    };
    document
        .select(&parsed)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| v.to_string())
        .collect()
}
