//! Performance analyzer.
//!
//! Estimates page weight and Core Web Vitals from static HTML and the fetch
//! timings. No headless browser is involved; every number here is a
//! heuristic with fixed, documented thresholds.

use crate::report::{to_dimension_map, AnalyzerMetadata, Rating};
use scraper::{Html, Selector};
use serde::Serialize;
use std::time::Instant;
use weblens_fetch::FetchedPage;
use weblens_types::DimensionMap;

const CSS_ESTIMATE_BYTES: u64 = 15 * 1024;
const JS_ESTIMATE_BYTES: u64 = 25 * 1024;
const IMAGE_ESTIMATE_BYTES: u64 = 50 * 1024;

// Core Web Vital thresholds (good / poor boundaries).
const FCP_GOOD_MS: f64 = 1800.0;
const FCP_POOR_MS: f64 = 3000.0;
const LCP_GOOD_MS: f64 = 2500.0;
const LCP_POOR_MS: f64 = 4000.0;
const CLS_GOOD: f64 = 0.1;
const CLS_POOR: f64 = 0.25;
const FID_GOOD_MS: f64 = 100.0;
const FID_POOR_MS: f64 = 300.0;

#[derive(Debug, Clone, Serialize)]
pub struct ResourceCounts {
    pub css: usize,
    pub js: usize,
    pub images: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VitalEstimate {
    pub value: f64,
    pub rating: Rating,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoreWebVitals {
    pub fcp_ms: VitalEstimate,
    pub lcp_ms: VitalEstimate,
    pub cls: VitalEstimate,
    pub fid_ms: VitalEstimate,
}

#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub priority: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationScore {
    pub score: f64,
    pub images_score: f64,
    pub css_score: f64,
    pub js_score: f64,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub load_time_ms: f64,
    pub resources: ResourceCounts,
    pub estimated_total_size_bytes: u64,
    pub html_size_bytes: u64,
    pub core_web_vitals: CoreWebVitals,
    pub optimization: OptimizationScore,
    pub metadata: AnalyzerMetadata,
}

pub struct PerformanceAnalyzer;

impl PerformanceAnalyzer {
    pub fn analyze(page: &FetchedPage, user_agent: &str) -> PerformanceReport {
        let started = Instant::now();
        let document = Html::parse_document(&page.body);

        let css = count(&document, "link[rel=\"stylesheet\"]");
        let js = count(&document, "script[src]");
        let images = count(&document, "img");
        let resources = ResourceCounts {
            css,
            js,
            images,
            total: css + js + images,
        };

        let html_size = page.body.len() as u64;
        let estimated_total_size = html_size
            + CSS_ESTIMATE_BYTES * css as u64
            + JS_ESTIMATE_BYTES * js as u64
            + IMAGE_ESTIMATE_BYTES * images as u64;

        let server_ms = page.timings.server_ms.unwrap_or(0.0);
        let total_ms = page.timings.total_ms;

        let fcp = server_ms + html_size as f64 / 10_000.0;
        let lcp = total_ms + 100.0 * resources.total as f64;
        let cls = 0.05 * images as f64 + if css == 0 { 0.1 } else { 0.0 };
        let fid = 20.0 * js as f64;

        let core_web_vitals = CoreWebVitals {
            fcp_ms: VitalEstimate {
                value: fcp,
                rating: Rating::from_thresholds(fcp, FCP_GOOD_MS, FCP_POOR_MS),
            },
            lcp_ms: VitalEstimate {
                value: lcp,
                rating: Rating::from_thresholds(lcp, LCP_GOOD_MS, LCP_POOR_MS),
            },
            cls: VitalEstimate {
                value: cls,
                rating: Rating::from_thresholds(cls, CLS_GOOD, CLS_POOR),
            },
            fid_ms: VitalEstimate {
                value: fid,
                rating: Rating::from_thresholds(fid, FID_GOOD_MS, FID_POOR_MS),
            },
        };

        let optimization = Self::score_optimization(page, &document, &resources);

        PerformanceReport {
            load_time_ms: total_ms,
            resources,
            estimated_total_size_bytes: estimated_total_size,
            html_size_bytes: html_size,
            core_web_vitals,
            optimization,
            metadata: AnalyzerMetadata::since(started, &page.url, user_agent),
        }
    }

    pub fn dimension_map(page: &FetchedPage, user_agent: &str) -> Result<DimensionMap, serde_json::Error> {
        to_dimension_map(&Self::analyze(page, user_agent))
    }

    fn score_optimization(
        page: &FetchedPage,
        document: &Html,
        resources: &ResourceCounts,
    ) -> OptimizationScore {
        let mut suggestions = Vec::new();
        let body_lower = page.body.to_lowercase();

        // Image subscore: legacy formats, missing modern formats, sheer count.
        let mut images_score: f64 = 100.0;
        static LEGACY_IMAGE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| {
                regex::Regex::new(r"\.(?:bmp|tiff?)\b").expect("static pattern")
            });
        let legacy_formats = LEGACY_IMAGE.find_iter(&body_lower).count();
        if legacy_formats > 0 {
            images_score -= 15.0 * legacy_formats.min(3) as f64;
            suggestions.push(Suggestion {
                priority: "high",
                message: format!("Replace {legacy_formats} legacy-format image(s) (BMP/TIFF) with WebP or AVIF"),
            });
        }
        let has_modern_format = body_lower.contains(".webp") || body_lower.contains(".avif");
        if resources.images > 3 && !has_modern_format {
            images_score -= 20.0;
            suggestions.push(Suggestion {
                priority: "medium",
                message: "Serve images in a modern format (WebP/AVIF)".to_string(),
            });
        }
        if resources.images > 20 {
            images_score -= 10.0;
            suggestions.push(Suggestion {
                priority: "medium",
                message: format!("Page references {} images; consider lazy loading", resources.images),
            });
        }

        // CSS subscore: inline style attributes, stylesheet count, compression.
        let mut css_score: f64 = 100.0;
        let inline_styles = count(document, "[style]");
        if inline_styles > 10 {
            css_score -= 2.0 * inline_styles.min(25) as f64;
            suggestions.push(Suggestion {
                priority: "low",
                message: format!("{inline_styles} elements carry inline style attributes; move styles into stylesheets"),
            });
        }
        if resources.css > 8 {
            css_score -= 10.0;
            suggestions.push(Suggestion {
                priority: "medium",
                message: format!("{} stylesheets on one page; bundle them", resources.css),
            });
        }
        if !page.headers.contains_key("content-encoding") {
            css_score -= 15.0;
            suggestions.push(Suggestion {
                priority: "high",
                message: "Response is served without compression; enable gzip or brotli".to_string(),
            });
        }

        // JS subscore: render-blocking head scripts, jQuery, script count.
        let mut js_score: f64 = 100.0;
        let blocking_head_scripts = count(document, "head script[src]:not([async]):not([defer])");
        if blocking_head_scripts > 0 {
            js_score -= 15.0 * blocking_head_scripts.min(4) as f64;
            suggestions.push(Suggestion {
                priority: "high",
                message: format!("{blocking_head_scripts} render-blocking script(s) in <head>; add defer or async"),
            });
        }
        if body_lower.contains("jquery") {
            js_score -= 10.0;
            suggestions.push(Suggestion {
                priority: "low",
                message: "jQuery detected; modern DOM APIs may remove the dependency".to_string(),
            });
        }
        if resources.js > 10 {
            js_score -= 5.0;
            suggestions.push(Suggestion {
                priority: "medium",
                message: format!("{} external scripts; bundle or trim them", resources.js),
            });
        }

        let images_score = images_score.max(0.0);
        let css_score = css_score.max(0.0);
        let js_score = js_score.max(0.0);
        let score = (images_score + css_score + js_score) / 3.0;

        let rank = |p: &str| match p {
            "high" => 0,
            "medium" => 1,
            _ => 2,
        };
        suggestions.sort_by_key(|s| rank(s.priority));

        OptimizationScore {
            score,
            images_score,
            css_score,
            js_score,
            suggestions,
        }
    }
}

fn count(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|s| document.select(&s).count())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use weblens_fetch::FetchTimings;

    fn page(body: &str, server_ms: f64, total_ms: f64) -> FetchedPage {
        FetchedPage {
            url: "https://example.com/".to_string(),
            status: 200,
            headers: HashMap::from([(
                "content-encoding".to_string(),
                "gzip".to_string(),
            )]),
            body: body.to_string(),
            timings: FetchTimings {
                server_ms: Some(server_ms),
                total_ms,
                ..FetchTimings::default()
            },
        }
    }

    #[test]
    fn counts_resources() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/a.css">
            <link rel="stylesheet" href="/b.css">
            <script src="/app.js"></script>
        </head><body><img src="/x.png"><img src="/y.png"><img src="/z.png"></body></html>"#;
        let report = PerformanceAnalyzer::analyze(&page(html, 100.0, 200.0), "ua");

        assert_eq!(report.resources.css, 2);
        assert_eq!(report.resources.js, 1);
        assert_eq!(report.resources.images, 3);
        assert_eq!(report.resources.total, 6);

        let expected_size = html.len() as u64 + 2 * 15 * 1024 + 25 * 1024 + 3 * 50 * 1024;
        assert_eq!(report.estimated_total_size_bytes, expected_size);
    }

    #[test]
    fn vitals_follow_the_formulas() {
        let html = "<html><body>x</body></html>";
        let report = PerformanceAnalyzer::analyze(&page(html, 500.0, 1000.0), "ua");

        let expected_fcp = 500.0 + html.len() as f64 / 10_000.0;
        assert!((report.core_web_vitals.fcp_ms.value - expected_fcp).abs() < 0.001);
        assert_eq!(report.core_web_vitals.fcp_ms.rating, Rating::Good);

        // No resources: LCP = total_ms.
        assert!((report.core_web_vitals.lcp_ms.value - 1000.0).abs() < 0.001);

        // No images but also no css: CLS gets the missing-stylesheet bump.
        assert!((report.core_web_vitals.cls.value - 0.1).abs() < 0.001);
        assert_eq!(report.core_web_vitals.cls.rating, Rating::Good);

        assert_eq!(report.core_web_vitals.fid_ms.value, 0.0);
    }

    #[test]
    fn slow_server_rates_poor() {
        let report = PerformanceAnalyzer::analyze(&page("<html></html>", 3500.0, 5000.0), "ua");
        assert_eq!(report.core_web_vitals.fcp_ms.rating, Rating::Poor);
    }

    #[test]
    fn render_blocking_scripts_are_penalized() {
        let html = r#"<html><head>
            <script src="/one.js"></script>
            <script src="/two.js"></script>
            <script src="/ok.js" defer></script>
        </head><body></body></html>"#;
        let report = PerformanceAnalyzer::analyze(&page(html, 10.0, 20.0), "ua");

        assert!(report.optimization.js_score <= 70.0);
        assert!(report
            .optimization
            .suggestions
            .iter()
            .any(|s| s.message.contains("render-blocking")));
    }

    #[test]
    fn uncompressed_response_is_flagged() {
        let mut p = page("<html></html>", 10.0, 20.0);
        p.headers.clear();
        let report = PerformanceAnalyzer::analyze(&p, "ua");
        assert!(report
            .optimization
            .suggestions
            .iter()
            .any(|s| s.message.contains("compression")));
    }

    #[test]
    fn suggestions_are_priority_ordered() {
        let html = r#"<html><head><script src="/a.js"></script></head>
            <body><img src="a.png"><img src="b.png"><img src="c.png"><img src="d.png">
            <script>var jquery = window.jQuery;</script></body></html>"#;
        let mut p = page(html, 10.0, 20.0);
        p.headers.clear();
        let report = PerformanceAnalyzer::analyze(&p, "ua");

        let priorities: Vec<&str> = report
            .optimization
            .suggestions
            .iter()
            .map(|s| s.priority)
            .collect();
        let mut sorted = priorities.clone();
        sorted.sort_by_key(|p| match *p {
            "high" => 0,
            "medium" => 1,
            _ => 2,
        });
        assert_eq!(priorities, sorted);
    }
}
