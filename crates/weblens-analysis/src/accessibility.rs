//! Accessibility analyzer.
//!
//! Checks a fixed set of WCAG success criteria on static HTML, rates
//! alt-text quality, keyboard reachability and form labeling, and folds the
//! subscores into a weighted total. The color-contrast check is a heuristic
//! stub: real contrast needs computed styles, which static HTML cannot
//! provide, so it contributes a single synthetic data point.

use crate::report::{to_dimension_map, AnalyzerMetadata};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::time::Instant;
use weblens_fetch::FetchedPage;
use weblens_types::DimensionMap;

const WCAG_WEIGHT: f64 = 0.30;
const CONTRAST_WEIGHT: f64 = 0.20;
const ALT_WEIGHT: f64 = 0.20;
const KEYBOARD_WEIGHT: f64 = 0.15;
const FORM_WEIGHT: f64 = 0.15;

const ALT_TOO_SHORT: usize = 4;
const ALT_TOO_LONG: usize = 125;
const ALT_BAD_KEYWORDS: &[&str] = &["image", "picture", "photo", "graphic", "icon"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Pass,
    Violation,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Critical,
    Serious,
    Moderate,
    Minor,
}

#[derive(Debug, Clone, Serialize)]
pub struct WcagCheck {
    /// WCAG success criterion, e.g. "1.1.1"
    pub criterion: &'static str,
    pub description: &'static str,
    pub outcome: CheckOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<Impact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AltTextQuality {
    pub total_images: usize,
    pub missing_alt: usize,
    pub too_short: usize,
    pub too_long: usize,
    pub bad_keyword: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyboardChecks {
    pub focusable_elements: usize,
    pub positive_tabindex: usize,
    pub has_skip_link: bool,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormChecks {
    pub forms: usize,
    pub inputs: usize,
    pub labeled_inputs: usize,
    pub fieldsets: usize,
    pub required_fields: usize,
    pub has_error_signals: bool,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContrastCheck {
    /// Static-HTML heuristic only; flagged so consumers do not mistake it
    /// for a computed-style audit.
    pub heuristic: bool,
    pub checks_run: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessibilityReport {
    pub wcag_checks: Vec<WcagCheck>,
    pub wcag_score: f64,
    pub contrast: ContrastCheck,
    pub alt_text: AltTextQuality,
    pub keyboard: KeyboardChecks,
    pub forms: FormChecks,
    pub score: f64,
    pub metadata: AnalyzerMetadata,
}

pub struct AccessibilityAnalyzer;

impl AccessibilityAnalyzer {
    pub fn analyze(page: &FetchedPage, user_agent: &str) -> AccessibilityReport {
        let started = Instant::now();
        let document = Html::parse_document(&page.body);

        let wcag_checks = Self::wcag_checks(&document);
        let violations = wcag_checks
            .iter()
            .filter(|c| c.outcome == CheckOutcome::Violation)
            .count();
        let passes = wcag_checks
            .iter()
            .filter(|c| c.outcome == CheckOutcome::Pass)
            .count();
        let wcag_score = if passes + violations == 0 {
            100.0
        } else {
            100.0 * passes as f64 / (passes + violations) as f64
        };

        let contrast = ContrastCheck {
            heuristic: true,
            checks_run: 1,
            score: 80.0,
        };

        let alt_text = Self::alt_text_quality(&document);
        let keyboard = Self::keyboard_checks(&document);
        let forms = Self::form_checks(&document);

        let score = WCAG_WEIGHT * wcag_score
            + CONTRAST_WEIGHT * contrast.score
            + ALT_WEIGHT * alt_text.score
            + KEYBOARD_WEIGHT * keyboard.score
            + FORM_WEIGHT * forms.score;

        AccessibilityReport {
            wcag_checks,
            wcag_score,
            contrast,
            alt_text,
            keyboard,
            forms,
            score,
            metadata: AnalyzerMetadata::since(started, &page.url, user_agent),
        }
    }

    pub fn dimension_map(page: &FetchedPage, user_agent: &str) -> Result<DimensionMap, serde_json::Error> {
        to_dimension_map(&Self::analyze(page, user_agent))
    }

    fn wcag_checks(document: &Html) -> Vec<WcagCheck> {
        let mut checks = Vec::new();

        // 3.1.1: document language
        let lang = select_first(document, "html")
            .and_then(|el| el.value().attr("lang"))
            .map(str::trim)
            .filter(|l| !l.is_empty());
        checks.push(match lang {
            Some(_) => WcagCheck {
                criterion: "3.1.1",
                description: "document has a language attribute",
                outcome: CheckOutcome::Pass,
                impact: None,
                detail: None,
            },
            None => WcagCheck {
                criterion: "3.1.1",
                description: "document has a language attribute",
                outcome: CheckOutcome::Violation,
                impact: Some(Impact::Serious),
                detail: Some("<html> is missing a lang attribute".to_string()),
            },
        });

        // 2.4.2: page title
        let has_title = select_first(document, "title")
            .map(|el| !el.text().collect::<String>().trim().is_empty())
            .unwrap_or(false);
        checks.push(if has_title {
            WcagCheck {
                criterion: "2.4.2",
                description: "page has a title",
                outcome: CheckOutcome::Pass,
                impact: None,
                detail: None,
            }
        } else {
            WcagCheck {
                criterion: "2.4.2",
                description: "page has a title",
                outcome: CheckOutcome::Violation,
                impact: Some(Impact::Serious),
                detail: Some("missing or empty <title>".to_string()),
            }
        });

        // 1.1.1: image alternatives
        let missing_alt = count(document, "img:not([alt])");
        checks.push(if missing_alt == 0 {
            WcagCheck {
                criterion: "1.1.1",
                description: "images have text alternatives",
                outcome: CheckOutcome::Pass,
                impact: None,
                detail: None,
            }
        } else {
            WcagCheck {
                criterion: "1.1.1",
                description: "images have text alternatives",
                outcome: CheckOutcome::Violation,
                impact: Some(Impact::Critical),
                detail: Some(format!("{missing_alt} image(s) without alt")),
            }
        });

        // 3.3.2: inputs are labeled
        let (inputs, labeled) = Self::input_label_census(document);
        checks.push(if inputs == 0 || labeled == inputs {
            WcagCheck {
                criterion: "3.3.2",
                description: "form inputs have labels",
                outcome: CheckOutcome::Pass,
                impact: None,
                detail: None,
            }
        } else {
            WcagCheck {
                criterion: "3.3.2",
                description: "form inputs have labels",
                outcome: CheckOutcome::Violation,
                impact: Some(Impact::Serious),
                detail: Some(format!("{} of {inputs} input(s) unlabeled", inputs - labeled)),
            }
        });

        // 1.3.1: heading structure
        let h1_count = count(document, "h1");
        checks.push(match h1_count {
            1 => WcagCheck {
                criterion: "1.3.1",
                description: "page has exactly one H1",
                outcome: CheckOutcome::Pass,
                impact: None,
                detail: None,
            },
            0 => WcagCheck {
                criterion: "1.3.1",
                description: "page has exactly one H1",
                outcome: CheckOutcome::Warning,
                impact: Some(Impact::Moderate),
                detail: Some("no H1 found".to_string()),
            },
            n => WcagCheck {
                criterion: "1.3.1",
                description: "page has exactly one H1",
                outcome: CheckOutcome::Violation,
                impact: Some(Impact::Moderate),
                detail: Some(format!("{n} H1 elements found")),
            },
        });

        checks
    }

    /// Count inputs and how many of them are properly associated with a
    /// label: a `<label for=>` matching their id, an `aria-label`, or an
    /// `aria-labelledby`. The association is checked per input, not inferred
    /// from the mere presence of any label on the page.
    fn input_label_census(document: &Html) -> (usize, usize) {
        let label_targets: Vec<String> = attr_values(document, "label[for]", "for");

        let Ok(selector) = Selector::parse(
            "input:not([type=\"hidden\"]):not([type=\"submit\"]):not([type=\"button\"]), select, textarea",
        ) else {
            return (0, 0);
        };

        let mut inputs = 0;
        let mut labeled = 0;
        for el in document.select(&selector) {
            inputs += 1;
            let value = el.value();
            let by_for = value
                .attr("id")
                .map_or(false, |id| label_targets.iter().any(|t| t == id));
            let by_aria = value
                .attr("aria-label")
                .map_or(false, |l| !l.trim().is_empty())
                || value.attr("aria-labelledby").is_some();
            let by_wrapping = wrapped_in_label(&el);
            if by_for || by_aria || by_wrapping {
                labeled += 1;
            }
        }
        (inputs, labeled)
    }

    fn alt_text_quality(document: &Html) -> AltTextQuality {
        let total_images = count(document, "img");
        let missing_alt = count(document, "img:not([alt])");

        let mut too_short = 0;
        let mut too_long = 0;
        let mut bad_keyword = 0;

        if let Ok(selector) = Selector::parse("img[alt]") {
            for el in document.select(&selector) {
                let alt = el.value().attr("alt").unwrap_or_default().trim();
                if alt.is_empty() {
                    // Empty alt marks a decorative image; not a quality issue.
                    continue;
                }
                let len = alt.chars().count();
                if len < ALT_TOO_SHORT {
                    too_short += 1;
                }
                if len > ALT_TOO_LONG {
                    too_long += 1;
                }
                let lower = alt.to_lowercase();
                if ALT_BAD_KEYWORDS.iter().any(|kw| lower.split_whitespace().any(|w| w == *kw)) {
                    bad_keyword += 1;
                }
            }
        }

        let issues = missing_alt * 2 + too_short + too_long + bad_keyword;
        let score = if total_images == 0 {
            100.0
        } else {
            (100.0 - 10.0 * issues as f64).max(0.0)
        };

        AltTextQuality {
            total_images,
            missing_alt,
            too_short,
            too_long,
            bad_keyword,
            score,
        }
    }

    fn keyboard_checks(document: &Html) -> KeyboardChecks {
        let focusable = count(
            document,
            "a[href], button, input:not([type=\"hidden\"]), select, textarea, [tabindex]",
        );

        let positive_tabindex = attr_values(document, "[tabindex]", "tabindex")
            .iter()
            .filter_map(|v| v.parse::<i32>().ok())
            .filter(|v| *v > 0)
            .count();

        let has_skip_link = Selector::parse("a[href^=\"#\"]")
            .ok()
            .map(|s| {
                document.select(&s).any(|el| {
                    el.text()
                        .collect::<String>()
                        .to_lowercase()
                        .contains("skip")
                })
            })
            .unwrap_or(false);

        let mut score: f64 = 100.0;
        score -= 15.0 * positive_tabindex.min(4) as f64;
        if !has_skip_link && focusable > 20 {
            score -= 10.0;
        }

        KeyboardChecks {
            focusable_elements: focusable,
            positive_tabindex,
            has_skip_link,
            score: score.max(0.0),
        }
    }

    fn form_checks(document: &Html) -> FormChecks {
        let forms = count(document, "form");
        let (inputs, labeled_inputs) = Self::input_label_census(document);
        let fieldsets = count(document, "fieldset");
        let required_fields = count(document, "[required], [aria-required=\"true\"]");
        let has_error_signals =
            count(document, "[aria-live], [role=\"alert\"], [aria-invalid]") > 0;

        let score = if inputs == 0 {
            100.0
        } else {
            let mut s = 100.0 * labeled_inputs as f64 / inputs as f64;
            if inputs > 5 && fieldsets == 0 {
                s -= 10.0;
            }
            if required_fields > 0 && !has_error_signals {
                s -= 5.0;
            }
            s.max(0.0)
        };

        FormChecks {
            forms,
            inputs,
            labeled_inputs,
            fieldsets,
            required_fields,
            has_error_signals,
            score,
        }
    }
}

fn wrapped_in_label(el: &ElementRef) -> bool {
    let mut parent = el.parent();
    while let Some(node) = parent {
        if let Some(element) = node.value().as_element() {
            if element.name() == "label" {
                return true;
            }
            if element.name() == "form" || element.name() == "body" {
                break;
            }
        }
        parent = node.parent();
    }
    false
}

fn count(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|s| document.select(&s).count())
        .unwrap_or(0)
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use weblens_fetch::FetchTimings;

    fn page(body: &str) -> FetchedPage {
        FetchedPage {
            url: "https://example.com/".to_string(),
            status: 200,
            headers: HashMap::new(),
            body: body.to_string(),
            timings: FetchTimings {
                total_ms: 50.0,
                ..FetchTimings::default()
            },
        }
    }

    fn check<'a>(report: &'a AccessibilityReport, criterion: &str) -> &'a WcagCheck {
        report
            .wcag_checks
            .iter()
            .find(|c| c.criterion == criterion)
            .expect("criterion present")
    }

    #[test]
    fn clean_page_passes_all_wcag_checks() {
        let html = r#"<html lang="en"><head><title>Fine page</title></head>
            <body><h1>One heading</h1>
            <img src="/a.png" alt="a clear architecture diagram">
            </body></html>"#;
        let report = AccessibilityAnalyzer::analyze(&page(html), "ua");

        assert!(report
            .wcag_checks
            .iter()
            .all(|c| c.outcome == CheckOutcome::Pass));
        assert_eq!(report.wcag_score, 100.0);
    }

    #[test]
    fn missing_lang_and_alt_are_violations() {
        let html = r#"<html><head><title>t</title></head>
            <body><h1>h</h1><img src="/a.png"></body></html>"#;
        let report = AccessibilityAnalyzer::analyze(&page(html), "ua");

        assert_eq!(check(&report, "3.1.1").outcome, CheckOutcome::Violation);
        let alt = check(&report, "1.1.1");
        assert_eq!(alt.outcome, CheckOutcome::Violation);
        assert_eq!(alt.impact, Some(Impact::Critical));
    }

    #[test]
    fn zero_h1_is_warning_not_violation() {
        let html = r#"<html lang="en"><head><title>t</title></head><body><p>x</p></body></html>"#;
        let report = AccessibilityAnalyzer::analyze(&page(html), "ua");
        assert_eq!(check(&report, "1.3.1").outcome, CheckOutcome::Warning);

        // Warnings do not drag the pass ratio down.
        assert_eq!(report.wcag_score, 100.0);
    }

    #[test]
    fn label_association_is_per_input() {
        // One labeled input does not excuse the unlabeled one next to it.
        let html = r#"<html lang="en"><head><title>t</title></head><body>
            <form>
              <label for="name">Name</label><input id="name" type="text">
              <input id="email" type="text">
            </form></body></html>"#;
        let report = AccessibilityAnalyzer::analyze(&page(html), "ua");

        let labels = check(&report, "3.3.2");
        assert_eq!(labels.outcome, CheckOutcome::Violation);
        assert_eq!(report.forms.inputs, 2);
        assert_eq!(report.forms.labeled_inputs, 1);
    }

    #[test]
    fn aria_and_wrapping_labels_count() {
        let html = r#"<html lang="en"><head><title>t</title></head><body>
            <form>
              <input type="text" aria-label="Search term">
              <label>Age <input type="number"></label>
            </form></body></html>"#;
        let report = AccessibilityAnalyzer::analyze(&page(html), "ua");
        assert_eq!(check(&report, "3.3.2").outcome, CheckOutcome::Pass);
    }

    #[test]
    fn alt_quality_buckets() {
        let html = r#"<html lang="en"><head><title>t</title></head><body>
            <img src="a" alt="ok descriptive text">
            <img src="b" alt="x">
            <img src="c" alt="photo of a thing">
            <img src="d" alt="">
        </body></html>"#;
        let report = AccessibilityAnalyzer::analyze(&page(html), "ua");

        assert_eq!(report.alt_text.too_short, 1);
        assert_eq!(report.alt_text.bad_keyword, 1);
        assert_eq!(report.alt_text.missing_alt, 0);
        assert!(report.alt_text.score < 100.0);
    }

    #[test]
    fn positive_tabindex_is_penalized() {
        let html = r#"<html lang="en"><head><title>t</title></head><body>
            <h1>h</h1><div tabindex="3">x</div><div tabindex="0">y</div></body></html>"#;
        let report = AccessibilityAnalyzer::analyze(&page(html), "ua");

        assert_eq!(report.keyboard.positive_tabindex, 1);
        assert_eq!(report.keyboard.score, 85.0);
    }

    #[test]
    fn contrast_is_a_declared_stub() {
        let report = AccessibilityAnalyzer::analyze(&page("<html></html>"), "ua");
        assert!(report.contrast.heuristic);
        assert_eq!(report.contrast.checks_run, 1);
    }

    #[test]
    fn total_is_the_weighted_sum() {
        let html = r#"<html lang="en"><head><title>Fine</title></head>
            <body><h1>One</h1></body></html>"#;
        let report = AccessibilityAnalyzer::analyze(&page(html), "ua");
        let expected = 0.30 * report.wcag_score
            + 0.20 * report.contrast.score
            + 0.20 * report.alt_text.score
            + 0.15 * report.keyboard.score
            + 0.15 * report.forms.score;
        assert!((report.score - expected).abs() < 1e-9);
    }
}
