//! Security analyzer.
//!
//! Scores the transport (HTTPS), the response security headers, and a set of
//! pattern-based vulnerability detectors over the HTML body. Certificate
//! inspection is out of reach without a TLS probe and stays a stub field.

use crate::report::{to_dimension_map, AnalyzerMetadata};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use weblens_fetch::FetchedPage;
use weblens_types::DimensionMap;

const HTTPS_WEIGHT: f64 = 0.4;
const HEADERS_WEIGHT: f64 = 0.4;
const VULNERABILITY_WEIGHT: f64 = 0.2;

/// One year in seconds; the conventional HSTS max-age floor.
const HSTS_MIN_MAX_AGE: u64 = 31_536_000;

#[derive(Debug, Clone, Serialize)]
pub struct HeaderCheck {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub score: f64,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    fn penalty(&self) -> f64 {
        match self {
            Severity::High => 25.0,
            Severity::Medium => 15.0,
            Severity::Low => 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VulnerabilityFinding {
    pub id: &'static str,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HttpsCheck {
    pub is_https: bool,
    pub score: f64,
    /// Populated only when a real TLS probe is wired in.
    pub certificate: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub https: HttpsCheck,
    pub headers: HashMap<String, HeaderCheck>,
    pub headers_score: f64,
    pub vulnerabilities: Vec<VulnerabilityFinding>,
    pub vulnerability_score: f64,
    pub score: f64,
    pub metadata: AnalyzerMetadata,
}

static SECRET_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(api[_-]?key|secret|password|token)\b\s*[:=]\s*["'][^"']{8,}["']"#)
        .expect("static pattern")
});

static MIXED_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:src|href)\s*=\s*["']http://"#).expect("static pattern")
});

pub struct SecurityAnalyzer;

impl SecurityAnalyzer {
    pub fn analyze(page: &FetchedPage, user_agent: &str) -> SecurityReport {
        let started = Instant::now();
        let document = Html::parse_document(&page.body);

        let is_https = page.url.starts_with("https://");
        let https = HttpsCheck {
            is_https,
            score: if is_https { 100.0 } else { 0.0 },
            certificate: None,
        };

        let headers = Self::check_headers(&page.headers);
        let headers_score =
            headers.values().map(|c| c.score).sum::<f64>() / headers.len() as f64;

        let vulnerabilities = Self::detect_vulnerabilities(page, &document, is_https);
        let vulnerability_score = (100.0
            - vulnerabilities
                .iter()
                .map(|v| v.severity.penalty())
                .sum::<f64>())
        .max(0.0);

        let score = HTTPS_WEIGHT * https.score
            + HEADERS_WEIGHT * headers_score
            + VULNERABILITY_WEIGHT * vulnerability_score;

        SecurityReport {
            https,
            headers,
            headers_score,
            vulnerabilities,
            vulnerability_score,
            score,
            metadata: AnalyzerMetadata::since(started, &page.url, user_agent),
        }
    }

    pub fn dimension_map(page: &FetchedPage, user_agent: &str) -> Result<DimensionMap, serde_json::Error> {
        to_dimension_map(&Self::analyze(page, user_agent))
    }

    fn check_headers(headers: &HashMap<String, String>) -> HashMap<String, HeaderCheck> {
        let mut checks = HashMap::new();
        checks.insert(
            "strict-transport-security".to_string(),
            Self::check_hsts(headers.get("strict-transport-security")),
        );
        checks.insert(
            "content-security-policy".to_string(),
            Self::check_csp(headers.get("content-security-policy")),
        );
        checks.insert(
            "x-frame-options".to_string(),
            Self::check_frame_options(headers.get("x-frame-options")),
        );
        checks.insert(
            "x-content-type-options".to_string(),
            Self::check_content_type_options(headers.get("x-content-type-options")),
        );
        checks.insert(
            "x-xss-protection".to_string(),
            Self::check_presence(
                headers.get("x-xss-protection"),
                "Set X-XSS-Protection: 1; mode=block for legacy browsers",
            ),
        );
        checks.insert(
            "referrer-policy".to_string(),
            Self::check_referrer_policy(headers.get("referrer-policy")),
        );
        checks.insert(
            "permissions-policy".to_string(),
            Self::check_presence(
                headers.get("permissions-policy"),
                "Declare a Permissions-Policy to restrict powerful browser features",
            ),
        );
        checks.insert(
            "expect-ct".to_string(),
            Self::check_presence(
                headers.get("expect-ct"),
                "Expect-CT signals certificate transparency enforcement",
            ),
        );
        checks
    }

    fn check_hsts(value: Option<&String>) -> HeaderCheck {
        let Some(value) = value else {
            return Self::absent("Add Strict-Transport-Security with max-age of at least one year");
        };

        let mut score: f64 = 100.0;
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let max_age = value
            .split(';')
            .map(str::trim)
            .find_map(|directive| directive.strip_prefix("max-age="))
            .and_then(|v| v.parse::<u64>().ok());
        match max_age {
            Some(age) if age < HSTS_MIN_MAX_AGE => {
                score -= 30.0;
                issues.push(format!("max-age {age} is below one year"));
            }
            None => {
                score -= 40.0;
                issues.push("missing max-age directive".to_string());
            }
            _ => {}
        }
        if !value.to_lowercase().contains("includesubdomains") {
            score -= 10.0;
            recommendations.push("Add includeSubDomains".to_string());
        }

        HeaderCheck {
            present: true,
            value: Some(value.clone()),
            score: score.max(0.0),
            issues,
            recommendations,
        }
    }

    fn check_csp(value: Option<&String>) -> HeaderCheck {
        let Some(value) = value else {
            return Self::absent("Add a Content-Security-Policy header");
        };

        let mut score: f64 = 100.0;
        let mut issues = Vec::new();
        let lower = value.to_lowercase();

        if lower.contains("'unsafe-inline'") {
            score -= 20.0;
            issues.push("policy allows 'unsafe-inline'".to_string());
        }
        if lower.contains("'unsafe-eval'") {
            score -= 20.0;
            issues.push("policy allows 'unsafe-eval'".to_string());
        }
        if lower
            .split(';')
            .any(|directive| directive.split_whitespace().any(|src| src == "*"))
        {
            score -= 10.0;
            issues.push("policy contains a wildcard source".to_string());
        }
        if !lower.contains("default-src") {
            score -= 10.0;
            issues.push("no default-src directive".to_string());
        }

        HeaderCheck {
            present: true,
            value: Some(value.clone()),
            score: score.max(0.0),
            issues,
            recommendations: Vec::new(),
        }
    }

    fn check_frame_options(value: Option<&String>) -> HeaderCheck {
        let Some(value) = value else {
            return Self::absent("Add X-Frame-Options: DENY or SAMEORIGIN");
        };
        let upper = value.to_uppercase();
        let (score, issues) = if upper == "DENY" || upper == "SAMEORIGIN" {
            (100.0, Vec::new())
        } else {
            (50.0, vec![format!("unexpected value: {value}")])
        };
        HeaderCheck {
            present: true,
            value: Some(value.clone()),
            score,
            issues,
            recommendations: Vec::new(),
        }
    }

    fn check_content_type_options(value: Option<&String>) -> HeaderCheck {
        let Some(value) = value else {
            return Self::absent("Add X-Content-Type-Options: nosniff");
        };
        let (score, issues) = if value.eq_ignore_ascii_case("nosniff") {
            (100.0, Vec::new())
        } else {
            (0.0, vec![format!("value must be nosniff, got {value}")])
        };
        HeaderCheck {
            present: true,
            value: Some(value.clone()),
            score,
            issues,
            recommendations: Vec::new(),
        }
    }

    fn check_referrer_policy(value: Option<&String>) -> HeaderCheck {
        let Some(value) = value else {
            return Self::absent("Add a Referrer-Policy header");
        };
        let strong = [
            "no-referrer",
            "same-origin",
            "strict-origin",
            "strict-origin-when-cross-origin",
        ];
        let lower = value.to_lowercase();
        let (score, issues) = if strong.contains(&lower.as_str()) {
            (100.0, Vec::new())
        } else {
            (50.0, vec![format!("weak policy: {value}")])
        };
        HeaderCheck {
            present: true,
            value: Some(value.clone()),
            score,
            issues,
            recommendations: Vec::new(),
        }
    }

    fn check_presence(value: Option<&String>, recommendation: &str) -> HeaderCheck {
        match value {
            Some(value) => HeaderCheck {
                present: true,
                value: Some(value.clone()),
                score: 100.0,
                issues: Vec::new(),
                recommendations: Vec::new(),
            },
            None => Self::absent(recommendation),
        }
    }

    fn absent(recommendation: &str) -> HeaderCheck {
        HeaderCheck {
            present: false,
            value: None,
            score: 0.0,
            issues: Vec::new(),
            recommendations: vec![recommendation.to_string()],
        }
    }

    fn detect_vulnerabilities(
        page: &FetchedPage,
        document: &Html,
        is_https: bool,
    ) -> Vec<VulnerabilityFinding> {
        let mut findings = Vec::new();

        let inline_scripts = Selector::parse("script:not([src])")
            .map(|s| {
                document
                    .select(&s)
                    .filter(|el| !el.text().collect::<String>().trim().is_empty())
                    .count()
            })
            .unwrap_or(0);
        if inline_scripts > 0 {
            findings.push(VulnerabilityFinding {
                id: "inline-script",
                severity: Severity::Low,
                description: format!("{inline_scripts} inline script block(s) present"),
            });
        }

        if let Ok(form_selector) = Selector::parse("form") {
            let input_selector = Selector::parse("input").expect("static selector");
            let unprotected = document
                .select(&form_selector)
                .filter(|form| {
                    form.value()
                        .attr("method")
                        .map_or(false, |m| m.eq_ignore_ascii_case("post"))
                })
                .filter(|form| {
                    !form.select(&input_selector).any(|input| {
                        input.value().attr("name").map_or(false, |name| {
                            let lower = name.to_lowercase();
                            lower.contains("csrf") || lower.contains("token")
                        })
                    })
                })
                .count();
            if unprotected > 0 {
                findings.push(VulnerabilityFinding {
                    id: "form-without-csrf",
                    severity: Severity::Medium,
                    description: format!("{unprotected} POST form(s) without a CSRF token field"),
                });
            }
        }

        let unsafe_password_inputs = Selector::parse("input[type=\"password\"]")
            .map(|s| {
                document
                    .select(&s)
                    .filter(|el| {
                        !matches!(
                            el.value().attr("autocomplete"),
                            Some("current-password") | Some("new-password") | Some("off")
                        )
                    })
                    .count()
            })
            .unwrap_or(0);
        if unsafe_password_inputs > 0 {
            findings.push(VulnerabilityFinding {
                id: "password-autocomplete",
                severity: Severity::Medium,
                description: format!(
                    "{unsafe_password_inputs} password input(s) without a safe autocomplete value"
                ),
            });
        }

        if SECRET_ASSIGNMENT.is_match(&page.body) {
            findings.push(VulnerabilityFinding {
                id: "hardcoded-secret",
                severity: Severity::High,
                description: "literal credential assignment found in page source".to_string(),
            });
        }

        if is_https && MIXED_CONTENT.is_match(&page.body) {
            findings.push(VulnerabilityFinding {
                id: "mixed-content",
                severity: Severity::High,
                description: "HTTPS page references http:// resources".to_string(),
            });
        }

        let has_frame_protection = page.headers.contains_key("x-frame-options")
            || page
                .headers
                .get("content-security-policy")
                .map_or(false, |csp| csp.to_lowercase().contains("frame-ancestors"));
        if !has_frame_protection {
            findings.push(VulnerabilityFinding {
                id: "clickjacking",
                severity: Severity::Medium,
                description: "no clickjacking protection (X-Frame-Options or frame-ancestors)"
                    .to_string(),
            });
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weblens_fetch::FetchTimings;

    fn page(url: &str, headers: &[(&str, &str)], body: &str) -> FetchedPage {
        FetchedPage {
            url: url.to_string(),
            status: 200,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_string(),
            timings: FetchTimings {
                total_ms: 10.0,
                ..FetchTimings::default()
            },
        }
    }

    const HARDENED: &[(&str, &str)] = &[
        ("strict-transport-security", "max-age=63072000; includeSubDomains"),
        ("content-security-policy", "default-src 'self'; frame-ancestors 'none'"),
        ("x-frame-options", "DENY"),
        ("x-content-type-options", "nosniff"),
        ("x-xss-protection", "1; mode=block"),
        ("referrer-policy", "strict-origin-when-cross-origin"),
        ("permissions-policy", "camera=(), microphone=()"),
        ("expect-ct", "max-age=86400"),
    ];

    #[test]
    fn hardened_page_scores_high() {
        let report =
            SecurityAnalyzer::analyze(&page("https://example.com/", HARDENED, "<html></html>"), "ua");

        assert!(report.https.is_https);
        assert_eq!(report.headers_score, 100.0);
        assert!(report.vulnerabilities.is_empty());
        assert_eq!(report.score, 100.0);
    }

    #[test]
    fn plain_http_zeroes_the_transport_score() {
        let report =
            SecurityAnalyzer::analyze(&page("http://example.com/", HARDENED, "<html></html>"), "ua");
        assert!(!report.https.is_https);
        assert_eq!(report.https.score, 0.0);
        assert!(report.score <= 60.0);
    }

    #[test]
    fn csp_unsafe_directives_are_penalized() {
        let headers = [(
            "content-security-policy",
            "default-src 'self' 'unsafe-inline' 'unsafe-eval'",
        )];
        let report = SecurityAnalyzer::analyze(&page("https://x.com/", &headers, ""), "ua");

        let csp = &report.headers["content-security-policy"];
        assert_eq!(csp.score, 60.0);
        assert_eq!(csp.issues.len(), 2);
    }

    #[test]
    fn short_hsts_max_age_is_an_issue() {
        let headers = [("strict-transport-security", "max-age=300")];
        let report = SecurityAnalyzer::analyze(&page("https://x.com/", &headers, ""), "ua");
        let hsts = &report.headers["strict-transport-security"];
        assert!(hsts.issues.iter().any(|i| i.contains("below one year")));
        assert_eq!(hsts.score, 60.0);
    }

    #[test]
    fn missing_headers_come_with_recommendations() {
        let report = SecurityAnalyzer::analyze(&page("https://x.com/", &[], ""), "ua");
        let csp = &report.headers["content-security-policy"];
        assert!(!csp.present);
        assert_eq!(csp.score, 0.0);
        assert!(!csp.recommendations.is_empty());
    }

    #[test]
    fn detects_post_form_without_csrf() {
        let body = r#"<form method="post" action="/login">
            <input type="text" name="user">
            <input type="password" name="pass">
        </form>"#;
        let report = SecurityAnalyzer::analyze(&page("https://x.com/", HARDENED, body), "ua");

        assert!(report.vulnerabilities.iter().any(|v| v.id == "form-without-csrf"));
        assert!(report
            .vulnerabilities
            .iter()
            .any(|v| v.id == "password-autocomplete"));
    }

    #[test]
    fn csrf_token_field_clears_the_finding() {
        let body = r#"<form method="post">
            <input type="hidden" name="csrf_token" value="abc">
            <input type="text" name="q">
        </form>"#;
        let report = SecurityAnalyzer::analyze(&page("https://x.com/", HARDENED, body), "ua");
        assert!(!report.vulnerabilities.iter().any(|v| v.id == "form-without-csrf"));
    }

    #[test]
    fn detects_hardcoded_secrets_and_mixed_content() {
        let body = r#"<script>var api_key = "sk_live_abcdef123456";</script>
            <img src="http://cdn.example.com/a.png">"#;
        let report = SecurityAnalyzer::analyze(&page("https://x.com/", HARDENED, body), "ua");

        assert!(report.vulnerabilities.iter().any(|v| v.id == "hardcoded-secret"));
        assert!(report.vulnerabilities.iter().any(|v| v.id == "mixed-content"));
    }

    #[test]
    fn mixed_content_ignored_on_http_pages() {
        let body = r#"<img src="http://cdn.example.com/a.png">"#;
        let report = SecurityAnalyzer::analyze(&page("http://x.com/", HARDENED, body), "ua");
        assert!(!report.vulnerabilities.iter().any(|v| v.id == "mixed-content"));
    }

    #[test]
    fn clickjacking_flagged_without_frame_protection() {
        let report = SecurityAnalyzer::analyze(&page("https://x.com/", &[], ""), "ua");
        assert!(report.vulnerabilities.iter().any(|v| v.id == "clickjacking"));

        let csp_only = [("content-security-policy", "frame-ancestors 'self'")];
        let report = SecurityAnalyzer::analyze(&page("https://x.com/", &csp_only, ""), "ua");
        assert!(!report.vulnerabilities.iter().any(|v| v.id == "clickjacking"));
    }

    #[test]
    fn overall_score_is_the_weighted_blend() {
        let report = SecurityAnalyzer::analyze(&page("https://x.com/", &[], ""), "ua");
        let expected = 0.4 * report.https.score
            + 0.4 * report.headers_score
            + 0.2 * report.vulnerability_score;
        assert!((report.score - expected).abs() < 1e-9);
    }
}
