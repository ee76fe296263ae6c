use crate::{Fingerprint, TechInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::trace;

/// One detection rule. A rule fires when any of its patterns match; the
/// generator pattern additionally captures a version when present.
struct TechRule {
    name: &'static str,
    categories: &'static [&'static str],
    website: &'static str,
    confidence: u8,
    /// (header name, value pattern) pairs checked against response headers
    header_patterns: &'static [(&'static str, &'static str)],
    /// Patterns checked against the raw HTML body
    body_patterns: &'static [&'static str],
    /// Pattern checked against `<meta name="generator">` content; the first
    /// capture group, when present, is the version
    generator_pattern: Option<&'static str>,
}

struct CompiledRule {
    rule: &'static TechRule,
    headers: Vec<(&'static str, Regex)>,
    body: Vec<Regex>,
    generator: Option<Regex>,
}

static RULES: &[TechRule] = &[
    TechRule {
        name: "WordPress",
        categories: &["CMS", "Blogs"],
        website: "https://wordpress.org",
        confidence: 100,
        header_patterns: &[("link", r"rel=.https://api\.w\.org/")],
        body_patterns: &[r"/wp-content/", r"/wp-includes/"],
        generator_pattern: Some(r"(?i)WordPress(?:\s+([\d.]+))?"),
    },
    TechRule {
        name: "Drupal",
        categories: &["CMS"],
        website: "https://www.drupal.org",
        confidence: 100,
        header_patterns: &[("x-generator", r"(?i)Drupal"), ("x-drupal-cache", r".")],
        body_patterns: &[r"/sites/default/files/", r"(?i)drupal-settings-json"],
        generator_pattern: Some(r"(?i)Drupal(?:\s+([\d.]+))?"),
    },
    TechRule {
        name: "Joomla",
        categories: &["CMS"],
        website: "https://www.joomla.org",
        confidence: 95,
        header_patterns: &[],
        body_patterns: &[r"/media/jui/", r"(?i)com_content"],
        generator_pattern: Some(r"(?i)Joomla!?(?:\s+([\d.]+))?"),
    },
    TechRule {
        name: "Shopify",
        categories: &["Ecommerce"],
        website: "https://www.shopify.com",
        confidence: 100,
        header_patterns: &[("x-shopid", r"."), ("x-shopify-stage", r".")],
        body_patterns: &[r"cdn\.shopify\.com", r"(?i)Shopify\.theme"],
        generator_pattern: None,
    },
    TechRule {
        name: "Wix",
        categories: &["Website Builder"],
        website: "https://www.wix.com",
        confidence: 95,
        header_patterns: &[("x-wix-request-id", r".")],
        body_patterns: &[r"static\.parastorage\.com", r"wix\.com"],
        generator_pattern: Some(r"(?i)Wix\.com(?:\s+([\d.]+))?"),
    },
    TechRule {
        name: "Squarespace",
        categories: &["Website Builder"],
        website: "https://www.squarespace.com",
        confidence: 95,
        header_patterns: &[("server", r"(?i)Squarespace")],
        body_patterns: &[r"static1\.squarespace\.com"],
        generator_pattern: Some(r"(?i)Squarespace"),
    },
    TechRule {
        name: "Next.js",
        categories: &["JavaScript Frameworks", "SSR"],
        website: "https://nextjs.org",
        confidence: 95,
        header_patterns: &[("x-powered-by", r"(?i)Next\.js(?:\s+([\d.]+))?")],
        body_patterns: &[r"/_next/static/", r"__NEXT_DATA__"],
        generator_pattern: None,
    },
    TechRule {
        name: "React",
        categories: &["JavaScript Frameworks"],
        website: "https://react.dev",
        confidence: 80,
        header_patterns: &[],
        body_patterns: &[r"data-reactroot", r"react(?:\.production)?(?:\.min)?\.js"],
        generator_pattern: None,
    },
    TechRule {
        name: "Vue.js",
        categories: &["JavaScript Frameworks"],
        website: "https://vuejs.org",
        confidence: 80,
        body_patterns: &[r"data-v-app", r"vue(?:\.runtime)?(?:\.global)?(?:\.min)?\.js"],
        header_patterns: &[],
        generator_pattern: None,
    },
    TechRule {
        name: "Angular",
        categories: &["JavaScript Frameworks"],
        website: "https://angular.dev",
        confidence: 85,
        header_patterns: &[],
        body_patterns: &[r"ng-version=", r"ng-app"],
        generator_pattern: None,
    },
    TechRule {
        name: "jQuery",
        categories: &["JavaScript Libraries"],
        website: "https://jquery.com",
        confidence: 90,
        header_patterns: &[],
        body_patterns: &[r"jquery[-.]?([\d.]*)(?:\.min)?\.js"],
        generator_pattern: None,
    },
    TechRule {
        name: "Bootstrap",
        categories: &["UI Frameworks"],
        website: "https://getbootstrap.com",
        confidence: 85,
        header_patterns: &[],
        body_patterns: &[r"bootstrap(?:\.bundle)?(?:\.min)?\.(?:css|js)"],
        generator_pattern: None,
    },
    TechRule {
        name: "Tailwind CSS",
        categories: &["UI Frameworks"],
        website: "https://tailwindcss.com",
        confidence: 70,
        header_patterns: &[],
        body_patterns: &[r"cdn\.tailwindcss\.com", r#"class="[^"]*\b(?:flex|grid) [^"]*\b(?:md|lg):"#],
        generator_pattern: None,
    },
    TechRule {
        name: "Google Analytics",
        categories: &["Analytics"],
        website: "https://marketingplatform.google.com/about/analytics/",
        confidence: 95,
        header_patterns: &[],
        body_patterns: &[r"googletagmanager\.com/gtag", r"google-analytics\.com/analytics\.js"],
        generator_pattern: None,
    },
    TechRule {
        name: "Cloudflare",
        categories: &["CDN"],
        website: "https://www.cloudflare.com",
        confidence: 100,
        header_patterns: &[("server", r"(?i)cloudflare"), ("cf-ray", r".")],
        body_patterns: &[],
        generator_pattern: None,
    },
    TechRule {
        name: "nginx",
        categories: &["Web Servers"],
        website: "https://nginx.org",
        confidence: 100,
        header_patterns: &[("server", r"(?i)nginx(?:/([\d.]+))?")],
        body_patterns: &[],
        generator_pattern: None,
    },
    TechRule {
        name: "Apache",
        categories: &["Web Servers"],
        website: "https://httpd.apache.org",
        confidence: 100,
        header_patterns: &[("server", r"(?i)Apache(?:/([\d.]+))?")],
        body_patterns: &[],
        generator_pattern: None,
    },
    TechRule {
        name: "PHP",
        categories: &["Programming Languages"],
        website: "https://www.php.net",
        confidence: 95,
        header_patterns: &[
            ("x-powered-by", r"(?i)PHP(?:/([\d.]+))?"),
            ("set-cookie", r"PHPSESSID"),
        ],
        body_patterns: &[],
        generator_pattern: None,
    },
];

static GENERATOR_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]+name\s*=\s*["']generator["'][^>]+content\s*=\s*["']([^"']+)["']"#,
    )
    .expect("static generator pattern")
});

static COMPILED: Lazy<Vec<CompiledRule>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|rule| CompiledRule {
            rule,
            headers: rule
                .header_patterns
                .iter()
                .map(|(name, pattern)| (*name, Regex::new(pattern).expect("static header pattern")))
                .collect(),
            body: rule
                .body_patterns
                .iter()
                .map(|pattern| Regex::new(pattern).expect("static body pattern"))
                .collect(),
            generator: rule
                .generator_pattern
                .map(|pattern| Regex::new(pattern).expect("static generator pattern")),
        })
        .collect()
});

/// Built-in fingerprint ruleset driven by header, body, and
/// `<meta name="generator">` signatures.
#[derive(Debug, Default)]
pub struct PatternFingerprint;

impl PatternFingerprint {
    pub fn new() -> Self {
        Self
    }
}

impl Fingerprint for PatternFingerprint {
    fn matches(&self, headers: &HashMap<String, String>, body: &str) -> HashMap<String, TechInfo> {
        let generator = GENERATOR_META
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        let mut detected = HashMap::new();

        for compiled in COMPILED.iter() {
            let mut matched = false;
            let mut version: Option<String> = None;

            if let (Some(pattern), Some(content)) = (&compiled.generator, generator.as_deref()) {
                if let Some(caps) = pattern.captures(content) {
                    matched = true;
                    version = caps.get(1).map(|m| m.as_str().to_string());
                }
            }

            if !matched {
                for (name, pattern) in &compiled.headers {
                    if let Some(value) = headers.get(*name) {
                        if let Some(caps) = pattern.captures(value) {
                            matched = true;
                            version = caps.get(1).map(|m| m.as_str().to_string());
                            break;
                        }
                    }
                }
            }

            if !matched {
                for pattern in &compiled.body {
                    if let Some(caps) = pattern.captures(body) {
                        matched = true;
                        version = caps
                            .get(1)
                            .map(|m| m.as_str().to_string())
                            .filter(|v| !v.is_empty());
                        break;
                    }
                }
            }

            if matched {
                trace!(technology = compiled.rule.name, ?version, "technology matched");
                detected.insert(
                    compiled.rule.name.to_string(),
                    TechInfo {
                        categories: compiled
                            .rule
                            .categories
                            .iter()
                            .map(|c| c.to_string())
                            .collect(),
                        confidence: compiled.rule.confidence,
                        version,
                        icon: None,
                        website: Some(compiled.rule.website.to_string()),
                        cpe: None,
                    },
                );
            }
        }

        detected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_headers() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn detects_wordpress_from_generator_meta() {
        let html = r#"<html><head><meta name="generator" content="WordPress 5.8" /></head></html>"#;
        let detected = PatternFingerprint::new().matches(&no_headers(), html);

        let info = detected.get("WordPress").expect("WordPress detected");
        assert_eq!(info.version.as_deref(), Some("5.8"));
        assert!(info.categories.contains(&"CMS".to_string()));
        assert_eq!(info.confidence, 100);
    }

    #[test]
    fn detects_from_headers() {
        let mut headers = HashMap::new();
        headers.insert("server".to_string(), "nginx/1.25.3".to_string());
        headers.insert("x-powered-by".to_string(), "PHP/8.2.1".to_string());

        let detected = PatternFingerprint::new().matches(&headers, "");
        assert_eq!(
            detected.get("nginx").unwrap().version.as_deref(),
            Some("1.25.3")
        );
        assert_eq!(detected.get("PHP").unwrap().version.as_deref(), Some("8.2.1"));
    }

    #[test]
    fn detects_jquery_with_version_from_script_src() {
        let html = r#"<script src="/assets/jquery-3.6.0.min.js"></script>"#;
        let detected = PatternFingerprint::new().matches(&no_headers(), html);
        assert_eq!(
            detected.get("jQuery").unwrap().version.as_deref(),
            Some("3.6.0")
        );
    }

    #[test]
    fn clean_page_detects_nothing() {
        let detected = PatternFingerprint::new()
            .matches(&no_headers(), "<html><body><p>plain</p></body></html>");
        assert!(detected.is_empty());
    }
}
