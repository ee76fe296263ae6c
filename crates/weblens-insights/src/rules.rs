//! Built-in insight rules.
//!
//! Each rule scans the workspace's recent analyses or sessions for one
//! specific symptom and emits a single insight describing it. Thresholds are
//! deliberately coarse; the scores carry the nuance.

use crate::registry::{AnalysisData, Rule};
use crate::score::{calculate_effort_score, calculate_impact_score, Complexity};
use serde_json::json;
use std::sync::Arc;
use weblens_types::{DimensionMap, Insight, InsightPriority, InsightType};

const SLOW_LOAD_THRESHOLD_MS: f64 = 3000.0;
const LARGE_PAGE_THRESHOLD_BYTES: f64 = 3.0 * 1024.0 * 1024.0;
const LOW_SEO_THRESHOLD: f64 = 50.0;
const WEAK_HEADERS_THRESHOLD: f64 = 50.0;
const HIGH_BOUNCE_THRESHOLD: f64 = 60.0;
const MIN_SESSIONS_FOR_BOUNCE: usize = 10;

/// All built-in rules in registration order.
pub fn default_rules() -> Vec<Arc<dyn Rule>> {
    vec![
        Arc::new(SlowPageLoadRule),
        Arc::new(CoreWebVitalsRule),
        Arc::new(LargeResourceSizeRule),
        Arc::new(LowSeoScoreRule),
        Arc::new(MissingMetaDescriptionRule),
        Arc::new(AccessibilityViolationsRule),
        Arc::new(MissingSecurityHeadersRule),
        Arc::new(HighBounceRateRule),
    ]
}

fn lookup<'a>(map: &'a DimensionMap, path: &[&str]) -> Option<&'a serde_json::Value> {
    let (first, rest) = path.split_first()?;
    let mut value = map.get(*first)?;
    for key in rest {
        value = value.get(key)?;
    }
    Some(value)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let collected: Vec<f64> = values.collect();
    (!collected.is_empty()).then(|| collected.iter().sum::<f64>() / collected.len() as f64)
}

pub struct SlowPageLoadRule;

impl Rule for SlowPageLoadRule {
    fn name(&self) -> &'static str {
        "slow-page-load"
    }
    fn description(&self) -> &'static str {
        "Flags workspaces whose average measured load time exceeds the slow threshold"
    }
    fn priority(&self) -> InsightPriority {
        InsightPriority::High
    }
    fn insight_type(&self) -> InsightType {
        InsightType::PerformanceBottleneck
    }

    fn evaluate(&self, data: &AnalysisData) -> anyhow::Result<Vec<Insight>> {
        let avg_load = mean(
            data.analyses
                .iter()
                .filter_map(|a| lookup(&a.performance_metrics, &["load_time_ms"]))
                .filter_map(|v| v.as_f64()),
        );
        let Some(avg_load) = avg_load else {
            return Ok(Vec::new());
        };
        if avg_load <= SLOW_LOAD_THRESHOLD_MS {
            return Ok(Vec::new());
        }

        let overshoot = ((avg_load / SLOW_LOAD_THRESHOLD_MS) - 1.0) * 100.0;
        let mut insight = Insight::new(
            data.workspace_id,
            self.insight_type(),
            self.priority(),
            "Pages load slowly",
        );
        insight.description = Some(format!(
            "Average load time is {avg_load:.0} ms, {overshoot:.0}% over the {SLOW_LOAD_THRESHOLD_MS:.0} ms budget"
        ));
        insight.impact_score = Some(calculate_impact_score(
            &[overshoot.min(100.0), 70.0],
            &[2.0, 1.0],
        ));
        insight.effort_score = Some(calculate_effort_score(Complexity::Medium, 2, 10));
        insight.recommendations.insert(
            "actions".into(),
            json!([
                "Enable response compression",
                "Defer non-critical scripts",
                "Serve images in modern formats"
            ]),
        );
        insight.data_source.insert(
            "avg_load_time_ms".into(),
            json!(avg_load),
        );
        insight
            .data_source
            .insert("analyses_considered".into(), json!(data.analyses.len()));
        Ok(vec![insight])
    }
}

pub struct CoreWebVitalsRule;

impl Rule for CoreWebVitalsRule {
    fn name(&self) -> &'static str {
        "core-web-vitals"
    }
    fn description(&self) -> &'static str {
        "Flags pages whose estimated Core Web Vitals rate poor"
    }
    fn priority(&self) -> InsightPriority {
        InsightPriority::High
    }
    fn insight_type(&self) -> InsightType {
        InsightType::PerformanceBottleneck
    }

    fn evaluate(&self, data: &AnalysisData) -> anyhow::Result<Vec<Insight>> {
        let mut poor_pages = 0usize;
        for analysis in &data.analyses {
            let Some(vitals) = lookup(&analysis.performance_metrics, &["core_web_vitals"]) else {
                continue;
            };
            let poor = ["fcp_ms", "lcp_ms", "cls", "fid_ms"].iter().any(|vital| {
                vitals
                    .get(vital)
                    .and_then(|v| v.get("rating"))
                    .and_then(|r| r.as_str())
                    == Some("poor")
            });
            if poor {
                poor_pages += 1;
            }
        }
        if poor_pages == 0 {
            return Ok(Vec::new());
        }

        let share = 100.0 * poor_pages as f64 / data.analyses.len().max(1) as f64;
        let mut insight = Insight::new(
            data.workspace_id,
            self.insight_type(),
            self.priority(),
            "Core Web Vitals rate poor",
        );
        insight.description = Some(format!(
            "{poor_pages} analyzed page(s) have at least one vital rated poor"
        ));
        insight.impact_score = Some(calculate_impact_score(&[share, 80.0], &[1.0, 1.0]));
        insight.effort_score = Some(calculate_effort_score(Complexity::High, 3, 15));
        insight
            .data_source
            .insert("poor_pages".into(), json!(poor_pages));
        Ok(vec![insight])
    }
}

pub struct LargeResourceSizeRule;

impl Rule for LargeResourceSizeRule {
    fn name(&self) -> &'static str {
        "large-resource-size"
    }
    fn description(&self) -> &'static str {
        "Flags workspaces whose pages carry an oversized estimated payload"
    }
    fn priority(&self) -> InsightPriority {
        InsightPriority::Medium
    }
    fn insight_type(&self) -> InsightType {
        InsightType::PerformanceBottleneck
    }

    fn evaluate(&self, data: &AnalysisData) -> anyhow::Result<Vec<Insight>> {
        let avg_size = mean(
            data.analyses
                .iter()
                .filter_map(|a| lookup(&a.performance_metrics, &["estimated_total_size_bytes"]))
                .filter_map(|v| v.as_f64()),
        );
        let Some(avg_size) = avg_size else {
            return Ok(Vec::new());
        };
        if avg_size <= LARGE_PAGE_THRESHOLD_BYTES {
            return Ok(Vec::new());
        }

        let mut insight = Insight::new(
            data.workspace_id,
            self.insight_type(),
            self.priority(),
            "Page weight is excessive",
        );
        insight.description = Some(format!(
            "Average estimated page weight is {:.1} MiB",
            avg_size / (1024.0 * 1024.0)
        ));
        insight.impact_score = Some(calculate_impact_score(&[60.0], &[1.0]));
        insight.effort_score = Some(calculate_effort_score(Complexity::Medium, 1, 5));
        insight
            .data_source
            .insert("avg_size_bytes".into(), json!(avg_size));
        Ok(vec![insight])
    }
}

pub struct LowSeoScoreRule;

impl Rule for LowSeoScoreRule {
    fn name(&self) -> &'static str {
        "low-seo-score"
    }
    fn description(&self) -> &'static str {
        "Flags workspaces averaging below the SEO score floor"
    }
    fn priority(&self) -> InsightPriority {
        InsightPriority::High
    }
    fn insight_type(&self) -> InsightType {
        InsightType::SeoOptimization
    }

    fn evaluate(&self, data: &AnalysisData) -> anyhow::Result<Vec<Insight>> {
        let avg_score = mean(
            data.analyses
                .iter()
                .filter_map(|a| lookup(&a.seo_metrics, &["score", "total"]))
                .filter_map(|v| v.as_f64()),
        );
        let Some(avg_score) = avg_score else {
            return Ok(Vec::new());
        };
        if avg_score >= LOW_SEO_THRESHOLD {
            return Ok(Vec::new());
        }

        let mut insight = Insight::new(
            data.workspace_id,
            self.insight_type(),
            self.priority(),
            "SEO score is low",
        );
        insight.description = Some(format!("Average SEO score is {avg_score:.0} of 100"));
        insight.impact_score = Some(calculate_impact_score(
            &[LOW_SEO_THRESHOLD - avg_score, 50.0],
            &[2.0, 1.0],
        ));
        insight.effort_score = Some(calculate_effort_score(Complexity::Low, 1, 5));
        insight
            .data_source
            .insert("avg_seo_score".into(), json!(avg_score));
        Ok(vec![insight])
    }
}

pub struct MissingMetaDescriptionRule;

impl Rule for MissingMetaDescriptionRule {
    fn name(&self) -> &'static str {
        "missing-meta-description"
    }
    fn description(&self) -> &'static str {
        "Flags analyzed pages without a meta description"
    }
    fn priority(&self) -> InsightPriority {
        InsightPriority::Medium
    }
    fn insight_type(&self) -> InsightType {
        InsightType::SeoOptimization
    }

    fn evaluate(&self, data: &AnalysisData) -> anyhow::Result<Vec<Insight>> {
        let missing = data
            .analyses
            .iter()
            .filter(|a| !a.seo_metrics.is_empty())
            .filter(|a| lookup(&a.seo_metrics, &["meta_tags", "description"]).is_none())
            .count();
        if missing == 0 {
            return Ok(Vec::new());
        }

        let mut insight = Insight::new(
            data.workspace_id,
            self.insight_type(),
            self.priority(),
            "Pages lack meta descriptions",
        );
        insight.description = Some(format!(
            "{missing} analyzed page(s) have no meta description"
        ));
        insight.impact_score = Some(calculate_impact_score(&[40.0], &[1.0]));
        insight.effort_score = Some(calculate_effort_score(Complexity::Low, 1, 2));
        insight
            .data_source
            .insert("pages_missing".into(), json!(missing));
        Ok(vec![insight])
    }
}

pub struct AccessibilityViolationsRule;

impl Rule for AccessibilityViolationsRule {
    fn name(&self) -> &'static str {
        "accessibility-violations"
    }
    fn description(&self) -> &'static str {
        "Flags WCAG violations across analyzed pages"
    }
    fn priority(&self) -> InsightPriority {
        InsightPriority::High
    }
    fn insight_type(&self) -> InsightType {
        InsightType::AccessibilityIssue
    }

    fn evaluate(&self, data: &AnalysisData) -> anyhow::Result<Vec<Insight>> {
        let mut violations = 0usize;
        let mut critical = false;
        for analysis in &data.analyses {
            let Some(checks) = lookup(&analysis.accessibility_metrics, &["wcag_checks"])
                .and_then(|v| v.as_array())
            else {
                continue;
            };
            for check in checks {
                if check.get("outcome").and_then(|o| o.as_str()) == Some("violation") {
                    violations += 1;
                    if check.get("impact").and_then(|i| i.as_str()) == Some("critical") {
                        critical = true;
                    }
                }
            }
        }
        if violations == 0 {
            return Ok(Vec::new());
        }

        let priority = if critical {
            InsightPriority::Critical
        } else {
            self.priority()
        };
        let mut insight = Insight::new(
            data.workspace_id,
            self.insight_type(),
            priority,
            "WCAG violations detected",
        );
        insight.description = Some(format!(
            "{violations} WCAG violation(s) across the analyzed pages"
        ));
        insight.impact_score = Some(calculate_impact_score(
            &[(10.0 * violations as f64).min(100.0), 60.0],
            &[2.0, 1.0],
        ));
        insight.effort_score = Some(calculate_effort_score(Complexity::Medium, 1, 7));
        insight
            .data_source
            .insert("violations".into(), json!(violations));
        Ok(vec![insight])
    }
}

pub struct MissingSecurityHeadersRule;

impl Rule for MissingSecurityHeadersRule {
    fn name(&self) -> &'static str {
        "missing-security-headers"
    }
    fn description(&self) -> &'static str {
        "Flags workspaces whose responses lack baseline security headers"
    }
    fn priority(&self) -> InsightPriority {
        InsightPriority::Critical
    }
    fn insight_type(&self) -> InsightType {
        InsightType::SecurityIssue
    }

    fn evaluate(&self, data: &AnalysisData) -> anyhow::Result<Vec<Insight>> {
        let avg_headers = mean(
            data.analyses
                .iter()
                .filter_map(|a| lookup(&a.security_metrics, &["headers_score"]))
                .filter_map(|v| v.as_f64()),
        );
        let Some(avg_headers) = avg_headers else {
            return Ok(Vec::new());
        };
        if avg_headers >= WEAK_HEADERS_THRESHOLD {
            return Ok(Vec::new());
        }

        let mut insight = Insight::new(
            data.workspace_id,
            self.insight_type(),
            self.priority(),
            "Security headers are missing",
        );
        insight.description = Some(format!(
            "Average security header score is {avg_headers:.0} of 100"
        ));
        insight.impact_score = Some(calculate_impact_score(
            &[100.0 - avg_headers, 90.0],
            &[2.0, 1.0],
        ));
        insight.effort_score = Some(calculate_effort_score(Complexity::Low, 1, 3));
        insight.recommendations.insert(
            "actions".into(),
            json!([
                "Add Content-Security-Policy",
                "Add Strict-Transport-Security",
                "Add X-Content-Type-Options: nosniff"
            ]),
        );
        insight
            .data_source
            .insert("avg_headers_score".into(), json!(avg_headers));
        Ok(vec![insight])
    }
}

pub struct HighBounceRateRule;

impl Rule for HighBounceRateRule {
    fn name(&self) -> &'static str {
        "high-bounce-rate"
    }
    fn description(&self) -> &'static str {
        "Flags workspaces where most sessions bounce"
    }
    fn priority(&self) -> InsightPriority {
        InsightPriority::Medium
    }
    fn insight_type(&self) -> InsightType {
        InsightType::ConversionFunnel
    }

    fn evaluate(&self, data: &AnalysisData) -> anyhow::Result<Vec<Insight>> {
        if data.sessions.len() < MIN_SESSIONS_FOR_BOUNCE {
            return Ok(Vec::new());
        }
        let bounced = data.sessions.iter().filter(|s| s.is_bounce()).count();
        let bounce_rate = 100.0 * bounced as f64 / data.sessions.len() as f64;
        if bounce_rate <= HIGH_BOUNCE_THRESHOLD {
            return Ok(Vec::new());
        }

        let mut insight = Insight::new(
            data.workspace_id,
            self.insight_type(),
            self.priority(),
            "Bounce rate is high",
        );
        insight.description = Some(format!(
            "{bounce_rate:.0}% of {} sessions viewed at most one page",
            data.sessions.len()
        ));
        insight.impact_score = Some(calculate_impact_score(
            &[bounce_rate - HIGH_BOUNCE_THRESHOLD, 50.0],
            &[1.5, 1.0],
        ));
        insight.effort_score = Some(calculate_effort_score(Complexity::Medium, 2, 14));
        insight
            .data_source
            .insert("bounce_rate".into(), json!(bounce_rate));
        insight
            .data_source
            .insert("sessions_considered".into(), json!(data.sessions.len()));
        Ok(vec![insight])
    }
}
