use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use weblens_storage::{
    AnalysisRepository, EventRepository, InsightRepository, SessionRepository, StorageError,
};
use weblens_types::{AnalysisResult, Event, Insight, InsightPriority, InsightType, Session};

/// How far back the generator reads raw data when building [`AnalysisData`].
const DATA_WINDOW_DAYS: i64 = 30;

/// The data a rule evaluates: a workspace's recent analyses, sessions and
/// events.
#[derive(Debug, Clone)]
pub struct AnalysisData {
    pub workspace_id: Uuid,
    pub analyses: Vec<AnalysisResult>,
    pub sessions: Vec<Session>,
    pub events: Vec<Event>,
}

/// A pluggable insight rule.
///
/// Evaluation is pure and bounded: a rule reads the data it is given and
/// returns zero or more insights, or an error that the registry logs and
/// skips.
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn priority(&self) -> InsightPriority;
    fn insight_type(&self) -> InsightType;
    fn evaluate(&self, data: &AnalysisData) -> anyhow::Result<Vec<Insight>>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("rule already registered: {name}")]
    DuplicateRule { name: String },

    #[error("all {count} rules failed")]
    AllRulesFailed { count: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("rule execution cancelled")]
    Cancelled,
}

/// Holds rules keyed by name; writes are guarded, reads run concurrently.
#[derive(Default)]
pub struct RuleRegistry {
    rules: RwLock<Vec<Arc<dyn Rule>>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, rule: Arc<dyn Rule>) -> Result<(), RegistryError> {
        let mut rules = self.rules.write().await;
        if rules.iter().any(|existing| existing.name() == rule.name()) {
            return Err(RegistryError::DuplicateRule {
                name: rule.name().to_string(),
            });
        }
        debug!(rule = rule.name(), "rule registered");
        rules.push(rule);
        Ok(())
    }

    pub async fn unregister(&self, name: &str) -> bool {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|rule| rule.name() != name);
        rules.len() < before
    }

    pub async fn get_rule(&self, name: &str) -> Option<Arc<dyn Rule>> {
        self.rules
            .read()
            .await
            .iter()
            .find(|rule| rule.name() == name)
            .cloned()
    }

    /// Rules ordered by priority weight (descending), then insertion order.
    pub async fn list_rules(&self) -> Vec<Arc<dyn Rule>> {
        let rules = self.rules.read().await;
        let mut ordered: Vec<Arc<dyn Rule>> = rules.clone();
        // Stable sort preserves insertion order within a priority band.
        ordered.sort_by_key(|rule| std::cmp::Reverse(rule.priority().weight()));
        ordered
    }

    /// Run every rule over the data. One successful rule makes the run a
    /// success; failures are logged and skipped. Only a total wipeout is an
    /// error.
    #[instrument(skip(self, data, cancel), fields(workspace_id = %data.workspace_id))]
    pub async fn execute_rules(
        &self,
        data: &AnalysisData,
        cancel: &CancellationToken,
    ) -> Result<Vec<Insight>, RegistryError> {
        let rules = self.list_rules().await;
        self.execute(&rules, data, cancel).await
    }

    /// Run only the rules producing a given insight type.
    pub async fn execute_rules_by_type(
        &self,
        data: &AnalysisData,
        insight_type: InsightType,
        cancel: &CancellationToken,
    ) -> Result<Vec<Insight>, RegistryError> {
        let rules: Vec<Arc<dyn Rule>> = self
            .list_rules()
            .await
            .into_iter()
            .filter(|rule| rule.insight_type() == insight_type)
            .collect();
        self.execute(&rules, data, cancel).await
    }

    async fn execute(
        &self,
        rules: &[Arc<dyn Rule>],
        data: &AnalysisData,
        cancel: &CancellationToken,
    ) -> Result<Vec<Insight>, RegistryError> {
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let mut insights = Vec::new();
        let mut failures = 0;
        for rule in rules {
            if cancel.is_cancelled() {
                return Err(RegistryError::Cancelled);
            }
            match rule.evaluate(data) {
                Ok(found) => {
                    debug!(rule = rule.name(), insights = found.len(), "rule evaluated");
                    insights.extend(found);
                }
                Err(error) => {
                    warn!(rule = rule.name(), %error, "rule failed; skipping");
                    failures += 1;
                }
            }
        }

        if failures == rules.len() {
            return Err(RegistryError::AllRulesFailed { count: failures });
        }

        Ok(dedup_insights(insights))
    }
}

/// Deduplicate by (workspace, type, title), keeping the higher priority
/// weight and breaking ties with the higher impact score, then sort by
/// priority weight and impact.
fn dedup_insights(insights: Vec<Insight>) -> Vec<Insight> {
    let mut best: HashMap<(Uuid, InsightType, String), Insight> = HashMap::new();
    for insight in insights {
        let key = insight.dedup_key();
        match best.get(&key) {
            Some(existing) if !wins_over(&insight, existing) => {}
            _ => {
                best.insert(key, insight);
            }
        }
    }
    let mut result: Vec<Insight> = best.into_values().collect();
    result.sort_by(|a, b| {
        b.priority
            .weight()
            .cmp(&a.priority.weight())
            .then_with(|| {
                b.impact_score
                    .unwrap_or(0.0)
                    .total_cmp(&a.impact_score.unwrap_or(0.0))
            })
    });
    result
}

fn wins_over(candidate: &Insight, existing: &Insight) -> bool {
    let by_priority = candidate
        .priority
        .weight()
        .cmp(&existing.priority.weight());
    match by_priority {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => {
            candidate.impact_score.unwrap_or(0.0) > existing.impact_score.unwrap_or(0.0)
        }
    }
}

/// Loads a workspace's recent data, runs the registry and persists the
/// outcome. Shared by the synchronous generate endpoint and the job worker.
#[derive(Clone)]
pub struct InsightService {
    registry: Arc<RuleRegistry>,
    analyses: Arc<dyn AnalysisRepository>,
    sessions: Arc<dyn SessionRepository>,
    events: Arc<dyn EventRepository>,
    insights: Arc<dyn InsightRepository>,
}

impl InsightService {
    pub fn new(
        registry: Arc<RuleRegistry>,
        analyses: Arc<dyn AnalysisRepository>,
        sessions: Arc<dyn SessionRepository>,
        events: Arc<dyn EventRepository>,
        insights: Arc<dyn InsightRepository>,
    ) -> Self {
        Self {
            registry,
            analyses,
            sessions,
            events,
            insights,
        }
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub async fn load_data(&self, workspace_id: Uuid) -> Result<AnalysisData, RegistryError> {
        let end = Utc::now();
        let start = end - Duration::days(DATA_WINDOW_DAYS);
        Ok(AnalysisData {
            workspace_id,
            analyses: self.analyses.list_in_range(workspace_id, start, end).await?,
            sessions: self.sessions.list_in_range(workspace_id, start, end).await?,
            events: self.events.list_in_range(workspace_id, start, end).await?,
        })
    }

    /// Generate and persist insights for a workspace.
    #[instrument(skip(self, cancel), fields(workspace_id = %workspace_id))]
    pub async fn generate(
        &self,
        workspace_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<Insight>, RegistryError> {
        let data = self.load_data(workspace_id).await?;
        let insights = self.registry.execute_rules(&data, cancel).await?;
        if !insights.is_empty() {
            self.insights.create_bulk(insights.clone()).await?;
        }
        info!(count = insights.len(), "insights generated");
        Ok(insights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> AnalysisData {
        AnalysisData {
            workspace_id: Uuid::new_v4(),
            analyses: Vec::new(),
            sessions: Vec::new(),
            events: Vec::new(),
        }
    }

    struct EmitRule {
        name: &'static str,
        priority: InsightPriority,
        title: String,
        impact: Option<f64>,
    }
    impl Rule for EmitRule {
        fn name(&self) -> &'static str {
            self.name
        }
        fn description(&self) -> &'static str {
            "emit"
        }
        fn priority(&self) -> InsightPriority {
            self.priority
        }
        fn insight_type(&self) -> InsightType {
            InsightType::SeoOptimization
        }
        fn evaluate(&self, data: &AnalysisData) -> anyhow::Result<Vec<Insight>> {
            let mut insight = Insight::new(
                data.workspace_id,
                self.insight_type(),
                self.priority,
                self.title.clone(),
            );
            insight.impact_score = self.impact;
            Ok(vec![insight])
        }
    }

    struct FailRule;
    impl Rule for FailRule {
        fn name(&self) -> &'static str {
            "always-fails"
        }
        fn description(&self) -> &'static str {
            "fails"
        }
        fn priority(&self) -> InsightPriority {
            InsightPriority::Low
        }
        fn insight_type(&self) -> InsightType {
            InsightType::PerformanceBottleneck
        }
        fn evaluate(&self, _data: &AnalysisData) -> anyhow::Result<Vec<Insight>> {
            anyhow::bail!("broken rule")
        }
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let registry = RuleRegistry::new();
        registry
            .register(Arc::new(EmitRule {
                name: "r1",
                priority: InsightPriority::Low,
                title: "t".into(),
                impact: None,
            }))
            .await
            .unwrap();
        let err = registry
            .register(Arc::new(EmitRule {
                name: "r1",
                priority: InsightPriority::High,
                title: "t2".into(),
                impact: None,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRule { .. }));
    }

    #[tokio::test]
    async fn list_orders_by_weight_then_insertion() {
        let registry = RuleRegistry::new();
        for (name, priority) in [
            ("low-first", InsightPriority::Low),
            ("critical", InsightPriority::Critical),
            ("medium-a", InsightPriority::Medium),
            ("medium-b", InsightPriority::Medium),
        ] {
            registry
                .register(Arc::new(EmitRule {
                    name,
                    priority,
                    title: name.into(),
                    impact: None,
                }))
                .await
                .unwrap();
        }

        let names: Vec<&str> = registry
            .list_rules()
            .await
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(names, vec!["critical", "medium-a", "medium-b", "low-first"]);
    }

    #[tokio::test]
    async fn partial_failure_still_succeeds() {
        let registry = RuleRegistry::new();
        registry.register(Arc::new(FailRule)).await.unwrap();
        registry
            .register(Arc::new(EmitRule {
                name: "works",
                priority: InsightPriority::Medium,
                title: "found something".into(),
                impact: None,
            }))
            .await
            .unwrap();

        let insights = registry
            .execute_rules(&data(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(insights.len(), 1);
    }

    #[tokio::test]
    async fn total_failure_is_an_error() {
        let registry = RuleRegistry::new();
        registry.register(Arc::new(FailRule)).await.unwrap();

        let err = registry
            .execute_rules(&data(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AllRulesFailed { count: 1 }));
    }

    #[tokio::test]
    async fn dedup_keeps_higher_priority_then_higher_impact() {
        let registry = RuleRegistry::new();
        registry
            .register(Arc::new(EmitRule {
                name: "a",
                priority: InsightPriority::Medium,
                title: "same finding".into(),
                impact: Some(20.0),
            }))
            .await
            .unwrap();
        registry
            .register(Arc::new(EmitRule {
                name: "b",
                priority: InsightPriority::High,
                title: "same finding".into(),
                impact: Some(10.0),
            }))
            .await
            .unwrap();
        registry
            .register(Arc::new(EmitRule {
                name: "c",
                priority: InsightPriority::High,
                title: "same finding".into(),
                impact: Some(30.0),
            }))
            .await
            .unwrap();

        let insights = registry
            .execute_rules(&data(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].priority, InsightPriority::High);
        assert_eq!(insights[0].impact_score, Some(30.0));
    }

    #[tokio::test]
    async fn execute_by_type_subsets() {
        let registry = RuleRegistry::new();
        registry.register(Arc::new(FailRule)).await.unwrap(); // performance type
        registry
            .register(Arc::new(EmitRule {
                name: "seo",
                priority: InsightPriority::Low,
                title: "seo thing".into(),
                impact: None,
            }))
            .await
            .unwrap();

        let insights = registry
            .execute_rules_by_type(&data(), InsightType::SeoOptimization, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].insight_type, InsightType::SeoOptimization);
    }

    #[tokio::test]
    async fn cancelled_execution_stops() {
        let registry = RuleRegistry::new();
        registry
            .register(Arc::new(EmitRule {
                name: "x",
                priority: InsightPriority::Low,
                title: "x".into(),
                impact: None,
            }))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = registry.execute_rules(&data(), &cancel).await.unwrap_err();
        assert!(matches!(err, RegistryError::Cancelled));
    }
}
