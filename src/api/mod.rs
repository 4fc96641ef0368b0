//! Provider API boundary
//!
//! The retrieval strategies only see these three call shapes. The live
//! implementation lives in [`aws`] behind the `aws` cargo feature; without it
//! every call reports [`CostError::IntegrationUnavailable`].

#[cfg(feature = "aws")]
pub mod aws;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CostError, Result};
use crate::period::BillingPeriod;

/// Metric statistics request for the `Maximum` statistic
#[derive(Debug, Clone)]
pub struct MetricQuery {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<(String, String)>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_seconds: u32,
}

impl MetricQuery {
    /// The scoping dimension value for `name`, if any
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// One metric datapoint, `value` holds the maximum
#[derive(Debug, Clone, PartialEq)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

/// Cost ledger grouping dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerDimension {
    Service,
    RecordType,
}

impl LedgerDimension {
    pub fn key(&self) -> &'static str {
        match self {
            LedgerDimension::Service => "SERVICE",
            LedgerDimension::RecordType => "RECORD_TYPE",
        }
    }
}

/// Daily cost-and-usage request
#[derive(Debug, Clone)]
pub struct LedgerQuery {
    pub period: BillingPeriod,
    pub metric: String,
    pub group_by: Vec<LedgerDimension>,
}

impl LedgerQuery {
    pub const UNBLENDED_COST: &'static str = "UnblendedCost";

    /// Daily unblended cost grouped by the given dimensions
    pub fn daily(period: BillingPeriod, group_by: Vec<LedgerDimension>) -> Self {
        Self {
            period,
            metric: Self::UNBLENDED_COST.to_string(),
            group_by,
        }
    }
}

/// One group inside a ledger time bucket; `keys` follow the query's `group_by` order
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerGroup {
    pub keys: Vec<String>,
    pub amount: f64,
}

impl LedgerGroup {
    pub fn new(keys: &[&str], amount: f64) -> Self {
        Self {
            keys: keys.iter().map(|key| key.to_string()).collect(),
            amount,
        }
    }
}

/// One time bucket of a ledger response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerBucket {
    pub groups: Vec<LedgerGroup>,
}

/// Audit event lookup by event source
#[derive(Debug, Clone)]
pub struct EventLookup {
    pub event_source: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub max_results: u32,
}

/// Metric statistics (CloudWatch `GetMetricStatistics`)
#[async_trait]
pub trait BillingMetricsApi: Send + Sync {
    async fn metric_statistics(&self, query: &MetricQuery) -> Result<Vec<Datapoint>>;
}

/// Cost and usage (Cost Explorer `GetCostAndUsage`)
#[async_trait]
pub trait CostLedgerApi: Send + Sync {
    async fn cost_and_usage(&self, query: &LedgerQuery) -> Result<Vec<LedgerBucket>>;
}

/// Audit event lookup (CloudTrail `LookupEvents`)
#[async_trait]
pub trait AuditTrailApi: Send + Sync {
    /// Number of events matching `lookup`, capped at its `max_results`
    async fn count_events(&self, lookup: &EventLookup) -> Result<u32>;

    /// Whether the capability exists at all in this build/environment
    fn is_available(&self) -> bool {
        true
    }
}

/// Stand-in for every API when no integration is compiled in
#[derive(Debug, Clone)]
pub struct UnavailableApi {
    reason: String,
}

impl UnavailableApi {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> CostError {
        CostError::IntegrationUnavailable(self.reason.clone())
    }
}

#[async_trait]
impl BillingMetricsApi for UnavailableApi {
    async fn metric_statistics(&self, _query: &MetricQuery) -> Result<Vec<Datapoint>> {
        Err(self.error())
    }
}

#[async_trait]
impl CostLedgerApi for UnavailableApi {
    async fn cost_and_usage(&self, _query: &LedgerQuery) -> Result<Vec<LedgerBucket>> {
        Err(self.error())
    }
}

#[async_trait]
impl AuditTrailApi for UnavailableApi {
    async fn count_events(&self, _lookup: &EventLookup) -> Result<u32> {
        Err(self.error())
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// The three provider capabilities, shared by every strategy
#[derive(Clone)]
pub struct ProviderApis {
    pub metrics: Arc<dyn BillingMetricsApi>,
    pub ledger: Arc<dyn CostLedgerApi>,
    pub audit: Arc<dyn AuditTrailApi>,
}

impl ProviderApis {
    pub const MISSING_INTEGRATION: &'static str =
        "costbar was built without AWS support. Rebuild with `cargo build --features aws`";

    pub fn unavailable() -> Self {
        let api = Arc::new(UnavailableApi::new(Self::MISSING_INTEGRATION));
        Self {
            metrics: api.clone(),
            ledger: api.clone(),
            audit: api,
        }
    }

    /// Build the live integration if it is compiled in
    pub async fn from_environment() -> Self {
        #[cfg(feature = "aws")]
        {
            aws::AwsApis::from_env().await.into_provider_apis()
        }
        #[cfg(not(feature = "aws"))]
        {
            tracing::debug!("AWS feature disabled, provider APIs unavailable");
            Self::unavailable()
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted fakes for the provider APIs

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Metric responses keyed by `ServiceName` dimension (`None` = aggregate)
    #[derive(Default)]
    pub struct FakeMetrics {
        responses: HashMap<Option<String>, Vec<Datapoint>>,
        failing: Vec<String>,
        aggregate_error: Mutex<Option<CostError>>,
        pub calls: AtomicUsize,
    }

    impl FakeMetrics {
        pub fn with_aggregate(mut self, points: Vec<Datapoint>) -> Self {
            self.responses.insert(None, points);
            self
        }

        pub fn with_service(mut self, service: &str, points: Vec<Datapoint>) -> Self {
            self.responses.insert(Some(service.to_string()), points);
            self
        }

        pub fn failing_service(mut self, service: &str) -> Self {
            self.failing.push(service.to_string());
            self
        }

        pub fn failing_aggregate(self, error: CostError) -> Self {
            *self.aggregate_error.lock().unwrap() = Some(error);
            self
        }
    }

    #[async_trait]
    impl BillingMetricsApi for FakeMetrics {
        async fn metric_statistics(&self, query: &MetricQuery) -> Result<Vec<Datapoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let service = query.dimension("ServiceName").map(str::to_string);
            match &service {
                None => {
                    if let Some(err) = self.aggregate_error.lock().unwrap().take() {
                        return Err(err);
                    }
                }
                Some(name) if self.failing.contains(name) => {
                    return Err(CostError::Api(format!("throttled on {name}")));
                }
                Some(_) => {}
            }
            Ok(self.responses.get(&service).cloned().unwrap_or_default())
        }
    }

    /// Ledger responses keyed by the query's group-by dimensions
    #[derive(Default)]
    pub struct FakeLedger {
        responses: Vec<(Vec<LedgerDimension>, Vec<LedgerBucket>)>,
        error: Mutex<Option<CostError>>,
        pub queries: Mutex<Vec<LedgerQuery>>,
    }

    impl FakeLedger {
        pub fn respond(mut self, group_by: Vec<LedgerDimension>, buckets: Vec<LedgerBucket>) -> Self {
            self.responses.push((group_by, buckets));
            self
        }

        pub fn failing(self, error: CostError) -> Self {
            *self.error.lock().unwrap() = Some(error);
            self
        }
    }

    #[async_trait]
    impl CostLedgerApi for FakeLedger {
        async fn cost_and_usage(&self, query: &LedgerQuery) -> Result<Vec<LedgerBucket>> {
            self.queries.lock().unwrap().push(query.clone());
            if let Some(err) = self.error.lock().unwrap().take() {
                return Err(err);
            }
            Ok(self
                .responses
                .iter()
                .find(|(group_by, _)| *group_by == query.group_by)
                .map(|(_, buckets)| buckets.clone())
                .unwrap_or_default())
        }
    }

    /// Event counts keyed by event source
    #[derive(Default)]
    pub struct FakeAudit {
        counts: HashMap<String, usize>,
        failing: Vec<String>,
        pub lookups: Mutex<Vec<EventLookup>>,
    }

    impl FakeAudit {
        pub fn with_events(mut self, event_source: &str, count: usize) -> Self {
            self.counts.insert(event_source.to_string(), count);
            self
        }

        pub fn failing(mut self, event_source: &str) -> Self {
            self.failing.push(event_source.to_string());
            self
        }
    }

    #[async_trait]
    impl AuditTrailApi for FakeAudit {
        async fn count_events(&self, lookup: &EventLookup) -> Result<u32> {
            self.lookups.lock().unwrap().push(lookup.clone());
            if self.failing.contains(&lookup.event_source) {
                return Err(CostError::Api(format!("lookup failed for {}", lookup.event_source)));
            }
            let count = self
                .counts
                .get(&lookup.event_source)
                .copied()
                .unwrap_or(0)
                .min(lookup.max_results as usize);
            Ok(count as u32)
        }
    }

    pub fn point(hours_ago: i64, value: f64) -> Datapoint {
        Datapoint {
            timestamp: Utc::now() - chrono::Duration::hours(hours_ago),
            value: Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_apis_report_integration_unavailable() {
        let apis = ProviderApis::unavailable();
        let period = BillingPeriod::month(2025, 11).unwrap();
        let err = apis
            .ledger
            .cost_and_usage(&LedgerQuery::daily(period, vec![LedgerDimension::Service]))
            .await
            .unwrap_err();
        assert!(err.is_integration_unavailable());
        assert!(err.to_string().contains("--features aws"));
        assert!(!apis.audit.is_available());
    }

    #[test]
    fn metric_query_finds_dimension() {
        let query = MetricQuery {
            namespace: "AWS/Billing".into(),
            metric_name: "EstimatedCharges".into(),
            dimensions: vec![
                ("Currency".into(), "USD".into()),
                ("ServiceName".into(), "AmazonS3".into()),
            ],
            start: Utc::now(),
            end: Utc::now(),
            period_seconds: 3600,
        };
        assert_eq!(query.dimension("ServiceName"), Some("AmazonS3"));
        assert_eq!(query.dimension("Region"), None);
    }
}
