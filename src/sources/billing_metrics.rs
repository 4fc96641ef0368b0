//! CloudWatch billing metrics
//!
//! `EstimatedCharges` updates every few hours, well ahead of Cost Explorer's
//! 24-48 hour delay. Per-service series only exist for services the account
//! has been billed for, so most checklist queries come back empty.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;

use super::activity::DEFAULT_CONCURRENCY;
use super::ranking::{self, DEFAULT_TOP_SERVICES};
use super::{
    assemble_snapshot, ActivityAugmenter, CostSnapshot, CostSource, SourceKind, UsageLedgerSource,
};
use crate::api::{BillingMetricsApi, Datapoint, MetricQuery};
use crate::error::Result;

const NAMESPACE: &str = "AWS/Billing";
const METRIC_NAME: &str = "EstimatedCharges";
const CURRENCY: &str = "USD";
const PERIOD_SECONDS: u32 = 3600;
const LOOKBACK_HOURS: i64 = 24;

/// `ServiceName` dimension values checked for a per-service breakdown
pub const SERVICE_CHECKLIST: [&str; 24] = [
    "AmazonEC2",
    "AmazonS3",
    "AmazonRDS",
    "AWSLambda",
    "AmazonCloudFront",
    "AmazonDynamoDB",
    "AmazonECS",
    "AmazonSQS",
    "AmazonSNS",
    "AWSDataTransfer",
    "AmazonCloudWatch",
    "AWSWAF",
    "AWSAmplify",
    "AWSCostExplorer",
    "AmazonECR",
    "AmazonBedrock",
    "AWSSecretsManager",
    "AWSKeyManagementService",
    "AmazonAPIGateway",
    "AmazonCognito",
    "AmazonTextract",
    "AmazonRekognition",
    "AmazonComprehend",
    "AWSGlue",
];

static VENDOR_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Amazon|AWS)(\S)").expect("valid vendor prefix regex"));

/// `"AmazonEC2"` -> `"Amazon EC2"`
pub fn readable_service_name(identifier: &str) -> String {
    VENDOR_PREFIX.replace(identifier, "$1 $2").into_owned()
}

/// Latest datapoint wins, regardless of response order
fn latest_value(points: &[Datapoint]) -> Option<f64> {
    points
        .iter()
        .max_by_key(|point| point.timestamp)
        .and_then(|point| point.value)
}

/// Aggregate total plus whatever per-service series exist
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricBreakdown {
    pub total: f64,
    pub services: Vec<(String, f64)>,
}

pub struct BillingMetricsSource {
    api: Arc<dyn BillingMetricsApi>,
    checklist: Vec<String>,
    lookback: Duration,
    concurrency: usize,
}

impl BillingMetricsSource {
    pub fn new(api: Arc<dyn BillingMetricsApi>) -> Self {
        Self {
            api,
            checklist: SERVICE_CHECKLIST.iter().map(|s| s.to_string()).collect(),
            lookback: Duration::hours(LOOKBACK_HOURS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_checklist(mut self, checklist: Vec<String>) -> Self {
        self.checklist = checklist;
        self
    }

    fn query(&self, service: Option<&str>) -> MetricQuery {
        let end = Utc::now();
        let mut dimensions = vec![("Currency".to_string(), CURRENCY.to_string())];
        if let Some(service) = service {
            dimensions.push(("ServiceName".to_string(), service.to_string()));
        }
        MetricQuery {
            namespace: NAMESPACE.to_string(),
            metric_name: METRIC_NAME.to_string(),
            dimensions,
            start: end - self.lookback,
            end,
            period_seconds: PERIOD_SECONDS,
        }
    }

    /// Latest estimated charges, account-wide when `service` is `None`
    pub async fn estimated_charges(&self, service: Option<&str>) -> Result<Option<f64>> {
        let points = self.api.metric_statistics(&self.query(service)).await?;
        Ok(latest_value(&points))
    }

    pub async fn breakdown(&self) -> Result<MetricBreakdown> {
        tracing::debug!("Fetching billing data from CloudWatch");
        let total = self.estimated_charges(None).await?.unwrap_or(0.0);
        tracing::debug!(total, "Total estimated charges");

        let results: Vec<Option<(String, f64)>> = stream::iter(self.checklist.iter().cloned())
            .map(|service| async move {
                match self.estimated_charges(Some(service.as_str())).await {
                    Ok(Some(cost)) if ranking::is_billable(cost) => {
                        Some((readable_service_name(&service), ranking::round_cents(cost)))
                    }
                    Ok(_) => None,
                    Err(e) => {
                        tracing::debug!(service = %service, "Skipping service: {}", e);
                        None
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let services: Vec<(String, f64)> = results.into_iter().flatten().collect();
        tracing::debug!(
            checked = self.checklist.len(),
            billed = services.len(),
            "Per-service billing metrics"
        );
        Ok(MetricBreakdown { total, services })
    }
}

/// Billing metrics total; breakdown from Cost Explorer when CloudWatch has none
pub struct BillingMetricsWithLedgerFallback {
    metrics: BillingMetricsSource,
    ledger: UsageLedgerSource,
    augmenter: Option<Arc<ActivityAugmenter>>,
    limit: usize,
}

impl BillingMetricsWithLedgerFallback {
    pub fn new(metrics: BillingMetricsSource, ledger: UsageLedgerSource) -> Self {
        Self {
            metrics,
            ledger,
            augmenter: None,
            limit: DEFAULT_TOP_SERVICES,
        }
    }

    pub fn with_augmenter(mut self, augmenter: Arc<ActivityAugmenter>) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl CostSource for BillingMetricsWithLedgerFallback {
    async fn fetch(&self) -> Result<CostSnapshot> {
        let MetricBreakdown { total, services } = self.metrics.breakdown().await?;

        let services = if services.is_empty() && total > 0.0 {
            tracing::info!("No service breakdown from CloudWatch, using Cost Explorer for services");
            match self.ledger.service_costs().await {
                Ok(costs) => costs,
                Err(e) => {
                    tracing::warn!("Cost Explorer breakdown failed: {}", e);
                    Vec::new()
                }
            }
        } else {
            services
        };

        Ok(assemble_snapshot(total, services, self.limit, self.augmenter.as_deref()).await)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::BillingMetrics
    }

    fn description(&self) -> &'static str {
        "CloudWatch billing metrics"
    }
}
