//! Recent activity counts per service from the audit trail

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};

use crate::api::{AuditTrailApi, EventLookup};

/// Default lookback window for activity counts
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Default cap on events returned by a single lookup
pub const DEFAULT_MAX_RESULTS: u32 = 50;

/// Default fan-out for per-service provider calls
pub const DEFAULT_CONCURRENCY: usize = 4;

const EVENT_SOURCE_SUFFIX: &str = ".amazonaws.com";
const KNOWN_PREFIXES: &[&str] = &["amazon ", "aws "];

/// Maps Cost Explorer service names to CloudTrail event sources
#[derive(Debug, Clone)]
pub struct ServiceIdentifierMap {
    sources: HashMap<String, String>,
}

impl ServiceIdentifierMap {
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            sources: entries.into_iter().collect(),
        }
    }

    /// Known mappings for common AWS services
    pub fn aws_default() -> Self {
        const ENTRIES: &[(&str, &str)] = &[
            ("Amazon EC2", "ec2.amazonaws.com"),
            ("Amazon S3", "s3.amazonaws.com"),
            ("Amazon RDS", "rds.amazonaws.com"),
            ("AWS Lambda", "lambda.amazonaws.com"),
            ("Amazon CloudFront", "cloudfront.amazonaws.com"),
            ("Amazon DynamoDB", "dynamodb.amazonaws.com"),
            ("Amazon ECS", "ecs.amazonaws.com"),
            ("Amazon SQS", "sqs.amazonaws.com"),
            ("Amazon SNS", "sns.amazonaws.com"),
            ("AWS Fargate", "ecs.amazonaws.com"),
            ("Amazon EKS", "eks.amazonaws.com"),
            ("Amazon ElastiCache", "elasticache.amazonaws.com"),
            ("Amazon Redshift", "redshift.amazonaws.com"),
            ("AWS Glue", "glue.amazonaws.com"),
            ("Amazon CloudWatch", "monitoring.amazonaws.com"),
            ("AWS Key Management Service", "kms.amazonaws.com"),
            ("Amazon Route 53", "route53.amazonaws.com"),
            ("Amazon API Gateway", "apigateway.amazonaws.com"),
            ("AWS Secrets Manager", "secretsmanager.amazonaws.com"),
            (
                "Amazon Elastic Load Balancing",
                "elasticloadbalancing.amazonaws.com",
            ),
        ];
        Self::new(
            ENTRIES
                .iter()
                .map(|(name, source)| (name.to_string(), source.to_string())),
        )
    }

    /// Event source for `service`, derived heuristically when unmapped
    pub fn resolve(&self, service: &str) -> String {
        if let Some(source) = self.sources.get(service) {
            return source.clone();
        }
        derive_event_source(service)
    }
}

/// `"Amazon Fancy Service"` -> `"fancyservice.amazonaws.com"`
fn derive_event_source(service: &str) -> String {
    let lowered = service.trim().to_lowercase();
    let stripped = KNOWN_PREFIXES
        .iter()
        .find_map(|prefix| lowered.strip_prefix(prefix))
        .unwrap_or(&lowered);
    let compact: String = stripped.chars().filter(|c| !c.is_whitespace()).collect();
    format!("{compact}{EVENT_SOURCE_SUFFIX}")
}

/// How an activity batch was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// Lookups were issued; `failed` of them were replaced by zero
    Queried { failed: usize },
    /// The audit capability is missing entirely; every count is zero
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct ActivityReport {
    pub counts: HashMap<String, u32>,
    pub outcome: ActivityOutcome,
}

impl ActivityReport {
    pub fn count(&self, service: &str) -> u32 {
        self.counts.get(service).copied().unwrap_or(0)
    }
}

pub struct ActivityAugmenter {
    audit: Arc<dyn AuditTrailApi>,
    identifiers: Arc<ServiceIdentifierMap>,
    lookback: Duration,
    max_results: u32,
    concurrency: usize,
}

impl ActivityAugmenter {
    pub fn new(audit: Arc<dyn AuditTrailApi>, identifiers: Arc<ServiceIdentifierMap>) -> Self {
        Self {
            audit,
            identifiers,
            lookback: Duration::hours(DEFAULT_LOOKBACK_HOURS),
            max_results: DEFAULT_MAX_RESULTS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Count recent events for each service.
    ///
    /// Never fails: a failed lookup zeroes only its own service.
    pub async fn activity_counts(&self, services: &[String]) -> ActivityReport {
        if !self.audit.is_available() {
            tracing::warn!(
                services = services.len(),
                "Audit trail integration unavailable, activity counts default to 0"
            );
            return ActivityReport {
                counts: services.iter().map(|name| (name.clone(), 0)).collect(),
                outcome: ActivityOutcome::Unavailable,
            };
        }

        let end = Utc::now();
        let start = end - self.lookback;

        let results: Vec<(String, Option<u32>)> = stream::iter(services.iter().cloned())
            .map(|service| async move {
                let lookup = EventLookup {
                    event_source: self.identifiers.resolve(&service),
                    start,
                    end,
                    max_results: self.max_results,
                };
                match self.audit.count_events(&lookup).await {
                    Ok(count) => (service, Some(count)),
                    Err(e) => {
                        tracing::debug!(
                            service = %service,
                            event_source = %lookup.event_source,
                            "Activity lookup failed: {}",
                            e
                        );
                        (service, None)
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|(_, count)| count.is_none()).count();
        if failed > 0 {
            tracing::warn!(failed, total = results.len(), "Some activity lookups failed");
        }

        ActivityReport {
            counts: results
                .into_iter()
                .map(|(service, count)| (service, count.unwrap_or(0)))
                .collect(),
            outcome: ActivityOutcome::Queried { failed },
        }
    }
}
