//! AWS SDK backed provider APIs
//!
//! Billing metrics are only published in us-east-1, and Cost Explorer is
//! served from there too. CloudTrail uses the ambient region.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudwatch::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudwatch::primitives::DateTime as SmithyDateTime;
use aws_sdk_cloudwatch::types::{Dimension, Statistic};
use aws_sdk_cloudtrail::types::{LookupAttribute, LookupAttributeKey};
use aws_sdk_costexplorer::types::{DateInterval, Granularity, GroupDefinition, GroupDefinitionType};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{
    AuditTrailApi, BillingMetricsApi, CostLedgerApi, Datapoint, EventLookup, LedgerBucket,
    LedgerGroup, LedgerQuery, MetricQuery, ProviderApis,
};
use crate::error::{CostError, Result};

const BILLING_REGION: &str = "us-east-1";

pub struct AwsApis {
    cloudwatch: aws_sdk_cloudwatch::Client,
    cost_explorer: aws_sdk_costexplorer::Client,
    cloudtrail: aws_sdk_cloudtrail::Client,
}

impl AwsApis {
    /// Load credentials and region from the standard AWS provider chain
    pub async fn from_env() -> Self {
        let shared = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let billing = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(BILLING_REGION))
            .load()
            .await;

        tracing::debug!(
            region = ?shared.region(),
            billing_region = BILLING_REGION,
            "AWS clients configured"
        );

        Self {
            cloudwatch: aws_sdk_cloudwatch::Client::new(&billing),
            cost_explorer: aws_sdk_costexplorer::Client::new(&billing),
            cloudtrail: aws_sdk_cloudtrail::Client::new(&shared),
        }
    }

    pub fn into_provider_apis(self) -> ProviderApis {
        let apis = Arc::new(self);
        ProviderApis {
            metrics: apis.clone(),
            ledger: apis.clone(),
            audit: apis,
        }
    }
}

#[async_trait]
impl BillingMetricsApi for AwsApis {
    async fn metric_statistics(&self, query: &MetricQuery) -> Result<Vec<Datapoint>> {
        let mut request = self
            .cloudwatch
            .get_metric_statistics()
            .namespace(&query.namespace)
            .metric_name(&query.metric_name)
            .start_time(to_smithy(query.start))
            .end_time(to_smithy(query.end))
            .period(query.period_seconds as i32)
            .statistics(Statistic::Maximum);

        for (name, value) in &query.dimensions {
            request = request.dimensions(Dimension::builder().name(name).value(value).build());
        }

        let output = request.send().await.map_err(sdk_failure)?;

        Ok(output
            .datapoints()
            .iter()
            .filter_map(|point| {
                let timestamp = point.timestamp().and_then(from_smithy)?;
                Some(Datapoint {
                    timestamp,
                    value: point.maximum(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl CostLedgerApi for AwsApis {
    async fn cost_and_usage(&self, query: &LedgerQuery) -> Result<Vec<LedgerBucket>> {
        let interval = DateInterval::builder()
            .start(query.period.start_iso())
            .end(query.period.end_iso())
            .build()
            .map_err(|e| CostError::Api(format!("invalid time period: {e}")))?;

        let mut buckets = Vec::new();
        let mut next_page_token: Option<String> = None;

        loop {
            let mut request = self
                .cost_explorer
                .get_cost_and_usage()
                .time_period(interval.clone())
                .granularity(Granularity::Daily)
                .metrics(&query.metric)
                .set_next_page_token(next_page_token.take());
            for dimension in &query.group_by {
                request = request.group_by(
                    GroupDefinition::builder()
                        .r#type(GroupDefinitionType::Dimension)
                        .key(dimension.key())
                        .build(),
                );
            }

            let output = request.send().await.map_err(sdk_failure)?;

            for result in output.results_by_time() {
                let mut bucket = LedgerBucket::default();
                for group in result.groups() {
                    let amount = group
                        .metrics()
                        .and_then(|metrics| metrics.get(&query.metric))
                        .and_then(|value| value.amount())
                        .unwrap_or("0");
                    let amount = amount.trim().parse::<f64>().map_err(|e| {
                        CostError::Api(format!("unparseable amount {amount:?}: {e}"))
                    })?;
                    bucket.groups.push(LedgerGroup {
                        keys: group.keys().to_vec(),
                        amount,
                    });
                }
                buckets.push(bucket);
            }

            match output.next_page_token() {
                Some(token) if !token.is_empty() => next_page_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(buckets)
    }
}

#[async_trait]
impl AuditTrailApi for AwsApis {
    async fn count_events(&self, lookup: &EventLookup) -> Result<u32> {
        let attribute = LookupAttribute::builder()
            .attribute_key(LookupAttributeKey::EventSource)
            .attribute_value(&lookup.event_source)
            .build()
            .map_err(|e| CostError::Api(format!("invalid lookup attribute: {e}")))?;

        let output = self
            .cloudtrail
            .lookup_events()
            .lookup_attributes(attribute)
            .start_time(to_smithy(lookup.start))
            .end_time(to_smithy(lookup.end))
            .max_results(lookup.max_results as i32)
            .send()
            .await
            .map_err(sdk_failure)?;

        Ok(output.events().len() as u32)
    }
}

fn sdk_failure<E, R>(err: SdkError<E, R>) -> CostError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = DisplayErrorContext(&err).to_string();
    CostError::from_provider_failure(code.as_deref(), &message)
}

fn to_smithy(time: DateTime<Utc>) -> SmithyDateTime {
    SmithyDateTime::from_secs(time.timestamp())
}

fn from_smithy(time: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(time.secs(), time.subsec_nanos())
}
