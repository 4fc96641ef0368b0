//! Usage before credits
//!
//! Accounts running on promotional credits show a net cost near zero. This
//! source reports gross usage so real consumption stays visible.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;

use super::ranking::{ServiceTotals, DEFAULT_TOP_SERVICES};
use super::{assemble_snapshot, ActivityAugmenter, CostSnapshot, CostSource, SourceKind};
use crate::api::{CostLedgerApi, LedgerDimension, LedgerQuery};
use crate::error::Result;
use crate::period::BillingPeriod;

const RECORD_TYPE_USAGE: &str = "Usage";
const RECORD_TYPE_CREDIT: &str = "Credit";

/// Usage and credit totals for the period
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CreditSummary {
    pub usage_total: f64,
    /// Signed; credits normally arrive as negative amounts
    pub credit_total: f64,
}

impl CreditSummary {
    pub fn net_total(&self) -> f64 {
        self.usage_total + self.credit_total
    }
}

pub struct CreditAdjustedUsageSource {
    api: Arc<dyn CostLedgerApi>,
    augmenter: Option<Arc<ActivityAugmenter>>,
    period: Option<BillingPeriod>,
    limit: usize,
}

impl CreditAdjustedUsageSource {
    pub fn new(api: Arc<dyn CostLedgerApi>) -> Self {
        Self {
            api,
            augmenter: None,
            period: None,
            limit: DEFAULT_TOP_SERVICES,
        }
    }

    pub fn with_augmenter(mut self, augmenter: Arc<ActivityAugmenter>) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    pub fn with_period(mut self, period: BillingPeriod) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn period(&self) -> BillingPeriod {
        self.period
            .unwrap_or_else(|| BillingPeriod::current(Local::now().date_naive()))
    }

    /// Totals grouped by record type
    pub async fn credit_summary(&self, period: BillingPeriod) -> Result<CreditSummary> {
        let query = LedgerQuery::daily(period, vec![LedgerDimension::RecordType]);
        let buckets = self.api.cost_and_usage(&query).await?;

        let mut summary = CreditSummary::default();
        for group in buckets.iter().flat_map(|bucket| bucket.groups.iter()) {
            match group.keys.first().map(String::as_str) {
                Some(RECORD_TYPE_USAGE) => summary.usage_total += group.amount,
                Some(RECORD_TYPE_CREDIT) => summary.credit_total += group.amount,
                _ => {}
            }
        }
        Ok(summary)
    }

    /// Positive usage per service; credit lines never enter the breakdown
    pub async fn usage_by_service(&self, period: BillingPeriod) -> Result<ServiceTotals> {
        let query = LedgerQuery::daily(
            period,
            vec![LedgerDimension::Service, LedgerDimension::RecordType],
        );
        let buckets = self.api.cost_and_usage(&query).await?;

        let mut totals = ServiceTotals::new();
        for group in buckets.iter().flat_map(|bucket| bucket.groups.iter()) {
            let (service, record_type) = match group.keys.as_slice() {
                [service, record_type, ..] => (service, record_type),
                _ => continue,
            };
            if record_type == RECORD_TYPE_USAGE && group.amount > 0.0 {
                totals.add(service, group.amount);
            }
        }
        Ok(totals)
    }
}

#[async_trait]
impl CostSource for CreditAdjustedUsageSource {
    async fn fetch(&self) -> Result<CostSnapshot> {
        let period = self.period();
        tracing::debug!(period = %period, "Fetching AWS costs (before credits)");

        let summary = self.credit_summary(period).await?;
        tracing::info!(
            usage = summary.usage_total,
            credits = summary.credit_total,
            net = summary.net_total(),
            "Usage and credits for period"
        );

        let totals = self.usage_by_service(period).await?;
        tracing::debug!(services = totals.len(), "Services with usage");

        Ok(assemble_snapshot(
            summary.usage_total,
            totals.into_entries(),
            self.limit,
            self.augmenter.as_deref(),
        )
        .await)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::CreditAdjusted
    }

    fn description(&self) -> &'static str {
        "Cost Explorer usage before credits"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{FakeAudit, FakeLedger};
    use crate::api::{LedgerBucket, LedgerGroup};
    use crate::sources::ServiceIdentifierMap;

    fn credited_account() -> FakeLedger {
        FakeLedger::default()
            .respond(
                vec![LedgerDimension::RecordType],
                vec![
                    LedgerBucket {
                        groups: vec![
                            LedgerGroup::new(&["Usage"], 40.0),
                            LedgerGroup::new(&["Credit"], -40.0),
                        ],
                    },
                    LedgerBucket {
                        groups: vec![
                            LedgerGroup::new(&["Usage"], 12.5),
                            LedgerGroup::new(&["Credit"], -12.5),
                            LedgerGroup::new(&["Tax"], 1.0),
                        ],
                    },
                ],
            )
            .respond(
                vec![LedgerDimension::Service, LedgerDimension::RecordType],
                vec![
                    LedgerBucket {
                        groups: vec![
                            LedgerGroup::new(&["Amazon EC2", "Usage"], 30.0),
                            LedgerGroup::new(&["Amazon EC2", "Credit"], -30.0),
                            LedgerGroup::new(&["Amazon S3", "Usage"], 10.0),
                        ],
                    },
                    LedgerBucket {
                        groups: vec![
                            LedgerGroup::new(&["Amazon EC2", "Usage"], 12.5),
                            LedgerGroup::new(&["Amazon S3", "Credit"], -10.0),
                            LedgerGroup::new(&["AWS Glue", "Usage"], 0.0005),
                            LedgerGroup::new(&["Refund Service", "Usage"], -2.0),
                        ],
                    },
                ],
            )
    }

    fn november() -> BillingPeriod {
        BillingPeriod::month(2025, 11).unwrap()
    }

    #[tokio::test]
    async fn reports_gross_usage_not_net() {
        let source = CreditAdjustedUsageSource::new(Arc::new(credited_account()))
            .with_period(november());

        let summary = source.credit_summary(november()).await.unwrap();
        assert_eq!(summary.usage_total, 52.5);
        assert_eq!(summary.credit_total, -52.5);
        assert_eq!(summary.net_total(), 0.0);

        let snapshot = source.fetch().await.unwrap();
        assert_eq!(snapshot.month_to_date_total(), 52.5);
    }

    #[tokio::test]
    async fn breakdown_counts_only_positive_usage() {
        let source = CreditAdjustedUsageSource::new(Arc::new(credited_account()))
            .with_period(november());
        let snapshot = source.fetch().await.unwrap();

        let services: Vec<(&str, f64)> = snapshot
            .top_services()
            .iter()
            .map(|s| (s.name.as_str(), s.cost))
            .collect();
        assert_eq!(services, vec![("Amazon EC2", 42.5), ("Amazon S3", 10.0)]);
    }

    #[tokio::test]
    async fn gross_total_holds_for_partial_credits() {
        for (usage, credit) in [(5.0, -1.0), (100.0, -99.99), (3.25, 0.0), (7.5, -20.0)] {
            let ledger = FakeLedger::default().respond(
                vec![LedgerDimension::RecordType],
                vec![LedgerBucket {
                    groups: vec![
                        LedgerGroup::new(&["Usage"], usage),
                        LedgerGroup::new(&["Credit"], credit),
                    ],
                }],
            );
            let source =
                CreditAdjustedUsageSource::new(Arc::new(ledger)).with_period(november());
            let snapshot = source.fetch().await.unwrap();
            assert_eq!(snapshot.month_to_date_total(), usage);
            assert!(snapshot.month_to_date_total() >= usage + credit);
        }
    }

    #[tokio::test]
    async fn issues_record_type_then_service_queries() {
        let ledger = Arc::new(credited_account());
        let audit = FakeAudit::default().with_events("ec2.amazonaws.com", 4);
        let augmenter = Arc::new(ActivityAugmenter::new(
            Arc::new(audit),
            Arc::new(ServiceIdentifierMap::aws_default()),
        ));
        let source = CreditAdjustedUsageSource::new(ledger.clone())
            .with_period(november())
            .with_augmenter(augmenter);
        let snapshot = source.fetch().await.unwrap();
        assert_eq!(snapshot.top_services()[0].activity_count, 4);

        let queries = ledger.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].group_by, vec![LedgerDimension::RecordType]);
        assert_eq!(
            queries[1].group_by,
            vec![LedgerDimension::Service, LedgerDimension::RecordType]
        );
    }
}
