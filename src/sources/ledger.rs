//! Cost Explorer backed sources: current month and fixed past periods

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;

use super::ranking::{ServiceTotals, DEFAULT_TOP_SERVICES};
use super::{assemble_snapshot, ActivityAugmenter, CostSnapshot, CostSource, SourceKind};
use crate::api::{CostLedgerApi, LedgerDimension, LedgerQuery};
use crate::error::Result;
use crate::period::BillingPeriod;

/// Per-service unblended cost for a billing period, summed across days
pub struct UsageLedgerSource {
    api: Arc<dyn CostLedgerApi>,
    augmenter: Option<Arc<ActivityAugmenter>>,
    period: Option<BillingPeriod>,
    limit: usize,
}

impl UsageLedgerSource {
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

    /// Query a fixed period instead of month to date
    pub fn with_period(mut self, period: BillingPeriod) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn period(&self) -> BillingPeriod {
        self.period
            .unwrap_or_else(|| BillingPeriod::current(Local::now().date_naive()))
    }

    /// Raw per-service totals in first-seen order, negligible entries included
    pub async fn service_totals(&self) -> Result<ServiceTotals> {
        let period = self.period();
        tracing::debug!(period = %period, "Fetching service costs from Cost Explorer");

        let query = LedgerQuery::daily(period, vec![LedgerDimension::Service]);
        let buckets = self.api.cost_and_usage(&query).await?;

        let mut totals = ServiceTotals::new();
        for group in buckets.iter().flat_map(|bucket| bucket.groups.iter()) {
            if let Some(service) = group.keys.first() {
                totals.add(service, group.amount);
            }
        }
        Ok(totals)
    }

    /// Billable per-service costs, used as a breakdown by other strategies
    pub async fn service_costs(&self) -> Result<Vec<(String, f64)>> {
        let totals = self.service_totals().await?;
        Ok(totals
            .into_entries()
            .into_iter()
            .filter(|(_, cost)| super::ranking::is_billable(*cost))
            .collect())
    }

    async fn snapshot(&self, augmenter: Option<&ActivityAugmenter>) -> Result<CostSnapshot> {
        let totals = self.service_totals().await?;
        let total = totals.billable_total();
        Ok(assemble_snapshot(total, totals.into_entries(), self.limit, augmenter).await)
    }
}

#[async_trait]
impl CostSource for UsageLedgerSource {
    async fn fetch(&self) -> Result<CostSnapshot> {
        let snapshot = self.snapshot(self.augmenter.as_deref()).await?;
        tracing::debug!(
            total = snapshot.month_to_date_total(),
            services = snapshot.top_services().len(),
            "Cost Explorer snapshot ready"
        );
        Ok(snapshot)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::UsageLedger
    }

    fn description(&self) -> &'static str {
        "Cost Explorer, month to date"
    }
}

/// A closed past billing period; activity is always 0
pub struct HistoricalLedgerSource {
    ledger: UsageLedgerSource,
}

impl HistoricalLedgerSource {
    pub fn new(api: Arc<dyn CostLedgerApi>, period: BillingPeriod) -> Self {
        Self {
            ledger: UsageLedgerSource::new(api).with_period(period),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.ledger = self.ledger.with_limit(limit);
        self
    }

    pub fn period(&self) -> BillingPeriod {
        self.ledger.period()
    }
}

#[async_trait]
impl CostSource for HistoricalLedgerSource {
    async fn fetch(&self) -> Result<CostSnapshot> {
        let snapshot = self.ledger.snapshot(None).await?;
        tracing::info!(
            period = %self.period(),
            total = snapshot.month_to_date_total(),
            services = snapshot.top_services().len(),
            "Historical costs fetched"
        );
        Ok(snapshot)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::HistoricalLedger
    }

    fn description(&self) -> &'static str {
        "Cost Explorer, past billing period"
    }
}
