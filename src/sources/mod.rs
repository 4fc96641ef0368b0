//! Cost retrieval strategies
//!
//! Every strategy produces a [`CostSnapshot`]. Leaf sources expose their raw
//! breakdown so composites such as [`BillingMetricsWithLedgerFallback`] can
//! chain them explicitly.

mod traits;
pub mod activity;
pub mod billing_metrics;
pub mod credit_adjusted;
pub mod ledger;
pub mod ranking;
pub mod selector;
pub mod simulated;

pub use activity::{ActivityAugmenter, ActivityOutcome, ActivityReport, ServiceIdentifierMap};
pub use billing_metrics::{BillingMetricsSource, BillingMetricsWithLedgerFallback};
pub use credit_adjusted::{CreditAdjustedUsageSource, CreditSummary};
pub use ledger::{HistoricalLedgerSource, UsageLedgerSource};
pub use ranking::{format_currency, top_services, NEGLIGIBLE_COST};
pub use selector::{Fallback, Selection, StrategySelector};
pub use simulated::{SimulatedSource, SimulationProfile};
pub use traits::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Strategy identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Simulated,
    BillingMetrics,
    UsageLedger,
    CreditAdjusted,
    HistoricalLedger,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Simulated => "simulated",
            SourceKind::BillingMetrics => "billing_metrics",
            SourceKind::UsageLedger => "usage_ledger",
            SourceKind::CreditAdjusted => "credit_adjusted",
            SourceKind::HistoricalLedger => "historical_ledger",
        }
    }
}

/// One ranked service line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCost {
    pub name: String,
    pub cost: f64,
    pub activity_count: u32,
}

/// Billing summary handed to the display sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSnapshot {
    as_of: DateTime<Utc>,
    month_to_date_total: f64,
    top_services: Vec<ServiceCost>,
}

impl CostSnapshot {
    pub fn new(month_to_date_total: f64, top_services: Vec<ServiceCost>) -> Self {
        Self {
            as_of: Utc::now(),
            month_to_date_total: month_to_date_total.max(0.0),
            top_services,
        }
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn month_to_date_total(&self) -> f64 {
        self.month_to_date_total
    }

    pub fn top_services(&self) -> &[ServiceCost] {
        &self.top_services
    }

    /// The first `limit` services, for displays that show fewer lines
    pub fn display_services(&self, limit: usize) -> &[ServiceCost] {
        &self.top_services[..self.top_services.len().min(limit)]
    }
}

/// Rank a breakdown and attach activity counts.
///
/// `total` is taken as-is; it is never reconciled against the ranked services.
pub(crate) async fn assemble_snapshot(
    total: f64,
    services: Vec<(String, f64)>,
    limit: usize,
    augmenter: Option<&ActivityAugmenter>,
) -> CostSnapshot {
    let ranked = ranking::rank_breakdown(services, limit);
    let report = match augmenter {
        Some(augmenter) => {
            let names: Vec<String> = ranked.iter().map(|(name, _)| name.clone()).collect();
            Some(augmenter.activity_counts(&names).await)
        }
        None => None,
    };

    let top_services = ranked
        .into_iter()
        .map(|(name, cost)| {
            let activity_count = report.as_ref().map_or(0, |report| report.count(&name));
            ServiceCost {
                name,
                cost,
                activity_count,
            }
        })
        .collect();

    CostSnapshot::new(ranking::round_cents(total), top_services)
}
