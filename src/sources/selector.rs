//! Startup strategy selection
//!
//! Runs once before polling starts. The chosen source is then reused for every
//! tick without probing again.

use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};

use super::{
    ActivityAugmenter, BillingMetricsSource, BillingMetricsWithLedgerFallback,
    CostSnapshot, CostSource, CreditAdjustedUsageSource, HistoricalLedgerSource,
    ServiceIdentifierMap, SimulatedSource, SourceKind, UsageLedgerSource,
};
use crate::api::ProviderApis;
use crate::config::{LiveSource, WidgetSettings};
use crate::error::{CostError, Result};
use crate::period::DisplayPeriod;

/// Why the selector settled on simulated data instead of the probed source
#[derive(Debug)]
pub enum Fallback {
    /// The probe returned exactly $0.00, which usually means provider data
    /// has not landed yet (24-48h delay) rather than a free account
    ZeroTotal { probed: SourceKind },
    /// The probe failed outright
    ProbeFailed { probed: SourceKind, error: CostError },
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::ZeroTotal { probed } => write!(
                f,
                "{} returned $0.00 (data may be delayed 24-48h), showing simulated data",
                probed.as_str()
            ),
            Fallback::ProbeFailed { probed, error } => write!(
                f,
                "{} failed, showing simulated data: {}",
                probed.as_str(),
                error
            ),
        }
    }
}

/// The committed strategy
pub struct Selection {
    pub source: Arc<dyn CostSource>,
    pub fallback: Option<Fallback>,
    /// Snapshot from the probe, when the probed source was committed
    pub probe: Option<CostSnapshot>,
}

impl Selection {
    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    fn committed(source: Arc<dyn CostSource>, probe: CostSnapshot) -> Self {
        Self {
            source,
            fallback: None,
            probe: Some(probe),
        }
    }
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("kind", &self.kind())
            .field("fallback", &self.fallback)
            .field("probe", &self.probe)
            .finish()
    }
}

pub struct StrategySelector {
    settings: WidgetSettings,
    apis: ProviderApis,
    identifiers: Arc<ServiceIdentifierMap>,
    today: NaiveDate,
}

impl StrategySelector {
    pub fn new(settings: WidgetSettings, apis: ProviderApis) -> Self {
        Self {
            settings,
            apis,
            identifiers: Arc::new(ServiceIdentifierMap::aws_default()),
            today: Local::now().date_naive(),
        }
    }

    pub fn with_identifiers(mut self, identifiers: Arc<ServiceIdentifierMap>) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Resolve month names against a fixed date
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Pick a strategy, surfacing live probe failures to the caller
    pub async fn select(&self) -> Result<Selection> {
        self.settings.validate_at(self.today)?;
        if self.settings.use_simulated_data {
            tracing::info!("Using simulated data (use_simulated_data enabled)");
            return Ok(self.simulated(None));
        }

        match self.settings.display_period(self.today)? {
            DisplayPeriod::Current => self.select_live().await,
            historical => self.select_historical(historical).await,
        }
    }

    /// Like [`select`](Self::select), but a failed live probe also ends in
    /// simulated data with the failure recorded.
    ///
    /// Configuration errors are still returned; only provider failures fall back.
    pub async fn select_or_simulate(&self) -> Result<Selection> {
        match self.select().await {
            Ok(selection) => Ok(selection),
            Err(error) if error.is_provider_failure() => {
                tracing::error!("Error fetching AWS costs: {}", error);
                tracing::warn!("Falling back to simulated data");
                Ok(self.simulated(Some(Fallback::ProbeFailed {
                    probed: self.live_kind(),
                    error,
                })))
            }
            Err(error) => Err(error),
        }
    }

    async fn select_historical(&self, requested: DisplayPeriod) -> Result<Selection> {
        let period = requested.resolve(self.today)?;
        let label = requested.label();
        tracing::info!(period = %period, "Fetching historical costs for {}", label);

        let source: Arc<dyn CostSource> = Arc::new(
            HistoricalLedgerSource::new(self.apis.ledger.clone(), period)
                .with_limit(self.settings.top_services_limit),
        );

        match source.fetch().await {
            Ok(snapshot) if snapshot.month_to_date_total() == 0.0 => {
                tracing::warn!("No cost data found for {}, using simulated data", label);
                Ok(self.simulated(Some(Fallback::ZeroTotal {
                    probed: SourceKind::HistoricalLedger,
                })))
            }
            Ok(snapshot) => Ok(Selection::committed(source, snapshot)),
            Err(error) => {
                tracing::error!("Error fetching historical costs: {}", error);
                tracing::warn!("Falling back to simulated data");
                Ok(self.simulated(Some(Fallback::ProbeFailed {
                    probed: SourceKind::HistoricalLedger,
                    error,
                })))
            }
        }
    }

    async fn select_live(&self) -> Result<Selection> {
        let source = self.live_source()?;
        tracing::info!(source = source.kind().as_str(), "Probing {}", source.description());

        let snapshot = source.fetch().await?;
        if snapshot.month_to_date_total() == 0.0 {
            tracing::warn!(
                "{} returned $0.00, data may be delayed 24-48h; using simulated data",
                source.description()
            );
            return Ok(self.simulated(Some(Fallback::ZeroTotal {
                probed: source.kind(),
            })));
        }

        tracing::info!(
            source = source.kind().as_str(),
            total = snapshot.month_to_date_total(),
            "Using live AWS cost data"
        );
        Ok(Selection::committed(source, snapshot))
    }

    fn live_kind(&self) -> SourceKind {
        match self.settings.live_source {
            LiveSource::CreditAdjusted => SourceKind::CreditAdjusted,
            LiveSource::BillingMetrics => SourceKind::BillingMetrics,
            LiveSource::UsageLedger => SourceKind::UsageLedger,
        }
    }

    fn augmenter(&self) -> Result<Arc<ActivityAugmenter>> {
        let hours = self.settings.activity_lookback_hours;
        let lookback = Duration::try_hours(hours).ok_or_else(|| {
            CostError::Config(format!("activity_lookback_hours {hours} is out of range"))
        })?;
        Ok(Arc::new(
            ActivityAugmenter::new(self.apis.audit.clone(), self.identifiers.clone())
                .with_lookback(lookback)
                .with_max_results(self.settings.activity_max_results)
                .with_concurrency(self.settings.max_concurrent_requests),
        ))
    }

    /// Live sources track the calendar month, so no fixed period is set
    fn live_source(&self) -> Result<Arc<dyn CostSource>> {
        let limit = self.settings.top_services_limit;
        let augmenter = self.augmenter()?;
        Ok(match self.settings.live_source {
            LiveSource::CreditAdjusted => Arc::new(
                CreditAdjustedUsageSource::new(self.apis.ledger.clone())
                    .with_augmenter(augmenter)
                    .with_limit(limit),
            ),
            LiveSource::UsageLedger => Arc::new(
                UsageLedgerSource::new(self.apis.ledger.clone())
                    .with_augmenter(augmenter)
                    .with_limit(limit),
            ),
            LiveSource::BillingMetrics => Arc::new(
                BillingMetricsWithLedgerFallback::new(
                    BillingMetricsSource::new(self.apis.metrics.clone())
                        .with_concurrency(self.settings.max_concurrent_requests),
                    UsageLedgerSource::new(self.apis.ledger.clone()),
                )
                .with_augmenter(augmenter)
                .with_limit(limit),
            ),
        })
    }

    fn simulated(&self, fallback: Option<Fallback>) -> Selection {
        let source = match self.settings.simulation_seed {
            Some(seed) => SimulatedSource::seeded(seed),
            None => SimulatedSource::new(),
        };
        Selection {
            source: Arc::new(source.with_limit(self.settings.top_services_limit)),
            fallback,
            probe: None,
        }
    }
}
