//! Widget settings
//!
//! Read from a JSON file with snake_case keys. Every field is optional and
//! falls back to its default, and a missing file means all defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{CostError, Result};
use crate::period::DisplayPeriod;

pub const APP_DIR_NAME: &str = "CostBar";
const CONFIG_FILENAME: &str = "config.json";

/// One week
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;
/// CloudTrail event history only reaches back 90 days
pub const MAX_ACTIVITY_LOOKBACK_HOURS: i64 = 90 * 24;

/// Strategy probed for the current month
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveSource {
    /// Cost Explorer usage before credits
    #[default]
    CreditAdjusted,
    /// CloudWatch estimated charges, Cost Explorer breakdown as needed
    BillingMetrics,
    /// Cost Explorer unblended cost
    UsageLedger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetSettings {
    pub use_simulated_data: bool,
    /// `"current"`, a month name, or `"YYYY-MM"`
    pub display_month: String,
    /// Seconds between refreshes
    pub refresh_interval: u64,
    pub top_services_limit: usize,
    pub display_limit: usize,
    pub live_source: LiveSource,
    pub activity_lookback_hours: i64,
    pub activity_max_results: u32,
    pub max_concurrent_requests: usize,
    pub simulation_seed: Option<u64>,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            use_simulated_data: false,
            display_month: "current".to_string(),
            refresh_interval: 300,
            top_services_limit: 10,
            display_limit: 5,
            live_source: LiveSource::default(),
            activity_lookback_hours: 24,
            activity_max_results: 50,
            max_concurrent_requests: 4,
            simulation_seed: None,
        }
    }
}

impl WidgetSettings {
    /// `<config_dir>/CostBar/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILENAME))
    }

    /// Load and validate; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&contents).map_err(|e| {
            CostError::Config(format!("invalid settings in {}: {}", path.display(), e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from the default location, or defaults when there is none
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_at(Local::now().date_naive())
    }

    /// Validate with month names resolved against `today`
    pub fn validate_at(&self, today: NaiveDate) -> Result<()> {
        if self.refresh_interval == 0 || self.refresh_interval > MAX_REFRESH_INTERVAL_SECS {
            return Err(CostError::Config(format!(
                "refresh_interval must be between 1 and {MAX_REFRESH_INTERVAL_SECS} seconds"
            )));
        }
        if self.top_services_limit == 0 {
            return Err(CostError::Config("top_services_limit must be positive".into()));
        }
        if self.display_limit == 0 {
            return Err(CostError::Config("display_limit must be positive".into()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(CostError::Config(
                "max_concurrent_requests must be positive".into(),
            ));
        }
        if !(1..=MAX_ACTIVITY_LOOKBACK_HOURS).contains(&self.activity_lookback_hours) {
            return Err(CostError::Config(format!(
                "activity_lookback_hours must be between 1 and {MAX_ACTIVITY_LOOKBACK_HOURS}"
            )));
        }
        self.display_period(today)?;
        Ok(())
    }

    pub fn refresh_duration(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub fn display_period(&self, today: NaiveDate) -> Result<DisplayPeriod> {
        DisplayPeriod::parse(&self.display_month, today)
    }
}
