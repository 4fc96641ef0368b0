//! Simulated cost source
//!
//! Realistic small-account numbers with ±10% jitter so repeated refreshes look
//! live without touching AWS.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::ranking::{self, DEFAULT_TOP_SERVICES};
use super::{CostSnapshot, CostSource, ServiceCost, SourceKind};
use crate::error::Result;

const JITTER: f64 = 0.1;
const DEFAULT_ACTIVITY_RANGE: (u32, u32) = (0, 50);

/// Base costs and activity ranges the simulation draws from
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    pub services: Vec<(String, f64)>,
    pub activity_ranges: HashMap<String, (u32, u32)>,
}

impl SimulationProfile {
    pub fn base_total(&self) -> f64 {
        self.services.iter().map(|(_, cost)| cost).sum()
    }

    fn activity_range(&self, service: &str) -> (u32, u32) {
        self.activity_ranges
            .get(service)
            .copied()
            .unwrap_or(DEFAULT_ACTIVITY_RANGE)
    }
}

impl Default for SimulationProfile {
    /// Typical small account, about $2.13 month to date
    fn default() -> Self {
        const SERVICES: &[(&str, f64, (u32, u32))] = &[
            ("AWS WAF", 1.48, (50, 200)),
            ("AWS Amplify", 0.34, (10, 50)),
            ("AWS Cost Explorer", 0.24, (5, 20)),
            ("Amazon EC2 Container Registry (ECR)", 0.04, (20, 80)),
            ("Amazon Bedrock AgentCore", 0.01, (5, 30)),
            ("Amazon S3", 0.01, (100, 500)),
            ("Amazon CloudWatch", 0.01, (200, 800)),
        ];
        Self {
            services: SERVICES
                .iter()
                .map(|(name, cost, _)| (name.to_string(), *cost))
                .collect(),
            activity_ranges: SERVICES
                .iter()
                .map(|(name, _, range)| (name.to_string(), *range))
                .collect(),
        }
    }
}

pub struct SimulatedSource {
    profile: SimulationProfile,
    limit: usize,
    rng: Mutex<StdRng>,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic output for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            profile: SimulationProfile::default(),
            limit: DEFAULT_TOP_SERVICES,
            rng: Mutex::new(rng),
        }
    }

    pub fn with_profile(mut self, profile: SimulationProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn profile(&self) -> &SimulationProfile {
        &self.profile
    }

    /// Produce one snapshot; never fails
    pub fn generate(&self) -> CostSnapshot {
        // A poisoned lock only means another generate() panicked mid-draw
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let costs: Vec<(String, f64)> = self
            .profile
            .services
            .iter()
            .map(|(name, base)| {
                let factor = rng.gen_range((1.0 - JITTER)..=(1.0 + JITTER));
                (name.clone(), jittered_cost(*base, factor))
            })
            .collect();

        let total: f64 = costs.iter().map(|(_, cost)| cost).sum();
        let ranked = ranking::top_services(costs, self.limit);

        let top_services = ranked
            .into_iter()
            .map(|(name, cost)| {
                let (min, max) = self.profile.activity_range(&name);
                let activity_count = rng.gen_range(min..=max.max(min));
                ServiceCost {
                    name,
                    cost,
                    activity_count,
                }
            })
            .collect();

        CostSnapshot::new(ranking::round_cents(total), top_services)
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Round `base * factor` to cents without leaving the ±10% band
fn jittered_cost(base: f64, factor: f64) -> f64 {
    let lowest = ((base * (1.0 - JITTER)) * 100.0).ceil() / 100.0;
    let highest = ((base * (1.0 + JITTER)) * 100.0).floor() / 100.0;
    let rounded = ranking::round_cents(base * factor);
    if lowest > highest {
        return rounded;
    }
    rounded.clamp(lowest, highest)
}

#[async_trait]
impl CostSource for SimulatedSource {
    async fn fetch(&self) -> Result<CostSnapshot> {
        tracing::debug!("Generating simulated cost data");
        Ok(self.generate())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Simulated
    }

    fn description(&self) -> &'static str {
        "Simulated demo data"
    }
}
