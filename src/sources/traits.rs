//! Cost source trait definition

use async_trait::async_trait;

use super::{CostSnapshot, SourceKind};
use crate::error::Result;

/// Trait for implementing a cost retrieval strategy
#[async_trait]
pub trait CostSource: Send + Sync {
    /// Fetch a fresh snapshot
    async fn fetch(&self) -> Result<CostSnapshot>;

    fn kind(&self) -> SourceKind;

    /// Get the strategy description
    fn description(&self) -> &'static str {
        ""
    }
}
