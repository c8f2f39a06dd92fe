use async_trait::async_trait;
use crate::{AnalysisError, Bar, BarRequest};

/// Source of historical price bars (market-data provider).
///
/// Implementations own their transport and credentials; the analytics code
/// only ever sees the returned bars.
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn fetch_bars(&self, request: &BarRequest) -> Result<Vec<Bar>, AnalysisError>;
}
