//! Commission settings: the single active commission-rate row.

use async_trait::async_trait;

use crate::Result;

/// Read-only view of the commission settings table.
#[async_trait]
pub trait CommissionSettings: Send + Sync {
    /// Returns the active commission rate in basis points, if one is configured.
    async fn active_rate_bps(&self) -> Result<Option<u32>>;
}

/// Commission settings with a fixed rate, for tests and store-less setups.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedCommissionSettings {
    rate_bps: Option<u32>,
}

impl FixedCommissionSettings {
    pub fn new(rate_bps: Option<u32>) -> Self {
        Self { rate_bps }
    }
}

#[async_trait]
impl CommissionSettings for FixedCommissionSettings {
    async fn active_rate_bps(&self) -> Result<Option<u32>> {
        Ok(self.rate_bps)
    }
}
