//! Explicit context shared by every fulfillment step.
//!
//! Built once at start-up and passed by reference; there is no process-wide
//! mutable state behind it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::TransitionPolicy;
use domain::loyalty::DEFAULT_COMMISSION_RATE_BPS;
use ledger_store::{CommissionSettings, LedgerStore};

use crate::carrier::CarrierClient;
use crate::error::StepError;
use crate::notifier::{Notifier, NotifierGateway};

/// Pickup token used when no pickup location is configured.
pub const DEFAULT_PICKUP_LOCATION: &str = "Primary";

/// Default bound on carrier and commission-settings calls.
pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Tunables for the fulfillment workflow.
#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    /// Carrier pickup locations in preference order.
    pub pickup_locations: Vec<String>,

    /// Token used when `pickup_locations` is empty.
    pub fallback_pickup_location: String,

    /// Bound on every carrier and commission-settings call.
    pub external_timeout: Duration,

    pub transition_policy: TransitionPolicy,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            pickup_locations: Vec::new(),
            fallback_pickup_location: DEFAULT_PICKUP_LOCATION.to_string(),
            external_timeout: DEFAULT_EXTERNAL_TIMEOUT,
            transition_policy: TransitionPolicy::default(),
        }
    }
}

impl FulfillmentSettings {
    /// The pickup location tried first for a new shipment.
    pub fn primary_pickup_location(&self) -> &str {
        self.pickup_locations
            .iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or(&self.fallback_pickup_location)
    }
}

/// Collaborators and settings for the orchestrator and its steps.
#[derive(Clone)]
pub struct FulfillmentContext {
    store: Arc<dyn LedgerStore>,
    carrier: Arc<dyn CarrierClient>,
    commission: Arc<dyn CommissionSettings>,
    notifier: NotifierGateway,
    clock: Arc<dyn Clock>,
    settings: FulfillmentSettings,
}

impl FulfillmentContext {
    /// Creates a context with the system clock and default settings.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        carrier: Arc<dyn CarrierClient>,
        commission: Arc<dyn CommissionSettings>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            carrier,
            commission,
            notifier: NotifierGateway::new(notifier),
            clock: Arc::new(SystemClock),
            settings: FulfillmentSettings::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: FulfillmentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    pub fn carrier(&self) -> &dyn CarrierClient {
        self.carrier.as_ref()
    }

    pub fn notifier(&self) -> &NotifierGateway {
        &self.notifier
    }

    pub fn settings(&self) -> &FulfillmentSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs an external call under the configured timeout.
    pub async fn bounded<T, E, F>(&self, operation: &'static str, call: F) -> Result<T, StepError>
    where
        F: Future<Output = Result<T, E>>,
        StepError: From<E>,
    {
        let timeout = self.settings.external_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(StepError::from),
            Err(_) => Err(StepError::Timeout { operation, timeout }),
        }
    }

    /// The active commission rate, or the default when none is configured.
    pub async fn commission_rate_bps(&self) -> Result<u32, StepError> {
        let rate = self
            .bounded("commission settings lookup", self.commission.active_rate_bps())
            .await?;
        Ok(rate.unwrap_or(DEFAULT_COMMISSION_RATE_BPS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_pickup_prefers_first_configured() {
        let settings = FulfillmentSettings {
            pickup_locations: vec![" ".to_string(), "Warehouse-2".to_string()],
            ..Default::default()
        };
        assert_eq!(settings.primary_pickup_location(), "Warehouse-2");
    }

    #[test]
    fn test_primary_pickup_falls_back() {
        assert_eq!(
            FulfillmentSettings::default().primary_pickup_location(),
            DEFAULT_PICKUP_LOCATION
        );
    }
}
