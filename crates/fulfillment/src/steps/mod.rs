//! Order-creation side effects, each modelled as a [`Step`].
//!
//! Steps run in a fixed sequence after the order row is stored. Each one
//! commits on its own; a failed step is reported and the sequence moves on.

pub mod affiliate;
pub mod coins;
pub mod discount;
pub mod shipment;

use async_trait::async_trait;
use common::{AffiliateId, DiscountId, Money, UserId};
use domain::Order;
use serde::Serialize;

use crate::context::FulfillmentContext;
use crate::error::StepError;

pub use affiliate::AffiliateCommissionStep;
pub use coins::{CashbackStep, CoinDebitStep};
pub use discount::DiscountStep;
pub use shipment::{ShipmentProvisioner, ShipmentStep};

/// Identifies a step in outcomes, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Discount,
    AffiliateCommission,
    CoinDebit,
    Cashback,
    Shipment,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Discount => "discount",
            StepKind::AffiliateCommission => "affiliate_commission",
            StepKind::CoinDebit => "coin_debit",
            StepKind::Cashback => "cashback",
            StepKind::Shipment => "shipment",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a step did when it did not fail.
///
/// `newly_recorded` is false when the ledger already held the row, i.e. the
/// step ran before for this order and this run changed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppliedFact {
    /// Nothing to do for this order.
    Skipped { reason: String },
    DiscountRecorded {
        discount_id: DiscountId,
        amount: Money,
        newly_recorded: bool,
    },
    CommissionCredited {
        affiliate_id: AffiliateId,
        rate_bps: u32,
        commission: Money,
        /// Coins credited to the affiliate's linked account, if any.
        coins: Option<i64>,
        newly_recorded: bool,
    },
    CoinsDebited {
        user_id: UserId,
        coins: i64,
        newly_recorded: bool,
    },
    CashbackCredited {
        user_id: UserId,
        coins: i64,
        newly_recorded: bool,
    },
    ShipmentCreated {
        shipment_id: Option<String>,
        pickup_location: String,
        retried: bool,
    },
}

impl AppliedFact {
    pub fn skipped(reason: impl Into<String>) -> Self {
        AppliedFact::Skipped {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepResult {
    Applied(AppliedFact),
    Failed(String),
}

/// Result of one step for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: StepKind,
    #[serde(flatten)]
    pub result: StepResult,
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.result, StepResult::Failed(_))
    }
}

/// One locally-committed side effect of placing an order.
#[async_trait]
pub trait Step: Send + Sync {
    fn kind(&self) -> StepKind;

    async fn apply(&self, ctx: &FulfillmentContext, order: &Order)
    -> Result<AppliedFact, StepError>;
}

/// The order-creation steps in execution order.
pub fn default_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(DiscountStep),
        Box::new(AffiliateCommissionStep),
        Box::new(CoinDebitStep),
        Box::new(CashbackStep),
        Box::new(ShipmentStep),
    ]
}
