//! Order fulfillment orchestrator.
//!
//! Placing an order stores the order row and then runs a fixed sequence of
//! locally-committed side effects:
//!
//! 1. Discount accounting
//! 2. Affiliate commission
//! 3. Coin debit for coins spent at checkout
//! 4. Cashback credit
//! 5. Carrier shipment creation
//!
//! Only the order row write can fail the request. Step failures are logged,
//! counted and reported back in the [`OrderPlacement`]; nothing is rolled back.
//! Every step is keyed in the ledger so running it again has no further effect.
//!
//! Status updates go through [`OrderOrchestrator::update_order`], which
//! appends the audit history and cancels the carrier shipment on cancellation.

pub mod carrier;
pub mod context;
pub mod error;
pub mod notifier;
pub mod orchestrator;
pub mod steps;

pub use carrier::{
    CarrierClient, HttpCarrierClient, InMemoryCarrier, LoginTokenProvider, ServiceabilityQuery,
    ShipmentCreated, ShipmentRequest, StaticTokenProvider, TokenProvider, TracingCarrier,
};
pub use context::{Clock, FixedClock, FulfillmentContext, FulfillmentSettings, SystemClock};
pub use error::{CarrierError, FulfillmentError, Result, StepError};
pub use notifier::{
    Notification, NotificationKind, Notifier, NotifierGateway, NotifyError, RecordingNotifier,
    TracingNotifier,
};
pub use orchestrator::{OrderOrchestrator, OrderPlacement, UserCoins};
pub use steps::{AppliedFact, Step, StepKind, StepOutcome, StepResult};
