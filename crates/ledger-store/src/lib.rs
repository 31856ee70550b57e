//! Ledger store for the order fulfillment orchestrator.
//!
//! Persists orders and the auxiliary ledgers keyed by order id. Balance and
//! usage counters are adjusted atomically inside the store, and every
//! ledger insert is guarded by a uniqueness key so retried steps are no-ops.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod settings;
pub mod store;

pub use error::{LedgerError, Result};
pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use query::OrderQuery;
pub use settings::{CommissionSettings, FixedCommissionSettings};
pub use store::{CoinReconciliation, LedgerStore, LedgerStoreExt, Recorded};
