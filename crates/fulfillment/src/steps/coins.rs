//! Coin ledger steps: checkout debit and cashback credit.
//!
//! Both go through [`LedgerStore::apply_coin_delta`], which adjusts the
//! balance in the same atomic operation as the transaction insert.
//!
//! [`LedgerStore::apply_coin_delta`]: ledger_store::LedgerStore::apply_coin_delta

use async_trait::async_trait;
use domain::loyalty::cashback_coins;
use domain::{NewCoinTransaction, Order};

use super::{AppliedFact, Step, StepKind};
use crate::context::FulfillmentContext;
use crate::error::StepError;

/// Debits the coins the customer spent at checkout.
///
/// An insufficient balance fails the step and leaves the balance untouched;
/// the order itself stands.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoinDebitStep;

#[async_trait]
impl Step for CoinDebitStep {
    fn kind(&self) -> StepKind {
        StepKind::CoinDebit
    }

    #[tracing::instrument(skip(self, ctx, order), fields(order_id = %order.id))]
    async fn apply(&self, ctx: &FulfillmentContext, order: &Order) -> Result<AppliedFact, StepError> {
        let Some(user_id) = order.user_id else {
            return Ok(AppliedFact::skipped("no linked user"));
        };
        if order.coins_used == 0 {
            return Ok(AppliedFact::skipped("no coins used"));
        }

        let recorded = ctx
            .store()
            .apply_coin_delta(NewCoinTransaction::redemption(
                user_id,
                order.id,
                &order.order_number,
                order.coins_used,
            ))
            .await?;

        Ok(AppliedFact::CoinsDebited {
            user_id,
            coins: order.coins_used,
            newly_recorded: recorded.is_inserted(),
        })
    }
}

/// Credits 5% cashback, in coins, to the ordering customer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CashbackStep;

#[async_trait]
impl Step for CashbackStep {
    fn kind(&self) -> StepKind {
        StepKind::Cashback
    }

    #[tracing::instrument(skip(self, ctx, order), fields(order_id = %order.id))]
    async fn apply(&self, ctx: &FulfillmentContext, order: &Order) -> Result<AppliedFact, StepError> {
        let Some(user_id) = order.user_id else {
            return Ok(AppliedFact::skipped("no linked user"));
        };
        let coins = cashback_coins(order.total);
        if coins == 0 {
            return Ok(AppliedFact::skipped("order total earns no cashback"));
        }

        let recorded = ctx
            .store()
            .apply_coin_delta(NewCoinTransaction::cashback(
                user_id,
                order.id,
                &order.order_number,
                coins,
            ))
            .await?;

        Ok(AppliedFact::CashbackCredited {
            user_id,
            coins,
            newly_recorded: recorded.is_inserted(),
        })
    }
}
