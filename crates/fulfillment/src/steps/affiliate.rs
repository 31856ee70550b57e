//! Affiliate commission: one confirmed referral per (affiliate, order).

use async_trait::async_trait;
use domain::loyalty::{coins_for, commission_for};
use domain::{AffiliateStatus, NewCoinTransaction, NewReferral, Order};

use super::{AppliedFact, Step, StepKind};
use crate::context::FulfillmentContext;
use crate::error::StepError;

/// Credits commission on the order total to the attributed affiliate.
///
/// When the affiliate has a linked customer account the commission is also
/// converted to coins and credited to it. The coin credit carries its own
/// idempotency key, so re-running the step after a partial failure completes
/// the credit without duplicating the referral.
#[derive(Debug, Clone, Copy, Default)]
pub struct AffiliateCommissionStep;

#[async_trait]
impl Step for AffiliateCommissionStep {
    fn kind(&self) -> StepKind {
        StepKind::AffiliateCommission
    }

    #[tracing::instrument(skip(self, ctx, order), fields(order_id = %order.id))]
    async fn apply(&self, ctx: &FulfillmentContext, order: &Order) -> Result<AppliedFact, StepError> {
        let Some(affiliate_id) = order.affiliate_id else {
            return Ok(AppliedFact::skipped("no affiliate attribution"));
        };

        let affiliate = ctx
            .store()
            .get_affiliate(affiliate_id)
            .await?
            .ok_or_else(|| StepError::NotFound {
                entity: "Affiliate",
                id: affiliate_id.to_string(),
            })?;

        if affiliate.status != AffiliateStatus::Active {
            return Err(StepError::Precondition(format!(
                "affiliate {affiliate_id} is {}",
                affiliate.status
            )));
        }

        let rate_bps = ctx.commission_rate_bps().await?;
        let commission = commission_for(order.total, rate_bps);

        let recorded = ctx
            .store()
            .record_referral(NewReferral {
                affiliate_id,
                order_id: order.id,
                commission_rate_bps: rate_bps,
                commission_earned: commission,
            })
            .await?;
        let newly_recorded = recorded.is_inserted();
        let referral = recorded.into_inner();

        let coins = match affiliate.user_id {
            Some(user_id) if coins_for(referral.commission_earned) > 0 => {
                let coins = coins_for(referral.commission_earned);
                ctx.store()
                    .apply_coin_delta(NewCoinTransaction::referral_commission(
                        user_id,
                        order.id,
                        &order.order_number,
                        affiliate_id,
                        coins,
                    ))
                    .await?;
                Some(coins)
            }
            _ => None,
        };

        tracing::info!(
            affiliate_id = %affiliate_id,
            commission = %referral.commission_earned,
            rate_bps = referral.commission_rate_bps,
            newly_recorded,
            "affiliate commission credited"
        );

        Ok(AppliedFact::CommissionCredited {
            affiliate_id,
            rate_bps: referral.commission_rate_bps,
            commission: referral.commission_earned,
            coins,
            newly_recorded,
        })
    }
}
