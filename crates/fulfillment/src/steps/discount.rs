//! Discount accounting: one usage row per (discount, order).

use async_trait::async_trait;
use domain::{NewDiscountUsage, Order};

use super::{AppliedFact, Step, StepKind};
use crate::context::FulfillmentContext;
use crate::error::StepError;

/// Records the order's discount code against the discount's usage count.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscountStep;

#[async_trait]
impl Step for DiscountStep {
    fn kind(&self) -> StepKind {
        StepKind::Discount
    }

    #[tracing::instrument(skip(self, ctx, order), fields(order_id = %order.id))]
    async fn apply(&self, ctx: &FulfillmentContext, order: &Order) -> Result<AppliedFact, StepError> {
        let Some(code) = order.discount_code.as_deref() else {
            return Ok(AppliedFact::skipped("no discount code"));
        };

        let discount = ctx
            .store()
            .find_discount_by_code(code)
            .await?
            .ok_or_else(|| StepError::NotFound {
                entity: "Discount",
                id: code.to_string(),
            })?;

        if !discount.is_usable_at(ctx.now()) {
            return Err(StepError::Precondition(format!(
                "discount {} is inactive or expired",
                discount.code
            )));
        }

        let recorded = ctx
            .store()
            .record_discount_usage(NewDiscountUsage {
                discount_id: discount.id,
                order_id: order.id,
                customer_email: order.customer_email.clone(),
                discount_amount: order.discount_amount,
            })
            .await?;

        let newly_recorded = recorded.is_inserted();
        if !newly_recorded {
            tracing::debug!(discount_id = %discount.id, "discount usage already recorded");
        }
        let usage = recorded.into_inner();

        Ok(AppliedFact::DiscountRecorded {
            discount_id: usage.discount_id,
            amount: usage.discount_amount,
            newly_recorded,
        })
    }
}
