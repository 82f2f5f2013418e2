use rust_decimal::Decimal;
use tracing::debug;

use crate::models::PaymentOrder;
use crate::{OrderError, OrderResult};

/// Amounts are stored as `NUMERIC(15, 2)`.
pub const AMOUNT_SCALE: u32 = 2;

fn check_scale(what: &str, amount: Decimal) -> OrderResult<()> {
    if amount.scale() > AMOUNT_SCALE {
        return Err(OrderError::structural(format!(
            "{} {} has more than {} decimal places",
            what, amount, AMOUNT_SCALE
        )));
    }
    Ok(())
}

/// Totals computed while reconciling an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub items_total: Decimal,
    pub tax_amount: Decimal,
    pub allocated: Decimal,
}

impl Reconciliation {
    pub fn of(order: &PaymentOrder) -> Self {
        Self {
            items_total: order.line_items.iter().map(|i| i.amount).sum(),
            tax_amount: order.header.tax_amount,
            allocated: order.allocations.iter().map(|a| a.amount).sum(),
        }
    }

    /// Net amount the cost-center allocations must add up to.
    pub fn expected(&self) -> Decimal {
        self.items_total - self.tax_amount
    }

    pub fn is_balanced(&self) -> bool {
        self.expected() == self.allocated
    }
}

/// Gate run before any write. Pure: touches no storage.
///
/// An order without line items, or with an amount finer than a cent, is a
/// structural error. Otherwise the line item total minus tax must equal the
/// allocated total exactly; amounts are currency values so there is no
/// tolerance.
pub fn validate(order: &PaymentOrder) -> OrderResult<Reconciliation> {
    if order.line_items.is_empty() {
        return Err(OrderError::structural("payment order must have at least one line item"));
    }

    check_scale("tax amount", order.header.tax_amount)?;
    for item in &order.line_items {
        check_scale("line item amount", item.amount)?;
    }
    for allocation in &order.allocations {
        check_scale("allocation amount", allocation.amount)?;
    }

    let totals = Reconciliation::of(order);
    if !totals.is_balanced() {
        debug!(
            expected = %totals.expected(),
            allocated = %totals.allocated,
            "Rejecting unbalanced payment order"
        );
        return Err(OrderError::InvariantViolation {
            expected: totals.expected(),
            allocated: totals.allocated,
        });
    }

    Ok(totals)
}
