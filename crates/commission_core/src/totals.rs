//! Amount derivation and grid-wide aggregates.

use rust_decimal::Decimal;
use shared::domain::{LineItemId, UserId};
use thiserror::Error;

use crate::grid::{Cell, CellKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub selected_count: usize,
    pub total_amount: Decimal,
}

/// A cell amount or the running total left the representable decimal range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("commission amount out of range for line item {line_item_id}, user {user_id}")]
pub struct AmountOverflow {
    pub line_item_id: LineItemId,
    pub user_id: UserId,
}

impl AmountOverflow {
    pub fn at(key: &CellKey) -> Self {
        Self {
            line_item_id: key.line_item_id.clone(),
            user_id: key.user_id.clone(),
        }
    }
}

/// `None` when `margin * percentage` does not fit in a `Decimal`.
pub fn cell_amount(selected: bool, margin: Decimal, percentage: Decimal) -> Option<Decimal> {
    if !selected {
        return Some(Decimal::ZERO);
    }
    margin
        .checked_mul(percentage)?
        .checked_div(Decimal::ONE_HUNDRED)
}

/// Returns a fresh cell sequence with every `amount` re-derived, plus the
/// aggregates over it. The input is left untouched.
pub fn recompute(cells: &[Cell]) -> Result<(Vec<Cell>, Totals), AmountOverflow> {
    let mut totals = Totals::default();
    let mut next = Vec::with_capacity(cells.len());
    for cell in cells {
        let amount = cell_amount(cell.selected, cell.margin, cell.percentage)
            .ok_or_else(|| AmountOverflow::at(&cell.key))?;
        if cell.selected {
            totals.selected_count += 1;
            totals.total_amount = totals
                .total_amount
                .checked_add(amount)
                .ok_or_else(|| AmountOverflow::at(&cell.key))?;
        }
        next.push(Cell {
            amount,
            ..cell.clone()
        });
    }
    Ok((next, totals))
}
