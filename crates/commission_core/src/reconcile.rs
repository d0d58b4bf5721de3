//! Builds the initial grid from loaded entities and persisted commissions.

use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    fmt,
    hash::Hash,
    str::FromStr,
};

use rust_decimal::Decimal;
use serde::Deserialize;
use shared::domain::{
    ExistingCommissionRecord, LineItem, LineItemId, PercentScale, TeamMember, UserId,
};
use tracing::{debug, warn};

use crate::{
    grid::{Cell, CellKey, Grid},
    totals::AmountOverflow,
};

/// How to read a persisted percentage that carries no explicit scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlabelledScale {
    /// Values at or below 1 are fractions, anything larger is whole percent.
    /// A stored `1` is ambiguous between 1% and 100% and reads as 100%.
    #[default]
    Infer,
    Fraction,
    Whole,
}

impl FromStr for UnlabelledScale {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "infer" => Ok(Self::Infer),
            "fraction" => Ok(Self::Fraction),
            "whole" => Ok(Self::Whole),
            other => Err(format!(
                "unknown percent scale '{other}' (expected infer, fraction or whole)"
            )),
        }
    }
}

impl fmt::Display for UnlabelledScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Infer => "infer",
            Self::Fraction => "fraction",
            Self::Whole => "whole",
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    pub unlabelled_scale: UnlabelledScale,
}

/// Brings a persisted rate onto the 0-100 scale. `None` means the stored
/// fraction cannot be represented once scaled.
pub fn normalize_percentage(
    record: &ExistingCommissionRecord,
    options: &ReconcileOptions,
) -> Option<Decimal> {
    let scale = match (record.percentage_scale, options.unlabelled_scale) {
        (Some(scale), _) => scale,
        (None, UnlabelledScale::Fraction) => PercentScale::Fraction,
        (None, UnlabelledScale::Whole) => PercentScale::Whole,
        (None, UnlabelledScale::Infer) => {
            if record.percentage == Decimal::ONE {
                warn!(
                    record_id = %record.id,
                    "persisted percentage of 1 has no scale; reading it as a fraction (100%)"
                );
            }
            if record.percentage <= Decimal::ONE {
                PercentScale::Fraction
            } else {
                PercentScale::Whole
            }
        }
    };
    scale.to_whole(record.percentage)
}

/// Keeps the first entry for each id so every pair maps to a single cell.
fn first_by_id<T, K>(items: Vec<T>, kind: &'static str, id: impl Fn(&T) -> &K) -> Vec<T>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| {
            let key = id(item);
            let fresh = seen.insert(key.clone());
            if !fresh {
                warn!(kind, id = %key, "duplicate id in loaded context; keeping the first");
            }
            fresh
        })
        .collect()
}

/// Produces one cell per (line item, team member) pair, line items outer
/// and team members inner, both in input order. Repeated line item or team
/// member ids are collapsed onto their first occurrence.
pub fn reconcile(
    line_items: Vec<LineItem>,
    team_members: Vec<TeamMember>,
    records: &[ExistingCommissionRecord],
    options: &ReconcileOptions,
) -> Result<Grid, AmountOverflow> {
    let line_items = first_by_id(line_items, "line_item", |item| &item.id);
    let team_members = first_by_id(team_members, "team_member", |member| &member.id);

    let mut by_key: HashMap<(&LineItemId, &UserId), &ExistingCommissionRecord> =
        HashMap::with_capacity(records.len());
    for record in records {
        match by_key.entry((&record.line_item_id, &record.user_id)) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(kept) => {
                warn!(
                    kept = %kept.get().id,
                    ignored = %record.id,
                    line_item_id = %record.line_item_id,
                    user_id = %record.user_id,
                    "duplicate commission record for the same cell"
                );
            }
        }
    }

    let mut cells = Vec::with_capacity(line_items.len() * team_members.len());
    let mut matched = 0usize;
    for line_item in &line_items {
        for member in &team_members {
            let key = CellKey {
                line_item_id: line_item.id.clone(),
                user_id: member.id.clone(),
            };
            let cell = match by_key.get(&(&line_item.id, &member.id)) {
                Some(record) => {
                    matched += 1;
                    let percentage = normalize_percentage(record, options)
                        .ok_or_else(|| AmountOverflow::at(&key))?;
                    Cell {
                        key,
                        selected: true,
                        percentage,
                        default_percentage: member.default_rate,
                        margin: line_item.margin,
                        amount: Decimal::ZERO,
                        existing_record_id: Some(record.id.clone()),
                    }
                }
                None => Cell {
                    key,
                    selected: false,
                    percentage: member.default_rate,
                    default_percentage: member.default_rate,
                    margin: line_item.margin,
                    amount: Decimal::ZERO,
                    existing_record_id: None,
                },
            };
            cells.push(cell);
        }
    }

    let orphaned = by_key.len().saturating_sub(matched);
    if orphaned > 0 {
        debug!(orphaned, "commission records reference no loaded line item or member");
    }

    Grid::from_cells(line_items, team_members, cells)
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
