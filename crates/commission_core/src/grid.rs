//! The authoritative commission grid and its bulk mutations.
//!
//! Grids are never edited in place. Every mutation builds a fresh cell
//! sequence, re-runs the totals pass and swaps in a new `Arc<Grid>`, so a
//! snapshot taken before the mutation keeps describing the old state.

use std::sync::Arc;

use rust_decimal::Decimal;
use shared::domain::{CommissionRecordId, LineItem, LineItemId, TeamMember, UserId};
use tracing::{debug, warn};

use crate::totals::{self, AmountOverflow, Totals};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub line_item_id: LineItemId,
    pub user_id: UserId,
}

impl CellKey {
    pub fn new(line_item_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            line_item_id: LineItemId(line_item_id.into()),
            user_id: UserId(user_id.into()),
        }
    }

    fn matches(&self, line_item_id: &LineItemId, user_id: &UserId) -> bool {
        &self.line_item_id == line_item_id && &self.user_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub key: CellKey,
    pub selected: bool,
    /// 0-100 scale.
    pub percentage: Decimal,
    pub default_percentage: Decimal,
    /// Margin of the owning line item, copied when the grid was built.
    pub margin: Decimal,
    pub amount: Decimal,
    pub existing_record_id: Option<CommissionRecordId>,
}

#[derive(Debug, Clone)]
pub struct Grid {
    line_items: Arc<[LineItem]>,
    team_members: Arc<[TeamMember]>,
    cells: Vec<Cell>,
    totals: Totals,
    version: u64,
}

impl Default for Grid {
    fn default() -> Self {
        Self::empty()
    }
}

impl Grid {
    pub fn empty() -> Self {
        Self {
            line_items: Arc::from(Vec::new()),
            team_members: Arc::from(Vec::new()),
            cells: Vec::new(),
            totals: Totals::default(),
            version: 0,
        }
    }

    /// Builds a grid from raw cells, deriving amounts and totals.
    pub fn from_cells(
        line_items: Vec<LineItem>,
        team_members: Vec<TeamMember>,
        cells: Vec<Cell>,
    ) -> Result<Self, AmountOverflow> {
        let (cells, totals) = totals::recompute(&cells)?;
        Ok(Self {
            line_items: Arc::from(line_items),
            team_members: Arc::from(team_members),
            cells,
            totals,
            version: 0,
        })
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, line_item_id: &LineItemId, user_id: &UserId) -> Option<&Cell> {
        self.cells
            .iter()
            .find(|cell| cell.key.matches(line_item_id, user_id))
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn team_members(&self) -> &[TeamMember] {
        &self.team_members
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn has_existing_records(&self) -> bool {
        self.cells
            .iter()
            .any(|cell| cell.existing_record_id.is_some())
    }

    fn successor(&self, cells: Vec<Cell>) -> Result<Self, AmountOverflow> {
        let (cells, totals) = totals::recompute(&cells)?;
        Ok(Self {
            line_items: Arc::clone(&self.line_items),
            team_members: Arc::clone(&self.team_members),
            cells,
            totals,
            version: self.version + 1,
        })
    }
}

/// Holds the current grid and hands out immutable snapshots of it.
#[derive(Debug, Default)]
pub struct MatrixStore {
    current: Arc<Grid>,
}

impl MatrixStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Grid> {
        Arc::clone(&self.current)
    }

    pub fn grid(&self) -> &Grid {
        &self.current
    }

    /// Swaps in a freshly reconciled grid. The version keeps counting up
    /// across reloads.
    pub fn replace(&mut self, mut grid: Grid) {
        grid.version = self.current.version + 1;
        self.current = Arc::new(grid);
    }

    pub fn clear(&mut self) {
        self.replace(Grid::empty());
    }

    pub fn toggle_cell(
        &mut self,
        line_item_id: &LineItemId,
        user_id: &UserId,
        checked: bool,
    ) -> bool {
        self.apply(
            "toggle_cell",
            |cell| cell.key.matches(line_item_id, user_id),
            |cell| cell.selected = checked,
        )
    }

    /// Accepts the value as given; out-of-range rates are not clamped. A rate
    /// whose amount cannot be represented is refused and the grid is kept.
    pub fn set_percentage(
        &mut self,
        line_item_id: &LineItemId,
        user_id: &UserId,
        value: Decimal,
    ) -> bool {
        self.apply(
            "set_percentage",
            |cell| cell.key.matches(line_item_id, user_id),
            |cell| cell.percentage = value,
        )
    }

    /// Row select-all. A zero rate picks up the member default when
    /// selecting; any other rate is kept.
    pub fn select_all_for_line_item(&mut self, line_item_id: &LineItemId, checked: bool) -> bool {
        self.apply(
            "select_all_for_line_item",
            |cell| &cell.key.line_item_id == line_item_id,
            |cell| {
                cell.selected = checked;
                if checked && cell.percentage.is_zero() {
                    cell.percentage = cell.default_percentage;
                }
            },
        )
    }

    /// Column select-all. Selecting always resets the rate to the member
    /// default.
    pub fn select_all_for_team_member(&mut self, user_id: &UserId, checked: bool) -> bool {
        self.apply(
            "select_all_for_team_member",
            |cell| &cell.key.user_id == user_id,
            |cell| {
                cell.selected = checked;
                if checked {
                    cell.percentage = cell.default_percentage;
                }
            },
        )
    }

    fn apply(
        &mut self,
        operation: &'static str,
        matches: impl Fn(&Cell) -> bool,
        edit: impl Fn(&mut Cell),
    ) -> bool {
        let mut touched = 0usize;
        let cells: Vec<Cell> = self
            .current
            .cells
            .iter()
            .map(|cell| {
                let mut next = cell.clone();
                if matches(cell) {
                    edit(&mut next);
                    touched += 1;
                }
                next
            })
            .collect();

        if touched == 0 {
            debug!(operation, "grid mutation matched no cells");
            return false;
        }

        let next = match self.current.successor(cells) {
            Ok(next) => next,
            Err(err) => {
                warn!(operation, error = %err, "grid mutation refused");
                return false;
            }
        };
        debug!(
            operation,
            touched,
            version = next.version,
            selected = next.totals.selected_count,
            "grid replaced"
        );
        self.current = Arc::new(next);
        true
    }
}

#[cfg(test)]
#[path = "tests/grid_tests.rs"]
mod tests;
