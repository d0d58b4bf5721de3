//! Row/column projection of the grid for display, memoized on the grid
//! version so repeated reads between mutations cost nothing.

use std::{collections::HashMap, sync::Arc};

use rust_decimal::Decimal;
use shared::domain::{LineItemId, UserId};

use crate::{currency::CurrencyFormatter, grid::Grid};

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayCell {
    pub user_id: UserId,
    pub selected: bool,
    pub percentage: Decimal,
    pub amount: Decimal,
    pub formatted_amount: String,
    pub has_existing_record: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRow {
    pub line_item_id: LineItemId,
    pub name: String,
    pub margin: Decimal,
    pub formatted_margin: String,
    pub all_selected: bool,
    pub cells: Vec<DisplayCell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnHeader {
    pub user_id: UserId,
    pub name: String,
    pub role: String,
    pub default_rate: Decimal,
    pub all_selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixView {
    pub version: u64,
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<DisplayRow>,
    pub selected_count: usize,
    pub total_amount: Decimal,
    pub formatted_total: String,
}

struct CachedView {
    version: u64,
    currency_code: Option<String>,
    view: Arc<MatrixView>,
}

pub struct GridView {
    formatter: Arc<dyn CurrencyFormatter>,
    cached: Option<CachedView>,
    builds: u64,
}

impl GridView {
    pub fn new(formatter: Arc<dyn CurrencyFormatter>) -> Self {
        Self {
            formatter,
            cached: None,
            builds: 0,
        }
    }

    /// Number of times the projection was actually rebuilt.
    pub fn builds(&self) -> u64 {
        self.builds
    }

    pub fn project(&mut self, grid: &Grid, currency_code: Option<&str>) -> Arc<MatrixView> {
        if let Some(cached) = &self.cached {
            if cached.version == grid.version() && cached.currency_code.as_deref() == currency_code
            {
                return Arc::clone(&cached.view);
            }
        }

        let view = Arc::new(build_view(grid, currency_code, self.formatter.as_ref()));
        self.builds += 1;
        self.cached = Some(CachedView {
            version: grid.version(),
            currency_code: currency_code.map(str::to_string),
            view: Arc::clone(&view),
        });
        view
    }
}

fn build_view(
    grid: &Grid,
    currency_code: Option<&str>,
    formatter: &dyn CurrencyFormatter,
) -> MatrixView {
    let by_key: HashMap<(&LineItemId, &UserId), _> = grid
        .cells()
        .iter()
        .map(|cell| ((&cell.key.line_item_id, &cell.key.user_id), cell))
        .collect();

    let rows = grid
        .line_items()
        .iter()
        .map(|line_item| {
            let cells: Vec<DisplayCell> = grid
                .team_members()
                .iter()
                .filter_map(|member| by_key.get(&(&line_item.id, &member.id)))
                .map(|cell| DisplayCell {
                    user_id: cell.key.user_id.clone(),
                    selected: cell.selected,
                    percentage: cell.percentage,
                    amount: cell.amount,
                    formatted_amount: formatter.format(cell.amount, currency_code),
                    has_existing_record: cell.existing_record_id.is_some(),
                })
                .collect();
            DisplayRow {
                line_item_id: line_item.id.clone(),
                name: line_item.name.clone(),
                margin: line_item.margin,
                formatted_margin: formatter.format(line_item.margin, currency_code),
                all_selected: !cells.is_empty() && cells.iter().all(|cell| cell.selected),
                cells,
            }
        })
        .collect();

    let columns = grid
        .team_members()
        .iter()
        .map(|member| {
            let mut column = grid
                .cells()
                .iter()
                .filter(|cell| cell.key.user_id == member.id)
                .peekable();
            let all_selected = column.peek().is_some() && column.all(|cell| cell.selected);
            ColumnHeader {
                user_id: member.id.clone(),
                name: member.name.clone(),
                role: member.role.clone(),
                default_rate: member.default_rate,
                all_selected,
            }
        })
        .collect();

    let totals = grid.totals();
    MatrixView {
        version: grid.version(),
        columns,
        rows,
        selected_count: totals.selected_count,
        total_amount: totals.total_amount,
        formatted_total: formatter.format(totals.total_amount, currency_code),
    }
}

#[cfg(test)]
mod tests {
    use shared::domain::{LineItem, TeamMember};

    use super::*;
    use crate::{
        currency::LocaleCurrencyFormatter,
        grid::MatrixStore,
        reconcile::{reconcile, ReconcileOptions},
    };

    fn store() -> MatrixStore {
        let mut store = MatrixStore::new();
        let grid = reconcile(
            vec![
                LineItem {
                    id: LineItemId::from("li1"),
                    name: "Support plan".into(),
                    margin: Decimal::from(1000),
                },
                LineItem {
                    id: LineItemId::from("li2"),
                    name: "Hardware".into(),
                    margin: Decimal::from(250),
                },
            ],
            vec![TeamMember {
                id: UserId::from("u1"),
                name: "Ada".into(),
                role: "Account Executive".into(),
                default_rate: Decimal::from(10),
            }],
            &[],
            &ReconcileOptions::default(),
        )
        .expect("grid");
        store.replace(grid);
        store
    }

    #[test]
    fn reuses_projection_until_grid_changes() {
        let mut store = store();
        let mut view = GridView::new(Arc::new(LocaleCurrencyFormatter::default()));

        let first = view.project(store.grid(), Some("GBP"));
        let again = view.project(store.grid(), Some("GBP"));
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(view.builds(), 1);

        store.select_all_for_team_member(&UserId::from("u1"), true);
        let updated = view.project(store.grid(), Some("GBP"));
        assert_eq!(view.builds(), 2);
        assert!(updated.columns[0].all_selected);
        assert!(updated.rows.iter().all(|row| row.all_selected));
        assert_eq!(updated.formatted_total, "£125.00");
        assert_eq!(updated.rows[1].cells[0].formatted_amount, "£25.00");
    }

    #[test]
    fn currency_change_rebuilds_projection() {
        let store = store();
        let mut view = GridView::new(Arc::new(LocaleCurrencyFormatter::default()));
        view.project(store.grid(), Some("GBP"));
        let usd = view.project(store.grid(), Some("USD"));
        assert_eq!(view.builds(), 2);
        assert_eq!(usd.rows[0].formatted_margin, "$1,000.00");
    }
}
