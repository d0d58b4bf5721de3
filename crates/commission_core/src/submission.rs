//! Turns the grid into the rows the backend persists, and reads back the
//! backend's verdict.

use shared::protocol::{CommissionSubmissionRow, SubmitCommissionsResponse};

use crate::{error::CommissionError, grid::Grid};

pub const NO_SELECTION_MESSAGE: &str =
    "Select at least one line item and team member before submitting.";
const DEFAULT_FAILURE_MESSAGE: &str = "Commission submission failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionSummary {
    pub records_created: u32,
    pub records_updated: u32,
}

impl SubmissionSummary {
    pub fn total(&self) -> u32 {
        self.records_created + self.records_updated
    }
}

pub fn project(grid: &Grid) -> Result<Vec<CommissionSubmissionRow>, CommissionError> {
    let rows: Vec<CommissionSubmissionRow> = grid
        .cells()
        .iter()
        .filter(|cell| cell.selected)
        .map(|cell| CommissionSubmissionRow {
            line_item_id: cell.key.line_item_id.clone(),
            user_id: cell.key.user_id.clone(),
            selected: cell.selected,
            percentage: cell.percentage,
            amount: cell.amount,
        })
        .collect();

    if rows.is_empty() {
        return Err(CommissionError::Validation(NO_SELECTION_MESSAGE.to_string()));
    }
    Ok(rows)
}

pub fn interpret(
    response: SubmitCommissionsResponse,
) -> Result<SubmissionSummary, CommissionError> {
    if response.success {
        return Ok(SubmissionSummary {
            records_created: response.records_created,
            records_updated: response.records_updated,
        });
    }

    Err(CommissionError::Submission {
        message: response
            .error_message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
        partial_errors: response.partial_errors,
    })
}
