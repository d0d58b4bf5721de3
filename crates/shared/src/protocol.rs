use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{LineItem, LineItemId, OpportunitySummary, TeamMember, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityContext {
    pub opportunity: OpportunitySummary,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub team_members: Vec<TeamMember>,
}

/// One selected cell as handed to the backend. `percentage` is on the
/// 0-100 scale; converting to a storage scale is the backend's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionSubmissionRow {
    pub line_item_id: LineItemId,
    pub user_id: UserId,
    pub selected: bool,
    pub percentage: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCommissionsRequest {
    pub cells: Vec<CommissionSubmissionRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCommissionsResponse {
    pub success: bool,
    #[serde(default)]
    pub records_created: u32,
    #[serde(default)]
    pub records_updated: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partial_errors: Vec<String>,
}
