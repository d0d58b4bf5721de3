use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(OpportunityId);
id_newtype!(LineItemId);
id_newtype!(UserId);
id_newtype!(CommissionRecordId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: LineItemId,
    pub name: String,
    pub margin: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub role: String,
    /// Default commission rate on the 0-100 scale.
    pub default_rate: Decimal,
}

/// Scale a persisted percentage was stored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentScale {
    /// 0-1, e.g. `0.15` for fifteen percent.
    Fraction,
    /// 0-100, e.g. `15` for fifteen percent.
    Whole,
}

impl PercentScale {
    /// Returns `None` when a fraction is too large to scale up.
    pub fn to_whole(self, raw: Decimal) -> Option<Decimal> {
        match self {
            PercentScale::Fraction => raw.checked_mul(Decimal::ONE_HUNDRED),
            PercentScale::Whole => Some(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingCommissionRecord {
    pub id: CommissionRecordId,
    pub line_item_id: LineItemId,
    pub user_id: UserId,
    pub percentage: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_scale: Option<PercentScale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunitySummary {
    pub name: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
}
