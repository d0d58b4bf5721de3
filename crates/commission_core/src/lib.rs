//! Commission matrix engine: builds the (line item × team member) grid from
//! loaded data, keeps selections, rates and amounts consistent under edits,
//! and projects the selected cells for submission.

pub mod backend;
pub mod config;
pub mod currency;
pub mod error;
pub mod grid;
pub mod reconcile;
pub mod session;
pub mod submission;
pub mod totals;
pub mod view;

pub use backend::{CommissionBackend, HttpCommissionBackend, MissingCommissionBackend};
pub use config::{load_settings, ClientSettings};
pub use currency::{CurrencyFormatter, LocaleCurrencyFormatter};
pub use error::{CommissionError, Notification, Severity};
pub use grid::{Cell, CellKey, Grid, MatrixStore};
pub use reconcile::{reconcile, ReconcileOptions, UnlabelledScale};
pub use session::{CommissionSession, ExistingChoice, LoadOutcome, SessionEvent};
pub use submission::SubmissionSummary;
pub use totals::{AmountOverflow, Totals};
pub use view::{GridView, MatrixView};
