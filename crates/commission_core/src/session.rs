//! Drives one commission-matrix session: load, the edit-or-reset choice,
//! grid edits and submission. Host-facing output goes out as
//! [`SessionEvent`]s.

use std::{sync::Arc, time::Duration};

use rust_decimal::Decimal;
use shared::{
    domain::{LineItemId, OpportunityId, OpportunitySummary, UserId},
    protocol::OpportunityContext,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    backend::CommissionBackend,
    config::ClientSettings,
    currency::{CurrencyFormatter, LocaleCurrencyFormatter},
    error::{CommissionError, Notification, Severity},
    grid::{Grid, MatrixStore},
    reconcile::{reconcile, ReconcileOptions},
    submission::{self, SubmissionSummary},
    totals::Totals,
    view::{GridView, MatrixView},
};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Notification(Notification),
    /// Persisted commissions were loaded; the host should ask whether to
    /// edit them in place or delete and start over.
    ExistingRecordsFound { count: usize },
    BusyChanged(bool),
    NavigateToRecord { opportunity_id: OpportunityId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingChoice {
    EditInPlace,
    DeleteAndRecreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    pub cells: usize,
    pub existing_records: usize,
}

pub struct CommissionSession {
    opportunity_id: OpportunityId,
    backend: Arc<dyn CommissionBackend>,
    formatter: Arc<dyn CurrencyFormatter>,
    options: ReconcileOptions,
    navigate_delay: Duration,
    store: MatrixStore,
    view: GridView,
    opportunity: Option<OpportunitySummary>,
    loading: bool,
    busy: bool,
    events: broadcast::Sender<SessionEvent>,
}

impl CommissionSession {
    pub fn new(opportunity_id: OpportunityId, backend: Arc<dyn CommissionBackend>) -> Self {
        Self::new_with_dependencies(
            opportunity_id,
            backend,
            Arc::new(LocaleCurrencyFormatter::default()),
            &ClientSettings::default(),
        )
    }

    pub fn new_with_dependencies(
        opportunity_id: OpportunityId,
        backend: Arc<dyn CommissionBackend>,
        formatter: Arc<dyn CurrencyFormatter>,
        settings: &ClientSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            opportunity_id,
            backend,
            view: GridView::new(Arc::clone(&formatter)),
            formatter,
            options: settings.reconcile_options(),
            navigate_delay: settings.navigate_delay(),
            store: MatrixStore::new(),
            opportunity: None,
            loading: false,
            busy: false,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn opportunity_id(&self) -> &OpportunityId {
        &self.opportunity_id
    }

    pub fn opportunity(&self) -> Option<&OpportunitySummary> {
        self.opportunity.as_ref()
    }

    pub fn currency_code(&self) -> Option<&str> {
        self.opportunity
            .as_ref()
            .and_then(|opportunity| opportunity.currency_code.as_deref())
    }

    pub fn grid(&self) -> &Grid {
        self.store.grid()
    }

    /// An immutable view of the grid as it is now; later edits do not
    /// show through it.
    pub fn snapshot(&self) -> Arc<Grid> {
        self.store.snapshot()
    }

    pub fn totals(&self) -> Totals {
        self.store.grid().totals()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Advisory: set while a delete or submit call is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn format_amount(&self, amount: Decimal) -> String {
        self.formatter.format(amount, self.currency_code())
    }

    pub fn formatted_total(&self) -> String {
        self.format_amount(self.totals().total_amount)
    }

    pub fn view(&mut self) -> Arc<MatrixView> {
        let currency_code = self
            .opportunity
            .as_ref()
            .and_then(|opportunity| opportunity.currency_code.clone());
        self.view
            .project(self.store.grid(), currency_code.as_deref())
    }

    pub async fn load(&mut self) -> Result<LoadOutcome, CommissionError> {
        self.loading = true;
        info!(opportunity_id = %self.opportunity_id, "loading commission matrix");

        let fetched = futures::try_join!(
            self.backend.fetch_opportunity_context(&self.opportunity_id),
            self.backend.fetch_existing_commissions(&self.opportunity_id),
        );
        self.loading = false;

        let (context, records) = match fetched {
            Ok(fetched) => fetched,
            Err(err) => return Err(self.fail_load(format!("{err:#}"))),
        };

        let OpportunityContext {
            opportunity,
            line_items,
            team_members,
        } = context;
        let grid = match reconcile(line_items, team_members, &records, &self.options) {
            Ok(grid) => grid,
            Err(err) => return Err(self.fail_load(err.to_string())),
        };
        let outcome = LoadOutcome {
            cells: grid.cells().len(),
            existing_records: records.len(),
        };
        self.store.replace(grid);
        self.opportunity = Some(opportunity);

        info!(
            opportunity_id = %self.opportunity_id,
            cells = outcome.cells,
            existing_records = outcome.existing_records,
            "commission matrix loaded"
        );
        if outcome.existing_records > 0 {
            self.emit(SessionEvent::ExistingRecordsFound {
                count: outcome.existing_records,
            });
        }
        Ok(outcome)
    }

    pub async fn resolve_existing(
        &mut self,
        choice: ExistingChoice,
    ) -> Result<(), CommissionError> {
        match choice {
            ExistingChoice::EditInPlace => {
                info!(
                    opportunity_id = %self.opportunity_id,
                    "editing existing commissions in place"
                );
                Ok(())
            }
            ExistingChoice::DeleteAndRecreate => self.delete_and_recreate().await,
        }
    }

    async fn delete_and_recreate(&mut self) -> Result<(), CommissionError> {
        self.set_busy(true);
        let deleted = self
            .backend
            .delete_existing_commissions(&self.opportunity_id)
            .await;
        self.set_busy(false);

        if let Err(err) = deleted {
            let err = CommissionError::Delete(format!("{err:#}"));
            error!(opportunity_id = %self.opportunity_id, error = %err, "delete failed");
            self.notify(err.notification());
            return Err(err);
        }

        let current = self.store.snapshot();
        let grid = match reconcile(
            current.line_items().to_vec(),
            current.team_members().to_vec(),
            &[],
            &self.options,
        ) {
            Ok(grid) => grid,
            Err(err) => {
                let err = CommissionError::Load(err.to_string());
                error!(opportunity_id = %self.opportunity_id, error = %err, "reset failed");
                self.notify(err.notification());
                return Err(err);
            }
        };
        self.store.replace(grid);
        info!(opportunity_id = %self.opportunity_id, "existing commissions deleted; grid reset");
        self.notify(Notification::new(
            "Success",
            "Existing commissions deleted. You can now create new ones.",
            Severity::Success,
        ));
        Ok(())
    }

    pub fn toggle_cell(
        &mut self,
        line_item_id: &LineItemId,
        user_id: &UserId,
        checked: bool,
    ) -> bool {
        self.store.toggle_cell(line_item_id, user_id, checked)
    }

    pub fn set_percentage(
        &mut self,
        line_item_id: &LineItemId,
        user_id: &UserId,
        value: Decimal,
    ) -> bool {
        self.store.set_percentage(line_item_id, user_id, value)
    }

    pub fn select_all_for_line_item(&mut self, line_item_id: &LineItemId, checked: bool) -> bool {
        self.store.select_all_for_line_item(line_item_id, checked)
    }

    pub fn select_all_for_team_member(&mut self, user_id: &UserId, checked: bool) -> bool {
        self.store.select_all_for_team_member(user_id, checked)
    }

    pub async fn submit(&mut self) -> Result<SubmissionSummary, CommissionError> {
        let rows = match submission::project(self.store.grid()) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(opportunity_id = %self.opportunity_id, "submit rejected: nothing selected");
                self.notify(err.notification());
                return Err(err);
            }
        };

        info!(opportunity_id = %self.opportunity_id, rows = rows.len(), "submitting commissions");
        self.set_busy(true);
        let response = self
            .backend
            .submit_commissions(&self.opportunity_id, rows)
            .await;
        self.set_busy(false);

        let outcome = response
            .map_err(|err| CommissionError::Submission {
                message: format!("{err:#}"),
                partial_errors: Vec::new(),
            })
            .and_then(submission::interpret);

        match outcome {
            Ok(summary) => {
                info!(
                    opportunity_id = %self.opportunity_id,
                    created = summary.records_created,
                    updated = summary.records_updated,
                    "commissions saved"
                );
                self.notify(Notification::new(
                    "Success",
                    format!("{} commission records saved successfully", summary.total()),
                    Severity::Success,
                ));
                self.schedule_navigation();
                Ok(summary)
            }
            Err(err) => {
                error!(opportunity_id = %self.opportunity_id, error = %err, "submission failed");
                self.notify(err.notification());
                Err(err)
            }
        }
    }

    fn schedule_navigation(&self) {
        let events = self.events.clone();
        let opportunity_id = self.opportunity_id.clone();
        let delay = self.navigate_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::NavigateToRecord { opportunity_id });
        });
    }

    /// Drops whatever was loaded and reports the failure.
    fn fail_load(&mut self, reason: String) -> CommissionError {
        let err = CommissionError::Load(reason);
        error!(opportunity_id = %self.opportunity_id, error = %err, "load failed");
        self.store.clear();
        self.opportunity = None;
        self.notify(err.notification());
        err
    }

    fn set_busy(&mut self, busy: bool) {
        if self.busy != busy {
            self.busy = busy;
            self.emit(SessionEvent::BusyChanged(busy));
        }
    }

    fn notify(&self, notification: Notification) {
        self.emit(SessionEvent::Notification(notification));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
