use super::*;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{CommissionRecordId, ExistingCommissionRecord, LineItem, TeamMember},
    protocol::{CommissionSubmissionRow, SubmitCommissionsResponse},
};
use tokio::{sync::Mutex, time::timeout};

struct TestBackend {
    records: Vec<ExistingCommissionRecord>,
    fail_context_with: Option<String>,
    fail_load_with: Option<String>,
    fail_delete_with: Option<String>,
    fail_submit_with: Option<String>,
    submit_response: SubmitCommissionsResponse,
    deletes: Arc<Mutex<u32>>,
    submissions: Arc<Mutex<Vec<Vec<CommissionSubmissionRow>>>>,
}

impl TestBackend {
    fn ok() -> Self {
        Self {
            records: Vec::new(),
            fail_context_with: None,
            fail_load_with: None,
            fail_delete_with: None,
            fail_submit_with: None,
            submit_response: SubmitCommissionsResponse {
                success: true,
                records_created: 1,
                records_updated: 0,
                ..Default::default()
            },
            deletes: Arc::new(Mutex::new(0)),
            submissions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_records(mut self, records: Vec<ExistingCommissionRecord>) -> Self {
        self.records = records;
        self
    }

    fn failing_context(mut self, err: impl Into<String>) -> Self {
        self.fail_context_with = Some(err.into());
        self
    }

    fn failing_load(mut self, err: impl Into<String>) -> Self {
        self.fail_load_with = Some(err.into());
        self
    }

    fn failing_delete(mut self, err: impl Into<String>) -> Self {
        self.fail_delete_with = Some(err.into());
        self
    }

    fn failing_submit(mut self, err: impl Into<String>) -> Self {
        self.fail_submit_with = Some(err.into());
        self
    }

    fn with_submit_response(mut self, response: SubmitCommissionsResponse) -> Self {
        self.submit_response = response;
        self
    }
}

#[async_trait]
impl CommissionBackend for TestBackend {
    async fn fetch_opportunity_context(
        &self,
        _opportunity_id: &OpportunityId,
    ) -> Result<OpportunityContext> {
        if let Some(err) = &self.fail_context_with {
            return Err(anyhow!(err.clone()));
        }
        Ok(OpportunityContext {
            opportunity: OpportunitySummary {
                name: "Fleet renewal".into(),
                amount: Decimal::from(20_000),
                currency_code: Some("GBP".into()),
            },
            line_items: vec![
                LineItem {
                    id: LineItemId::from("li1"),
                    name: "Licences".into(),
                    margin: Decimal::from(1000),
                },
                LineItem {
                    id: LineItemId::from("li2"),
                    name: "Support".into(),
                    margin: Decimal::from(200),
                },
            ],
            team_members: vec![
                TeamMember {
                    id: UserId::from("u1"),
                    name: "Ada".into(),
                    role: "Account Executive".into(),
                    default_rate: Decimal::from(10),
                },
                TeamMember {
                    id: UserId::from("u2"),
                    name: "Bo".into(),
                    role: "Sales Engineer".into(),
                    default_rate: Decimal::from(5),
                },
            ],
        })
    }

    async fn fetch_existing_commissions(
        &self,
        _opportunity_id: &OpportunityId,
    ) -> Result<Vec<shared::domain::ExistingCommissionRecord>> {
        if let Some(err) = &self.fail_load_with {
            return Err(anyhow!(err.clone()));
        }
        Ok(self.records.clone())
    }

    async fn delete_existing_commissions(&self, _opportunity_id: &OpportunityId) -> Result<()> {
        if let Some(err) = &self.fail_delete_with {
            return Err(anyhow!(err.clone()));
        }
        *self.deletes.lock().await += 1;
        Ok(())
    }

    async fn submit_commissions(
        &self,
        _opportunity_id: &OpportunityId,
        cells: Vec<CommissionSubmissionRow>,
    ) -> Result<SubmitCommissionsResponse> {
        self.submissions.lock().await.push(cells);
        if let Some(err) = &self.fail_submit_with {
            return Err(anyhow!(err.clone()));
        }
        Ok(self.submit_response.clone())
    }
}

fn session(backend: TestBackend) -> CommissionSession {
    let settings = ClientSettings {
        navigate_delay_ms: 0,
        ..ClientSettings::default()
    };
    CommissionSession::new_with_dependencies(
        OpportunityId::from("opp-1"),
        Arc::new(backend),
        Arc::new(LocaleCurrencyFormatter::default()),
        &settings,
    )
}

fn existing(
    id: &str,
    line_item: &str,
    user: &str,
    percentage: Decimal,
) -> ExistingCommissionRecord {
    ExistingCommissionRecord {
        id: CommissionRecordId::from(id),
        line_item_id: LineItemId::from(line_item),
        user_id: UserId::from(user),
        percentage,
        percentage_scale: None,
    }
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn notifications(events: &[SessionEvent]) -> Vec<&Notification> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Notification(note) => Some(note),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn load_builds_grid_and_reports_no_existing_records() {
    let mut session = session(TestBackend::ok());
    let mut rx = session.subscribe_events();

    let outcome = session.load().await.expect("load");

    assert_eq!(outcome, LoadOutcome { cells: 4, existing_records: 0 });
    assert!(!session.is_loading());
    assert_eq!(session.currency_code(), Some("GBP"));
    assert!(session.grid().cells().iter().all(|cell| !cell.selected));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn load_failure_notifies_and_leaves_grid_empty() {
    let mut session = session(TestBackend::ok().failing_load("backend down"));
    let mut rx = session.subscribe_events();

    let err = session.load().await.expect_err("load fails");

    assert!(matches!(err, CommissionError::Load(_)));
    assert!(session.grid().is_empty());
    assert!(!session.is_loading());
    let events = drain(&mut rx);
    let notes = notifications(&events);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].severity, Severity::Error);
    assert!(notes[0].message.contains("backend down"));
}

#[tokio::test]
async fn context_failure_fails_the_whole_load() {
    let mut session = session(TestBackend::ok().failing_context("opportunity not found"));
    let mut rx = session.subscribe_events();

    let err = session.load().await.expect_err("load fails");

    assert!(matches!(err, CommissionError::Load(_)));
    assert!(err.to_string().contains("opportunity not found"));
    assert!(session.grid().is_empty());
    assert!(session.opportunity().is_none());
    assert!(!session.is_loading());
    let events = drain(&mut rx);
    let notes = notifications(&events);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].severity, Severity::Error);
    assert!(!events
        .iter()
        .any(|event| matches!(event, SessionEvent::ExistingRecordsFound { .. })));
}

#[tokio::test]
async fn unrepresentable_persisted_rate_fails_the_load() {
    let mut record = existing("c1", "li1", "u1", Decimal::MAX);
    record.percentage_scale = Some(shared::domain::PercentScale::Fraction);
    let mut session = session(TestBackend::ok().with_records(vec![record]));
    let mut rx = session.subscribe_events();

    let err = session.load().await.expect_err("load fails");

    assert!(matches!(err, CommissionError::Load(_)));
    assert!(session.grid().is_empty());
    assert!(!session.is_loading());
    assert_eq!(notifications(&drain(&mut rx))[0].severity, Severity::Error);
}

#[tokio::test]
async fn existing_records_are_signalled_and_can_be_edited_in_place() {
    let backend =
        TestBackend::ok().with_records(vec![existing("c1", "li1", "u1", Decimal::new(15, 2))]);
    let mut session = session(backend);
    let mut rx = session.subscribe_events();

    let outcome = session.load().await.expect("load");
    assert_eq!(outcome.existing_records, 1);
    assert!(drain(&mut rx).contains(&SessionEvent::ExistingRecordsFound { count: 1 }));

    session
        .resolve_existing(ExistingChoice::EditInPlace)
        .await
        .expect("edit in place");
    let cell = session
        .grid()
        .cell(&LineItemId::from("li1"), &UserId::from("u1"))
        .expect("cell");
    assert!(cell.selected);
    assert_eq!(cell.percentage, Decimal::from(15));
    assert_eq!(session.formatted_total(), "£150.00");
}

#[tokio::test]
async fn delete_and_recreate_resets_grid() {
    let backend = TestBackend::ok().with_records(vec![
        existing("c1", "li1", "u1", Decimal::from(15)),
        existing("c2", "li2", "u2", Decimal::from(8)),
    ]);
    let deletes = Arc::clone(&backend.deletes);
    let mut session = session(backend);
    session.load().await.expect("load");
    let mut rx = session.subscribe_events();

    session
        .resolve_existing(ExistingChoice::DeleteAndRecreate)
        .await
        .expect("delete");

    assert_eq!(*deletes.lock().await, 1);
    assert!(!session.grid().has_existing_records());
    assert!(session.grid().cells().iter().all(|cell| !cell.selected));
    assert_eq!(session.grid().cells().len(), 4);
    let events = drain(&mut rx);
    assert!(events.contains(&SessionEvent::BusyChanged(true)));
    assert!(events.contains(&SessionEvent::BusyChanged(false)));
    assert_eq!(notifications(&events)[0].severity, Severity::Success);
    assert!(!session.is_busy());
}

#[tokio::test]
async fn failed_delete_keeps_existing_grid() {
    let backend = TestBackend::ok()
        .with_records(vec![existing("c1", "li1", "u1", Decimal::from(15))])
        .failing_delete("permission denied");
    let mut session = session(backend);
    session.load().await.expect("load");
    let before = session.snapshot();

    let err = session
        .resolve_existing(ExistingChoice::DeleteAndRecreate)
        .await
        .expect_err("delete fails");

    assert!(matches!(err, CommissionError::Delete(_)));
    assert!(Arc::ptr_eq(&before, &session.snapshot()));
    assert!(session.grid().has_existing_records());
    assert!(!session.is_busy());
}

#[tokio::test]
async fn submit_without_selection_never_calls_backend() {
    let backend = TestBackend::ok();
    let submissions = Arc::clone(&backend.submissions);
    let mut session = session(backend);
    session.load().await.expect("load");
    let mut rx = session.subscribe_events();

    let err = session.submit().await.expect_err("validation");

    assert!(matches!(err, CommissionError::Validation(_)));
    assert!(submissions.lock().await.is_empty());
    let events = drain(&mut rx);
    assert_eq!(notifications(&events)[0].severity, Severity::Warning);
    assert!(!events.contains(&SessionEvent::BusyChanged(true)));
}

#[tokio::test]
async fn successful_submit_notifies_and_navigates() {
    let backend = TestBackend::ok();
    let submissions = Arc::clone(&backend.submissions);
    let mut session = session(backend);
    session.load().await.expect("load");
    session.toggle_cell(&LineItemId::from("li1"), &UserId::from("u1"), true);
    let mut rx = session.subscribe_events();

    let summary = session.submit().await.expect("submit");
    assert_eq!(summary.total(), 1);

    let sent = submissions.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].len(), 1);
    assert_eq!(sent[0][0].amount, Decimal::from(100));
    drop(sent);

    let mut saw_success = false;
    let navigated = loop {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event in time")
            .expect("open channel");
        match event {
            SessionEvent::Notification(note) if note.severity == Severity::Success => {
                assert!(note.message.contains("1 commission records saved"));
                saw_success = true;
            }
            SessionEvent::NavigateToRecord { opportunity_id } => break opportunity_id,
            _ => {}
        }
    };
    assert!(saw_success);
    assert_eq!(navigated, OpportunityId::from("opp-1"));
}

#[tokio::test]
async fn failed_submit_combines_partial_errors() {
    let backend = TestBackend::ok().with_submit_response(SubmitCommissionsResponse {
        success: false,
        error_message: Some("Some commissions could not be saved".into()),
        partial_errors: vec!["Licences/Ada: rate too high".into()],
        ..Default::default()
    });
    let mut session = session(backend);
    session.load().await.expect("load");
    session.select_all_for_team_member(&UserId::from("u1"), true);
    let mut rx = session.subscribe_events();

    let err = session.submit().await.expect_err("submission fails");

    assert_eq!(
        err.to_string(),
        "Some commissions could not be saved: Licences/Ada: rate too high"
    );
    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|event| matches!(event, SessionEvent::NavigateToRecord { .. })));
    assert_eq!(notifications(&events)[0].message, err.to_string());
    assert!(!session.is_busy());
}

#[tokio::test]
async fn submit_transport_failure_is_reported() {
    let backend = TestBackend::ok().failing_submit("connection reset");
    let submissions = Arc::clone(&backend.submissions);
    let mut session = session(backend);
    session.load().await.expect("load");
    session.toggle_cell(&LineItemId::from("li1"), &UserId::from("u1"), true);
    let mut rx = session.subscribe_events();

    let err = session.submit().await.expect_err("transport fails");

    match &err {
        CommissionError::Submission {
            message,
            partial_errors,
        } => {
            assert!(message.contains("connection reset"));
            assert!(partial_errors.is_empty());
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(submissions.lock().await.len(), 1);
    assert!(!session.is_busy());
    let events = drain(&mut rx);
    assert!(events.contains(&SessionEvent::BusyChanged(true)));
    assert!(events.contains(&SessionEvent::BusyChanged(false)));
    let notes = notifications(&events);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].severity, Severity::Error);
    assert_eq!(notes[0].message, err.to_string());
    assert!(!events
        .iter()
        .any(|event| matches!(event, SessionEvent::NavigateToRecord { .. })));
    let cell = session
        .grid()
        .cell(&LineItemId::from("li1"), &UserId::from("u1"))
        .expect("cell");
    assert!(cell.selected);
}

#[tokio::test]
async fn view_tracks_session_edits() {
    let mut session = session(TestBackend::ok());
    session.load().await.expect("load");

    let first = session.view();
    assert_eq!(first.formatted_total, "£0.00");

    session.select_all_for_line_item(&LineItemId::from("li2"), true);
    session.set_percentage(&LineItemId::from("li2"), &UserId::from("u2"), Decimal::from(20));
    let second = session.view();

    assert_eq!(second.selected_count, 2);
    assert_eq!(second.total_amount, Decimal::from(60));
    assert_eq!(second.formatted_total, "£60.00");
    assert!(second.rows[1].all_selected);
    assert!(!second.columns[0].all_selected);
}
