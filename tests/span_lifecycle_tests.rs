//! Span lifecycle tests
//!
//! Every span opened through the recorder must be ended exactly once, on the
//! success path, the error path, on panic, and when the backend itself is
//! failing. Business results must never change because of telemetry.

mod common;

use bizctx::context::keys;
use bizctx::telemetry::{SpanStatus, TracingTestHarness};
use bizctx::{BusinessContext, RequestCorrelation, SpanRecorder};
use common::{
    card, loan, CardService, DownBackend, FlakyBackend, LoanRepository, LoanService,
    RepositoryError,
};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

fn assert_unique_span_ids(harness: &TracingTestHarness) {
    let spans = harness.spans();
    let ids: HashSet<_> = spans.iter().map(|s| s.span_id.clone()).collect();
    assert_eq!(ids.len(), spans.len(), "a span was ended more than once");
}

#[test]
fn test_success_path_closes_every_span_once() {
    let harness = TracingTestHarness::for_service("card-service");
    let service = CardService::new(harness.recorder());

    let issued =
        RequestCorrelation::begin(harness.recorder(), "POST /cards", BusinessContext::new())
            .run(|_| service.issue_card(card("4111111111111111", "C-1")));
    assert!(issued.is_ok());

    // request root, service span, repository span
    assert_eq!(harness.spans().len(), 3);
    assert_unique_span_ids(&harness);
    assert_eq!(harness.recorder().backend_failure_count(), 0);

    let service_span = harness.span("CardService.issueCard").unwrap();
    assert_eq!(service_span.status, SpanStatus::Ok);
    assert_eq!(
        service_span
            .attributes
            .get(keys::OPERATION_SUCCESS)
            .and_then(|v| v.as_bool()),
        Some(true)
    );
    assert!(service_span.attributes.contains_key(keys::DURATION_MS));
}

#[test]
fn test_error_path_closes_every_span_once() {
    let harness = TracingTestHarness::new();
    let service = CardService::new(harness.recorder());

    let result = RequestCorrelation::begin(
        harness.recorder(),
        "GET /cards/{number}",
        BusinessContext::new(),
    )
    .run(|_| service.get_card("4000000000000002"));

    assert_eq!(
        result,
        Err(RepositoryError::NotFound {
            entity: "Card",
            id: "4000000000000002".to_string(),
        })
    );

    assert_eq!(harness.spans().len(), 3);
    assert_unique_span_ids(&harness);

    let service_span = harness.span("CardService.getCard").unwrap();
    assert!(matches!(service_span.status, SpanStatus::Error { .. }));
    assert_eq!(service_span.str_attr(keys::ERROR_CODE), Some("CARD_NOT_FOUND"));

    // The lookup itself succeeded with "no card"
    let repository_span = harness.span("Card.find_by_number").unwrap();
    assert_eq!(repository_span.status, SpanStatus::Ok);
}

#[test]
fn test_panic_inside_traced_work_still_ends_span() {
    let harness = TracingTestHarness::new();
    let recorder = harness.recorder().clone();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _: Result<(), RepositoryError> = recorder
            .traced("AccountService.recalculate", BusinessContext::new())
            .run(|| panic!("ledger inconsistent"));
    }));
    assert!(outcome.is_err());

    let span = harness.span("AccountService.recalculate").unwrap();
    assert_eq!(span.status, SpanStatus::Unset);
    assert_eq!(harness.spans().len(), 1);
}

#[test]
fn test_early_drop_of_manual_span_ends_it() {
    let harness = TracingTestHarness::new();
    {
        let _span = harness
            .recorder()
            .start_root("batch.reconcile", &BusinessContext::new().batch_size(40));
    }
    let span = harness.span("batch.reconcile").unwrap();
    assert_eq!(
        span.attributes.get(keys::BATCH_SIZE).and_then(|v| v.as_i64()),
        Some(40)
    );
}

#[tokio::test]
async fn test_failing_backend_never_changes_business_results() {
    let backend = Arc::new(FlakyBackend::default());
    let recorder = SpanRecorder::new(backend.clone()).with_failure_alert_threshold(2);
    let service = LoanService::new(&recorder, LoanRepository::new(&recorder));

    let opened = RequestCorrelation::begin(&recorder, "POST /loans", BusinessContext::new())
        .run_async(|_| service.open_loan(loan("L-1001", "C-7")))
        .await;
    assert_eq!(opened.unwrap().number, "L-1001");

    let duplicate = service.open_loan(loan("L-1001", "C-7")).await;
    assert_eq!(duplicate, Err(RepositoryError::Duplicate("L-1001".to_string())));

    // Every started span had end attempted exactly once
    assert_eq!(backend.started(), 5);
    assert_eq!(backend.end_calls(), backend.started());
    assert!(recorder.backend_failure_count() > 0);

    // Flush failures surface only to the explicit caller
    assert!(recorder.flush().await.is_err());
}

#[test]
fn test_unavailable_backend_yields_non_recording_spans() {
    let recorder = SpanRecorder::new(Arc::new(DownBackend));
    let service = CardService::new(&recorder);

    let span = recorder.start_root("probe", &BusinessContext::new());
    assert!(!span.is_recording());
    assert!(!span.context().is_valid());
    span.close();

    let issued = service.issue_card(card("5500000000000004", "C-2")).unwrap();
    assert_eq!(issued.customer_id, "C-2");
    assert_eq!(service.repository().snapshot().unwrap().len(), 1);

    // probe, service span, repository span
    assert_eq!(recorder.backend_failure_count(), 3);
}
