//! Submission and cancellation flows over the durable store.

mod support;

use std::collections::BTreeMap;
use std::sync::Arc;

use segmill_core::application::{
    CancellationService, StatusService, SubmissionRequest, SubmissionService,
};
use segmill_core::domain::{JobParameters, JobStatus, ProvisionJob, SegmentCatalog};
use segmill_core::error::AppError;
use segmill_core::port::id_provider::mocks::SequenceIdProvider;
use segmill_core::port::time_provider::mocks::FixedTimeProvider;
use segmill_core::port::JobStore;
use segmill_infra_sqlite::SqliteJobStore;

use support::{sqlite_store, NOW};

fn submission_service(
    store: Arc<SqliteJobStore>,
    clock: Arc<FixedTimeProvider>,
) -> SubmissionService {
    SubmissionService::new(
        store,
        Arc::new(SegmentCatalog::builtin()),
        Arc::new(SequenceIdProvider::default()),
        clock,
    )
}

fn request(credential: &str, segment_ids: &[&str]) -> SubmissionRequest {
    SubmissionRequest {
        credential_ref: credential.to_string(),
        segment_ids: segment_ids.iter().map(|s| s.to_string()).collect(),
        params: JobParameters::default(),
    }
}

#[tokio::test]
async fn test_submit_persists_pending_job_with_params() {
    let store = sqlite_store().await;
    let clock = Arc::new(FixedTimeProvider::at(NOW));
    let service = submission_service(store.clone(), clock);

    let job = service
        .submit(SubmissionRequest {
            credential_ref: "acct-a".to_string(),
            segment_ids: vec!["engaged-30d".to_string(), "high-value".to_string()],
            params: JobParameters {
                currency_symbol: "€".to_string(),
                thresholds: BTreeMap::from([("high_value_spend".to_string(), 750.0)]),
            },
        })
        .await
        .unwrap();

    let stored = store.find_by_id(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.ledger.pending(), &["engaged-30d", "high-value"]);
    assert_eq!(stored.params.currency_symbol, "€");
    assert_eq!(stored.params.threshold("high_value_spend"), Some(750.0));
    assert_eq!(stored.created_at, NOW);
    assert_eq!(stored, job);
}

#[tokio::test]
async fn test_unknown_segment_ids_rejected_before_insert() {
    let store = sqlite_store().await;
    let clock = Arc::new(FixedTimeProvider::at(NOW));
    let service = submission_service(store.clone(), clock);

    let err = service
        .submit(request("acct-a", &["engaged-30d", "no-such-segment"]))
        .await
        .unwrap_err();
    match err {
        AppError::Validation(message) => assert!(message.contains("no-such-segment")),
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(store.find_by_id("job-1").await.unwrap().is_none());
}

/// One credential can only have one job in flight; the slot frees up as
/// soon as that job reaches a terminal status.
#[tokio::test]
async fn test_one_active_job_per_credential() {
    let store = sqlite_store().await;
    let clock = Arc::new(FixedTimeProvider::at(NOW));
    let service = submission_service(store.clone(), clock);

    let first = service.submit(request("acct-a", &["engaged-30d"])).await.unwrap();

    let err = service
        .submit(request("acct-a", &["repeat-buyers"]))
        .await
        .unwrap_err();
    match err {
        AppError::Conflict(message) => assert!(message.contains(&first.id)),
        other => panic!("unexpected error: {other:?}"),
    }

    // A different credential is unaffected.
    service.submit(request("acct-b", &["repeat-buyers"])).await.unwrap();

    // Finish the first job and the credential frees up.
    let mut active = store.claim_due(&first.id, NOW + 1_000).await.unwrap().unwrap();
    active.record_created("engaged-30d", NOW + 1_100).unwrap();
    active.complete(NOW + 1_200).unwrap();
    assert!(store.persist_progress(&active).await.unwrap());

    service.submit(request("acct-a", &["repeat-buyers"])).await.unwrap();
}

/// The partial unique index is the durable backstop behind the service
/// precheck, so raw inserts hit it too.
#[tokio::test]
async fn test_unique_index_backstops_direct_inserts() {
    let store = sqlite_store().await;
    let job = |id: &str| {
        ProvisionJob::new(
            id.to_string(),
            "acct-a".to_string(),
            vec!["engaged-30d".to_string()],
            JobParameters::default(),
            NOW,
        )
    };

    store.insert(&job("j-1")).await.unwrap();
    let err = store.insert(&job("j-2")).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Terminal rows leave the index, so the same credential can insert again.
    assert!(store.cancel("j-1", NOW + 500).await.unwrap());
    store.insert(&job("j-2")).await.unwrap();
}

#[tokio::test]
async fn test_cancel_pending_job_frees_credential() {
    let store = sqlite_store().await;
    let clock = Arc::new(FixedTimeProvider::at(NOW));
    let service = submission_service(store.clone(), clock.clone());
    let cancellation = CancellationService::new(store.clone(), clock);

    let job = service.submit(request("acct-a", &["engaged-30d"])).await.unwrap();
    let cancelled = cancellation.cancel(&job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    let stored = store.find_by_id(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert!(stored.completed_at.is_some());

    service.submit(request("acct-a", &["repeat-buyers"])).await.unwrap();
}

#[tokio::test]
async fn test_cancel_rejects_missing_and_terminal_jobs() {
    let store = sqlite_store().await;
    let clock = Arc::new(FixedTimeProvider::at(NOW));
    let service = submission_service(store.clone(), clock.clone());
    let cancellation = CancellationService::new(store.clone(), clock);

    let err = cancellation.cancel("job-void").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let job = service.submit(request("acct-a", &["engaged-30d"])).await.unwrap();
    let mut active = store.claim_due(&job.id, NOW + 1_000).await.unwrap().unwrap();
    active.record_created("engaged-30d", NOW + 1_100).unwrap();
    active.complete(NOW + 1_200).unwrap();
    assert!(store.persist_progress(&active).await.unwrap());

    let err = cancellation.cancel(&job.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_status_overview_lists_jobs() {
    let store = sqlite_store().await;
    let clock = Arc::new(FixedTimeProvider::at(NOW));
    let service = submission_service(store.clone(), clock.clone());
    let status = StatusService::new(store.clone());

    let first = service.submit(request("acct-a", &["engaged-30d"])).await.unwrap();
    clock.advance(1_000);
    let second = service.submit(request("acct-b", &["repeat-buyers"])).await.unwrap();
    clock.advance(1_000);
    let third = service.submit(request("acct-c", &["never-purchased"])).await.unwrap();

    let recent = status.recent(10).await.unwrap();
    let ids: Vec<&str> = recent.iter().map(|job| job.id.as_str()).collect();
    assert_eq!(ids, vec![third.id.as_str(), second.id.as_str(), first.id.as_str()]);

    clock.advance(1_000);
    CancellationService::new(store.clone(), clock.clone())
        .cancel(&first.id)
        .await
        .unwrap();

    // The cancel was the latest write, so that job leads the overview now.
    let recent = status.recent(10).await.unwrap();
    assert_eq!(recent[0].id, first.id);

    let pending = status.by_status(JobStatus::Pending, 10).await.unwrap();
    assert_eq!(pending.len(), 2);

    let counts = status.status_counts().await.unwrap();
    let count_for = |wanted: JobStatus| {
        counts
            .iter()
            .find(|(status, _)| *status == wanted)
            .map(|(_, count)| *count)
            .unwrap()
    };
    assert_eq!(counts.len(), 6);
    assert_eq!(count_for(JobStatus::Pending), 2);
    assert_eq!(count_for(JobStatus::Cancelled), 1);
    assert_eq!(count_for(JobStatus::Failed), 0);
}
