//! Refresh, reaper and registration tests.

mod common;

use censo_core::{RefreshConfig, SubjectId, ValidationStatus};
use censo_db::validation_records;
use censo_scheduler::{validate_job_name, JobQueue, StalenessPolicy, STALE_MESSAGE};
use censo_validator::refresh::SkipReason;
use censo_validator::{
    register_subject, run_post_commit, BulkEntry, Reaper, RefreshOutcome, RefreshService,
};
use chrono::{DateTime, Duration, Utc};
use common::{record, register, setup, t0};
use censo_db::Database;

async fn set_state(
    db: &Database,
    subject_id: &SubjectId,
    status: ValidationStatus,
    fetched_at: Option<DateTime<Utc>>,
) {
    let mut record = record(db, subject_id).await;
    record.status = status;
    record.fetched_at = fetched_at;
    validation_records::save_record(db.pool(), &record)
        .await
        .expect("save record");
}

#[tokio::test]
async fn test_registration_creates_pending_record_and_first_job() {
    let (db, queue) = setup().await;
    let cedula = censo_core::Cedula::new("1234567890").expect("valid cedula");

    let registration = register_subject(db.pool(), cedula, t0())
        .await
        .expect("register");
    assert_eq!(registration.record.status, ValidationStatus::Pending);
    assert_eq!(registration.record.retry_count, 0);
    assert!(registration.record.location.is_blank());
    assert!(registration.record.cancellation.is_blank());

    // Nothing is queued until the caller runs the post-commit jobs
    assert!(queue.queued_jobs().await.expect("queued").is_empty());

    let subject_id = registration.subject.id.clone();
    assert_eq!(registration.post_commit.len(), 1);
    assert_eq!(
        registration.post_commit[0].name,
        format!("validate_cedula_{subject_id}")
    );

    let queued = run_post_commit(queue.as_ref(), registration.post_commit.clone())
        .await
        .expect("post commit");
    assert_eq!(queued, 1);
    let queued = run_post_commit(queue.as_ref(), registration.post_commit)
        .await
        .expect("post commit again");
    assert_eq!(queued, 0);

    let stored = record(&db, &subject_id).await;
    assert_eq!(stored.status, ValidationStatus::Pending);
    assert_eq!(stored.created_at, t0());
}

#[tokio::test]
async fn test_refresh_respects_cooldown() {
    let (db, queue) = setup().await;
    let subject_id = register(&db, &queue, "1234567890", t0()).await;
    // Drain the registration job
    let job = queue.claim_next_due(t0()).await.expect("claim").expect("job");
    queue.complete(job.id).await.expect("complete");

    set_state(&db, &subject_id, ValidationStatus::Active, Some(t0())).await;

    let service = RefreshService::new(db.pool().clone(), queue.clone(), &RefreshConfig::default());

    let outcome = service
        .refresh(&subject_id, t0() + Duration::seconds(10))
        .await
        .expect("refresh");
    assert_eq!(
        outcome,
        RefreshOutcome::CoolingDown {
            retry_after: Duration::seconds(20)
        }
    );
    assert_eq!(record(&db, &subject_id).await.status, ValidationStatus::Active);

    let accepted_at = t0() + Duration::seconds(30);
    let outcome = service.refresh(&subject_id, accepted_at).await.expect("refresh");
    assert_eq!(outcome, RefreshOutcome::Accepted);

    let stored = record(&db, &subject_id).await;
    assert_eq!(stored.status, ValidationStatus::Processing);
    assert_eq!(stored.fetched_at, Some(accepted_at));
    assert_eq!(stored.retry_count, 0);

    let queued = queue.queued_jobs().await.expect("queued");
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].name, validate_job_name(&subject_id, 1));

    // Already processing
    let outcome = service
        .refresh(&subject_id, accepted_at + Duration::minutes(1))
        .await
        .expect("refresh");
    assert_eq!(outcome, RefreshOutcome::InProgress);
}

#[tokio::test]
async fn test_refresh_resets_retry_budget_after_error() {
    let (db, queue) = setup().await;
    let subject_id = register(&db, &queue, "1234567890", t0()).await;

    let mut stored = record(&db, &subject_id).await;
    stored.status = ValidationStatus::Error;
    stored.retry_count = 3;
    stored.fetched_at = Some(t0());
    validation_records::save_record(db.pool(), &stored)
        .await
        .expect("save");

    let service = RefreshService::new(db.pool().clone(), queue.clone(), &RefreshConfig::default());
    let outcome = service
        .refresh(&subject_id, t0() + Duration::minutes(5))
        .await
        .expect("refresh");
    assert_eq!(outcome, RefreshOutcome::Accepted);
    assert_eq!(record(&db, &subject_id).await.retry_count, 0);
}

#[tokio::test]
async fn test_bulk_refresh_skips_and_reports() {
    let (db, queue) = setup().await;
    let now = t0() + Duration::minutes(10);

    let active = register(&db, &queue, "1000001", t0()).await;
    let processing = register(&db, &queue, "1000002", t0()).await;
    let cooling = register(&db, &queue, "1000003", t0()).await;
    let errored = register(&db, &queue, "1000004", t0()).await;
    let not_found = register(&db, &queue, "1000005", t0()).await;
    let missing = SubjectId::generate();

    set_state(&db, &active, ValidationStatus::Active, Some(t0())).await;
    set_state(&db, &processing, ValidationStatus::Processing, Some(t0())).await;
    set_state(&db, &cooling, ValidationStatus::Timeout, Some(now - Duration::seconds(5))).await;
    set_state(&db, &errored, ValidationStatus::Error, Some(t0())).await;
    set_state(&db, &not_found, ValidationStatus::NotFound, Some(t0())).await;

    let service = RefreshService::new(db.pool().clone(), queue.clone(), &RefreshConfig::default());
    let ids = vec![
        active.clone(),
        processing.clone(),
        cooling.clone(),
        errored.clone(),
        not_found.clone(),
        missing.clone(),
    ];
    let report = service.bulk_refresh(&ids, now).await.expect("bulk refresh");

    assert_eq!(report.refreshed, 1);
    assert_eq!(
        report.entries,
        vec![
            (
                active,
                BulkEntry::Skipped(SkipReason::Permanent(ValidationStatus::Active))
            ),
            (processing, BulkEntry::Skipped(SkipReason::InProgress)),
            (cooling, BulkEntry::Skipped(SkipReason::CoolingDown)),
            (errored.clone(), BulkEntry::Refreshed),
            (
                not_found,
                BulkEntry::Skipped(SkipReason::Permanent(ValidationStatus::NotFound))
            ),
            (missing, BulkEntry::Skipped(SkipReason::Missing)),
        ]
    );

    let stored = record(&db, &errored).await;
    assert_eq!(stored.status, ValidationStatus::Processing);
    assert_eq!(stored.fetched_at, Some(now));
}

#[tokio::test]
async fn test_bulk_refresh_is_capped_at_batch_size() {
    let (db, queue) = setup().await;
    let mut ids = Vec::new();
    for n in 0..4 {
        let id = register(&db, &queue, &format!("200000{n}"), t0()).await;
        set_state(&db, &id, ValidationStatus::Error, None).await;
        ids.push(id);
    }

    let config = RefreshConfig {
        bulk_batch_size: 3,
        ..RefreshConfig::default()
    };
    let service = RefreshService::new(db.pool().clone(), queue.clone(), &config);
    let report = service.bulk_refresh(&ids, t0()).await.expect("bulk refresh");

    assert_eq!(report.refreshed, 3);
    assert_eq!(report.entries.len(), 3);
    assert_eq!(record(&db, &ids[3]).await.status, ValidationStatus::Error);
}

#[tokio::test]
async fn test_pending_record_goes_stale_after_two_minutes() {
    let (db, queue) = setup().await;
    let subject_id = register(&db, &queue, "1234567890", t0()).await;
    let reaper = Reaper::new(db.pool().clone(), StalenessPolicy::default());

    let status = reaper
        .census_status(&subject_id, t0() + Duration::minutes(2))
        .await
        .expect("status")
        .expect("record");
    assert!(status.is_polling);
    assert_eq!(status.record.status, ValidationStatus::Pending);
    assert_eq!(status.label, "Pendiente");

    let status = reaper
        .census_status(&subject_id, t0() + Duration::minutes(2) + Duration::seconds(1))
        .await
        .expect("status")
        .expect("record");
    assert!(!status.is_polling);
    assert_eq!(status.record.status, ValidationStatus::Error);
    assert_eq!(status.record.error_message, STALE_MESSAGE);
    assert_eq!(status.label, "Error");

    // The reset is persisted
    assert_eq!(record(&db, &subject_id).await.status, ValidationStatus::Error);
}

#[tokio::test]
async fn test_processing_staleness_is_measured_from_fetched_at() {
    let (db, queue) = setup().await;
    let subject_id = register(&db, &queue, "1234567890", t0()).await;
    let refreshed_at = t0() + Duration::hours(1);
    set_state(&db, &subject_id, ValidationStatus::Processing, Some(refreshed_at)).await;

    let reaper = Reaper::new(db.pool().clone(), StalenessPolicy::default());
    let mut stored = record(&db, &subject_id).await;

    assert!(!reaper
        .reset_if_stale(&mut stored, refreshed_at + Duration::minutes(4))
        .await
        .expect("reap"));
    assert!(reaper
        .reset_if_stale(&mut stored, refreshed_at + Duration::minutes(6))
        .await
        .expect("reap"));
    assert_eq!(stored.status, ValidationStatus::Error);
}

#[tokio::test]
async fn test_census_status_of_unknown_subject() {
    let (db, _queue) = setup().await;
    let reaper = Reaper::new(db.pool().clone(), StalenessPolicy::default());
    let status = reaper
        .census_status(&SubjectId::generate(), t0())
        .await
        .expect("status");
    assert!(status.is_none());
}
