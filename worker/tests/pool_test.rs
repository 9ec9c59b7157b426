//! Worker pool tests with a scripted lookup.

use async_trait::async_trait;
use censo_core::{Cedula, FailureKind, Outcome, TransientFailure, ValidationStatus};
use censo_db::{validation_records, Database};
use censo_lookup::CensusLookup;
use censo_scheduler::{JobQueue, RetryPolicy};
use censo_validator::{register_subject, run_post_commit, ValidationOrchestrator};
use censo_worker::pool::WorkerPool;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Not found for every cedula ending in 0, timeout for the rest.
struct ParityLookup {
    calls: AtomicUsize,
}

#[async_trait]
impl CensusLookup for ParityLookup {
    async fn lookup(&self, cedula: &Cedula) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cedula.as_str().ends_with('0') {
            Outcome::NotFound
        } else {
            Outcome::Transient(TransientFailure::new(FailureKind::Timeout, "slow page"))
        }
    }
}

async fn wait_until_settled(db: &Database, ids: &[censo_core::SubjectId]) {
    for _ in 0..200 {
        let mut settled = true;
        for id in ids {
            let record = validation_records::get_record(db.pool(), id)
                .await
                .expect("get record")
                .expect("record exists");
            settled &= !record.is_in_flight();
        }
        if settled {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("records did not settle in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_runs_jobs_and_retries_until_exhausted() {
    let db = Database::new(":memory:", 1).await.expect("create database");
    db.run_migrations().await.expect("migrations");
    let queue = Arc::new(db.job_queue());

    let lookup = Arc::new(ParityLookup {
        calls: AtomicUsize::new(0),
    });
    // Zero backoff so retries are due immediately
    let policy = RetryPolicy {
        max_attempts: 3,
        backoff: vec![ChronoDuration::zero()],
    };
    let orchestrator = Arc::new(
        ValidationOrchestrator::new(db.pool().clone(), lookup.clone(), queue.clone())
            .with_policy(policy),
    );

    let mut ids = Vec::new();
    for cedula in ["1234567890", "1234567891"] {
        let registration = register_subject(
            db.pool(),
            Cedula::new(cedula).expect("valid cedula"),
            Utc::now(),
        )
        .await
        .expect("register");
        run_post_commit(queue.as_ref(), registration.post_commit)
            .await
            .expect("enqueue");
        ids.push(registration.subject.id);
    }

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::new(queue.clone(), orchestrator, 2, Duration::from_millis(10));
    let handle = tokio::spawn(pool.run(shutdown.clone()));

    wait_until_settled(&db, &ids).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pool stops")
        .expect("pool task");

    let found = validation_records::get_record(db.pool(), &ids[0])
        .await
        .expect("get")
        .expect("record");
    assert_eq!(found.status, ValidationStatus::NotFound);

    let exhausted = validation_records::get_record(db.pool(), &ids[1])
        .await
        .expect("get")
        .expect("record");
    assert_eq!(exhausted.status, ValidationStatus::Timeout);
    assert_eq!(exhausted.retry_count, 3);

    assert_eq!(lookup.calls.load(Ordering::SeqCst), 4);
    assert!(queue.queued_jobs().await.expect("queued").is_empty());
    assert!(queue
        .claim_next_due(Utc::now())
        .await
        .expect("claim")
        .is_none());
}

#[tokio::test]
async fn test_pool_stops_when_idle() {
    let db = Database::new(":memory:", 1).await.expect("create database");
    db.run_migrations().await.expect("migrations");
    let queue = Arc::new(db.job_queue());
    let lookup = Arc::new(ParityLookup {
        calls: AtomicUsize::new(0),
    });
    let orchestrator = Arc::new(ValidationOrchestrator::new(
        db.pool().clone(),
        lookup.clone(),
        queue.clone(),
    ));

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::new(queue, orchestrator, 0, Duration::from_secs(60));
    let handle = tokio::spawn(pool.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pool stops promptly")
        .expect("pool task");
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
}
