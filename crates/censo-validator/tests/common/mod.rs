#![allow(dead_code)]

use async_trait::async_trait;
use censo_core::{Cedula, FailureKind, Outcome, SubjectId, TransientFailure, ValidationRecord};
use censo_db::{validation_records, Database, SqliteJobQueue};
use censo_lookup::CensusLookup;
use censo_validator::{register_subject, run_post_commit, Clock};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

pub async fn setup() -> (Database, Arc<SqliteJobQueue>) {
    let db = Database::new(":memory:", 1).await.expect("create database");
    db.run_migrations().await.expect("migrations");
    let queue = Arc::new(db.job_queue());
    (db, queue)
}

/// Register a subject and enqueue its first job.
pub async fn register(db: &Database, queue: &SqliteJobQueue, cedula: &str, at: DateTime<Utc>) -> SubjectId {
    let cedula = Cedula::new(cedula).expect("valid cedula");
    let registration = register_subject(db.pool(), cedula, at)
        .await
        .expect("register subject");
    run_post_commit(queue, registration.post_commit)
        .await
        .expect("enqueue first attempt");
    registration.subject.id
}

pub async fn record(db: &Database, subject_id: &SubjectId) -> ValidationRecord {
    validation_records::get_record(db.pool(), subject_id)
        .await
        .expect("get record")
        .expect("record exists")
}

pub fn transient(kind: FailureKind, raw: &str) -> Outcome {
    Outcome::Transient(TransientFailure::new(kind, "scripted failure").with_raw_response(raw))
}

/// Lookup that plays back a fixed list of outcomes.
#[derive(Default)]
pub struct ScriptedLookup {
    outcomes: Mutex<VecDeque<Outcome>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedLookup {
    pub fn new(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CensusLookup for ScriptedLookup {
    async fn lookup(&self, cedula: &Cedula) -> Outcome {
        self.seen.lock().unwrap().push(cedula.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted lookup ran out of outcomes")
    }
}

/// Manually advanced clock.
#[derive(Clone)]
pub struct TestClock(Arc<Mutex<DateTime<Utc>>>);

impl TestClock {
    pub fn at(start: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }

    pub fn clock(&self) -> Clock {
        let inner = self.0.clone();
        Arc::new(move || *inner.lock().unwrap())
    }
}
