//! Validation record storage.
//!
//! One row per subject. The subject's creation time is joined in on read so
//! the staleness rules can use it.

use crate::error::{DatabaseError, Result};
use censo_core::{
    CancellationDetails, Cedula, SubjectId, ValidationRecord, ValidationStatus, VotingLocation,
};
use censo_scheduler::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

const SELECT_RECORD: &str = "SELECT r.subject_id, r.cedula, r.status, r.departamento, r.municipio,
        r.puesto, r.direccion, r.mesa, r.novedad, r.resolucion, r.fecha_novedad, r.fetched_at,
        r.error_message, r.raw_response, r.retry_count, r.next_attempt_at, s.created_at
     FROM validation_records r
     JOIN subjects s ON s.id = r.subject_id";

/// Insert a new record. Takes a connection so it can join a transaction.
pub async fn insert_record(conn: &mut SqliteConnection, record: &ValidationRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO validation_records (subject_id, cedula, status, departamento, municipio,
            puesto, direccion, mesa, novedad, resolucion, fecha_novedad, fetched_at,
            error_message, raw_response, retry_count, next_attempt_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.subject_id.as_str())
    .bind(record.cedula.as_str())
    .bind(record.status.as_str())
    .bind(&record.location.departamento)
    .bind(&record.location.municipio)
    .bind(&record.location.puesto)
    .bind(&record.location.direccion)
    .bind(&record.location.mesa)
    .bind(&record.cancellation.novedad)
    .bind(&record.cancellation.resolucion)
    .bind(&record.cancellation.fecha_novedad)
    .bind(record.fetched_at.map(format_timestamp))
    .bind(&record.error_message)
    .bind(record.raw_response.as_deref())
    .bind(i64::from(record.retry_count))
    .bind(record.next_attempt_at.map(format_timestamp))
    .bind(format_timestamp(Utc::now()))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Load the record of a subject.
pub async fn get_record(pool: &SqlitePool, subject_id: &SubjectId) -> Result<Option<ValidationRecord>> {
    let row = sqlx::query(&format!("{SELECT_RECORD} WHERE r.subject_id = ?"))
        .bind(subject_id.as_str())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// Persist every mutable field of a record.
pub async fn save_record(pool: &SqlitePool, record: &ValidationRecord) -> Result<()> {
    let result = sqlx::query(
        "UPDATE validation_records
         SET status = ?, departamento = ?, municipio = ?, puesto = ?, direccion = ?, mesa = ?,
             novedad = ?, resolucion = ?, fecha_novedad = ?, fetched_at = ?, error_message = ?,
             raw_response = ?, retry_count = ?, next_attempt_at = ?, updated_at = ?
         WHERE subject_id = ?",
    )
    .bind(record.status.as_str())
    .bind(&record.location.departamento)
    .bind(&record.location.municipio)
    .bind(&record.location.puesto)
    .bind(&record.location.direccion)
    .bind(&record.location.mesa)
    .bind(&record.cancellation.novedad)
    .bind(&record.cancellation.resolucion)
    .bind(&record.cancellation.fecha_novedad)
    .bind(record.fetched_at.map(format_timestamp))
    .bind(&record.error_message)
    .bind(record.raw_response.as_deref())
    .bind(i64::from(record.retry_count))
    .bind(record.next_attempt_at.map(format_timestamp))
    .bind(format_timestamp(Utc::now()))
    .bind(record.subject_id.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFoundWithMessage(format!(
            "Validation record for subject '{}' not found",
            record.subject_id
        )));
    }

    Ok(())
}

/// Atomically claim a record for a manual refresh.
///
/// Succeeds only if the record is not `PROCESSING` and its last fetch is
/// absent or at least `cooldown` old. On success the record is `PROCESSING`,
/// `fetched_at = now`, `retry_count = 0` and no retry is pending.
pub async fn claim_for_refresh(
    pool: &SqlitePool,
    subject_id: &SubjectId,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Result<bool> {
    let now_str = format_timestamp(now);
    let threshold = format_timestamp(now - cooldown);

    let result = sqlx::query(
        "UPDATE validation_records
         SET status = 'PROCESSING', fetched_at = ?, retry_count = 0, next_attempt_at = NULL,
             updated_at = ?
         WHERE subject_id = ?
           AND status != 'PROCESSING'
           AND (fetched_at IS NULL OR fetched_at <= ?)",
    )
    .bind(&now_str)
    .bind(&now_str)
    .bind(subject_id.as_str())
    .bind(&threshold)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

fn record_from_row(row: &SqliteRow) -> Result<ValidationRecord> {
    let subject_id: String = row.try_get("subject_id")?;
    let cedula: String = row.try_get("cedula")?;
    let status_str: String = row.try_get("status")?;
    let fetched_at: Option<String> = row.try_get("fetched_at")?;
    let next_attempt_at: Option<String> = row.try_get("next_attempt_at")?;
    let created_at: String = row.try_get("created_at")?;
    let retry_count: i64 = row.try_get("retry_count")?;

    let status = status_str
        .parse::<ValidationStatus>()
        .map_err(DatabaseError::Decode)?;
    let fetched_at = optional_timestamp("fetched_at", fetched_at)?;
    let next_attempt_at = optional_timestamp("next_attempt_at", next_attempt_at)?;

    Ok(ValidationRecord {
        subject_id: SubjectId::new(subject_id).map_err(|e| DatabaseError::Decode(e.to_string()))?,
        cedula: Cedula::new(cedula).map_err(|e| DatabaseError::Decode(e.to_string()))?,
        status,
        location: VotingLocation {
            departamento: row.try_get("departamento")?,
            municipio: row.try_get("municipio")?,
            puesto: row.try_get("puesto")?,
            direccion: row.try_get("direccion")?,
            mesa: row.try_get("mesa")?,
        },
        cancellation: CancellationDetails {
            novedad: row.try_get("novedad")?,
            resolucion: row.try_get("resolucion")?,
            fecha_novedad: row.try_get("fecha_novedad")?,
        },
        fetched_at,
        error_message: row.try_get("error_message")?,
        raw_response: row.try_get("raw_response")?,
        retry_count: u8::try_from(retry_count)
            .map_err(|_| DatabaseError::Decode(format!("invalid retry_count {retry_count}")))?,
        next_attempt_at,
        created_at: parse_timestamp(&created_at)
            .ok_or_else(|| DatabaseError::Decode(format!("invalid created_at '{created_at}'")))?,
    })
}

fn optional_timestamp(column: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|value| {
            parse_timestamp(&value)
                .ok_or_else(|| DatabaseError::Decode(format!("invalid {column} '{value}'")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subjects::{delete_subject, insert_subject, Subject};
    use crate::Database;
    use censo_core::{FailureKind, TransientFailure};
    use chrono::TimeZone;

    async fn setup_test_db() -> Database {
        let db = Database::new(":memory:", 1)
            .await
            .expect("create test database");
        db.run_migrations().await.expect("run migrations");
        db
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    async fn seed(db: &Database) -> ValidationRecord {
        let subject = Subject {
            id: SubjectId::generate(),
            cedula: Cedula::new("1234567890").unwrap(),
            created_at: t0(),
        };
        let record = ValidationRecord::new_pending(subject.id.clone(), subject.cedula.clone(), t0());

        let mut tx = db.pool().begin().await.expect("begin");
        insert_subject(&mut tx, &subject).await.expect("insert subject");
        insert_record(&mut tx, &record).await.expect("insert record");
        tx.commit().await.expect("commit");

        record
    }

    #[tokio::test]
    async fn test_new_record_round_trip() {
        let db = setup_test_db().await;
        let record = seed(&db).await;

        let loaded = get_record(db.pool(), &record.subject_id)
            .await
            .expect("get")
            .expect("record exists");
        assert_eq!(loaded, record);
        assert_eq!(loaded.status, ValidationStatus::Pending);
        assert_eq!(loaded.retry_count, 0);
        assert!(loaded.location.is_blank());
        assert!(loaded.cancellation.is_blank());
    }

    #[tokio::test]
    async fn test_save_record_persists_outcome() {
        let db = setup_test_db().await;
        let mut record = seed(&db).await;

        record.record_found(
            VotingLocation {
                departamento: "Antioquia".to_string(),
                municipio: "Medellín".to_string(),
                puesto: "Escuela X".to_string(),
                direccion: "Calle 1".to_string(),
                mesa: "05".to_string(),
            },
            t0() + Duration::minutes(1),
        );
        save_record(db.pool(), &record).await.expect("save");

        let loaded = get_record(db.pool(), &record.subject_id)
            .await
            .expect("get")
            .expect("record exists");
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn test_save_missing_record_fails() {
        let db = setup_test_db().await;
        let record = ValidationRecord::new_pending(
            SubjectId::generate(),
            Cedula::new("1234567").unwrap(),
            t0(),
        );

        let err = save_record(db.pool(), &record).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFoundWithMessage(_)));
    }

    #[tokio::test]
    async fn test_record_deleted_with_subject() {
        let db = setup_test_db().await;
        let record = seed(&db).await;

        delete_subject(db.pool(), &record.subject_id)
            .await
            .expect("delete");
        let loaded = get_record(db.pool(), &record.subject_id).await.expect("get");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_claim_for_refresh_respects_cooldown() {
        let db = setup_test_db().await;
        let mut record = seed(&db).await;
        record.record_not_found(t0());
        save_record(db.pool(), &record).await.expect("save");

        let cooldown = Duration::seconds(30);

        let early = t0() + Duration::seconds(29);
        assert!(!claim_for_refresh(db.pool(), &record.subject_id, early, cooldown)
            .await
            .expect("claim"));

        let on_time = t0() + Duration::seconds(30);
        assert!(claim_for_refresh(db.pool(), &record.subject_id, on_time, cooldown)
            .await
            .expect("claim"));

        let loaded = get_record(db.pool(), &record.subject_id)
            .await
            .expect("get")
            .expect("record exists");
        assert_eq!(loaded.status, ValidationStatus::Processing);
        assert_eq!(loaded.fetched_at, Some(on_time));
        assert_eq!(loaded.retry_count, 0);
    }

    #[tokio::test]
    async fn test_claim_for_refresh_rejects_processing() {
        let db = setup_test_db().await;
        let mut record = seed(&db).await;
        record.mark_processing();
        save_record(db.pool(), &record).await.expect("save");

        let claimed = claim_for_refresh(
            db.pool(),
            &record.subject_id,
            t0() + Duration::hours(1),
            Duration::seconds(30),
        )
        .await
        .expect("claim");
        assert!(!claimed);
    }

    #[tokio::test]
    async fn test_claim_for_refresh_never_fetched() {
        let db = setup_test_db().await;
        let record = seed(&db).await;

        // PENDING with no fetch yet: no cooldown applies
        assert!(claim_for_refresh(db.pool(), &record.subject_id, t0(), Duration::seconds(30))
            .await
            .expect("claim"));
        // Second claim loses: the record is now PROCESSING
        assert!(!claim_for_refresh(db.pool(), &record.subject_id, t0(), Duration::seconds(30))
            .await
            .expect("claim"));
    }

    #[tokio::test]
    async fn test_scheduled_retry_round_trip() {
        let db = setup_test_db().await;
        let mut record = seed(&db).await;
        record.mark_processing();
        record.record_retry(
            1,
            &TransientFailure::new(FailureKind::Timeout, "slow"),
            3,
            t0() + Duration::seconds(60),
        );
        save_record(db.pool(), &record).await.expect("save");

        let loaded = get_record(db.pool(), &record.subject_id)
            .await
            .expect("get")
            .expect("record exists");
        assert_eq!(loaded.next_attempt_at, Some(t0() + Duration::seconds(60)));
        assert_eq!(loaded, record);
    }
}
