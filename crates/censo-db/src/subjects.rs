//! Subjects: the people whose cedulas are validated.

use crate::error::{DatabaseError, Result};
use censo_core::{Cedula, SubjectId};
use censo_scheduler::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// A registered subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Subject identifier
    pub id: SubjectId,
    /// Cedula to validate
    pub cedula: Cedula,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

/// Insert a subject. Takes a connection so it can join a transaction.
pub async fn insert_subject(conn: &mut SqliteConnection, subject: &Subject) -> Result<()> {
    sqlx::query("INSERT INTO subjects (id, cedula, created_at) VALUES (?, ?, ?)")
        .bind(subject.id.as_str())
        .bind(subject.cedula.as_str())
        .bind(format_timestamp(subject.created_at))
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Look up a subject by id.
pub async fn get_subject(pool: &SqlitePool, id: &SubjectId) -> Result<Option<Subject>> {
    let row = sqlx::query("SELECT id, cedula, created_at FROM subjects WHERE id = ?")
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(subject_from_row).transpose()
}

fn subject_from_row(row: &SqliteRow) -> Result<Subject> {
    let id: String = row.try_get("id")?;
    let cedula: String = row.try_get("cedula")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Subject {
        id: SubjectId::new(id).map_err(|e| DatabaseError::Decode(e.to_string()))?,
        cedula: Cedula::new(cedula).map_err(|e| DatabaseError::Decode(e.to_string()))?,
        created_at: parse_timestamp(&created_at)
            .ok_or_else(|| DatabaseError::Decode(format!("invalid created_at '{created_at}'")))?,
    })
}

/// Delete a subject; its validation record goes with it.
///
/// Returns false if no such subject existed.
pub async fn delete_subject(pool: &SqlitePool, id: &SubjectId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM subjects WHERE id = ?")
        .bind(id.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn setup_test_db() -> Database {
        let db = Database::new(":memory:", 1)
            .await
            .expect("create test database");
        db.run_migrations().await.expect("run migrations");
        db
    }

    fn subject() -> Subject {
        Subject {
            id: SubjectId::generate(),
            cedula: Cedula::new("1234567890").unwrap(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_subject() {
        let db = setup_test_db().await;
        let subject = subject();

        let mut conn = db.pool().acquire().await.expect("acquire");
        insert_subject(&mut conn, &subject).await.expect("insert");
        drop(conn);

        let loaded = get_subject(db.pool(), &subject.id)
            .await
            .expect("get")
            .expect("subject exists");
        assert_eq!(loaded.id, subject.id);
        assert_eq!(loaded.cedula, subject.cedula);
        assert_eq!(
            format_timestamp(loaded.created_at),
            format_timestamp(subject.created_at)
        );
    }

    #[tokio::test]
    async fn test_get_missing_subject() {
        let db = setup_test_db().await;
        let missing = get_subject(db.pool(), &SubjectId::generate())
            .await
            .expect("get");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_subject() {
        let db = setup_test_db().await;
        let subject = subject();

        let mut conn = db.pool().acquire().await.expect("acquire");
        insert_subject(&mut conn, &subject).await.expect("insert");
        drop(conn);

        assert!(delete_subject(db.pool(), &subject.id).await.expect("delete"));
        assert!(!delete_subject(db.pool(), &subject.id).await.expect("delete again"));
    }
}
