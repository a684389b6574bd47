use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::audit::query::AuditQuery;
use crate::database::models::*;

const ENTRY_COLUMNS: &str = "id, event_type, event_category, actor_id, affected_entity_type, \
     affected_entity_id, event_data, event_hash, previous_hash, created_at";

pub struct Queries;

impl Queries {
    /// Read the chain head on the writer's connection.
    pub async fn chain_head(conn: &mut SqliteConnection) -> Result<Option<HeadRow>, sqlx::Error> {
        sqlx::query_as::<_, HeadRow>(
            r#"
            SELECT id, event_hash, created_at
            FROM audit_entries
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(conn)
        .await
    }

    pub async fn insert_entry(
        conn: &mut SqliteConnection,
        entry: &PendingEntry<'_>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_entries (
                event_type, event_category, actor_id, affected_entity_type,
                affected_entity_id, event_data, event_hash, previous_hash, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.event_type)
        .bind(entry.event_category)
        .bind(entry.actor_id)
        .bind(entry.affected_entity_type)
        .bind(entry.affected_entity_id)
        .bind(entry.event_data)
        .bind(entry.event_hash)
        .bind(entry.previous_hash)
        .bind(entry.created_at)
        .execute(conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_entry(pool: &SqlitePool, id: i64) -> Result<Option<AuditEntryRow>, sqlx::Error> {
        sqlx::query_as::<_, AuditEntryRow>(&format!(
            "SELECT {} FROM audit_entries WHERE id = ?",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Entries in insertion order, optionally bounded by `created_at` (inclusive).
    pub async fn entries_ascending(
        pool: &SqlitePool,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<AuditEntryRow>, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM audit_entries WHERE 1 = 1",
            ENTRY_COLUMNS
        ));
        if let Some(start) = start {
            builder.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = end {
            builder.push(" AND created_at <= ").push_bind(end);
        }
        builder.push(" ORDER BY created_at ASC, id ASC");

        let rows = builder
            .build_query_as::<AuditEntryRow>()
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// The entry immediately preceding `(created_at, id)` in chain order.
    pub async fn entry_before(
        pool: &SqlitePool,
        created_at: i64,
        id: i64,
    ) -> Result<Option<AuditEntryRow>, sqlx::Error> {
        sqlx::query_as::<_, AuditEntryRow>(&format!(
            r#"
            SELECT {}
            FROM audit_entries
            WHERE created_at < ? OR (created_at = ? AND id < ?)
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            ENTRY_COLUMNS
        ))
        .bind(created_at)
        .bind(created_at)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Filtered entries, newest first.
    pub async fn query_entries(
        pool: &SqlitePool,
        filter: &AuditQuery,
        limit: u32,
    ) -> Result<Vec<AuditEntryRow>, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM audit_entries WHERE 1 = 1",
            ENTRY_COLUMNS
        ));

        let text_filters = [
            ("event_type", &filter.event_type),
            ("event_category", &filter.event_category),
            ("actor_id", &filter.actor_id),
            ("affected_entity_type", &filter.entity_type),
            ("affected_entity_id", &filter.entity_id),
        ];
        for (column, value) in text_filters {
            if let Some(value) = value {
                builder
                    .push(format!(" AND {} = ", column))
                    .push_bind(value.clone());
            }
        }

        if let Some(start) = filter.start_date {
            builder.push(" AND created_at >= ").push_bind(to_micros(start));
        }
        if let Some(end) = filter.end_date {
            builder.push(" AND created_at <= ").push_bind(to_micros(end));
        }

        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(limit));

        let rows = builder
            .build_query_as::<AuditEntryRow>()
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    pub async fn stats(pool: &SqlitePool) -> Result<LedgerStats, sqlx::Error> {
        let (total_entries, first, last): (i64, Option<i64>, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), MIN(created_at), MAX(created_at) FROM audit_entries",
        )
        .fetch_one(pool)
        .await?;

        Ok(LedgerStats {
            total_entries,
            first_entry_at: first.map(from_micros),
            last_entry_at: last.map(from_micros),
        })
    }

    pub async fn latest_entry(pool: &SqlitePool) -> Result<Option<AuditEntryRow>, sqlx::Error> {
        sqlx::query_as::<_, AuditEntryRow>(&format!(
            "SELECT {} FROM audit_entries ORDER BY id DESC LIMIT 1",
            ENTRY_COLUMNS
        ))
        .fetch_optional(pool)
        .await
    }
}
