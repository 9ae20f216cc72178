//! SQLite-backed store. Both collections live in one `pois` table keyed by
//! `(id, collection)`.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};

use super::{ApprovalOutcome, ApprovalSnapshot, PoiStore, StoreInfo, StoreSnapshot};
use crate::errors::AppError;
use crate::models::{Coord, Poi, SessionId};

const APPROVED: &str = "approved";
const DRAFT: &str = "draft";

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pois (
            id TEXT NOT NULL,
            collection TEXT NOT NULL CHECK (collection IN ('approved', 'draft')),
            type TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            x INTEGER NOT NULL,
            y INTEGER NOT NULL,
            session_id TEXT,
            date_added TEXT,
            last_edited TEXT,
            PRIMARY KEY (id, collection)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_pois_collection ON pois(collection);
        CREATE INDEX IF NOT EXISTS idx_pois_session ON pois(session_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    location: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, location: impl Into<String>) -> Self {
        Self {
            pool,
            location: location.into(),
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<Poi>, AppError> {
        let rows = sqlx::query(
            "SELECT id, collection, type, description, x, y, session_id, date_added, last_edited \
             FROM pois WHERE collection = ? ORDER BY date_added, id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(poi_from_row).collect())
    }

    async fn upsert_draft(&self, poi: &Poi) -> Result<StoreSnapshot, AppError> {
        let mut tx = self.pool.begin().await?;
        let existed = exists(&mut tx, &poi.id, DRAFT).await?;
        upsert(&mut tx, poi, DRAFT).await?;
        tx.commit().await?;

        let message = if existed {
            "POI updated successfully"
        } else {
            "POI added successfully"
        };
        Ok(StoreSnapshot {
            message: message.to_string(),
            pois: self.list(DRAFT).await?,
        })
    }
}

#[async_trait]
impl PoiStore for SqliteStore {
    async fn fetch_approved(&self) -> Result<Vec<Poi>, AppError> {
        self.list(APPROVED).await
    }

    async fn fetch_draft(&self) -> Result<Vec<Poi>, AppError> {
        self.list(DRAFT).await
    }

    async fn submit_create(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        self.upsert_draft(&poi).await
    }

    async fn submit_update(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        self.upsert_draft(&poi).await
    }

    async fn submit_delete(&self, id: &str) -> Result<StoreSnapshot, AppError> {
        let result = sqlx::query("DELETE FROM pois WHERE id = ? AND collection = ?")
            .bind(id)
            .bind(DRAFT)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("POI {} not found", id)));
        }

        Ok(StoreSnapshot {
            message: "POI deleted successfully".to_string(),
            pois: self.list(DRAFT).await?,
        })
    }

    async fn submit_approve(&self, poi: Poi) -> Result<ApprovalSnapshot, AppError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM pois WHERE id = ? AND collection = ?")
            .bind(&poi.id)
            .bind(DRAFT)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let outcome = if removed == 0 && exists(&mut tx, &poi.id, APPROVED).await? {
            ApprovalOutcome::AlreadyApproved
        } else {
            upsert(&mut tx, &poi, APPROVED).await?;
            ApprovalOutcome::Approved
        };
        tx.commit().await?;

        Ok(ApprovalSnapshot {
            outcome,
            draft: self.list(DRAFT).await?,
            approved: self.list(APPROVED).await?,
        })
    }

    async fn amend_approved(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
        let mut tx = self.pool.begin().await?;
        if !exists(&mut tx, &poi.id, APPROVED).await? {
            return Err(AppError::NotFound(format!("Approved POI {} not found", poi.id)));
        }
        upsert(&mut tx, &poi, APPROVED).await?;
        tx.commit().await?;

        Ok(StoreSnapshot {
            message: "Approved POI updated".to_string(),
            pois: self.list(APPROVED).await?,
        })
    }

    async fn inspect(&self) -> Result<StoreInfo, AppError> {
        let row = sqlx::query(
            "SELECT \
               SUM(CASE WHEN collection = 'approved' THEN 1 ELSE 0 END) AS approved, \
               SUM(CASE WHEN collection = 'draft' THEN 1 ELSE 0 END) AS draft \
             FROM pois",
        )
        .fetch_one(&self.pool)
        .await?;
        let approved: Option<i64> = row.get("approved");
        let draft: Option<i64> = row.get("draft");

        Ok(StoreInfo {
            backend: "sqlite".to_string(),
            location: self.location.clone(),
            exists: true,
            files: vec![
                format!("{}: {} rows", APPROVED, approved.unwrap_or(0)),
                format!("{}: {} rows", DRAFT, draft.unwrap_or(0)),
            ],
        })
    }
}

async fn exists(tx: &mut Transaction<'_, Sqlite>, id: &str, collection: &str) -> Result<bool, AppError> {
    let row = sqlx::query("SELECT 1 FROM pois WHERE id = ? AND collection = ?")
        .bind(id)
        .bind(collection)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.is_some())
}

async fn upsert(tx: &mut Transaction<'_, Sqlite>, poi: &Poi, collection: &str) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO pois (id, collection, type, description, x, y, session_id, date_added, last_edited) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id, collection) DO UPDATE SET \
           type = excluded.type, description = excluded.description, x = excluded.x, y = excluded.y, \
           session_id = excluded.session_id, date_added = excluded.date_added, last_edited = excluded.last_edited",
    )
    .bind(&poi.id)
    .bind(collection)
    .bind(&poi.kind)
    .bind(&poi.description)
    .bind(poi.x.value())
    .bind(poi.y.value())
    .bind(poi.session_id.as_ref().map(SessionId::as_str))
    .bind(poi.date_added.map(|d| d.to_rfc3339()))
    .bind(poi.last_edited.map(|d| d.to_rfc3339()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn poi_from_row(row: &SqliteRow) -> Poi {
    let collection: String = row.get("collection");
    Poi {
        id: row.get("id"),
        kind: row.get("type"),
        description: row.get("description"),
        x: Coord::new(row.get("x")),
        y: Coord::new(row.get("y")),
        visible: true,
        approved: collection == APPROVED,
        session_id: row.get::<Option<String>, _>("session_id").map(SessionId::new),
        date_added: parse_timestamp(row.get("date_added")),
        last_edited: parse_timestamp(row.get("last_edited")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pois.sqlite");
        let pool = init_database(&path).await.unwrap();
        (dir, SqliteStore::new(pool, path.display().to_string()))
    }

    fn poi(id: &str, session: &str) -> Poi {
        Poi {
            id: id.to_string(),
            kind: "dungeon".to_string(),
            description: "deep".to_string(),
            x: Coord::new(-7),
            y: Coord::new(42),
            visible: true,
            approved: false,
            session_id: Some(SessionId::new(session)),
            date_added: Some(Utc::now()),
            last_edited: None,
        }
    }

    #[tokio::test]
    async fn test_draft_upsert_and_delete() {
        let (_dir, store) = open().await;

        let created = store.submit_create(poi("a", "s1")).await.unwrap();
        assert_eq!(created.message, "POI added successfully");

        let mut edited = poi("a", "s1");
        edited.description = "deeper".to_string();
        let updated = store.submit_update(edited).await.unwrap();
        assert_eq!(updated.message, "POI updated successfully");
        assert_eq!(updated.pois.len(), 1);
        assert_eq!(updated.pois[0].description, "deeper");
        assert_eq!(updated.pois[0].session_id, Some(SessionId::new("s1")));

        store.submit_delete("a").await.unwrap();
        assert!(store.fetch_draft().await.unwrap().is_empty());
        assert!(matches!(store.submit_delete("a").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_approve_moves_row_between_collections() {
        let (_dir, store) = open().await;
        store.submit_create(poi("a", "s1")).await.unwrap();

        let first = store.submit_approve(poi("a", "s1")).await.unwrap();
        assert_eq!(first.outcome, ApprovalOutcome::Approved);
        assert!(first.draft.is_empty());
        assert_eq!(first.approved.len(), 1);
        assert!(first.approved[0].approved);
        assert_eq!(first.approved[0].x, Coord::new(-7));

        let second = store.submit_approve(poi("a", "s1")).await.unwrap();
        assert_eq!(second.outcome, ApprovalOutcome::AlreadyApproved);
        assert_eq!(second.approved.len(), 1);
    }

    #[tokio::test]
    async fn test_amend_approved_requires_approved_row() {
        let (_dir, store) = open().await;
        store.submit_create(poi("a", "s1")).await.unwrap();

        assert!(matches!(
            store.amend_approved(poi("a", "s1")).await,
            Err(AppError::NotFound(_))
        ));

        store.submit_approve(poi("a", "s1")).await.unwrap();
        let mut fixed = poi("a", "s1");
        fixed.description = "typo fixed".to_string();
        let snapshot = store.amend_approved(fixed).await.unwrap();
        assert_eq!(snapshot.pois[0].description, "typo fixed");
    }

    #[tokio::test]
    async fn test_inspect_counts_rows() {
        let (_dir, store) = open().await;
        store.submit_create(poi("a", "s1")).await.unwrap();
        store.submit_create(poi("b", "s1")).await.unwrap();
        store.submit_approve(poi("a", "s1")).await.unwrap();

        let info = store.inspect().await.unwrap();
        assert_eq!(info.backend, "sqlite");
        assert_eq!(info.files, vec!["approved: 1 rows", "draft: 1 rows"]);
    }
}
