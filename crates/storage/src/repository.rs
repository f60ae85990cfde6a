//! Repository Implementation

use crate::schema::SCHEMA;
use crate::StorageError;
use chrono::{DateTime, Utc};
use domain_types::{ClassificationResult, ImageMetadata, Label, StatsSource, StatsView};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Text form of stored timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Samples feeding the window summaries of the store view
const RECENT_WINDOW: i64 = 100;

const RESULT_COLUMNS: &str =
    "result_id, user_id, filename, prediction, confidence, processing_time, timestamp, image_metadata";

/// Model lineage entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersionRecord {
    pub version_id: String,
    pub model_path: String,
    pub accuracy: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Result store backed by a SQLite pool
#[derive(Debug, Clone)]
pub struct ResultStore {
    pool: SqlitePool,
}

impl ResultStore {
    /// Open (creating if needed) the database at `url` and apply the schema
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        if url.contains(":memory:") {
            return Self::in_memory().await;
        }

        info!("Opening result store at {}", url);
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database, alive as long as the store
    pub async fn in_memory() -> Result<Self, StorageError> {
        debug!("Creating in-memory result store");
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // Every connection to :memory: is a separate database, so keep exactly one forever
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema applied successfully");
        Ok(())
    }

    /// Underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist a result. Fails with `DuplicateId` if the id is taken.
    pub async fn save(&self, result: &ClassificationResult) -> Result<(), StorageError> {
        let metadata = result.metadata().map(serde_json::to_string).transpose()?;

        sqlx::query(
            "INSERT INTO classification_results \
             (result_id, user_id, filename, prediction, confidence, processing_time, timestamp, image_metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(result.result_id().to_string())
        .bind(result.user_id())
        .bind(result.filename())
        .bind(result.label().as_str())
        .bind(result.confidence())
        .bind(result.processing_time())
        .bind(format_timestamp(result.created_at()))
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::DuplicateId(result.result_id())
            }
            _ => StorageError::from(e),
        })?;

        debug!("Saved classification result {}", result.result_id());
        Ok(())
    }

    /// Fetch one result
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ClassificationResult>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM classification_results WHERE result_id = ?",
            RESULT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_result).transpose()
    }

    /// A user's results, newest first
    pub async fn list_by_user(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ClassificationResult>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM classification_results WHERE user_id = ? \
             ORDER BY timestamp DESC, result_id DESC LIMIT ? OFFSET ?",
            RESULT_COLUMNS
        ))
        .bind(user_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_result).collect()
    }

    /// Number of stored results
    pub async fn count(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classification_results")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Aggregate view over every stored result, read in one transaction
    pub async fn compute_statistics(&self, now: DateTime<Utc>) -> Result<StatsView, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut view = StatsView::empty(StatsSource::Store);

        let totals = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COALESCE(SUM(prediction = 'Parasitized'), 0) AS parasitized, \
                    COALESCE(SUM(prediction = 'Uninfected'), 0) AS uninfected, \
                    COUNT(DISTINCT user_id) AS users, \
                    COALESCE(AVG(confidence), 0.0) AS avg_confidence, \
                    COALESCE(AVG(processing_time), 0.0) AS avg_time \
             FROM classification_results",
        )
        .fetch_one(&mut *tx)
        .await?;

        view.total_classifications = totals.try_get::<i64, _>("total")? as u64;
        view.parasitized_count = totals.try_get::<i64, _>("parasitized")? as u64;
        view.uninfected_count = totals.try_get::<i64, _>("uninfected")? as u64;
        view.total_users = Some(totals.try_get::<i64, _>("users")? as u64);
        view.average_confidence = totals.try_get("avg_confidence")?;
        view.average_processing_time = totals.try_get("avg_time")?;

        let today: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM classification_results WHERE substr(timestamp, 1, 10) = ?",
        )
        .bind(now.format("%Y-%m-%d").to_string())
        .fetch_one(&mut *tx)
        .await?;
        view.today_classifications = today as u64;

        let daily: Vec<(String, i64)> = sqlx::query_as(
            "SELECT substr(timestamp, 1, 10) AS day, COUNT(*) FROM classification_results GROUP BY day",
        )
        .fetch_all(&mut *tx)
        .await?;
        view.daily_classifications = daily.into_iter().map(|(k, n)| (k, n as u64)).collect();

        let hourly: Vec<(String, i64)> = sqlx::query_as(
            "SELECT substr(timestamp, 1, 10) || '-' || substr(timestamp, 12, 2) AS hour, COUNT(*) \
             FROM classification_results GROUP BY hour",
        )
        .fetch_all(&mut *tx)
        .await?;
        view.hourly_classifications = hourly.into_iter().map(|(k, n)| (k, n as u64)).collect();

        let mut recent: Vec<(f64, f64)> = sqlx::query_as(
            "SELECT processing_time, confidence FROM classification_results \
             ORDER BY timestamp DESC, result_id DESC LIMIT ?",
        )
        .bind(RECENT_WINDOW)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        // Oldest first, like the in-memory windows
        recent.reverse();
        let (latencies, confidences): (Vec<f64>, Vec<f64>) = recent.into_iter().unzip();
        Ok(view.with_windows(&latencies, &confidences))
    }

    /// Record a model version and mark it as the active one
    pub async fn save_model_version(&self, record: &ModelVersionRecord) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        if record.is_active {
            sqlx::query("UPDATE model_versions SET is_active = 0 WHERE is_active = 1")
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO model_versions (version_id, model_path, accuracy, created_at, is_active) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (version_id) DO UPDATE SET \
                model_path = excluded.model_path, \
                accuracy = excluded.accuracy, \
                created_at = excluded.created_at, \
                is_active = excluded.is_active",
        )
        .bind(&record.version_id)
        .bind(&record.model_path)
        .bind(record.accuracy)
        .bind(format_timestamp(record.created_at))
        .bind(record.is_active)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("Model version saved: {}", record.version_id);
        Ok(())
    }

    /// Most recently recorded model version
    pub async fn latest_model_version(&self) -> Result<Option<ModelVersionRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT version_id, model_path, accuracy, created_at, is_active FROM model_versions \
             ORDER BY created_at DESC, version_id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ModelVersionRecord {
            version_id: row.try_get("version_id")?,
            model_path: row.try_get("model_path")?,
            accuracy: row.try_get("accuracy")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
            is_active: row.try_get("is_active")?,
        }))
    }
}

/// Render a timestamp in the stored fixed-width form
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::SerializationError(format!("bad timestamp {:?}: {}", raw, e)))
}

fn row_to_result(row: &SqliteRow) -> Result<ClassificationResult, StorageError> {
    let id: String = row.try_get("result_id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| StorageError::SerializationError(format!("bad result id {:?}: {}", id, e)))?;
    let label: Label = row.try_get::<String, _>("prediction")?.parse()?;
    let metadata = row
        .try_get::<Option<String>, _>("image_metadata")?
        .map(|raw| serde_json::from_str::<ImageMetadata>(&raw))
        .transpose()?;

    let result = ClassificationResult::restore(
        id,
        row.try_get("user_id")?,
        row.try_get("filename")?,
        label,
        row.try_get("confidence")?,
        row.try_get("processing_time")?,
        parse_timestamp(&row.try_get::<String, _>("timestamp")?)?,
        metadata,
    )?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use domain_types::CaptureInfo;
    use std::collections::HashSet;

    fn result_at(user: Option<&str>, label: Label, confidence: f64, ts: DateTime<Utc>) -> ClassificationResult {
        ClassificationResult::restore(
            Uuid::new_v4(),
            user.map(str::to_string),
            "cell.png".to_string(),
            label,
            confidence,
            0.012,
            ts,
            None,
        )
        .unwrap()
    }

    async fn raw_insert(
        pool: &SqlitePool,
        prediction: &str,
        confidence: f64,
        processing_time: f64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO classification_results \
             (result_id, filename, prediction, confidence, processing_time) VALUES (?, 'x', ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(prediction)
        .bind(confidence)
        .bind(processing_time)
        .execute(pool)
        .await?;
        Ok(())
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let store = ResultStore::in_memory().await.unwrap();
        let metadata = ImageMetadata {
            format: "jpeg".to_string(),
            width: 640,
            height: 480,
            color_type: "Rgb8".to_string(),
            file_size_bytes: 52_113,
            capture: Some(CaptureInfo {
                make: Some("Olympus".to_string()),
                ..Default::default()
            }),
        };
        let result = ClassificationResult::new(
            Some("user-1".to_string()),
            "slide_04.jpg",
            Label::Infected,
            0.9731,
            0.0415,
            Some(metadata),
        )
        .unwrap();

        store.save(&result).await.unwrap();
        let loaded = store.get_by_id(result.result_id()).await.unwrap().unwrap();
        assert_eq!(loaded, result);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = ResultStore::in_memory().await.unwrap();
        assert!(store.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = ResultStore::in_memory().await.unwrap();
        let result = result_at(None, Label::Uninfected, 0.8, base_time());
        store.save(&result).await.unwrap();

        let err = store.save(&result).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateId(id) if id == result.result_id()));
    }

    #[tokio::test]
    async fn test_check_constraints() {
        let store = ResultStore::in_memory().await.unwrap();
        let pool = store.pool();
        assert!(raw_insert(pool, "Parasitized", 1.5, 0.1).await.is_err());
        assert!(raw_insert(pool, "Uninfected", 0.5, -0.1).await.is_err());
        assert!(raw_insert(pool, "Infected", 0.5, 0.1).await.is_err());
        assert!(raw_insert(pool, "Uninfected", 0.5, 0.1).await.is_ok());

        // Default timestamp is in the stored fixed-width form
        let ts: String = sqlx::query_scalar("SELECT timestamp FROM classification_results")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
        assert!(parse_timestamp(&ts).is_ok());
    }

    #[tokio::test]
    async fn test_list_by_user_pages_without_gaps() {
        let store = ResultStore::in_memory().await.unwrap();
        let mut expected = Vec::new();
        for i in 0..23 {
            // pairs share a timestamp to exercise the id tie-break
            let ts = base_time() + Duration::seconds(i / 2);
            let r = result_at(Some("alice"), Label::Uninfected, 0.6, ts);
            store.save(&r).await.unwrap();
            expected.push(r);
        }
        store
            .save(&result_at(Some("bob"), Label::Infected, 0.9, base_time()))
            .await
            .unwrap();

        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let page = store.list_by_user("alice", 5, offset).await.unwrap();
            if page.is_empty() {
                break;
            }
            offset += page.len() as u32;
            seen.extend(page);
        }

        assert_eq!(seen.len(), 23);
        let ids: HashSet<_> = seen.iter().map(|r| r.result_id()).collect();
        assert_eq!(ids.len(), 23);
        for pair in seen.windows(2) {
            let a = (pair[0].created_at(), pair[0].result_id().to_string());
            let b = (pair[1].created_at(), pair[1].result_id().to_string());
            assert!(a > b, "not strictly descending");
        }
        assert!(seen.iter().all(|r| r.user_id() == Some("alice")));
        assert!(store.list_by_user("nobody", 50, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_statistics_empty_store() {
        let store = ResultStore::in_memory().await.unwrap();
        let view = store.compute_statistics(Utc::now()).await.unwrap();
        assert_eq!(view.total_classifications, 0);
        assert_eq!(view.total_users, Some(0));
        assert_eq!(view.average_confidence, 0.0);
        assert_eq!(view.source, StatsSource::Store);
    }

    #[tokio::test]
    async fn test_statistics_aggregates_all_rows() {
        let store = ResultStore::in_memory().await.unwrap();
        let t = base_time();
        let rows = [
            result_at(Some("alice"), Label::Infected, 0.9, t),
            result_at(Some("alice"), Label::Uninfected, 0.7, t + Duration::minutes(70)),
            result_at(Some("bob"), Label::Infected, 0.8, t + Duration::days(1)),
            result_at(None, Label::Uninfected, 0.6, t + Duration::days(1)),
        ];
        for r in &rows {
            store.save(r).await.unwrap();
        }

        let view = store.compute_statistics(t + Duration::days(1)).await.unwrap();
        assert_eq!(view.total_classifications, 4);
        assert_eq!(view.parasitized_count, 2);
        assert_eq!(view.uninfected_count, 2);
        assert!(view.is_consistent());
        assert_eq!(view.total_users, Some(2));
        assert!((view.average_confidence - 0.75).abs() < 1e-9);
        assert!((view.average_processing_time - 0.012).abs() < 1e-9);
        assert_eq!(view.today_classifications, 2);
        assert_eq!(view.daily_classifications.get("2024-06-01"), Some(&2));
        assert_eq!(view.hourly_classifications.get("2024-06-01-09"), Some(&1));
        assert_eq!(view.recent_confidence_scores.len(), 4);
        assert_eq!(view.confidence_window.count, 4);
        // oldest first
        assert_eq!(view.recent_confidence_scores[0], 0.9);
    }

    #[tokio::test]
    async fn test_model_versions() {
        let store = ResultStore::in_memory().await.unwrap();
        assert!(store.latest_model_version().await.unwrap().is_none());

        let first = ModelVersionRecord {
            version_id: "1.0".to_string(),
            model_path: "models/model.onnx".to_string(),
            accuracy: Some(0.94),
            created_at: base_time(),
            is_active: true,
        };
        let second = ModelVersionRecord {
            version_id: "1.1".to_string(),
            accuracy: None,
            created_at: base_time() + Duration::days(3),
            ..first.clone()
        };
        store.save_model_version(&first).await.unwrap();
        store.save_model_version(&second).await.unwrap();
        // re-saving an existing version updates it instead of failing
        store.save_model_version(&second).await.unwrap();

        let latest = store.latest_model_version().await.unwrap().unwrap();
        assert_eq!(latest, second);

        let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM model_versions WHERE is_active = 1")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let path = std::env::temp_dir().join(format!("results-{}.db", Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());
        let result = result_at(Some("carol"), Label::Infected, 0.55, base_time());

        {
            let store = ResultStore::connect(&url, 4).await.unwrap();
            store.save(&result).await.unwrap();
            store.pool().close().await;
        }

        let reopened = ResultStore::connect(&url, 4).await.unwrap();
        assert_eq!(reopened.get_by_id(result.result_id()).await.unwrap(), Some(result));
        reopened.pool().close().await;

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
