//! SQLite-backed pattern store
//!
//! All access rides one serialized connection, so concurrent mutations of
//! the same pattern are applied one after another and no increment is
//! lost. Every mutating operation runs in a single transaction and the
//! cached confidence is recomputed from the counts inside that same
//! transaction. Failed operations are retried once before the error is
//! surfaced.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::errors::StoreError;
use crate::model::{NewPattern, Outcome, Pattern, ReliabilityStats};
use crate::scorer::{self, Smoothing};
use crate::schema::init_schema;

const PATTERN_COLUMNS: &str = "app_package, signature, selector, success_count, failure_count, confidence, created_at, last_used_at";

/// Handle to the pattern database. Cheap to clone; clones share the
/// underlying connection.
#[derive(Clone)]
pub struct PatternStore {
    conn: Connection,
    smoothing: Smoothing,
}

impl PatternStore {
    /// Open (creating if needed) a file-backed store.
    pub async fn open(path: impl AsRef<Path>, smoothing: Smoothing) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).await?;
        conn.call(|conn| init_schema(conn)).await?;
        debug!(path = %path.display(), "pattern store opened");
        Ok(Self { conn, smoothing })
    }

    /// Open an in-memory store, used by tests and learning-disabled runs.
    pub async fn in_memory(smoothing: Smoothing) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        conn.call(|conn| init_schema(conn)).await?;
        Ok(Self { conn, smoothing })
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }

    /// Close the underlying connection, flushing outstanding work.
    pub async fn close(self) -> Result<(), StoreError> {
        self.conn
            .close()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Upsert keyed by (app, signature). An existing record keeps its
    /// counts and creation time; only the selector text and last-used
    /// timestamp are refreshed.
    pub async fn save(&self, pattern: &NewPattern) -> Result<Pattern, StoreError> {
        match self.try_save(pattern).await {
            Ok(saved) => Ok(saved),
            Err(err) => {
                warn!(error = %err, signature = %pattern.signature, "save failed, retrying once");
                self.try_save(pattern).await
            }
        }
    }

    pub async fn get(&self, app: &str, signature: &str) -> Result<Option<Pattern>, StoreError> {
        match self.try_get(app, signature).await {
            Ok(found) => Ok(found),
            Err(err) => {
                warn!(error = %err, signature, "get failed, retrying once");
                self.try_get(app, signature).await
            }
        }
    }

    /// Patterns for `app`, most trusted first.
    pub async fn list(&self, app: &str, limit: usize) -> Result<Vec<Pattern>, StoreError> {
        match self.try_list(app, limit).await {
            Ok(patterns) => Ok(patterns),
            Err(err) => {
                warn!(error = %err, app, "list failed, retrying once");
                self.try_list(app, limit).await
            }
        }
    }

    /// Returns whether a record existed. Cascades to its log entries.
    pub async fn delete(&self, app: &str, signature: &str) -> Result<bool, StoreError> {
        match self.try_delete(app, signature).await {
            Ok(existed) => Ok(existed),
            Err(err) => {
                warn!(error = %err, signature, "delete failed, retrying once");
                self.try_delete(app, signature).await
            }
        }
    }

    /// Apply one observed outcome: bump the matching count, recompute the
    /// cached confidence and append to the interaction log, all in one
    /// transaction. Returns the new confidence, or `None` when no pattern
    /// with that signature exists for the app.
    pub async fn record_outcome(
        &self,
        app: &str,
        signature: &str,
        outcome: Outcome,
        latency_ms: Option<u64>,
    ) -> Result<Option<f64>, StoreError> {
        match self.try_record_outcome(app, signature, outcome, latency_ms).await {
            Ok(confidence) => Ok(confidence),
            Err(err) => {
                warn!(error = %err, signature, "record_outcome failed, retrying once");
                self.try_record_outcome(app, signature, outcome, latency_ms)
                    .await
            }
        }
    }

    /// Aggregate the interaction log for `app` over the trailing window.
    pub async fn reliability_stats(
        &self,
        app: &str,
        days: u32,
    ) -> Result<ReliabilityStats, StoreError> {
        match self.try_reliability_stats(app, days).await {
            Ok(stats) => Ok(stats),
            Err(err) => {
                warn!(error = %err, app, "reliability_stats failed, retrying once");
                self.try_reliability_stats(app, days).await
            }
        }
    }

    /// Drop log entries recorded before `before`. Patterns and their
    /// counts are untouched. Returns the number of entries removed.
    pub async fn prune_log(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        match self.try_prune_log(before).await {
            Ok(removed) => Ok(removed),
            Err(err) => {
                warn!(error = %err, "prune_log failed, retrying once");
                self.try_prune_log(before).await
            }
        }
    }

    /// Delete patterns not used since `cutoff`, with their log entries.
    /// Returns the number of patterns removed. Never runs implicitly.
    pub async fn sweep_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let removed = match self.try_sweep_stale(cutoff).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(error = %err, "sweep_stale failed, retrying once");
                self.try_sweep_stale(cutoff).await?
            }
        };
        if removed > 0 {
            debug!(removed, "stale patterns swept");
        }
        Ok(removed)
    }

    async fn try_prune_log(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = timestamp(before);
        self.conn
            .call(move |conn| {
                let removed =
                    conn.execute("DELETE FROM interaction_log WHERE recorded_at < ?1", [&cutoff])?;
                Ok(removed)
            })
            .await
            .map_err(StoreError::from)
    }

    async fn try_sweep_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = timestamp(cutoff);
        self.conn
            .call(move |conn| {
                let removed =
                    conn.execute("DELETE FROM patterns WHERE last_used_at < ?1", [&cutoff])?;
                Ok(removed)
            })
            .await
            .map_err(StoreError::from)
    }

    async fn try_save(&self, pattern: &NewPattern) -> Result<Pattern, StoreError> {
        let app = pattern.app_package.clone();
        let signature = pattern.signature.clone();
        let selector = pattern.selector.clone();
        let initial_confidence = scorer::confidence(0, 0, self.smoothing);
        let now = timestamp(Utc::now());

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO patterns (app_package, signature, selector, success_count, failure_count, confidence, created_at, last_used_at)
                     VALUES (?1, ?2, ?3, 0, 0, ?4, ?5, ?5)
                     ON CONFLICT (app_package, signature) DO UPDATE SET
                         selector = excluded.selector,
                         last_used_at = excluded.last_used_at",
                    params![app, signature, selector, initial_confidence, now],
                )?;
                let saved = tx.query_row(
                    &format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE app_package = ?1 AND signature = ?2"),
                    params![app, signature],
                    pattern_from_row,
                )?;
                tx.commit()?;
                Ok(saved)
            })
            .await
            .map_err(StoreError::from)
    }

    async fn try_get(&self, app: &str, signature: &str) -> Result<Option<Pattern>, StoreError> {
        let app = app.to_string();
        let signature = signature.to_string();
        self.conn
            .call(move |conn| {
                let found = conn.query_row(
                    &format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE app_package = ?1 AND signature = ?2"),
                    params![app, signature],
                    pattern_from_row,
                );
                match found {
                    Ok(pattern) => Ok(Some(pattern)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(StoreError::from)
    }

    async fn try_list(&self, app: &str, limit: usize) -> Result<Vec<Pattern>, StoreError> {
        let app = app.to_string();
        let limit = limit as i64;
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PATTERN_COLUMNS} FROM patterns WHERE app_package = ?1
                     ORDER BY confidence DESC, last_used_at DESC LIMIT ?2"
                ))?;
                let patterns = stmt
                    .query_map(params![app, limit], pattern_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(patterns)
            })
            .await
            .map_err(StoreError::from)
    }

    async fn try_delete(&self, app: &str, signature: &str) -> Result<bool, StoreError> {
        let app = app.to_string();
        let signature = signature.to_string();
        self.conn
            .call(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM patterns WHERE app_package = ?1 AND signature = ?2",
                    params![app, signature],
                )?;
                Ok(removed > 0)
            })
            .await
            .map_err(StoreError::from)
    }

    async fn try_record_outcome(
        &self,
        app: &str,
        signature: &str,
        outcome: Outcome,
        latency_ms: Option<u64>,
    ) -> Result<Option<f64>, StoreError> {
        let app = app.to_string();
        let signature = signature.to_string();
        let smoothing = self.smoothing;
        let latency_ms = latency_ms.map(|ms| ms as i64);
        let now = timestamp(Utc::now());

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let current = tx.query_row(
                    "SELECT id, success_count, failure_count FROM patterns
                     WHERE app_package = ?1 AND signature = ?2",
                    params![app, signature],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    },
                );
                let (id, successes, failures) = match current {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let (successes, failures) = match outcome {
                    Outcome::Success => (successes + 1, failures),
                    Outcome::Failure => (successes, failures + 1),
                };
                let confidence =
                    scorer::confidence(successes.max(0) as u64, failures.max(0) as u64, smoothing);

                tx.execute(
                    "UPDATE patterns SET success_count = ?2, failure_count = ?3, confidence = ?4, last_used_at = ?5
                     WHERE id = ?1",
                    params![id, successes, failures, confidence, now],
                )?;
                tx.execute(
                    "INSERT INTO interaction_log (pattern_id, outcome, latency_ms, recorded_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, outcome.as_str(), latency_ms, now],
                )?;
                tx.commit()?;
                Ok(Some(confidence))
            })
            .await
            .map_err(StoreError::from)
    }

    async fn try_reliability_stats(
        &self,
        app: &str,
        days: u32,
    ) -> Result<ReliabilityStats, StoreError> {
        let app = app.to_string();
        let cutoff = timestamp(Utc::now() - chrono::Duration::days(i64::from(days)));
        self.conn
            .call(move |conn| {
                let (interactions, successes, avg_latency_ms) = conn.query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(CASE WHEN l.outcome = 'success' THEN 1 ELSE 0 END), 0),
                            AVG(l.latency_ms)
                     FROM interaction_log l
                     JOIN patterns p ON p.id = l.pattern_id
                     WHERE p.app_package = ?1 AND l.recorded_at >= ?2",
                    params![app, cutoff],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, Option<f64>>(2)?,
                        ))
                    },
                )?;
                let interactions = interactions.max(0) as u64;
                let successes = successes.max(0) as u64;
                let success_rate = if interactions > 0 {
                    successes as f64 / interactions as f64
                } else {
                    0.0
                };
                Ok(ReliabilityStats {
                    interactions,
                    successes,
                    failures: interactions - successes,
                    success_rate,
                    avg_latency_ms,
                })
            })
            .await
            .map_err(StoreError::from)
    }
}

/// Fixed-width UTC rendition; lexicographic order matches time order, so
/// timestamps compare correctly as TEXT in SQL.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn pattern_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pattern> {
    let success_count: i64 = row.get(3)?;
    let failure_count: i64 = row.get(4)?;
    let created_at: String = row.get(6)?;
    let last_used_at: String = row.get(7)?;
    Ok(Pattern {
        app_package: row.get(0)?,
        signature: row.get(1)?,
        selector: row.get(2)?,
        success_count: success_count.max(0) as u64,
        failure_count: failure_count.max(0) as u64,
        confidence: row.get(5)?,
        created_at: parse_timestamp(&created_at),
        last_used_at: parse_timestamp(&last_used_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = "com.example.app";

    fn sample(signature: &str) -> NewPattern {
        NewPattern {
            app_package: APP.to_string(),
            signature: signature.to_string(),
            selector: "resource_id:exact:login_btn".to_string(),
        }
    }

    async fn store() -> PatternStore {
        PatternStore::in_memory(Smoothing::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let store = store().await;
        let first = store.save(&sample("sel_a")).await.unwrap();
        assert_eq!(first.confidence, 0.5);

        store
            .record_outcome(APP, "sel_a", Outcome::Success, None)
            .await
            .unwrap();
        let again = store.save(&sample("sel_a")).await.unwrap();

        // counts and creation time survive a re-save
        assert_eq!(again.success_count, 1);
        assert_eq!(again.created_at, first.created_at);
        assert_eq!(store.list(APP, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_outcome_for_unknown_signature() {
        let store = store().await;
        let confidence = store
            .record_outcome(APP, "sel_missing", Outcome::Success, None)
            .await
            .unwrap();
        assert!(confidence.is_none());
    }

    #[tokio::test]
    async fn test_confidence_never_drifts_from_counts() {
        let store = store().await;
        store.save(&sample("sel_a")).await.unwrap();

        for _ in 0..9 {
            store
                .record_outcome(APP, "sel_a", Outcome::Success, Some(40))
                .await
                .unwrap();
        }
        let last = store
            .record_outcome(APP, "sel_a", Outcome::Failure, Some(40))
            .await
            .unwrap();

        let expected = 10.0 / 12.0;
        assert!((last.unwrap() - expected).abs() < 1e-12);

        let stored = store.get(APP, "sel_a").await.unwrap().unwrap();
        assert_eq!(stored.success_count, 9);
        assert_eq!(stored.failure_count, 1);
        let recomputed = scorer::confidence(
            stored.success_count,
            stored.failure_count,
            store.smoothing(),
        );
        assert_eq!(stored.confidence, recomputed);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store().await;
        store.save(&sample("sel_a")).await.unwrap();
        assert!(store.delete(APP, "sel_a").await.unwrap());
        assert!(!store.delete(APP, "sel_a").await.unwrap());
        assert!(store.get(APP, "sel_a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_confidence() {
        let store = store().await;
        store.save(&sample("sel_good")).await.unwrap();
        store.save(&sample("sel_bad")).await.unwrap();
        store
            .record_outcome(APP, "sel_good", Outcome::Success, None)
            .await
            .unwrap();
        store
            .record_outcome(APP, "sel_bad", Outcome::Failure, None)
            .await
            .unwrap();

        let listed = store.list(APP, 10).await.unwrap();
        let signatures: Vec<_> = listed.iter().map(|p| p.signature.as_str()).collect();
        assert_eq!(signatures, ["sel_good", "sel_bad"]);

        assert!(store.list("com.other.app", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_backed_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.db");

        let store = PatternStore::open(&path, Smoothing::default()).await.unwrap();
        store.save(&sample("sel_a")).await.unwrap();
        store
            .record_outcome(APP, "sel_a", Outcome::Success, Some(12))
            .await
            .unwrap();
        store.close().await.unwrap();

        let reopened = PatternStore::open(&path, Smoothing::default()).await.unwrap();
        let pattern = reopened.get(APP, "sel_a").await.unwrap().unwrap();
        assert_eq!(pattern.success_count, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_outcomes_all_counted() {
        let store = store().await;
        store.save(&sample("sel_a")).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .record_outcome(APP, "sel_a", Outcome::Success, None)
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let pattern = store.get(APP, "sel_a").await.unwrap().unwrap();
        assert_eq!(pattern.success_count, 16);
    }

    #[tokio::test]
    async fn test_prune_log_keeps_patterns() {
        let store = store().await;
        store.save(&sample("sel_a")).await.unwrap();
        for _ in 0..3 {
            store
                .record_outcome(APP, "sel_a", Outcome::Success, Some(5))
                .await
                .unwrap();
        }

        let removed = store
            .prune_log(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 3);

        let stats = store.reliability_stats(APP, 30).await.unwrap();
        assert_eq!(stats.interactions, 0);
        let pattern = store.get(APP, "sel_a").await.unwrap().unwrap();
        assert_eq!(pattern.success_count, 3);
    }

    #[tokio::test]
    async fn test_sweep_stale_spares_recent_patterns() {
        let store = store().await;
        store.save(&sample("sel_old")).await.unwrap();
        store.save(&sample("sel_recent")).await.unwrap();

        // age the first pattern well past any realistic cutoff
        store
            .conn
            .call(|conn| {
                conn.execute(
                    "UPDATE patterns SET last_used_at = '2000-01-01T00:00:00.000000Z'
                     WHERE signature = 'sel_old'",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let removed = store
            .sweep_stale(Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(APP, "sel_old").await.unwrap().is_none());
        assert!(store.get(APP, "sel_recent").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reliability_stats_window() {
        let store = store().await;
        store.save(&sample("sel_a")).await.unwrap();
        store
            .record_outcome(APP, "sel_a", Outcome::Success, Some(10))
            .await
            .unwrap();
        store
            .record_outcome(APP, "sel_a", Outcome::Success, Some(30))
            .await
            .unwrap();
        store
            .record_outcome(APP, "sel_a", Outcome::Failure, None)
            .await
            .unwrap();

        let stats = store.reliability_stats(APP, 7).await.unwrap();
        assert_eq!(stats.interactions, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(stats.avg_latency_ms, Some(20.0));
    }
}
