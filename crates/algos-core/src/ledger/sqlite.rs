//! SQLite-backed ledger (sqlx).
//!
//! The database file lives under the XDG state directory so the CLI and the
//! REST server on the same host share one job history. Transitions are a single
//! conditional `UPDATE ... WHERE id = ? AND state = ?` inside a transaction, so
//! concurrent writers (even in different processes) cannot both win.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};

use super::types::{
    unix_millis, AlgorithmRef, Job, JobFailure, JobId, JobOwner, JobRequest, JobState, Priority,
    TransitionUpdate,
};
use super::{JobLedger, INTERRUPTED_MESSAGE};
use crate::error::{CoreError, ErrorKind, Result};

const JOB_COLUMNS: &str = r#"
    id, algorithm, version, input_json, caller, idempotency_key, priority,
    owner_pid, owner_instance, state, created_at, started_at, completed_at, result_json, error_kind, error_message
"#;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the SQLite job ledger. Cheap to clone (shares the pool).
#[derive(Clone)]
pub struct SqliteLedger {
    pool: Pool<Sqlite>,
}

impl SqliteLedger {
    /// Open (or create) the default ledger at `~/.local/state/algos/jobs.db` and run migrations.
    pub async fn open_default() -> anyhow::Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("algos")?;
        let db_path = xdg_dirs.get_state_home().join("jobs.db");
        Self::open_at(&db_path).await
    }

    /// Open (or create) the ledger at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await
            .with_context(|| format!("open job ledger {}", path.display()))?;
        let ledger = SqliteLedger { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    /// In-memory database on a single connection (a second connection would see an empty DB).
    pub async fn open_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let ledger = SqliteLedger { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        // - `input_json` / `result_json` hold the raw JSON payloads.
        // - `error_kind` is an ErrorKind name; NULL unless the job ended without a result.
        // - `owner_instance` names the scheduler that runs the job; `owner_pid` is its process.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                algorithm TEXT NOT NULL,
                version TEXT NOT NULL,
                input_json TEXT NOT NULL,
                caller TEXT NOT NULL,
                idempotency_key TEXT,
                priority TEXT NOT NULL,
                owner_pid INTEGER NOT NULL,
                owner_instance TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                result_json TEXT,
                error_kind TEXT,
                error_message TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS jobs_idempotency_key
            ON jobs (idempotency_key)
            WHERE idempotency_key IS NOT NULL;
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS jobs_open_state
            ON jobs (state)
            WHERE state IN ('pending', 'running');
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch(&self, id: JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let id: i64 = row.get("id");
    let state_str: String = row.get("state");
    let state = JobState::parse(&state_str)
        .ok_or_else(|| CoreError::Ledger(anyhow::anyhow!("job {id}: unknown state `{state_str}`")))?;
    let priority_str: String = row.get("priority");
    let priority = Priority::parse(&priority_str).unwrap_or_default();
    let owner_pid: i64 = row.get("owner_pid");

    let input_json: String = row.get("input_json");
    let input: Value = serde_json::from_str(&input_json)?;
    let result_json: Option<String> = row.get("result_json");
    let result = result_json
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()?;

    let error_kind: Option<String> = row.get("error_kind");
    let error_message: Option<String> = row.get("error_message");
    let error = error_kind.map(|k| JobFailure {
        kind: ErrorKind::parse(&k).unwrap_or(ErrorKind::Internal),
        message: error_message.unwrap_or_default(),
    });

    Ok(Job {
        id,
        request: JobRequest {
            algorithm: AlgorithmRef {
                name: row.get("algorithm"),
                version: row.get("version"),
            },
            input,
            caller: row.get("caller"),
            idempotency_key: row.get("idempotency_key"),
            priority,
        },
        owner: JobOwner {
            pid: u32::try_from(owner_pid).unwrap_or(0),
            instance: row.get("owner_instance"),
        },
        state,
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        result,
        error,
    })
}

#[async_trait]
impl JobLedger for SqliteLedger {
    async fn create(&self, request: JobRequest, owner: &JobOwner) -> Result<Job> {
        let now = unix_millis();
        let input_json = serde_json::to_string(&request.input)?;

        let id = sqlx::query(
            r#"
            INSERT INTO jobs (
                algorithm, version, input_json, caller, idempotency_key, priority,
                owner_pid, owner_instance,
                state, created_at, started_at, completed_at, result_json, error_kind, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                      ?7, ?8,
                      ?9, ?10, NULL, NULL, NULL, NULL, NULL)
            "#,
        )
        .bind(&request.algorithm.name)
        .bind(&request.algorithm.version)
        .bind(input_json)
        .bind(&request.caller)
        .bind(&request.idempotency_key)
        .bind(request.priority.as_str())
        .bind(i64::from(owner.pid))
        .bind(&owner.instance)
        .bind(JobState::Pending.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Job {
            id,
            request,
            owner: owner.clone(),
            state: JobState::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        })
    }

    async fn transition(
        &self,
        id: JobId,
        from: JobState,
        to: JobState,
        update: TransitionUpdate,
    ) -> Result<Job> {
        let now = unix_millis();
        let started_at = (to == JobState::Running).then_some(now);
        let (completed_at, result_json, error_kind, error_message) = if to.is_terminal() {
            let result_json = update
                .result
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            (
                Some(now),
                result_json,
                update.error.as_ref().map(|e| e.kind.as_str()),
                update.error.as_ref().map(|e| e.message.clone()),
            )
        } else {
            (None, None, None, None)
        };

        let mut tx = self.pool.begin().await?;
        let affected = if from.can_transition_to(to) {
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = ?1,
                    started_at = COALESCE(?2, started_at),
                    completed_at = COALESCE(?3, completed_at),
                    result_json = ?4,
                    error_kind = ?5,
                    error_message = ?6
                WHERE id = ?7 AND state = ?8
                "#,
            )
            .bind(to.as_str())
            .bind(started_at)
            .bind(completed_at)
            .bind(result_json)
            .bind(error_kind)
            .bind(error_message)
            .bind(id)
            .bind(from.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected()
        } else {
            0
        };

        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        let Some(row) = row else {
            return Err(CoreError::NotFound(id));
        };
        let job = job_from_row(&row)?;
        if affected == 0 {
            return Err(CoreError::InvalidTransition {
                id,
                from,
                to,
                actual: job.state,
            });
        }
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        self.fetch(id).await
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
        not_before: Option<i64>,
    ) -> Result<Option<Job>> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE idempotency_key = ?1
              AND state IN ('pending', 'running', 'completed')
              AND created_at >= ?2
            ORDER BY id DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .bind(not_before.unwrap_or(i64::MIN))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn list(&self, limit: usize) -> Result<Vec<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY id DESC LIMIT ?1");
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn purge_finished(&self, before: i64) -> Result<u64> {
        let r = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE state IN ('completed', 'failed', 'timed_out', 'cancelled')
              AND completed_at IS NOT NULL
              AND completed_at < ?1
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    async fn open_owners(&self) -> Result<Vec<JobOwner>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT owner_pid, owner_instance FROM jobs
            WHERE state IN ('pending', 'running')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| JobOwner {
                pid: u32::try_from(row.get::<i64, _>("owner_pid")).unwrap_or(0),
                instance: row.get("owner_instance"),
            })
            .collect())
    }

    async fn fail_interrupted(&self, owner: &JobOwner) -> Result<u64> {
        let now = unix_millis();
        let mut tx = self.pool.begin().await?;
        let cancelled = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'cancelled',
                completed_at = ?1,
                error_kind = 'cancelled',
                error_message = ?2
            WHERE state = 'pending' AND owner_instance = ?3
            "#,
        )
        .bind(now)
        .bind(INTERRUPTED_MESSAGE)
        .bind(&owner.instance)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        let failed = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed',
                completed_at = ?1,
                error_kind = 'execution_failure',
                error_message = ?2
            WHERE state = 'running' AND owner_instance = ?3
            "#,
        )
        .bind(now)
        .bind(INTERRUPTED_MESSAGE)
        .bind(&owner.instance)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        Ok(cancelled + failed)
    }
}
