//! SQLite implementation of `IssueRepository`.
//!
//! Durable storage that survives service restarts. Synchronous rusqlite
//! operations run under `tokio::task::spawn_blocking` so they never block
//! the async runtime; the connection lives behind an `Arc<Mutex>` because
//! `rusqlite::Connection` is not `Sync`.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table tracking the schema version.
//! When the schema changes, increment `CURRENT_SCHEMA_VERSION` and add a
//! migration in `run_migrations()`. Migrations run sequentially from the
//! stored version to the target version.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;
use uuid::Uuid;

use super::{IssueRepository, RepositoryError};
use crate::state_machine::event::{EventType, IssueEvent};
use crate::state_machine::run::{RunMode, RunRecord, RunStatus, RunUpdate};
use crate::state_machine::state::{IssueId, IssueSnapshot, IssueState, RequestId, RunId};

/// Current schema version. Increment when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed issue repository.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at the given path and run any
    /// pending migrations.
    ///
    /// The database is configured with `journal_mode = WAL` for crash
    /// safety, `synchronous = FULL` for durability, and a 5s busy timeout
    /// for concurrent access. WAL mode is verified rather than assumed:
    /// some filesystems silently keep DELETE mode, which would violate the
    /// durability assumptions here.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;

                    // Restrict the state directory (Unix only). This also
                    // covers the WAL/SHM files SQLite creates with default
                    // umask permissions.
                    #[cfg(unix)]
                    {
                        use std::os::unix::fs::PermissionsExt;
                        let dir_permissions = std::fs::Permissions::from_mode(0o700);
                        if let Err(e) = std::fs::set_permissions(parent, dir_permissions) {
                            warn!(
                                "failed to set restrictive permissions on state directory: {e}"
                            );
                        }
                    }
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // The database holds workflow state and audit history; owner-only.
        #[cfg(unix)]
        if !is_in_memory && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!("failed to set restrictive permissions on database file: {e}");
            }
        }

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!("expected WAL mode, SQLite returned '{journal_mode}'"),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, for tests.
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "database schema version {from_version} is newer than supported \
                     version {CURRENT_SCHEMA_VERSION}; upgrade the application"
                ),
            ));
        }
        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS issues (
                    id TEXT PRIMARY KEY,
                    state TEXT NOT NULL,
                    title TEXT NOT NULL,
                    github_link TEXT,
                    pr_url TEXT
                );

                CREATE TABLE IF NOT EXISTS issue_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    issue_id TEXT NOT NULL,
                    run_id TEXT,
                    event_type TEXT NOT NULL,
                    event_data TEXT NOT NULL,
                    occurred_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_issue_events_issue
                    ON issue_events(issue_id, id);

                CREATE TABLE IF NOT EXISTS runs (
                    id TEXT PRIMARY KEY,
                    issue_id TEXT NOT NULL,
                    actor TEXT NOT NULL,
                    request_id TEXT NOT NULL,
                    mode TEXT NOT NULL,
                    status TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    completed_at TEXT,
                    duration_ms INTEGER,
                    metadata TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_runs_issue
                    ON runs(issue_id, started_at);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migrate to v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET version = ?1",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("record schema version", e.to_string()))?;

        Ok(())
    }
}

fn parse_state(s: &str) -> Result<IssueState, RepositoryError> {
    IssueState::parse(s)
        .ok_or_else(|| RepositoryError::corruption(format!("unknown issue state '{s}'")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| RepositoryError::corruption(format!("timestamp '{s}'")))
}

fn parse_run_id(s: &str) -> Result<RunId, RepositoryError> {
    Uuid::parse_str(s)
        .map(RunId)
        .map_err(|_| RepositoryError::corruption(format!("run id '{s}'")))
}

fn row_to_run(
    id: String,
    issue_id: String,
    actor: String,
    request_id: String,
    mode: String,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    duration_ms: Option<i64>,
    metadata: String,
) -> Result<RunRecord, RepositoryError> {
    Ok(RunRecord {
        id: parse_run_id(&id)?,
        issue_id: IssueId(issue_id),
        actor,
        request_id: RequestId(request_id),
        mode: RunMode::parse(&mode)
            .ok_or_else(|| RepositoryError::corruption(format!("run mode '{mode}'")))?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| RepositoryError::corruption(format!("run status '{status}'")))?,
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        duration_ms,
        metadata: serde_json::from_str(&metadata)
            .map_err(|_| RepositoryError::corruption("run metadata JSON"))?,
    })
}

#[async_trait]
impl IssueRepository for SqliteRepository {
    async fn get_issue(&self, id: &IssueId) -> Result<Option<IssueSnapshot>, RepositoryError> {
        let conn = self.conn.clone();
        let issue_id = id.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let row = conn
                .query_row(
                    "SELECT state, title, github_link, pr_url FROM issues WHERE id = ?1",
                    params![issue_id.0],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get_issue", e.to_string()))?;

            match row {
                None => Ok(None),
                Some((state, title, github_link, pr_url)) => Ok(Some(IssueSnapshot {
                    id: issue_id,
                    state: parse_state(&state)?,
                    title,
                    github_link,
                    pr_url,
                })),
            }
        })
        .await
        .map_err(|e| RepositoryError::storage("get_issue", e.to_string()))?
    }

    async fn put_issue(&self, issue: IssueSnapshot) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO issues (id, state, title, github_link, pr_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     state = ?2, title = ?3, github_link = ?4, pr_url = ?5",
                params![
                    issue.id.0,
                    issue.state.as_str(),
                    issue.title,
                    issue.github_link,
                    issue.pr_url
                ],
            )
            .map_err(|e| RepositoryError::storage("put_issue", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("put_issue", e.to_string()))?
    }

    async fn conditional_update_state(
        &self,
        id: &IssueId,
        expected: IssueState,
        new: IssueState,
    ) -> Result<u64, RepositoryError> {
        let conn = self.conn.clone();
        let issue_id = id.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let rows = conn
                .execute(
                    "UPDATE issues SET state = ?1 WHERE id = ?2 AND state = ?3",
                    params![new.as_str(), issue_id.0, expected.as_str()],
                )
                .map_err(|e| {
                    RepositoryError::storage("conditional_update_state", e.to_string())
                })?;
            Ok(rows as u64)
        })
        .await
        .map_err(|e| RepositoryError::storage("conditional_update_state", e.to_string()))?
    }

    async fn append_event(
        &self,
        issue_id: &IssueId,
        run_id: Option<RunId>,
        event_type: EventType,
    ) -> Result<IssueEvent, RepositoryError> {
        let conn = self.conn.clone();
        let issue_id = issue_id.clone();
        let occurred_at = Utc::now();

        // Serialize the typed payload for the event_data column; the
        // variant name goes in event_type for easier querying.
        let event_json = serde_json::to_string(&event_type)
            .map_err(|e| RepositoryError::storage("append_event serialize", e.to_string()))?;
        let event_name = event_type.name();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO issue_events (issue_id, run_id, event_type, event_data, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    issue_id.0,
                    run_id.map(|r| r.to_string()),
                    event_name,
                    event_json,
                    occurred_at.to_rfc3339()
                ],
            )
            .map_err(|e| RepositoryError::storage("append_event", e.to_string()))?;

            let id = conn.last_insert_rowid();
            Ok(IssueEvent {
                id,
                issue_id,
                run_id,
                event_type,
                occurred_at,
            })
        })
        .await
        .map_err(|e| RepositoryError::storage("append_event", e.to_string()))?
    }

    async fn events_for_issue(&self, id: &IssueId) -> Result<Vec<IssueEvent>, RepositoryError> {
        let conn = self.conn.clone();
        let issue_id = id.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn
                .prepare(
                    "SELECT id, run_id, event_data, occurred_at
                     FROM issue_events
                     WHERE issue_id = ?1
                     ORDER BY id ASC",
                )
                .map_err(|e| RepositoryError::storage("events_for_issue", e.to_string()))?;

            let rows = stmt
                .query_map(params![issue_id.0], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|e| RepositoryError::storage("events_for_issue", e.to_string()))?;

            let mut events = Vec::new();
            for row in rows {
                let (id, run_id, event_data, occurred_at) = row
                    .map_err(|e| RepositoryError::storage("events_for_issue row", e.to_string()))?;

                let event_type: EventType = serde_json::from_str(&event_data)
                    .map_err(|_| RepositoryError::corruption("event_data JSON"))?;

                events.push(IssueEvent {
                    id,
                    issue_id: issue_id.clone(),
                    run_id: run_id.as_deref().map(parse_run_id).transpose()?,
                    event_type,
                    occurred_at: parse_timestamp(&occurred_at)?,
                });
            }
            Ok(events)
        })
        .await
        .map_err(|e| RepositoryError::storage("events_for_issue", e.to_string()))?
    }

    async fn create_run(&self, run: RunRecord) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let metadata = serde_json::to_string(&run.metadata)
            .map_err(|e| RepositoryError::storage("create_run serialize", e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO runs
                     (id, issue_id, actor, request_id, mode, status, started_at,
                      completed_at, duration_ms, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    run.id.to_string(),
                    run.issue_id.0,
                    run.actor,
                    run.request_id.0,
                    run.mode.as_str(),
                    run.status.as_str(),
                    run.started_at.to_rfc3339(),
                    run.completed_at.map(|t| t.to_rfc3339()),
                    run.duration_ms,
                    metadata
                ],
            )
            .map_err(|e| RepositoryError::storage("create_run", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("create_run", e.to_string()))?
    }

    async fn update_run(&self, id: RunId, update: RunUpdate) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let metadata = update
            .metadata
            .map(|m| serde_json::to_string(&m))
            .transpose()
            .map_err(|e| RepositoryError::storage("update_run serialize", e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let rows = conn
                .execute(
                    "UPDATE runs SET
                         status = ?1,
                         completed_at = COALESCE(?2, completed_at),
                         duration_ms = COALESCE(?3, duration_ms),
                         metadata = COALESCE(?4, metadata)
                     WHERE id = ?5",
                    params![
                        update.status.as_str(),
                        update.completed_at.map(|t| t.to_rfc3339()),
                        update.duration_ms,
                        metadata,
                        id.to_string()
                    ],
                )
                .map_err(|e| RepositoryError::storage("update_run", e.to_string()))?;
            if rows == 0 {
                return Err(RepositoryError::storage(
                    "update_run",
                    format!("unknown run {id}"),
                ));
            }
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("update_run", e.to_string()))?
    }

    async fn get_run(&self, id: RunId) -> Result<Option<RunRecord>, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let row = conn
                .query_row(
                    "SELECT id, issue_id, actor, request_id, mode, status, started_at,
                            completed_at, duration_ms, metadata
                     FROM runs WHERE id = ?1",
                    params![id.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, String>(6)?,
                            row.get::<_, Option<String>>(7)?,
                            row.get::<_, Option<i64>>(8)?,
                            row.get::<_, String>(9)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get_run", e.to_string()))?;

            match row {
                None => Ok(None),
                Some((id, issue_id, actor, request_id, mode, status, started, completed, duration, metadata)) => {
                    Ok(Some(row_to_run(
                        id, issue_id, actor, request_id, mode, status, started, completed,
                        duration, metadata,
                    )?))
                }
            }
        })
        .await
        .map_err(|e| RepositoryError::storage("get_run", e.to_string()))?
    }

    async fn recent_runs(
        &self,
        issue_id: &IssueId,
        limit: usize,
    ) -> Result<Vec<RunRecord>, RepositoryError> {
        let conn = self.conn.clone();
        let issue_id = issue_id.clone();
        let limit = i64::try_from(limit)
            .map_err(|_| RepositoryError::storage("recent_runs", "limit too large"))?;

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn
                .prepare(
                    "SELECT id, issue_id, actor, request_id, mode, status, started_at,
                            completed_at, duration_ms, metadata
                     FROM runs
                     WHERE issue_id = ?1
                     ORDER BY started_at DESC
                     LIMIT ?2",
                )
                .map_err(|e| RepositoryError::storage("recent_runs", e.to_string()))?;

            let rows = stmt
                .query_map(params![issue_id.0, limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<i64>>(8)?,
                        row.get::<_, String>(9)?,
                    ))
                })
                .map_err(|e| RepositoryError::storage("recent_runs", e.to_string()))?;

            let mut runs = Vec::new();
            for row in rows {
                let (id, issue_id, actor, request_id, mode, status, started, completed, duration, metadata) =
                    row.map_err(|e| RepositoryError::storage("recent_runs row", e.to_string()))?;
                runs.push(row_to_run(
                    id, issue_id, actor, request_id, mode, status, started, completed, duration,
                    metadata,
                )?);
            }
            Ok(runs)
        })
        .await
        .map_err(|e| RepositoryError::storage("recent_runs", e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::run::NewRun;
    use crate::state_machine::run::RunTracker;
    use crate::state_machine::verdict::Verdict;

    fn snapshot(id: &str, state: IssueState) -> IssueSnapshot {
        IssueSnapshot {
            id: IssueId::from(id),
            state,
            title: "add widget".to_string(),
            github_link: Some("https://github.com/acme/widgets/issues/1".to_string()),
            pr_url: None,
        }
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        assert_eq!(repo.get_issue(&IssueId::from("nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let issue = snapshot("ISSUE-1", IssueState::Implementing);
        repo.put_issue(issue.clone()).await.unwrap();
        assert_eq!(repo.get_issue(&issue.id).await.unwrap(), Some(issue));
    }

    #[tokio::test]
    async fn test_put_is_upsert() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let mut issue = snapshot("ISSUE-1", IssueState::Created);
        repo.put_issue(issue.clone()).await.unwrap();

        issue.pr_url = Some("https://github.com/acme/widgets/pull/7".to_string());
        repo.put_issue(issue.clone()).await.unwrap();

        assert_eq!(repo.get_issue(&issue.id).await.unwrap(), Some(issue));
    }

    #[tokio::test]
    async fn test_conditional_update_reports_row_count() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let issue = snapshot("ISSUE-1", IssueState::Verified);
        repo.put_issue(issue.clone()).await.unwrap();

        let won = repo
            .conditional_update_state(&issue.id, IssueState::Verified, IssueState::MergeReady)
            .await
            .unwrap();
        let lost = repo
            .conditional_update_state(&issue.id, IssueState::Verified, IssueState::MergeReady)
            .await
            .unwrap();

        assert_eq!(won, 1);
        assert_eq!(lost, 0);
        assert_eq!(
            repo.get_issue(&issue.id).await.unwrap().unwrap().state,
            IssueState::MergeReady
        );
    }

    #[tokio::test]
    async fn test_events_are_ordered_and_typed() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let id = IssueId::from("ISSUE-1");
        let run_id = RunId::new();

        let first = repo
            .append_event(
                &id,
                Some(run_id),
                EventType::VerdictSet {
                    verdict: Verdict::Green,
                    state: IssueState::Implementing,
                },
            )
            .await
            .unwrap();
        let second = repo
            .append_event(
                &id,
                Some(run_id),
                EventType::StateChanged {
                    old_state: IssueState::Implementing,
                    new_state: IssueState::Verified,
                    reason: "verdict:GREEN".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(first.id < second.id);

        let events = repo.events_for_issue(&id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], first);
        assert_eq!(events[1].run_id, Some(run_id));
        assert_eq!(events[1].event_type.name(), "state_changed");
    }

    #[tokio::test]
    async fn test_run_lifecycle_round_trips() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let tracker = RunTracker::new(&repo);

        let run = tracker
            .create_run(NewRun {
                issue_id: IssueId::from("ISSUE-1"),
                actor: "tester".to_string(),
                request_id: RequestId::from("req-1"),
                mode: RunMode::Execute,
            })
            .await
            .unwrap();

        tracker
            .update_run_status(run.id, RunUpdate::running())
            .await
            .unwrap();
        tracker
            .update_run_status(
                run.id,
                RunUpdate::completed(7, serde_json::json!({ "blocked": false })),
            )
            .await
            .unwrap();

        let stored = repo.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(stored.duration_ms, Some(7));
        assert_eq!(stored.metadata["blocked"], serde_json::json!(false));

        let recent = repo.recent_runs(&run.issue_id, 5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, run.id);
    }

    #[tokio::test]
    async fn test_update_run_rejects_unknown_id() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let err = repo
            .update_run(RunId::new(), RunUpdate::running())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conveyor.db");

        {
            let repo = SqliteRepository::new(&path).unwrap();
            repo.put_issue(snapshot("ISSUE-1", IssueState::Hold))
                .await
                .unwrap();
            repo.append_event(
                &IssueId::from("ISSUE-1"),
                None,
                EventType::VerdictSet {
                    verdict: Verdict::Hold,
                    state: IssueState::Hold,
                },
            )
            .await
            .unwrap();
        }

        let repo = SqliteRepository::new(&path).unwrap();
        let issue = repo
            .get_issue(&IssueId::from("ISSUE-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(issue.state, IssueState::Hold);
        assert_eq!(
            repo.events_for_issue(&issue.id).await.unwrap().len(),
            1
        );
    }

    /// The state directory and database file must be owner-only.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_state_dir_and_database_have_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let state_dir = temp_dir.path().join("state");
        let db_path = state_dir.join("conveyor.db");

        let _repo = SqliteRepository::new(&db_path).unwrap();

        let dir_mode = std::fs::metadata(&state_dir)
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(
            dir_mode, 0o700,
            "state directory should have 0700 permissions, got {dir_mode:o}"
        );

        let file_mode = std::fs::metadata(&db_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(
            file_mode, 0o600,
            "database file should have 0600 permissions, got {file_mode:o}"
        );
    }

    #[tokio::test]
    async fn test_corrupt_state_surfaces_as_corruption() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let issue = snapshot("ISSUE-1", IssueState::Created);
        repo.put_issue(issue.clone()).await.unwrap();

        {
            let conn = repo.conn.lock().unwrap();
            conn.execute(
                "UPDATE issues SET state = 'BOGUS' WHERE id = ?1",
                params![issue.id.0],
            )
            .unwrap();
        }

        let err = repo.get_issue(&issue.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Corruption { .. }));
    }
}
